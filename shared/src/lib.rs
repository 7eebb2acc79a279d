pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod ids;
pub mod metadata;
pub mod quantity;
pub mod sku;
pub mod telemetry;
pub mod units;

pub use config::EngineConfig;
pub use context::TenantContext;
pub use error::{Error, Result};
pub use ids::*;
pub use metadata::{MetadataValue, MovementMetadata};
pub use quantity::Quantity;
pub use sku::Sku;
pub use units::{UnitCategory, UnitConversion, UnitOfMeasure};
