pub mod alert;
pub mod catalog;
pub mod item;
pub mod movement;
pub mod reservation;
pub mod soft_delete;

pub use alert::Alert;
pub use catalog::{Product, Variant, Warehouse};
pub use item::InventoryItem;
pub use movement::{MovementFilter, StockMovement};
pub use reservation::Reservation;
pub use soft_delete::SoftDeleteMarker;
