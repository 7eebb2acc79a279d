use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ids::{ActorId, TenantId};

/// Per-command binding of tenant and actor. Every engine entry point takes
/// one; the engine never reads or writes across the bound tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub actor_id: ActorId,
    /// Caller-supplied idempotency / tracing key.
    pub correlation_id: Option<Uuid>,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, actor_id: ActorId) -> Self {
        Self {
            tenant_id,
            actor_id,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Reject any record that belongs to a different tenant. Cross-tenant
    /// access is an authorization failure, not a not-found.
    pub fn ensure_tenant(&self, owner: TenantId) -> Result<()> {
        if owner != self.tenant_id {
            return Err(Error::Forbidden);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_mismatch_is_forbidden() {
        let ctx = TenantContext::new(TenantId::new(), ActorId::new());
        assert!(ctx.ensure_tenant(ctx.tenant_id).is_ok());

        let err = ctx.ensure_tenant(TenantId::new()).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
    }
}
