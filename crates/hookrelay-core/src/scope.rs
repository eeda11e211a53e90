//! Typed request scope passed by parameter through the call chain.

use uuid::Uuid;

use crate::models::TenantId;

/// Identity and correlation data for one management-API request.
///
/// Tenant identity arrives already resolved by upstream middleware; this
/// type carries it explicitly instead of a string-keyed context bag.
#[derive(Debug, Clone, Copy)]
pub struct RequestScope {
    pub tenant_id: TenantId,
    pub request_id: Uuid,
}

impl RequestScope {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id, request_id: Uuid::new_v4() }
    }

    pub fn with_request_id(tenant_id: TenantId, request_id: Uuid) -> Self {
        Self { tenant_id, request_id }
    }
}
