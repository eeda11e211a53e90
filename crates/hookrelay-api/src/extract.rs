//! Request extractors for the management surface.

use axum::{extract::FromRequestParts, http::request::Parts};
use hookrelay_core::{Error, RequestScope, TenantId};
use uuid::Uuid;

use crate::error::ApiError;

/// Tenant header carried on every management request.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Extracts the caller's tenant scope from the `x-tenant-id` header,
/// attaching the request id injected by the server middleware when present.
#[derive(Debug, Clone, Copy)]
pub struct TenantScope(pub RequestScope);

impl<S> FromRequestParts<S> for TenantScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(TenantId::from)
            .ok_or_else(|| {
                ApiError(Error::InvalidSpec(format!(
                    "missing or invalid {TENANT_HEADER} header"
                )))
            })?;

        let request_id = parts
            .extensions
            .get::<String>()
            .and_then(|s| Uuid::parse_str(s).ok());
        let scope = match request_id {
            Some(request_id) => RequestScope::with_request_id(tenant_id, request_id),
            None => RequestScope::new(tenant_id),
        };
        Ok(Self(scope))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    #[tokio::test]
    async fn extracts_tenant_from_header() {
        let tenant = Uuid::new_v4();
        let request = Request::builder()
            .header(TENANT_HEADER, tenant.to_string())
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();

        let TenantScope(scope) = TenantScope::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(scope.tenant_id.0, tenant);
    }

    #[tokio::test]
    async fn rejects_missing_and_malformed_headers() {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, ()) = request.into_parts();
        assert!(TenantScope::from_request_parts(&mut parts, &()).await.is_err());

        let request = Request::builder().header(TENANT_HEADER, "not-a-uuid").body(()).unwrap();
        let (mut parts, ()) = request.into_parts();
        assert!(TenantScope::from_request_parts(&mut parts, &()).await.is_err());
    }
}
