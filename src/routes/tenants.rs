//! Tenant provisioning.
//!
//! Registries are only created through this endpoint; every other route
//! resolves the tenant with a plain lookup and answers `unknown_tenant` for
//! ids that were never provisioned, so probing random UUIDs cannot grow the
//! registry map.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;
use crate::events::{log_activity_with_context, Loggable, RequestContext};
use crate::identity::GatewayIdentity;
use crate::models::role::RoleView;

pub fn routes() -> Router<AppState> {
    Router::new().route("/tenants/:tenant_id", post(provision_tenant))
}

#[derive(Debug, Serialize)]
struct TenantProvisioned {
    tenant_id: Uuid,
}

impl Loggable for TenantProvisioned {
    fn entity_type() -> &'static str {
        "tenant"
    }
    fn subject_id(&self) -> Uuid {
        self.tenant_id
    }
}

/// Provision a tenant's role registry
///
/// Seeds the system roles on first touch and returns them; calling again for
/// an existing tenant is a no-op answered with 200.
#[utoipa::path(
    post,
    path = "/tenants/{tenant_id}",
    tag = "Tenants",
    params(("tenant_id" = Uuid, Path, description = "Tenant ID")),
    responses(
        (status = 201, description = "Tenant provisioned with seeded system roles", body = Vec<RoleView>),
        (status = 200, description = "Tenant already provisioned", body = Vec<RoleView>),
    )
)]
pub(crate) async fn provision_tenant(
    State(state): State<AppState>,
    actor: GatewayIdentity,
    headers: HeaderMap,
    Path(tenant_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Vec<RoleView>>), AppError> {
    let already_provisioned = state.registries.get(tenant_id).is_some();
    let registry = state.registries.get_or_create(tenant_id);

    if !already_provisioned {
        log_activity_with_context(
            &state.event_bus,
            "provisioned",
            actor.user_id,
            &TenantProvisioned { tenant_id },
            None,
            Some(RequestContext::from_headers(&headers)),
        );
    }

    let roles = registry
        .list_active()
        .iter()
        .map(|role| RoleView::from(role.as_ref()))
        .collect();
    let status = if already_provisioned {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(roles)))
}
