//! Remote policy check endpoint.
//!
//! Mirrors the in-process `can_perform` signature for callers on the other
//! side of an HTTP boundary (the `Can` component and `usePermissions` hook
//! poll this per render), with the decision cache on this side of the wire.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{can_perform, resolve_principal, DecisionKey, Identity, Principal, Target};
use crate::errors::AppError;
use crate::events::log_activity;
use crate::identity::GatewayIdentity;
use crate::models::decision::{BypassAudit, Decision};
use crate::models::permission::Resource;
use crate::models::role::parse_action;

pub fn routes() -> Router<AppState> {
    Router::new().route("/authz/check", post(check))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckRequest {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    /// Principal facts, if the caller already resolved them. When all three
    /// are absent, gateway membership headers are consulted next, then the
    /// membership directory.
    pub team_ids: Option<Vec<Uuid>>,
    pub role_ids: Option<Vec<Uuid>>,
    pub is_super_admin: Option<bool>,
    #[schema(example = "finance")]
    pub resource: String,
    #[schema(example = "update")]
    pub action: String,
    pub target: Target,
}

impl CheckRequest {
    fn carries_principal_facts(&self) -> bool {
        self.team_ids.is_some() || self.role_ids.is_some() || self.is_super_admin.is_some()
    }
}

fn principal_from_facts(
    user_id: Uuid,
    tenant_id: Uuid,
    team_ids: Option<Vec<Uuid>>,
    role_ids: Option<Vec<Uuid>>,
    is_super_admin: Option<bool>,
) -> Principal {
    let mut principal = Principal::new(user_id, tenant_id)
        .with_teams(team_ids.unwrap_or_default())
        .with_roles(role_ids.unwrap_or_default());
    if is_super_admin.unwrap_or(false) {
        principal = principal.super_admin();
    }
    principal
}

/// Evaluate one authorization check
///
/// Deny is a 200 with `allowed: false`; only malformed input is an error.
#[utoipa::path(
    post,
    path = "/authz/check",
    tag = "Authorization",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Decision", body = Decision),
        (status = 400, description = "Malformed resource or unknown action literal"),
        (status = 404, description = "Unknown tenant"),
    )
)]
pub(crate) async fn check(
    State(state): State<AppState>,
    gateway: GatewayIdentity,
    Json(req): Json<CheckRequest>,
) -> Result<Json<Decision>, AppError> {
    let resource = Resource::new(&req.resource)?;
    let action = parse_action(&req.action)?;

    let principal = if req.carries_principal_facts() {
        principal_from_facts(
            req.user_id,
            req.tenant_id,
            req.team_ids,
            req.role_ids,
            req.is_super_admin,
        )
    } else if gateway.carries_membership_facts() {
        principal_from_facts(
            req.user_id,
            req.tenant_id,
            gateway.team_ids,
            gateway.role_ids,
            gateway.is_super_admin,
        )
    } else {
        let identity = Identity {
            user_id: req.user_id,
            tenant_id: req.tenant_id,
        };
        resolve_principal(identity, state.directory.as_ref()).await?
    };

    let registry = state.registries.get(principal.tenant_id).ok_or_else(|| {
        AppError::unknown_tenant(format!(
            "tenant {} is not provisioned",
            principal.tenant_id
        ))
    })?;
    let snapshot = registry.snapshot();

    // Bypasses never touch the cache: the decision is O(1) anyway, and every
    // single one must land in the audit stream.
    if principal.is_super_admin {
        let decision = can_perform(&principal, &snapshot, &resource, action, &req.target)?;
        if decision.allowed {
            let audit = BypassAudit {
                user_id: principal.user_id,
                tenant_id: principal.tenant_id,
                resource: resource.as_str().to_string(),
                action: req.action.trim().to_lowercase(),
            };
            log_activity(&state.event_bus, "bypassed", Some(principal.user_id), &audit);
        }
        return Ok(Json(decision));
    }

    let key = DecisionKey::new(&principal, snapshot.version(), &resource, action, &req.target);
    if let Some(decision) = state.cache.get(&key) {
        return Ok(Json(decision));
    }

    let decision = can_perform(&principal, &snapshot, &resource, action, &req.target)?;
    state.cache.put(key, decision);

    Ok(Json(decision))
}
