//! Role Administration API.
//!
//! Thin validated facade over the per-tenant role registry for the
//! role-management UI: translates the form's grant tuples into typed
//! permissions before delegating, and maps engine errors to structured
//! responses. Every successful mutation is published on the activity bus.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;
use crate::events::{log_activity_with_context, Loggable, RequestContext, Severity};
use crate::identity::GatewayIdentity;
use crate::models::permission::Permission;
use crate::models::role::{
    ReorderRequest, RoleCreateRequest, RoleUpdateRequest, RoleView, UsersCountRequest,
};
use crate::registry::{RoleDraft, RolePatch, RoleRegistry};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants/:tenant_id/roles",
            get(list_roles).post(create_role),
        )
        .route("/tenants/:tenant_id/roles/reorder", put(reorder_roles))
        .route(
            "/tenants/:tenant_id/roles/:role_id",
            get(get_role).put(update_role).delete(archive_role),
        )
        .route(
            "/tenants/:tenant_id/roles/:role_id/users-count",
            put(set_users_count),
        )
}

#[derive(Debug, Deserialize)]
pub struct ListRolesQuery {
    #[serde(default)]
    pub include_archived: bool,
}

/// List a tenant's roles in display order
#[utoipa::path(
    get,
    path = "/tenants/{tenant_id}/roles",
    tag = "Roles",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant ID"),
        ("include_archived" = Option<bool>, Query, description = "Include archived roles"),
    ),
    responses(
        (status = 200, description = "Roles in display order", body = Vec<RoleView>),
        (status = 404, description = "Unknown tenant"),
    )
)]
pub(crate) async fn list_roles(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<ListRolesQuery>,
) -> Result<Json<Vec<RoleView>>, AppError> {
    let registry = tenant_registry(&state, tenant_id)?;
    let roles = registry
        .list_all(query.include_archived)
        .iter()
        .map(|role| RoleView::from(role.as_ref()))
        .collect();
    Ok(Json(roles))
}

/// Create a custom role
#[utoipa::path(
    post,
    path = "/tenants/{tenant_id}/roles",
    tag = "Roles",
    params(("tenant_id" = Uuid, Path, description = "Tenant ID")),
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = RoleView),
        (status = 400, description = "Invalid permission or request"),
        (status = 404, description = "Unknown tenant"),
        (status = 409, description = "Slug already taken by an active role"),
    )
)]
pub(crate) async fn create_role(
    State(state): State<AppState>,
    actor: GatewayIdentity,
    headers: HeaderMap,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<RoleCreateRequest>,
) -> Result<(StatusCode, Json<RoleView>), AppError> {
    let permissions = translate_grants(req.permissions)?;
    let registry = tenant_registry(&state, tenant_id)?;

    let role = registry.create(RoleDraft {
        name: req.name,
        description: req.description,
        permissions,
        color: req.color,
        icon: req.icon,
    })?;

    let view = RoleView::from(role.as_ref());
    log_activity_with_context(
        &state.event_bus,
        "created",
        actor.user_id,
        &view,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(view)))
}

/// Get one role, archived included
#[utoipa::path(
    get,
    path = "/tenants/{tenant_id}/roles/{role_id}",
    tag = "Roles",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant ID"),
        ("role_id" = Uuid, Path, description = "Role ID"),
    ),
    responses(
        (status = 200, description = "Role details", body = RoleView),
        (status = 404, description = "Unknown tenant or role"),
    )
)]
pub(crate) async fn get_role(
    State(state): State<AppState>,
    Path((tenant_id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RoleView>, AppError> {
    let registry = tenant_registry(&state, tenant_id)?;
    let role = registry
        .get(role_id)
        .ok_or_else(|| AppError::role_not_found(format!("no role with id {role_id}")))?;
    Ok(Json(RoleView::from(role.as_ref())))
}

/// Update a custom role
#[utoipa::path(
    put,
    path = "/tenants/{tenant_id}/roles/{role_id}",
    tag = "Roles",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant ID"),
        ("role_id" = Uuid, Path, description = "Role ID"),
    ),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleView),
        (status = 403, description = "System roles are immutable"),
        (status = 404, description = "Unknown tenant or role"),
        (status = 409, description = "Slug already taken by an active role"),
    )
)]
pub(crate) async fn update_role(
    State(state): State<AppState>,
    actor: GatewayIdentity,
    headers: HeaderMap,
    Path((tenant_id, role_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RoleUpdateRequest>,
) -> Result<Json<RoleView>, AppError> {
    let permissions = req.permissions.map(translate_grants).transpose()?;
    let registry = tenant_registry(&state, tenant_id)?;
    let old = registry.get(role_id).map(|r| RoleView::from(r.as_ref()));

    let role = registry.update(
        role_id,
        RolePatch {
            name: req.name,
            description: req.description,
            permissions,
            color: req.color,
            icon: req.icon,
        },
    )?;

    let view = RoleView::from(role.as_ref());
    log_activity_with_context(
        &state.event_bus,
        "updated",
        actor.user_id,
        &view,
        old.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(view))
}

/// Archive (soft-delete) a custom role
#[utoipa::path(
    delete,
    path = "/tenants/{tenant_id}/roles/{role_id}",
    tag = "Roles",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant ID"),
        ("role_id" = Uuid, Path, description = "Role ID"),
    ),
    responses(
        (status = 204, description = "Role archived"),
        (status = 403, description = "System roles cannot be archived"),
        (status = 404, description = "Unknown tenant or role"),
        (status = 409, description = "Role still has assigned users"),
    )
)]
pub(crate) async fn archive_role(
    State(state): State<AppState>,
    actor: GatewayIdentity,
    headers: HeaderMap,
    Path((tenant_id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let registry = tenant_registry(&state, tenant_id)?;
    let role = registry.archive(role_id)?;

    let view = RoleView::from(role.as_ref());
    log_activity_with_context(
        &state.event_bus,
        "archived",
        actor.user_id,
        &view,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Subject of a reorder event: the tenant whose display order changed.
#[derive(Debug, Serialize)]
struct RoleOrder {
    tenant_id: Uuid,
    role_ids: Vec<Uuid>,
}

impl Loggable for RoleOrder {
    fn entity_type() -> &'static str {
        "role_order"
    }
    fn subject_id(&self) -> Uuid {
        self.tenant_id
    }
    fn severity(&self) -> Severity {
        Severity::Noise
    }
}

/// Rewrite the display order of all active roles, atomically
#[utoipa::path(
    put,
    path = "/tenants/{tenant_id}/roles/reorder",
    tag = "Roles",
    params(("tenant_id" = Uuid, Path, description = "Tenant ID")),
    request_body = ReorderRequest,
    responses(
        (status = 204, description = "Order rewritten"),
        (status = 400, description = "List does not cover the active role set exactly"),
        (status = 404, description = "Unknown tenant, or unknown or archived role id"),
    )
)]
pub(crate) async fn reorder_roles(
    State(state): State<AppState>,
    actor: GatewayIdentity,
    headers: HeaderMap,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<ReorderRequest>,
) -> Result<StatusCode, AppError> {
    let registry = tenant_registry(&state, tenant_id)?;
    registry.reorder(&req.role_ids)?;

    let order = RoleOrder {
        tenant_id,
        role_ids: req.role_ids,
    };
    log_activity_with_context(
        &state.event_bus,
        "rewritten",
        actor.user_id,
        &order,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Record the number of users assigned to a role
///
/// Called by the assignment collaborator; the registry only tracks the count
/// so archival can enforce its zero-users precondition.
#[utoipa::path(
    put,
    path = "/tenants/{tenant_id}/roles/{role_id}/users-count",
    tag = "Roles",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant ID"),
        ("role_id" = Uuid, Path, description = "Role ID"),
    ),
    request_body = UsersCountRequest,
    responses(
        (status = 200, description = "Count recorded", body = RoleView),
        (status = 404, description = "Unknown tenant or role"),
    )
)]
pub(crate) async fn set_users_count(
    State(state): State<AppState>,
    actor: GatewayIdentity,
    headers: HeaderMap,
    Path((tenant_id, role_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UsersCountRequest>,
) -> Result<Json<RoleView>, AppError> {
    let registry = tenant_registry(&state, tenant_id)?;
    let old = registry.get(role_id).map(|r| RoleView::from(r.as_ref()));
    let role = registry.set_users_count(role_id, req.users_count)?;

    let view = RoleView::from(role.as_ref());
    log_activity_with_context(
        &state.event_bus,
        "updated",
        actor.user_id,
        &view,
        old.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(view))
}

fn tenant_registry(state: &AppState, tenant_id: Uuid) -> Result<Arc<RoleRegistry>, AppError> {
    state
        .registries
        .get(tenant_id)
        .ok_or_else(|| AppError::unknown_tenant(format!("tenant {tenant_id} is not provisioned")))
}

fn translate_grants(
    grants: Vec<crate::models::role::GrantInput>,
) -> Result<Vec<Permission>, AppError> {
    grants
        .into_iter()
        .map(|grant| grant.into_permission())
        .collect()
}
