use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::models::permission::{Action, Permission, Resource, Scope};

// =============================================================================
// ROLE
// =============================================================================

/// Whether a role was seeded by the product or created by a tenant admin.
/// A role is exactly one of the two by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    System,
    Custom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    /// Derived from `name`: lowercase, whitespace collapsed to `_`. Unique
    /// among non-archived roles of a tenant.
    pub slug: String,
    pub description: Option<String>,
    /// At most one entry per resource; enforced by merge-on-write.
    pub permissions: Vec<Permission>,
    pub kind: RoleKind,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub users_count: u32,
    pub sort_order: u32,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_system(&self) -> bool {
        self.kind == RoleKind::System
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// The permission entry for `resource`, if any.
    pub fn permission_for(&self, resource: &Resource) -> Option<&Permission> {
        self.permissions.iter().find(|p| &p.resource == resource)
    }
}

/// API-facing view of a role. Exposes the system/custom split as the pair of
/// booleans the dashboard UI expects.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleView {
    pub id: Uuid,
    pub name: String,
    #[schema(example = "sales_manager")]
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub permissions: Vec<Permission>,
    pub is_system_role: bool,
    pub is_custom_role: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub users_count: u32,
    pub sort_order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Role> for RoleView {
    fn from(role: &Role) -> Self {
        RoleView {
            id: role.id,
            name: role.name.clone(),
            slug: role.slug.clone(),
            description: role.description.clone(),
            permissions: role.permissions.clone(),
            is_system_role: role.kind == RoleKind::System,
            is_custom_role: role.kind == RoleKind::Custom,
            color: role.color.clone(),
            icon: role.icon.clone(),
            users_count: role.users_count,
            sort_order: role.sort_order,
            archived_at: role.archived_at,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

impl Loggable for RoleView {
    fn entity_type() -> &'static str {
        "role"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

/// Derives the unique slug for a role name: lowercase, runs of whitespace
/// collapsed to a single underscore.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '_' {
            pending_sep = !slug.is_empty();
        } else {
            if pending_sep {
                slug.push('_');
                pending_sep = false;
            }
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        }
    }
    slug
}

// =============================================================================
// ADMIN API REQUESTS
// =============================================================================

/// One row of the role form's permission grid: a module with the actions
/// ticked for it and the chosen scope, all as free text from the UI.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GrantInput {
    #[schema(example = "finance")]
    pub module: String,
    #[schema(example = json!(["read", "update"]))]
    pub actions: Vec<String>,
    #[schema(example = "team")]
    pub scope: String,
}

impl GrantInput {
    /// Translates the UI tuple into a typed [`Permission`]. Unknown action or
    /// scope literals are caller errors, not grants.
    pub fn into_permission(self) -> Result<Permission, AppError> {
        let resource = Resource::new(&self.module)?;
        let mut actions = Vec::with_capacity(self.actions.len());
        for raw in &self.actions {
            actions.push(parse_action(raw)?);
        }
        let scope = parse_scope(&self.scope)?;
        Ok(Permission::new(resource, actions, scope))
    }
}

pub fn parse_action(raw: &str) -> Result<Action, AppError> {
    match raw.trim().to_lowercase().as_str() {
        "read" => Ok(Action::Read),
        "create" => Ok(Action::Create),
        "update" => Ok(Action::Update),
        "delete" => Ok(Action::Delete),
        "export" => Ok(Action::Export),
        "approve" => Ok(Action::Approve),
        other => Err(AppError::invalid_request(format!(
            "unknown action '{other}'"
        ))),
    }
}

pub fn parse_scope(raw: &str) -> Result<Scope, AppError> {
    match raw.trim().to_lowercase().as_str() {
        "personal" => Ok(Scope::Personal),
        "team" => Ok(Scope::Team),
        "tenant" => Ok(Scope::Tenant),
        "global" => Ok(Scope::Global),
        other => Err(AppError::invalid_request(format!("unknown scope '{other}'"))),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "Sales Manager")]
    pub name: String,
    #[schema(example = "Manages client accounts and sales pipeline")]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<GrantInput>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    /// When present, replaces the role's permission list wholesale.
    pub permissions: Option<Vec<GrantInput>>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderRequest {
    /// Every active role id of the tenant, in the desired display order.
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UsersCountRequest {
    pub users_count: u32,
}
