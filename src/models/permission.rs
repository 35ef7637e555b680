use std::collections::BTreeSet;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

// =============================================================================
// RESOURCE
// =============================================================================

/// An opaque identifier naming a protected dashboard module (e.g. "finance").
///
/// Resources are open-ended: new modules register themselves in the
/// [`ResourceCatalog`] at startup instead of requiring a new enum variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Resource(String);

impl Resource {
    /// Normalizes (trim + lowercase) without validating against the catalog.
    /// Catalog membership is checked in [`Permission::validate`].
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AppError> {
        let normalized = raw.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AppError::invalid_request("resource must not be empty"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The dashboard modules shipped with the product.
pub const DEFAULT_MODULES: &[&str] = &[
    "projects", "finance", "clients", "courses", "services", "reports", "settings",
];

/// Registrable set of known resources.
///
/// Permission validation rejects resources outside the catalog so a typo in a
/// role form never silently becomes a grant on a module that does not exist.
#[derive(Debug)]
pub struct ResourceCatalog {
    entries: RwLock<BTreeSet<String>>,
}

impl ResourceCatalog {
    pub fn with_defaults() -> Self {
        let entries = DEFAULT_MODULES.iter().map(|m| m.to_string()).collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(BTreeSet::new()),
        }
    }

    /// Registers a new module; idempotent.
    pub fn register(&self, resource: &Resource) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(resource.as_str().to_string());
    }

    pub fn contains(&self, resource: &Resource) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains(resource.as_str())
    }

    pub fn list(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }
}

// =============================================================================
// ACTION & SCOPE
// =============================================================================

/// The fixed verb vocabulary. Actions are resource-agnostic; callers are
/// responsible for only asking about meaningful (resource, action) pairs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Export,
    Approve,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Export,
        Action::Approve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Export => "export",
            Action::Approve => "approve",
        }
    }
}

/// Breadth of a grant, narrowest to broadest. `Ord` follows breadth, so the
/// broader of two scopes is simply `a.max(b)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Personal,
    Team,
    Tenant,
    Global,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Personal => "personal",
            Scope::Team => "team",
            Scope::Tenant => "tenant",
            Scope::Global => "global",
        }
    }

    pub fn broader_of(self, other: Scope) -> Scope {
        self.max(other)
    }
}

// =============================================================================
// PERMISSION
// =============================================================================

/// A single grant: a set of actions on one resource at one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    #[schema(example = "finance")]
    pub resource: Resource,
    /// Invariant: never empty. An empty action set is rejected at creation.
    pub actions: BTreeSet<Action>,
    pub scope: Scope,
}

impl Permission {
    pub fn new(
        resource: Resource,
        actions: impl IntoIterator<Item = Action>,
        scope: Scope,
    ) -> Self {
        Self {
            resource,
            actions: actions.into_iter().collect(),
            scope,
        }
    }

    /// Side-effect-free validation against the permission invariants and the
    /// resource catalog.
    pub fn validate(&self, catalog: &ResourceCatalog) -> Result<(), AppError> {
        if self.resource.as_str().trim().is_empty() {
            return Err(AppError::invalid_permission("resource must not be empty"));
        }
        if self.actions.is_empty() {
            return Err(AppError::invalid_permission(format!(
                "permission on '{}' has an empty action set",
                self.resource
            )));
        }
        if !catalog.contains(&self.resource) {
            return Err(AppError::invalid_permission(format!(
                "unknown resource '{}'",
                self.resource
            )));
        }
        Ok(())
    }

    /// Merges two grants on the same resource: actions union, broader scope
    /// wins. Idempotent.
    pub fn merge(&self, other: &Permission) -> Result<Permission, AppError> {
        if self.resource != other.resource {
            return Err(AppError::resource_mismatch(format!(
                "cannot merge permission on '{}' with permission on '{}'",
                self.resource, other.resource
            )));
        }
        let actions = self.actions.union(&other.actions).copied().collect();
        Ok(Permission {
            resource: self.resource.clone(),
            actions,
            scope: self.scope.broader_of(other.scope),
        })
    }

    pub fn allows(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// Folds a permission list so each resource appears at most once, merging
/// duplicates per [`Permission::merge`]. Order of first appearance is kept.
pub fn dedupe_permissions(permissions: Vec<Permission>) -> Result<Vec<Permission>, AppError> {
    let mut merged: Vec<Permission> = Vec::with_capacity(permissions.len());
    for perm in permissions {
        match merged.iter_mut().find(|p| p.resource == perm.resource) {
            Some(existing) => *existing = existing.merge(&perm)?,
            None => merged.push(perm),
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(name: &str) -> Resource {
        Resource::new(name).unwrap()
    }

    #[test]
    fn resource_normalizes_and_rejects_empty() {
        assert_eq!(res("  Finance ").as_str(), "finance");
        assert!(Resource::new("   ").is_err());
    }

    #[test]
    fn validate_rejects_empty_actions() {
        let catalog = ResourceCatalog::with_defaults();
        let perm = Permission::new(res("finance"), [], Scope::Team);
        assert!(matches!(
            perm.validate(&catalog),
            Err(AppError::InvalidPermission(_))
        ));
    }

    #[test]
    fn validate_rejects_unknown_resource() {
        let catalog = ResourceCatalog::with_defaults();
        let perm = Permission::new(res("spaceships"), [Action::Read], Scope::Global);
        assert!(matches!(
            perm.validate(&catalog),
            Err(AppError::InvalidPermission(_))
        ));

        catalog.register(&res("spaceships"));
        assert!(perm.validate(&catalog).is_ok());
    }

    #[test]
    fn merge_unions_actions_and_takes_broader_scope() {
        let a = Permission::new(res("finance"), [Action::Read], Scope::Team);
        let b = Permission::new(res("finance"), [Action::Update], Scope::Global);

        let merged = a.merge(&b).unwrap();
        assert_eq!(
            merged.actions,
            BTreeSet::from([Action::Read, Action::Update])
        );
        assert_eq!(merged.scope, Scope::Global);
    }

    #[test]
    fn merge_is_idempotent() {
        let a = Permission::new(res("finance"), [Action::Read], Scope::Team);
        let b = Permission::new(res("finance"), [Action::Update, Action::Export], Scope::Tenant);

        let once = a.merge(&b).unwrap();
        let twice = once.merge(&b).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_rejects_resource_mismatch() {
        let a = Permission::new(res("finance"), [Action::Read], Scope::Team);
        let b = Permission::new(res("projects"), [Action::Read], Scope::Team);
        assert!(matches!(a.merge(&b), Err(AppError::ResourceMismatch(_))));
    }

    #[test]
    fn scope_ordering_is_broadest_last() {
        assert!(Scope::Global > Scope::Tenant);
        assert!(Scope::Tenant > Scope::Team);
        assert!(Scope::Team > Scope::Personal);
        assert_eq!(Scope::Team.broader_of(Scope::Tenant), Scope::Tenant);
    }

    #[test]
    fn dedupe_merges_same_resource_entries() {
        let perms = vec![
            Permission::new(res("finance"), [Action::Read], Scope::Team),
            Permission::new(res("projects"), [Action::Read], Scope::Personal),
            Permission::new(res("finance"), [Action::Update], Scope::Global),
        ];
        let deduped = dedupe_permissions(perms).unwrap();
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].resource, res("finance"));
        assert_eq!(
            deduped[0].actions,
            BTreeSet::from([Action::Read, Action::Update])
        );
        assert_eq!(deduped[0].scope, Scope::Global);
    }
}
