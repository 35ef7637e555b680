//! Per-tenant role registry.
//!
//! Each tenant owns an isolated [`RoleRegistry`]: a copy-on-write snapshot of
//! its roles behind one `RwLock`, plus a monotonically increasing version
//! counter. Every mutation rewrites the snapshot and bumps the version inside
//! the same write guard, so a reader never observes a role change without the
//! matching version bump (or the reverse). The version is what keys cached
//! authorization decisions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::permission::{
    dedupe_permissions, Action, Permission, Resource, ResourceCatalog, Scope,
};
use crate::models::role::{slugify, Role, RoleKind};

/// Registry input for role creation, already translated from the UI DTO.
#[derive(Debug, Clone)]
pub struct RoleDraft {
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<Permission>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// Registry input for role updates. `None` fields are left untouched;
/// `permissions` replaces the list wholesale when present.
#[derive(Debug, Clone, Default)]
pub struct RolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<Permission>>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// An immutable view of one tenant's roles at a point in time.
///
/// The evaluator works against a snapshot, never the live registry, which is
/// what keeps `can_perform` pure and safe under concurrent mutation.
#[derive(Debug)]
pub struct RegistrySnapshot {
    tenant_id: Uuid,
    version: u64,
    roles: Vec<Arc<Role>>,
}

impl RegistrySnapshot {
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn role(&self, id: Uuid) -> Option<&Arc<Role>> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// Non-archived roles in display order.
    pub fn active(&self) -> Vec<Arc<Role>> {
        let mut roles: Vec<Arc<Role>> = self
            .roles
            .iter()
            .filter(|r| !r.is_archived())
            .cloned()
            .collect();
        roles.sort_by_key(|r| r.sort_order);
        roles
    }

    /// Every role, archived included, for audit reads.
    pub fn all(&self) -> &[Arc<Role>] {
        &self.roles
    }
}

pub struct RoleRegistry {
    tenant_id: Uuid,
    catalog: Arc<ResourceCatalog>,
    inner: RwLock<Arc<RegistrySnapshot>>,
}

impl RoleRegistry {
    /// Builds a registry seeded with the immutable system roles.
    pub fn new(tenant_id: Uuid, catalog: Arc<ResourceCatalog>) -> Self {
        let roles = seed_system_roles(&catalog);
        let snapshot = Arc::new(RegistrySnapshot {
            tenant_id,
            version: 1,
            roles,
        });
        Self {
            tenant_id,
            catalog,
            inner: RwLock::new(snapshot),
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Cheap read: clones the current snapshot handle.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Role>> {
        self.snapshot().role(id).cloned()
    }

    pub fn list_active(&self) -> Vec<Arc<Role>> {
        self.snapshot().active()
    }

    pub fn list_all(&self, include_archived: bool) -> Vec<Arc<Role>> {
        if include_archived {
            let mut roles = self.snapshot().all().to_vec();
            roles.sort_by_key(|r| r.sort_order);
            roles
        } else {
            self.list_active()
        }
    }

    pub fn create(&self, draft: RoleDraft) -> Result<Arc<Role>, AppError> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid_request("role name must not be empty"));
        }
        let slug = slugify(&name);
        if slug.is_empty() {
            return Err(AppError::invalid_request(
                "role name must contain at least one non-separator character",
            ));
        }

        for perm in &draft.permissions {
            perm.validate(&self.catalog)?;
        }
        let permissions = dedupe_permissions(draft.permissions)?;

        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let current = guard.clone();

        if current
            .roles
            .iter()
            .any(|r| !r.is_archived() && r.slug == slug)
        {
            return Err(AppError::duplicate_slug(format!(
                "an active role with slug '{slug}' already exists"
            )));
        }

        let next_sort = current
            .roles
            .iter()
            .filter(|r| !r.is_archived())
            .map(|r| r.sort_order)
            .max()
            .unwrap_or(0)
            + 1;

        let now = Utc::now();
        let role = Arc::new(Role {
            id: Uuid::new_v4(),
            name,
            slug,
            description: draft.description,
            permissions,
            kind: RoleKind::Custom,
            color: draft.color,
            icon: draft.icon,
            users_count: 0,
            sort_order: next_sort,
            archived_at: None,
            created_at: now,
            updated_at: now,
        });

        let mut roles = current.roles.clone();
        roles.push(role.clone());
        *guard = Arc::new(RegistrySnapshot {
            tenant_id: current.tenant_id,
            version: current.version + 1,
            roles,
        });

        Ok(role)
    }

    pub fn update(&self, id: Uuid, patch: RolePatch) -> Result<Arc<Role>, AppError> {
        let permissions = match patch.permissions {
            Some(perms) => {
                for perm in &perms {
                    perm.validate(&self.catalog)?;
                }
                Some(dedupe_permissions(perms)?)
            }
            None => None,
        };

        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let current = guard.clone();

        let existing = current
            .roles
            .iter()
            .find(|r| r.id == id && !r.is_archived())
            .ok_or_else(|| AppError::role_not_found(format!("no active role with id {id}")))?;

        if existing.is_system() {
            return Err(AppError::system_role_immutable(format!(
                "system role '{}' cannot be modified",
                existing.slug
            )));
        }

        let mut updated = (**existing).clone();
        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(AppError::invalid_request("role name must not be empty"));
            }
            let slug = slugify(&name);
            if slug.is_empty() {
                return Err(AppError::invalid_request(
                    "role name must contain at least one non-separator character",
                ));
            }
            if current
                .roles
                .iter()
                .any(|r| r.id != id && !r.is_archived() && r.slug == slug)
            {
                return Err(AppError::duplicate_slug(format!(
                    "an active role with slug '{slug}' already exists"
                )));
            }
            updated.name = name;
            updated.slug = slug;
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(perms) = permissions {
            updated.permissions = perms;
        }
        if let Some(color) = patch.color {
            updated.color = Some(color);
        }
        if let Some(icon) = patch.icon {
            updated.icon = Some(icon);
        }
        updated.updated_at = Utc::now();
        let updated = Arc::new(updated);

        let roles = replace_role(&current.roles, updated.clone());
        *guard = Arc::new(RegistrySnapshot {
            tenant_id: current.tenant_id,
            version: current.version + 1,
            roles,
        });

        Ok(updated)
    }

    /// Soft delete. The role disappears from principal resolution but stays
    /// in the snapshot for audit reads.
    pub fn archive(&self, id: Uuid) -> Result<Arc<Role>, AppError> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let current = guard.clone();

        let existing = current
            .roles
            .iter()
            .find(|r| r.id == id && !r.is_archived())
            .ok_or_else(|| AppError::role_not_found(format!("no active role with id {id}")))?;

        if existing.is_system() {
            return Err(AppError::system_role_immutable(format!(
                "system role '{}' cannot be archived",
                existing.slug
            )));
        }
        if existing.users_count > 0 {
            return Err(AppError::role_in_use(format!(
                "role '{}' still has {} assigned users",
                existing.slug, existing.users_count
            )));
        }

        let mut archived = (**existing).clone();
        let now = Utc::now();
        archived.archived_at = Some(now);
        archived.updated_at = now;
        let archived = Arc::new(archived);

        let roles = replace_role(&current.roles, archived.clone());
        *guard = Arc::new(RegistrySnapshot {
            tenant_id: current.tenant_id,
            version: current.version + 1,
            roles,
        });

        Ok(archived)
    }

    /// Rewrites display order, all-or-nothing. `ids` must name exactly the
    /// active role set; a reader mid-reorder must never observe a duplicate
    /// or missing `sort_order`.
    pub fn reorder(&self, ids: &[Uuid]) -> Result<(), AppError> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let current = guard.clone();

        let active: HashSet<Uuid> = current
            .roles
            .iter()
            .filter(|r| !r.is_archived())
            .map(|r| r.id)
            .collect();

        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !active.contains(id) {
                return Err(AppError::role_not_found(format!(
                    "no active role with id {id}"
                )));
            }
            if !seen.insert(*id) {
                return Err(AppError::invalid_request(format!(
                    "role id {id} appears more than once"
                )));
            }
        }
        if seen.len() != active.len() {
            return Err(AppError::invalid_request(
                "reorder must list every active role exactly once",
            ));
        }

        let order: HashMap<Uuid, u32> = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx as u32 + 1))
            .collect();

        let now = Utc::now();
        let roles = current
            .roles
            .iter()
            .map(|role| match order.get(&role.id) {
                Some(&sort_order) if sort_order != role.sort_order => {
                    let mut reordered = (**role).clone();
                    reordered.sort_order = sort_order;
                    reordered.updated_at = now;
                    Arc::new(reordered)
                }
                _ => role.clone(),
            })
            .collect();

        *guard = Arc::new(RegistrySnapshot {
            tenant_id: current.tenant_id,
            version: current.version + 1,
            roles,
        });

        Ok(())
    }

    /// Assignment-collaborator hook. Counts are maintained externally; the
    /// registry only records them so `archive` can enforce `RoleInUse`.
    /// Bumps the version: assignment changes what principals resolve to, and
    /// the bump is what retires cached decisions.
    pub fn set_users_count(&self, id: Uuid, users_count: u32) -> Result<Arc<Role>, AppError> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let current = guard.clone();

        let existing = current
            .roles
            .iter()
            .find(|r| r.id == id && !r.is_archived())
            .ok_or_else(|| AppError::role_not_found(format!("no active role with id {id}")))?;

        let mut updated = (**existing).clone();
        updated.users_count = users_count;
        updated.updated_at = Utc::now();
        let updated = Arc::new(updated);

        let roles = replace_role(&current.roles, updated.clone());
        *guard = Arc::new(RegistrySnapshot {
            tenant_id: current.tenant_id,
            version: current.version + 1,
            roles,
        });

        Ok(updated)
    }
}

fn replace_role(roles: &[Arc<Role>], replacement: Arc<Role>) -> Vec<Arc<Role>> {
    roles
        .iter()
        .map(|r| {
            if r.id == replacement.id {
                replacement.clone()
            } else {
                r.clone()
            }
        })
        .collect()
}

/// Seeded, immutable, always-present roles: Owner grants everything at
/// global scope, Admin everything within the tenant.
fn seed_system_roles(catalog: &ResourceCatalog) -> Vec<Arc<Role>> {
    let now = Utc::now();
    let all_modules = |scope: Scope| -> Vec<Permission> {
        catalog
            .list()
            .into_iter()
            .map(|module| {
                // catalog entries are already normalized
                let resource = Resource::new(&module).expect("catalog entry is non-empty");
                Permission::new(resource, Action::ALL, scope)
            })
            .collect()
    };

    let system = |name: &str, description: &str, scope: Scope, sort_order: u32| {
        Arc::new(Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slugify(name),
            description: Some(description.to_string()),
            permissions: all_modules(scope),
            kind: RoleKind::System,
            color: None,
            icon: None,
            users_count: 0,
            sort_order,
            archived_at: None,
            created_at: now,
            updated_at: now,
        })
    };

    vec![
        system("Owner", "Full access across every workspace", Scope::Global, 1),
        system("Admin", "Full access within the tenant", Scope::Tenant, 2),
    ]
}

/// The set of tenant registries. Tenants never share a registry, so
/// cross-tenant mutations never contend and roles cannot leak between
/// tenants by construction.
pub struct TenantRegistries {
    catalog: Arc<ResourceCatalog>,
    registries: RwLock<HashMap<Uuid, Arc<RoleRegistry>>>,
}

impl TenantRegistries {
    pub fn new(catalog: Arc<ResourceCatalog>) -> Self {
        Self {
            catalog,
            registries: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<ResourceCatalog> {
        &self.catalog
    }

    /// The registry for an already-provisioned tenant.
    pub fn get(&self, tenant_id: Uuid) -> Option<Arc<RoleRegistry>> {
        let registries = self.registries.read().unwrap_or_else(|e| e.into_inner());
        registries.get(&tenant_id).cloned()
    }

    /// Provisions the tenant's registry, seeding system roles on first touch.
    pub fn get_or_create(&self, tenant_id: Uuid) -> Arc<RoleRegistry> {
        {
            let registries = self.registries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(registry) = registries.get(&tenant_id) {
                return registry.clone();
            }
        }
        let mut registries = self.registries.write().unwrap_or_else(|e| e.into_inner());
        registries
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(RoleRegistry::new(tenant_id, self.catalog.clone())))
            .clone()
    }

    pub fn tenant_count(&self) -> usize {
        self.registries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn registry() -> RoleRegistry {
        RoleRegistry::new(
            Uuid::new_v4(),
            Arc::new(ResourceCatalog::with_defaults()),
        )
    }

    fn draft(name: &str, permissions: Vec<Permission>) -> RoleDraft {
        RoleDraft {
            name: name.to_string(),
            description: None,
            permissions,
            color: None,
            icon: None,
        }
    }

    fn finance(actions: &[Action], scope: Scope) -> Permission {
        Permission::new(
            Resource::new("finance").unwrap(),
            actions.iter().copied(),
            scope,
        )
    }

    #[test]
    fn seeds_owner_and_admin() {
        let registry = registry();
        let active = registry.list_active();
        let slugs: Vec<&str> = active.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["owner", "admin"]);
        assert!(active.iter().all(|r| r.is_system()));
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn create_assigns_slug_and_next_sort_order() {
        let registry = registry();
        let role = registry
            .create(draft("Sales Manager", vec![]))
            .unwrap();
        assert_eq!(role.slug, "sales_manager");
        assert_eq!(role.sort_order, 3);
        assert_eq!(role.kind, RoleKind::Custom);
        assert_eq!(role.users_count, 0);
        assert_eq!(registry.version(), 2);
    }

    #[test]
    fn create_rejects_duplicate_slug() {
        let registry = registry();
        registry.create(draft("Sales Manager", vec![])).unwrap();
        let err = registry.create(draft("sales   manager", vec![])).unwrap_err();
        assert!(matches!(err, AppError::DuplicateSlug(_)));
    }

    #[test]
    fn archived_role_frees_its_slug() {
        let registry = registry();
        let role = registry.create(draft("Auditor", vec![])).unwrap();
        registry.archive(role.id).unwrap();
        assert!(registry.create(draft("Auditor", vec![])).is_ok());
    }

    #[test]
    fn create_merges_duplicate_resource_entries() {
        let registry = registry();
        let role = registry
            .create(draft(
                "Accountant",
                vec![
                    finance(&[Action::Read], Scope::Team),
                    finance(&[Action::Update], Scope::Global),
                ],
            ))
            .unwrap();
        assert_eq!(role.permissions.len(), 1);
        assert_eq!(
            role.permissions[0].actions,
            BTreeSet::from([Action::Read, Action::Update])
        );
        assert_eq!(role.permissions[0].scope, Scope::Global);
    }

    #[test]
    fn update_remerges_replaced_permissions() {
        let registry = registry();
        let role = registry
            .create(draft("Accountant", vec![finance(&[Action::Read], Scope::Team)]))
            .unwrap();

        let updated = registry
            .update(
                role.id,
                RolePatch {
                    permissions: Some(vec![
                        finance(&[Action::Read], Scope::Team),
                        finance(&[Action::Update], Scope::Global),
                    ]),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.permissions.len(), 1);
        assert_eq!(
            updated.permissions[0].actions,
            BTreeSet::from([Action::Read, Action::Update])
        );
        assert_eq!(updated.permissions[0].scope, Scope::Global);
    }

    #[test]
    fn system_roles_reject_update_and_archive() {
        let registry = registry();
        let owner = registry.list_active()[0].clone();

        let err = registry
            .update(owner.id, RolePatch { name: Some("Root".into()), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, AppError::SystemRoleImmutable(_)));

        let err = registry.archive(owner.id).unwrap_err();
        assert!(matches!(err, AppError::SystemRoleImmutable(_)));
    }

    #[test]
    fn archive_rejects_role_in_use() {
        let registry = registry();
        let role = registry.create(draft("Accountant", vec![])).unwrap();
        registry.set_users_count(role.id, 3).unwrap();

        let err = registry.archive(role.id).unwrap_err();
        assert!(matches!(err, AppError::RoleInUse(_)));

        registry.set_users_count(role.id, 0).unwrap();
        assert!(registry.archive(role.id).is_ok());
    }

    #[test]
    fn update_unknown_or_archived_role_is_not_found() {
        let registry = registry();
        let err = registry
            .update(Uuid::new_v4(), RolePatch::default())
            .unwrap_err();
        assert!(matches!(err, AppError::RoleNotFound(_)));

        let role = registry.create(draft("Temp", vec![])).unwrap();
        registry.archive(role.id).unwrap();
        let err = registry.update(role.id, RolePatch::default()).unwrap_err();
        assert!(matches!(err, AppError::RoleNotFound(_)));
    }

    #[test]
    fn reorder_is_atomic() {
        let registry = registry();
        let a = registry.create(draft("Alpha", vec![])).unwrap();
        let b = registry.create(draft("Beta", vec![])).unwrap();
        let owner = registry.list_active()[0].id;
        let admin = registry.list_active()[1].id;
        let version_before = registry.version();

        // Partial list is rejected before any sort_order is touched.
        let err = registry.reorder(&[b.id, a.id]).unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        let err = registry.reorder(&[b.id, a.id, owner, Uuid::new_v4()]).unwrap_err();
        assert!(matches!(err, AppError::RoleNotFound(_)));
        assert_eq!(registry.version(), version_before);
        let order: Vec<Uuid> = registry.list_active().iter().map(|r| r.id).collect();
        assert_eq!(order, vec![owner, admin, a.id, b.id]);

        registry.reorder(&[b.id, a.id, admin, owner]).unwrap();
        let order: Vec<Uuid> = registry.list_active().iter().map(|r| r.id).collect();
        assert_eq!(order, vec![b.id, a.id, admin, owner]);
        assert_eq!(registry.version(), version_before + 1);
    }

    #[test]
    fn every_mutation_bumps_version() {
        let registry = registry();
        let v1 = registry.version();
        let role = registry.create(draft("Accountant", vec![])).unwrap();
        let v2 = registry.version();
        registry
            .update(role.id, RolePatch { description: Some("books".into()), ..Default::default() })
            .unwrap();
        let v3 = registry.version();
        registry.set_users_count(role.id, 1).unwrap();
        let v4 = registry.version();
        assert!(v1 < v2 && v2 < v3 && v3 < v4);
    }

    #[test]
    fn snapshot_is_stable_across_later_mutations() {
        let registry = registry();
        let snapshot = registry.snapshot();
        registry.create(draft("Later", vec![])).unwrap();
        // The old handle still sees only the seeded roles.
        assert_eq!(snapshot.active().len(), 2);
        assert_eq!(registry.snapshot().active().len(), 3);
    }

    #[test]
    fn tenants_are_isolated() {
        let registries = TenantRegistries::new(Arc::new(ResourceCatalog::with_defaults()));
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();

        let r1 = registries.get_or_create(t1);
        let r2 = registries.get_or_create(t2);
        r1.create(draft("Only In T1", vec![])).unwrap();

        assert_eq!(r1.list_active().len(), 3);
        assert_eq!(r2.list_active().len(), 2);
        assert!(Arc::ptr_eq(&registries.get_or_create(t1), &r1));
    }

    #[test]
    fn lookup_never_provisions() {
        let registries = TenantRegistries::new(Arc::new(ResourceCatalog::with_defaults()));
        let tenant = Uuid::new_v4();

        assert!(registries.get(tenant).is_none());
        assert_eq!(registries.tenant_count(), 0);

        let provisioned = registries.get_or_create(tenant);
        assert!(Arc::ptr_eq(&registries.get(tenant).unwrap(), &provisioned));
        assert_eq!(registries.tenant_count(), 1);
    }
}
