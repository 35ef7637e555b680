use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;

use super::principal::Principal;

/// The raw authenticated identity handed over by the session layer.
/// Authentication itself happened upstream; this is only the shape the
/// engine requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}

/// Tenant-membership facts for one user, as known to the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    pub team_ids: HashSet<Uuid>,
    pub role_ids: Vec<Uuid>,
    pub is_super_admin: bool,
}

/// Collaborator that knows tenant membership. Pluggable so deployments can
/// back it with their session store.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    /// `None` means the tenant itself is unknown. A known tenant where the
    /// user simply has nothing must return an empty membership instead.
    async fn membership(&self, user_id: Uuid, tenant_id: Uuid) -> Option<Membership>;
}

/// Assembles the per-request [`Principal`]. No caching of its own; decision
/// caching lives downstream.
pub async fn resolve_principal(
    identity: Identity,
    source: &dyn MembershipSource,
) -> Result<Principal, AppError> {
    let membership = source
        .membership(identity.user_id, identity.tenant_id)
        .await
        .ok_or_else(|| {
            AppError::unknown_tenant(format!("tenant {} cannot be resolved", identity.tenant_id))
        })?;

    // No roles is not an error: it resolves to an empty-permission principal
    // and the evaluator's default deny takes over.
    let mut principal = Principal::new(identity.user_id, identity.tenant_id)
        .with_teams(membership.team_ids)
        .with_roles(membership.role_ids);
    if membership.is_super_admin {
        principal = principal.super_admin();
    }
    Ok(principal)
}

/// In-memory membership source for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    inner: RwLock<DirectoryInner>,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    tenants: HashSet<Uuid>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tenant(&self, tenant_id: Uuid) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.tenants.insert(tenant_id);
    }

    pub fn upsert_membership(&self, user_id: Uuid, tenant_id: Uuid, membership: Membership) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.tenants.insert(tenant_id);
        inner.memberships.insert((user_id, tenant_id), membership);
    }
}

#[async_trait]
impl MembershipSource for StaticDirectory {
    async fn membership(&self, user_id: Uuid, tenant_id: Uuid) -> Option<Membership> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        if !inner.tenants.contains(&tenant_id) {
            return None;
        }
        Some(
            inner
                .memberships
                .get(&(user_id, tenant_id))
                .cloned()
                .unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tenant_fails_resolution() {
        let directory = StaticDirectory::new();
        let identity = Identity {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
        };

        let err = resolve_principal(identity, &directory).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownTenant(_)));
    }

    #[tokio::test]
    async fn user_without_roles_resolves_to_empty_principal() {
        let directory = StaticDirectory::new();
        let tenant = Uuid::new_v4();
        directory.register_tenant(tenant);

        let identity = Identity {
            user_id: Uuid::new_v4(),
            tenant_id: tenant,
        };
        let principal = resolve_principal(identity, &directory).await.unwrap();
        assert!(principal.role_ids.is_empty());
        assert!(principal.team_ids.is_empty());
        assert!(!principal.is_super_admin);
    }

    #[tokio::test]
    async fn membership_facts_carry_over() {
        let directory = StaticDirectory::new();
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let team = Uuid::new_v4();
        let role = Uuid::new_v4();

        directory.upsert_membership(
            user,
            tenant,
            Membership {
                team_ids: HashSet::from([team]),
                role_ids: vec![role],
                is_super_admin: true,
            },
        );

        let principal = resolve_principal(
            Identity {
                user_id: user,
                tenant_id: tenant,
            },
            &directory,
        )
        .await
        .unwrap();
        assert!(principal.is_on_team(team));
        assert_eq!(principal.role_ids, vec![role]);
        assert!(principal.is_super_admin);
    }
}
