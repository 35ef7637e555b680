use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use uuid::Uuid;

use crate::models::decision::Decision;
use crate::models::permission::{Action, Resource};

use super::principal::{Principal, Target};

/// Everything a decision depends on. The registry version is part of the key,
/// so entries computed under an older registry simply become unreachable
/// after a mutation and age out by LRU eviction; no explicit purge, and so no
/// race window between a mutation and an invalidation message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    user_id: Uuid,
    principal_hash: u64,
    registry_version: u64,
    resource: Resource,
    action: Action,
    tenant_id: Uuid,
    owner_team_id: Option<Uuid>,
    owner_user_id: Option<Uuid>,
}

impl DecisionKey {
    pub fn new(
        principal: &Principal,
        registry_version: u64,
        resource: &Resource,
        action: Action,
        target: &Target,
    ) -> Self {
        Self {
            user_id: principal.user_id,
            principal_hash: principal_hash(principal),
            registry_version,
            resource: resource.clone(),
            action,
            tenant_id: target.tenant_id,
            owner_team_id: target.owner_team_id,
            owner_user_id: target.owner_user_id,
        }
    }
}

/// Order-insensitive digest of every principal fact the evaluator reads:
/// home tenant, held roles, team memberships, and the bypass flag. Leaving
/// any of these out would let two principals that decide differently share
/// an entry; team membership in particular flips team-scope decisions.
fn principal_hash(principal: &Principal) -> u64 {
    let mut role_ids = principal.role_ids.clone();
    role_ids.sort_unstable();
    role_ids.dedup();

    let mut team_ids: Vec<Uuid> = principal.team_ids.iter().copied().collect();
    team_ids.sort_unstable();

    let mut hasher = DefaultHasher::new();
    principal.tenant_id.hash(&mut hasher);
    principal.is_super_admin.hash(&mut hasher);
    role_ids.hash(&mut hasher);
    team_ids.hash(&mut hasher);
    hasher.finish()
}

pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Memoizes evaluator results for repeated identical checks within a request
/// burst (a list page asking once per row). Writes may race harmlessly:
/// last-write-wins on an identical key is a no-op because the key encodes
/// every input the decision depends on.
pub struct DecisionCache {
    inner: Mutex<LruCache<DecisionKey, Decision>>,
}

impl DecisionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity =
            NonZeroUsize::new(capacity).unwrap_or_else(|| {
                NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).expect("default capacity is non-zero")
            });
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &DecisionKey) -> Option<Decision> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(key).copied()
    }

    pub fn put(&self, key: DecisionKey, decision: Decision) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key, decision);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cap()
            .get()
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::permission::Scope;

    fn res(name: &str) -> Resource {
        Resource::new(name).unwrap()
    }

    fn principal_with_roles(roles: Vec<Uuid>) -> Principal {
        Principal::new(Uuid::new_v4(), Uuid::new_v4()).with_roles(roles)
    }

    #[test]
    fn hit_returns_stored_decision() {
        let cache = DecisionCache::new(16);
        let principal = principal_with_roles(vec![Uuid::new_v4()]);
        let target = Target::in_tenant(principal.tenant_id);
        let key = DecisionKey::new(&principal, 1, &res("finance"), Action::Read, &target);

        assert_eq!(cache.get(&key), None);
        cache.put(key.clone(), Decision::allow(Scope::Tenant, None));
        assert_eq!(cache.get(&key), Some(Decision::allow(Scope::Tenant, None)));
    }

    #[test]
    fn version_bump_makes_old_entries_unreachable() {
        let cache = DecisionCache::new(16);
        let principal = principal_with_roles(vec![Uuid::new_v4()]);
        let target = Target::in_tenant(principal.tenant_id);

        let old = DecisionKey::new(&principal, 1, &res("finance"), Action::Read, &target);
        cache.put(old, Decision::allow(Scope::Tenant, None));

        let fresh = DecisionKey::new(&principal, 2, &res("finance"), Action::Read, &target);
        assert_eq!(cache.get(&fresh), None);
    }

    #[test]
    fn principal_hash_ignores_role_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();

        let first = Principal::new(user, tenant).with_roles([a, b]);
        let second = Principal::new(user, tenant).with_roles([b, a]);
        let target = Target::in_tenant(tenant);

        let key_first = DecisionKey::new(&first, 1, &res("finance"), Action::Read, &target);
        let key_second = DecisionKey::new(&second, 1, &res("finance"), Action::Read, &target);
        assert_eq!(key_first, key_second);
    }

    #[test]
    fn team_membership_gets_its_own_entry() {
        let cache = DecisionCache::new(16);
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let team = Uuid::new_v4();
        let role = Uuid::new_v4();
        let target = Target::in_tenant(tenant).owned_by_team(team);

        let on_team = Principal::new(user, tenant)
            .with_roles([role])
            .with_teams([team]);
        let off_team = Principal::new(user, tenant).with_roles([role]);

        let key_on = DecisionKey::new(&on_team, 1, &res("finance"), Action::Update, &target);
        let key_off = DecisionKey::new(&off_team, 1, &res("finance"), Action::Update, &target);
        assert_ne!(key_on, key_off);

        // An allow stored for the team member is invisible to the outsider.
        cache.put(key_on, Decision::allow(Scope::Team, Some(role)));
        assert_eq!(cache.get(&key_off), None);
    }

    #[test]
    fn home_tenant_gets_its_own_entry() {
        let user = Uuid::new_v4();
        let role = Uuid::new_v4();
        let target = Target::in_tenant(Uuid::new_v4());

        let home = Principal::new(user, Uuid::new_v4()).with_roles([role]);
        let away = Principal::new(user, Uuid::new_v4()).with_roles([role]);

        let key_home = DecisionKey::new(&home, 1, &res("finance"), Action::Read, &target);
        let key_away = DecisionKey::new(&away, 1, &res("finance"), Action::Read, &target);
        assert_ne!(key_home, key_away);
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = DecisionCache::new(2);
        let principal = principal_with_roles(vec![]);
        let target = Target::in_tenant(principal.tenant_id);

        for (idx, module) in ["projects", "finance", "clients"].iter().enumerate() {
            let key = DecisionKey::new(&principal, 1, &res(module), Action::Read, &target);
            cache.put(key, Decision::deny());
            assert!(cache.len() <= 2, "exceeded capacity at insert {idx}");
        }

        // Oldest entry was evicted.
        let oldest = DecisionKey::new(&principal, 1, &res("projects"), Action::Read, &target);
        assert_eq!(cache.get(&oldest), None);
    }
}
