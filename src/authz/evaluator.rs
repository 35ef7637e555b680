use crate::errors::AppError;
use crate::models::decision::Decision;
use crate::models::permission::{Action, Resource, Scope};
use crate::registry::RegistrySnapshot;

use super::principal::{Principal, Target};

/// The central decision function.
///
/// Evaluation order:
/// 1. super admin -> allow at global scope (recorded, not invisible)
/// 2. every permission of every held role matching (resource, action) whose
///    scope covers the target relative to the principal
/// 3. broadest surviving scope wins; ties go to the first role encountered
/// 4. no match -> deny
///
/// Pure over its inputs: no I/O, no hidden state, safe to call from any
/// number of concurrent requests against the same snapshot. A well-formed
/// query never returns `Err`; denial is a normal `Decision`.
pub fn can_perform(
    principal: &Principal,
    snapshot: &RegistrySnapshot,
    resource: &Resource,
    action: Action,
    target: &Target,
) -> Result<Decision, AppError> {
    if resource.as_str().trim().is_empty() {
        return Err(AppError::invalid_request("resource must not be empty"));
    }

    if principal.is_super_admin {
        tracing::debug!(
            user_id = %principal.user_id,
            resource = %resource,
            action = action.as_str(),
            "super admin bypass"
        );
        return Ok(Decision::allow(Scope::Global, None));
    }

    let mut best: Option<Decision> = None;
    for role_id in &principal.role_ids {
        // Unknown ids and archived roles grant nothing.
        let role = match snapshot.role(*role_id) {
            Some(role) if !role.is_archived() => role,
            _ => continue,
        };

        for permission in &role.permissions {
            if &permission.resource != resource || !permission.allows(action) {
                continue;
            }
            if !scope_covers(permission.scope, principal, target) {
                continue;
            }
            // Strictly-broader only, so the first role keeps a tied scope.
            let broader = match best {
                Some(current) => permission.scope > current.matched_scope.unwrap_or(Scope::Personal),
                None => true,
            };
            if broader {
                best = Some(Decision::allow(permission.scope, Some(role.id)));
                if permission.scope == Scope::Global {
                    break;
                }
            }
        }
        if matches!(best, Some(d) if d.matched_scope == Some(Scope::Global)) {
            break;
        }
    }

    match best {
        Some(decision) => {
            tracing::debug!(
                user_id = %principal.user_id,
                resource = %resource,
                action = action.as_str(),
                scope = decision.matched_scope.map(|s| s.as_str()).unwrap_or(""),
                "permission match"
            );
            Ok(decision)
        }
        None => {
            tracing::debug!(
                user_id = %principal.user_id,
                resource = %resource,
                action = action.as_str(),
                "permission denied"
            );
            Ok(Decision::deny())
        }
    }
}

/// Whether a grant at `scope` covers `target` as resolved against the
/// principal's tenant and team memberships.
fn scope_covers(scope: Scope, principal: &Principal, target: &Target) -> bool {
    let same_tenant = target.tenant_id == principal.tenant_id;
    match scope {
        Scope::Global => true,
        Scope::Tenant => same_tenant,
        Scope::Team => {
            same_tenant
                && target
                    .owner_team_id
                    .is_some_and(|team| principal.is_on_team(team))
        }
        Scope::Personal => {
            same_tenant && target.owner_user_id == Some(principal.user_id)
        }
    }
}
