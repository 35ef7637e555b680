use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The authenticated, tenant-and-team-resolved actor making a request.
///
/// Built per request by the resolver from identity facts; never persisted by
/// this subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub team_ids: HashSet<Uuid>,
    /// Insertion order is kept: the evaluator breaks scope ties by the first
    /// role encountered.
    pub role_ids: Vec<Uuid>,
    pub is_super_admin: bool,
}

impl Principal {
    pub fn new(user_id: Uuid, tenant_id: Uuid) -> Self {
        Self {
            user_id,
            tenant_id,
            team_ids: HashSet::new(),
            role_ids: Vec::new(),
            is_super_admin: false,
        }
    }

    pub fn with_teams(mut self, team_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.team_ids = team_ids.into_iter().collect();
        self
    }

    pub fn with_roles(mut self, role_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.role_ids = role_ids.into_iter().collect();
        self
    }

    pub fn super_admin(mut self) -> Self {
        self.is_super_admin = true;
        self
    }

    pub fn is_on_team(&self, team_id: Uuid) -> bool {
        self.team_ids.contains(&team_id)
    }
}

/// Ownership facts of the record being accessed, used to resolve whether a
/// grant's scope covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Target {
    pub tenant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_team_id: Option<Uuid>,
}

impl Target {
    pub fn in_tenant(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            owner_user_id: None,
            owner_team_id: None,
        }
    }

    pub fn owned_by_user(mut self, user_id: Uuid) -> Self {
        self.owner_user_id = Some(user_id);
        self
    }

    pub fn owned_by_team(mut self, team_id: Uuid) -> Self {
        self.owner_team_id = Some(team_id);
        self
    }
}
