use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};
use crate::models::permission::Scope;

/// The outcome of one authorization check. Deny is a normal value the UI
/// branches on constantly, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    pub allowed: bool,
    /// The scope that justified an allow; `None` on deny.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_scope: Option<Scope>,
    /// The role that justified an allow; `None` on deny and on the
    /// super-admin bypass (which matches no role).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_role_id: Option<Uuid>,
}

impl Decision {
    pub fn allow(scope: Scope, role_id: Option<Uuid>) -> Self {
        Self {
            allowed: true,
            matched_scope: Some(scope),
            matched_role_id: role_id,
        }
    }

    pub fn deny() -> Self {
        Self {
            allowed: false,
            matched_scope: None,
            matched_role_id: None,
        }
    }
}

/// Audit record published when a super admin bypasses evaluation. The bypass
/// must leave a trace; it never skips the decision invisibly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassAudit {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub resource: String,
    pub action: String,
}

impl Loggable for BypassAudit {
    fn entity_type() -> &'static str {
        "authz_decision"
    }
    fn subject_id(&self) -> Uuid {
        self.user_id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}
