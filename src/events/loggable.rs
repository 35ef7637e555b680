use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity events. Controls downstream retention and
/// filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical events: long-term retention, never auto-delete
    Critical,
    /// Important events: medium-term retention (default)
    Important,
    /// Noise events: aggressively trimmed
    Noise,
}

impl Severity {
    #[allow(dead_code)]
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Important
    }
}

/// Trait for entities that appear in the activity stream. Role mutations and
/// authorization bypasses all flow through this.
pub trait Loggable: Serialize + Send + Sync {
    /// The entity type name (e.g. "role"); becomes the prefix in event names
    /// like "role.archived".
    fn entity_type() -> &'static str;

    /// The subject ID (usually the entity's primary key)
    fn subject_id(&self) -> Uuid;

    /// Severity level for logs (defaults to Important)
    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Override severity based on action.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "archived" | "bypassed" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
