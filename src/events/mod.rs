//! Activity event bus.
//!
//! Every registry mutation and every super-admin bypass publishes a
//! [`DomainEvent`] on a broadcast channel. Subscribers (audit sinks, webhook
//! fan-out) attach at startup; a full channel drops the oldest events rather
//! than blocking the mutation path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(
        name: impl Into<String>,
        actor_id: Option<Uuid>,
        subject_id: Option<Uuid>,
        payload: T,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context captured from gateway headers for the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Serialize)]
struct ActivityPayload {
    current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<RequestContext>,
    severity: Severity,
}

/// Publishes one activity event. Send failures only mean no subscriber is
/// attached; the mutation has already committed, so they are ignored.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    log_activity_with_context(event_bus, action, actor_id, entity, None, None);
}

pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);
    let severity = entity.severity_for_action(action);
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity,
    };

    let event = DomainEvent::new(
        event_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    if let Ok(value) = serde_json::to_value(&event) {
        let _ = event_bus.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        id: Uuid,
    }

    impl Loggable for Sample {
        fn entity_type() -> &'static str {
            "sample"
        }
        fn subject_id(&self) -> Uuid {
            self.id
        }
    }

    #[tokio::test]
    async fn published_events_reach_subscribers() {
        let (bus, mut rx) = init_event_bus();
        let sample = Sample { id: Uuid::new_v4() };

        log_activity(&bus, "created", None, &sample);

        let value = rx.recv().await.unwrap();
        assert_eq!(value["name"], "sample.created");
        assert_eq!(value["subject_id"], sample.id.to_string());
        assert_eq!(value["payload"]["severity"], "important");
    }

    #[test]
    fn archive_is_critical() {
        let sample = Sample { id: Uuid::new_v4() };
        assert_eq!(sample.severity_for_action("archived"), Severity::Critical);
        assert_eq!(sample.severity_for_action("updated"), Severity::Important);
    }
}
