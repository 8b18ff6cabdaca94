use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::messages::{DecodeError, Envelope};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub org_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub author_type: String,
    #[serde(rename = "type", default)]
    pub post_type: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub agent_id: String,
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    pub id: String,
    pub org_id: String,
    pub actor_id: String,
    pub actor_type: String,
    pub action: String,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Insight {
    pub id: String,
    pub org_id: String,
    #[serde(rename = "type")]
    pub insight_type: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub source_posts: Vec<String>,
    #[serde(default)]
    pub source_agents: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reviewed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub org_id: String,
    pub recipient_id: String,
    pub recipient_type: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationNew {
    pub recipient_id: String,
    pub notification: Notification,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub org_id: String,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub assignee_id: Option<String>,
    /// Remaining task columns, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskNew {
    pub task: Task,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskUpdated {
    pub task: Task,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscribed {
    pub channel_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Unsubscribed {
    pub channel_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HeartbeatAck {
    /// Server clock, RFC 3339.
    pub timestamp: String,
}

/// Messages the server pushes to clients, one variant per event name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "post:new")]
    PostNew(Post),
    #[serde(rename = "agent:status")]
    AgentStatus(AgentStatus),
    #[serde(rename = "activity:new")]
    ActivityNew(ActivityEntry),
    #[serde(rename = "insight:new")]
    InsightNew(Insight),
    #[serde(rename = "notification:new")]
    NotificationNew(NotificationNew),
    #[serde(rename = "task:new")]
    TaskNew(TaskNew),
    #[serde(rename = "task:updated")]
    TaskUpdated(TaskUpdated),
    #[serde(rename = "subscribed")]
    Subscribed(Subscribed),
    #[serde(rename = "unsubscribed")]
    Unsubscribed(Unsubscribed),
    #[serde(rename = "heartbeat_ack")]
    HeartbeatAck(HeartbeatAck),
}

/// Event names, used as listener keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PostNew,
    AgentStatus,
    ActivityNew,
    InsightNew,
    NotificationNew,
    TaskNew,
    TaskUpdated,
    Subscribed,
    Unsubscribed,
    HeartbeatAck,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::PostNew,
        EventKind::AgentStatus,
        EventKind::ActivityNew,
        EventKind::InsightNew,
        EventKind::NotificationNew,
        EventKind::TaskNew,
        EventKind::TaskUpdated,
        EventKind::Subscribed,
        EventKind::Unsubscribed,
        EventKind::HeartbeatAck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PostNew => "post:new",
            EventKind::AgentStatus => "agent:status",
            EventKind::ActivityNew => "activity:new",
            EventKind::InsightNew => "insight:new",
            EventKind::NotificationNew => "notification:new",
            EventKind::TaskNew => "task:new",
            EventKind::TaskUpdated => "task:updated",
            EventKind::Subscribed => "subscribed",
            EventKind::Unsubscribed => "unsubscribed",
            EventKind::HeartbeatAck => "heartbeat_ack",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Domain events may be published through the REST surface; transport
    /// acknowledgements are produced by the socket layer only.
    pub fn is_domain_event(&self) -> bool {
        !matches!(
            self,
            EventKind::Subscribed | EventKind::Unsubscribed | EventKind::HeartbeatAck
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::PostNew(_) => EventKind::PostNew,
            ServerEvent::AgentStatus(_) => EventKind::AgentStatus,
            ServerEvent::ActivityNew(_) => EventKind::ActivityNew,
            ServerEvent::InsightNew(_) => EventKind::InsightNew,
            ServerEvent::NotificationNew(_) => EventKind::NotificationNew,
            ServerEvent::TaskNew(_) => EventKind::TaskNew,
            ServerEvent::TaskUpdated(_) => EventKind::TaskUpdated,
            ServerEvent::Subscribed(_) => EventKind::Subscribed,
            ServerEvent::Unsubscribed(_) => EventKind::Unsubscribed,
            ServerEvent::HeartbeatAck(_) => EventKind::HeartbeatAck,
        }
    }

    /// Build a typed event from an envelope.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        if EventKind::from_name(&envelope.event).is_none() {
            return Err(DecodeError::UnknownEvent(envelope.event));
        }
        let event = envelope.event.clone();
        let mut tagged = Map::new();
        tagged.insert("event".to_string(), Value::String(envelope.event));
        tagged.insert("data".to_string(), envelope.data);
        serde_json::from_value(Value::Object(tagged))
            .map_err(|source| DecodeError::InvalidPayload { event, source })
    }

    /// Decode a raw text frame.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let envelope = Envelope::parse(raw).ok_or(DecodeError::Malformed)?;
        Self::from_envelope(envelope)
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A payload type that maps to exactly one [`ServerEvent`] variant.
pub trait EventPayload: Sized + Send + Sync + 'static {
    const KIND: EventKind;

    fn from_event(event: &ServerEvent) -> Option<&Self>;
}

macro_rules! event_payload {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        $(
            impl EventPayload for $payload {
                const KIND: EventKind = EventKind::$variant;

                fn from_event(event: &ServerEvent) -> Option<&Self> {
                    match event {
                        ServerEvent::$variant(payload) => Some(payload),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for ServerEvent {
                fn from(payload: $payload) -> Self {
                    ServerEvent::$variant(payload)
                }
            }
        )*
    };
}

event_payload! {
    PostNew => Post,
    AgentStatus => AgentStatus,
    ActivityNew => ActivityEntry,
    InsightNew => Insight,
    NotificationNew => NotificationNew,
    TaskNew => TaskNew,
    TaskUpdated => TaskUpdated,
    Subscribed => Subscribed,
    Unsubscribed => Unsubscribed,
    HeartbeatAck => HeartbeatAck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_status_decodes_from_wire() {
        let event = ServerEvent::decode(
            r#"{"event":"agent:status","data":{"agentId":"agent-1","status":"busy"}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), EventKind::AgentStatus);
        let status = AgentStatus::from_event(&event).unwrap();
        assert_eq!(status.agent_id, "agent-1");
        assert!(Post::from_event(&event).is_none());
    }

    #[test]
    fn post_keeps_snake_case_columns() {
        let raw = json!({
            "event": "post:new",
            "data": {
                "id": "p1", "org_id": "o1", "channel_id": "c1",
                "author_id": "u1", "author_type": "user", "type": "update",
                "content": "hello",
                "created_at": "2026-01-02T03:04:05Z", "updated_at": "2026-01-02T03:04:05Z"
            }
        });
        let event = ServerEvent::decode(&raw.to_string()).unwrap();
        let ServerEvent::PostNew(post) = &event else {
            panic!("expected post:new, got {event:?}");
        };
        assert_eq!(post.channel_id, "c1");
        assert_eq!(post.post_type, "update");
        assert!(!post.pinned);

        let encoded: Value = serde_json::from_str(&event.to_text()).unwrap();
        assert_eq!(encoded["event"], "post:new");
        assert_eq!(encoded["data"]["type"], "update");
    }

    #[test]
    fn task_extra_columns_pass_through() {
        let raw = json!({
            "event": "task:updated",
            "data": { "task": { "id": "t1", "org_id": "o1", "title": "Call", "status": "done", "priority": "high" } }
        });
        let event = ServerEvent::decode(&raw.to_string()).unwrap();
        let updated = TaskUpdated::from_event(&event).unwrap();
        assert_eq!(updated.task.extra.get("priority"), Some(&json!("high")));
    }

    #[test]
    fn unknown_and_invalid_events_are_distinguished() {
        assert!(matches!(
            ServerEvent::decode(r#"{"event":"reaction:new","data":{}}"#),
            Err(DecodeError::UnknownEvent(_))
        ));
        assert!(matches!(
            ServerEvent::decode(r#"{"event":"agent:status","data":{"agentId":1}}"#),
            Err(DecodeError::InvalidPayload { .. })
        ));
        assert!(matches!(ServerEvent::decode("{{{"), Err(DecodeError::Malformed)));
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert!(!EventKind::HeartbeatAck.is_domain_event());
        assert!(EventKind::InsightNew.is_domain_event());
    }
}
