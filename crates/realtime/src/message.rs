//! Realtime message envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Fixed enumeration of event kinds carried over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Liveness probe sent by the client while connected.
    Heartbeat,
    /// Probe response; consumed silently, never dispatched.
    HeartbeatAck,
    AttendanceMarked,
    WorkEntryCreated,
    WorkEntryUpdated,
    ProductUpdated,
    ProcessUpdated,
    Notification,
}

impl EventKind {
    /// Control kinds never reach subscribers.
    pub fn is_control(self) -> bool {
        matches!(self, Self::Heartbeat | Self::HeartbeatAck)
    }
}

/// Identity stamped onto outbound messages.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub factory_id: Option<String>,
    pub user_id: Option<String>,
}

/// Envelope of every frame on the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl RealtimeMessage {
    /// Outbound message stamped with a unique id, timestamp, and the
    /// session's identity.
    pub fn new(kind: EventKind, data: Value, context: &SessionContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            data,
            timestamp: Utc::now(),
            factory_id: context.factory_id.clone(),
            user_id: context.user_id.clone(),
        }
    }

    /// Liveness probe frame.
    pub fn heartbeat(context: &SessionContext) -> Self {
        Self::new(EventKind::Heartbeat, Value::Null, context)
    }
}
