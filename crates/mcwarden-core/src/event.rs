//! Event records published to subscribers.
//!
//! An [`Event`] is immutable once built. Its wire form matches what browser
//! clients of the event feed already consume:
//! `{"type": "...", "date": "<RFC 3339>", "value": ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known event kinds.
///
/// Line handlers may publish any other kind through [`EventKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The supervised process exited unexpectedly and is being respawned.
    ServerRestart,
    /// The supervised process reported that it finished starting.
    ServerReady,
    /// Liveness ping for a user. Never stored in history.
    UserActivity,
    UserJoin,
    UserLeave,
    Chat,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerRestart => "serverRestart",
            Self::ServerReady => "serverReady",
            Self::UserActivity => "userActivity",
            Self::UserJoin => "userJoin",
            Self::UserLeave => "userLeave",
            Self::Chat => "chat",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Ephemeral kinds fan out live but bypass the history buffer.
    ///
    /// Decided by wire name, so a `Custom` spelling of a well-known kind is
    /// classified the same way as the kind itself.
    pub fn is_ephemeral(&self) -> bool {
        self.as_str() == "userActivity"
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "serverRestart" => Self::ServerRestart,
            "serverReady" => Self::ServerReady,
            "userActivity" => Self::UserActivity,
            "userJoin" => Self::UserJoin,
            "userLeave" => Self::UserLeave,
            "chat" => Self::Chat,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// A single published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(rename = "date")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "value")]
    payload: Value,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is_ephemeral(&self) -> bool {
        self.kind.is_ephemeral()
    }
}
