//! Wire protocol: JSON frames exchanged between client and relay.
//!
//! Dynamic dispatch on a string `type` field becomes a tagged enum with
//! explicit pattern matching; unknown frame types fail to deserialize into
//! [`ClientFrame`] and are handled by the caller as a catch-all `error`.

use dmrelay_core::{Priority, StatusTag};
use serde::{Deserialize, Serialize};

/// Presence status a user may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Busy,
    Away,
    Focusing,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Busy => "busy",
            PresenceStatus::Away => "away",
            PresenceStatus::Focusing => "focusing",
        }
    }
}

impl Default for PresenceStatus {
    fn default() -> Self {
        PresenceStatus::Online
    }
}

/// Frames a client may send to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        secret: String,
        username: String,
        #[serde(default)]
        status: Option<PresenceStatus>,
        #[serde(default)]
        claude_whitelist: Option<Vec<String>>,
    },
    Send {
        to: String,
        text: String,
        #[serde(default)]
        priority: Option<Priority>,
        msg_id: String,
        #[serde(default)]
        thread: Option<String>,
        #[serde(default)]
        reply_to: Option<String>,
    },
    Presence,
    StatusChange {
        status: PresenceStatus,
    },
    Ping,
}

/// Frames the relay may send to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    AuthOk {
        username: String,
        online: Vec<String>,
        statuses: std::collections::BTreeMap<String, PresenceStatus>,
    },
    AuthError {
        message: String,
    },
    Message {
        from: String,
        text: String,
        priority: Priority,
        msg_id: String,
        timestamp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_reply: Option<bool>,
    },
    SendAck {
        to: String,
        delivered: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_replied: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        queued: Option<bool>,
    },
    PresenceChange {
        user: String,
        status: PresenceStatus,
        online: Vec<String>,
        statuses: std::collections::BTreeMap<String, PresenceStatus>,
    },
    Presence {
        online: Vec<String>,
        statuses: std::collections::BTreeMap<String, PresenceStatus>,
    },
    StatusOk {
        status: PresenceStatus,
    },
    Pong,
    Error {
        message: String,
    },
}

/// Unused but documented for completeness: the status tag never crosses the
/// wire today, but both crates share the same `StatusTag` type so a future
/// frame can expose it without redefinition.
#[allow(dead_code)]
fn _status_tag_shared(_: StatusTag) {}
