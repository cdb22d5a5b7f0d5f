//! The `Message` record: the atomic unit stored in an inbox file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message priority. Defaults to `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Priority> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// The mutable user-facing status tag. At most one is present at a time;
/// absence means "read".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTag {
    Unread,
    Todo,
    Done,
}

impl StatusTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTag::Unread => "unread",
            StatusTag::Todo => "todo",
            StatusTag::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<StatusTag> {
        match s.to_ascii_lowercase().as_str() {
            "unread" => Some(StatusTag::Unread),
            "todo" => Some(StatusTag::Todo),
            "done" => Some(StatusTag::Done),
            _ => None,
        }
    }
}

/// Agent-side task lifecycle, independent of the user-facing status tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Working,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Working => "working",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s.to_ascii_lowercase().as_str() {
            "working" => Some(TaskStatus::Working),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// Property keys this crate understands and rewrites explicitly. Everything
/// else read from a record's `:PROPERTIES:` block is preserved verbatim in
/// `extra` so round-tripping a record we don't fully understand never loses
/// data.
pub const KNOWN_PROPERTY_KEYS: &[&str] = &[
    "id",
    "from",
    "to",
    "priority",
    "thread",
    "reply_to",
    "task_status",
    "started_at",
    "completed_at",
];

/// A single message record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// `msg-YYYYMMDD-HHMMSS-<author>`, immutable once written.
    pub id: String,
    pub from: String,
    pub to: String,
    /// Human-readable authoring time, to the minute, as it appears in the
    /// record header (`* MESSAGE <timestamp> :tag:`).
    pub timestamp: String,
    pub text: String,
    pub priority: Priority,
    pub status: Option<StatusTag>,
    pub thread: Option<String>,
    pub reply_to: Option<String>,
    pub task_status: Option<TaskStatus>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// Properties present in the source file that this crate doesn't model
    /// explicitly, keyed by their original (lowercased) name. Preserved
    /// verbatim on rewrite.
    pub extra: BTreeMap<String, String>,
}

impl Message {
    /// Strip all status tags; used before re-adding a single new one so the
    /// "exactly one status tag" invariant can never be violated.
    pub fn clear_status(&mut self) {
        self.status = None;
    }
}
