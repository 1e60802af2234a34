//! State events, task identifiers, and the status vocabulary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type carrying status milestones.
pub const STATUS_TYPE: &str = "status";

/// Default merge type: consecutive chunks of one streamed reply.
pub const MESSAGE_TYPE: &str = "message";

/// Event type carrying the sources consulted for a reply.
pub const SOURCES_TYPE: &str = "sources";

/// Event type carrying a failure description.
pub const ERROR_TYPE: &str = "error";

/// Opaque identifier naming one task and its record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh, never-reused identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agreed `status` values by which a poller infers termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Record created, task not yet picked up by a worker.
    Queued,
    /// A worker has started producing events.
    Started,
    /// The task finished successfully.
    Done,
    /// The task failed; an `error` event precedes this status.
    Error,
    /// The task stopped after a cancellation request.
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Done => "done",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if no further events follow this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "started" => Ok(Self::Started),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// One reported milestone or content chunk: `{"type": ..., "content": ...}`.
///
/// The type taxonomy is open. Only the configured merge type gets special
/// treatment, and only from the merge policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

impl StateEvent {
    pub fn new(kind: impl Into<String>, content: impl Into<serde_json::Value>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        Self::new(STATUS_TYPE, status.as_str())
    }

    /// The default initial state of a freshly created record.
    pub fn queued() -> Self {
        Self::status(TaskStatus::Queued)
    }

    /// A (partial) reply chunk. Producers send the accumulated text, not the
    /// delta, so the collapsed `current` always holds the whole reply so far.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(MESSAGE_TYPE, text.into())
    }

    pub fn sources(sources: serde_json::Value) -> Self {
        Self::new(SOURCES_TYPE, sources)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR_TYPE, message.into())
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// The status this event reports, if it is a well-formed `status` event.
    pub fn as_status(&self) -> Option<TaskStatus> {
        if !self.is_kind(STATUS_TYPE) {
            return None;
        }
        self.content.as_str()?.parse().ok()
    }

    /// Check if this event is a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.as_status().is_some_and(|s| s.is_terminal())
    }
}
