// crates/core/src/message.rs
//! Wire messages pushed to task subscribers.
//!
//! Three shapes share one JSON envelope discriminated by `type`:
//! `progress`, `error` and `heartbeat`. Optional text fields are sent as
//! `null` rather than omitted so browser clients can rely on the keys.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// Identifier of one background task. The only partition key of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Result<Self, MessageError> {
        let id = id.into();
        if id.is_empty() {
            return Err(MessageError::EmptyTaskId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskId {
    type Error = MessageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline stage reported in progress updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Uploading,
    Queued,
    Transcribing,
    Aligning,
    Diarizing,
    Complete,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Uploading => "uploading",
            ProgressStage::Queued => "queued",
            ProgressStage::Transcribing => "transcribing",
            ProgressStage::Aligning => "aligning",
            ProgressStage::Diarizing => "diarizing",
            ProgressStage::Complete => "complete",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub task_id: TaskId,
    pub stage: ProgressStage,
    /// Completion percentage, 0-100.
    pub percentage: u8,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub task_id: TaskId,
    /// Machine-readable code for client handling.
    pub error_code: String,
    /// Human-readable text suitable for display.
    pub user_message: String,
    pub technical_detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub timestamp: DateTime<Utc>,
}

/// A message sent from the server to task subscribers.
///
/// Immutable once built; the timestamp is taken at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Progress(ProgressMessage),
    Error(ErrorMessage),
    Heartbeat(HeartbeatMessage),
}

impl Message {
    /// Build a progress update, rejecting percentages above 100.
    pub fn progress(
        task_id: TaskId,
        stage: ProgressStage,
        percentage: u8,
        message: Option<String>,
    ) -> Result<Self, MessageError> {
        if percentage > 100 {
            return Err(MessageError::PercentageOutOfRange(percentage));
        }
        Ok(Message::Progress(ProgressMessage {
            task_id,
            stage,
            percentage,
            message,
            timestamp: Utc::now(),
        }))
    }

    pub fn error(
        task_id: TaskId,
        error_code: impl Into<String>,
        user_message: impl Into<String>,
        technical_detail: Option<String>,
    ) -> Self {
        Message::Error(ErrorMessage {
            task_id,
            error_code: error_code.into(),
            user_message: user_message.into(),
            technical_detail,
            timestamp: Utc::now(),
        })
    }

    pub fn heartbeat() -> Self {
        Message::Heartbeat(HeartbeatMessage {
            timestamp: Utc::now(),
        })
    }

    /// The `type` discriminator as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Progress(_) => "progress",
            Message::Error(_) => "error",
            Message::Heartbeat(_) => "heartbeat",
        }
    }

    /// Stage label for log lines; non-progress messages report `unknown`.
    pub fn stage_label(&self) -> &'static str {
        match self {
            Message::Progress(p) => p.stage.as_str(),
            _ => "unknown",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Message::Progress(p) => p.timestamp,
            Message::Error(e) => e.timestamp,
            Message::Heartbeat(h) => h.timestamp,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
