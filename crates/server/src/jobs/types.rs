// crates/server/src/jobs/types.rs
//! Types for the background job system.

use serde::Serialize;
use taskcast_core::TaskId;
use thiserror::Error;

/// Final state of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Failure returned by a job body. The runner turns it into an `error`
/// message for the task's subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub error_code: String,
    pub user_message: String,
    pub technical_detail: Option<String>,
}

impl JobFailure {
    pub fn new(error_code: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            user_message: user_message.into(),
            technical_detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.technical_detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("A job is already running for task {0}")]
    AlreadyRunning(TaskId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failure_builder() {
        let failure = JobFailure::new("DIARIZATION_FAILED", "Speaker detection failed")
            .with_detail("pyannote: model not loaded");
        assert_eq!(failure.error_code, "DIARIZATION_FAILED");
        assert_eq!(
            failure.technical_detail.as_deref(),
            Some("pyannote: model not loaded")
        );
    }

    #[test]
    fn test_job_status_serialize() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn test_job_error_display() {
        let err = JobError::AlreadyRunning(TaskId::new("t1").unwrap());
        assert_eq!(err.to_string(), "A job is already running for task t1");
    }
}
