// crates/server/src/jobs/reporter.rs
//! Progress reporting handle given to job bodies.

use std::sync::Arc;

use taskcast_core::{EmissionBridge, ProgressStage, TaskId};

/// Bound to one task; every call goes through the emission bridge, so it
/// blocks for at most the emit timeout and never fails.
///
/// Must be used from a blocking context (a job body, a worker thread), not
/// from async code on the owning runtime.
#[derive(Clone)]
pub struct ProgressReporter {
    task_id: TaskId,
    bridge: Arc<EmissionBridge>,
}

impl ProgressReporter {
    pub fn new(task_id: TaskId, bridge: Arc<EmissionBridge>) -> Self {
        Self { task_id, bridge }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn progress(&self, stage: ProgressStage, percentage: u8, message: Option<&str>) {
        self.bridge
            .emit_progress(self.task_id.as_str(), stage, percentage, message);
    }

    pub fn error(&self, error_code: &str, user_message: &str, technical_detail: Option<&str>) {
        self.bridge.emit_error(
            self.task_id.as_str(),
            error_code,
            user_message,
            technical_detail,
        );
    }
}
