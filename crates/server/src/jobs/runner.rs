// crates/server/src/jobs/runner.rs
//! Runs task jobs on the blocking pool and cleans up after them.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use taskcast_core::{ConnectionRegistry, EmissionBridge, Message, TaskId};
use tokio::task::JoinHandle;

use super::reporter::ProgressReporter;
use super::types::{JobError, JobFailure, JobStatus};

/// Error code sent to subscribers when a job body panics.
const JOB_PANICKED_CODE: &str = "INTERNAL_ERROR";

/// Central job runner shared through `AppState`.
///
/// Job bodies are synchronous and run via `spawn_blocking`, off the runtime
/// that owns the subscriber connections; they report through a
/// [`ProgressReporter`]. At most one job runs per task id.
pub struct JobRunner {
    registry: Arc<ConnectionRegistry>,
    bridge: Arc<EmissionBridge>,
    running: Arc<DashMap<TaskId, Instant>>,
}

impl JobRunner {
    pub fn new(registry: Arc<ConnectionRegistry>, bridge: Arc<EmissionBridge>) -> Self {
        Self {
            registry,
            bridge,
            running: Arc::new(DashMap::new()),
        }
    }

    /// Start `job` for `task_id`.
    ///
    /// A returned [`JobFailure`] is published as an `error` message. When the
    /// job ends and nobody is subscribed to the task, the task's replay buffer
    /// is cleared so unwatched history is not retained.
    pub fn spawn<F>(&self, task_id: TaskId, job: F) -> Result<JoinHandle<JobStatus>, JobError>
    where
        F: FnOnce(&ProgressReporter) -> Result<(), JobFailure> + Send + 'static,
    {
        match self.running.entry(task_id.clone()) {
            Entry::Occupied(_) => return Err(JobError::AlreadyRunning(task_id)),
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
            }
        }

        let reporter = ProgressReporter::new(task_id.clone(), Arc::clone(&self.bridge));
        let registry = Arc::clone(&self.registry);
        let bridge = Arc::clone(&self.bridge);
        let running = Arc::clone(&self.running);

        tracing::info!(task_id = %task_id, "Job started");

        Ok(tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || {
                let result = job(&reporter);
                if let Err(failure) = &result {
                    reporter.error(
                        &failure.error_code,
                        &failure.user_message,
                        failure.technical_detail.as_deref(),
                    );
                }
                result
            })
            .await;

            let status = match outcome {
                Ok(Ok(())) => JobStatus::Completed,
                Ok(Err(failure)) => {
                    tracing::warn!(
                        task_id = %task_id,
                        error_code = %failure.error_code,
                        "Job failed"
                    );
                    JobStatus::Failed
                }
                Err(join_err) => {
                    tracing::error!(task_id = %task_id, error = %join_err, "Job panicked");
                    let msg = Message::error(
                        task_id.clone(),
                        JOB_PANICKED_CODE,
                        "Processing failed unexpectedly",
                        Some(join_err.to_string()),
                    );
                    if let Err(e) = bridge.publish(task_id.clone(), msg).await {
                        tracing::warn!(task_id = %task_id, error = %e, "Failed to emit panic error");
                    }
                    JobStatus::Failed
                }
            };

            let started = running.remove(&task_id).map(|(_, at)| at);

            if registry.connection_count(task_id.as_str()) == 0
                && registry.clear_buffer(&task_id).await
            {
                tracing::debug!(task_id = %task_id, "Cleared buffer of unwatched task");
            }

            tracing::info!(
                task_id = %task_id,
                status = ?status,
                duration_secs = started.map(|at| at.elapsed().as_secs_f64()),
                "Job finished"
            );
            status
        }))
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.running.contains_key(task_id)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}
