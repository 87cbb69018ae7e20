// crates/core/src/bridge.rs
//! Hand-off from worker threads to the runtime that owns the connections.
//!
//! Background jobs run on blocking threads with no access to sockets. The
//! bridge gives them a synchronous `emit_*` API: the message is queued to a
//! dispatcher task on the owning runtime, and the caller waits (up to
//! `emit_timeout`) for the broadcast to be confirmed.
//!
//! The dispatcher never broadcasts itself. It routes each message to a lane
//! for its task: a short-lived task that broadcasts that task's messages one
//! at a time. Messages for one task keep their order, and a subscriber stuck
//! in `send` only holds up its own task's lane.
//!
//! Emission never fails from the caller's point of view. Every failure mode
//! (bridge not yet configured, invalid message, timeout, runtime gone) is
//! logged as a warning and swallowed so that progress reporting can never
//! abort the job that is reporting.

use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use metrics::counter;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::EmitError;
use crate::message::{Message, ProgressStage, TaskId};
use crate::registry::ConnectionRegistry;

/// How the dispatcher signals that a broadcast finished.
enum Completion {
    /// Waited on by a worker thread.
    Blocking(std_mpsc::SyncSender<()>),
    /// Awaited by a caller already on the owning runtime.
    Async(oneshot::Sender<()>),
}

impl Completion {
    fn complete(self) {
        // The waiter may have timed out and gone away.
        match self {
            Completion::Blocking(tx) => {
                let _ = tx.try_send(());
            }
            Completion::Async(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

struct Dispatch {
    task_id: TaskId,
    message: Message,
    done: Completion,
}

pub struct EmissionBridge {
    registry: Arc<ConnectionRegistry>,
    queue: OnceLock<mpsc::UnboundedSender<Dispatch>>,
    emit_timeout: Duration,
}

impl EmissionBridge {
    /// Create an unconfigured bridge. Emissions are no-ops until
    /// [`configure`](Self::configure) registers the owning runtime.
    pub fn new(registry: Arc<ConnectionRegistry>, config: &HubConfig) -> Self {
        Self {
            registry,
            queue: OnceLock::new(),
            emit_timeout: config.emit_timeout,
        }
    }

    /// Register the runtime that owns live connections and start the
    /// dispatcher on it.
    ///
    /// Only the first call has any effect; later calls log a warning and
    /// return `false`.
    pub fn configure(&self, runtime: &Handle) -> bool {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.queue.set(tx).is_err() {
            warn!("Emission bridge already configured, ignoring");
            return false;
        }
        runtime.spawn(run_dispatcher(Arc::clone(&self.registry), rx));
        info!(
            emit_timeout_ms = self.emit_timeout.as_millis() as u64,
            "Emission bridge configured"
        );
        true
    }

    pub fn is_configured(&self) -> bool {
        self.queue.get().is_some()
    }

    /// Report progress for `task_id` from a worker thread.
    ///
    /// Blocks for at most the configured emit timeout. Never panics and never
    /// returns an error.
    pub fn emit_progress(
        &self,
        task_id: &str,
        stage: ProgressStage,
        percentage: u8,
        message: Option<&str>,
    ) {
        if let Err(e) = self.try_emit_progress(task_id, stage, percentage, message) {
            warn!(
                task_id,
                stage = stage.as_str(),
                reason = e.reason(),
                error = %e,
                "Failed to emit progress"
            );
            counter!("taskcast_emit_failures_total", "reason" => e.reason()).increment(1);
        }
    }

    /// Report a job failure for `task_id` from a worker thread.
    ///
    /// Same blocking and failure policy as [`emit_progress`](Self::emit_progress).
    pub fn emit_error(
        &self,
        task_id: &str,
        error_code: &str,
        user_message: &str,
        technical_detail: Option<&str>,
    ) {
        if let Err(e) = self.try_emit_error(task_id, error_code, user_message, technical_detail) {
            warn!(
                task_id,
                error_code,
                reason = e.reason(),
                error = %e,
                "Failed to emit error"
            );
            counter!("taskcast_emit_failures_total", "reason" => e.reason()).increment(1);
        }
    }

    pub fn try_emit_progress(
        &self,
        task_id: &str,
        stage: ProgressStage,
        percentage: u8,
        message: Option<&str>,
    ) -> Result<(), EmitError> {
        let queue = self.queue()?;
        let task_id = TaskId::new(task_id)?;
        let msg = Message::progress(
            task_id.clone(),
            stage,
            percentage,
            message.map(str::to_owned),
        )?;
        debug!(task_id = %task_id, stage = stage.as_str(), percentage, "Emitting progress");
        self.dispatch_blocking(queue, task_id, msg)
    }

    pub fn try_emit_error(
        &self,
        task_id: &str,
        error_code: &str,
        user_message: &str,
        technical_detail: Option<&str>,
    ) -> Result<(), EmitError> {
        let queue = self.queue()?;
        let task_id = TaskId::new(task_id)?;
        let msg = Message::error(
            task_id.clone(),
            error_code,
            user_message,
            technical_detail.map(str::to_owned),
        );
        debug!(task_id = %task_id, error_code, "Emitting error");
        self.dispatch_blocking(queue, task_id, msg)
    }

    /// Queue `message` for `task_id` from code already running on the owning
    /// runtime, waiting asynchronously for the broadcast to finish.
    pub async fn publish(&self, task_id: TaskId, message: Message) -> Result<(), EmitError> {
        let queue = self.queue()?;
        let (tx, rx) = oneshot::channel();
        queue
            .send(Dispatch {
                task_id,
                message,
                done: Completion::Async(tx),
            })
            .map_err(|_| EmitError::Dropped)?;

        match tokio::time::timeout(self.emit_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(EmitError::Dropped),
            Err(_) => Err(EmitError::Timeout(self.emit_timeout)),
        }
    }

    fn queue(&self) -> Result<&mpsc::UnboundedSender<Dispatch>, EmitError> {
        self.queue.get().ok_or(EmitError::Unconfigured)
    }

    /// On timeout the queued broadcast is not cancelled; it still runs on the
    /// owning runtime.
    fn dispatch_blocking(
        &self,
        queue: &mpsc::UnboundedSender<Dispatch>,
        task_id: TaskId,
        message: Message,
    ) -> Result<(), EmitError> {
        let (tx, rx) = std_mpsc::sync_channel(1);
        queue
            .send(Dispatch {
                task_id,
                message,
                done: Completion::Blocking(tx),
            })
            .map_err(|_| EmitError::Dropped)?;

        match rx.recv_timeout(self.emit_timeout) {
            Ok(()) => Ok(()),
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(EmitError::Timeout(self.emit_timeout)),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(EmitError::Dropped),
        }
    }
}

/// Per-task delivery queue. `pending` counts dispatches sent to the lane and
/// not yet reported done; the lane is dropped when it reaches zero.
struct Lane {
    tx: mpsc::UnboundedSender<Dispatch>,
    pending: usize,
}

/// Routes queued dispatches to per-task lanes and retires idle lanes.
///
/// All lane bookkeeping happens here, so a lane is only removed when nothing
/// is queued on it.
async fn run_dispatcher(
    registry: Arc<ConnectionRegistry>,
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<TaskId>();
    let mut lanes: HashMap<TaskId, Lane> = HashMap::new();

    loop {
        tokio::select! {
            incoming = rx.recv() => {
                let Some(dispatch) = incoming else { break };
                let task_id = dispatch.task_id.clone();
                let lane = lanes
                    .entry(task_id.clone())
                    .or_insert_with(|| spawn_lane(Arc::clone(&registry), done_tx.clone()));
                if lane.tx.send(dispatch).is_err() {
                    warn!(task_id = %task_id, "Delivery lane gone, dropping message");
                    lanes.remove(&task_id);
                    continue;
                }
                lane.pending += 1;
            }
            Some(task_id) = done_rx.recv() => {
                if let Some(lane) = lanes.get_mut(&task_id) {
                    lane.pending = lane.pending.saturating_sub(1);
                    if lane.pending == 0 {
                        lanes.remove(&task_id);
                    }
                }
            }
        }
    }
    debug!(lanes = lanes.len(), "Emission dispatcher stopped");
}

/// Start a lane that broadcasts its task's dispatches in arrival order. It
/// exits once the dispatcher drops its sender.
fn spawn_lane(registry: Arc<ConnectionRegistry>, done: mpsc::UnboundedSender<TaskId>) -> Lane {
    let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();
    tokio::spawn(async move {
        while let Some(Dispatch {
            task_id,
            message,
            done: completion,
        }) = rx.recv().await
        {
            registry.broadcast(&task_id, message).await;
            completion.complete();
            let _ = done.send(task_id);
        }
    });
    Lane { tx, pending: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::{RecordingConnection, StalledConnection};
    use pretty_assertions::assert_eq;

    fn bridge_with(config: HubConfig) -> (Arc<ConnectionRegistry>, Arc<EmissionBridge>) {
        let registry = Arc::new(ConnectionRegistry::from_config(&config));
        let bridge = Arc::new(EmissionBridge::new(Arc::clone(&registry), &config));
        (registry, bridge)
    }

    fn task(id: &str) -> TaskId {
        TaskId::new(id).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_bridge_is_a_silent_noop() {
        let (registry, bridge) = bridge_with(HubConfig::default());
        assert!(!bridge.is_configured());

        let err = bridge
            .try_emit_error("t1", "TRANSCRIPTION_FAILED", "Something went wrong", None)
            .unwrap_err();
        assert!(matches!(err, EmitError::Unconfigured));

        // The infallible form returns normally and delivers nothing.
        bridge.emit_error("t1", "TRANSCRIPTION_FAILED", "Something went wrong", None);
        bridge.emit_progress("t1", ProgressStage::Queued, 0, None);
        assert_eq!(registry.buffered_len(&task("t1")).await, None);

        let watcher = RecordingConnection::new();
        registry.connect(&task("t1"), watcher.clone()).await;
        assert!(watcher.received().is_empty());
    }

    #[tokio::test]
    async fn configure_is_terminal() {
        let (_registry, bridge) = bridge_with(HubConfig::default());
        let handle = Handle::current();
        assert!(bridge.configure(&handle));
        assert!(!bridge.configure(&handle));
        assert!(bridge.is_configured());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_emission_before_connect_is_replayed() {
        let (registry, bridge) = bridge_with(HubConfig::default());
        bridge.configure(&Handle::current());

        let worker = Arc::clone(&bridge);
        tokio::task::spawn_blocking(move || {
            worker
                .try_emit_progress("t1", ProgressStage::Transcribing, 40, None)
                .unwrap();
        })
        .await
        .unwrap();

        let watcher = RecordingConnection::new();
        registry.connect(&task("t1"), watcher.clone()).await;

        let received = watcher.received();
        assert_eq!(received.len(), 1);
        let Message::Progress(p) = &received[0] else {
            panic!("expected progress");
        };
        assert_eq!(p.stage, ProgressStage::Transcribing);
        assert_eq!(p.percentage, 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn emissions_keep_call_order() {
        let (registry, bridge) = bridge_with(HubConfig::default());
        bridge.configure(&Handle::current());
        let watcher = RecordingConnection::new();
        registry.connect(&task("t1"), watcher.clone()).await;

        let worker = Arc::clone(&bridge);
        tokio::task::spawn_blocking(move || {
            for pct in (0..=100).step_by(10) {
                worker.emit_progress("t1", ProgressStage::Aligning, pct, Some("aligning"));
            }
            worker.emit_error("t1", "ALIGN_FAILED", "Alignment failed", Some("no phonemes"));
        })
        .await
        .unwrap();

        let received = watcher.received();
        assert_eq!(received.len(), 12);
        let pcts: Vec<u8> = received
            .iter()
            .filter_map(|m| match m {
                Message::Progress(p) => Some(p.percentage),
                _ => None,
            })
            .collect();
        assert_eq!(pcts, (0..=100).step_by(10).collect::<Vec<u8>>());
        assert_eq!(received.last().map(Message::kind), Some("error"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_messages_are_rejected_before_dispatch() {
        let (registry, bridge) = bridge_with(HubConfig::default());
        bridge.configure(&Handle::current());

        let worker = Arc::clone(&bridge);
        let (range, empty) = tokio::task::spawn_blocking(move || {
            let range = worker.try_emit_progress("t1", ProgressStage::Queued, 120, None);
            let empty = worker.try_emit_error("", "X", "y", None);
            // And the infallible forms simply return.
            worker.emit_progress("t1", ProgressStage::Queued, 120, None);
            (range, empty)
        })
        .await
        .unwrap();

        assert!(matches!(range, Err(EmitError::InvalidMessage(_))));
        assert!(matches!(empty, Err(EmitError::InvalidMessage(_))));
        assert_eq!(registry.buffered_len(&task("t1")).await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeout_returns_but_delivery_still_completes() {
        let config = HubConfig::default().with_emit_timeout(Duration::from_millis(50));
        let (registry, bridge) = bridge_with(config);
        bridge.configure(&Handle::current());

        let stalled = StalledConnection::new();
        registry.connect(&task("t1"), stalled.clone()).await;

        let worker = Arc::clone(&bridge);
        let outcome = tokio::task::spawn_blocking(move || {
            let outcome = worker.try_emit_progress("t1", ProgressStage::Diarizing, 90, None);
            // The infallible form must return after the timeout as well.
            worker.emit_progress("t1", ProgressStage::Diarizing, 95, None);
            outcome
        })
        .await
        .unwrap();
        assert!(matches!(outcome, Err(EmitError::Timeout(_))));

        stalled.release();
        stalled.release();
        tokio::time::timeout(Duration::from_secs(2), async {
            while stalled.delivered().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("abandoned deliveries should still run");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_task_does_not_hold_up_other_tasks() {
        let config = HubConfig::default().with_emit_timeout(Duration::from_millis(300));
        let (registry, bridge) = bridge_with(config);
        bridge.configure(&Handle::current());

        let stalled = StalledConnection::new();
        registry.connect(&task("slow"), stalled.clone()).await;
        let watcher = RecordingConnection::new();
        registry.connect(&task("fast"), watcher.clone()).await;

        let worker = Arc::clone(&bridge);
        let (slow, fast) = tokio::task::spawn_blocking(move || {
            let slow = worker.try_emit_progress("slow", ProgressStage::Transcribing, 10, None);
            let fast = worker.try_emit_progress("fast", ProgressStage::Transcribing, 20, None);
            (slow, fast)
        })
        .await
        .unwrap();

        assert!(matches!(slow, Err(EmitError::Timeout(_))));
        assert!(fast.is_ok(), "unrelated task emission failed: {fast:?}");
        assert_eq!(watcher.received().len(), 1);

        // The stalled lane drains once its subscriber recovers, and the task
        // accepts new emissions afterwards.
        stalled.release();
        stalled.release();
        let worker = Arc::clone(&bridge);
        let again = tokio::task::spawn_blocking(move || {
            worker.try_emit_progress("slow", ProgressStage::Transcribing, 30, None)
        })
        .await
        .unwrap();
        assert!(again.is_ok());

        let pcts: Vec<u8> = stalled
            .delivered()
            .iter()
            .filter_map(|m| match m {
                Message::Progress(p) => Some(p.percentage),
                _ => None,
            })
            .collect();
        assert_eq!(pcts, vec![10, 30]);
    }

    #[tokio::test]
    async fn publish_from_owning_runtime() {
        let (registry, bridge) = bridge_with(HubConfig::default());
        assert!(matches!(
            bridge.publish(task("t1"), Message::heartbeat()).await,
            Err(EmitError::Unconfigured)
        ));

        bridge.configure(&Handle::current());
        let watcher = RecordingConnection::new();
        registry.connect(&task("t1"), watcher.clone()).await;

        let msg = Message::error(task("t1"), "CANCELLED", "Task cancelled", None);
        bridge.publish(task("t1"), msg).await.unwrap();
        assert_eq!(watcher.received().len(), 1);
    }
}
