//! Task state machine
//!
//! A task tracks one dispatched command across its target charge points.
//! Every target starts `Pending` and moves to a terminal result exactly
//! once: through a correlated response, a transport failure, the deadline
//! watchdog or cancellation. Whatever arrives after that is counted as a
//! late response and dropped.
//!
//! ```text
//!            apply(record) / expire() / cancel()
//!   Open ─────────────────────────────────────────► Completed
//!   (≥1 target Pending)                 (no target Pending, frozen)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::types::{ChargeBoxId, Command, Endpoint, ResponseRecord, TargetResult};

/// Task identifier, unique within one task store
pub type TaskId = u64;

/// Overall task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Open,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Open => f.write_str("open"),
            TaskStatus::Completed => f.write_str("completed"),
        }
    }
}

/// What happened to a record handed to [`Task::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Target moved from Pending to the recorded result
    Applied,
    /// Target already had a terminal result, record dropped
    Late,
    /// Record names a charge point that is not a target of this task
    UnknownTarget,
    /// Record carried `Pending`, which is not a result
    Ignored,
}

/// Per-target entry of a [`TaskSnapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEntry {
    pub charge_box_id: ChargeBoxId,
    #[serde(flatten)]
    pub result: TargetResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Read-only view of a task at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub command: Command,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<TargetEntry>,
    pub late_responses: usize,
}

impl TaskSnapshot {
    pub fn result_of(&self, charge_box_id: &str) -> Option<&TargetResult> {
        self.results
            .iter()
            .find(|e| e.charge_box_id == charge_box_id)
            .map(|e| &e.result)
    }

    pub fn pending_count(&self) -> usize {
        self.results.iter().filter(|e| e.result.is_pending()).count()
    }
}

#[derive(Debug)]
struct Slot {
    result: TargetResult,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct TaskState {
    slots: HashMap<ChargeBoxId, Slot>,
    pending: usize,
    status: TaskStatus,
    completed_at: Option<DateTime<Utc>>,
    late_responses: usize,
}

/// One dispatched command and its per-target results
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    command: Command,
    targets: Vec<Endpoint>,
    created_at: DateTime<Utc>,
    timeout: Duration,
    state: Mutex<TaskState>,
    status_tx: watch::Sender<TaskStatus>,
}

impl Task {
    /// Create a task with every target Pending
    ///
    /// Targets must be unique by charge box id; the dispatcher collapses
    /// duplicates before calling this.
    pub fn new(id: TaskId, command: Command, targets: Vec<Endpoint>, timeout: Duration) -> Self {
        let slots: HashMap<_, _> = targets
            .iter()
            .map(|t| {
                (
                    t.charge_box_id.clone(),
                    Slot {
                        result: TargetResult::Pending,
                        finished_at: None,
                    },
                )
            })
            .collect();
        let pending = slots.len();
        let created_at = Utc::now();

        // A task without pending targets is born completed
        let (status, completed_at) = if pending == 0 {
            (TaskStatus::Completed, Some(created_at))
        } else {
            (TaskStatus::Open, None)
        };
        let (status_tx, _) = watch::channel(status);

        Self {
            id,
            command,
            targets,
            created_at,
            timeout,
            state: Mutex::new(TaskState {
                slots,
                pending,
                status,
                completed_at,
                late_responses: 0,
            }),
            status_tx,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn targets(&self) -> &[Endpoint] {
        &self.targets
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    pub fn is_completed(&self) -> bool {
        self.status() == TaskStatus::Completed
    }

    /// Completion time, if completed
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().completed_at
    }

    /// Whether a target still waits for its result
    pub fn is_pending(&self, charge_box_id: &str) -> bool {
        self.state
            .lock()
            .slots
            .get(charge_box_id)
            .is_some_and(|s| s.result.is_pending())
    }

    /// Record a correlated response
    pub fn apply(&self, record: ResponseRecord) -> ApplyOutcome {
        if record.result.is_pending() {
            return ApplyOutcome::Ignored;
        }

        let mut state = self.state.lock();
        let outcome = match state.slots.get_mut(&record.charge_box_id) {
            None => ApplyOutcome::UnknownTarget,
            Some(slot) if slot.result.is_terminal() => ApplyOutcome::Late,
            Some(slot) => {
                slot.result = record.result;
                slot.finished_at = Some(record.received_at);
                ApplyOutcome::Applied
            }
        };

        match outcome {
            ApplyOutcome::Applied => {
                state.pending -= 1;
                debug!(
                    "Task {}: {} finished ({} pending)",
                    self.id, record.charge_box_id, state.pending
                );
                if state.pending == 0 {
                    self.complete(&mut state, record.received_at);
                }
            }
            ApplyOutcome::Late => {
                state.late_responses += 1;
                debug!(
                    "Task {}: late response from {} discarded",
                    self.id, record.charge_box_id
                );
            }
            ApplyOutcome::UnknownTarget => {
                warn!(
                    "Task {}: response from {} which is not a target",
                    self.id, record.charge_box_id
                );
            }
            ApplyOutcome::Ignored => {}
        }

        outcome
    }

    /// Mark every still pending target as timed out
    ///
    /// Returns how many targets were forced.
    pub fn expire(&self) -> usize {
        let forced = self.force_pending(TargetResult::Timeout);
        if forced > 0 {
            warn!("Task {}: deadline elapsed, {} target(s) timed out", self.id, forced);
        }
        forced
    }

    /// Cancel the task, forcing pending targets to `Cancelled`
    pub fn cancel(&self) -> usize {
        let forced = self.force_pending(TargetResult::Cancelled);
        if forced > 0 {
            info!("Task {}: cancelled, {} target(s) were pending", self.id, forced);
        }
        forced
    }

    fn force_pending(&self, result: TargetResult) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock();
        if state.status == TaskStatus::Completed {
            return 0;
        }

        let mut forced = 0;
        for slot in state.slots.values_mut().filter(|s| s.result.is_pending()) {
            slot.result = result.clone();
            slot.finished_at = Some(now);
            forced += 1;
        }
        state.pending = 0;
        self.complete(&mut state, now);
        forced
    }

    fn complete(&self, state: &mut TaskState, at: DateTime<Utc>) {
        state.status = TaskStatus::Completed;
        state.completed_at = Some(at);
        self.status_tx.send_replace(TaskStatus::Completed);
        info!("Task {}: completed", self.id);
    }

    /// Current results, in target order
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock();
        let results = self
            .targets
            .iter()
            .map(|t| {
                let slot = &state.slots[&t.charge_box_id];
                TargetEntry {
                    charge_box_id: t.charge_box_id.clone(),
                    result: slot.result.clone(),
                    finished_at: slot.finished_at,
                }
            })
            .collect();

        TaskSnapshot {
            task_id: self.id,
            command: self.command.clone(),
            status: state.status,
            created_at: self.created_at,
            completed_at: state.completed_at,
            results,
            late_responses: state.late_responses,
        }
    }

    /// Wait until the task is completed
    pub async fn completed(&self) {
        let mut rx = self.status_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|s| *s == TaskStatus::Completed).await;
    }

    /// Spawn the deadline watchdog
    ///
    /// The watchdog fires once, `timeout` after creation, unless the task
    /// completed first.
    pub fn arm_deadline(self: &Arc<Self>) {
        if self.is_completed() {
            return;
        }

        let task = Arc::clone(self);
        let elapsed = (Utc::now() - self.created_at).to_std().unwrap_or_default();
        let remaining = self.timeout.saturating_sub(elapsed);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {
                    task.expire();
                }
                _ = task.completed() => {
                    debug!("Task {}: completed before deadline", task.id);
                }
            }
        });
    }
}

/// Caller's handle to a dispatched task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task: Arc<Task>,
}

impl TaskHandle {
    pub fn new(task: Arc<Task>) -> Self {
        Self { task }
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.task.snapshot()
    }

    pub fn cancel(&self) -> usize {
        self.task.cancel()
    }

    /// Wait for completion and return the final results
    pub async fn wait(&self) -> TaskSnapshot {
        self.task.completed().await;
        self.task.snapshot()
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }
}

/// Write access for one target of one task
///
/// Senders and correlators get a slot per target and record the final
/// result through it. Recording is idempotent per target.
#[derive(Debug, Clone)]
pub struct ResponseSlot {
    task: Arc<Task>,
    charge_box_id: ChargeBoxId,
}

impl ResponseSlot {
    pub fn new(task: Arc<Task>, charge_box_id: impl Into<ChargeBoxId>) -> Self {
        Self {
            task,
            charge_box_id: charge_box_id.into(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    pub fn charge_box_id(&self) -> &str {
        &self.charge_box_id
    }

    pub fn command(&self) -> &Command {
        self.task.command()
    }

    /// Whether the target still waits for a result
    pub fn is_open(&self) -> bool {
        self.task.is_pending(&self.charge_box_id)
    }

    pub fn record(&self, result: TargetResult) -> ApplyOutcome {
        self.task
            .apply(ResponseRecord::new(self.charge_box_id.clone(), result))
    }
}
