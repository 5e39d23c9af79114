//! In-memory task store
//!
//! Tasks are kept only until the operator has had a chance to look at the
//! result; completed tasks are pruned after the retention window.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::task::{Task, TaskHandle, TaskId, TaskSnapshot};
use crate::types::{Command, Endpoint};

/// Registry of live and recently completed tasks
#[derive(Debug)]
pub struct TaskStore {
    next_id: AtomicU64,
    tasks: RwLock<BTreeMap<TaskId, Arc<Task>>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create and register a new task
    pub fn create(&self, command: Command, targets: Vec<Endpoint>, timeout: Duration) -> Arc<Task> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(Task::new(id, command, targets, timeout));
        self.tasks.write().insert(id, Arc::clone(&task));
        task
    }

    pub fn get(&self, id: TaskId) -> Option<TaskHandle> {
        self.tasks.read().get(&id).cloned().map(TaskHandle::new)
    }

    pub fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.tasks.read().get(&id).map(|t| t.snapshot())
    }

    /// Snapshots of all retained tasks, oldest first
    pub fn list(&self) -> Vec<TaskSnapshot> {
        self.tasks.read().values().map(|t| t.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop completed tasks whose completion is older than `older_than`
    pub fn prune_completed(&self, older_than: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            return 0;
        };

        let mut tasks = self.tasks.write();
        let before = tasks.len();
        tasks.retain(|_, t| match t.completed_at() {
            Some(at) => at > cutoff,
            None => true,
        });
        let pruned = before - tasks.len();
        if pruned > 0 {
            debug!("TaskStore: pruned {} completed task(s)", pruned);
        }
        pruned
    }
}
