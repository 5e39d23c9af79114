//! Dispatch configuration

use std::time::Duration;

/// Settings for the command dispatcher and task store
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Deadline applied to every task unless the caller gives one
    pub default_timeout: Duration,

    /// How long completed tasks stay observable
    pub task_retention: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            task_retention: Duration::from_secs(600),
        }
    }
}

impl DispatchConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.task_retention = retention;
        self
    }
}
