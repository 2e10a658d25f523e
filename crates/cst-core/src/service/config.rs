use std::time::Duration;

use crate::error::ClusterError;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Name of the local node, used in log lines.
    pub node_name: String,
    /// Batches slower than this (compute + publish) are logged as warnings.
    pub slow_task_logging_threshold_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            node_name: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown-node".to_string()),
            slow_task_logging_threshold_ms: 10_000,
        }
    }
}

impl ServiceConfig {
    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    pub fn with_slow_task_logging_threshold_ms(mut self, ms: u64) -> Self {
        self.slow_task_logging_threshold_ms = ms;
        self
    }

    pub fn slow_task_logging_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_task_logging_threshold_ms)
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.node_name.trim().is_empty() {
            return Err(ClusterError::Config("node_name must not be empty".into()));
        }
        if self.slow_task_logging_threshold_ms == 0 {
            return Err(ClusterError::Config(
                "slow_task_logging_threshold_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
