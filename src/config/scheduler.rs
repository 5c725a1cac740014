//! Scheduler configuration structures.

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;

const DEFAULT_WORKER_HEADROOM: usize = 2;
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Scheduler configuration.
///
/// The concurrency budget defaults to `max(1, available_parallelism -
/// worker_headroom)`, reserving headroom for latency-critical threads (a
/// render loop, an audio thread) sharing the same CPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Explicit concurrency budget; overrides the parallelism probe.
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
    /// Cores reserved for latency-critical threads when probing.
    #[serde(default = "default_worker_headroom")]
    pub worker_headroom: usize,
    /// Capacity of the lifecycle event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_worker_headroom() -> usize {
    DEFAULT_WORKER_HEADROOM
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: None,
            worker_headroom: DEFAULT_WORKER_HEADROOM,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Validation`] for a zero budget or event capacity.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_concurrent_jobs == Some(0) {
            return Err(SchedulerError::Validation(
                "max_concurrent_jobs must be greater than 0".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(SchedulerError::Validation(
                "event_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// The concurrency budget this configuration resolves to: the explicit
    /// override if set, otherwise the parallelism probe minus headroom,
    /// floored at one.
    #[must_use]
    pub fn effective_max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
            .unwrap_or_else(|| num_cpus::get().saturating_sub(self.worker_headroom).max(1))
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Validation`] on parse failure or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| SchedulerError::Validation(format!("config parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
