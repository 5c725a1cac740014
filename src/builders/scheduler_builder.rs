//! Builder to construct a scheduler from configuration.

use crate::config::SchedulerConfig;
use crate::core::{Scheduler, SchedulerError, Spawn};

/// Fluent construction of a [`Scheduler`] over a chosen substrate.
#[derive(Debug)]
pub struct SchedulerBuilder<S> {
    config: SchedulerConfig,
    spawner: S,
}

impl<S> SchedulerBuilder<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Start from default configuration and the given substrate.
    pub fn new(spawner: S) -> Self {
        Self {
            config: SchedulerConfig::default(),
            spawner,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Pin the concurrency budget instead of probing parallelism.
    #[must_use]
    pub fn with_max_concurrent_jobs(mut self, limit: usize) -> Self {
        self.config.max_concurrent_jobs = Some(limit);
        self
    }

    /// Cores reserved for latency-critical threads when probing.
    #[must_use]
    pub fn with_worker_headroom(mut self, headroom: usize) -> Self {
        self.config.worker_headroom = headroom;
        self
    }

    /// Capacity of the lifecycle event channel.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Validate the configuration and build the scheduler.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Validation`] if the configuration is invalid.
    pub fn build(self) -> Result<Scheduler<S>, SchedulerError> {
        Scheduler::new(self.config, self.spawner)
    }
}
