//! Core scheduling abstractions: admission control, job lifecycle, batching.

pub mod cancel;
pub mod error;
pub mod job;
pub mod parallel;
pub mod scheduler;
pub mod spawn;

pub use cancel::{CancelContext, CancelSource};
pub use error::{AppResult, SchedulerError};
pub use job::{Completion, Job, JobBehavior, JobContext, JobOutcome, JobState};
pub use parallel::{run_batches, BatchSpec, IndexedWorkload, ParallelJob};
pub use scheduler::{CapacityPermit, Invocation, Scheduler, SchedulerEvent};
pub use spawn::{DynSpawn, Spawn};
