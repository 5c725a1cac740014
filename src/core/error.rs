//! Error types for scheduler operations.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by scheduler components.
///
/// These cover synchronous construction/enqueue failures. Errors raised from a
/// job body are unstructured [`anyhow::Error`]s; they surface on the job's
/// outcome channel, not here.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A constructor argument failed validation.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The job was cancelled before it was queued.
    #[error("job {0} is already cancelled")]
    AlreadyCancelled(Uuid),
    /// `queue_invocation` was called without an invocation.
    #[error("no invocation supplied")]
    MissingInvocation,
    /// Substrate-level failure with context.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Application-facing result using anyhow, used by job bodies.
pub type AppResult<T> = Result<T, anyhow::Error>;
