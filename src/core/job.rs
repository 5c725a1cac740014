//! Job lifecycle: state machine, timing instrumentation, cancellation, and
//! one-shot completion.
//!
//! The lifecycle is implemented once, here, and driven for every job variant
//! through the [`JobBehavior`] capability set. Legal state transitions are
//! Idle→Working→Finished, Idle→Cancelled, and Working→Cancelled; Finished and
//! Cancelled are terminal.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use crate::core::cancel::CancelContext;
use crate::core::error::AppResult;
use crate::core::spawn::DynSpawn;

/// Lifecycle state of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Constructed, not yet admitted.
    Idle = 0,
    /// Body is running.
    Working = 1,
    /// Body completed without error. Terminal.
    Finished = 2,
    /// Cancelled before or during execution, or failed. Terminal.
    Cancelled = 3,
}

impl JobState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Working,
            2 => Self::Finished,
            _ => Self::Cancelled,
        }
    }
}

/// Settled result of a job, delivered once over the completion channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Not settled yet.
    Pending,
    /// Body completed without error.
    Finished,
    /// Body raised an error; the message is the rendered error chain.
    Failed(String),
    /// Cancelled before completing.
    Cancelled,
}

/// One-shot handle resolving to a job's [`JobOutcome`].
///
/// Replaces a mutable subscriber list: any number of handles may be taken from
/// one job, each resolves exactly once, and nothing has to be cleared
/// afterwards. Failure and cancellation settle the handle too, so errors are
/// never silently swallowed.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<JobOutcome>,
}

impl Completion {
    /// Wait until the job settles and return its outcome.
    pub async fn wait(mut self) -> JobOutcome {
        loop {
            let current = self.rx.borrow().clone();
            if !matches!(current, JobOutcome::Pending) {
                return current;
            }
            if self.rx.changed().await.is_err() {
                // Job dropped without settling; report whatever was last seen.
                return self.rx.borrow().clone();
            }
        }
    }
}

/// Execution context handed to a job body.
pub struct JobContext {
    cancel: CancelContext,
    spawner: Arc<dyn DynSpawn>,
}

impl JobContext {
    pub(crate) fn new(cancel: CancelContext, spawner: Arc<dyn DynSpawn>) -> Self {
        Self { cancel, spawner }
    }

    /// The job's cancellation signal, for bodies that poll it mid-execution.
    pub const fn cancel(&self) -> &CancelContext {
        &self.cancel
    }

    /// The substrate the job may fan work out onto.
    pub const fn spawner(&self) -> &Arc<dyn DynSpawn> {
        &self.spawner
    }
}

/// Capability set a job variant supplies; all hooks default to no-ops.
///
/// The shared lifecycle runner in [`Job`] owns timing and state transitions,
/// so implementations provide only the work itself.
#[async_trait]
pub trait JobBehavior: Send + Sync + 'static {
    /// The main body.
    async fn process(&self, _ctx: &JobContext) -> AppResult<()> {
        Ok(())
    }

    /// Post-step after [`process`](Self::process), e.g. resource cleanup.
    async fn process_finished(&self, _ctx: &JobContext) -> AppResult<()> {
        Ok(())
    }

    /// Reaction to explicit cancellation. Runs at most once, and only for
    /// [`Job::cancel`]; the error path settles the outcome channel instead.
    fn cancelled(&self) {}
}

/// Result of one dispatch-driven execution, visible to the dispatcher only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecuteOutcome {
    /// Both body steps ran to completion.
    Completed,
    /// Cancellation had already fired; no work ran.
    CancelledBeforeStart,
}

/// A stateful, cancellable, timed unit of asynchronous work.
///
/// Construct with a [`JobBehavior`] and a [`CancelContext`] (or use the
/// scheduler's `create_job` helpers), wrap in an [`Arc`], and hand to
/// [`Scheduler::queue_job`](crate::core::Scheduler::queue_job). The scheduler
/// keeps no reference once dispatch returns; the owner reclaims the job after
/// settlement.
pub struct Job {
    id: Uuid,
    state: AtomicU8,
    process_time_ns: AtomicU64,
    execution_time_ns: AtomicU64,
    cancel: CancelContext,
    behavior: Box<dyn JobBehavior>,
    outcome_tx: watch::Sender<JobOutcome>,
    outcome_rx: watch::Receiver<JobOutcome>,
}

impl Job {
    /// Create an idle job from a behavior and its cancellation context.
    pub fn new<B: JobBehavior>(behavior: B, cancel: CancelContext) -> Self {
        let (outcome_tx, outcome_rx) = watch::channel(JobOutcome::Pending);
        Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(JobState::Idle as u8),
            process_time_ns: AtomicU64::new(0),
            execution_time_ns: AtomicU64::new(0),
            cancel,
            behavior: Box::new(behavior),
            outcome_tx,
            outcome_rx,
        }
    }

    /// Opaque identity, stable for the job's lifetime.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        JobState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Duration from admission until `process` completed. Zero until set.
    pub fn process_time(&self) -> Duration {
        Duration::from_nanos(self.process_time_ns.load(Ordering::Acquire))
    }

    /// Duration from admission until `process_finished` completed. Zero until
    /// set; at least [`process_time`](Self::process_time) afterwards.
    pub fn execution_time(&self) -> Duration {
        Duration::from_nanos(self.execution_time_ns.load(Ordering::Acquire))
    }

    /// The job's effective cancellation signal.
    pub const fn cancel_context(&self) -> &CancelContext {
        &self.cancel
    }

    /// Take a one-shot completion handle for this job.
    pub fn subscribe(&self) -> Completion {
        Completion {
            rx: self.outcome_rx.clone(),
        }
    }

    /// The outcome as of now ([`JobOutcome::Pending`] until settled).
    pub fn outcome(&self) -> JobOutcome {
        self.outcome_rx.borrow().clone()
    }

    /// Cancel the job. Idempotent: the first call from a non-terminal state
    /// transitions to Cancelled, runs the behavior's `cancelled` hook exactly
    /// once, and settles the outcome; later calls do nothing.
    pub fn cancel(&self) {
        let transitioned = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match JobState::from_raw(raw) {
                    JobState::Finished | JobState::Cancelled => None,
                    JobState::Idle | JobState::Working => Some(JobState::Cancelled as u8),
                }
            });
        if transitioned.is_ok() {
            // Wake an admission wait that may be parked on this job.
            self.cancel.trigger_own();
            self.behavior.cancelled();
            self.settle(JobOutcome::Cancelled);
            tracing::debug!(job = %self.id, "job cancelled");
        }
    }

    /// Run the lifecycle. Dispatcher-only; exactly one dispatch drives a job.
    pub(crate) async fn execute(&self, spawner: Arc<dyn DynSpawn>) -> AppResult<ExecuteOutcome> {
        if self.cancel.is_cancelled() {
            if self.try_transition(JobState::Idle, JobState::Cancelled) {
                self.settle(JobOutcome::Cancelled);
            }
            return Ok(ExecuteOutcome::CancelledBeforeStart);
        }
        if !self.try_transition(JobState::Idle, JobState::Working) {
            // Lost a race with an explicit cancel.
            return Ok(ExecuteOutcome::CancelledBeforeStart);
        }

        let ctx = JobContext::new(self.cancel.clone(), spawner);
        let started = Instant::now();

        if let Err(err) = self.behavior.process(&ctx).await {
            self.fail(&err);
            return Err(err);
        }
        self.process_time_ns
            .store(duration_to_nanos(started.elapsed()), Ordering::Release);

        if let Err(err) = self.behavior.process_finished(&ctx).await {
            self.fail(&err);
            return Err(err);
        }
        self.execution_time_ns
            .store(duration_to_nanos(started.elapsed()), Ordering::Release);

        if self.try_transition(JobState::Working, JobState::Finished) {
            self.settle(JobOutcome::Finished);
        }
        Ok(ExecuteOutcome::Completed)
    }

    /// Error path: park in Cancelled and settle as Failed. The `cancelled`
    /// hook deliberately does not run here. Also invoked by the dispatcher
    /// when a body panic unwinds past [`execute`](Self::execute).
    pub(crate) fn fail(&self, err: &anyhow::Error) {
        if self.try_transition(JobState::Working, JobState::Cancelled) {
            self.settle(JobOutcome::Failed(format!("{err:#}")));
        }
    }

    fn try_transition(&self, from: JobState, to: JobState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// First terminal outcome wins; anything after is ignored.
    fn settle(&self, outcome: JobOutcome) {
        self.outcome_tx.send_if_modified(|current| {
            if matches!(current, JobOutcome::Pending) {
                *current = outcome;
                true
            } else {
                false
            }
        });
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
