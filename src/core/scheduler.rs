//! Admission-controlled scheduler: permit pool, abort signal, dispatch.
//!
//! The scheduler is an owned instance, not a process-wide singleton; tests and
//! embedders construct as many independent schedulers as they need. It gates
//! admission with a counting semaphore sized to a bounded fraction of
//! available parallelism and dispatches execution onto an external substrate
//! via [`Spawn`]. No ordering is promised between queued jobs: admission is
//! first-available, not first-queued.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};

use crate::config::SchedulerConfig;
use crate::core::cancel::{CancelContext, CancelSource};
use crate::core::error::SchedulerError;
use crate::core::job::{Job, JobBehavior, JobState};
use crate::core::spawn::{DynSpawn, Spawn};

/// A bare asynchronous callable, gated by admission like a job but with no
/// lifecycle state of its own.
pub struct Invocation {
    fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
}

impl Invocation {
    /// Wrap an async block for queuing.
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { fut: Box::pin(fut) }
    }

    async fn run(self) {
        self.fut.await;
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation").finish_non_exhaustive()
    }
}

/// Lifecycle events emitted around job dispatch, carrying the subject job.
///
/// Delivery is unsynchronized with any particular thread; handlers must not
/// assume exclusive access to shared state. Slow receivers may lag and lose
/// events (bounded broadcast channel).
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A job was accepted for dispatch.
    Queued(Arc<Job>),
    /// A job acquired a permit and is about to execute.
    Started(Arc<Job>),
    /// A job's execution settled (successfully or not).
    Finished(Arc<Job>),
}

/// One unit of admission capacity, held until dropped.
///
/// Returned by [`Scheduler::reserve_capacity`] for callers that want a real
/// reservation; dropping it releases the permit.
#[derive(Debug)]
pub struct CapacityPermit {
    _permit: OwnedSemaphorePermit,
}

struct Shared {
    max_concurrent_jobs: usize,
    permits: Arc<Semaphore>,
    abort: Arc<CancelSource>,
    queued: AtomicU64,
    processing: AtomicU64,
    events: broadcast::Sender<SchedulerEvent>,
}

/// Admission controller for background jobs and invocations.
///
/// Holds a permit pool of `max_concurrent_jobs` units, a one-directional
/// abort signal, and queued/processing counters. Dispatch is fire-and-forget:
/// `queue_*` returns immediately and completion is observed through the job's
/// [`Completion`](crate::core::Completion) handle or the event stream.
pub struct Scheduler<S> {
    shared: Arc<Shared>,
    spawner: S,
    dyn_spawner: Arc<dyn DynSpawn>,
}

impl<S> Scheduler<S>
where
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Build a scheduler from a validated configuration and a substrate.
    pub fn new(config: SchedulerConfig, spawner: S) -> Result<Self, SchedulerError> {
        config.validate()?;
        let max_concurrent_jobs = config.effective_max_concurrent_jobs();
        let (events, _) = broadcast::channel(config.event_capacity);
        tracing::info!(max_concurrent_jobs, "scheduler initialized");
        Ok(Self {
            shared: Arc::new(Shared {
                max_concurrent_jobs,
                permits: Arc::new(Semaphore::new(max_concurrent_jobs)),
                abort: Arc::new(CancelSource::new()),
                queued: AtomicU64::new(0),
                processing: AtomicU64::new(0),
                events,
            }),
            dyn_spawner: Arc::new(spawner.clone()),
            spawner,
        })
    }

    /// The fixed concurrency budget.
    #[must_use]
    pub fn max_concurrent_jobs(&self) -> usize {
        self.shared.max_concurrent_jobs
    }

    /// Permits not currently held; equals the budget when idle.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.shared.permits.available_permits()
    }

    /// Jobs and invocations accepted but not yet admitted.
    #[must_use]
    pub fn queued_count(&self) -> u64 {
        self.shared.queued.load(Ordering::Acquire)
    }

    /// Jobs and invocations currently executing.
    #[must_use]
    pub fn processing_count(&self) -> u64 {
        self.shared.processing.load(Ordering::Acquire)
    }

    /// The global abort signal, for downstream consumers that also react to
    /// shutdown.
    #[must_use]
    pub fn abort_signal(&self) -> Arc<CancelSource> {
        Arc::clone(&self.shared.abort)
    }

    /// Subscribe to [`SchedulerEvent`]s.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared.events.subscribe()
    }

    /// Trigger the abort signal. `abort(false)` is a no-op; a triggered
    /// signal cannot be rescinded for the scheduler's lifetime.
    pub fn abort(&self, abort: bool) {
        if abort {
            tracing::warn!("scheduler abort requested");
            self.shared.abort.trigger();
        }
    }

    /// Create a job observing only this scheduler's abort signal.
    pub fn create_job<B: JobBehavior>(&self, behavior: B) -> Arc<Job> {
        Arc::new(Job::new(
            behavior,
            CancelContext::new(Arc::clone(&self.shared.abort)),
        ))
    }

    /// Create a job whose cancellation signal is the union of this
    /// scheduler's abort signal and `cancel`.
    pub fn create_job_with_cancel<B: JobBehavior>(
        &self,
        behavior: B,
        cancel: Arc<CancelSource>,
    ) -> Arc<Job> {
        Arc::new(Job::new(
            behavior,
            CancelContext::with_local(Arc::clone(&self.shared.abort), cancel),
        ))
    }

    /// Queue a job for admission and execution.
    ///
    /// Returns immediately; it never waits for completion. If the scheduler
    /// is aborted the job is cancelled on the spot and `Ok(())` is returned
    /// without consuming a permit or emitting scheduler events. Queuing a job
    /// that is already cancelled is a caller error.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::AlreadyCancelled`] if `job` was cancelled before the
    /// call.
    pub fn queue_job(&self, job: Arc<Job>) -> Result<(), SchedulerError> {
        if self.shared.abort.is_triggered() {
            job.cancel();
            return Ok(());
        }
        if job.state() == JobState::Cancelled {
            return Err(SchedulerError::AlreadyCancelled(job.id()));
        }
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        self.shared.emit(SchedulerEvent::Queued(Arc::clone(&job)));
        tracing::debug!(job = %job.id(), "job queued");

        let shared = Arc::clone(&self.shared);
        let spawner = Arc::clone(&self.dyn_spawner);
        self.spawner.spawn(shared.dispatch_job(spawner, job));
        Ok(())
    }

    /// Queue a bare invocation behind the same admission gate.
    ///
    /// A no-op if the scheduler is aborted. No lifecycle events are emitted
    /// for invocations.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::MissingInvocation`] if `invocation` is `None`.
    pub fn queue_invocation(&self, invocation: Option<Invocation>) -> Result<(), SchedulerError> {
        if self.shared.abort.is_triggered() {
            return Ok(());
        }
        let invocation = invocation.ok_or(SchedulerError::MissingInvocation)?;
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        let shared = Arc::clone(&self.shared);
        self.spawner.spawn(shared.dispatch_invocation(invocation));
        Ok(())
    }

    /// Wait until one admission permit is momentarily available.
    ///
    /// This is a non-consuming probe for callers that throttle their own
    /// submission rate: the permit is released before returning, so repeated
    /// calls never shrink effective concurrency. Use
    /// [`reserve_capacity`](Self::reserve_capacity) to actually hold a unit.
    pub async fn wait_for_capacity(&self) {
        if let Ok(permit) = self.shared.permits.acquire().await {
            drop(permit);
        }
    }

    /// [`wait_for_capacity`](Self::wait_for_capacity) bounded by `timeout`;
    /// returns whether capacity was observed in time.
    pub async fn wait_for_capacity_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_for_capacity())
            .await
            .is_ok()
    }

    /// Acquire one unit of admission capacity and hold it until the returned
    /// permit is dropped.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Runtime`] if the permit pool has been closed.
    pub async fn reserve_capacity(&self) -> Result<CapacityPermit, SchedulerError> {
        let permit = Arc::clone(&self.shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::Runtime("admission pool closed".into()))?;
        Ok(CapacityPermit { _permit: permit })
    }
}

impl<S> fmt::Debug for Scheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("max_concurrent_jobs", &self.shared.max_concurrent_jobs)
            .field("queued", &self.shared.queued.load(Ordering::Acquire))
            .field("processing", &self.shared.processing.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn emit(&self, event: SchedulerEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Dispatch one queued job. Runs on the substrate, concurrently with
    /// other dispatches.
    async fn dispatch_job(self: Arc<Self>, spawner: Arc<dyn DynSpawn>, job: Arc<Job>) {
        if self.abort.is_triggered() {
            job.cancel();
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        // Suspend until a permit is available or cancellation fires,
        // whichever first. A cancelled wait never consumes a permit.
        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!(job = %job.id(), "admission pool closed");
                    self.queued.fetch_sub(1, Ordering::AcqRel);
                    return;
                }
            },
            () = job.cancel_context().cancelled() => {
                job.cancel();
                self.queued.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        };

        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.processing.fetch_add(1, Ordering::AcqRel);
        self.emit(SchedulerEvent::Started(Arc::clone(&job)));
        tracing::debug!(job = %job.id(), "job admitted");

        // A panicking body unwinds past the lifecycle's own error path, so it
        // is caught here and settled the same way a returned error would be.
        // Otherwise the job stays Working forever with its completion handles
        // unresolved, and the processing counter never comes back down.
        match AssertUnwindSafe(job.execute(spawner)).catch_unwind().await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                // Fire-and-forget dispatch: the submitter never sees this
                // synchronously. It is surfaced on the job's outcome and here.
                tracing::error!(job = %job.id(), error = %format!("{err:#}"), "job body failed");
            }
            Err(panic) => {
                let err = anyhow::anyhow!("job body panicked: {}", panic_message(panic.as_ref()));
                job.fail(&err);
                tracing::error!(job = %job.id(), error = %format!("{err:#}"), "job body panicked");
            }
        }
        self.emit(SchedulerEvent::Finished(Arc::clone(&job)));

        self.processing.fetch_sub(1, Ordering::AcqRel);
        // Permit released on every path, else all future admissions deadlock.
        drop(permit);
    }

    async fn dispatch_invocation(self: Arc<Self>, invocation: Invocation) {
        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("admission pool closed");
                    self.queued.fetch_sub(1, Ordering::AcqRel);
                    return;
                }
            },
            () = self.abort.triggered() => {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        };

        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.processing.fetch_add(1, Ordering::AcqRel);
        if let Err(panic) = AssertUnwindSafe(invocation.run()).catch_unwind().await {
            tracing::error!(error = %panic_message(panic.as_ref()), "invocation panicked");
        }
        self.processing.fetch_sub(1, Ordering::AcqRel);
        drop(permit);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
