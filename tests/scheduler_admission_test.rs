//! Integration tests for permit-based admission control.
//!
//! These validate:
//! 1. The concurrency cap is never exceeded under a burst
//! 2. Abort cancels queued work without consuming permits
//! 3. Failing jobs never leak permits
//! 4. Counters return to baseline once all work settles
//! 5. Capacity waits do not shrink effective concurrency
//! 6. Lifecycle events fire in order

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use jobgate::builders::SchedulerBuilder;
use jobgate::core::{
    AppResult, Invocation, JobBehavior, JobContext, JobOutcome, JobState, Scheduler,
    SchedulerError, SchedulerEvent,
};
use jobgate::runtime::TokioSpawner;

fn scheduler_with_limit(limit: usize) -> Scheduler<TokioSpawner> {
    SchedulerBuilder::new(TokioSpawner::new(tokio::runtime::Handle::current()))
        .with_max_concurrent_jobs(limit)
        .build()
        .expect("scheduler configuration")
}

async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

// Sleeps while tracking how many bodies overlap.
struct GaugedJob {
    millis: u64,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl JobBehavior for GaugedJob {
    async fn process(&self, _ctx: &JobContext) -> AppResult<()> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

struct NoopJob;

#[async_trait]
impl JobBehavior for NoopJob {}

struct FailingJob;

#[async_trait]
impl JobBehavior for FailingJob {
    async fn process(&self, _ctx: &JobContext) -> AppResult<()> {
        anyhow::bail!("deliberate failure")
    }
}

#[tokio::test]
async fn concurrency_never_exceeds_budget() {
    let limit = 3;
    let scheduler = scheduler_with_limit(limit);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut completions = Vec::new();
    for _ in 0..12 {
        let job = scheduler.create_job(GaugedJob {
            millis: 20,
            current: Arc::clone(&current),
            peak: Arc::clone(&peak),
        });
        completions.push(job.subscribe());
        scheduler.queue_job(job).expect("queue");
    }

    let outcomes = join_all(completions.into_iter().map(jobgate::core::Completion::wait)).await;
    assert!(outcomes.iter().all(|o| *o == JobOutcome::Finished));
    assert!(
        peak.load(Ordering::SeqCst) <= limit,
        "peak {} exceeded budget {limit}",
        peak.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn queue_after_abort_cancels_without_admission() {
    let scheduler = scheduler_with_limit(2);
    scheduler.abort(true);

    let job = scheduler.create_job(NoopJob);
    let completion = job.subscribe();
    scheduler.queue_job(Arc::clone(&job)).expect("queue is ok after abort");

    assert_eq!(completion.wait().await, JobOutcome::Cancelled);
    assert_eq!(job.state(), JobState::Cancelled);
    assert_eq!(scheduler.available_permits(), 2);
    assert_eq!(scheduler.queued_count(), 0);
    assert_eq!(scheduler.processing_count(), 0);
}

#[tokio::test]
async fn abort_false_is_a_noop() {
    let scheduler = scheduler_with_limit(2);
    scheduler.abort(false);
    assert!(!scheduler.abort_signal().is_triggered());

    let job = scheduler.create_job(NoopJob);
    let completion = job.subscribe();
    scheduler.queue_job(job).expect("queue");
    assert_eq!(completion.wait().await, JobOutcome::Finished);
}

#[tokio::test]
async fn abort_cannot_be_rescinded() {
    let scheduler = scheduler_with_limit(2);
    scheduler.abort(true);
    scheduler.abort(false);
    assert!(scheduler.abort_signal().is_triggered());
}

#[tokio::test]
async fn queuing_a_pre_cancelled_job_is_an_error() {
    let scheduler = scheduler_with_limit(2);
    let job = scheduler.create_job(NoopJob);
    job.cancel();

    let result = scheduler.queue_job(job);
    assert!(matches!(result, Err(SchedulerError::AlreadyCancelled(_))));
}

#[tokio::test]
async fn failing_job_releases_its_permit() {
    let scheduler = scheduler_with_limit(1);

    let failing = scheduler.create_job(FailingJob);
    let completion = failing.subscribe();
    scheduler.queue_job(failing).expect("queue");
    assert!(matches!(completion.wait().await, JobOutcome::Failed(_)));

    // An otherwise-identical follow-up job must still admit and complete.
    let follow_up = scheduler.create_job(NoopJob);
    let completion = follow_up.subscribe();
    scheduler.queue_job(follow_up).expect("queue");
    assert_eq!(completion.wait().await, JobOutcome::Finished);

    assert!(
        wait_until(Duration::from_secs(2), || scheduler.available_permits() == 1).await,
        "permit leaked"
    );
}

#[tokio::test]
async fn counters_return_to_baseline() {
    let scheduler = scheduler_with_limit(2);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut completions = Vec::new();
    for _ in 0..8 {
        let job = scheduler.create_job(GaugedJob {
            millis: 10,
            current: Arc::clone(&current),
            peak: Arc::clone(&peak),
        });
        completions.push(job.subscribe());
        scheduler.queue_job(job).expect("queue");
    }
    join_all(completions.into_iter().map(jobgate::core::Completion::wait)).await;

    assert!(
        wait_until(Duration::from_secs(2), || {
            scheduler.queued_count() == 0 && scheduler.processing_count() == 0
        })
        .await,
        "queued={} processing={}",
        scheduler.queued_count(),
        scheduler.processing_count()
    );
}

#[tokio::test]
async fn invocation_runs_behind_the_gate() {
    let scheduler = scheduler_with_limit(2);
    let ran = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&ran);
    scheduler
        .queue_invocation(Some(Invocation::new(async move {
            flag.store(true, Ordering::SeqCst);
        })))
        .expect("queue invocation");

    assert!(wait_until(Duration::from_secs(2), || ran.load(Ordering::SeqCst)).await);
    assert!(
        wait_until(Duration::from_secs(2), || scheduler.processing_count() == 0).await
    );
}

#[tokio::test]
async fn panicking_invocation_releases_its_permit() {
    let scheduler = scheduler_with_limit(1);
    scheduler
        .queue_invocation(Some(Invocation::new(async {
            panic!("invocation blew up");
        })))
        .expect("queue invocation");

    assert!(
        wait_until(Duration::from_secs(2), || {
            scheduler.processing_count() == 0
                && scheduler.queued_count() == 0
                && scheduler.available_permits() == 1
        })
        .await,
        "counters and permit must recover after an invocation panic"
    );

    // The gate still admits work afterwards.
    let job = scheduler.create_job(NoopJob);
    let completion = job.subscribe();
    scheduler.queue_job(job).expect("queue after panic");
    assert_eq!(completion.wait().await, JobOutcome::Finished);
}

#[tokio::test]
async fn missing_invocation_is_an_error() {
    let scheduler = scheduler_with_limit(2);
    assert!(matches!(
        scheduler.queue_invocation(None),
        Err(SchedulerError::MissingInvocation)
    ));
}

#[tokio::test]
async fn invocation_after_abort_is_dropped() {
    let scheduler = scheduler_with_limit(2);
    scheduler.abort(true);
    let ran = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&ran);
    scheduler
        .queue_invocation(Some(Invocation::new(async move {
            flag.store(true, Ordering::SeqCst);
        })))
        .expect("no-op after abort");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(scheduler.available_permits(), 2);
}

#[tokio::test]
async fn wait_for_capacity_is_non_consuming() {
    let scheduler = scheduler_with_limit(2);
    for _ in 0..5 {
        scheduler.wait_for_capacity().await;
    }
    assert_eq!(scheduler.available_permits(), 2);

    // A job must still be admissible afterwards.
    let job = scheduler.create_job(NoopJob);
    let completion = job.subscribe();
    scheduler.queue_job(job).expect("queue");
    assert_eq!(completion.wait().await, JobOutcome::Finished);
}

#[tokio::test]
async fn wait_for_capacity_timeout_reflects_saturation() {
    let scheduler = scheduler_with_limit(2);

    let first = scheduler.reserve_capacity().await.expect("reserve");
    let second = scheduler.reserve_capacity().await.expect("reserve");
    assert!(
        !scheduler
            .wait_for_capacity_timeout(Duration::from_millis(50))
            .await
    );

    drop(second);
    assert!(
        scheduler
            .wait_for_capacity_timeout(Duration::from_secs(1))
            .await
    );
    drop(first);
    assert_eq!(scheduler.available_permits(), 2);
}

#[tokio::test]
async fn events_fire_in_lifecycle_order() {
    let scheduler = scheduler_with_limit(2);
    let mut events = scheduler.subscribe_events();

    let job = scheduler.create_job(NoopJob);
    let id = job.id();
    let completion = job.subscribe();
    scheduler.queue_job(job).expect("queue");
    completion.wait().await;

    let queued = events.recv().await.expect("queued event");
    assert!(matches!(queued, SchedulerEvent::Queued(job) if job.id() == id));
    let started = events.recv().await.expect("started event");
    assert!(matches!(started, SchedulerEvent::Started(job) if job.id() == id));
    let finished = events.recv().await.expect("finished event");
    assert!(matches!(finished, SchedulerEvent::Finished(job) if job.id() == id));
}
