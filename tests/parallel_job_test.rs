//! Integration tests for fixed-length workload batching: partition shape,
//! exactly-once index coverage, validation, and failure surfacing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jobgate::builders::SchedulerBuilder;
use jobgate::core::{
    run_batches, AppResult, BatchSpec, IndexedWorkload, JobBehavior, JobContext, JobOutcome,
    ParallelJob, Scheduler, SchedulerError,
};
use jobgate::runtime::TokioSpawner;

fn scheduler_with_limit(limit: usize) -> Scheduler<TokioSpawner> {
    SchedulerBuilder::new(TokioSpawner::new(tokio::runtime::Handle::current()))
        .with_max_concurrent_jobs(limit)
        .build()
        .expect("scheduler configuration")
}

struct CountingWorkload {
    hits: Arc<Vec<AtomicU32>>,
}

impl IndexedWorkload for CountingWorkload {
    fn process_index(&self, index: usize) {
        self.hits[index].fetch_add(1, Ordering::SeqCst);
    }
}

struct PanickingWorkload;

impl IndexedWorkload for PanickingWorkload {
    fn process_index(&self, index: usize) {
        assert!(index != 3, "index 3 is poisoned");
    }
}

fn hit_counters(length: usize) -> Arc<Vec<AtomicU32>> {
    Arc::new((0..length).map(|_| AtomicU32::new(0)).collect())
}

#[test]
fn ten_by_three_yields_four_batches() {
    let job = ParallelJob::new(10, 3, CountingWorkload { hits: hit_counters(10) })
        .expect("valid dimensions");
    assert_eq!(job.length(), 10);
    assert_eq!(job.batch_length(), 3);
    assert_eq!(job.total_batches(), 4);
    assert_eq!(job.spec().batch_range(0), 0..3);
    assert_eq!(job.spec().batch_range(3), 9..10);
}

#[test]
fn zero_dimensions_are_rejected() {
    assert!(matches!(
        ParallelJob::new(0, 3, CountingWorkload { hits: hit_counters(1) }),
        Err(SchedulerError::Validation(_))
    ));
    assert!(matches!(
        ParallelJob::new(3, 0, CountingWorkload { hits: hit_counters(3) }),
        Err(SchedulerError::Validation(_))
    ));
}

#[tokio::test]
async fn every_index_is_processed_exactly_once() {
    let scheduler = scheduler_with_limit(4);
    for batch_length in [1_usize, 7] {
        for length in [1_usize, batch_length, batch_length + 1, 100] {
            let hits = hit_counters(length);
            let job = scheduler.create_job(
                ParallelJob::new(length, batch_length, CountingWorkload {
                    hits: Arc::clone(&hits),
                })
                .expect("valid dimensions"),
            );
            let completion = job.subscribe();
            scheduler.queue_job(job).expect("queue");
            assert_eq!(completion.wait().await, JobOutcome::Finished);

            for (index, count) in hits.iter().enumerate() {
                assert_eq!(
                    count.load(Ordering::SeqCst),
                    1,
                    "index {index} (length={length}, batch_length={batch_length})"
                );
            }
        }
    }
}

#[tokio::test]
async fn panicking_batch_surfaces_as_failure() {
    let scheduler = scheduler_with_limit(2);
    let job = scheduler.create_job(ParallelJob::new(10, 2, PanickingWorkload).expect("valid"));
    let completion = job.subscribe();
    scheduler.queue_job(job).expect("queue");

    let outcome = completion.wait().await;
    assert!(matches!(outcome, JobOutcome::Failed(msg) if msg.contains("batch 1")));
}

// A behavior doing preparation before invoking the batching primitive itself.
struct PreparedBatches {
    spec: BatchSpec,
    workload: Arc<CountingWorkload>,
    prepared: Arc<AtomicBool>,
}

#[async_trait]
impl JobBehavior for PreparedBatches {
    async fn process(&self, ctx: &JobContext) -> AppResult<()> {
        self.prepared.store(true, Ordering::SeqCst);
        run_batches(self.spec, &self.workload, ctx).await
    }
}

#[tokio::test]
async fn custom_behavior_can_prepare_then_batch() {
    let scheduler = scheduler_with_limit(2);
    let hits = hit_counters(25);
    let prepared = Arc::new(AtomicBool::new(false));
    let job = scheduler.create_job(PreparedBatches {
        spec: BatchSpec::new(25, 4).expect("valid"),
        workload: Arc::new(CountingWorkload {
            hits: Arc::clone(&hits),
        }),
        prepared: Arc::clone(&prepared),
    });
    let completion = job.subscribe();
    scheduler.queue_job(job).expect("queue");

    assert_eq!(completion.wait().await, JobOutcome::Finished);
    assert!(prepared.load(Ordering::SeqCst));
    assert!(hits.iter().all(|count| count.load(Ordering::SeqCst) == 1));
}
