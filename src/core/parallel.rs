//! Fixed-length workload batching on top of the job lifecycle.
//!
//! A [`ParallelJob`] splits an indexed workload of known length into uniform
//! contiguous batches and runs the batches concurrently on the substrate, each
//! batch iterating its index range synchronously. One suspension point per
//! batch, not per index; a per-index suspension would be prohibitively
//! expensive for large workloads.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::core::error::{AppResult, SchedulerError};
use crate::core::job::{JobBehavior, JobContext};

/// A fixed-length indexed workload.
///
/// `process_index` is synchronous and returns nothing; it is invoked exactly
/// once for every index in `[0, length)` across all batches.
pub trait IndexedWorkload: Send + Sync + 'static {
    /// Process a single index.
    fn process_index(&self, index: usize);
}

/// Partition of `[0, length)` into contiguous batches of `batch_length`
/// indices, the last batch possibly shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSpec {
    length: usize,
    batch_length: usize,
    total_batches: usize,
}

impl BatchSpec {
    /// Validate and build a partition. Both `length` and `batch_length` must
    /// be greater than zero.
    pub fn new(length: usize, batch_length: usize) -> Result<Self, SchedulerError> {
        if length == 0 {
            return Err(SchedulerError::Validation(
                "length must be greater than 0".into(),
            ));
        }
        if batch_length == 0 {
            return Err(SchedulerError::Validation(
                "batch_length must be greater than 0".into(),
            ));
        }
        Ok(Self {
            length,
            batch_length,
            total_batches: length.div_ceil(batch_length),
        })
    }

    /// Total number of indices.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Indices per batch (except possibly the last).
    #[must_use]
    pub const fn batch_length(&self) -> usize {
        self.batch_length
    }

    /// Number of batches, `ceil(length / batch_length)`.
    #[must_use]
    pub const fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// Index range of batch `batch` (0-based); empty past the last batch.
    #[must_use]
    pub fn batch_range(&self, batch: usize) -> Range<usize> {
        let start = self.length.min(batch.saturating_mul(self.batch_length));
        let end = self.length.min(start + self.batch_length);
        start..end
    }
}

/// Dispatch every batch of `spec` on the substrate and wait for all of them.
///
/// Failure semantics: all batches settle before any failure is surfaced, and
/// the failing batch with the lowest index wins. A batch fails by panicking or
/// by being dropped by the substrate before it ran to completion; its
/// remaining indices are then unprocessed.
///
/// Public so a custom [`JobBehavior`] can do preparation in its own `process`
/// and invoke the batching afterwards.
pub async fn run_batches<W>(spec: BatchSpec, workload: &Arc<W>, ctx: &JobContext) -> AppResult<()>
where
    W: IndexedWorkload,
{
    let mut pending = Vec::with_capacity(spec.total_batches());
    for batch in 0..spec.total_batches() {
        let (done_tx, done_rx) = oneshot::channel();
        let range = spec.batch_range(batch);
        let workload = Arc::clone(workload);
        ctx.spawner().spawn_boxed(Box::pin(async move {
            for index in range {
                workload.process_index(index);
            }
            let _ = done_tx.send(());
        }));
        pending.push((batch, done_rx));
    }

    let mut failed = None;
    for (batch, done_rx) in pending {
        if done_rx.await.is_err() && failed.is_none() {
            failed = Some(batch);
        }
    }
    match failed {
        None => Ok(()),
        Some(batch) => Err(anyhow::anyhow!(
            "batch {batch} aborted before completing its index range"
        )),
    }
}

/// Ready-made [`JobBehavior`] whose `process` is the batching primitive.
pub struct ParallelJob<W> {
    spec: BatchSpec,
    workload: Arc<W>,
}

impl<W: IndexedWorkload> ParallelJob<W> {
    /// Build a parallel job over `length` indices in batches of
    /// `batch_length`. Fails with [`SchedulerError::Validation`] if either is
    /// zero; no side effects in that case.
    pub fn new(length: usize, batch_length: usize, workload: W) -> Result<Self, SchedulerError> {
        Ok(Self {
            spec: BatchSpec::new(length, batch_length)?,
            workload: Arc::new(workload),
        })
    }

    /// Total number of indices.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.spec.length()
    }

    /// Indices per batch.
    #[must_use]
    pub const fn batch_length(&self) -> usize {
        self.spec.batch_length()
    }

    /// Number of batches.
    #[must_use]
    pub const fn total_batches(&self) -> usize {
        self.spec.total_batches()
    }

    /// The underlying partition.
    #[must_use]
    pub const fn spec(&self) -> BatchSpec {
        self.spec
    }

    /// The shared workload.
    #[must_use]
    pub const fn workload(&self) -> &Arc<W> {
        &self.workload
    }
}

#[async_trait]
impl<W: IndexedWorkload> JobBehavior for ParallelJob<W> {
    async fn process(&self, ctx: &JobContext) -> AppResult<()> {
        run_batches(self.spec, &self.workload, ctx).await
    }
}
