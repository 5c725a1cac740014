//! # jobgate
//!
//! A bounded-concurrency job scheduler: a process-wide gate that caps how many
//! asynchronous units of work may run simultaneously, so background work does
//! not starve latency-critical threads (a render loop, an audio thread)
//! sharing the same CPU.
//!
//! ## Core Problem Solved
//!
//! Background work in interactive applications competes with threads that have
//! hard frame budgets. Dumping every background task straight onto the runtime
//! saturates all cores:
//!
//! - **Frame starvation**: N-wide background bursts steal cores the render
//!   loop was counting on
//! - **Unbounded fan-out**: asset pipelines and index builds produce far more
//!   work items than cores
//! - **Messy shutdown**: in-flight and queued work must drain predictably when
//!   the process winds down
//!
//! ## Key Features
//!
//! - **Permit-based admission**: a counting pool sized to
//!   `max(1, available_parallelism - headroom)` gates every job and invocation
//! - **Job lifecycle**: Idle → Working → Finished with explicit, idempotent
//!   cancellation and per-job timing instrumentation
//! - **Parallel batching**: fixed-length indexed workloads split into uniform
//!   batches, one concurrent task per batch, synchronous iteration within
//! - **One-shot completion**: each job settles a completion handle exactly
//!   once, on success, failure, or cancellation
//! - **Substrate-agnostic**: dispatch goes through a [`core::Spawn`]
//!   abstraction; a tokio adapter is provided
//!
//! ## Example
//!
//! ```rust,ignore
//! use jobgate::builders::SchedulerBuilder;
//! use jobgate::core::{IndexedWorkload, ParallelJob};
//! use jobgate::runtime::TokioSpawner;
//!
//! struct Lightmap { texels: Vec<Texel> }
//! impl IndexedWorkload for Lightmap {
//!     fn process_index(&self, index: usize) { bake(&self.texels[index]); }
//! }
//!
//! let scheduler = SchedulerBuilder::new(TokioSpawner::new(handle)).build()?;
//! let job = scheduler.create_job(ParallelJob::new(texels.len(), 64, lightmap)?);
//! let completion = job.subscribe();
//! scheduler.queue_job(job)?;
//! let outcome = completion.wait().await;
//! ```
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: admission, lifecycle, batching.
pub mod core;
/// Configuration models for the scheduler.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Runtime adapters and the tokio substrate.
pub mod runtime;
/// Shared utilities.
pub mod util;
