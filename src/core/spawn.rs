//! Abstraction for dispatching work onto an external task substrate.
//!
//! The scheduler gates admission but never runs work itself; everything it
//! dispatches lands on whatever substrate the caller supplies. A tokio adapter
//! lives in [`crate::runtime`].

use std::future::Future;
use std::pin::Pin;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Object-safe form of [`Spawn`], used where the substrate's concrete type
/// cannot appear (job contexts, batch fan-out).
pub trait DynSpawn: Send + Sync {
    /// Spawn an already-boxed future.
    fn spawn_boxed(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}

impl<S> DynSpawn for S
where
    S: Spawn + Send + Sync,
{
    fn spawn_boxed(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        self.spawn(fut);
    }
}
