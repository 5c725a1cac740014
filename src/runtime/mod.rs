//! Runtime adapters bridging the scheduler onto concrete task substrates.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
