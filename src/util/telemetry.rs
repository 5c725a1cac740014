//! Tracing setup shared by embedders, benches, and tests.

/// Install the default env-filtered `fmt` subscriber.
///
/// Does nothing when a subscriber is already in place, so embedders that
/// configure their own telemetry can still call this unconditionally. The
/// scheduler logs admission and dispatch at `debug`, job failures at `error`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
