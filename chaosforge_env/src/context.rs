//! Core environment context trait for the ChaosForge engine.

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::time::{Duration, SystemTime};

use crate::types::EntityId;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the simulation engine can
/// run against a real clock (tokio) or a virtual one (the sim harness).
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, OS entropy
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Every source of non-determinism the engine touches (time, randomness,
/// identifiers) goes through this trait.
#[async_trait]
pub trait ForgeContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Visibility windows and scheduler deadlines are measured on this clock.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time for record timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: waits until the virtual clock reaches the deadline
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns an independent RNG stream.
    ///
    /// Each randomized decision gets its own stream so draws for different
    /// entities never share state. In simulation the stream is derived from
    /// the master seed combined with `stream`; in production it is freshly
    /// seeded from OS entropy and `stream` is ignored.
    fn derive_rng(&self, stream: u64) -> ChaCha8Rng;

    /// Mints a new entity identifier.
    fn new_id(&self) -> EntityId;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
