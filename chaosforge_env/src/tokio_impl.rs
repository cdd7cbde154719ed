//! Production implementation of ForgeContext using Tokio.

use crate::types::EntityId;
use crate::ForgeContext;
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::Instrument;

/// Production context backed by Tokio and OS entropy.
///
/// Time comes from `tokio::time`, so tests running on a paused tokio clock
/// observe virtual time here as well.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForgeContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("task", name = %name);
        tokio::spawn(future.instrument(span));
    }

    fn derive_rng(&self, _stream: u64) -> ChaCha8Rng {
        // Production draws are independent, not reproducible
        ChaCha8Rng::seed_from_u64(rand::random())
    }

    fn new_id(&self) -> EntityId {
        EntityId::new()
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_context_follows_paused_clock() {
        let ctx = TokioContext::new();
        ctx.sleep(Duration::from_secs(30)).await;
        assert_eq!(ctx.now(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_tokio_context_spawn_runs() {
        let ctx = TokioContext::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        ctx.spawn("probe", async move {
            let _ = tx.send(7u8);
        });
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[test]
    fn test_tokio_context_rng_not_reproducible() {
        let ctx = TokioContext::new();
        let a = ctx.derive_rng(1).next_u64();
        let b = ctx.derive_rng(1).next_u64();

        // In production, streams should differ (random)
        assert_ne!(a, b);
    }

    #[test]
    fn test_tokio_context_ids_unique() {
        let ctx = TokioContext::new();
        assert_ne!(ctx.new_id(), ctx.new_id());
        assert_eq!(ctx.seed(), 0);
    }
}
