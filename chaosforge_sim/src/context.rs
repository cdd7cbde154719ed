//! Simulation context implementing ForgeContext for deterministic testing.

use async_trait::async_trait;
use chaosforge_env::{EntityId, ForgeContext};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::Instrument;

/// Consecutive yields without any task parking or finishing before
/// `settle` gives up on a task that waits on something other than the clock.
const STALL_ROUNDS: usize = 64;

#[derive(Default)]
struct Clock {
    now: Duration,
    sleepers: HashMap<u64, (Duration, Waker)>,
    next_key: u64,
}

/// Simulation context backed by a virtual clock and a seeded RNG.
///
/// Time never moves on its own. A sleeping task parks its waker here and is
/// woken only when the harness pushes the clock past its deadline with
/// [`advance_time`](SimContext::advance_time) or
/// [`set_time`](SimContext::set_time).
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    clock: Arc<Mutex<Clock>>,

    /// Deterministic RNG for ids
    rng: Mutex<ChaCha8Rng>,

    /// Tasks spawned through this context that have not finished
    live: Arc<AtomicUsize>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock: Arc::new(Mutex::new(Clock::default())),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            live: Arc::new(AtomicUsize::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    fn clock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let target = self.now() + duration;
        self.set_time(target);
    }

    /// Moves the clock to `time` and wakes every sleeper that is now due.
    /// The clock never runs backwards; an earlier `time` is ignored.
    pub fn set_time(&self, time: Duration) {
        let due: Vec<Waker> = {
            let mut clock = self.clock();
            if time <= clock.now {
                return;
            }
            clock.now = time;
            let keys: Vec<u64> = clock
                .sleepers
                .iter()
                .filter(|(_, (deadline, _))| *deadline <= time)
                .map(|(key, _)| *key)
                .collect();
            keys.into_iter()
                .filter_map(|key| clock.sleepers.remove(&key))
                .map(|(_, waker)| waker)
                .collect()
        };
        for waker in due {
            waker.wake();
        }
    }

    /// The earliest deadline any task is sleeping towards.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.clock()
            .sleepers
            .values()
            .map(|(deadline, _)| *deadline)
            .min()
    }

    /// Number of tasks currently parked on the clock.
    pub fn sleeper_count(&self) -> usize {
        self.clock().sleepers.len()
    }

    /// Number of spawned tasks that have not finished.
    pub fn live_tasks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of spawned tasks that could still run at the current time.
    fn runnable(&self) -> usize {
        self.live_tasks().saturating_sub(self.sleeper_count())
    }

    /// Lets runnable tasks drain before the clock moves again.
    ///
    /// Returns once every live task is either finished or parked on the
    /// clock. A task blocked elsewhere would never park, so the loop also
    /// ends after [`STALL_ROUNDS`] yields in which nothing changed.
    pub async fn settle(&self) {
        let mut last = (self.live_tasks(), self.sleeper_count());
        let mut idle = 0;
        while self.runnable() > 0 && idle < STALL_ROUNDS {
            tokio::task::yield_now().await;
            let seen = (self.live_tasks(), self.sleeper_count());
            if seen == last {
                idle += 1;
            } else {
                idle = 0;
                last = seen;
            }
        }
        // One last turn for wakeups that do not go through the clock
        tokio::task::yield_now().await;
    }
}

/// Decrements the live-task count when a spawned task ends or is dropped.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Future returned by [`SimContext::sleep`].
struct VirtualSleep {
    clock: Arc<Mutex<Clock>>,
    deadline: Duration,
    key: Option<u64>,
}

impl Future for VirtualSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        let mut clock = this.clock.lock().unwrap_or_else(|e| e.into_inner());
        if clock.now >= this.deadline {
            if let Some(key) = this.key.take() {
                clock.sleepers.remove(&key);
            }
            return Poll::Ready(());
        }

        let key = match this.key {
            Some(key) => key,
            None => {
                let key = clock.next_key;
                clock.next_key += 1;
                this.key = Some(key);
                key
            }
        };
        clock
            .sleepers
            .insert(key, (this.deadline, cx.waker().clone()));
        Poll::Pending
    }
}

impl Drop for VirtualSleep {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
            clock.sleepers.remove(&key);
        }
    }
}

#[async_trait]
impl ForgeContext for SimContext {
    fn now(&self) -> Duration {
        self.clock().now
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + duration;
        VirtualSleep {
            clock: Arc::clone(&self.clock),
            deadline,
            key: None,
        }
        .await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("sim_task", name = %name);
        self.live.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live));
        tokio::spawn(
            async move {
                let _guard = guard;
                future.await;
            }
            .instrument(span),
        );
    }

    fn derive_rng(&self, stream: u64) -> ChaCha8Rng {
        // Combine master seed with the stream id for an independent sequence
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream;
        ChaCha8Rng::seed_from_u64(combined_seed)
    }

    fn new_id(&self) -> EntityId {
        let mut bytes = [0u8; 16];
        self.rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fill_bytes(&mut bytes);
        EntityId::from_random_bytes(bytes)
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));

        // never backwards
        ctx.set_time(Duration::from_millis(10));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_sim_context_wall_clock_starts_at_epoch() {
        let ctx = SimContext::new(1);
        let since_unix = ctx.system_time().duration_since(UNIX_EPOCH).unwrap();
        assert_eq!(since_unix, Duration::from_secs(1704067200));
    }

    #[test]
    fn test_sim_context_deterministic_streams() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        // Same seed + stream = same sequence
        assert_eq!(ctx1.derive_rng(1).next_u64(), ctx2.derive_rng(1).next_u64());

        // Different stream = different sequence
        assert_ne!(ctx1.derive_rng(1).next_u64(), ctx1.derive_rng(2).next_u64());
    }

    #[test]
    fn test_sim_context_deterministic_ids() {
        let ctx1 = SimContext::new(7);
        let ctx2 = SimContext::new(7);
        let a: Vec<EntityId> = (0..5).map(|_| ctx1.new_id()).collect();
        let b: Vec<EntityId> = (0..5).map(|_| ctx2.new_id()).collect();
        assert_eq!(a, b);
        assert_ne!(a[0], a[1]);

        assert_ne!(SimContext::new(8).new_id(), a[0]);
    }

    #[tokio::test]
    async fn test_sleep_waits_for_virtual_clock() {
        let ctx = SimContext::shared(42);
        let done = Arc::new(AtomicBool::new(false));

        let sleeper = Arc::clone(&ctx);
        let flag = Arc::clone(&done);
        ctx.spawn("sleeper", async move {
            sleeper.sleep(Duration::from_secs(2)).await;
            flag.store(true, Ordering::SeqCst);
        });

        ctx.settle().await;
        assert_eq!(ctx.next_deadline(), Some(Duration::from_secs(2)));
        assert!(!done.load(Ordering::SeqCst));

        ctx.set_time(Duration::from_millis(1_999));
        ctx.settle().await;
        assert!(!done.load(Ordering::SeqCst));

        ctx.set_time(Duration::from_secs(2));
        ctx.settle().await;
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(ctx.sleeper_count(), 0);
        assert_eq!(ctx.next_deadline(), None);
    }

    #[tokio::test]
    async fn test_settle_drains_large_batches() {
        let ctx = SimContext::shared(5);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..2_000 {
            let sleeper = Arc::clone(&ctx);
            let done = Arc::clone(&done);
            ctx.spawn("hop", async move {
                sleeper.sleep(Duration::from_secs(1)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        ctx.settle().await;
        assert_eq!(ctx.live_tasks(), 2_000);
        assert_eq!(ctx.sleeper_count(), 2_000);

        ctx.set_time(Duration::from_secs(1));
        ctx.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 2_000);
        assert_eq!(ctx.live_tasks(), 0);
    }

    #[tokio::test]
    async fn test_zero_sleep_is_immediate() {
        let ctx = SimContext::shared(3);
        ctx.advance_time(Duration::from_secs(9));
        ctx.sleep(Duration::ZERO).await;
        assert_eq!(ctx.now(), Duration::from_secs(9));
        assert_eq!(ctx.sleeper_count(), 0);
    }
}
