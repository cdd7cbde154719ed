//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::SimError;

use chaosforge_core::{ChaosEngine, EngineConfig};
use chaosforge_env::ForgeContext;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Entities created per batch by the scenarios
    pub batch_size: usize,

    /// Observation interval for scenarios that sample state over time
    pub step: Duration,

    /// Engine timings and probabilities
    pub engine: EngineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            batch_size: 1_000,
            step: Duration::from_millis(250),
            engine: EngineConfig::default(),
        }
    }
}

/// The SimWorld - one engine running on one virtual clock.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    engine: ChaosEngine<SimContext>,

    /// Clock moves performed so far
    steps: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let context = SimContext::shared(config.seed);
        let engine = ChaosEngine::new(Arc::clone(&context), config.engine.clone())?;

        Ok(Self {
            config,
            context,
            engine,
            steps: 0,
        })
    }

    pub fn engine(&self) -> &ChaosEngine<SimContext> {
        &self.engine
    }

    /// Lets spawned tasks run without moving the clock.
    pub async fn settle(&self) {
        self.context.settle().await;
    }

    /// Advances virtual time by `duration`.
    ///
    /// The clock stops at every pending deadline on the way, in order, and
    /// lets woken tasks run before moving on; a hop registered by a woken
    /// task is honoured in the same call if it falls inside the window.
    pub async fn run_for(&mut self, duration: Duration) {
        let target = self.context.now() + duration;
        self.settle().await;

        while let Some(deadline) = self.context.next_deadline() {
            if deadline > target {
                break;
            }
            self.context.set_time(deadline);
            self.steps += 1;
            self.settle().await;
        }

        self.context.set_time(target);
        self.settle().await;
    }

    /// Advances to absolute virtual time `time`. Earlier times are a no-op.
    pub async fn run_until(&mut self, time: Duration) {
        let now = self.context.now();
        if time > now {
            self.run_for(time - now).await;
        }
    }

    /// Runs for `duration` in `config.step` slices, calling `observe` after
    /// each slice.
    pub async fn run_observed<F>(&mut self, duration: Duration, mut observe: F)
    where
        F: FnMut(&ChaosEngine<SimContext>),
    {
        let target = self.context.now() + duration;
        let step = self.config.step.max(Duration::from_millis(1));
        observe(&self.engine);
        while self.context.now() < target {
            let slice = step.min(target - self.context.now());
            self.run_for(slice).await;
            observe(&self.engine);
        }
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    pub fn now(&self) -> Duration {
        self.context.now()
    }

    /// Returns the number of deadline stops taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosforge_core::{EngineFacade, NewOrder, OrderStatus};

    fn order() -> NewOrder {
        NewOrder {
            product_id: "sku".to_string(),
            quantity: 1,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_sim_world_runs_order_to_terminal() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        let id = world.engine().create_order(order()).unwrap();

        world.run_for(Duration::from_millis(1_999)).await;
        assert_eq!(world.engine().get_order(id).unwrap().status, OrderStatus::Pending);

        world.run_for(Duration::from_millis(1)).await;
        assert_eq!(
            world.engine().get_order(id).unwrap().status,
            OrderStatus::Processing
        );

        world.run_until(Duration::from_secs(5)).await;
        let status = world.engine().get_order(id).unwrap().status;
        assert!(matches!(status, OrderStatus::Completed | OrderStatus::Failed));
        assert_eq!(world.engine().pending_transitions(), 0);
        assert_eq!(world.time(), 5.0);
    }

    #[tokio::test]
    async fn test_sim_world_determinism() {
        async fn outcomes(seed: u64) -> Vec<OrderStatus> {
            let config = SimConfig {
                seed,
                ..Default::default()
            };
            let mut world = SimWorld::new(config).unwrap();
            let ids: Vec<_> = (0..50)
                .map(|_| world.engine().create_order(order()).unwrap())
                .collect();
            world.run_for(Duration::from_secs(6)).await;
            ids.iter()
                .map(|id| world.engine().get_order(*id).unwrap().status)
                .collect()
        }

        // Same seed = same outcomes
        assert_eq!(outcomes(42).await, outcomes(42).await);
    }

    #[tokio::test]
    async fn test_full_batch_keeps_schedule() {
        let mut world = SimWorld::new(SimConfig::default()).unwrap();
        let ids: Vec<_> = (0..1_000)
            .map(|_| world.engine().create_order(order()).unwrap())
            .collect();

        world.run_for(Duration::from_secs(2)).await;
        let processing = ids
            .iter()
            .filter(|id| world.engine().get_order(**id).unwrap().status == OrderStatus::Processing)
            .count();
        assert_eq!(processing, 1_000);

        world.run_for(Duration::from_secs(3)).await;
        let terminal = ids
            .iter()
            .filter(|id| {
                matches!(
                    world.engine().get_order(**id).unwrap().status,
                    OrderStatus::Completed | OrderStatus::Failed
                )
            })
            .count();
        assert_eq!(terminal, 1_000);
        assert_eq!(world.context.live_tasks(), 0);
    }

    #[tokio::test]
    async fn test_run_observed_samples_each_step() {
        let config = SimConfig {
            step: Duration::from_millis(500),
            ..Default::default()
        };
        let mut world = SimWorld::new(config).unwrap();
        let mut samples = 0;
        world
            .run_observed(Duration::from_secs(2), |_| samples += 1)
            .await;
        assert_eq!(samples, 5);
        assert_eq!(world.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_engine_config_is_rejected() {
        let mut config = SimConfig::default();
        config.engine.chaos.order_outcome.success = 2.0;
        assert!(matches!(SimWorld::new(config), Err(SimError::Config(_))));
    }
}
