//! The engine's owned state and its handle.
//!
//! [`ChaosEngine`] is a cheap, cloneable handle around one [`EngineShared`]:
//! the store, the scheduler, the visibility tracker and the chaos policy all
//! live there and nowhere else. Scheduled hops reach the shared state through
//! a weak reference, so dropping the last handle stops the machine.
//!
//! The operations themselves live on [`EngineFacade`](crate::EngineFacade).

use chaosforge_env::ForgeContext;
use chrono::{DateTime, Utc};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::chaos::{ChaosPolicy, ChaosScenario};
use crate::config::EngineConfig;
use crate::consistency::{ConsistencyTracker, ViewLags};
use crate::error::ConfigError;
use crate::machine::TransitionTables;
use crate::model::Timestamp;
use crate::scheduler::Scheduler;
use crate::store::EntityStore;

pub struct EngineShared<Ctx: ForgeContext> {
    pub(crate) context: Arc<Ctx>,
    pub(crate) config: EngineConfig,
    pub(crate) store: EntityStore,
    pub(crate) scheduler: Scheduler<Ctx>,
    pub(crate) visibility: ConsistencyTracker,
    pub(crate) chaos: ChaosPolicy,
    pub(crate) tables: TransitionTables,

    /// Gives every probe call its own RNG stream
    probe_counter: AtomicU64,

    /// Held shared by multi-part writes, exclusively by reset
    reset_lock: RwLock<()>,
}

impl<Ctx: ForgeContext> EngineShared<Ctx> {
    /// Wall-clock time for record fields.
    pub(crate) fn timestamp(&self) -> Timestamp {
        DateTime::<Utc>::from(self.context.system_time())
    }

    /// Monotonic time for visibility checks.
    pub(crate) fn now(&self) -> Duration {
        self.context.now()
    }

    /// Keeps a reset from landing between the parts of one write.
    pub(crate) fn write_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.reset_lock.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn reset_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.reset_lock.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn probe_rng(&self, scenario: ChaosScenario) -> ChaCha8Rng {
        let n = self.probe_counter.fetch_add(1, Ordering::Relaxed);
        self.context.derive_rng(n ^ scenario.salt())
    }
}

/// The Stateful Simulation Engine.
pub struct ChaosEngine<Ctx: ForgeContext> {
    pub(crate) shared: Arc<EngineShared<Ctx>>,
}

impl<Ctx: ForgeContext> Clone for ChaosEngine<Ctx> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Ctx: ForgeContext> ChaosEngine<Ctx> {
    /// Builds an engine on `context` after validating `config`.
    pub fn new(context: Arc<Ctx>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(context, config))
    }

    /// Builds an engine with the default timings and probabilities.
    pub fn with_defaults(context: Arc<Ctx>) -> Self {
        Self::build(context, EngineConfig::default())
    }

    fn build(context: Arc<Ctx>, config: EngineConfig) -> Self {
        let shared = EngineShared {
            scheduler: Scheduler::new(Arc::clone(&context)),
            visibility: ConsistencyTracker::new(ViewLags::from(&config.propagation)),
            chaos: ChaosPolicy::new(config.chaos.clone()),
            tables: TransitionTables::from_config(&config),
            store: EntityStore::new(),
            probe_counter: AtomicU64::new(0),
            reset_lock: RwLock::new(()),
            context,
            config,
        };

        tracing::info!(seed = shared.context.seed(), "engine started");
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.shared.context
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn tables(&self) -> &TransitionTables {
        &self.shared.tables
    }

    /// Number of scheduled hops that have not fired yet.
    pub fn pending_transitions(&self) -> usize {
        self.shared.scheduler.pending_count()
    }
}
