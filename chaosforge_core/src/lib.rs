//! ChaosForge Core - Stateful Simulation Engine
//!
//! Simulates the timing pathologies of real distributed backends so client
//! tooling can be exercised against them:
//! 1. **Delayed transitions**: every order, job and resource walks a timed
//!    state machine driven by a background scheduler
//! 2. **Partial failure**: terminal outcomes are drawn from probability tables
//! 3. **Eventual consistency**: a profile becomes visible in the cached,
//!    search and analytics views only after per-view lags
//!
//! All time, randomness and id generation come from a
//! [`ForgeContext`](chaosforge_env::ForgeContext), so the same engine runs on
//! tokio in production and on a virtual clock under simulation.

pub mod chaos;
pub mod config;
pub mod consistency;
pub mod engine;
pub mod error;
pub mod facade;
pub mod machine;
pub mod model;
pub mod scheduler;
pub mod store;

// Re-export key types for convenience
pub use chaos::{ChaosDraw, ChaosPolicy, ChaosScenario, ChaosTables, ProbabilityTable};
pub use config::EngineConfig;
pub use consistency::{ConsistencyTracker, View};
pub use engine::ChaosEngine;
pub use error::{ConfigError, EngineError, EngineResult};
pub use facade::EngineFacade;
pub use machine::{Lifecycle, TransitionTable, TransitionTables};
pub use model::*;
pub use store::{EntityStore, Record};
