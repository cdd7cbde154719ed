//! ChaosForge Deterministic Simulation Harness
//!
//! Runs a [`ChaosEngine`](chaosforge_core::ChaosEngine) on a virtual clock so
//! that multi-second lifecycles finish in microseconds and every run is a
//! pure function of one 64-bit seed.
//!
//! # Core Principle: The Clock Only Moves When Told
//!
//! - **Time**: scheduled hops park on [`SimContext`]; the harness jumps the
//!   clock from deadline to deadline and lets woken hops run in between
//! - **Randomness**: ids and chaos draws are derived from the seed
//! - **Scheduling**: scenarios run on a single-threaded runtime
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      SimWorld                        │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ SimContext (virtual clock + seeded RNG)        │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                        │                             │
//! │                  ┌─────▼──────┐                      │
//! │                  │ ChaosEngine│                      │
//! │                  └─────▲──────┘                      │
//! │                        │ polls                       │
//! │               ┌────────┴────────┐                    │
//! │               │ LifecycleOracle │                    │
//! │               └─────────────────┘                    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chaosforge_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 1_000).run(ScenarioId::OutcomeDistribution);
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod oracle;
pub mod runner;
pub mod scenarios;
mod world;

pub use context::SimContext;
pub use error::SimError;
pub use oracle::{LifecycleOracle, StatusTrail, Violation};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{SimConfig, SimWorld};
