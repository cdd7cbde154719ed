//! ChaosForge Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the ChaosForge
//! engine to run against **Production** (tokio) and **Simulation** (virtual
//! clock) environments.
//!
//! # Core Concept
//!
//! Everything that makes a run non-reproducible is intercepted:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Randomness and identifiers (`derive_rng()`, `new_id()`)
//!
//! By deriving all entropy from a single 64-bit seed, any surprising
//! transition outcome becomes reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use chaosforge_env::ForgeContext;
//!
//! fn fire_later<Ctx: ForgeContext>(ctx: Arc<Ctx>) {
//!     let sleeper = Arc::clone(&ctx);
//!     ctx.spawn("transition", async move {
//!         sleeper.sleep(Duration::from_secs(2)).await;
//!         advance();
//!     });
//! }
//! ```

mod context;
mod tokio_impl;
mod types;

pub use context::ForgeContext;
pub use tokio_impl::TokioContext;
pub use types::EntityId;
