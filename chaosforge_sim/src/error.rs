use chaosforge_core::{ConfigError, EngineError};
use thiserror::Error;

/// Reasons a scenario could not run to completion.
///
/// Assertion failures are not errors; they end up in
/// [`ScenarioResult::failure_reason`](crate::ScenarioResult).
#[derive(Debug, Error)]
pub enum SimError {
    #[error("engine configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("unexpected engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("simulated task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
