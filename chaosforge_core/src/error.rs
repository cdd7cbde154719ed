//! Error taxonomy for the simulation engine.

use chaosforge_env::EntityId;
use thiserror::Error;

use crate::chaos::ChaosScenario;
use crate::model::EntityKind;

/// Errors reported synchronously by engine operations.
///
/// The engine never retries on its own; every variant is meant to reach the
/// caller, who decides whether to poll again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Unknown id, or the entity is not yet visible in the requested view.
    /// Callers cannot tell the two cases apart.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: EntityId },

    /// Operation is invalid for the entity's current status.
    #[error("Conflict on {kind} {id}: {message}")]
    Conflict {
        kind: EntityKind,
        id: EntityId,
        message: String,
    },

    /// A chaos draw chose the failure branch of a stateless probe.
    #[error("Transient failure ({scenario}): status {status}")]
    TransientFailure { scenario: ChaosScenario, status: u16 },

    /// The scheduler already holds a pending transition for this entity.
    #[error("Transition already pending for {kind} {id}")]
    TransitionPending { kind: EntityKind, id: EntityId },
}

impl EngineError {
    /// Creates a not-found error.
    pub fn not_found(kind: EntityKind, id: EntityId) -> Self {
        Self::NotFound { kind, id }
    }

    /// Creates a conflict error.
    pub fn conflict(kind: EntityKind, id: EntityId, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            id,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors raised while loading or validating an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid probability for {scenario}: {value} (must be within 0.0..=1.0)")]
    Probability { scenario: ChaosScenario, value: f64 },

    #[error("Propagation lags must be non-decreasing (cached <= search <= analytics)")]
    LagOrder,
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let id = EntityId::from_random_bytes([3u8; 16]);
        let err = EngineError::not_found(EntityKind::Order, id);
        assert_eq!(err.to_string(), format!("order not found: {}", id));
        assert!(err.is_not_found());

        let err = EngineError::conflict(EntityKind::Job, id, "result not available");
        assert!(err.is_conflict());
        assert!(err.to_string().contains("result not available"));
    }

    #[test]
    fn test_transient_failure_message() {
        let err = EngineError::TransientFailure {
            scenario: ChaosScenario::RateLimitedEndpoint,
            status: 429,
        };
        assert_eq!(
            err.to_string(),
            "Transient failure (rate_limited_endpoint): status 429"
        );
    }
}
