//! The "CHAOS" Policy - stateless probability draws.
//!
//! Every randomized decision in the engine funnels through [`ChaosPolicy::draw`]:
//! the terminal branch of each state machine and the two diagnostic probes.
//! The policy holds only its probability tables. Randomness is injected per
//! call, so two entities never share RNG state and a seeded caller gets
//! reproducible outcomes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Named scenarios with their own probability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosScenario {
    OrderOutcome,
    JobOutcome,
    ResourceOutcome,
    FlakyEndpoint,
    RateLimitedEndpoint,
}

impl ChaosScenario {
    pub fn all() -> [ChaosScenario; 5] {
        [
            ChaosScenario::OrderOutcome,
            ChaosScenario::JobOutcome,
            ChaosScenario::ResourceOutcome,
            ChaosScenario::FlakyEndpoint,
            ChaosScenario::RateLimitedEndpoint,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChaosScenario::OrderOutcome => "order_outcome",
            ChaosScenario::JobOutcome => "job_outcome",
            ChaosScenario::ResourceOutcome => "resource_outcome",
            ChaosScenario::FlakyEndpoint => "flaky_endpoint",
            ChaosScenario::RateLimitedEndpoint => "rate_limited_endpoint",
        }
    }

    /// Salt mixed into RNG stream ids so one entity's draws for different
    /// scenarios stay independent.
    pub fn salt(&self) -> u64 {
        match self {
            ChaosScenario::OrderOutcome => 0x9e37_79b9_7f4a_7c15,
            ChaosScenario::JobOutcome => 0xbf58_476d_1ce4_e5b9,
            ChaosScenario::ResourceOutcome => 0x94d0_49bb_1331_11eb,
            ChaosScenario::FlakyEndpoint => 0x517c_c1b7_2722_0a95,
            ChaosScenario::RateLimitedEndpoint => 0x3c6e_f372_fe94_f82b,
        }
    }
}

impl std::fmt::Display for ChaosScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Probability table for a single scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    /// Probability of the success branch, within `0.0..=1.0`.
    pub success: f64,

    /// Status code reported when the failure branch is drawn
    pub failure_status: u16,
}

impl ProbabilityTable {
    pub const fn new(success: f64, failure_status: u16) -> Self {
        Self {
            success,
            failure_status,
        }
    }

    pub fn failure(&self) -> f64 {
        1.0 - self.success
    }
}

/// One table per scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosTables {
    pub order_outcome: ProbabilityTable,
    pub job_outcome: ProbabilityTable,
    pub resource_outcome: ProbabilityTable,
    pub flaky_endpoint: ProbabilityTable,
    pub rate_limited_endpoint: ProbabilityTable,
}

impl Default for ChaosTables {
    fn default() -> Self {
        Self {
            order_outcome: ProbabilityTable::new(0.90, 402),
            job_outcome: ProbabilityTable::new(0.85, 500),
            resource_outcome: ProbabilityTable::new(0.80, 503),
            flaky_endpoint: ProbabilityTable::new(0.50, 503),
            rate_limited_endpoint: ProbabilityTable::new(0.70, 429),
        }
    }
}

impl ChaosTables {
    pub fn table(&self, scenario: ChaosScenario) -> &ProbabilityTable {
        match scenario {
            ChaosScenario::OrderOutcome => &self.order_outcome,
            ChaosScenario::JobOutcome => &self.job_outcome,
            ChaosScenario::ResourceOutcome => &self.resource_outcome,
            ChaosScenario::FlakyEndpoint => &self.flaky_endpoint,
            ChaosScenario::RateLimitedEndpoint => &self.rate_limited_endpoint,
        }
    }

    /// Rejects probabilities outside `0.0..=1.0` (including NaN).
    pub fn validate(&self) -> Result<(), ConfigError> {
        for scenario in ChaosScenario::all() {
            let value = self.table(scenario).success;
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { scenario, value });
            }
        }
        Ok(())
    }
}

/// Outcome of a single draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaosDraw {
    Success,
    Failure { status: u16 },
}

impl ChaosDraw {
    pub fn is_success(&self) -> bool {
        matches!(self, ChaosDraw::Success)
    }
}

/// Stateless evaluator over a set of [`ChaosTables`].
#[derive(Debug, Clone, Default)]
pub struct ChaosPolicy {
    tables: ChaosTables,
}

impl ChaosPolicy {
    pub fn new(tables: ChaosTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &ChaosTables {
        &self.tables
    }

    /// Draws once for `scenario` using the caller's RNG.
    ///
    /// `success == 1.0` always succeeds and `success == 0.0` always fails.
    pub fn draw<R: Rng + ?Sized>(&self, scenario: ChaosScenario, rng: &mut R) -> ChaosDraw {
        let table = self.tables.table(scenario);
        // gen::<f64>() is uniform over [0, 1)
        if rng.gen::<f64>() < table.success {
            ChaosDraw::Success
        } else {
            ChaosDraw::Failure {
                status: table.failure_status,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn success_rate(policy: &ChaosPolicy, scenario: ChaosScenario, seed: u64, n: usize) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let wins = (0..n)
            .filter(|_| policy.draw(scenario, &mut rng).is_success())
            .count();
        wins as f64 / n as f64
    }

    #[test]
    fn test_default_tables_match_documented_rates() {
        let tables = ChaosTables::default();
        assert_eq!(tables.order_outcome.success, 0.90);
        assert_eq!(tables.job_outcome.success, 0.85);
        assert_eq!(tables.resource_outcome.success, 0.80);
        assert_eq!(tables.flaky_endpoint.failure(), 0.50);
        assert_abs_diff_eq!(tables.rate_limited_endpoint.failure(), 0.30, epsilon = 1e-12);
        assert_eq!(tables.rate_limited_endpoint.failure_status, 429);
        assert_eq!(tables.flaky_endpoint.failure_status, 503);
    }

    #[test]
    fn test_order_outcome_rate_within_binomial_tolerance() {
        // sd = sqrt(0.9 * 0.1 / 10_000) = 0.003; allow 4 sd
        let policy = ChaosPolicy::default();
        let rate = success_rate(&policy, ChaosScenario::OrderOutcome, 42, 10_000);
        assert_abs_diff_eq!(rate, 0.90, epsilon = 0.012);
    }

    #[test]
    fn test_flaky_rate_within_binomial_tolerance() {
        let policy = ChaosPolicy::default();
        let rate = success_rate(&policy, ChaosScenario::FlakyEndpoint, 7, 10_000);
        assert_abs_diff_eq!(rate, 0.50, epsilon = 0.02);
    }

    #[test]
    fn test_failure_carries_status() {
        let tables = ChaosTables {
            rate_limited_endpoint: ProbabilityTable::new(0.0, 429),
            ..ChaosTables::default()
        };
        let policy = ChaosPolicy::new(tables);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(
            policy.draw(ChaosScenario::RateLimitedEndpoint, &mut rng),
            ChaosDraw::Failure { status: 429 }
        );
    }

    #[test]
    fn test_same_seed_same_draws() {
        let policy = ChaosPolicy::default();
        let mut a = ChaCha8Rng::seed_from_u64(99);
        let mut b = ChaCha8Rng::seed_from_u64(99);
        for _ in 0..100 {
            assert_eq!(
                policy.draw(ChaosScenario::JobOutcome, &mut a),
                policy.draw(ChaosScenario::JobOutcome, &mut b)
            );
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut tables = ChaosTables::default();
        assert!(tables.validate().is_ok());

        tables.job_outcome.success = 1.5;
        assert!(matches!(
            tables.validate(),
            Err(ConfigError::Probability {
                scenario: ChaosScenario::JobOutcome,
                ..
            })
        ));

        tables.job_outcome.success = f64::NAN;
        assert!(tables.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_certain_tables_are_certain(seed in any::<u64>()) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let always = ChaosPolicy::new(ChaosTables {
                order_outcome: ProbabilityTable::new(1.0, 402),
                ..ChaosTables::default()
            });
            let never = ChaosPolicy::new(ChaosTables {
                order_outcome: ProbabilityTable::new(0.0, 402),
                ..ChaosTables::default()
            });
            prop_assert!(always.draw(ChaosScenario::OrderOutcome, &mut rng).is_success());
            prop_assert!(!never.draw(ChaosScenario::OrderOutcome, &mut rng).is_success());
        }
    }
}
