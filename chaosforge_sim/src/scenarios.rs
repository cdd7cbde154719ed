//! Named simulation scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// SIM-001: orders walk pending -> processing -> terminal on schedule
    OrderLifecycle,

    /// SIM-002: ship succeeds iff the order completed
    ShipGuard,

    /// SIM-003: job results appear only after completion
    JobResult,

    /// SIM-004: profile visibility lags per view
    ProfilePropagation,

    /// SIM-005: terminal outcome rates match the probability tables
    OutcomeDistribution,

    /// SIM-006: reset clears state and silences in-flight transitions
    ResetIsolation,

    /// SIM-007: 100 concurrent creates, no torn reads
    ConcurrentCreates,

    /// SIM-008: resource provisioning timeline and connect guard
    ResourceProvisioning,

    /// SIM-009: flaky and rate-limited probe failure rates
    FlakyProbes,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::OrderLifecycle,
            ScenarioId::ShipGuard,
            ScenarioId::JobResult,
            ScenarioId::ProfilePropagation,
            ScenarioId::OutcomeDistribution,
            ScenarioId::ResetIsolation,
            ScenarioId::ConcurrentCreates,
            ScenarioId::ResourceProvisioning,
            ScenarioId::FlakyProbes,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::OrderLifecycle => "order_lifecycle",
            ScenarioId::ShipGuard => "ship_guard",
            ScenarioId::JobResult => "job_result",
            ScenarioId::ProfilePropagation => "profile_propagation",
            ScenarioId::OutcomeDistribution => "outcome_distribution",
            ScenarioId::ResetIsolation => "reset_isolation",
            ScenarioId::ConcurrentCreates => "concurrent_creates",
            ScenarioId::ResourceProvisioning => "resource_provisioning",
            ScenarioId::FlakyProbes => "flaky_probes",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::OrderLifecycle => "Orders sampled every step never skip or reverse a status",
            ScenarioId::ShipGuard => "Shipping before completion conflicts and leaves status unchanged",
            ScenarioId::JobResult => "Job result conflicts while queued/running, appears once completed",
            ScenarioId::ProfilePropagation => "Profile hidden from cached view for 2s, search 5s, analytics 10s",
            ScenarioId::OutcomeDistribution => "Completed fraction of N orders within binomial tolerance of 90%",
            ScenarioId::ResetIsolation => "Reset mid-flight; old ids vanish, old timers never touch new state",
            ScenarioId::ConcurrentCreates => "100 concurrent creates then concurrent reads observe whole records",
            ScenarioId::ResourceProvisioning => "t=0 provisioning, t=3s initializing, t=7s ready|error, connect iff ready",
            ScenarioId::FlakyProbes => "Probe failure rates and status codes match the tables",
        }
    }

    /// Returns true if the scenario's cost scales with the batch size.
    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            ScenarioId::OrderLifecycle | ScenarioId::OutcomeDistribution | ScenarioId::FlakyProbes
        )
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl serde::Serialize for ScenarioId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "order_lifecycle" | "orderlifecycle" | "sim-001" => Ok(ScenarioId::OrderLifecycle),
            "ship_guard" | "shipguard" | "sim-002" => Ok(ScenarioId::ShipGuard),
            "job_result" | "jobresult" | "sim-003" => Ok(ScenarioId::JobResult),
            "profile_propagation" | "profilepropagation" | "sim-004" => {
                Ok(ScenarioId::ProfilePropagation)
            }
            "outcome_distribution" | "outcomedistribution" | "sim-005" => {
                Ok(ScenarioId::OutcomeDistribution)
            }
            "reset_isolation" | "resetisolation" | "sim-006" => Ok(ScenarioId::ResetIsolation),
            "concurrent_creates" | "concurrentcreates" | "sim-007" => {
                Ok(ScenarioId::ConcurrentCreates)
            }
            "resource_provisioning" | "resourceprovisioning" | "sim-008" => {
                Ok(ScenarioId::ResourceProvisioning)
            }
            "flaky_probes" | "flakyprobes" | "sim-009" => Ok(ScenarioId::FlakyProbes),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("SIM-006".parse::<ScenarioId>(), Ok(ScenarioId::ResetIsolation));
        assert_eq!("ShipGuard".parse::<ScenarioId>(), Ok(ScenarioId::ShipGuard));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
