//! Lifecycle oracle for simulation.
//!
//! The oracle never drives the engine. It records every status it is shown
//! for each entity and afterwards checks the recorded trail against the
//! engine's own transition tables:
//! - the first observation is the table's initial status
//! - every observed change is reachable along table edges (polling may skip
//!   intermediate statuses, but can never see one out of order)

use chaosforge_core::{
    EntityKind, Job, JobStatus, Order, OrderStatus, Resource, ResourceStatus, TransitionTable,
    TransitionTables,
};
use chaosforge_env::EntityId;
use std::collections::HashMap;
use std::fmt::Display;

/// A lifecycle rule the engine broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: EntityKind,
    pub id: EntityId,
    pub detail: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.id, self.detail)
    }
}

/// Observed statuses of one entity kind, in observation order.
/// Consecutive duplicates are collapsed.
#[derive(Debug, Clone)]
pub struct StatusTrail<S> {
    kind: EntityKind,
    trails: HashMap<EntityId, Vec<S>>,
}

impl<S: Copy + PartialEq + Display> StatusTrail<S> {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            trails: HashMap::new(),
        }
    }

    pub fn observe(&mut self, id: EntityId, status: S) {
        let trail = self.trails.entry(id).or_default();
        if trail.last() != Some(&status) {
            trail.push(status);
        }
    }

    pub fn trail(&self, id: EntityId) -> Option<&[S]> {
        self.trails.get(&id).map(Vec::as_slice)
    }

    /// Last observed status of every entity.
    pub fn latest(&self) -> impl Iterator<Item = (EntityId, S)> + '_ {
        self.trails
            .iter()
            .filter_map(|(id, trail)| trail.last().map(|status| (*id, *status)))
    }

    pub fn len(&self) -> usize {
        self.trails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    /// Checks every trail against `table`.
    pub fn verify(&self, table: &TransitionTable<S>) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (id, trail) in &self.trails {
            if let Some(first) = trail.first() {
                if *first != table.initial {
                    violations.push(Violation {
                        kind: self.kind,
                        id: *id,
                        detail: format!("first seen as {}, expected {}", first, table.initial),
                    });
                }
            }
            for pair in trail.windows(2) {
                if !table.reachable(pair[0], pair[1]) {
                    violations.push(Violation {
                        kind: self.kind,
                        id: *id,
                        detail: format!("illegal change {} -> {}", pair[0], pair[1]),
                    });
                }
            }
        }
        violations
    }
}

/// Status trails for every lifecycle kind.
pub struct LifecycleOracle {
    pub orders: StatusTrail<OrderStatus>,
    pub jobs: StatusTrail<JobStatus>,
    pub resources: StatusTrail<ResourceStatus>,
}

impl LifecycleOracle {
    pub fn new() -> Self {
        Self {
            orders: StatusTrail::new(EntityKind::Order),
            jobs: StatusTrail::new(EntityKind::Job),
            resources: StatusTrail::new(EntityKind::Resource),
        }
    }

    pub fn observe_order(&mut self, order: &Order) {
        self.orders.observe(order.id, order.status);
    }

    pub fn observe_job(&mut self, job: &Job) {
        self.jobs.observe(job.id, job.status);
    }

    pub fn observe_resource(&mut self, resource: &Resource) {
        self.resources.observe(resource.id, resource.status);
    }

    /// Every violation across all kinds.
    pub fn verify(&self, tables: &TransitionTables) -> Vec<Violation> {
        let mut violations = self.orders.verify(&tables.order);
        violations.extend(self.jobs.verify(&tables.job));
        violations.extend(self.resources.verify(&tables.resource));
        violations
    }
}

impl Default for LifecycleOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> EntityId {
        EntityId::from_random_bytes([n; 16])
    }

    #[test]
    fn test_collapses_repeated_observations() {
        let mut trail = StatusTrail::new(EntityKind::Order);
        trail.observe(id(1), OrderStatus::Pending);
        trail.observe(id(1), OrderStatus::Pending);
        trail.observe(id(1), OrderStatus::Processing);
        assert_eq!(
            trail.trail(id(1)).unwrap(),
            &[OrderStatus::Pending, OrderStatus::Processing]
        );
    }

    #[test]
    fn test_valid_trail_with_skipped_status_passes() {
        let tables = TransitionTables::default();
        let mut trail = StatusTrail::new(EntityKind::Order);
        // processing was never sampled
        trail.observe(id(1), OrderStatus::Pending);
        trail.observe(id(1), OrderStatus::Completed);
        trail.observe(id(1), OrderStatus::Shipped);
        assert!(trail.verify(&tables.order).is_empty());
    }

    #[test]
    fn test_reversal_is_flagged() {
        let tables = TransitionTables::default();
        let mut trail = StatusTrail::new(EntityKind::Resource);
        trail.observe(id(2), ResourceStatus::Provisioning);
        trail.observe(id(2), ResourceStatus::Initializing);
        trail.observe(id(2), ResourceStatus::Provisioning);

        let violations = trail.verify(&tables.resource);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].detail.contains("initializing -> provisioning"));
    }

    #[test]
    fn test_terminal_flip_is_flagged() {
        let tables = TransitionTables::default();
        let mut trail = StatusTrail::new(EntityKind::Job);
        trail.observe(id(3), JobStatus::Queued);
        trail.observe(id(3), JobStatus::Failed);
        trail.observe(id(3), JobStatus::Completed);
        assert_eq!(trail.verify(&tables.job).len(), 1);
    }

    #[test]
    fn test_wrong_initial_status_is_flagged() {
        let tables = TransitionTables::default();
        let mut oracle = LifecycleOracle::new();
        oracle.jobs.observe(id(4), JobStatus::Running);
        let violations = oracle.verify(&tables);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, EntityKind::Job);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        const WALK: [OrderStatus; 4] = [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Shipped,
        ];

        proptest! {
            /// Sparse polling of a legal walk never produces a violation.
            #[test]
            fn prop_sampled_walk_verifies(samples in proptest::collection::vec(0usize..4, 1..20)) {
                let tables = TransitionTables::default();
                let mut sorted = samples;
                sorted.sort_unstable();

                let mut trail = StatusTrail::new(EntityKind::Order);
                trail.observe(id(9), OrderStatus::Pending);
                for index in sorted {
                    trail.observe(id(9), WALK[index]);
                }
                prop_assert!(trail.verify(&tables.order).is_empty());
            }

            /// Any backwards step is caught.
            #[test]
            fn prop_backwards_step_flagged(later in 1usize..4, back in 0usize..3) {
                prop_assume!(back < later);
                let tables = TransitionTables::default();
                let mut trail = StatusTrail::new(EntityKind::Order);
                trail.observe(id(9), OrderStatus::Pending);
                trail.observe(id(9), WALK[later]);
                trail.observe(id(9), WALK[back]);
                prop_assert!(!trail.verify(&tables.order).is_empty());
            }
        }
    }
}
