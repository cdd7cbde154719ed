//! The State Machine Engine.
//!
//! Each entity kind with a lifecycle has a [`TransitionTable`]: scheduled
//! edges (fired by the scheduler after a delay, possibly with a chaos-drawn
//! outcome) and manual edges (taken synchronously by a facade call such as
//! ship or cancel). The table is the single authority on which status changes
//! are legal.
//!
//! A hop is driven by [`advance`]: draw the outcome, apply it with one atomic
//! `mutate` that re-checks the record is still in the status the hop was
//! scheduled for, then register the next hop.

use chaosforge_env::{EntityId, ForgeContext};
use serde_json::json;
use std::collections::VecDeque;
use std::fmt::{Debug, Display};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

use crate::chaos::{ChaosDraw, ChaosScenario};
use crate::config::EngineConfig;
use crate::engine::EngineShared;
use crate::error::EngineResult;
use crate::model::{
    ActivityEvent, ActivityKind, Job, JobStatus, Order, OrderStatus, Resource, ResourceStatus,
    Timestamp,
};
use crate::store::Record;

pub const ORDER_FAILURE: &str = "Processing failed - payment declined";
pub const JOB_FAILURE: &str = "Job execution failed";
pub const RESOURCE_FAILURE: &str = "Provisioning failed - insufficient capacity";

/// Where a scheduled edge leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<S> {
    Always(S),
    Chance {
        scenario: ChaosScenario,
        success: S,
        failure: S,
    },
}

impl<S: Copy> Outcome<S> {
    pub fn targets(&self) -> Vec<S> {
        match *self {
            Outcome::Always(to) => vec![to],
            Outcome::Chance {
                success, failure, ..
            } => vec![success, failure],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopDelay {
    Fixed(Duration),
    /// Taken from the record itself (a job's requested run time).
    Requested,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge<S> {
    pub from: S,
    pub delay: HopDelay,
    pub outcome: Outcome<S>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTable<S> {
    pub initial: S,
    scheduled: Vec<Edge<S>>,
    manual: Vec<(S, S)>,
}

impl<S: Copy + PartialEq> TransitionTable<S> {
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            scheduled: Vec::new(),
            manual: Vec::new(),
        }
    }

    pub fn after(mut self, from: S, delay: HopDelay, outcome: Outcome<S>) -> Self {
        self.scheduled.push(Edge {
            from,
            delay,
            outcome,
        });
        self
    }

    pub fn manual(mut self, from: S, to: S) -> Self {
        self.manual.push((from, to));
        self
    }

    pub fn scheduled_from(&self, from: S) -> Option<&Edge<S>> {
        self.scheduled.iter().find(|edge| edge.from == from)
    }

    /// Statuses reachable from `from` in one step.
    pub fn successors(&self, from: S) -> Vec<S> {
        let mut next: Vec<S> = self
            .scheduled_from(from)
            .map(|edge| edge.outcome.targets())
            .unwrap_or_default();
        next.extend(
            self.manual
                .iter()
                .filter(|(src, _)| *src == from)
                .map(|(_, to)| *to),
        );
        next
    }

    /// True if `from -> to` is a single legal edge.
    pub fn permits(&self, from: S, to: S) -> bool {
        self.successors(from).contains(&to)
    }

    /// True if `to` can be reached from `from` through zero or more edges.
    pub fn reachable(&self, from: S, to: S) -> bool {
        let mut seen = vec![from];
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            for next in self.successors(current) {
                if !seen.contains(&next) {
                    seen.push(next);
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// No edge of any kind leaves `status`.
    pub fn is_terminal(&self, status: S) -> bool {
        self.successors(status).is_empty()
    }
}

/// The lifecycle tables of every kind, built once from config.
#[derive(Debug, Clone)]
pub struct TransitionTables {
    pub order: TransitionTable<OrderStatus>,
    pub job: TransitionTable<JobStatus>,
    pub resource: TransitionTable<ResourceStatus>,
}

impl TransitionTables {
    pub fn from_config(config: &EngineConfig) -> Self {
        let ms = Duration::from_millis;

        let order = TransitionTable::new(OrderStatus::Pending)
            .after(
                OrderStatus::Pending,
                HopDelay::Fixed(ms(config.order.processing_delay_ms)),
                Outcome::Always(OrderStatus::Processing),
            )
            .after(
                OrderStatus::Processing,
                HopDelay::Fixed(ms(config.order.completion_delay_ms)),
                Outcome::Chance {
                    scenario: ChaosScenario::OrderOutcome,
                    success: OrderStatus::Completed,
                    failure: OrderStatus::Failed,
                },
            )
            .manual(OrderStatus::Completed, OrderStatus::Shipped)
            .manual(OrderStatus::Pending, OrderStatus::Cancelled)
            .manual(OrderStatus::Processing, OrderStatus::Cancelled);

        let job = TransitionTable::new(JobStatus::Queued)
            .after(
                JobStatus::Queued,
                HopDelay::Fixed(ms(config.job.start_delay_ms)),
                Outcome::Always(JobStatus::Running),
            )
            .after(
                JobStatus::Running,
                HopDelay::Requested,
                Outcome::Chance {
                    scenario: ChaosScenario::JobOutcome,
                    success: JobStatus::Completed,
                    failure: JobStatus::Failed,
                },
            );

        let resource = TransitionTable::new(ResourceStatus::Provisioning)
            .after(
                ResourceStatus::Provisioning,
                HopDelay::Fixed(ms(config.resource.initializing_delay_ms)),
                Outcome::Always(ResourceStatus::Initializing),
            )
            .after(
                ResourceStatus::Initializing,
                HopDelay::Fixed(ms(config.resource.ready_delay_ms)),
                Outcome::Chance {
                    scenario: ChaosScenario::ResourceOutcome,
                    success: ResourceStatus::Ready,
                    failure: ResourceStatus::Error,
                },
            );

        Self {
            order,
            job,
            resource,
        }
    }
}

impl Default for TransitionTables {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// A stored record that moves through a transition table.
pub trait Lifecycle: Record {
    type Status: Copy + Eq + Debug + Display + Send + Sync + 'static;

    fn status(&self) -> Self::Status;

    /// Moves the record into `to`, stamping whatever fields that status owns.
    fn enter(&mut self, to: Self::Status, at: Timestamp);

    fn transitions(tables: &TransitionTables) -> &TransitionTable<Self::Status>;

    /// Delay used by `HopDelay::Requested` edges.
    fn requested_delay(&self) -> Option<Duration> {
        None
    }

    /// Activity emitted right after entering the current status.
    fn activity(&self, _at: Timestamp) -> Option<ActivityEvent> {
        None
    }
}

impl Lifecycle for Order {
    type Status = OrderStatus;

    fn status(&self) -> OrderStatus {
        self.status
    }

    fn enter(&mut self, to: OrderStatus, at: Timestamp) {
        self.status = to;
        self.updated_at = at;
        match to {
            OrderStatus::Completed => self.completed_at = Some(at),
            OrderStatus::Failed => self.error = Some(ORDER_FAILURE.to_string()),
            OrderStatus::Shipped => self.shipped_at = Some(at),
            OrderStatus::Cancelled => self.cancelled_at = Some(at),
            OrderStatus::Pending | OrderStatus::Processing => {}
        }
    }

    fn transitions(tables: &TransitionTables) -> &TransitionTable<OrderStatus> {
        &tables.order
    }

    fn activity(&self, at: Timestamp) -> Option<ActivityEvent> {
        let kind = match self.status {
            OrderStatus::Processing => ActivityKind::OrderProcessing,
            OrderStatus::Completed | OrderStatus::Failed => ActivityKind::OrderCompleted,
            _ => return None,
        };
        Some(ActivityEvent {
            timestamp: at,
            kind,
            order_id: self.id,
            status: self.status,
        })
    }
}

impl Lifecycle for Job {
    type Status = JobStatus;

    fn status(&self) -> JobStatus {
        self.status
    }

    fn enter(&mut self, to: JobStatus, at: Timestamp) {
        self.status = to;
        match to {
            JobStatus::Running => self.started_at = Some(at),
            JobStatus::Completed => {
                self.completed_at = Some(at);
                self.result = Some(json!({
                    "output": format!("Job {} completed successfully", self.id)
                }));
            }
            JobStatus::Failed => {
                self.completed_at = Some(at);
                self.error = Some(JOB_FAILURE.to_string());
            }
            JobStatus::Queued => {}
        }
    }

    fn transitions(tables: &TransitionTables) -> &TransitionTable<JobStatus> {
        &tables.job
    }

    fn requested_delay(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.run_time_ms))
    }
}

impl Lifecycle for Resource {
    type Status = ResourceStatus;

    fn status(&self) -> ResourceStatus {
        self.status
    }

    fn enter(&mut self, to: ResourceStatus, at: Timestamp) {
        self.status = to;
        self.updated_at = at;
        match to {
            ResourceStatus::Ready => {
                self.endpoint = Some(format!("https://resource-{}.example.com", self.id));
            }
            ResourceStatus::Error => self.error = Some(RESOURCE_FAILURE.to_string()),
            ResourceStatus::Provisioning | ResourceStatus::Initializing => {}
        }
    }

    fn transitions(tables: &TransitionTables) -> &TransitionTable<ResourceStatus> {
        &tables.resource
    }
}

/// Registers the hop leaving `record`'s current status, if there is one.
pub(crate) fn schedule_next<R, Ctx>(shared: &Arc<EngineShared<Ctx>>, record: &R) -> EngineResult<()>
where
    R: Lifecycle,
    Ctx: ForgeContext,
{
    let from = record.status();
    let Some(edge) = R::transitions(&shared.tables).scheduled_from(from) else {
        return Ok(());
    };
    let delay = match edge.delay {
        HopDelay::Fixed(delay) => delay,
        HopDelay::Requested => record.requested_delay().unwrap_or(Duration::ZERO),
    };

    let id = record.id();
    let engine: Weak<EngineShared<Ctx>> = Arc::downgrade(shared);
    shared.scheduler.after(R::KIND, id, delay, move || {
        match engine.upgrade() {
            Some(shared) => advance::<R, Ctx>(&shared, id, from),
            // Engine dropped while the hop slept
            None => Ok(()),
        }
    })?;
    Ok(())
}

/// Fires the scheduled edge leaving `expected` for entity `id`.
///
/// A record that has since moved on (cancelled, or replaced after a reset)
/// is left alone.
pub(crate) fn advance<R, Ctx>(
    shared: &Arc<EngineShared<Ctx>>,
    id: EntityId,
    expected: R::Status,
) -> EngineResult<()>
where
    R: Lifecycle,
    Ctx: ForgeContext,
{
    let Some(edge) = R::transitions(&shared.tables).scheduled_from(expected) else {
        return Ok(());
    };

    let target = match edge.outcome {
        Outcome::Always(to) => to,
        Outcome::Chance {
            scenario,
            success,
            failure,
        } => {
            let mut rng = shared.context.derive_rng(id.stream() ^ scenario.salt());
            match shared.chaos.draw(scenario, &mut rng) {
                ChaosDraw::Success => success,
                ChaosDraw::Failure { .. } => failure,
            }
        }
    };

    let at = shared.timestamp();
    let entered = shared.store.mutate::<R, _, _>(id, |record| {
        if record.status() != expected {
            return Ok(None);
        }
        record.enter(target, at);
        // Logged under the row lock so a concurrent reset clears both together
        if let Some(event) = record.activity(at) {
            shared.store.record_activity(event);
        }
        Ok(Some(record.clone()))
    })?;

    let Some(record) = entered else {
        debug!(kind = %R::KIND, %id, %expected, "stale transition skipped");
        return Ok(());
    };

    debug!(kind = %R::KIND, %id, from = %expected, to = %target, "transition");
    schedule_next(shared, &record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosforge_env::EntityId;
    use chrono::{DateTime, Utc};

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from(std::time::UNIX_EPOCH)
    }

    #[test]
    fn test_order_table_edges() {
        let tables = TransitionTables::default();
        let order = &tables.order;

        assert_eq!(order.initial, OrderStatus::Pending);
        assert!(order.permits(OrderStatus::Pending, OrderStatus::Processing));
        assert!(order.permits(OrderStatus::Processing, OrderStatus::Completed));
        assert!(order.permits(OrderStatus::Processing, OrderStatus::Failed));
        assert!(order.permits(OrderStatus::Completed, OrderStatus::Shipped));
        assert!(order.permits(OrderStatus::Processing, OrderStatus::Cancelled));

        // no skipping, no reversing
        assert!(!order.permits(OrderStatus::Pending, OrderStatus::Completed));
        assert!(!order.permits(OrderStatus::Processing, OrderStatus::Pending));
        assert!(!order.permits(OrderStatus::Failed, OrderStatus::Shipped));
        assert!(!order.permits(OrderStatus::Completed, OrderStatus::Cancelled));
    }

    #[test]
    fn test_order_delays_come_from_config() {
        let mut config = EngineConfig::default();
        config.order.processing_delay_ms = 250;
        let tables = TransitionTables::from_config(&config);

        let edge = tables.order.scheduled_from(OrderStatus::Pending).unwrap();
        assert_eq!(edge.delay, HopDelay::Fixed(Duration::from_millis(250)));
        let edge = tables.order.scheduled_from(OrderStatus::Processing).unwrap();
        assert_eq!(edge.delay, HopDelay::Fixed(Duration::from_secs(3)));
    }

    #[test]
    fn test_reachability() {
        let tables = TransitionTables::default();
        assert!(tables
            .resource
            .reachable(ResourceStatus::Provisioning, ResourceStatus::Ready));
        assert!(!tables
            .resource
            .reachable(ResourceStatus::Error, ResourceStatus::Ready));
        assert!(tables.job.reachable(JobStatus::Queued, JobStatus::Queued));
        assert!(!tables.job.reachable(JobStatus::Completed, JobStatus::Running));
    }

    #[test]
    fn test_terminal_statuses() {
        let tables = TransitionTables::default();
        assert!(tables.order.is_terminal(OrderStatus::Shipped));
        assert!(tables.order.is_terminal(OrderStatus::Failed));
        assert!(!tables.order.is_terminal(OrderStatus::Completed));
        assert!(tables.job.is_terminal(JobStatus::Completed));
        assert!(tables.resource.is_terminal(ResourceStatus::Error));
        assert!(tables.job.scheduled_from(JobStatus::Completed).is_none());
    }

    #[test]
    fn test_job_enter_completed_attaches_result() {
        let id = EntityId::from_random_bytes([5u8; 16]);
        let mut job = Job {
            id,
            job_type: "report".to_string(),
            parameters: None,
            status: JobStatus::Running,
            run_time_ms: 5_000,
            created_at: epoch(),
            started_at: Some(epoch()),
            completed_at: None,
            result: None,
            error: None,
        };
        job.enter(JobStatus::Completed, epoch());

        assert_eq!(job.completed_at, Some(epoch()));
        assert_eq!(
            job.result.as_ref().unwrap()["output"],
            format!("Job {} completed successfully", id)
        );
        assert!(job.error.is_none());
        assert_eq!(job.requested_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_resource_enter_ready_sets_endpoint() {
        let id = EntityId::from_random_bytes([6u8; 16]);
        let mut resource = Resource {
            id,
            resource_type: "db".to_string(),
            config: None,
            status: ResourceStatus::Initializing,
            created_at: epoch(),
            updated_at: epoch(),
            endpoint: None,
            error: None,
        };
        resource.enter(ResourceStatus::Ready, epoch());
        assert_eq!(
            resource.endpoint.as_deref(),
            Some(format!("https://resource-{}.example.com", id).as_str())
        );

        resource.enter(ResourceStatus::Error, epoch());
        assert_eq!(resource.error.as_deref(), Some(RESOURCE_FAILURE));
    }

    #[test]
    fn test_order_activity_only_for_feed_statuses() {
        let mut order = Order {
            id: EntityId::from_random_bytes([7u8; 16]),
            product_id: "sku".to_string(),
            quantity: 1,
            metadata: None,
            status: OrderStatus::Pending,
            created_at: epoch(),
            updated_at: epoch(),
            completed_at: None,
            shipped_at: None,
            cancelled_at: None,
            error: None,
        };
        assert!(order.activity(epoch()).is_none());

        order.enter(OrderStatus::Processing, epoch());
        assert_eq!(
            order.activity(epoch()).map(|e| e.kind),
            Some(ActivityKind::OrderProcessing)
        );

        order.enter(OrderStatus::Failed, epoch());
        let event = order.activity(epoch()).unwrap();
        assert_eq!(event.kind, ActivityKind::OrderCompleted);
        assert_eq!(event.status, OrderStatus::Failed);
        assert_eq!(order.error.as_deref(), Some(ORDER_FAILURE));
    }
}
