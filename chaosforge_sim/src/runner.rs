//! Scenario runner - executes simulation scenarios against a seeded world.

use crate::oracle::LifecycleOracle;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};
use crate::SimError;

use chaosforge_core::{
    ChaosScenario, EngineConfig, EngineError, EngineFacade, JobStatus, NewJob, NewOrder,
    NewProfile, NewResource, OrderStatus, ResourceStatus, View,
};
use chaosforge_env::{EntityId, ForgeContext};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Records left in the store at the end
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn aborted(scenario: ScenarioId, seed: u64, err: SimError) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            final_time_secs: 0.0,
            final_entity_count: 0,
            failure_reason: Some(err.to_string()),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Entities created through the facade
    pub entities_created: u64,

    /// Deadline stops taken by the virtual clock
    pub clock_stops: u64,

    /// Status samples taken by the oracle
    pub observations: u64,

    /// Conflict errors returned (expected ones included)
    pub conflicts: u64,

    /// Terminal successes (completed / ready / probe success)
    pub successes: u64,

    /// Terminal failures (failed / error / probe failure)
    pub failures: u64,
}

/// Assertion collector; a scenario passes when nothing was recorded.
#[derive(Debug, Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn check(&mut self, ok: bool, message: impl FnOnce() -> String) {
        if !ok {
            let message = message();
            debug!("  check failed: {}", message);
            self.failures.push(message);
        }
    }

    fn reason(&self) -> Option<String> {
        match self.failures.len() {
            0 => None,
            1 => Some(self.failures[0].clone()),
            n => Some(format!("{} (and {} more)", self.failures[0], n - 1)),
        }
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Entities per batch for the scaling scenarios
    batch_size: usize,

    /// Sampling interval
    step: Duration,

    engine: EngineConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, batch_size: usize) -> Self {
        Self {
            seed,
            batch_size: batch_size.max(1),
            step: Duration::from_millis(250),
            engine: EngineConfig::default(),
        }
    }

    /// Sets the engine configuration.
    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the sampling interval.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    fn world(&self) -> Result<SimWorld, SimError> {
        SimWorld::new(SimConfig {
            seed: self.seed,
            batch_size: self.batch_size,
            step: self.step,
            engine: self.engine.clone(),
        })
    }

    /// Runs a scenario and returns the result.
    ///
    /// Each run gets a fresh single-threaded runtime, so task interleaving is
    /// a function of the seed alone.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let outcome = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(SimError::from)
            .and_then(|runtime| runtime.block_on(self.execute(scenario)));

        outcome.unwrap_or_else(|err| {
            warn!("Scenario {} aborted: {}", scenario.name(), err);
            ScenarioResult::aborted(scenario, self.seed, err)
        })
    }

    async fn execute(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let mut world = self.world()?;
        let mut metrics = ScenarioMetrics::default();
        let mut checks = Checks::default();

        match scenario {
            ScenarioId::OrderLifecycle => {
                self.run_order_lifecycle(&mut world, &mut metrics, &mut checks).await?
            }
            ScenarioId::ShipGuard => {
                self.run_ship_guard(&mut world, &mut metrics, &mut checks).await?
            }
            ScenarioId::JobResult => {
                self.run_job_result(&mut world, &mut metrics, &mut checks).await?
            }
            ScenarioId::ProfilePropagation => {
                self.run_profile_propagation(&mut world, &mut metrics, &mut checks).await?
            }
            ScenarioId::OutcomeDistribution => {
                self.run_outcome_distribution(&mut world, &mut metrics, &mut checks).await?
            }
            ScenarioId::ResetIsolation => {
                self.run_reset_isolation(&mut world, &mut metrics, &mut checks).await?
            }
            ScenarioId::ConcurrentCreates => {
                self.run_concurrent_creates(&mut world, &mut metrics, &mut checks).await?
            }
            ScenarioId::ResourceProvisioning => {
                self.run_resource_provisioning(&mut world, &mut metrics, &mut checks).await?
            }
            ScenarioId::FlakyProbes => {
                self.run_flaky_probes(&mut world, &mut metrics, &mut checks).await?
            }
        }

        metrics.clock_stops = world.steps();
        let passed = checks.failures.is_empty();
        if passed {
            info!("✓ {} complete: {:?}", scenario.name(), metrics);
        }

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            final_time_secs: world.time(),
            final_entity_count: world.engine().health().stats.total(),
            failure_reason: checks.reason(),
            metrics,
        })
    }

    fn new_order(i: usize) -> NewOrder {
        NewOrder {
            product_id: format!("sku-{}", i),
            quantity: (i % 7 + 1) as u32,
            metadata: None,
        }
    }

    /// SIM-001: OrderLifecycle - every sample matches the configured timeline.
    async fn run_order_lifecycle(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        let n = self.batch_size.min(200);
        let timings = world.config.engine.order.clone();
        let start = world.now();
        let processing_at = start + Duration::from_millis(timings.processing_delay_ms);
        let terminal_at = processing_at + Duration::from_millis(timings.completion_delay_ms);

        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            ids.push(world.engine().create_order(Self::new_order(i))?);
        }
        metrics.entities_created += n as u64;

        let mut oracle = LifecycleOracle::new();
        let mut mismatches = Vec::new();
        let mut observations = 0u64;
        let horizon = terminal_at - start + Duration::from_secs(1);

        world
            .run_observed(horizon, |engine| {
                let now = engine.context().now();
                for id in &ids {
                    let Ok(order) = engine.get_order(*id) else {
                        mismatches.push(format!("order {} vanished at {:?}", id, now));
                        continue;
                    };
                    observations += 1;
                    oracle.observe_order(&order);

                    let on_time = if now < processing_at {
                        order.status == OrderStatus::Pending
                    } else if now < terminal_at {
                        order.status == OrderStatus::Processing
                    } else {
                        matches!(order.status, OrderStatus::Completed | OrderStatus::Failed)
                    };
                    if !on_time {
                        mismatches.push(format!("order {} was {} at {:?}", id, order.status, now));
                    }
                }
            })
            .await;

        metrics.observations += observations;
        for (_, status) in oracle.orders.latest() {
            match status {
                OrderStatus::Completed => metrics.successes += 1,
                OrderStatus::Failed => metrics.failures += 1,
                _ => {}
            }
        }

        let violations = oracle.verify(world.engine().tables());
        checks.check(violations.is_empty(), || {
            format!("{} lifecycle violations, first: {}", violations.len(), violations[0])
        });
        checks.check(mismatches.is_empty(), || {
            format!("{} off-schedule samples, first: {}", mismatches.len(), mismatches[0])
        });
        checks.check(world.engine().pending_transitions() == 0, || {
            format!("{} transitions still pending", world.engine().pending_transitions())
        });
        Ok(())
    }

    /// SIM-002: ShipGuard - ship succeeds iff the order is completed.
    async fn run_ship_guard(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        let n = self.batch_size.min(100);
        let timings = world.config.engine.order.clone();
        let processing_at = Duration::from_millis(timings.processing_delay_ms);
        let terminal_at = processing_at + Duration::from_millis(timings.completion_delay_ms);

        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            ids.push(world.engine().create_order(Self::new_order(i))?);
        }
        metrics.entities_created += n as u64;

        // Too early: pending, then processing
        let midway = processing_at + (terminal_at - processing_at) / 2;
        for phase in [Duration::ZERO, midway] {
            world.run_until(phase).await;
            for id in &ids {
                let before = world.engine().get_order(*id)?.status;
                let shipped = world.engine().ship_order(*id);
                let after = world.engine().get_order(*id)?.status;
                if matches!(shipped, Err(EngineError::Conflict { .. })) {
                    metrics.conflicts += 1;
                }
                checks.check(matches!(shipped, Err(EngineError::Conflict { .. })), || {
                    format!("ship of {} order {} did not conflict", before, id)
                });
                checks.check(before == after, || {
                    format!("rejected ship moved order {} from {} to {}", id, before, after)
                });
            }
        }

        world.run_until(terminal_at + Duration::from_secs(1)).await;
        for id in &ids {
            let status = world.engine().get_order(*id)?.status;
            match world.engine().ship_order(*id) {
                Ok(order) => {
                    metrics.successes += 1;
                    checks.check(status == OrderStatus::Completed, || {
                        format!("order {} shipped from {}", id, status)
                    });
                    checks.check(
                        order.status == OrderStatus::Shipped && order.shipped_at.is_some(),
                        || format!("shipped order {} not stamped", id),
                    );
                    // A second ship is a conflict as well
                    checks.check(world.engine().ship_order(*id).is_err(), || {
                        format!("order {} shipped twice", id)
                    });
                }
                Err(EngineError::Conflict { .. }) => {
                    metrics.conflicts += 1;
                    metrics.failures += 1;
                    checks.check(status == OrderStatus::Failed, || {
                        format!("completed order {} could not ship", id)
                    });
                    let after = world.engine().get_order(*id)?.status;
                    checks.check(after == status, || {
                        format!("rejected ship changed order {}", id)
                    });
                }
                Err(other) => return Err(other.into()),
            }
        }
        Ok(())
    }

    /// SIM-003: JobResult - result readable only once completed.
    async fn run_job_result(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        let n = self.batch_size.min(100);
        let started = Duration::from_millis(world.config.engine.job.start_delay_ms);
        let default_run = world.config.engine.default_job_run_time();
        let quick_run = Duration::from_secs(1);

        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            // every fourth job asks for a short run
            let run_time = (i % 4 == 0).then_some(quick_run);
            ids.push(world.engine().create_job(NewJob {
                job_type: format!("batch-{}", i % 3),
                parameters: None,
                run_time,
            })?);
        }
        metrics.entities_created += n as u64;

        let mut oracle = LifecycleOracle::new();
        let mut sample = |world: &SimWorld, metrics: &mut ScenarioMetrics, checks: &mut Checks| {
            for id in &ids {
                let Ok(job) = world.engine().get_job(*id) else {
                    checks.check(false, || format!("job {} vanished", id));
                    continue;
                };
                metrics.observations += 1;
                oracle.observe_job(&job);

                match world.engine().get_job_result(*id) {
                    Ok(result) => {
                        let expected = format!("Job {} completed successfully", id);
                        checks.check(job.status == JobStatus::Completed, || {
                            format!("job {} returned a result while {}", id, job.status)
                        });
                        checks.check(result["output"] == expected.as_str(), || {
                            format!("job {} result payload was {}", id, result)
                        });
                    }
                    Err(EngineError::Conflict { .. }) => {
                        metrics.conflicts += 1;
                        checks.check(job.status != JobStatus::Completed, || {
                            format!("completed job {} refused its result", id)
                        });
                    }
                    Err(other) => checks.check(false, || format!("job {}: {}", id, other)),
                }
            }
        };

        sample(world, metrics, checks);
        world.run_for(Duration::from_millis(1)).await;
        sample(world, metrics, checks);
        world.run_until(started + quick_run).await;
        sample(world, metrics, checks);
        world.run_until(started + default_run).await;
        sample(world, metrics, checks);

        for (_, status) in oracle.jobs.latest() {
            match status {
                JobStatus::Completed => metrics.successes += 1,
                JobStatus::Failed => metrics.failures += 1,
                other => checks.check(false, || format!("job still {} after its run time", other)),
            }
        }
        let violations = oracle.verify(world.engine().tables());
        checks.check(violations.is_empty(), || {
            format!("{} lifecycle violations, first: {}", violations.len(), violations[0])
        });
        Ok(())
    }

    /// SIM-004: ProfilePropagation - per-view visibility lags.
    async fn run_profile_propagation(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        let lags = world.config.engine.propagation.clone();
        let id = world.engine().create_user(NewProfile {
            username: "propagation_probe".to_string(),
            bio: Some("Watching caches warm".to_string()),
            email: Some("probe@example.com".to_string()),
            metadata: None,
        })?;
        metrics.entities_created += 1;

        let just_before = |ms: u64| Duration::from_millis(ms.saturating_sub(1));
        let at = Duration::from_millis;

        let visible = |world: &SimWorld, view: View| world.engine().get_user(id, view).is_ok();
        let in_search = |world: &SimWorld| {
            world
                .engine()
                .search("PROPAGATION")
                .iter()
                .any(|p| p.id == id)
        };
        let in_analytics = |world: &SimWorld| world.engine().list_analytics().total_users == 1;

        checks.check(visible(world, View::Immediate), || {
            "profile not immediately visible".to_string()
        });
        checks.check(world.engine().list_users().len() == 1, || {
            "profile missing from user listing".to_string()
        });
        checks.check(world.engine().list_feed().len() == 1, || {
            "profile missing from feed".to_string()
        });

        if lags.cached_ms > 0 {
            world.run_until(just_before(lags.cached_ms)).await;
            checks.check(!visible(world, View::Cached), || {
                format!("cached view leaked at {:?}", world.now())
            });
            checks.check(world.engine().get_public_profile(id).is_err(), || {
                "public profile leaked early".to_string()
            });
        }
        world.run_until(at(lags.cached_ms)).await;
        checks.check(visible(world, View::Cached), || {
            format!("cached view still hidden at {:?}", world.now())
        });

        if lags.search_ms > 0 {
            world.run_until(just_before(lags.search_ms)).await;
            checks.check(!in_search(world), || format!("search leaked at {:?}", world.now()));
        }
        world.run_until(at(lags.search_ms)).await;
        checks.check(in_search(world), || {
            format!("search still empty at {:?}", world.now())
        });

        if lags.analytics_ms > 0 {
            world.run_until(just_before(lags.analytics_ms)).await;
            checks.check(!in_analytics(world), || {
                format!("analytics leaked at {:?}", world.now())
            });
        }
        world.run_until(at(lags.analytics_ms)).await;
        let report = world.engine().list_analytics();
        checks.check(
            report.total_users == 1 && report.with_bio == 1 && report.with_email == 1,
            || format!("analytics report wrong at {:?}: {:?}", world.now(), report),
        );

        // Visible forever after
        world.run_for(Duration::from_secs(3_600)).await;
        for view in View::all() {
            metrics.observations += 1;
            checks.check(visible(world, view), || {
                format!("profile disappeared from {} view", view)
            });
        }
        Ok(())
    }

    /// SIM-005: OutcomeDistribution - completed fraction within binomial tolerance.
    async fn run_outcome_distribution(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        let n = self.batch_size;
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            ids.push(world.engine().create_order(Self::new_order(i))?);
        }
        metrics.entities_created += n as u64;

        let config = &world.config.engine;
        let horizon = Duration::from_millis(
            config.order.processing_delay_ms + config.order.completion_delay_ms,
        );
        world.run_for(horizon).await;

        for id in &ids {
            match world.engine().get_order(*id)?.status {
                OrderStatus::Completed => metrics.successes += 1,
                OrderStatus::Failed => metrics.failures += 1,
                other => checks.check(false, || format!("order {} still {}", id, other)),
            }
        }

        let p = world.config.engine.chaos.order_outcome.success;
        let observed = metrics.successes as f64 / n as f64;
        let sd = (p * (1.0 - p) / n as f64).sqrt();
        let tolerance = 4.0 * sd + 1e-9;
        info!(
            "  completed {}/{} = {:.3} (expected {:.3} ± {:.3})",
            metrics.successes, n, observed, p, tolerance
        );

        checks.check((observed - p).abs() <= tolerance, || {
            format!(
                "completed fraction {:.3} outside {:.3} ± {:.3}",
                observed, p, tolerance
            )
        });
        if p > 0.0 && p < 1.0 && n >= 100 {
            checks.check(metrics.successes > 0 && metrics.failures > 0, || {
                "outcome distribution degenerated to a single branch".to_string()
            });
        }
        Ok(())
    }

    /// SIM-006: ResetIsolation - reset mid-flight leaves no trace.
    async fn run_reset_isolation(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        let engine = world.engine().clone();

        let mut old_orders = Vec::new();
        for i in 0..20 {
            old_orders.push(engine.create_order(Self::new_order(i))?);
        }
        let old_job = engine.create_job(NewJob {
            job_type: "doomed".to_string(),
            ..NewJob::default()
        })?;
        let old_resource = engine.create_resource(NewResource {
            resource_type: "doomed".to_string(),
            config: None,
        })?;
        let old_user = engine.create_user(NewProfile {
            username: "ghost".to_string(),
            ..NewProfile::default()
        })?;
        metrics.entities_created += 23;

        // Mid-flight: orders processing, job running, resource initializing
        world.run_for(Duration::from_millis(2_500)).await;
        checks.check(engine.pending_transitions() > 0, || {
            "nothing was in flight before reset".to_string()
        });

        engine.reset_all();

        let health = engine.health();
        checks.check(health.stats.total() == 0, || {
            format!("{} records survived reset", health.stats.total())
        });
        checks.check(health.pending_transitions == 0, || {
            format!("{} transitions survived reset", health.pending_transitions)
        });

        let mut new_orders = Vec::new();
        for i in 0..10 {
            new_orders.push(engine.create_order(Self::new_order(100 + i))?);
        }
        metrics.entities_created += 10;

        let mut oracle = LifecycleOracle::new();
        let mut resurrected = Vec::new();
        world
            .run_observed(Duration::from_secs(10), |engine| {
                for id in &new_orders {
                    if let Ok(order) = engine.get_order(*id) {
                        oracle.observe_order(&order);
                    }
                }
                let old_visible = old_orders.iter().any(|id| engine.get_order(*id).is_ok())
                    || engine.get_job(old_job).is_ok()
                    || engine.get_resource(old_resource).is_ok()
                    || engine.get_user(old_user, View::Immediate).is_ok();
                if old_visible {
                    resurrected.push(engine.context().now());
                }
            })
            .await;

        checks.check(resurrected.is_empty(), || {
            format!("pre-reset entity reappeared at {:?}", resurrected[0])
        });

        let old: HashSet<EntityId> = old_orders.iter().copied().collect();
        checks.check(
            engine.list_feed().iter().all(|item| match item {
                chaosforge_core::FeedItem::OrderProcessing { order_id, .. }
                | chaosforge_core::FeedItem::OrderCompleted { order_id, .. } => {
                    !old.contains(order_id)
                }
                chaosforge_core::FeedItem::UserJoined { user_id, .. } => *user_id != old_user,
            }),
            || "feed still mentions pre-reset entities".to_string(),
        );

        for id in &new_orders {
            let status = engine.get_order(*id)?.status;
            metrics.observations += 1;
            checks.check(
                matches!(status, OrderStatus::Completed | OrderStatus::Failed),
                || format!("post-reset order {} stuck at {}", id, status),
            );
        }
        checks.check(engine.health().stats.orders == new_orders.len(), || {
            format!("expected {} orders after reset", new_orders.len())
        });

        let violations = oracle.verify(engine.tables());
        checks.check(violations.is_empty(), || {
            format!("{} lifecycle violations, first: {}", violations.len(), violations[0])
        });
        Ok(())
    }

    /// SIM-007: ConcurrentCreates - concurrent writers and readers never
    /// observe a torn record.
    async fn run_concurrent_creates(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        const WRITERS: usize = 100;
        let engine = world.engine().clone();

        let mut creates = Vec::with_capacity(WRITERS);
        for i in 0..WRITERS {
            let engine = engine.clone();
            creates.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                engine.create_order(Self::new_order(i)).map(|id| (i, id))
            }));
        }
        let mut created = Vec::with_capacity(WRITERS);
        for handle in creates {
            created.push(handle.await??);
        }
        metrics.entities_created += WRITERS as u64;

        let unique: HashSet<EntityId> = created.iter().map(|(_, id)| *id).collect();
        checks.check(unique.len() == WRITERS, || {
            format!("{} duplicate ids", WRITERS - unique.len())
        });

        // Read while transitions are firing
        for checkpoint in [Duration::ZERO, Duration::from_secs(2), Duration::from_secs(5)] {
            world.run_until(checkpoint).await;

            let mut reads = Vec::with_capacity(WRITERS);
            for (i, id) in &created {
                let engine = engine.clone();
                let (i, id) = (*i, *id);
                reads.push(tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    engine.get_order(id).map(|order| (i, order))
                }));
            }
            for handle in reads {
                let (i, order) = handle.await??;
                metrics.observations += 1;
                let expected = Self::new_order(i);
                checks.check(
                    order.product_id == expected.product_id && order.quantity == expected.quantity,
                    || format!("torn read of order {}", order.id),
                );
                let stamped_ok = match order.status {
                    OrderStatus::Completed => order.completed_at.is_some() && order.error.is_none(),
                    OrderStatus::Failed => order.error.is_some() && order.completed_at.is_none(),
                    _ => order.completed_at.is_none() && order.error.is_none(),
                };
                checks.check(stamped_ok, || {
                    format!("order {} status {} disagrees with its fields", order.id, order.status)
                });
            }
        }

        checks.check(engine.health().stats.orders == WRITERS, || {
            format!("expected {} orders", WRITERS)
        });
        Ok(())
    }

    /// SIM-008: ResourceProvisioning - timeline and connect guard.
    async fn run_resource_provisioning(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        let n = self.batch_size.min(50);
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            ids.push(world.engine().create_resource(NewResource {
                resource_type: format!("db-{}", i),
                config: None,
            })?);
        }
        metrics.entities_created += n as u64;

        let timings = world.config.engine.resource.clone();
        let initializing_at = Duration::from_millis(timings.initializing_delay_ms);
        let terminal_at = initializing_at + Duration::from_millis(timings.ready_delay_ms);
        let timeline = [
            (Duration::ZERO, ResourceStatus::Provisioning),
            (initializing_at + (terminal_at - initializing_at) / 4, ResourceStatus::Initializing),
        ];
        for (at, expected) in timeline {
            world.run_until(at).await;
            for id in &ids {
                let status = world.engine().get_resource(*id)?.status;
                metrics.observations += 1;
                checks.check(status == expected, || {
                    format!("resource {} was {} at {:?}", id, status, at)
                });
                let connect = world.engine().connect_resource(*id);
                if matches!(connect, Err(EngineError::Conflict { .. })) {
                    metrics.conflicts += 1;
                }
                checks.check(matches!(connect, Err(EngineError::Conflict { .. })), || {
                    format!("connect to {} resource {} did not conflict", status, id)
                });
            }
        }

        world.run_until(terminal_at + Duration::from_secs(1)).await;
        for id in &ids {
            let resource = world.engine().get_resource(*id)?;
            metrics.observations += 1;
            match (resource.status, world.engine().connect_resource(*id)) {
                (ResourceStatus::Ready, Ok(connection)) => {
                    metrics.successes += 1;
                    checks.check(
                        Some(&connection.connection_string) == resource.endpoint.as_ref(),
                        || format!("resource {} connected to the wrong endpoint", id),
                    );
                }
                (ResourceStatus::Error, Err(EngineError::Conflict { .. })) => {
                    metrics.failures += 1;
                    metrics.conflicts += 1;
                }
                (status, outcome) => checks.check(false, || {
                    format!("resource {} at {}: connect gave {:?}", id, status, outcome.err())
                }),
            }
        }
        Ok(())
    }

    /// SIM-009: FlakyProbes - failure rates and statuses.
    async fn run_flaky_probes(
        &self,
        world: &mut SimWorld,
        metrics: &mut ScenarioMetrics,
        checks: &mut Checks,
    ) -> Result<(), SimError> {
        let n = self.batch_size;
        let tables = world.config.engine.chaos.clone();

        for scenario in [ChaosScenario::FlakyEndpoint, ChaosScenario::RateLimitedEndpoint] {
            let table = tables.table(scenario);
            let mut failed = 0usize;
            for _ in 0..n {
                let outcome = match scenario {
                    ChaosScenario::FlakyEndpoint => world.engine().probe_flaky(),
                    _ => world.engine().probe_rate_limited(),
                };
                metrics.observations += 1;
                match outcome {
                    Ok(_) => metrics.successes += 1,
                    Err(EngineError::TransientFailure { status, .. }) => {
                        failed += 1;
                        metrics.failures += 1;
                        checks.check(status == table.failure_status, || {
                            format!("{} failed with {} (expected {})", scenario, status, table.failure_status)
                        });
                    }
                    Err(other) => return Err(other.into()),
                }
            }

            let q = table.failure();
            let observed = failed as f64 / n as f64;
            let tolerance = 4.0 * (q * (1.0 - q) / n as f64).sqrt() + 1e-9;
            info!("  {}: {}/{} failed ({:.3}, expected {:.3})", scenario, failed, n, observed, q);
            checks.check((observed - q).abs() <= tolerance, || {
                format!("{} failure rate {:.3} outside {:.3} ± {:.3}", scenario, observed, q, tolerance)
            });
        }

        // Probes are stateless
        checks.check(world.engine().health().stats.total() == 0, || {
            "probes created records".to_string()
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_passes_on_default_seed() {
        let runner = ScenarioRunner::new(42, 200);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }

    #[test]
    fn test_outcome_distribution_at_full_size() {
        let result = ScenarioRunner::new(7, 1_000).run(ScenarioId::OutcomeDistribution);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.successes + result.metrics.failures, 1_000);
    }

    #[test]
    fn test_same_seed_same_metrics() {
        let a = ScenarioRunner::new(99, 100).run(ScenarioId::ShipGuard);
        let b = ScenarioRunner::new(99, 100).run(ScenarioId::ShipGuard);
        assert_eq!(a.metrics.successes, b.metrics.successes);
        assert_eq!(a.metrics.conflicts, b.metrics.conflicts);
    }

    #[test]
    fn test_certain_failure_config() {
        let mut engine = EngineConfig::default();
        engine.chaos.resource_outcome.success = 0.0;
        let result = ScenarioRunner::new(1, 20)
            .with_engine_config(engine)
            .run(ScenarioId::ResourceProvisioning);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.successes, 0);
        assert_eq!(result.metrics.failures, 20);
    }

    #[test]
    fn test_checks_report_first_failure() {
        let mut checks = Checks::default();
        checks.check(true, || "fine".to_string());
        assert_eq!(checks.reason(), None);
        checks.check(false, || "first".to_string());
        checks.check(false, || "second".to_string());
        assert_eq!(checks.reason().as_deref(), Some("first (and 1 more)"));
    }
}
