//! The Engine Facade - the one surface wire façades call.
//!
//! Every mutation-triggering call returns as soon as the record is written
//! and its first hop registered; completion is observed by polling reads.

use chaosforge_env::{EntityId, ForgeContext};
use serde_json::Value;
use tracing::{debug, info};

use crate::chaos::{ChaosDraw, ChaosScenario};
use crate::consistency::View;
use crate::engine::ChaosEngine;
use crate::error::{EngineError, EngineResult};
use crate::machine::{schedule_next, Lifecycle};
use crate::model::{
    AnalyticsReport, Comment, Connection, Credentials, EntityKind, FeedItem, HealthReport, Job,
    JobStatus, NewComment, NewJob, NewOrder, NewProfile, NewResource, Order, OrderStatus,
    ProbeReport, PublicProfile, Resource, ResourceStatus, UserProfile, Webhook,
};

pub trait EngineFacade {
    // Orders
    fn create_order(&self, input: NewOrder) -> EngineResult<EntityId>;
    fn get_order(&self, id: EntityId) -> EngineResult<Order>;
    /// completed -> shipped, or `Conflict` with the order untouched.
    fn ship_order(&self, id: EntityId) -> EngineResult<Order>;
    /// pending | processing -> cancelled, or `Conflict`.
    fn cancel_order(&self, id: EntityId) -> EngineResult<Order>;

    // Jobs
    fn create_job(&self, input: NewJob) -> EngineResult<EntityId>;
    fn get_job(&self, id: EntityId) -> EngineResult<Job>;
    /// The result payload of a completed job; `Conflict` in any other status.
    fn get_job_result(&self, id: EntityId) -> EngineResult<Value>;

    // Resources
    fn create_resource(&self, input: NewResource) -> EngineResult<EntityId>;
    fn get_resource(&self, id: EntityId) -> EngineResult<Resource>;
    /// Connection details of a ready resource; `Conflict` in any other status.
    fn connect_resource(&self, id: EntityId) -> EngineResult<Connection>;

    // Profiles
    fn create_user(&self, input: NewProfile) -> EngineResult<EntityId>;
    /// `NotFound` until the profile has propagated to `view`.
    fn get_user(&self, id: EntityId, view: View) -> EngineResult<UserProfile>;
    fn get_public_profile(&self, id: EntityId) -> EngineResult<PublicProfile>;
    fn list_users(&self) -> Vec<UserProfile>;

    // Comments and webhooks
    fn create_comment(&self, input: NewComment) -> EngineResult<EntityId>;
    fn comments_for_post(&self, post_id: &str) -> Vec<Comment>;
    fn recent_comments(&self) -> Vec<Comment>;
    fn register_webhook(&self, url: &str, event_type: &str) -> EngineResult<EntityId>;
    fn list_webhooks(&self) -> Vec<Webhook>;

    // Aggregates
    fn list_feed(&self) -> Vec<FeedItem>;
    fn search(&self, query: &str) -> Vec<UserProfile>;
    fn list_analytics(&self) -> AnalyticsReport;

    // Stateless probes
    fn probe_flaky(&self) -> EngineResult<ProbeReport>;
    fn probe_rate_limited(&self) -> EngineResult<ProbeReport>;

    // Administration
    fn reset_all(&self);
    fn health(&self) -> HealthReport;
}

/// An empty string counts as absent.
fn is_filled(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|value| !value.is_empty())
}

impl<Ctx: ForgeContext> ChaosEngine<Ctx> {
    fn visible_profiles(&self, view: View) -> Vec<UserProfile> {
        let now = self.shared.now();
        self.shared
            .store
            .list::<UserProfile>()
            .into_iter()
            .filter(|profile| self.shared.visibility.is_visible(profile.id, view, now))
            .collect()
    }

    fn probe(&self, scenario: ChaosScenario, message: &str) -> EngineResult<ProbeReport> {
        let mut rng = self.shared.probe_rng(scenario);
        match self.shared.chaos.draw(scenario, &mut rng) {
            ChaosDraw::Success => Ok(ProbeReport {
                status: "success".to_string(),
                message: message.to_string(),
            }),
            ChaosDraw::Failure { status } => {
                debug!(%scenario, status, "probe failed");
                Err(EngineError::TransientFailure { scenario, status })
            }
        }
    }
}

impl<Ctx: ForgeContext> EngineFacade for ChaosEngine<Ctx> {
    fn create_order(&self, input: NewOrder) -> EngineResult<EntityId> {
        let shared = &self.shared;
        let now = shared.timestamp();
        let order = Order {
            id: shared.context.new_id(),
            product_id: input.product_id,
            quantity: input.quantity,
            metadata: input.metadata,
            status: shared.tables.order.initial,
            created_at: now,
            updated_at: now,
            completed_at: None,
            shipped_at: None,
            cancelled_at: None,
            error: None,
        };

        shared.store.put(order.clone());
        schedule_next(shared, &order)?;
        info!(id = %order.id, product_id = %order.product_id, "order created");
        Ok(order.id)
    }

    fn get_order(&self, id: EntityId) -> EngineResult<Order> {
        self.shared.store.get(id)
    }

    fn ship_order(&self, id: EntityId) -> EngineResult<Order> {
        let shared = &self.shared;
        let at = shared.timestamp();
        let shipped = shared.store.mutate::<Order, _, _>(id, |order| {
            if !shared.tables.order.permits(order.status, OrderStatus::Shipped) {
                return Err(EngineError::conflict(
                    EntityKind::Order,
                    id,
                    format!(
                        "Cannot ship order with status '{}'. Order must be completed first.",
                        order.status
                    ),
                ));
            }
            order.enter(OrderStatus::Shipped, at);
            Ok(order.clone())
        })?;

        info!(%id, "order shipped");
        Ok(shipped)
    }

    fn cancel_order(&self, id: EntityId) -> EngineResult<Order> {
        let shared = &self.shared;
        let at = shared.timestamp();
        let cancelled = shared.store.mutate::<Order, _, _>(id, |order| {
            if !shared.tables.order.permits(order.status, OrderStatus::Cancelled) {
                return Err(EngineError::conflict(
                    EntityKind::Order,
                    id,
                    format!("Cannot cancel order with status '{}'", order.status),
                ));
            }
            order.enter(OrderStatus::Cancelled, at);
            Ok(order.clone())
        })?;

        // Any hop still sleeping for this order finds it cancelled and skips
        info!(%id, "order cancelled");
        Ok(cancelled)
    }

    fn create_job(&self, input: NewJob) -> EngineResult<EntityId> {
        let shared = &self.shared;
        let run_time = input
            .run_time
            .unwrap_or_else(|| shared.config.default_job_run_time());
        let job = Job {
            id: shared.context.new_id(),
            job_type: input.job_type,
            parameters: input.parameters,
            status: shared.tables.job.initial,
            run_time_ms: u64::try_from(run_time.as_millis()).unwrap_or(u64::MAX),
            created_at: shared.timestamp(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        };

        shared.store.put(job.clone());
        schedule_next(shared, &job)?;
        info!(id = %job.id, job_type = %job.job_type, run_time_ms = job.run_time_ms, "job created");
        Ok(job.id)
    }

    fn get_job(&self, id: EntityId) -> EngineResult<Job> {
        self.shared.store.get(id)
    }

    fn get_job_result(&self, id: EntityId) -> EngineResult<Value> {
        let job: Job = self.shared.store.get(id)?;
        let unavailable = || {
            EngineError::conflict(
                EntityKind::Job,
                id,
                format!("Job result not available. Current status: {}", job.status),
            )
        };
        if job.status != JobStatus::Completed {
            return Err(unavailable());
        }
        job.result.clone().ok_or_else(unavailable)
    }

    fn create_resource(&self, input: NewResource) -> EngineResult<EntityId> {
        let shared = &self.shared;
        let now = shared.timestamp();
        let resource = Resource {
            id: shared.context.new_id(),
            resource_type: input.resource_type,
            config: input.config,
            status: shared.tables.resource.initial,
            created_at: now,
            updated_at: now,
            endpoint: None,
            error: None,
        };

        shared.store.put(resource.clone());
        schedule_next(shared, &resource)?;
        info!(id = %resource.id, resource_type = %resource.resource_type, "resource created");
        Ok(resource.id)
    }

    fn get_resource(&self, id: EntityId) -> EngineResult<Resource> {
        self.shared.store.get(id)
    }

    fn connect_resource(&self, id: EntityId) -> EngineResult<Connection> {
        let resource: Resource = self.shared.store.get(id)?;
        let not_ready = || {
            EngineError::conflict(
                EntityKind::Resource,
                id,
                format!("Resource not ready. Current status: {}", resource.status),
            )
        };
        if resource.status != ResourceStatus::Ready {
            return Err(not_ready());
        }
        let endpoint = resource.endpoint.clone().ok_or_else(not_ready)?;

        Ok(Connection {
            connection_string: endpoint,
            credentials: Credentials {
                user: "demo".to_string(),
                token: self.shared.context.new_id().to_string(),
            },
        })
    }

    fn create_user(&self, input: NewProfile) -> EngineResult<EntityId> {
        let shared = &self.shared;
        let profile = UserProfile {
            id: shared.context.new_id(),
            username: input.username,
            bio: input.bio,
            email: input.email,
            metadata: input.metadata,
            created_at: shared.timestamp(),
        };

        let id = profile.id;
        {
            // stamp and record must both survive a reset, or neither
            let _write = shared.write_guard();
            shared.visibility.register(id, shared.now());
            shared.store.put(profile);
        }
        info!(%id, "profile created");
        Ok(id)
    }

    fn get_user(&self, id: EntityId, view: View) -> EngineResult<UserProfile> {
        let profile: UserProfile = self.shared.store.get(id)?;
        if self.shared.visibility.is_visible(id, view, self.shared.now()) {
            Ok(profile)
        } else {
            Err(EngineError::not_found(EntityKind::UserProfile, id))
        }
    }

    fn get_public_profile(&self, id: EntityId) -> EngineResult<PublicProfile> {
        self.get_user(id, View::Cached)
            .map(|profile| PublicProfile::from(&profile))
    }

    fn list_users(&self) -> Vec<UserProfile> {
        self.visible_profiles(View::Immediate)
    }

    fn create_comment(&self, input: NewComment) -> EngineResult<EntityId> {
        let comment = Comment {
            id: self.shared.context.new_id(),
            post_id: input.post_id,
            content: input.content,
            author: input.author,
            created_at: self.shared.timestamp(),
        };
        let id = comment.id;
        self.shared.store.put(comment);
        debug!(%id, "comment created");
        Ok(id)
    }

    fn comments_for_post(&self, post_id: &str) -> Vec<Comment> {
        self.shared
            .store
            .list::<Comment>()
            .into_iter()
            .filter(|comment| comment.post_id == post_id)
            .collect()
    }

    fn recent_comments(&self) -> Vec<Comment> {
        let mut comments = self.shared.store.list::<Comment>();
        let keep = self.shared.config.feed.recent_comments;
        let start = comments.len().saturating_sub(keep);
        comments.split_off(start)
    }

    fn register_webhook(&self, url: &str, event_type: &str) -> EngineResult<EntityId> {
        let webhook = Webhook {
            id: self.shared.context.new_id(),
            url: url.to_string(),
            event_type: event_type.to_string(),
            registered_at: self.shared.timestamp(),
        };
        let id = webhook.id;
        self.shared.store.put(webhook);
        info!(%id, %url, %event_type, "webhook registered");
        Ok(id)
    }

    fn list_webhooks(&self) -> Vec<Webhook> {
        self.shared.store.list()
    }

    fn list_feed(&self) -> Vec<FeedItem> {
        let limits = &self.shared.config.feed;
        let mut items: Vec<FeedItem> = self
            .visible_profiles(View::Immediate)
            .into_iter()
            .map(|profile| FeedItem::UserJoined {
                user_id: profile.id,
                username: profile.username,
                bio: profile.bio,
                timestamp: profile.created_at,
            })
            .collect();
        items.extend(
            self.shared
                .store
                .recent_activity(limits.activity_window)
                .iter()
                .map(FeedItem::from),
        );

        items.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        items.truncate(limits.feed_size);
        items
    }

    fn search(&self, query: &str) -> Vec<UserProfile> {
        let needle = query.to_lowercase();
        self.visible_profiles(View::Search)
            .into_iter()
            .filter(|profile| {
                let haystack = format!(
                    "{} {}",
                    profile.username,
                    profile.bio.as_deref().unwrap_or_default()
                );
                haystack.to_lowercase().contains(&needle)
            })
            .collect()
    }

    fn list_analytics(&self) -> AnalyticsReport {
        let users = self.visible_profiles(View::Analytics);
        AnalyticsReport {
            total_users: users.len(),
            with_bio: users.iter().filter(|u| is_filled(&u.bio)).count(),
            with_email: users.iter().filter(|u| is_filled(&u.email)).count(),
            users,
        }
    }

    fn probe_flaky(&self) -> EngineResult<ProbeReport> {
        self.probe(ChaosScenario::FlakyEndpoint, "Request succeeded")
    }

    fn probe_rate_limited(&self) -> EngineResult<ProbeReport> {
        self.probe(ChaosScenario::RateLimitedEndpoint, "Request accepted")
    }

    fn reset_all(&self) {
        let shared = &self.shared;
        let _reset = shared.reset_guard();
        // Invalidate hops before clearing so none can run against the new state
        shared.scheduler.cancel_all();
        shared.store.clear_all();
        shared.visibility.clear();
        info!(generation = shared.scheduler.generation(), "engine reset");
    }

    fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            timestamp: self.shared.timestamp(),
            stats: self.shared.store.counts(),
            pending_transitions: self.shared.scheduler.pending_count(),
        }
    }
}
