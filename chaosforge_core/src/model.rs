//! Entity records, statuses and the report types returned by the facade.
//!
//! Records are plain serde structs so every wire façade encodes the same
//! state. Wall-clock timestamps are `DateTime<Utc>` and serialize as RFC 3339.

use chaosforge_env::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Wall-clock timestamp attached to records.
pub type Timestamp = DateTime<Utc>;

/// The kinds of entity tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Order,
    Job,
    Resource,
    UserProfile,
    Comment,
    Webhook,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Job => "job",
            EntityKind::Resource => "resource",
            EntityKind::UserProfile => "user",
            EntityKind::Comment => "comment",
            EntityKind::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum!(
    /// Order lifecycle status.
    OrderStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Shipped => "shipped",
        Cancelled => "cancelled",
    }
);

status_enum!(
    /// Job lifecycle status.
    JobStatus {
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
);

status_enum!(
    /// Resource provisioning status.
    ResourceStatus {
        Provisioning => "provisioning",
        Initializing => "initializing",
        Ready => "ready",
        Error => "error",
    }
);

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: EntityId,
    pub product_id: String,
    pub quantity: u32,
    pub metadata: Option<Value>,
    pub status: OrderStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub shipped_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: EntityId,
    pub job_type: String,
    pub parameters: Option<Value>,
    pub status: JobStatus,
    /// How long the job stays `running` before its outcome is drawn.
    pub run_time_ms: u64,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: EntityId,
    pub resource_type: String,
    pub config: Option<Value>,
    pub status: ResourceStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub endpoint: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: EntityId,
    pub username: String,
    pub bio: Option<String>,
    pub email: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: Timestamp,
}

/// The subset of a profile exposed through the cached public view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub username: String,
    pub bio: Option<String>,
    pub created_at: Timestamp,
}

impl From<&UserProfile> for PublicProfile {
    fn from(profile: &UserProfile) -> Self {
        Self {
            username: profile.username.clone(),
            bio: profile.bio.clone(),
            created_at: profile.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub post_id: String,
    /// Stored verbatim; never sanitized.
    pub content: String,
    pub author: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: EntityId,
    pub url: String,
    pub event_type: String,
    pub registered_at: Timestamp,
}

/// Order activity appended by scheduled transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    OrderProcessing,
    OrderCompleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: Timestamp,
    pub kind: ActivityKind,
    pub order_id: EntityId,
    pub status: OrderStatus,
}

// ============================================================================
// INPUTS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrder {
    pub product_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: String,
    #[serde(default)]
    pub parameters: Option<Value>,
    /// Overrides the configured run time for this job.
    #[serde(default)]
    pub run_time: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewResource {
    pub resource_type: String,
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProfile {
    pub username: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: String,
    pub content: String,
    pub author: String,
}

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub token: String,
}

/// Returned by a successful `connect_resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub connection_string: String,
    pub credentials: Credentials,
}

/// One entry of the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItem {
    UserJoined {
        user_id: EntityId,
        username: String,
        bio: Option<String>,
        timestamp: Timestamp,
    },
    OrderProcessing {
        order_id: EntityId,
        status: OrderStatus,
        timestamp: Timestamp,
    },
    OrderCompleted {
        order_id: EntityId,
        status: OrderStatus,
        timestamp: Timestamp,
    },
}

impl FeedItem {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            FeedItem::UserJoined { timestamp, .. }
            | FeedItem::OrderProcessing { timestamp, .. }
            | FeedItem::OrderCompleted { timestamp, .. } => *timestamp,
        }
    }
}

impl From<&ActivityEvent> for FeedItem {
    fn from(event: &ActivityEvent) -> Self {
        match event.kind {
            ActivityKind::OrderProcessing => FeedItem::OrderProcessing {
                order_id: event.order_id,
                status: event.status,
                timestamp: event.timestamp,
            },
            ActivityKind::OrderCompleted => FeedItem::OrderCompleted {
                order_id: event.order_id,
                status: event.status,
                timestamp: event.timestamp,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub total_users: usize,
    pub users: Vec<UserProfile>,
    pub with_bio: usize,
    pub with_email: usize,
}

/// Per-kind record totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub orders: usize,
    pub jobs: usize,
    pub resources: usize,
    pub users: usize,
    pub comments: usize,
    pub webhooks: usize,
}

impl EntityCounts {
    pub fn total(&self) -> usize {
        self.orders + self.jobs + self.resources + self.users + self.comments + self.webhooks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: Timestamp,
    pub stats: EntityCounts,
    pub pending_transitions: usize,
}

/// Result of a stateless probe that landed on its success branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub status: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(ResourceStatus::Error.to_string(), "error");
        assert_eq!(JobStatus::Queued.as_str(), "queued");
    }

    #[test]
    fn test_feed_item_tagged() {
        let item = FeedItem::UserJoined {
            user_id: EntityId::from_random_bytes([9u8; 16]),
            username: "alice".to_string(),
            bio: None,
            timestamp: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "user_joined");
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn test_activity_converts_to_feed() {
        let event = ActivityEvent {
            timestamp: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
            kind: ActivityKind::OrderCompleted,
            order_id: EntityId::from_random_bytes([1u8; 16]),
            status: OrderStatus::Failed,
        };
        match FeedItem::from(&event) {
            FeedItem::OrderCompleted { status, .. } => assert_eq!(status, OrderStatus::Failed),
            other => panic!("unexpected feed item: {:?}", other),
        }
    }

    #[test]
    fn test_counts_total() {
        let counts = EntityCounts {
            orders: 1,
            jobs: 2,
            resources: 3,
            users: 4,
            comments: 5,
            webhooks: 6,
        };
        assert_eq!(counts.total(), 21);
    }
}
