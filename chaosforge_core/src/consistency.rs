//! The Consistency Propagation Layer.
//!
//! A write to a multi-view entity does not become visible everywhere at once.
//! At write time the tracker stamps the entity with one "visible after"
//! instant per view; reads compare the current monotonic time against the
//! stamp for the view they come through. Nothing is materialized: aggregates
//! filter the full entity list at request time.

use chaosforge_env::EntityId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::PropagationLags;

/// The read paths an entity can be observed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Immediate,
    Cached,
    Search,
    Analytics,
}

impl View {
    pub fn all() -> [View; 4] {
        [View::Immediate, View::Cached, View::Search, View::Analytics]
    }

    fn index(self) -> usize {
        match self {
            View::Immediate => 0,
            View::Cached => 1,
            View::Search => 2,
            View::Analytics => 3,
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            View::Immediate => "immediate",
            View::Cached => "cached",
            View::Search => "search",
            View::Analytics => "analytics",
        };
        f.write_str(name)
    }
}

/// Per-view lag applied on top of the write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewLags([Duration; 4]);

impl ViewLags {
    pub fn lag(&self, view: View) -> Duration {
        self.0[view.index()]
    }
}

impl From<&PropagationLags> for ViewLags {
    fn from(lags: &PropagationLags) -> Self {
        Self([
            Duration::ZERO,
            Duration::from_millis(lags.cached_ms),
            Duration::from_millis(lags.search_ms),
            Duration::from_millis(lags.analytics_ms),
        ])
    }
}

impl Default for ViewLags {
    fn default() -> Self {
        Self::from(&PropagationLags::default())
    }
}

/// Visibility instants of one entity, on the context's monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityStamp {
    pub written_at: Duration,
    visible_after: [Duration; 4],
}

impl VisibilityStamp {
    fn new(written_at: Duration, lags: &ViewLags) -> Self {
        let mut visible_after = [written_at; 4];
        for view in View::all() {
            visible_after[view.index()] = written_at + lags.lag(view);
        }
        Self {
            written_at,
            visible_after,
        }
    }

    pub fn visible_after(&self, view: View) -> Duration {
        self.visible_after[view.index()]
    }

    // Element-wise max keeps every stamp non-decreasing.
    fn raise(&mut self, other: &VisibilityStamp) {
        self.written_at = self.written_at.max(other.written_at);
        for (mine, theirs) in self.visible_after.iter_mut().zip(other.visible_after) {
            *mine = (*mine).max(theirs);
        }
    }
}

pub struct ConsistencyTracker {
    stamps: DashMap<EntityId, VisibilityStamp>,
    lags: ViewLags,
}

impl ConsistencyTracker {
    pub fn new(lags: ViewLags) -> Self {
        Self {
            stamps: DashMap::new(),
            lags,
        }
    }

    pub fn lags(&self) -> &ViewLags {
        &self.lags
    }

    /// Records a write of `id` at monotonic time `now`.
    ///
    /// Re-registering an entity can only push its stamps later.
    pub fn register(&self, id: EntityId, now: Duration) -> VisibilityStamp {
        let fresh = VisibilityStamp::new(now, &self.lags);
        let mut entry = self.stamps.entry(id).or_insert(fresh);
        entry.raise(&fresh);
        *entry
    }

    pub fn stamp(&self, id: EntityId) -> Option<VisibilityStamp> {
        self.stamps.get(&id).map(|stamp| *stamp)
    }

    /// True once `now` has reached the entity's stamp for `view`.
    /// Untracked entities are never visible.
    pub fn is_visible(&self, id: EntityId, view: View, now: Duration) -> bool {
        self.stamps
            .get(&id)
            .map(|stamp| now >= stamp.visible_after(view))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn clear(&self) {
        self.stamps.clear();
    }
}

impl Default for ConsistencyTracker {
    fn default() -> Self {
        Self::new(ViewLags::default())
    }
}
