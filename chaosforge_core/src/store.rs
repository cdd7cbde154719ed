//! The Entity Store - concurrency-safe tables of records, one per kind.
//!
//! Each table is a sharded map, so unrelated entities never contend on a
//! global lock. A row carries its insertion sequence number, which gives
//! `list` a stable insertion order.
//!
//! `mutate` is the only write path after creation. It runs the caller's
//! closure against a draft copy while holding the row's shard lock and
//! commits the draft only when the closure returns `Ok`.

use chaosforge_env::EntityId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::model::{
    ActivityEvent, Comment, EntityCounts, EntityKind, Job, Order, Resource, UserProfile, Webhook,
};

/// A record type owned by the store.
pub trait Record: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> EntityId;

    /// Selects this kind's table.
    fn table(store: &EntityStore) -> &EntityTable<Self>;
}

struct Row<R> {
    seq: u64,
    record: R,
}

/// Concurrent table of a single record kind.
pub struct EntityTable<R> {
    rows: DashMap<EntityId, Row<R>>,
    next_seq: AtomicU64,
}

impl<R: Record> EntityTable<R> {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Inserts or replaces a record. A replaced record keeps its position.
    pub fn put(&self, record: R) {
        let id = record.id();
        match self.rows.entry(id) {
            Entry::Occupied(mut occupied) => occupied.get_mut().record = record,
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert(Row { seq, record });
            }
        }
    }

    pub fn get(&self, id: EntityId) -> EngineResult<R> {
        self.rows
            .get(&id)
            .map(|row| row.record.clone())
            .ok_or_else(|| EngineError::not_found(R::KIND, id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.rows.contains_key(&id)
    }

    /// Atomic read-modify-write of one record.
    ///
    /// Fails with `NotFound` if the id is absent. If `f` returns an error the
    /// stored record is left exactly as it was.
    pub fn mutate<T, F>(&self, id: EntityId, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut R) -> EngineResult<T>,
    {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(R::KIND, id))?;
        let mut draft = row.record.clone();
        let out = f(&mut draft)?;
        row.record = draft;
        Ok(out)
    }

    /// All records in insertion order.
    pub fn list(&self) -> Vec<R> {
        let mut rows: Vec<(u64, R)> = self
            .rows
            .iter()
            .map(|row| (row.seq, row.record.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, record)| record).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&self) {
        self.rows.clear();
    }
}

impl<R: Record> Default for EntityTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl Record for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> EntityId {
                self.id
            }

            fn table(store: &EntityStore) -> &EntityTable<Self> {
                &store.$field
            }
        }
    };
}

impl_record!(Order, EntityKind::Order, orders);
impl_record!(Job, EntityKind::Job, jobs);
impl_record!(Resource, EntityKind::Resource, resources);
impl_record!(UserProfile, EntityKind::UserProfile, profiles);
impl_record!(Comment, EntityKind::Comment, comments);
impl_record!(Webhook, EntityKind::Webhook, webhooks);

/// Owns every record the engine tracks.
#[derive(Default)]
pub struct EntityStore {
    orders: EntityTable<Order>,
    jobs: EntityTable<Job>,
    resources: EntityTable<Resource>,
    profiles: EntityTable<UserProfile>,
    comments: EntityTable<Comment>,
    webhooks: EntityTable<Webhook>,

    /// Append-only order activity, newest last
    activity: RwLock<Vec<ActivityEvent>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table<R: Record>(&self) -> &EntityTable<R> {
        R::table(self)
    }

    pub fn put<R: Record>(&self, record: R) {
        self.table::<R>().put(record);
    }

    pub fn get<R: Record>(&self, id: EntityId) -> EngineResult<R> {
        self.table::<R>().get(id)
    }

    pub fn contains<R: Record>(&self, id: EntityId) -> bool {
        self.table::<R>().contains(id)
    }

    pub fn mutate<R, T, F>(&self, id: EntityId, f: F) -> EngineResult<T>
    where
        R: Record,
        F: FnOnce(&mut R) -> EngineResult<T>,
    {
        self.table::<R>().mutate(id, f)
    }

    pub fn list<R: Record>(&self) -> Vec<R> {
        self.table::<R>().list()
    }

    pub fn record_activity(&self, event: ActivityEvent) {
        let mut log = self.activity.write().unwrap_or_else(|e| e.into_inner());
        log.push(event);
    }

    /// The last `n` activity events, oldest first.
    pub fn recent_activity(&self, n: usize) -> Vec<ActivityEvent> {
        let log = self.activity.read().unwrap_or_else(|e| e.into_inner());
        let start = log.len().saturating_sub(n);
        log[start..].to_vec()
    }

    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            orders: self.orders.len(),
            jobs: self.jobs.len(),
            resources: self.resources.len(),
            users: self.profiles.len(),
            comments: self.comments.len(),
            webhooks: self.webhooks.len(),
        }
    }

    /// Drops every record and the activity log.
    pub fn clear_all(&self) {
        self.orders.clear();
        self.jobs.clear();
        self.resources.clear();
        self.profiles.clear();
        self.comments.clear();
        self.webhooks.clear();
        self.activity
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
