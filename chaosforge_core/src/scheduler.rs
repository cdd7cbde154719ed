//! The Clock/Delay Scheduler - one-shot deferred transitions.
//!
//! Each registration spawns one task on the context that sleeps for the
//! requested delay and then runs the callback. The scheduler keeps a slot per
//! entity so at most one transition is pending for any entity; the slot is
//! released just before the callback runs, which lets the callback register
//! the entity's next hop.
//!
//! Reset does not chase down sleeping tasks. It bumps a generation counter;
//! tasks from an older generation wake up, notice, and do nothing.

use chaosforge_env::{EntityId, ForgeContext};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::EntityKind;

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub serial: u64,
}

pub struct Scheduler<Ctx: ForgeContext> {
    context: Arc<Ctx>,
    generation: Arc<AtomicU64>,
    pending: Arc<DashMap<EntityId, Ticket>>,
    next_serial: AtomicU64,
}

impl<Ctx: ForgeContext> Scheduler<Ctx> {
    pub fn new(context: Arc<Ctx>) -> Self {
        Self {
            context,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(DashMap::new()),
            next_serial: AtomicU64::new(0),
        }
    }

    /// Runs `callback` once, at least `delay` from now, without blocking.
    ///
    /// Fails with `TransitionPending` if `entity` already has a pending
    /// callback. Callback errors are logged and swallowed: nobody is waiting
    /// on them.
    pub fn after<F>(
        &self,
        kind: EntityKind,
        entity: EntityId,
        delay: Duration,
        callback: F,
    ) -> EngineResult<Ticket>
    where
        F: FnOnce() -> EngineResult<()> + Send + 'static,
    {
        let ticket = Ticket {
            generation: self.generation.load(Ordering::SeqCst),
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
        };

        match self.pending.entry(entity) {
            Entry::Occupied(_) => {
                return Err(EngineError::TransitionPending { kind, id: entity });
            }
            Entry::Vacant(slot) => {
                slot.insert(ticket);
            }
        }

        let context = Arc::clone(&self.context);
        let generation = Arc::clone(&self.generation);
        let pending = Arc::clone(&self.pending);

        self.context.spawn("transition", async move {
            context.sleep(delay).await;

            if generation.load(Ordering::SeqCst) != ticket.generation {
                debug!(%kind, %entity, "transition dropped by reset");
                return;
            }
            if pending.remove_if(&entity, |_, held| *held == ticket).is_none() {
                return;
            }

            match callback() {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    debug!(%kind, %entity, "transition target vanished");
                }
                Err(err) => {
                    warn!(%kind, %entity, error = %err, "transition failed");
                }
            }
        });

        Ok(ticket)
    }

    /// Invalidates every pending callback.
    pub fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pending.clear();
    }

    pub fn is_pending(&self, entity: EntityId) -> bool {
        self.pending.contains_key(&entity)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaosforge_env::TokioContext;
    use std::sync::Mutex;

    fn scheduler() -> Scheduler<TokioContext> {
        Scheduler::new(TokioContext::shared())
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicU64::new(0));
        let id = EntityId::new();

        let flag = Arc::clone(&fired);
        scheduler
            .after(EntityKind::Order, id, Duration::from_secs(2), move || {
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_pending(id));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_second_pending_for_same_entity() {
        let scheduler = scheduler();
        let id = EntityId::new();

        scheduler
            .after(EntityKind::Job, id, Duration::from_secs(1), || Ok(()))
            .unwrap();
        let second = scheduler.after(EntityKind::Job, id, Duration::from_millis(10), || Ok(()));

        assert_eq!(
            second,
            Err(EngineError::TransitionPending {
                kind: EntityKind::Job,
                id
            })
        );
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chained_hops_fire_in_order() {
        let scheduler = Arc::new(scheduler());
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = EntityId::new();

        let chain = Arc::clone(&scheduler);
        let first_log = Arc::clone(&log);
        scheduler
            .after(EntityKind::Resource, id, Duration::from_secs(2), move || {
                first_log.lock().unwrap().push("initializing");
                let second_log = Arc::clone(&first_log);
                chain
                    .after(EntityKind::Resource, id, Duration::from_secs(4), move || {
                        second_log.lock().unwrap().push("ready");
                        Ok(())
                    })
                    .map(|_| ())
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*log.lock().unwrap(), vec!["initializing"]);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(*log.lock().unwrap(), vec!["initializing", "ready"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_turns_callbacks_into_noops() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicU64::new(0));

        for _ in 0..5 {
            let flag = Arc::clone(&fired);
            scheduler
                .after(EntityKind::Order, EntityId::new(), Duration::from_secs(1), move || {
                    flag.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(scheduler.pending_count(), 5);

        scheduler.cancel_all();
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_error_does_not_poison_scheduler() {
        let scheduler = scheduler();
        let id = EntityId::new();

        scheduler
            .after(EntityKind::Order, id, Duration::from_millis(5), move || {
                Err(EngineError::conflict(EntityKind::Order, id, "boom"))
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Slot was released; the entity can be scheduled again
        assert!(scheduler
            .after(EntityKind::Order, id, Duration::from_millis(5), || Ok(()))
            .is_ok());
    }
}
