//! Per-id single-flight locks.
//!
//! Writers to the same entity inside one repository instance queue behind an
//! async mutex keyed by id. Slots are dropped as soon as no task holds or
//! waits for them, so the map only contains ids with in-flight writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::EntityId;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    slots: Mutex<HashMap<EntityId, Slot>>,
}

impl KeyedLocks {
    /// Wait until no other task holds the lock for `id`.
    pub(crate) async fn acquire(&self, id: &EntityId) -> KeyGuard<'_> {
        let slot = self.slots().entry(id.clone()).or_default().clone();
        let guard = slot.clone().lock_owned().await;
        KeyGuard {
            owner: self,
            id: id.clone(),
            slot,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<EntityId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held lock for one id; releases and prunes the slot on drop.
pub(crate) struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    id: EntityId,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = self.owner.slots();
        // Only the map and this guard still reference the slot.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.id);
        }
    }
}
