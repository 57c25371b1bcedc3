//! Per-key document slots.
//!
//! Each primary key owns a slot: a mutex around the key's current state.
//! Writers to one key serialize on its slot; writers to different keys never
//! touch the same lock except for the brief map lookup that finds the slot.
//! Readers clone the `Arc` out of a slot, so they see either the state before
//! or after a write and never hold a slot while doing other work.

use crate::document::Document;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Current state of one key. `None` until the first accepted write.
pub(crate) type Slot = Mutex<Option<Arc<Document>>>;

#[derive(Default)]
pub(crate) struct DocumentStore {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl DocumentStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `id`, creating an empty one if needed.
    pub(crate) fn slot(&self, id: &str) -> Arc<Slot> {
        if let Some(slot) = self.existing_slot(id) {
            return slot;
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(id.to_string()).or_default())
    }

    /// Returns the slot for `id` if one was ever created.
    pub(crate) fn existing_slot(&self, id: &str) -> Option<Arc<Slot>> {
        self.slots.read().get(id).cloned()
    }

    /// Number of slots, including slots of keys never written.
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns the current state of `id`.
    pub(crate) fn get(&self, id: &str) -> Option<Arc<Document>> {
        let slot = self.existing_slot(id)?;
        let current = slot.lock().clone();
        current
    }

    /// Snapshot of every stored state, one per key, in no particular order.
    pub(crate) fn documents(&self) -> Vec<Arc<Document>> {
        let slots: Vec<Arc<Slot>> = self.slots.read().values().cloned().collect();
        slots.iter().filter_map(|slot| slot.lock().clone()).collect()
    }
}
