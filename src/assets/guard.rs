//! Single writer per asset slot.
//!
//! Each replace/remove takes a marker for its `(owner, slot)` key. A second
//! attempt on the same key while the first is in flight is refused instead
//! of racing it for the database pointer.

use std::sync::Arc;

use dashmap::DashMap;

use super::slot::{AssetOwner, AssetSlot};

pub type SlotKey = (AssetOwner, AssetSlot);

/// Registry of slots with an operation in flight
#[derive(Clone, Default)]
pub struct InFlight {
    active: Arc<DashMap<SlotKey, ()>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot. Returns `None` when another operation holds it.
    pub fn try_acquire(&self, owner: AssetOwner, slot: AssetSlot) -> Option<SlotGuard> {
        let key = (owner, slot);
        match self.active.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(());
                Some(SlotGuard {
                    key,
                    active: self.active.clone(),
                })
            }
        }
    }

    #[cfg(test)]
    pub fn is_active(&self, owner: AssetOwner, slot: AssetSlot) -> bool {
        self.active.contains_key(&(owner, slot))
    }
}

/// Releases the slot when dropped, on success and error paths alike
pub struct SlotGuard {
    key: SlotKey,
    active: Arc<DashMap<SlotKey, ()>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}
