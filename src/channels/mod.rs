//! Channel state store
//!
//! Slot-keyed tables of loaded sounds and music plus the adapter-wide mixer
//! state. Slot ids come from the guest and are treated as a sparse key space.
//!
//! The store only holds data. Removing an entry that owns a backend handle is
//! the engine's job, since the handle must be stopped and released first.

mod music;
mod sound;
mod state;

pub use music::{ModuleOp, MusicChannel, StreamChannel, TrackerChannel, TrackerState};
pub use sound::SoundSlot;
pub use state::{GlobalVolume, Listener, MixerState};

use std::collections::hash_map::{self, HashMap};

/// Guest-assigned slot identifier
pub type SlotId = u32;

/// Sparse table of channel entries keyed by slot id
#[derive(Debug, Clone)]
pub struct ChannelStore<T> {
    entries: HashMap<SlotId, T>,
}

impl<T> Default for ChannelStore<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> ChannelStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live entry
    pub fn get(&self, slot: SlotId) -> Option<&T> {
        self.entries.get(&slot)
    }

    /// Look up a live entry for mutation
    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut T> {
        self.entries.get_mut(&slot)
    }

    /// Install an entry, returning the previous occupant
    pub fn insert(&mut self, slot: SlotId, entry: T) -> Option<T> {
        self.entries.insert(slot, entry)
    }

    /// Detach an entry, returning it to the caller for release
    pub fn remove(&mut self, slot: SlotId) -> Option<T> {
        self.entries.remove(&slot)
    }

    /// Whether a slot holds a live entry
    pub fn contains(&self, slot: SlotId) -> bool {
        self.entries.contains_key(&slot)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visit every live entry once, in no particular order
    pub fn iter(&self) -> hash_map::Iter<'_, SlotId, T> {
        self.entries.iter()
    }

    /// Visit every live entry once for mutation
    pub fn iter_mut(&mut self) -> hash_map::IterMut<'_, SlotId, T> {
        self.entries.iter_mut()
    }

    /// Live slot ids, in no particular order
    pub fn slots(&self) -> Vec<SlotId> {
        self.entries.keys().copied().collect()
    }

    /// Detach every entry
    pub fn drain(&mut self) -> hash_map::Drain<'_, SlotId, T> {
        self.entries.drain()
    }
}
