//! Refcounted slot arena.
//!
//! One slot, one refcount, free on zero. Ids grow monotonically and are never
//! handed out twice, so a stale id is always detected instead of silently
//! aliasing a newer slot.

use ahash::RandomState;
use hashbrown::HashMap;
use std::hash::Hash;

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

pub fn fast_hasher() -> RandomState {
    RandomState::with_seeds(0, 0, 0, 0)
}

pub fn fast_map_new<K: Eq + Hash, V>() -> FastHashMap<K, V> {
    HashMap::with_hasher(fast_hasher())
}

/// Handle to a live heap slot. Id 0 is never allocated, and ids fit in the
/// 48-bit payload of a [`Value`](crate::Value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

impl SlotId {
    pub const MAX: SlotId = SlotId(crate::value::PAYLOAD_MASK);
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    #[error("use after free: slot {0} is not live")]
    UseAfterFree(SlotId),
    #[error("refcount underflow on slot {id}: count {count}, delta {delta}")]
    RefCountUnderflow { id: SlotId, count: u32, delta: i32 },
    #[error("slot ids exhausted")]
    IdsExhausted,
}

/// Result of adjusting a refcount.
#[derive(Debug)]
pub enum RefOutcome<T> {
    Live(u32),
    /// The count reached zero; the slot is gone and its payload is handed back.
    Evicted(T),
}

struct Slot<T> {
    ref_count: u32,
    payload: T,
}

pub struct RcHeap<T> {
    slots: FastHashMap<u64, Slot<T>>,
    next_id: u64,
    pushed: u64,
    evicted: u64,
}

impl<T> RcHeap<T> {
    pub fn new() -> Self {
        Self::with_first_id(1)
    }

    /// Heap whose first allocation gets id `first` (clamped to at least 1).
    /// Lets hosts keep the ids of independent heaps disjoint.
    pub fn with_first_id(first: u64) -> Self {
        Self {
            slots: fast_map_new(),
            next_id: first.max(1),
            pushed: 0,
            evicted: 0,
        }
    }

    /// Allocate a slot holding `value` with a refcount of 1. Fails once every
    /// id up to [`SlotId::MAX`] has been handed out.
    pub fn push(&mut self, value: T) -> Result<SlotId, HeapError> {
        let id = self.next_id;
        if id > SlotId::MAX.0 {
            return Err(HeapError::IdsExhausted);
        }
        self.next_id += 1;
        self.slots.insert(
            id,
            Slot {
                ref_count: 1,
                payload: value,
            },
        );
        self.pushed += 1;
        Ok(SlotId(id))
    }

    /// True once `push` can no longer hand out ids.
    pub fn is_exhausted(&self) -> bool {
        self.next_id > SlotId::MAX.0
    }

    pub fn get(&self, id: SlotId) -> Result<&T, HeapError> {
        self.slots
            .get(&id.0)
            .map(|s| &s.payload)
            .ok_or(HeapError::UseAfterFree(id))
    }

    pub fn get_mut(&mut self, id: SlotId) -> Result<&mut T, HeapError> {
        self.slots
            .get_mut(&id.0)
            .map(|s| &mut s.payload)
            .ok_or(HeapError::UseAfterFree(id))
    }

    /// Adjust the refcount by `delta`, evicting the slot when it reaches zero.
    /// An underflowing delta is rejected and leaves the slot untouched.
    pub fn adjust(&mut self, id: SlotId, delta: i32) -> Result<RefOutcome<T>, HeapError> {
        let slot = self
            .slots
            .get_mut(&id.0)
            .ok_or(HeapError::UseAfterFree(id))?;
        let next = slot.ref_count as i64 + delta as i64;
        if next < 0 {
            return Err(HeapError::RefCountUnderflow {
                id,
                count: slot.ref_count,
                delta,
            });
        }
        if next == 0 {
            let slot = self
                .slots
                .remove(&id.0)
                .ok_or(HeapError::UseAfterFree(id))?;
            self.evicted += 1;
            return Ok(RefOutcome::Evicted(slot.payload));
        }
        slot.ref_count = next.min(u32::MAX as i64) as u32;
        Ok(RefOutcome::Live(slot.ref_count))
    }

    /// `adjust` that reports only the new count (0 once evicted).
    pub fn ref_count(&mut self, id: SlotId, delta: i32) -> Result<u32, HeapError> {
        match self.adjust(id, delta)? {
            RefOutcome::Live(n) => Ok(n),
            RefOutcome::Evicted(_) => Ok(0),
        }
    }

    pub fn count_of(&self, id: SlotId) -> Option<u32> {
        self.slots.get(&id.0).map(|s| s.ref_count)
    }

    #[inline]
    pub fn contains(&self, id: SlotId) -> bool {
        self.slots.contains_key(&id.0)
    }

    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_pushed(&self) -> u64 {
        self.pushed
    }

    pub fn total_evicted(&self) -> u64 {
        self.evicted
    }

    pub fn ids(&self) -> Vec<SlotId> {
        let mut ids: Vec<SlotId> = self.slots.keys().map(|k| SlotId(*k)).collect();
        ids.sort();
        ids
    }

    /// Remove every live slot regardless of refcount, in allocation order.
    /// Used at teardown; the id counter keeps running.
    pub fn drain(&mut self) -> Vec<(SlotId, T)> {
        let mut out: Vec<(SlotId, T)> = self
            .slots
            .drain()
            .map(|(k, s)| (SlotId(k), s.payload))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        self.evicted += out.len() as u64;
        out
    }
}
