//! Bounded in-memory packet cache.
//!
//! A fixed array of slots, each FREE or LIVE. A live slot owns exactly one
//! packet buffer, indexed by the ID extracted from its bytes. One slot is
//! always held in reserve, so an insert that had to evict can never fail
//! to find a free slot. Slot selection walks a monotonically advancing
//! cursor (rotating first fit), which also picks eviction victims — the
//! result approximates FIFO without a read-touch path.
//!
//! Every entry that leaves the cache (eviction, explicit removal, drop)
//! passes through the release callback exactly once.

use std::collections::HashMap;

use cairn_core::packet::MESSAGE_ID_SIZE;
use cairn_core::extract_id;

/// Default number of slots. Effective capacity is one less.
pub const CACHE_CAPACITY: usize = 1024;

/// The ID a live entry is filed under.
pub type PacketId = [u8; MESSAGE_ID_SIZE];

/// An owned packet buffer held by the cache.
#[derive(Debug)]
pub struct CacheEntry {
    bytes: Vec<u8>,
}

impl CacheEntry {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The ID this entry is filed under, re-derived from its bytes.
    pub fn id(&self) -> Option<&PacketId> {
        extract_id(&self.bytes)
    }
}

#[derive(Debug)]
enum Slot {
    Free,
    Live(CacheEntry),
}

impl Slot {
    fn is_live(&self) -> bool {
        matches!(self, Slot::Live(_))
    }
}

/// Called once for every entry that leaves the cache.
pub type ReleaseFn = Box<dyn FnMut(CacheEntry) + Send>;

/// Why `add` refused a buffer. The buffer comes back with the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No packet ID, message ID, or payload-derived ID.
    NoId,
    /// An entry with this ID is already live; the stored copy is kept.
    Duplicate,
    /// No free slot after eviction. Cannot happen while the reserved-slot
    /// invariant holds; logged as an invariant violation.
    NoFreeSlot,
}

/// A buffer the cache declined to take. Ownership returns to the caller,
/// who is responsible for releasing it (in practice: dropping it).
#[derive(Debug)]
pub struct RejectedPacket {
    pub bytes: Vec<u8>,
    pub reason: RejectReason,
}

pub struct PacketCache {
    slots: Vec<Slot>,
    /// ID → slot index, one entry per live slot.
    index: HashMap<PacketId, usize>,
    /// Next slot to consider, for placement and for eviction.
    cursor: usize,
    release: ReleaseFn,
}

impl PacketCache {
    /// A cache with `capacity` slots of which `capacity - 1` are usable.
    /// `release` observes every entry on its way out.
    pub fn new(capacity: usize, release: ReleaseFn) -> Self {
        let capacity = capacity.max(2);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Free);
        Self {
            slots,
            index: HashMap::new(),
            cursor: 0,
            release,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total slot count. Usable capacity is one less.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: &PacketId) -> bool {
        self.index.contains_key(id)
    }

    /// Look up a live entry by its ID.
    pub fn get(&self, id: &PacketId) -> Option<&CacheEntry> {
        let idx = *self.index.get(id)?;
        match &self.slots[idx] {
            Slot::Live(entry) => Some(entry),
            Slot::Free => None,
        }
    }

    /// Take ownership of `bytes` and file it under its extracted ID.
    ///
    /// Refuses buffers without an ID and duplicates (the stored copy is
    /// never displaced). On a full cache exactly one victim is evicted
    /// first, through the release callback.
    pub fn add(&mut self, bytes: Vec<u8>) -> Result<(), RejectedPacket> {
        let Some(id) = extract_id(&bytes).copied() else {
            return Err(RejectedPacket {
                bytes,
                reason: RejectReason::NoId,
            });
        };
        if self.index.contains_key(&id) {
            return Err(RejectedPacket {
                bytes,
                reason: RejectReason::Duplicate,
            });
        }
        if self.index.len() + 1 >= self.slots.len() {
            self.evict_one();
        }
        let Some(slot_idx) = self.find_free_slot() else {
            tracing::error!("no free slot after eviction; reserved-slot invariant violated");
            return Err(RejectedPacket {
                bytes,
                reason: RejectReason::NoFreeSlot,
            });
        };
        self.slots[slot_idx] = Slot::Live(CacheEntry { bytes });
        self.index.insert(id, slot_idx);
        self.cursor = (slot_idx + 1) % self.slots.len();
        Ok(())
    }

    /// First live entry the predicate accepts. Scan order is unspecified
    /// but stable within a single call.
    pub fn get_match<P>(&self, pred: P) -> Option<&CacheEntry>
    where
        P: Fn(&CacheEntry) -> bool,
    {
        self.live_entries().find(|entry| pred(entry))
    }

    /// Every live entry the predicate accepts.
    pub fn all_matches<P>(&self, pred: P) -> Vec<&CacheEntry>
    where
        P: Fn(&CacheEntry) -> bool,
    {
        self.live_entries().filter(|entry| pred(entry)).collect()
    }

    /// Remove every live entry filed under `id`, releasing each. Returns
    /// the number removed (at most one while the unique-ID invariant
    /// holds).
    pub fn remove_id(&mut self, id: &PacketId) -> usize {
        let mut removed = 0;
        while let Some(&idx) = self.index.get(id) {
            self.release_slot(idx);
            removed += 1;
        }
        removed
    }

    fn live_entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Live(entry) => Some(entry),
            Slot::Free => None,
        })
    }

    /// Evict the first live slot at or after the cursor.
    fn evict_one(&mut self) {
        let n = self.slots.len();
        for i in 0..n {
            let idx = (self.cursor + i) % n;
            if self.slots[idx].is_live() {
                self.release_slot(idx);
                return;
            }
        }
        tracing::error!("eviction requested on a cache with no live slots");
    }

    fn find_free_slot(&self) -> Option<usize> {
        let n = self.slots.len();
        (0..n)
            .map(|i| (self.cursor + i) % n)
            .find(|&idx| !self.slots[idx].is_live())
    }

    /// FREE the slot, unindex it, and hand the entry to the release
    /// callback. The slot is free before the callback runs.
    fn release_slot(&mut self, idx: usize) {
        let slot = std::mem::replace(&mut self.slots[idx], Slot::Free);
        let Slot::Live(entry) = slot else {
            return;
        };
        if let Some(id) = extract_id(&entry.bytes).copied() {
            self.index.remove(&id);
        }
        tracing::trace!(slot = idx, len = entry.len(), "cache entry released");
        (self.release)(entry);
    }
}

impl Drop for PacketCache {
    fn drop(&mut self) {
        for idx in 0..self.slots.len() {
            if self.slots[idx].is_live() {
                self.release_slot(idx);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
