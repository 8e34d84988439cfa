//! Open-addressing probe engine: linear probing over the primary bucket
//! table, tombstone-aware on insert and delete, tombstone-skipping on
//! lookup. See spec §4.3.
//!
//! Every function here takes raw base pointers rather than borrowing a
//! `Table`, so the caller controls exactly when the mutable/immutable
//! pointers it juggles (bucket table vs. store table) are live — the same
//! shape `toloco-warp_cache::shm::hashtable` uses for its own probe
//! functions, grounding the zero-copy-pointer style this module keeps.

use crate::hash;
use crate::layout::{BUCKET_EMPTY, BUCKET_SIZE, BUCKET_TOMBSTONE};
use crate::store;

/// Read the bucket at `index`.
///
/// # Safety
/// `bucket_base` must point to a valid bucket table of at least `index + 1`
/// buckets.
pub unsafe fn read_bucket(bucket_base: *const u8, index: u32) -> i64 {
    (bucket_base.add(index as usize * BUCKET_SIZE) as *const i64).read()
}

/// Write the bucket at `index`.
///
/// # Safety
/// Same requirements as [`read_bucket`], plus the region must be writable.
pub unsafe fn write_bucket(bucket_base: *mut u8, index: u32, value: i64) {
    (bucket_base.add(index as usize * BUCKET_SIZE) as *mut i64).write(value);
}

/// Outcome of probing for an insertion point.
pub enum InsertSlot {
    /// The key is already present; no mutation should occur.
    Duplicate,
    /// Install the new bucket reference here.
    Place {
        bucket_index: u32,
        /// `true` if `bucket_index` held a tombstone (so `slots_used` must
        /// not be incremented by the caller).
        reused_tombstone: bool,
    },
}

/// Look up `key_with_nul` (the full `key_maxlen + 1`-byte padded key field,
/// byte-for-byte identical to what's stored). Returns the store-table index
/// on a hit.
///
/// # Safety
/// `bucket_base` must point to `capacity` valid buckets; `store_base` must
/// point to a valid store table with slots of `slot_size` bytes, each with
/// a `key_maxlen + 1`-byte key field at its start.
pub unsafe fn probe_lookup(
    bucket_base: *const u8,
    capacity: u32,
    store_base: *const u8,
    slot_size: usize,
    key_maxlen: usize,
    key_with_nul: &[u8],
    key_hash: u64,
) -> Option<u32> {
    let mask = capacity - 1;
    let mut idx = hash::bucket_index(key_hash, capacity);

    for _ in 0..capacity {
        let bucket = read_bucket(bucket_base, idx);

        if bucket == BUCKET_EMPTY {
            return None;
        }

        if bucket != BUCKET_TOMBSTONE {
            let store_index = (bucket - 1) as u32;
            let stored_key = store::slot_key(store_base, slot_size, store_index, key_maxlen);
            if stored_key == key_with_nul {
                return Some(store_index);
            }
        }

        idx = (idx + 1) & mask;
    }

    None
}

/// One insert pass: records the first tombstone seen, stops at the first
/// match (duplicate) or the first empty bucket. Returns `None` only if the
/// probe walked the entire table without finding an empty bucket — which
/// invariant 2 (`slots_used <= 3/4 * capacity`) guarantees cannot happen.
///
/// # Safety
/// Same requirements as [`probe_lookup`].
pub unsafe fn probe_insert_slot(
    bucket_base: *const u8,
    capacity: u32,
    store_base: *const u8,
    slot_size: usize,
    key_maxlen: usize,
    key_with_nul: &[u8],
    key_hash: u64,
) -> Option<InsertSlot> {
    let mask = capacity - 1;
    let mut idx = hash::bucket_index(key_hash, capacity);
    let mut first_tombstone: Option<u32> = None;

    for _ in 0..capacity {
        let bucket = read_bucket(bucket_base, idx);

        if bucket == BUCKET_EMPTY {
            return Some(match first_tombstone {
                Some(t) => InsertSlot::Place {
                    bucket_index: t,
                    reused_tombstone: true,
                },
                None => InsertSlot::Place {
                    bucket_index: idx,
                    reused_tombstone: false,
                },
            });
        }

        if bucket == BUCKET_TOMBSTONE {
            if first_tombstone.is_none() {
                first_tombstone = Some(idx);
            }
        } else {
            let store_index = (bucket - 1) as u32;
            let stored_key = store::slot_key(store_base, slot_size, store_index, key_maxlen);
            if stored_key == key_with_nul {
                return Some(InsertSlot::Duplicate);
            }
        }

        idx = (idx + 1) & mask;
    }

    None
}

/// Locate and tombstone the bucket referencing `key_with_nul`. Returns the
/// store-table index that was deleted.
///
/// # Safety
/// Same requirements as [`probe_lookup`], and the bucket table must be
/// writable.
pub unsafe fn probe_delete(
    bucket_base: *mut u8,
    capacity: u32,
    store_base: *const u8,
    slot_size: usize,
    key_maxlen: usize,
    key_with_nul: &[u8],
    key_hash: u64,
) -> Option<u32> {
    let mask = capacity - 1;
    let mut idx = hash::bucket_index(key_hash, capacity);

    for _ in 0..capacity {
        let bucket = read_bucket(bucket_base, idx);

        if bucket == BUCKET_EMPTY {
            return None;
        }

        if bucket != BUCKET_TOMBSTONE {
            let store_index = (bucket - 1) as u32;
            let stored_key = store::slot_key(store_base, slot_size, store_index, key_maxlen);
            if stored_key == key_with_nul {
                write_bucket(bucket_base, idx, BUCKET_TOMBSTONE);
                return Some(store_index);
            }
        }

        idx = (idx + 1) & mask;
    }

    None
}

/// Whether any bucket currently references store-table slot `store_index`.
/// This is the authoritative liveness check (spec invariant 4) — the
/// zeroed-key-on-delete convention is only a debugging hint, not load-bearing.
///
/// # Safety
/// `bucket_base` must point to `capacity` valid buckets.
pub unsafe fn bucket_references(bucket_base: *const u8, capacity: u32, store_index: u32) -> bool {
    let target = store_index as i64 + 1;
    (0..capacity).any(|i| read_bucket(bucket_base, i) == target)
}
