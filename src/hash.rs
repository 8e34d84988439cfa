//! Deterministic, seedless 64-bit string hash.
//!
//! `fxhash::FxHasher` is the fast multiply-rotate-xor mix used throughout
//! rustc and `hashbrown`'s default tables — no per-process random seed,
//! unlike `ahash` (which the rest of this crate's mmap lineage,
//! `toloco-warp_cache`, depends on but which is unsuitable here): the
//! bucket-index reduction below is persisted to disk, so the hash must be
//! stable across process runs and across every process that opens the same
//! file.

use std::hash::Hasher;

use fxhash::FxHasher;

/// Hash the key's NUL-terminated bytes (`key` followed by one `0x00`).
pub fn hash_key(key_with_nul: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(key_with_nul);
    hasher.finish()
}

/// Reduce a hash to a bucket index. `capacity` must be a power of two.
pub fn bucket_index(hash: u64, capacity: u32) -> u32 {
    debug_assert!(capacity.is_power_of_two());
    (hash as u32) & (capacity - 1)
}
