//! The error taxonomy from spec §7, expressed as a `thiserror` enum instead
//! of the original C library's `(return code, char** err)` convention.

use thiserror::Error;

/// Everything that can go wrong with a [`crate::table::Table`] operation.
///
/// Miss/not-found is deliberately not a variant here: per spec §6 it is
/// "distinguished from errors by a zero return, not a negative code", which
/// this crate expresses as `Ok(false)` / `Ok(None)` rather than an error.
#[derive(Debug, Error)]
pub enum DhtError {
    /// Key too long, bad index, wrong payload length, or a freed handle reused.
    #[error("invalid argument")]
    InvalidArgument,

    /// Mutation attempted on a read-only table, or on a table loaded to memory.
    #[error("operation requires a read-write table")]
    AccessDenied,

    /// Rehash could not allocate the new region; the table is unchanged.
    #[error("allocation failed while growing the table")]
    OutOfMemory,

    /// Header failed self-consistency checks at open time.
    #[error("table file is corrupt: {0}")]
    Corruption(String),

    /// `indexed_lookup` addressed a store-table slot with no live data.
    #[error("store slot has no live data")]
    NoData,

    /// A probe sequence ran the full bucket table without finding an empty
    /// slot. Invariant 2 (`slots_used <= 3/4 * capacity`) guarantees this
    /// never happens; reaching it means the table's accounting is corrupt.
    #[error("probe sequence exhausted — table invariants are violated")]
    Unreachable,

    /// A syscall failed; surfaced close to verbatim.
    #[error(transparent)]
    Os(#[from] std::io::Error),
}
