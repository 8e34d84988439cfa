//! The insertion-ordered store table: an array of `capacity` slot records,
//! each a NUL-padded key field followed by a fixed-width payload. See
//! spec §4.5.
//!
//! Like [`crate::probe`], every function here takes raw base pointers so
//! the table engine controls borrow lifetimes explicitly.

/// The full `key_maxlen + 1`-byte key field of slot `index`, NUL-padded.
/// Byte-for-byte comparable against an encoded query key.
///
/// # Safety
/// `store_base` must point to a valid store table with slots of `slot_size`
/// bytes; `index` must be `< capacity`.
pub unsafe fn slot_key<'a>(
    store_base: *const u8,
    slot_size: usize,
    index: u32,
    key_maxlen: usize,
) -> &'a [u8] {
    let slot_ptr = store_base.add(index as usize * slot_size);
    std::slice::from_raw_parts(slot_ptr, key_maxlen + 1)
}

/// The key field of slot `index`, trimmed at the first NUL byte.
///
/// # Safety
/// Same requirements as [`slot_key`].
pub unsafe fn slot_key_trimmed<'a>(
    store_base: *const u8,
    slot_size: usize,
    index: u32,
    key_maxlen: usize,
) -> &'a [u8] {
    let full = slot_key(store_base, slot_size, index, key_maxlen);
    let len = full.iter().position(|&b| b == 0).unwrap_or(full.len());
    &full[..len]
}

/// The payload field of slot `index`.
///
/// # Safety
/// Same requirements as [`slot_key`], plus `object_datalen` must match the
/// table's configured payload width.
pub unsafe fn slot_payload<'a>(
    store_base: *const u8,
    slot_size: usize,
    index: u32,
    key_maxlen: usize,
    object_datalen: usize,
) -> &'a [u8] {
    let slot_ptr = store_base.add(index as usize * slot_size);
    std::slice::from_raw_parts(slot_ptr.add(key_maxlen + 1), object_datalen)
}

/// Mutable view of the payload field of slot `index`.
///
/// # Safety
/// Same requirements as [`slot_payload`], plus the region must be writable.
pub unsafe fn slot_payload_mut<'a>(
    store_base: *mut u8,
    slot_size: usize,
    index: u32,
    key_maxlen: usize,
    object_datalen: usize,
) -> &'a mut [u8] {
    let slot_ptr = store_base.add(index as usize * slot_size);
    std::slice::from_raw_parts_mut(slot_ptr.add(key_maxlen + 1), object_datalen)
}

/// Write a fresh `(key, payload)` pair into slot `index`. `key_with_nul`
/// must already be the full `key_maxlen + 1`-byte padded field.
///
/// # Safety
/// Same requirements as [`slot_payload_mut`].
pub unsafe fn write_slot(
    store_base: *mut u8,
    slot_size: usize,
    index: u32,
    key_maxlen: usize,
    object_datalen: usize,
    key_with_nul: &[u8],
    payload: &[u8],
) {
    debug_assert_eq!(key_with_nul.len(), key_maxlen + 1);
    debug_assert_eq!(payload.len(), object_datalen);

    let slot_ptr = store_base.add(index as usize * slot_size);
    let key_dst = std::slice::from_raw_parts_mut(slot_ptr, key_maxlen + 1);
    key_dst.copy_from_slice(key_with_nul);

    let payload_dst = std::slice::from_raw_parts_mut(slot_ptr.add(key_maxlen + 1), object_datalen);
    payload_dst.copy_from_slice(payload);
}

/// Zero the key field of slot `index`. A debugging hint for dead slots
/// (spec §4.3 Delete) — liveness itself is decided by bucket membership,
/// see [`crate::probe::bucket_references`].
///
/// # Safety
/// Same requirements as [`slot_payload_mut`].
pub unsafe fn zero_slot_key(store_base: *mut u8, slot_size: usize, index: u32, key_maxlen: usize) {
    let slot_ptr = store_base.add(index as usize * slot_size);
    std::slice::from_raw_parts_mut(slot_ptr, key_maxlen + 1).fill(0);
}

/// Length of the key (excluding NUL and padding) within a `key_maxlen + 1`
/// byte field.
pub fn trimmed_len(key_field: &[u8]) -> usize {
    key_field.iter().position(|&b| b == 0).unwrap_or(key_field.len())
}
