//! Growth by rehashing into a freshly built region. See spec §4.6.
//!
//! The new region is built in a sibling temp file, fully populated, then
//! swapped into place with `rename` — an atomic directory-entry update on
//! the same filesystem. This is the "sibling temp file" strategy spec §4.6
//! step 2 offers as an alternative to extend-and-copy-in-place; it avoids
//! the self-overlapping-copy bookkeeping the in-place strategy needs and
//! gives the same guarantee: failure at any point before the rename leaves
//! the original file and the caller's live mapping untouched.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DhtError;
use crate::hash;
use crate::layout::{Header, Layout, FORMAT_VERSION, MAGIC};
use crate::os;
use crate::probe::{self, InsertSlot};
use crate::store;
use crate::table::{Backing, Table};

pub fn grow(table: &mut Table, new_capacity: u32) -> Result<(), DhtError> {
    let old_layout = table.layout();
    let key_maxlen = old_layout.key_maxlen;
    let object_datalen = old_layout.object_datalen;
    let old_capacity = old_layout.capacity;
    let old_cursor = unsafe { (*(table.base_ptr() as *const Header)).cursor };

    log::info!(
        "rehashing {:?}: capacity {old_capacity} -> {new_capacity}, walking {old_cursor} store slots",
        table.path
    );

    // Membership bitmap from the old bucket table (invariant 4 is
    // authoritative; the zeroed-key convention on delete is only a hint).
    let old_bucket_base = table.bucket_base();
    let mut live = vec![false; old_cursor as usize];
    for i in 0..old_capacity {
        let bucket = unsafe { probe::read_bucket(old_bucket_base, i) };
        if bucket > 0 {
            live[(bucket - 1) as usize] = true;
        }
    }

    let new_layout = Layout::compute(key_maxlen, object_datalen, new_capacity);
    let tmp_path = sibling_tmp_path(&table.path);

    let tmp_file = match os::create_fresh(&tmp_path) {
        Ok(f) => f,
        Err(e) => return Err(DhtError::Os(e)),
    };
    if let Err(e) = os::extend(&tmp_file, new_layout.total_bytes as u64) {
        let _ = fs::remove_file(&tmp_path);
        return Err(DhtError::Os(e));
    }

    let mut new_mmap = match unsafe { os::map_read_write(&tmp_file) } {
        Ok(m) => m,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(DhtError::Os(e));
        }
    };

    // Zeroing the whole region gives every bucket BUCKET_EMPTY (0) for free.
    new_mmap.fill(0);
    {
        let header = unsafe { &mut *(new_mmap.as_mut_ptr() as *mut Header) };
        header.magic = MAGIC;
        header.version = FORMAT_VERSION;
        header.key_maxlen = key_maxlen;
        header.object_datalen = object_datalen;
        header.capacity = new_capacity;
        header.slots_used = 0;
        header.size = 0;
        header.cursor = 0;
    }

    let new_bucket_base = unsafe { new_mmap.as_mut_ptr().add(new_layout.bucket_table_offset) };
    let new_store_base = unsafe { new_mmap.as_mut_ptr().add(new_layout.store_table_offset) };
    let old_store_base = table.store_base();
    let key_maxlen_usize = key_maxlen as usize;
    let object_datalen_usize = object_datalen as usize;
    let old_slot_size = old_layout.slot_size;

    for idx in 0..old_cursor {
        if !live[idx as usize] {
            continue;
        }

        let key_field = unsafe { store::slot_key(old_store_base, old_slot_size, idx, key_maxlen_usize) };
        let key_len = store::trimmed_len(key_field);
        let payload = unsafe {
            store::slot_payload(
                old_store_base,
                old_slot_size,
                idx,
                key_maxlen_usize,
                object_datalen_usize,
            )
        };
        let key_hash = hash::hash_key(&key_field[..key_len + 1]);

        let new_cursor = unsafe { (*(new_mmap.as_ptr() as *const Header)).cursor };
        let placed = unsafe {
            probe::probe_insert_slot(
                new_bucket_base,
                new_capacity,
                new_store_base,
                new_layout.slot_size,
                key_maxlen_usize,
                key_field,
                key_hash,
            )
        };

        match placed {
            Some(InsertSlot::Place { bucket_index, .. }) => unsafe {
                store::write_slot(
                    new_store_base,
                    new_layout.slot_size,
                    new_cursor,
                    key_maxlen_usize,
                    object_datalen_usize,
                    key_field,
                    payload,
                );
                probe::write_bucket(new_bucket_base, bucket_index, new_cursor as i64 + 1);
                let header = &mut *(new_mmap.as_mut_ptr() as *mut Header);
                header.cursor += 1;
                header.size += 1;
                header.slots_used += 1;
            },
            _ => {
                // A freshly built, larger table rejecting a reinsert of a
                // previously-live entry means the old table's invariants
                // were already broken; abort and leave the original intact.
                log::error!("rehash reinsert failed unexpectedly, aborting growth");
                drop(new_mmap);
                let _ = fs::remove_file(&tmp_path);
                return Err(DhtError::Unreachable);
            }
        }
    }

    if let Err(e) = new_mmap.flush() {
        drop(new_mmap);
        let _ = fs::remove_file(&tmp_path);
        return Err(DhtError::Os(e));
    }
    drop(new_mmap);
    drop(tmp_file);

    if let Err(e) = fs::rename(&tmp_path, &table.path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(DhtError::Os(e));
    }

    let new_file = match os::open_read_write(&table.path) {
        Ok(f) => f,
        Err(e) => return Err(DhtError::Os(e)),
    };
    let new_live_mmap = unsafe { os::map_read_write(&new_file) }.map_err(DhtError::Os)?;

    table.file = Some(new_file);
    table.backing = Backing::ReadWrite(new_live_mmap);

    log::info!("rehash complete: {:?} now at capacity {new_capacity}", table.path);
    Ok(())
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".rehash-tmp");
    PathBuf::from(name)
}
