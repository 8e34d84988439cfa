//! The public table engine: `open`, `lookup`, `insert`, `update`, `delete`,
//! `reserve`, `size`, `capacity`, `indexed_lookup`, `free`, and the optional
//! `load_to_memory` optimization. See spec §4.4.

use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::error::DhtError;
use crate::layout::{
    load_factor_threshold, Header, Layout, FORMAT_VERSION, HEADER_SIZE, MAGIC, MIN_CAPACITY,
};
use crate::options::{OpenFlags, TableOptions};
use crate::os;
use crate::probe::{self, InsertSlot};
use crate::rehash;
use crate::store;

/// The region backing a table. `Anonymous` is only ever entered via
/// [`Table::load_to_memory`].
pub(crate) enum Backing {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
    Anonymous(MmapMut),
}

impl Backing {
    fn as_ptr(&self) -> *const u8 {
        match self {
            Backing::ReadOnly(m) => m.as_ptr(),
            Backing::ReadWrite(m) => m.as_ptr(),
            Backing::Anonymous(m) => m.as_ptr(),
        }
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            Backing::ReadOnly(_) => {
                unreachable!("mutable access requested on a read-only mapping")
            }
            Backing::ReadWrite(m) => m.as_mut_ptr(),
            Backing::Anonymous(m) => m.as_mut_ptr(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Backing::ReadOnly(m) => m.len(),
            Backing::ReadWrite(m) => m.len(),
            Backing::Anonymous(m) => m.len(),
        }
    }

    fn flush(&self) -> std::io::Result<()> {
        match self {
            Backing::ReadOnly(_) => Ok(()),
            Backing::ReadWrite(m) => m.flush(),
            Backing::Anonymous(_) => Ok(()),
        }
    }
}

/// A handle to an open hash-table file.
///
/// Payload references returned by [`Table::lookup`] borrow the handle and
/// are valid until the next mutation that rehashes ([`Table::insert`],
/// [`Table::reserve`]) or until [`Table::free`] — matching spec §5's
/// "rehash invalidates all outstanding pointers".
pub struct Table {
    pub(crate) path: PathBuf,
    pub(crate) file: Option<std::fs::File>,
    pub(crate) backing: Backing,
    read_write: bool,
    freed: bool,
    loaded_to_memory: bool,
}

impl Table {
    /// Open (or create) a hash table file.
    ///
    /// If the file is newly created (zero length), writes a fresh header at
    /// the minimum capacity and extends the file. Otherwise validates the
    /// header against `opts` — a zero field in `opts` accepts whatever is on
    /// disk, a non-zero field must match exactly.
    pub fn open<P: AsRef<Path>>(
        path: P,
        opts: TableOptions,
        flags: OpenFlags,
    ) -> Result<Self, DhtError> {
        let path = path.as_ref().to_path_buf();
        let file = os::open(&path, &flags)?;
        let len = file.metadata()?.len();

        if len == 0 {
            if !flags.read_write {
                return Err(DhtError::AccessDenied);
            }
            return Self::create_fresh(file, path, opts);
        }

        Self::open_existing(file, path, opts, flags.read_write)
    }

    fn create_fresh(file: std::fs::File, path: PathBuf, opts: TableOptions) -> Result<Self, DhtError> {
        if opts.key_maxlen == 0 {
            return Err(DhtError::InvalidArgument);
        }

        let layout = Layout::compute(opts.key_maxlen, opts.object_datalen, MIN_CAPACITY);
        os::extend(&file, layout.total_bytes as u64)?;

        let mut mmap = unsafe { os::map_read_write(&file)? };
        mmap.fill(0);

        {
            let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut Header) };
            header.magic = MAGIC;
            header.version = FORMAT_VERSION;
            header.key_maxlen = opts.key_maxlen;
            header.object_datalen = opts.object_datalen;
            header.capacity = MIN_CAPACITY;
            header.slots_used = 0;
            header.size = 0;
            header.cursor = 0;
        }

        mmap.flush()?;
        log::debug!(
            "created hash table at {path:?}: key_maxlen={}, object_datalen={}, capacity={}",
            opts.key_maxlen,
            opts.object_datalen,
            MIN_CAPACITY
        );

        Ok(Table {
            path,
            file: Some(file),
            backing: Backing::ReadWrite(mmap),
            read_write: true,
            freed: false,
            loaded_to_memory: false,
        })
    }

    fn open_existing(
        file: std::fs::File,
        path: PathBuf,
        opts: TableOptions,
        read_write: bool,
    ) -> Result<Self, DhtError> {
        let file_len = file.metadata()?.len();
        if (file_len as usize) < HEADER_SIZE {
            return Err(DhtError::Corruption(format!(
                "file length {file_len} is smaller than the header ({HEADER_SIZE} bytes)"
            )));
        }

        if read_write {
            let mmap = unsafe { os::map_read_write(&file)? };
            let header = unsafe { &*(mmap.as_ptr() as *const Header) };
            validate_header(header, &opts, file_len)?;
            Ok(Table {
                path,
                file: Some(file),
                backing: Backing::ReadWrite(mmap),
                read_write: true,
                freed: false,
                loaded_to_memory: false,
            })
        } else {
            let mmap = unsafe { os::map_read_only(&file)? };
            let header = unsafe { &*(mmap.as_ptr() as *const Header) };
            validate_header(header, &opts, file_len)?;
            Ok(Table {
                path,
                file: Some(file),
                backing: Backing::ReadOnly(mmap),
                read_write: false,
                freed: false,
                loaded_to_memory: false,
            })
        }
    }

    pub(crate) fn base_ptr(&self) -> *const u8 {
        self.backing.as_ptr()
    }

    fn base_mut_ptr(&mut self) -> *mut u8 {
        self.backing.as_mut_ptr()
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.base_ptr() as *const Header) }
    }

    fn header_mut(&mut self) -> &mut Header {
        unsafe { &mut *(self.base_mut_ptr() as *mut Header) }
    }

    pub(crate) fn layout(&self) -> Layout {
        Layout::from_header(self.header())
    }

    pub(crate) fn bucket_base(&self) -> *const u8 {
        unsafe { self.base_ptr().add(HEADER_SIZE) }
    }

    fn bucket_base_mut(&mut self) -> *mut u8 {
        unsafe { self.base_mut_ptr().add(HEADER_SIZE) }
    }

    pub(crate) fn store_base(&self) -> *const u8 {
        let offset = self.layout().store_table_offset;
        unsafe { self.base_ptr().add(offset) }
    }

    fn store_base_mut(&mut self) -> *mut u8 {
        let offset = self.layout().store_table_offset;
        unsafe { self.base_mut_ptr().add(offset) }
    }

    fn ensure_live(&self) -> Result<(), DhtError> {
        if self.freed {
            Err(DhtError::InvalidArgument)
        } else {
            Ok(())
        }
    }

    fn oversized(&self, key: &str) -> bool {
        key.len() >= self.header().key_maxlen as usize
    }

    /// Build the full `key_maxlen + 1`-byte, NUL-padded key field for `key`.
    /// Caller must already know `!self.oversized(key)`.
    fn encode_key(&self, key: &str) -> Vec<u8> {
        let key_maxlen = self.header().key_maxlen as usize;
        let mut buf = vec![0u8; key_maxlen + 1];
        buf[..key.len()].copy_from_slice(key.as_bytes());
        buf
    }

    /// Look up a key. Returns the address of its payload inside the
    /// mapping, stable until the next rehash or [`Table::free`].
    pub fn lookup(&self, key: &str) -> Result<Option<&[u8]>, DhtError> {
        self.ensure_live()?;

        if self.oversized(key) {
            return Ok(None);
        }

        let key_buf = self.encode_key(key);
        let hash = crate::hash::hash_key(&key_buf[..key.len() + 1]);
        let header = self.header();
        let capacity = header.capacity;
        let key_maxlen = header.key_maxlen as usize;
        let object_datalen = header.object_datalen as usize;
        let slot_size = self.layout().slot_size;
        let store_base = self.store_base();
        let bucket_base = self.bucket_base();

        let found = unsafe {
            probe::probe_lookup(
                bucket_base, capacity, store_base, slot_size, key_maxlen, &key_buf, hash,
            )
        };

        Ok(found.map(|store_index| unsafe {
            store::slot_payload(store_base, slot_size, store_index, key_maxlen, object_datalen)
        }))
    }

    /// Insert `(key, payload)`. Grows the table first if the load-factor
    /// bound would otherwise be exceeded. Returns `Ok(false)` on duplicate
    /// key (no mutation), `Ok(true)` on insert.
    pub fn insert(&mut self, key: &str, payload: &[u8]) -> Result<bool, DhtError> {
        self.ensure_live()?;
        if self.oversized(key) {
            return Err(DhtError::InvalidArgument);
        }
        if payload.len() != self.header().object_datalen as usize {
            return Err(DhtError::InvalidArgument);
        }
        if !self.read_write {
            return Err(DhtError::AccessDenied);
        }

        let header = self.header();
        if header.slots_used + 1 > load_factor_threshold(header.capacity) {
            let target = header.capacity as usize * 2;
            self.reserve(target).map_err(|_| DhtError::OutOfMemory)?;
        }

        let key_buf = self.encode_key(key);
        let hash = crate::hash::hash_key(&key_buf[..key.len() + 1]);
        let header = self.header();
        let capacity = header.capacity;
        let key_maxlen = header.key_maxlen as usize;
        let object_datalen = header.object_datalen as usize;
        let slot_size = self.layout().slot_size;
        let store_base = self.store_base();
        let bucket_base = self.bucket_base();

        let slot = unsafe {
            probe::probe_insert_slot(
                bucket_base, capacity, store_base, slot_size, key_maxlen, &key_buf, hash,
            )
        };

        match slot {
            None => Err(DhtError::Unreachable),
            Some(InsertSlot::Duplicate) => Ok(false),
            Some(InsertSlot::Place {
                bucket_index,
                reused_tombstone,
            }) => {
                let store_index = self.header().cursor;

                let store_base_mut = self.store_base_mut();
                unsafe {
                    store::write_slot(
                        store_base_mut,
                        slot_size,
                        store_index,
                        key_maxlen,
                        object_datalen,
                        &key_buf,
                        payload,
                    );
                }

                let bucket_base_mut = self.bucket_base_mut();
                unsafe {
                    probe::write_bucket(bucket_base_mut, bucket_index, store_index as i64 + 1);
                }

                let header = self.header_mut();
                header.cursor += 1;
                header.size += 1;
                if !reused_tombstone {
                    header.slots_used += 1;
                }

                Ok(true)
            }
        }
    }

    /// Overwrite the payload for an existing key. Returns `Ok(false)` on
    /// miss, `Ok(true)` on overwrite.
    pub fn update(&mut self, key: &str, payload: &[u8]) -> Result<bool, DhtError> {
        self.ensure_live()?;
        if !self.read_write {
            return Err(DhtError::AccessDenied);
        }
        if payload.len() != self.header().object_datalen as usize {
            return Err(DhtError::InvalidArgument);
        }
        if self.oversized(key) {
            return Ok(false);
        }

        let key_buf = self.encode_key(key);
        let hash = crate::hash::hash_key(&key_buf[..key.len() + 1]);
        let header = self.header();
        let capacity = header.capacity;
        let key_maxlen = header.key_maxlen as usize;
        let object_datalen = header.object_datalen as usize;
        let slot_size = self.layout().slot_size;
        let store_base = self.store_base();
        let bucket_base = self.bucket_base();

        let found = unsafe {
            probe::probe_lookup(
                bucket_base, capacity, store_base, slot_size, key_maxlen, &key_buf, hash,
            )
        };

        match found {
            None => Ok(false),
            Some(store_index) => {
                let store_base_mut = self.store_base_mut();
                let dst = unsafe {
                    store::slot_payload_mut(
                        store_base_mut,
                        slot_size,
                        store_index,
                        key_maxlen,
                        object_datalen,
                    )
                };
                dst.copy_from_slice(payload);
                Ok(true)
            }
        }
    }

    /// Delete a key. Returns `Ok(false)` on miss, `Ok(true)` on removal.
    /// `slots_used` is unchanged — the bucket becomes a tombstone.
    pub fn delete(&mut self, key: &str) -> Result<bool, DhtError> {
        self.ensure_live()?;
        if !self.read_write {
            return Err(DhtError::AccessDenied);
        }
        if self.oversized(key) {
            return Ok(false);
        }

        let key_buf = self.encode_key(key);
        let hash = crate::hash::hash_key(&key_buf[..key.len() + 1]);
        let header = self.header();
        let capacity = header.capacity;
        let key_maxlen = header.key_maxlen as usize;
        let slot_size = self.layout().slot_size;
        let store_base = self.store_base();
        let bucket_base_mut = self.bucket_base_mut();

        let removed = unsafe {
            probe::probe_delete(
                bucket_base_mut,
                capacity,
                store_base,
                slot_size,
                key_maxlen,
                &key_buf,
                hash,
            )
        };

        match removed {
            None => Ok(false),
            Some(store_index) => {
                let store_base_mut = self.store_base_mut();
                unsafe {
                    store::zero_slot_key(store_base_mut, slot_size, store_index, key_maxlen);
                }
                self.header_mut().size -= 1;
                Ok(true)
            }
        }
    }

    /// Request at least `n` slots of capacity. Rounds up to the next power
    /// of two `>= max(n, MIN_CAPACITY)`. A no-op (returning the current
    /// capacity) if that is `<=` the current capacity. Returns the new
    /// capacity, or an error with the table left unchanged.
    pub fn reserve(&mut self, n: usize) -> Result<u32, DhtError> {
        self.ensure_live()?;
        if !self.read_write {
            return Err(DhtError::AccessDenied);
        }

        let current_capacity = self.header().capacity;
        let target = (n.max(MIN_CAPACITY as usize) as u32).next_power_of_two();
        if target <= current_capacity {
            return Ok(current_capacity);
        }

        rehash::grow(self, target)?;
        Ok(self.header().capacity)
    }

    /// Number of live entries.
    pub fn size(&self) -> u32 {
        self.header().size
    }

    /// Number of primary buckets.
    pub fn capacity(&self) -> u32 {
        self.header().capacity
    }

    /// Number of non-empty buckets, including tombstones.
    pub fn slots_used(&self) -> u32 {
        self.header().slots_used
    }

    /// `slots_used - size`: store slots whose primary-bucket reference was
    /// deleted but whose store-table slot was never reclaimed.
    pub fn dirty_slots(&self) -> u32 {
        self.slots_used() - self.size()
    }

    /// Next store-table index that would be assigned by an insert. The
    /// exclusive upper bound of the valid range for [`Table::indexed_lookup`].
    pub fn cursor(&self) -> u32 {
        self.header().cursor
    }

    /// Look up store-table slot `index` directly, bypassing the hash table.
    /// Valid range is `[0, cursor)`. Returns [`DhtError::NoData`] if the
    /// slot is not currently referenced by any primary bucket.
    pub fn indexed_lookup(&self, index: u32) -> Result<(String, Vec<u8>), DhtError> {
        self.ensure_live()?;

        let header = self.header();
        if index >= header.cursor {
            return Err(DhtError::InvalidArgument);
        }

        let capacity = header.capacity;
        let key_maxlen = header.key_maxlen as usize;
        let object_datalen = header.object_datalen as usize;
        let slot_size = self.layout().slot_size;
        let bucket_base = self.bucket_base();

        if !unsafe { probe::bucket_references(bucket_base, capacity, index) } {
            return Err(DhtError::NoData);
        }

        let store_base = self.store_base();
        let key_bytes = unsafe { store::slot_key_trimmed(store_base, slot_size, index, key_maxlen) };
        let payload =
            unsafe { store::slot_payload(store_base, slot_size, index, key_maxlen, object_datalen) };

        Ok((String::from_utf8_lossy(key_bytes).into_owned(), payload.to_vec()))
    }

    /// Copy the mapped bytes into a private anonymous allocation and drop
    /// the file descriptor. Only valid on a read-only table that has not
    /// already been loaded. A failed copy marks the handle as freed — the
    /// caller must discard it.
    pub fn load_to_memory(&mut self) -> Result<(), DhtError> {
        self.ensure_live()?;
        if self.read_write || self.loaded_to_memory {
            return Err(DhtError::InvalidArgument);
        }

        let len = self.backing.len();
        let mut anon = match os::map_anonymous(len) {
            Ok(m) => m,
            Err(e) => {
                self.freed = true;
                return Err(DhtError::Os(e));
            }
        };

        anon.copy_from_slice(unsafe { std::slice::from_raw_parts(self.backing.as_ptr(), len) });

        self.backing = Backing::Anonymous(anon);
        self.file = None;
        self.loaded_to_memory = true;
        Ok(())
    }

    /// Flush dirty pages to disk and release the handle. Safe to call
    /// regardless of whether any read/write operation has taken place.
    pub fn free(mut self) -> Result<(), DhtError> {
        self.sync()?;
        self.freed = true;
        Ok(())
    }

    fn sync(&self) -> Result<(), DhtError> {
        self.backing.flush().map_err(DhtError::Os)
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if !self.freed {
            let _ = self.sync();
        }
    }
}

fn validate_header(header: &Header, opts: &TableOptions, file_len: u64) -> Result<(), DhtError> {
    if header.magic != MAGIC {
        log::warn!("rejecting open: bad magic in header");
        return Err(DhtError::Corruption("bad magic".to_string()));
    }
    if header.version != FORMAT_VERSION {
        log::warn!(
            "rejecting open: unsupported format version {} (expected {FORMAT_VERSION})",
            header.version
        );
        return Err(DhtError::Corruption(format!(
            "unsupported format version {}",
            header.version
        )));
    }
    if opts.key_maxlen != 0 && opts.key_maxlen != header.key_maxlen {
        log::warn!(
            "rejecting open: key_maxlen mismatch: on disk {}, requested {}",
            header.key_maxlen,
            opts.key_maxlen
        );
        return Err(DhtError::Corruption(format!(
            "key_maxlen mismatch: on disk {}, requested {}",
            header.key_maxlen, opts.key_maxlen
        )));
    }
    if opts.object_datalen != 0 && opts.object_datalen != header.object_datalen {
        log::warn!(
            "rejecting open: object_datalen mismatch: on disk {}, requested {}",
            header.object_datalen,
            opts.object_datalen
        );
        return Err(DhtError::Corruption(format!(
            "object_datalen mismatch: on disk {}, requested {}",
            header.object_datalen, opts.object_datalen
        )));
    }
    if !header.capacity.is_power_of_two() || header.capacity < MIN_CAPACITY {
        log::warn!("rejecting open: invalid capacity {} in header", header.capacity);
        return Err(DhtError::Corruption(format!(
            "invalid capacity {} in header",
            header.capacity
        )));
    }

    let layout = Layout::from_header(header);
    if file_len < layout.total_bytes as u64 {
        log::warn!(
            "rejecting open: file length {file_len} smaller than expected {}",
            layout.total_bytes
        );
        return Err(DhtError::Corruption(format!(
            "file length {file_len} smaller than expected {}",
            layout.total_bytes
        )));
    }

    Ok(())
}
