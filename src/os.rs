//! Thin wrapper over `std::fs` and `memmap2`.
//!
//! This is the only module that touches the filesystem or calls into the
//! OS's mapping primitives, mirroring the "OS layer" collaborator from
//! spec §2 — a role `toloco-warp_cache`'s `shm::region` plays for its own
//! cache file. Unlike the C library this spec distills (which wraps raw
//! `open`/`mmap`/`ftruncate`/`munmap`/`msync`), the Rust translation of that
//! layer is `std::fs::OpenOptions` + `memmap2`, which is the idiomatic
//! equivalent, not a scope change (see SPEC_FULL.md §1).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::{Mmap, MmapMut};

pub fn open(path: &Path, flags: &crate::options::OpenFlags) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true);
    if flags.read_write {
        opts.write(true);
    }
    if flags.exclusive {
        opts.create_new(true);
    } else if flags.create {
        opts.create(true);
    }
    opts.open(path)
}

pub fn create_fresh(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

pub fn open_read_write(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

pub fn extend(file: &File, len: u64) -> io::Result<()> {
    file.set_len(len)
}

/// # Safety
/// `file` must not be concurrently truncated by another handle while mapped.
pub unsafe fn map_read_write(file: &File) -> io::Result<MmapMut> {
    MmapMut::map_mut(file)
}

/// # Safety
/// `file` must not be concurrently truncated by another handle while mapped.
pub unsafe fn map_read_only(file: &File) -> io::Result<Mmap> {
    Mmap::map(file)
}

pub fn map_anonymous(len: usize) -> io::Result<MmapMut> {
    MmapMut::map_anon(len)
}
