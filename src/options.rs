//! Caller-supplied options for opening a table, replacing the original
//! library's raw `O_*` flag integer with a small builder.

/// `(key_maxlen, object_datalen)` passed to [`crate::table::Table::open`].
///
/// A zero in either field means "accept whatever is on disk"; a non-zero
/// value must match the value already stored in an existing file's header
/// exactly, or [`crate::error::DhtError::Corruption`] is returned. Both
/// fields must be non-zero when creating a brand new file — there is
/// nothing on disk yet to fall back to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub key_maxlen: u32,
    pub object_datalen: u32,
}

impl TableOptions {
    pub fn new(key_maxlen: u32, object_datalen: u32) -> Self {
        TableOptions {
            key_maxlen,
            object_datalen,
        }
    }

    /// `{0, 0}` — accept whatever is on disk. Only valid against an
    /// existing file.
    pub fn any() -> Self {
        TableOptions::default()
    }
}

/// Standard open flags, passed through from the caller the way `O_RDWR`,
/// `O_CREAT`, and `O_EXCL` are passed through in the original library.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read_write: bool,
    pub create: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        OpenFlags {
            read_write: false,
            create: false,
            exclusive: false,
        }
    }

    pub fn read_write() -> Self {
        OpenFlags {
            read_write: true,
            create: false,
            exclusive: false,
        }
    }

    pub fn create() -> Self {
        OpenFlags {
            read_write: true,
            create: true,
            exclusive: false,
        }
    }

    pub fn create_exclusive() -> Self {
        OpenFlags {
            read_write: true,
            create: true,
            exclusive: true,
        }
    }
}
