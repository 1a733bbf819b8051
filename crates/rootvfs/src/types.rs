//! Raw shapes reported by a [`Backend`](crate::backends::Backend).
//!
//! Caller-facing descriptors are built from these in [`meta`](crate::meta).

use serde::Serialize;
use std::fs::Metadata;
use std::time::SystemTime;

/// What sits at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    /// Classify host metadata. Anything that is neither a directory nor a
    /// link (fifos, sockets, devices) counts as a file.
    pub fn of(meta: &Metadata) -> Self {
        let ft = meta.file_type();
        if ft.is_symlink() {
            Self::Symlink
        } else if ft.is_dir() {
            Self::Directory
        } else {
            Self::File
        }
    }

    pub fn is_file(self) -> bool {
        self == Self::File
    }

    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }

    pub fn is_symlink(self) -> bool {
        self == Self::Symlink
    }
}

/// Size, kind and modification time of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub kind: EntryKind,
    /// Bytes for files, link text length for symlinks; backend-defined for
    /// directories.
    pub size: u64,
    pub mtime: SystemTime,
}

impl Attr {
    /// Attributes stamped with the current time.
    pub fn new(kind: EntryKind, size: u64) -> Self {
        Self {
            kind,
            size,
            mtime: SystemTime::now(),
        }
    }

    /// Attributes from host metadata. An unreadable mtime reads as the epoch.
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            kind: EntryKind::of(meta),
            size: meta.len(),
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }

    /// Modification time in milliseconds since the Unix epoch; 0 before it.
    pub fn mtime_millis(&self) -> u64 {
        self.mtime
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}

/// One child of a listed directory.
#[derive(Debug, Clone)]
pub struct RawDirEntry {
    /// Final segment only.
    pub name: String,
    /// Attributes of the child itself; a symlink child is not followed.
    pub attr: Attr,
}
