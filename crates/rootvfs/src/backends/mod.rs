//! Backing filesystem capability.
//!
//! A [`Backend`] is the only surface the VFS touches storage through. It
//! speaks real absolute paths and reports raw `io::Error`s; containment and
//! error normalization happen above it.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

use crate::types::{Attr, RawDirEntry};

/// Owned, sendable byte source.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Lazy listing of a directory's children.
pub type RawEntryStream = BoxStream<'static, io::Result<RawDirEntry>>;

/// Storage primitives the VFS is built on.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Canonical form of an existing directory, used once for the root.
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Attributes of `path` itself, without following a final symlink.
    async fn lstat(&self, path: &Path) -> io::Result<Attr>;

    /// Attributes of `path`, following symlinks.
    async fn stat(&self, path: &Path) -> io::Result<Attr>;

    /// Target text of a symlink.
    async fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Open a file for reading, positioned at `offset`.
    async fn open_read(&self, path: &Path, offset: u64) -> io::Result<BoxReader>;

    /// Create or truncate `path`, drain `reader` into it and make the data
    /// durable. Returns the number of bytes written.
    async fn write_from(&self, path: &Path, reader: BoxReader) -> io::Result<u64>;

    /// List the children of a directory.
    async fn read_dir(&self, path: &Path) -> io::Result<RawEntryStream>;

    /// Create a single directory; the parent must exist.
    async fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or symlink.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory.
    async fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything below it.
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Atomically move `from` to `to`.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create a symlink at `link` whose content is `target`, verbatim.
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Check whether anything, including a dangling symlink, is at `path`.
    async fn exists(&self, path: &Path) -> bool {
        self.lstat(path).await.is_ok()
    }
}
