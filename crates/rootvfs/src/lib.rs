//! A filesystem confined to one root directory.
//!
//! Callers speak in virtual paths (`/dir/file.txt`) that are mapped onto a
//! real root. Nothing a caller passes can reach outside that root: `..`
//! above it is refused, and with symlink checking on, every link met while
//! resolving is re-checked against the root.
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use rootvfs::{ReadOptions, RootConfig, Vfs};
//!
//! # async fn demo() -> rootvfs::VfsResult<()> {
//! let vfs = Vfs::local(RootConfig::new("/srv/workspace")).await?;
//! let read = vfs.readfile("/notes/today.md", ReadOptions::new()).await?;
//! if let Some(stream) = read.stream {
//!     let chunks: Vec<bytes::Bytes> = stream.try_collect().await?;
//!     println!("{} bytes of {}", chunks.concat().len(), read.meta.mime);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Storage is reached through the [`Backend`] trait, with a local disk
//! implementation and an in-memory one.

pub mod backends;
pub mod config;
pub mod error;
pub mod meta;
pub mod mime;
pub mod options;
pub mod path;
pub mod resolve;
pub mod stream;
pub mod types;
mod vfs;

pub use backends::{Backend, BoxReader, LocalBackend, MemoryBackend};
pub use config::RootConfig;
pub use error::{ErrorCode, VfsError, VfsResult};
pub use meta::Meta;
pub use mime::{ExtensionMime, MimeLookup};
pub use options::{
    ByteRange, MkfileOptions, ReadOptions, ReaddirOptions, ResolveOptions, RmdirOptions,
    SymlinkOptions, TransferOptions,
};
pub use resolve::ResolvedPath;
pub use stream::{ByteStream, ContentRange, DirListing, EntryStream, FileRead, FileSink, MkFile, Saved};
pub use types::{Attr, EntryKind};
pub use vfs::Vfs;
