//! Result descriptors and the metadata provider.

use serde::Serialize;
use std::path::PathBuf;

use crate::backends::Backend;
use crate::error::{IoResultExt, VfsResult};
use crate::mime::{self, MimeLookup};
use crate::path::base_name;
use crate::resolve::ResolvedPath;
use crate::types::{Attr, EntryKind};

/// Descriptor returned by successful operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    /// Final path segment.
    pub name: String,
    /// Virtual path.
    pub path: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes. Directories report 0. A symlink reports its target's
    /// size when the target was followed (`stat`, `symlink`), else 0, as
    /// in directory listings.
    pub size: u64,
    /// Modification time, milliseconds since the Unix epoch.
    pub mtime: u64,
    /// MIME type inferred from the extension.
    pub mime: String,
    /// Change fingerprint.
    pub etag: String,
    /// Raw target of a symlink.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<PathBuf>,
}

/// Fingerprint derived from size and modification time.
///
/// Directories get a weak tag: their size says little about their content.
pub fn etag(attr: &Attr) -> String {
    let tag = format!("\"{:x}-{:x}\"", attr.size, attr.mtime_millis());
    if attr.is_file() {
        tag
    } else {
        format!("W/{tag}")
    }
}

impl Meta {
    /// Build a descriptor for `vpath` from raw attributes.
    pub fn from_attr(vpath: &str, attr: &Attr, mime: &dyn MimeLookup) -> Self {
        let mime = match attr.kind {
            EntryKind::File => mime.mime_for(vpath),
            EntryKind::Directory => mime::DIRECTORY.to_string(),
            EntryKind::Symlink => mime::SYMLINK.to_string(),
        };
        Self {
            name: base_name(vpath),
            path: vpath.to_string(),
            kind: attr.kind,
            size: if attr.is_file() { attr.size } else { 0 },
            mtime: attr.mtime_millis(),
            mime,
            etag: etag(attr),
            link: None,
        }
    }

    /// Returns true if this describes a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Returns true if this describes a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }
}

/// Describe a resolved path as it stands now.
///
/// A final symlink is reported as a link carrying its raw target. Its size
/// and MIME come from `followed` when the caller could resolve the target
/// inside the root.
pub(crate) async fn describe(
    backend: &dyn Backend,
    mime: &dyn MimeLookup,
    resolved: &ResolvedPath,
    followed: Option<&ResolvedPath>,
) -> VfsResult<Meta> {
    let attr = backend.lstat(&resolved.real).await.at(&resolved.vpath)?;
    let mut meta = Meta::from_attr(&resolved.vpath, &attr, mime);

    if attr.is_symlink() {
        let target = backend.read_link(&resolved.real).await.at(&resolved.vpath)?;
        if let Some(followed) = followed {
            if let Ok(target_attr) = backend.stat(&followed.real).await {
                meta.size = if target_attr.is_dir() { 0 } else { target_attr.size };
                meta.mime = match target_attr.kind {
                    EntryKind::Directory => mime::DIRECTORY.to_string(),
                    _ => mime.mime_for(&target.to_string_lossy()),
                };
            }
        }
        meta.link = Some(target);
    }

    Ok(meta)
}
