//! MIME lookup by file extension.

use std::fmt;

/// MIME reported for files with no known extension.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// MIME reported for directories.
pub const DIRECTORY: &str = "inode/directory";

/// MIME reported for symlinks that cannot be followed.
pub const SYMLINK: &str = "inode/symlink";

/// Maps a path's extension to a MIME type.
pub trait MimeLookup: Send + Sync + fmt::Debug {
    /// MIME type for `path`, or [`OCTET_STREAM`] when unknown.
    fn mime_for(&self, path: &str) -> String;
}

/// Table-backed lookup using the `mime_guess` extension database.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionMime;

impl MimeLookup for ExtensionMime {
    fn mime_for(&self, path: &str) -> String {
        let name = path.rsplit('/').next().unwrap_or(path);
        let Some((stem, ext)) = name.rsplit_once('.') else {
            return OCTET_STREAM.to_string();
        };
        // Dotfiles like `.bashrc` have no extension.
        if stem.is_empty() {
            return OCTET_STREAM.to_string();
        }
        mime_guess::from_ext(ext)
            .first_raw()
            .unwrap_or(OCTET_STREAM)
            .to_string()
    }
}
