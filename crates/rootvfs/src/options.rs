//! Per-call options.
//!
//! Every operation takes its own options type. All of them carry
//! `already_rooted`, which marks the path argument as a real absolute path
//! rather than a virtual one.

use std::fmt;

use crate::backends::BoxReader;
use crate::error::{VfsError, VfsResult};

/// Options for operations that take nothing beyond the path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// The path is already real and absolute; skip virtual→real mapping.
    pub already_rooted: bool,
}

impl ResolveOptions {
    /// Options for a path that is already real and absolute.
    pub fn rooted() -> Self {
        Self {
            already_rooted: true,
        }
    }
}

/// Inclusive byte range for partial reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive); `None` reads to end of file.
    pub end: Option<u64>,
}

impl ByteRange {
    /// Range from `start` to end of file.
    pub fn from_offset(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Range `start..=end`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }
}

/// Options for `readfile`.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub already_rooted: bool,
    /// Skip the body when the current etag equals this one.
    pub if_none_match: Option<String>,
    /// Only stream this part of the file.
    pub range: Option<ByteRange>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_if_none_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// Options for `readdir`.
#[derive(Debug, Clone, Default)]
pub struct ReaddirOptions {
    pub already_rooted: bool,
    /// Skip the listing when the directory etag equals this one.
    pub if_none_match: Option<String>,
}

/// Options for `mkfile`.
#[derive(Default)]
pub struct MkfileOptions {
    pub already_rooted: bool,
    /// Data to drain into the file. Without one, `mkfile` hands back a sink.
    pub source: Option<BoxReader>,
}

impl MkfileOptions {
    /// Write the file from `source`.
    pub fn with_source(source: BoxReader) -> Self {
        Self {
            already_rooted: false,
            source: Some(source),
        }
    }
}

impl fmt::Debug for MkfileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MkfileOptions")
            .field("already_rooted", &self.already_rooted)
            .field("source", &self.source.as_ref().map(|_| "<reader>"))
            .finish()
    }
}

/// Options for `rmdir`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmdirOptions {
    pub already_rooted: bool,
    /// Remove a non-empty directory and everything below it.
    pub recursive: bool,
}

/// Options for `rename` and `copy`.
///
/// Exactly one of `to` and `from` must be set. The path passed alongside
/// plays the other role.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    pub already_rooted: bool,
    /// Destination; the call's path is the source.
    pub to: Option<String>,
    /// Source; the call's path is the destination.
    pub from: Option<String>,
}

impl TransferOptions {
    /// Move or copy the call's path to `dest`.
    pub fn to_path(dest: impl Into<String>) -> Self {
        Self {
            to: Some(dest.into()),
            ..Default::default()
        }
    }

    /// Move or copy `source` onto the call's path.
    pub fn from_path(source: impl Into<String>) -> Self {
        Self {
            from: Some(source.into()),
            ..Default::default()
        }
    }

    /// Split into `(source, destination)` given the call's own path.
    pub fn endpoints(&self, path: &str) -> VfsResult<(String, String)> {
        match (&self.to, &self.from) {
            (Some(to), None) => Ok((path.to_string(), to.clone())),
            (None, Some(from)) => Ok((from.clone(), path.to_string())),
            (Some(_), Some(_)) => Err(VfsError::invalid_options(
                "exactly one of `to` or `from` may be given, not both",
            )),
            (None, None) => Err(VfsError::invalid_options(
                "one of `to` or `from` is required",
            )),
        }
    }
}

/// Options for `symlink`.
#[derive(Debug, Clone, Default)]
pub struct SymlinkOptions {
    pub already_rooted: bool,
    /// Link content, recorded verbatim. May be relative to the link's
    /// directory.
    pub target: String,
}

impl SymlinkOptions {
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            already_rooted: false,
            target: target.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_endpoints_to() {
        let (src, dst) = TransferOptions::to_path("/end.txt").endpoints("/start.txt").unwrap();
        assert_eq!(src, "/start.txt");
        assert_eq!(dst, "/end.txt");
    }

    #[test]
    fn test_endpoints_from() {
        let (src, dst) = TransferOptions::from_path("/start.txt").endpoints("/end.txt").unwrap();
        assert_eq!(src, "/start.txt");
        assert_eq!(dst, "/end.txt");
    }

    #[test]
    fn test_endpoints_rejects_both_and_neither() {
        let both = TransferOptions {
            to: Some("/a".into()),
            from: Some("/b".into()),
            ..Default::default()
        };
        assert_eq!(both.endpoints("/c").unwrap_err().code(), ErrorCode::Invalid);
        assert_eq!(
            TransferOptions::default().endpoints("/c").unwrap_err().code(),
            ErrorCode::Invalid
        );
    }

    #[test]
    fn test_read_options_builder() {
        let opts = ReadOptions::new()
            .with_if_none_match("\"abc\"")
            .with_range(ByteRange::new(0, 9));
        assert_eq!(opts.if_none_match.as_deref(), Some("\"abc\""));
        assert_eq!(opts.range, Some(ByteRange { start: 0, end: Some(9) }));
    }
}
