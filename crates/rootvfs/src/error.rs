//! VFS error types and the error normalizer.
//!
//! Every failure the VFS reports carries one [`ErrorCode`] from a small,
//! fixed vocabulary. Raw backend errors only enter through
//! [`VfsError::from_io`], so operation code never inspects `io::Error`
//! shapes itself.

use std::io;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Stable error code callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, IntoStaticStr)]
pub enum ErrorCode {
    /// Target (or a required source) does not exist.
    #[strum(serialize = "ENOENT")]
    NotFound,
    /// A file was required but a directory was found.
    #[strum(serialize = "EISDIR")]
    IsADirectory,
    /// A directory was required but a file was found.
    #[strum(serialize = "ENOTDIR")]
    NotADirectory,
    /// Creation target already exists.
    #[strum(serialize = "EEXIST")]
    AlreadyExists,
    /// Path escapes the root, or the backing filesystem denied access.
    #[strum(serialize = "EACCESS")]
    Access,
    /// Directory is not empty.
    #[strum(serialize = "ENOTEMPTY")]
    NotEmpty,
    /// Too many symlink hops while resolving.
    #[strum(serialize = "ELOOP")]
    Loop,
    /// Malformed call options.
    #[strum(serialize = "EINVAL")]
    Invalid,
    /// Anything else the backend reported.
    #[strum(serialize = "EIO")]
    Io,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Path escapes root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Permission denied by the backing filesystem.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Symlink hop limit exceeded.
    #[error("too many symbolic links: {0}")]
    TooManySymlinks(String),

    /// Call options are malformed.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Unclassified backend failure, original detail preserved.
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a TooManySymlinks error.
    pub fn too_many_symlinks(path: impl Into<String>) -> Self {
        Self::TooManySymlinks(path.into())
    }

    /// Create an InvalidOptions error.
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Normalize a raw backend error raised while operating on `path`.
    ///
    /// `path` should be the virtual path so messages never leak the real
    /// location of the root.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path),
            io::ErrorKind::IsADirectory => Self::IsADirectory(path),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            io::ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty(path),
            _ => Self::from_errno(err, path),
        }
    }

    #[cfg(unix)]
    fn from_errno(err: io::Error, path: String) -> Self {
        use rustix::io::Errno;

        match Errno::from_io_error(&err) {
            Some(Errno::LOOP) => Self::TooManySymlinks(path),
            Some(Errno::NOTEMPTY) => Self::DirectoryNotEmpty(path),
            Some(Errno::NOTDIR) => Self::NotADirectory(path),
            Some(Errno::ISDIR) => Self::IsADirectory(path),
            _ => Self::Io { path, source: err },
        }
    }

    #[cfg(not(unix))]
    fn from_errno(err: io::Error, path: String) -> Self {
        Self::Io { path, source: err }
    }

    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::IsADirectory(_) => ErrorCode::IsADirectory,
            Self::NotADirectory(_) => ErrorCode::NotADirectory,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::PathEscapesRoot(_) | Self::PermissionDenied(_) => ErrorCode::Access,
            Self::DirectoryNotEmpty(_) => ErrorCode::NotEmpty,
            Self::TooManySymlinks(_) => ErrorCode::Loop,
            Self::InvalidOptions(_) => ErrorCode::Invalid,
            Self::Io { .. } | Self::Other(_) => ErrorCode::Io,
        }
    }

    /// The offending virtual path, when the error is tied to one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound(p)
            | Self::IsADirectory(p)
            | Self::NotADirectory(p)
            | Self::AlreadyExists(p)
            | Self::PathEscapesRoot(p)
            | Self::PermissionDenied(p)
            | Self::DirectoryNotEmpty(p)
            | Self::TooManySymlinks(p) => Some(p),
            Self::Io { path, .. } => Some(path),
            Self::InvalidOptions(_) | Self::Other(_) => None,
        }
    }
}

/// Attach a virtual path to raw backend results.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &str) -> VfsResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &str) -> VfsResult<T> {
        self.map_err(|e| VfsError::from_io(e, path))
    }
}

/// Hand a VFS failure to code that only speaks `io::Error`.
///
/// Unclassified backend errors come back as they were raised.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let kind = match e.code() {
            ErrorCode::NotFound => io::ErrorKind::NotFound,
            ErrorCode::IsADirectory => io::ErrorKind::IsADirectory,
            ErrorCode::NotADirectory => io::ErrorKind::NotADirectory,
            ErrorCode::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorCode::Access => io::ErrorKind::PermissionDenied,
            ErrorCode::NotEmpty => io::ErrorKind::DirectoryNotEmpty,
            ErrorCode::Invalid => io::ErrorKind::InvalidInput,
            ErrorCode::Loop | ErrorCode::Io => io::ErrorKind::Other,
        };
        match e {
            VfsError::Io { source, .. } => source,
            e => io::Error::new(kind, e),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_codes_render_as_errno_names() {
        assert_eq!(ErrorCode::NotFound.as_ref(), "ENOENT");
        assert_eq!(ErrorCode::Access.to_string(), "EACCESS");
        assert_eq!(ErrorCode::from_str("ENOTDIR").unwrap(), ErrorCode::NotADirectory);
    }

    #[test]
    fn test_from_io_kinds() {
        let cases = [
            (io::ErrorKind::NotFound, ErrorCode::NotFound),
            (io::ErrorKind::AlreadyExists, ErrorCode::AlreadyExists),
            (io::ErrorKind::IsADirectory, ErrorCode::IsADirectory),
            (io::ErrorKind::NotADirectory, ErrorCode::NotADirectory),
            (io::ErrorKind::PermissionDenied, ErrorCode::Access),
            (io::ErrorKind::DirectoryNotEmpty, ErrorCode::NotEmpty),
        ];
        for (kind, code) in cases {
            let err = VfsError::from_io(io::Error::from(kind), "/x");
            assert_eq!(err.code(), code, "{kind:?}");
            assert_eq!(err.path(), Some("/x"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_from_io_errno_fallback() {
        let raw = io::Error::from_raw_os_error(rustix::io::Errno::LOOP.raw_os_error());
        assert_eq!(VfsError::from_io(raw, "/loop").code(), ErrorCode::Loop);
    }

    #[test]
    fn test_unclassified_passes_through() {
        let err = VfsError::from_io(io::Error::other("disk on fire"), "/f");
        assert_eq!(err.code(), ErrorCode::Io);
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_into_io_error() {
        let io_err: io::Error = VfsError::path_escapes_root("/../etc").into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
        assert!(io_err.to_string().contains("/../etc"));

        let raw = io::Error::other("disk on fire");
        let io_err: io::Error = VfsError::from_io(raw, "/f").into();
        assert_eq!(io_err.to_string(), "disk on fire");
    }
}
