//! Root configuration.
//!
//! A [`RootConfig`] is built once, handed to [`Vfs::new`](crate::Vfs::new)
//! and never mutated afterwards. It can be assembled in code or parsed
//! from TOML:
//!
//! ```toml
//! root = "/srv/workspace"
//! check_symlinks = true
//! max_symlink_hops = 40
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{VfsError, VfsResult};

/// Default symlink hop budget, matching Linux `MAXSYMLINKS`.
pub const DEFAULT_MAX_SYMLINK_HOPS: usize = 40;

/// Default chunk size for file read streams.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Default capacity of the in-memory pipe behind a mkfile sink.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Immutable configuration for a rooted VFS.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Real directory every virtual path is confined to.
    pub root: PathBuf,

    /// Re-validate containment after every symlink hop.
    pub check_symlinks: bool,

    /// Maximum symlink hops during one resolution.
    pub max_symlink_hops: usize,

    /// Chunk size for readfile streams.
    pub read_chunk_size: usize,

    /// Bytes a mkfile sink buffers before applying backpressure.
    pub write_buffer_size: usize,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            check_symlinks: true,
            max_symlink_hops: DEFAULT_MAX_SYMLINK_HOPS,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }
}

impl RootConfig {
    /// Create a configuration rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Enable or disable symlink re-validation.
    pub fn with_check_symlinks(mut self, check: bool) -> Self {
        self.check_symlinks = check;
        self
    }

    /// Set the symlink hop budget.
    pub fn with_max_symlink_hops(mut self, hops: usize) -> Self {
        self.max_symlink_hops = hops;
        self
    }

    /// Set the read stream chunk size.
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Set the mkfile sink buffer size.
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> VfsResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| VfsError::invalid_options(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VfsError::from_io(e, path.display().to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would make the VFS unusable.
    pub fn validate(&self) -> VfsResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(VfsError::invalid_options("root must not be empty"));
        }
        if self.read_chunk_size == 0 || self.write_buffer_size == 0 {
            return Err(VfsError::invalid_options("buffer sizes must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_defaults() {
        let config = RootConfig::new("/srv");
        assert_eq!(config.root, PathBuf::from("/srv"));
        assert!(config.check_symlinks);
        assert_eq!(config.max_symlink_hops, DEFAULT_MAX_SYMLINK_HOPS);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = RootConfig::from_toml_str(
            r#"
            root = "/srv/data"
            check_symlinks = false
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/data"));
        assert!(!config.check_symlinks);
        assert_eq!(config.read_chunk_size, DEFAULT_READ_CHUNK_SIZE);
    }

    #[test]
    fn test_from_toml_rejects_zero_buffer() {
        let err = RootConfig::from_toml_str("root = \"/x\"\nwrite_buffer_size = 0").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Invalid);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = RootConfig::from_toml_str("root = [").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Invalid);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RootConfig::load("/definitely/not/here.toml").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
