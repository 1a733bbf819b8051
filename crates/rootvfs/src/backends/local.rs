//! Local filesystem backend.
//!
//! Thin async wrapper over `tokio::fs`. It performs no containment checks of
//! its own; the resolver hands it only paths already proven to be under the
//! root.

use async_trait::async_trait;
use futures::StreamExt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use super::{Backend, BoxReader, RawEntryStream};
use crate::types::{Attr, RawDirEntry};

/// Backend over the host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBackend;

impl LocalBackend {
    /// Create a new local backend.
    pub fn new() -> Self {
        Self
    }

    /// Next listed child, skipping entries removed since the listing began.
    ///
    /// Names that are not valid UTF-8 are skipped as well: no virtual path
    /// could address them afterwards.
    async fn next_entry(dir: &mut fs::ReadDir) -> io::Result<Option<RawDirEntry>> {
        while let Some(entry) = dir.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!(name = ?raw, "skipping entry with non-UTF-8 name");
                    continue;
                }
            };
            // DirEntry::metadata does not follow symlinks on unix
            match entry.metadata().await {
                Ok(meta) => {
                    return Ok(Some(RawDirEntry {
                        name,
                        attr: Attr::from_metadata(&meta),
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        // dunce keeps Windows paths free of the \\?\ prefix
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || dunce::canonicalize(path))
            .await
            .map_err(io::Error::other)?
    }

    async fn lstat(&self, path: &Path) -> io::Result<Attr> {
        let meta = fs::symlink_metadata(path).await?;
        Ok(Attr::from_metadata(&meta))
    }

    async fn stat(&self, path: &Path) -> io::Result<Attr> {
        let meta = fs::metadata(path).await?;
        Ok(Attr::from_metadata(&meta))
    }

    async fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path).await
    }

    async fn open_read(&self, path: &Path, offset: u64) -> io::Result<BoxReader> {
        let mut file = fs::File::open(path).await?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(Box::new(file))
    }

    async fn write_from(&self, path: &Path, mut reader: BoxReader) -> io::Result<u64> {
        let mut file = fs::File::create(path).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<RawEntryStream> {
        let dir = fs::read_dir(path).await?;

        let stream = futures::stream::try_unfold(dir, |mut dir| async move {
            Self::next_entry(&mut dir)
                .await
                .map(|entry| entry.map(|entry| (entry, dir)))
        });

        Ok(stream.boxed())
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    #[cfg(unix)]
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        fs::symlink(target, link).await
    }

    #[cfg(windows)]
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        fs::symlink_file(target, link).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        (LocalBackend::new(), dir)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (backend, dir) = setup();
        let path = dir.path().join("test.txt");

        let n = backend
            .write_from(&path, Box::new(&b"hello world"[..]))
            .await
            .unwrap();
        assert_eq!(n, 11);

        let mut reader = backend.open_read(&path, 6).await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "world");
    }

    #[tokio::test]
    async fn test_write_truncates() {
        let (backend, dir) = setup();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, "a much longer original body").unwrap();

        backend.write_from(&path, Box::new(&b"short"[..])).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "short");
    }

    #[tokio::test]
    async fn test_read_dir_reports_kinds() {
        let (backend, dir) = setup();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::fs::write(dir.path().join("root.txt"), "x").unwrap();

        let mut entries: Vec<RawDirEntry> =
            backend.read_dir(dir.path()).await.unwrap().try_collect().await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "root.txt");
        assert!(entries[0].attr.is_file());
        assert_eq!(entries[0].attr.size, 1);
        assert!(entries[1].attr.is_dir());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_read_dir_skips_non_utf8_names() {
        use std::os::unix::ffi::OsStrExt;

        let (backend, dir) = setup();
        std::fs::write(dir.path().join(std::ffi::OsStr::from_bytes(b"bad\xff.txt")), "x").unwrap();
        std::fs::write(dir.path().join("good.txt"), "y").unwrap();

        let entries: Vec<RawDirEntry> =
            backend.read_dir(dir.path()).await.unwrap().try_collect().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "good.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_lstat_vs_stat() {
        let (backend, dir) = setup();
        let target = dir.path().join("target.txt");
        let link = dir.path().join("link.txt");
        std::fs::write(&target, "content").unwrap();

        backend.symlink(Path::new("target.txt"), &link).await.unwrap();

        assert!(backend.lstat(&link).await.unwrap().is_symlink());
        assert_eq!(backend.stat(&link).await.unwrap().size, 7);
        assert_eq!(backend.read_link(&link).await.unwrap(), Path::new("target.txt"));
    }

    #[tokio::test]
    async fn test_create_dir_is_not_recursive() {
        let (backend, dir) = setup();
        let err = backend.create_dir(&dir.path().join("a/b")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_canonicalize() {
        let (backend, dir) = setup();
        let canonical = backend.canonicalize(dir.path()).await.unwrap();
        assert!(canonical.is_absolute());
        assert!(backend.canonicalize(&dir.path().join("missing")).await.is_err());
    }
}
