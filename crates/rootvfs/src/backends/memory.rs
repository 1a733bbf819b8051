//! In-memory filesystem backend.
//!
//! Used for ephemeral roots and testing. All data is lost when dropped.
//! Symlinks are stored verbatim and followed on lookup the way a POSIX
//! filesystem follows them, including in intermediate components.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::io::AsyncReadExt;

use super::{Backend, BoxReader, RawEntryStream};
use crate::config::DEFAULT_MAX_SYMLINK_HOPS;
use crate::path::clean;
use crate::types::{Attr, EntryKind, RawDirEntry};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: Attr },
    Directory { attr: Attr },
    Symlink { target: PathBuf, attr: Attr },
}

impl Entry {
    fn attr(&self) -> &Attr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
            Entry::Symlink { attr, .. } => attr,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }
}

type Entries = HashMap<PathBuf, Entry>;

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. Paths are absolute; `/` always exists.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<Entries>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn err(kind: io::ErrorKind, path: &Path) -> io::Error {
    io::Error::new(kind, path.display().to_string())
}

#[cfg(unix)]
fn loop_error(_path: &Path) -> io::Error {
    // Keep the raw errno so the normalizer can classify it.
    io::Error::from_raw_os_error(rustix::io::Errno::LOOP.raw_os_error())
}

#[cfg(not(unix))]
fn loop_error(path: &Path) -> io::Error {
    io::Error::other(format!("too many symbolic links: {}", path.display()))
}

fn normal_components(path: &Path) -> VecDeque<OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_os_string()),
            _ => None,
        })
        .collect()
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::from("/"),
            Entry::Directory {
                attr: Attr::new(EntryKind::Directory, 0),
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Create a directory and any missing parents. Seeding helper.
    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut entries = self.entries.write();
        let mut current = PathBuf::from("/");
        for name in normal_components(&clean(path.as_ref())) {
            current.push(name);
            match entries.get(&current) {
                Some(entry) if entry.is_dir() => {}
                Some(_) => return Err(err(io::ErrorKind::NotADirectory, &current)),
                None => {
                    entries.insert(
                        current.clone(),
                        Entry::Directory {
                            attr: Attr::new(EntryKind::Directory, 0),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Write a file, creating missing parents. Seeding helper.
    pub fn insert_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> io::Result<()> {
        let path = clean(path.as_ref());
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        let data = data.into();
        let attr = Attr::new(EntryKind::File, data.len() as u64);
        self.entries.write().insert(path, Entry::File { data, attr });
        Ok(())
    }

    /// Follow symlinks along `path` and return the entry key it lands on.
    ///
    /// Intermediate symlinks are always followed; the final one only when
    /// `follow_final` is set. A missing final component is not an error, so
    /// creation primitives can use the returned key.
    fn lookup(entries: &Entries, path: &Path, follow_final: bool) -> io::Result<PathBuf> {
        let mut pending = normal_components(&clean(path));
        let mut current = PathBuf::from("/");
        let mut hops = 0;

        while let Some(name) = pending.pop_front() {
            let next = current.join(&name);
            let is_last = pending.is_empty();
            match entries.get(&next) {
                None if is_last => return Ok(next),
                None => return Err(err(io::ErrorKind::NotFound, &next)),
                Some(Entry::Symlink { target, .. }) if !is_last || follow_final => {
                    hops += 1;
                    if hops > DEFAULT_MAX_SYMLINK_HOPS {
                        return Err(loop_error(path));
                    }
                    let mut rest = normal_components(&clean(&current.join(target)));
                    rest.extend(pending);
                    pending = rest;
                    current = PathBuf::from("/");
                }
                Some(Entry::File { .. }) if !is_last => {
                    return Err(err(io::ErrorKind::NotADirectory, &next));
                }
                Some(_) => current = next,
            }
        }
        Ok(current)
    }

    /// Require the parent of `key` to be an existing directory.
    fn check_parent(entries: &Entries, key: &Path) -> io::Result<()> {
        let Some(parent) = key.parent() else {
            return Ok(());
        };
        match entries.get(parent) {
            Some(entry) if entry.is_dir() => Ok(()),
            Some(_) => Err(err(io::ErrorKind::NotADirectory, parent)),
            None => Err(err(io::ErrorKind::NotFound, parent)),
        }
    }

    fn touch_parent(entries: &mut Entries, key: &Path) {
        if let Some(Entry::Directory { attr }) = key.parent().and_then(|p| entries.get_mut(p)) {
            attr.mtime = SystemTime::now();
        }
    }

    fn has_children(entries: &Entries, key: &Path) -> bool {
        entries.keys().any(|k| k.parent() == Some(key))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let entries = self.entries.read();
        let key = Self::lookup(&entries, path, true)?;
        if entries.contains_key(&key) {
            Ok(key)
        } else {
            Err(err(io::ErrorKind::NotFound, path))
        }
    }

    async fn lstat(&self, path: &Path) -> io::Result<Attr> {
        let entries = self.entries.read();
        let key = Self::lookup(&entries, path, false)?;
        entries
            .get(&key)
            .map(|e| e.attr().clone())
            .ok_or_else(|| err(io::ErrorKind::NotFound, path))
    }

    async fn stat(&self, path: &Path) -> io::Result<Attr> {
        let entries = self.entries.read();
        let key = Self::lookup(&entries, path, true)?;
        entries
            .get(&key)
            .map(|e| e.attr().clone())
            .ok_or_else(|| err(io::ErrorKind::NotFound, path))
    }

    async fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let entries = self.entries.read();
        let key = Self::lookup(&entries, path, false)?;
        match entries.get(&key) {
            Some(Entry::Symlink { target, .. }) => Ok(target.clone()),
            Some(_) => Err(err(io::ErrorKind::InvalidInput, path)),
            None => Err(err(io::ErrorKind::NotFound, path)),
        }
    }

    async fn open_read(&self, path: &Path, offset: u64) -> io::Result<BoxReader> {
        let entries = self.entries.read();
        let key = Self::lookup(&entries, path, true)?;
        match entries.get(&key) {
            Some(Entry::File { data, .. }) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                Ok(Box::new(Cursor::new(data[start..].to_vec())))
            }
            Some(_) => Err(err(io::ErrorKind::IsADirectory, path)),
            None => Err(err(io::ErrorKind::NotFound, path)),
        }
    }

    async fn write_from(&self, path: &Path, mut reader: BoxReader) -> io::Result<u64> {
        {
            let entries = self.entries.read();
            let key = Self::lookup(&entries, path, true)?;
            Self::check_parent(&entries, &key)?;
            if entries.get(&key).is_some_and(Entry::is_dir) {
                return Err(err(io::ErrorKind::IsADirectory, path));
            }
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let written = data.len() as u64;

        let mut entries = self.entries.write();
        // Re-resolve: the tree may have changed while the reader drained.
        let key = Self::lookup(&entries, path, true)?;
        Self::check_parent(&entries, &key)?;
        if entries.get(&key).is_some_and(Entry::is_dir) {
            return Err(err(io::ErrorKind::IsADirectory, path));
        }
        let attr = Attr::new(EntryKind::File, written);
        entries.insert(key.clone(), Entry::File { data, attr });
        Self::touch_parent(&mut entries, &key);
        Ok(written)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<RawEntryStream> {
        let entries = self.entries.read();
        let key = Self::lookup(&entries, path, true)?;

        match entries.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(err(io::ErrorKind::NotADirectory, path)),
            None => return Err(err(io::ErrorKind::NotFound, path)),
        }

        let mut children: Vec<RawDirEntry> = entries
            .iter()
            .filter(|(k, _)| k.parent() == Some(key.as_path()))
            .filter_map(|(k, entry)| {
                Some(RawDirEntry {
                    name: k.file_name()?.to_string_lossy().into_owned(),
                    attr: entry.attr().clone(),
                })
            })
            .collect();

        // Sort for consistent ordering
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Box::pin(futures::stream::iter(children.into_iter().map(Ok))))
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut entries = self.entries.write();
        let key = Self::lookup(&entries, path, false)?;
        if entries.contains_key(&key) {
            return Err(err(io::ErrorKind::AlreadyExists, path));
        }
        Self::check_parent(&entries, &key)?;
        entries.insert(
            key.clone(),
            Entry::Directory {
                attr: Attr::new(EntryKind::Directory, 0),
            },
        );
        Self::touch_parent(&mut entries, &key);
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut entries = self.entries.write();
        let key = Self::lookup(&entries, path, false)?;
        match entries.get(&key) {
            Some(Entry::Directory { .. }) => Err(err(io::ErrorKind::IsADirectory, path)),
            Some(_) => {
                entries.remove(&key);
                Self::touch_parent(&mut entries, &key);
                Ok(())
            }
            None => Err(err(io::ErrorKind::NotFound, path)),
        }
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut entries = self.entries.write();
        let key = Self::lookup(&entries, path, false)?;

        if key == Path::new("/") {
            return Err(err(io::ErrorKind::PermissionDenied, path));
        }

        match entries.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(err(io::ErrorKind::NotADirectory, path)),
            None => return Err(err(io::ErrorKind::NotFound, path)),
        }

        if Self::has_children(&entries, &key) {
            return Err(err(io::ErrorKind::DirectoryNotEmpty, path));
        }

        entries.remove(&key);
        Self::touch_parent(&mut entries, &key);
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut entries = self.entries.write();
        let key = Self::lookup(&entries, path, false)?;

        if key == Path::new("/") {
            return Err(err(io::ErrorKind::PermissionDenied, path));
        }

        match entries.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(err(io::ErrorKind::NotADirectory, path)),
            None => return Err(err(io::ErrorKind::NotFound, path)),
        }

        entries.retain(|k, _| !k.starts_with(&key));
        Self::touch_parent(&mut entries, &key);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut entries = self.entries.write();
        let from_key = Self::lookup(&entries, from, false)?;
        let to_key = Self::lookup(&entries, to, false)?;

        let Some(source) = entries.get(&from_key) else {
            return Err(err(io::ErrorKind::NotFound, from));
        };
        if from_key == to_key {
            return Ok(());
        }
        Self::check_parent(&entries, &to_key)?;

        let source_is_dir = source.is_dir();
        if source_is_dir && to_key.starts_with(&from_key) {
            return Err(err(io::ErrorKind::InvalidInput, to));
        }

        match entries.get(&to_key) {
            Some(Entry::Directory { .. }) if !source_is_dir => {
                return Err(err(io::ErrorKind::IsADirectory, to));
            }
            Some(Entry::Directory { .. }) if Self::has_children(&entries, &to_key) => {
                return Err(err(io::ErrorKind::DirectoryNotEmpty, to));
            }
            Some(Entry::File { .. } | Entry::Symlink { .. }) if source_is_dir => {
                return Err(err(io::ErrorKind::NotADirectory, to));
            }
            _ => {}
        }

        // Move the entry and, for directories, its whole subtree.
        let moved: Vec<PathBuf> = entries
            .keys()
            .filter(|k| k.starts_with(&from_key))
            .cloned()
            .collect();
        entries.remove(&to_key);
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let relative = old.strip_prefix(&from_key).unwrap_or(Path::new(""));
                let new_key = if relative.as_os_str().is_empty() {
                    to_key.clone()
                } else {
                    to_key.join(relative)
                };
                entries.insert(new_key, entry);
            }
        }

        Self::touch_parent(&mut entries, &from_key);
        Self::touch_parent(&mut entries, &to_key);
        Ok(())
    }

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let mut entries = self.entries.write();
        let key = Self::lookup(&entries, link, false)?;
        if entries.contains_key(&key) {
            return Err(err(io::ErrorKind::AlreadyExists, link));
        }
        Self::check_parent(&entries, &key)?;

        let attr = Attr::new(EntryKind::Symlink, target.as_os_str().len() as u64);
        entries.insert(
            key.clone(),
            Entry::Symlink {
                target: target.to_path_buf(),
                attr,
            },
        );
        Self::touch_parent(&mut entries, &key);
        Ok(())
    }
}
