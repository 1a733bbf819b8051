//! The rooted filesystem facade.
//!
//! [`Vfs`] is what callers hold. Every operation takes a virtual path plus
//! its own options struct, resolves the path under the root first, and only
//! then touches the backend. Failures come back as [`VfsError`] values with
//! a stable [`ErrorCode`](crate::ErrorCode).

use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;

use crate::backends::{Backend, BoxReader, LocalBackend};
use crate::config::RootConfig;
use crate::error::{IoResultExt, VfsError, VfsResult};
use crate::meta::{self, Meta};
use crate::mime::{ExtensionMime, MimeLookup};
use crate::options::{
    MkfileOptions, ReadOptions, ReaddirOptions, ResolveOptions, RmdirOptions, SymlinkOptions,
    TransferOptions,
};
use crate::path::join_virtual;
use crate::resolve::{Lookup, ResolvedPath, Resolver};
use crate::stream::{ContentRange, DirListing, FileRead, FileSink, MkFile};

/// A filesystem confined to one root directory.
///
/// Cheap to clone; clones share the backend and configuration.
#[derive(Debug, Clone)]
pub struct Vfs {
    resolver: Resolver,
    backend: Arc<dyn Backend>,
    mime: Arc<dyn MimeLookup>,
    read_chunk_size: usize,
    write_buffer_size: usize,
}

impl Vfs {
    /// Build a VFS over `backend`.
    ///
    /// The configured root is canonicalized once here. A root that is
    /// missing or not a directory is an error.
    pub async fn new(config: RootConfig, backend: Arc<dyn Backend>) -> VfsResult<Self> {
        config.validate()?;
        let shown = config.root.display().to_string();
        let root = backend.canonicalize(&config.root).await.at(&shown)?;
        let attr = backend.stat(&root).await.at(&shown)?;
        if !attr.is_dir() {
            return Err(VfsError::not_a_directory(shown));
        }

        tracing::debug!(root = %root.display(), check_symlinks = config.check_symlinks, "vfs ready");

        Ok(Self {
            resolver: Resolver::new(
                root,
                config.check_symlinks,
                config.max_symlink_hops,
                backend.clone(),
            )
            .with_alias(&config.root),
            backend,
            mime: Arc::new(ExtensionMime),
            read_chunk_size: config.read_chunk_size,
            write_buffer_size: config.write_buffer_size,
        })
    }

    /// Build a VFS over the local disk.
    pub async fn local(config: RootConfig) -> VfsResult<Self> {
        Self::new(config, Arc::new(LocalBackend::new())).await
    }

    /// Replace the MIME lookup.
    pub fn with_mime(mut self, mime: Arc<dyn MimeLookup>) -> Self {
        self.mime = mime;
        self
    }

    /// Canonical real root.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    async fn describe(&self, resolved: &ResolvedPath) -> VfsResult<Meta> {
        meta::describe(self.backend.as_ref(), self.mime.as_ref(), resolved, None).await
    }

    /// Describe `resolved`, following a final symlink for size and MIME
    /// when the target resolves inside the root.
    async fn describe_link(
        &self,
        path: &str,
        already_rooted: bool,
        resolved: &ResolvedPath,
    ) -> VfsResult<Meta> {
        let is_link = self
            .backend
            .lstat(&resolved.real)
            .await
            .is_ok_and(|attr| attr.is_symlink());
        let followed = if is_link {
            self.resolver
                .resolve(path, already_rooted, Lookup::STRICT)
                .await
                .ok()
        } else {
            None
        };
        meta::describe(
            self.backend.as_ref(),
            self.mime.as_ref(),
            resolved,
            followed.as_ref(),
        )
        .await
    }

    fn refuse_root(&self, resolved: &ResolvedPath) -> VfsResult<()> {
        if resolved.real == self.resolver.root() {
            tracing::warn!(vpath = %resolved.vpath, "refused to modify the root itself");
            return Err(VfsError::PermissionDenied(resolved.vpath.clone()));
        }
        Ok(())
    }

    /// Map a path onto the root. The target must exist.
    #[tracing::instrument(skip(self, options), name = "vfs.resolve")]
    pub async fn resolve(&self, path: &str, options: ResolveOptions) -> VfsResult<ResolvedPath> {
        self.resolver
            .resolve(path, options.already_rooted, Lookup::STRICT)
            .await
    }

    /// Describe an entry. A final symlink is described as a link.
    #[tracing::instrument(skip(self, options), name = "vfs.stat")]
    pub async fn stat(&self, path: &str, options: ResolveOptions) -> VfsResult<Meta> {
        let resolved = self
            .resolver
            .resolve(path, options.already_rooted, Lookup::STRICT.no_follow())
            .await?;
        self.describe_link(path, options.already_rooted, &resolved)
            .await
    }

    /// Open a file for streaming.
    #[tracing::instrument(skip(self, options), name = "vfs.readfile")]
    pub async fn readfile(&self, path: &str, options: ReadOptions) -> VfsResult<FileRead> {
        let resolved = self
            .resolver
            .resolve(path, options.already_rooted, Lookup::STRICT)
            .await?;
        let attr = self.backend.stat(&resolved.real).await.at(&resolved.vpath)?;
        if attr.is_dir() {
            return Err(VfsError::is_a_directory(resolved.vpath));
        }
        let meta = Meta::from_attr(&resolved.vpath, &attr, self.mime.as_ref());

        if options.if_none_match.as_deref() == Some(meta.etag.as_str()) {
            return Ok(FileRead {
                meta,
                range: None,
                not_modified: true,
                stream: None,
            });
        }

        let range = match options.range {
            None => None,
            Some(range) => {
                let past_end = range.start >= attr.size;
                let inverted = range.end.is_some_and(|end| end < range.start);
                if past_end || inverted {
                    return Err(VfsError::invalid_options(format!(
                        "range {}-{} not satisfiable for {} bytes",
                        range.start,
                        range.end.map(|e| e.to_string()).unwrap_or_default(),
                        attr.size
                    )));
                }
                let last = attr.size - 1;
                Some(ContentRange {
                    start: range.start,
                    end: range.end.map_or(last, |end| end.min(last)),
                    total: attr.size,
                })
            }
        };

        let offset = range.map_or(0, |r| r.start);
        let reader = self
            .backend
            .open_read(&resolved.real, offset)
            .await
            .at(&resolved.vpath)?;
        let reader: BoxReader = match range {
            Some(r) => Box::new(reader.take(r.len())),
            None => reader,
        };

        let vpath = resolved.vpath;
        let stream = ReaderStream::with_capacity(reader, self.read_chunk_size)
            .map(move |chunk| chunk.map_err(|e| VfsError::from_io(e, vpath.as_str())))
            .boxed();

        Ok(FileRead {
            meta,
            range,
            not_modified: false,
            stream: Some(stream),
        })
    }

    /// List a directory.
    #[tracing::instrument(skip(self, options), name = "vfs.readdir")]
    pub async fn readdir(&self, path: &str, options: ReaddirOptions) -> VfsResult<DirListing> {
        let resolved = self
            .resolver
            .resolve(path, options.already_rooted, Lookup::STRICT)
            .await?;
        let attr = self.backend.stat(&resolved.real).await.at(&resolved.vpath)?;
        if !attr.is_dir() {
            return Err(VfsError::not_a_directory(resolved.vpath));
        }
        let meta = Meta::from_attr(&resolved.vpath, &attr, self.mime.as_ref());

        if options.if_none_match.as_deref() == Some(meta.etag.as_str()) {
            return Ok(DirListing {
                meta,
                not_modified: true,
                stream: None,
            });
        }

        let entries = self
            .backend
            .read_dir(&resolved.real)
            .await
            .at(&resolved.vpath)?;
        let mime = self.mime.clone();
        let dir = resolved.vpath;
        let stream = entries
            .map(move |entry| -> VfsResult<Meta> {
                let entry = entry.map_err(|e| VfsError::from_io(e, dir.as_str()))?;
                let vpath = join_virtual(&dir, &entry.name);
                Ok(Meta::from_attr(&vpath, &entry.attr, mime.as_ref()))
            })
            .boxed();

        Ok(DirListing {
            meta,
            not_modified: false,
            stream: Some(stream),
        })
    }

    /// Create or overwrite a file.
    ///
    /// With a source in `options`, the source is drained and the call
    /// returns once every byte is durable. Without one, a [`FileSink`] is
    /// returned straight away.
    #[tracing::instrument(skip(self, options), name = "vfs.mkfile")]
    pub async fn mkfile(&self, path: &str, options: MkfileOptions) -> VfsResult<MkFile> {
        let resolved = self
            .resolver
            .resolve(path, options.already_rooted, Lookup::PERMISSIVE)
            .await?;
        let occupied = self.backend.stat(&resolved.real).await;
        if occupied.is_ok_and(|attr| attr.is_dir()) {
            return Err(VfsError::is_a_directory(resolved.vpath));
        }

        if let Some(source) = options.source {
            let written = self
                .backend
                .write_from(&resolved.real, source)
                .await
                .at(&resolved.vpath)?;
            tracing::debug!(vpath = %resolved.vpath, written, "file saved");
            return Ok(MkFile::Saved(self.describe(&resolved).await?));
        }

        let (writer, reader) = tokio::io::duplex(self.write_buffer_size);
        let (tx, rx) = oneshot::channel();
        let backend = self.backend.clone();
        let mime = self.mime.clone();

        tokio::spawn(async move {
            let result = match backend.write_from(&resolved.real, Box::new(reader)).await {
                Ok(written) => {
                    tracing::debug!(vpath = %resolved.vpath, written, "file saved");
                    meta::describe(backend.as_ref(), mime.as_ref(), &resolved, None).await
                }
                Err(e) => Err(VfsError::from_io(e, resolved.vpath.as_str())),
            };
            if let Err(e) = &result {
                tracing::warn!(vpath = %resolved.vpath, error = %e, "file sink failed");
            }
            // The caller may have dropped the notification.
            let _ = tx.send(result);
        });

        Ok(MkFile::Sink(FileSink::new(writer, rx)))
    }

    /// Create a directory. The parent must already exist.
    #[tracing::instrument(skip(self, options), name = "vfs.mkdir")]
    pub async fn mkdir(&self, path: &str, options: ResolveOptions) -> VfsResult<Meta> {
        let resolved = self
            .resolver
            .resolve(path, options.already_rooted, Lookup::PERMISSIVE.no_follow())
            .await?;
        if self.backend.exists(&resolved.real).await {
            return Err(VfsError::already_exists(resolved.vpath));
        }
        self.backend
            .create_dir(&resolved.real)
            .await
            .at(&resolved.vpath)?;
        self.describe(&resolved).await
    }

    /// Remove a file or symlink.
    #[tracing::instrument(skip(self, options), name = "vfs.rmfile")]
    pub async fn rmfile(&self, path: &str, options: ResolveOptions) -> VfsResult<()> {
        let resolved = self
            .resolver
            .resolve(path, options.already_rooted, Lookup::STRICT.no_follow())
            .await?;
        let attr = self.backend.lstat(&resolved.real).await.at(&resolved.vpath)?;
        if attr.is_dir() {
            return Err(VfsError::is_a_directory(resolved.vpath));
        }
        self.backend
            .remove_file(&resolved.real)
            .await
            .at(&resolved.vpath)
    }

    /// Remove a directory; non-empty ones only with `recursive`.
    #[tracing::instrument(skip(self, options), name = "vfs.rmdir")]
    pub async fn rmdir(&self, path: &str, options: RmdirOptions) -> VfsResult<()> {
        let resolved = self
            .resolver
            .resolve(path, options.already_rooted, Lookup::STRICT.no_follow())
            .await?;
        let attr = self.backend.lstat(&resolved.real).await.at(&resolved.vpath)?;
        if !attr.is_dir() {
            return Err(VfsError::not_a_directory(resolved.vpath));
        }
        self.refuse_root(&resolved)?;

        let removed = if options.recursive {
            self.backend.remove_dir_all(&resolved.real).await
        } else {
            self.backend.remove_dir(&resolved.real).await
        };
        removed.at(&resolved.vpath)
    }

    /// Move an entry. `options` names the other end.
    #[tracing::instrument(skip(self, options), name = "vfs.rename")]
    pub async fn rename(&self, path: &str, options: TransferOptions) -> VfsResult<Meta> {
        let (from, to) = options.endpoints(path)?;
        let source = self
            .resolver
            .resolve(&from, options.already_rooted, Lookup::STRICT.no_follow())
            .await?;
        self.refuse_root(&source)?;
        let dest = self
            .resolver
            .resolve(&to, options.already_rooted, Lookup::PERMISSIVE.no_follow())
            .await?;

        if source.real != dest.real {
            self.backend
                .rename(&source.real, &dest.real)
                .await
                .at(&source.vpath)?;
        }
        self.describe(&dest).await
    }

    /// Copy a file's bytes. `options` names the other end.
    ///
    /// Not atomic: a failure part-way leaves a partial destination.
    #[tracing::instrument(skip(self, options), name = "vfs.copy")]
    pub async fn copy(&self, path: &str, options: TransferOptions) -> VfsResult<Meta> {
        let (from, to) = options.endpoints(path)?;
        let source = self
            .resolver
            .resolve(&from, options.already_rooted, Lookup::STRICT)
            .await?;
        let attr = self.backend.stat(&source.real).await.at(&source.vpath)?;
        if attr.is_dir() {
            return Err(VfsError::is_a_directory(source.vpath));
        }
        let dest = self
            .resolver
            .resolve(&to, options.already_rooted, Lookup::PERMISSIVE)
            .await?;
        let occupied = self.backend.stat(&dest.real).await;
        if occupied.is_ok_and(|attr| attr.is_dir()) {
            return Err(VfsError::is_a_directory(dest.vpath));
        }

        if source.real != dest.real {
            let reader = self
                .backend
                .open_read(&source.real, 0)
                .await
                .at(&source.vpath)?;
            self.backend
                .write_from(&dest.real, reader)
                .await
                .at(&dest.vpath)?;
        }
        self.describe(&dest).await
    }

    /// Create a symlink at `path` pointing at `options.target`.
    ///
    /// The target is stored verbatim and not checked here; containment is
    /// enforced when the link is later resolved through.
    #[tracing::instrument(skip(self, options), name = "vfs.symlink")]
    pub async fn symlink(&self, path: &str, options: SymlinkOptions) -> VfsResult<Meta> {
        if options.target.is_empty() {
            return Err(VfsError::invalid_options("symlink target is required"));
        }
        let resolved = self
            .resolver
            .resolve(path, options.already_rooted, Lookup::PERMISSIVE.no_follow())
            .await?;
        if self.backend.exists(&resolved.real).await {
            return Err(VfsError::already_exists(resolved.vpath));
        }
        self.backend
            .symlink(Path::new(&options.target), &resolved.real)
            .await
            .at(&resolved.vpath)?;
        self.describe_link(path, options.already_rooted, &resolved)
            .await
    }
}
