//! Path resolver.
//!
//! Turns a virtual path into a real path that is guaranteed to sit under
//! the root. Resolution is lexical first (`.`/`..` collapse, segment-wise
//! prefix test) and, with `check_symlinks`, physical: the candidate is
//! walked from the root one segment at a time and every symlink met on the
//! way is read, re-anchored and re-checked before the walk continues.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::backends::Backend;
use crate::error::{IoResultExt, VfsError, VfsResult};
use crate::path::{clean, is_contained, normalize_virtual, to_virtual};

/// A containment-verified path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Real absolute path under the root.
    pub real: PathBuf,
    /// Normalized virtual path the caller asked for.
    pub vpath: String,
}

/// How a resolution treats the final segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lookup {
    /// The final segment must exist. Parents must exist either way.
    pub must_exist: bool,
    /// Dereference a final symlink instead of stopping at the link.
    pub follow_final: bool,
}

impl Lookup {
    /// Must exist; final symlink followed.
    pub const STRICT: Self = Self {
        must_exist: true,
        follow_final: true,
    };

    /// Final segment may be missing; final symlink followed.
    pub const PERMISSIVE: Self = Self {
        must_exist: false,
        follow_final: true,
    };

    /// Stop at a final symlink rather than following it.
    pub const fn no_follow(self) -> Self {
        Self {
            follow_final: false,
            ..self
        }
    }
}

/// Maps virtual paths onto the root.
#[derive(Debug, Clone)]
pub(crate) struct Resolver {
    root: PathBuf,
    /// The root as configured, when it differs from the canonical one.
    alias: Option<PathBuf>,
    check_symlinks: bool,
    max_hops: usize,
    backend: Arc<dyn Backend>,
}

fn normal_components(path: &Path) -> VecDeque<OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_os_string()),
            _ => None,
        })
        .collect()
}

impl Resolver {
    /// `root` must already be canonical.
    pub fn new(
        root: PathBuf,
        check_symlinks: bool,
        max_hops: usize,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            root,
            alias: None,
            check_symlinks,
            max_hops,
            backend,
        }
    }

    /// Also accept already-rooted paths written against `configured`, the
    /// root as given before canonicalization.
    pub fn with_alias(mut self, configured: &Path) -> Self {
        let configured = clean(configured);
        self.alias = (configured.is_absolute() && configured != self.root).then_some(configured);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` under the given lookup rules.
    ///
    /// With `already_rooted`, `path` is a real absolute path; it is still
    /// cleaned and containment-checked.
    pub async fn resolve(
        &self,
        path: &str,
        already_rooted: bool,
        lookup: Lookup,
    ) -> VfsResult<ResolvedPath> {
        let relative = if already_rooted {
            self.rooted_relative(path)?
        } else {
            normalize_virtual(path).inspect_err(|_| {
                tracing::warn!(vpath = path, "refused path above root");
            })?
        };

        let vpath = to_virtual(&self.root.join(&relative), &self.root)
            .unwrap_or_else(|| String::from("/"));

        let real = if self.check_symlinks {
            self.walk(&relative, &vpath, lookup).await?
        } else {
            self.check_lexical(&relative, &vpath, lookup).await?
        };

        Ok(ResolvedPath { real, vpath })
    }

    /// Root-relative form of an already-rooted path.
    fn rooted_relative(&self, path: &str) -> VfsResult<PathBuf> {
        let path = Path::new(path);
        if !path.is_absolute() {
            return Err(VfsError::invalid_options(format!(
                "already-rooted path must be absolute: {}",
                path.display()
            )));
        }
        let cleaned = clean(path);
        let relative = cleaned
            .strip_prefix(&self.root)
            .or_else(|e| self.alias.as_deref().map_or(Err(e), |alias| cleaned.strip_prefix(alias)));
        match relative {
            Ok(rel) => Ok(rel.to_path_buf()),
            Err(_) => {
                tracing::warn!(path = %cleaned.display(), "refused rooted path outside root");
                Err(VfsError::path_escapes_root(cleaned.display().to_string()))
            }
        }
    }

    fn join_root(&self, relative: &Path) -> PathBuf {
        if relative.as_os_str().is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    /// Existence checks without symlink re-validation.
    async fn check_lexical(&self, relative: &Path, vpath: &str, lookup: Lookup) -> VfsResult<PathBuf> {
        let real = self.join_root(relative);

        if lookup.must_exist {
            if lookup.follow_final {
                self.backend.stat(&real).await.at(vpath)?;
            } else {
                self.backend.lstat(&real).await.at(vpath)?;
            }
        } else if let Some(parent) = real.parent().filter(|_| real != self.root) {
            let attr = self.backend.stat(parent).await.at(vpath)?;
            if !attr.is_dir() {
                return Err(VfsError::not_a_directory(vpath));
            }
        }

        Ok(real)
    }

    /// Walk `relative` from the root, re-validating at every symlink.
    async fn walk(&self, relative: &Path, vpath: &str, lookup: Lookup) -> VfsResult<PathBuf> {
        let mut pending = normal_components(relative);
        let mut current = self.root.clone();
        let mut hops = 0usize;

        while let Some(name) = pending.pop_front() {
            let next = current.join(&name);
            let is_last = pending.is_empty();

            let attr = match self.backend.lstat(&next).await {
                Ok(attr) => attr,
                Err(e) if e.kind() == io::ErrorKind::NotFound && is_last && !lookup.must_exist => {
                    return Ok(next);
                }
                Err(e) => return Err(VfsError::from_io(e, vpath)),
            };

            if attr.is_symlink() && (!is_last || lookup.follow_final) {
                hops += 1;
                if hops > self.max_hops {
                    return Err(VfsError::too_many_symlinks(vpath));
                }

                let target = self.backend.read_link(&next).await.at(vpath)?;
                let landed = clean(&current.join(&target));
                if !is_contained(&landed, &self.root) {
                    tracing::warn!(
                        vpath,
                        link = %next.display(),
                        target = %target.display(),
                        "refused symlink leaving root"
                    );
                    return Err(VfsError::path_escapes_root(vpath));
                }
                tracing::debug!(link = %next.display(), target = %target.display(), hops, "following symlink");

                let mut rest = normal_components(landed.strip_prefix(&self.root).unwrap_or(Path::new("")));
                rest.extend(pending);
                pending = rest;
                current = self.root.clone();
                continue;
            }

            if !is_last && !attr.is_dir() {
                return Err(VfsError::not_a_directory(vpath));
            }
            current = next;
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::error::ErrorCode;

    fn memory_resolver(check_symlinks: bool) -> (Arc<MemoryBackend>, Resolver) {
        let fs = Arc::new(MemoryBackend::new());
        fs.insert_file("/srv/root/file.txt", "This is a simple file!\n").unwrap();
        fs.insert_file("/srv/root/dir/stuff.json", "{}").unwrap();
        fs.insert_file("/srv/secret.txt", "top secret").unwrap();
        let resolver = Resolver::new(PathBuf::from("/srv/root"), check_symlinks, 8, fs.clone());
        (fs, resolver)
    }

    async fn code_of(resolver: &Resolver, path: &str, lookup: Lookup) -> ErrorCode {
        resolver.resolve(path, false, lookup).await.unwrap_err().code()
    }

    #[tokio::test]
    async fn test_prepends_root() {
        let (_fs, resolver) = memory_resolver(true);
        let resolved = resolver.resolve("/dir/stuff.json", false, Lookup::STRICT).await.unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root/dir/stuff.json"));
        assert_eq!(resolved.vpath, "/dir/stuff.json");
    }

    #[tokio::test]
    async fn test_root_itself() {
        let (_fs, resolver) = memory_resolver(true);
        let resolved = resolver.resolve("/", false, Lookup::STRICT).await.unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root"));
        assert_eq!(resolved.vpath, "/");
    }

    #[tokio::test]
    async fn test_rejects_parent_escape_before_existence() {
        let (_fs, resolver) = memory_resolver(true);
        assert_eq!(code_of(&resolver, "/../secret.txt", Lookup::STRICT).await, ErrorCode::Access);
        assert_eq!(code_of(&resolver, "/../nope.txt", Lookup::STRICT).await, ErrorCode::Access);
    }

    #[tokio::test]
    async fn test_strict_missing() {
        let (_fs, resolver) = memory_resolver(true);
        assert_eq!(code_of(&resolver, "/notexists.txt", Lookup::STRICT).await, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_permissive_missing_final_only() {
        let (_fs, resolver) = memory_resolver(true);
        let resolved = resolver.resolve("/new.txt", false, Lookup::PERMISSIVE).await.unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root/new.txt"));

        assert_eq!(
            code_of(&resolver, "/missing/new.txt", Lookup::PERMISSIVE).await,
            ErrorCode::NotFound
        );
        assert_eq!(
            code_of(&resolver, "/file.txt/new.txt", Lookup::PERMISSIVE).await,
            ErrorCode::NotADirectory
        );
    }

    #[tokio::test]
    async fn test_already_rooted() {
        let (_fs, resolver) = memory_resolver(true);
        let resolved = resolver
            .resolve("/srv/root/file.txt", true, Lookup::STRICT)
            .await
            .unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root/file.txt"));
        assert_eq!(resolved.vpath, "/file.txt");

        let err = resolver.resolve("/srv/secret.txt", true, Lookup::STRICT).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Access);

        let err = resolver.resolve("/srv/root/gone.txt", true, Lookup::STRICT).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = resolver.resolve("relative.txt", true, Lookup::STRICT).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Invalid);
    }

    #[tokio::test]
    async fn test_already_rooted_through_configured_alias() {
        let (fs, resolver) = memory_resolver(true);
        fs.symlink(Path::new("root"), Path::new("/srv/current")).await.unwrap();
        let resolver = resolver.with_alias(Path::new("/srv/current/"));

        let resolved = resolver
            .resolve("/srv/current/dir/../file.txt", true, Lookup::STRICT)
            .await
            .unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root/file.txt"));
        assert_eq!(resolved.vpath, "/file.txt");

        // The canonical form keeps working next to the alias.
        let resolved = resolver.resolve("/srv/root/file.txt", true, Lookup::STRICT).await.unwrap();
        assert_eq!(resolved.vpath, "/file.txt");

        let err = resolver.resolve("/srv/current/../secret.txt", true, Lookup::STRICT).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Access);
    }

    #[tokio::test]
    async fn test_prefix_sibling_is_not_root() {
        let (fs, resolver) = memory_resolver(true);
        fs.insert_file("/srv/rootfoo/x.txt", "x").unwrap();
        let err = resolver.resolve("/srv/rootfoo/x.txt", true, Lookup::STRICT).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Access);
    }

    #[tokio::test]
    async fn test_symlink_inside_root_followed() {
        let (fs, resolver) = memory_resolver(true);
        fs.symlink(Path::new("dir"), Path::new("/srv/root/alias")).await.unwrap();

        let resolved = resolver.resolve("/alias/stuff.json", false, Lookup::STRICT).await.unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root/dir/stuff.json"));
    }

    #[tokio::test]
    async fn test_symlink_escape_refused() {
        let (fs, resolver) = memory_resolver(true);
        fs.symlink(Path::new("/srv"), Path::new("/srv/root/up")).await.unwrap();
        fs.symlink(Path::new("../secret.txt"), Path::new("/srv/root/leak.txt"))
            .await
            .unwrap();

        assert_eq!(code_of(&resolver, "/up/secret.txt", Lookup::STRICT).await, ErrorCode::Access);
        assert_eq!(code_of(&resolver, "/leak.txt", Lookup::STRICT).await, ErrorCode::Access);
        // Even creating beneath an escaping link is refused.
        assert_eq!(code_of(&resolver, "/up/new.txt", Lookup::PERMISSIVE).await, ErrorCode::Access);
    }

    #[tokio::test]
    async fn test_symlink_escape_not_checked_when_disabled() {
        let (fs, resolver) = memory_resolver(false);
        fs.symlink(Path::new("../secret.txt"), Path::new("/srv/root/leak.txt"))
            .await
            .unwrap();

        let resolved = resolver.resolve("/leak.txt", false, Lookup::STRICT).await.unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root/leak.txt"));
    }

    #[tokio::test]
    async fn test_no_follow_stops_at_link() {
        let (fs, resolver) = memory_resolver(true);
        fs.symlink(Path::new("../secret.txt"), Path::new("/srv/root/leak.txt"))
            .await
            .unwrap();

        let lookup = Lookup::STRICT.no_follow();
        let resolved = resolver.resolve("/leak.txt", false, lookup).await.unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root/leak.txt"));
    }

    #[tokio::test]
    async fn test_symlink_cycle_is_bounded() {
        let (fs, resolver) = memory_resolver(true);
        fs.symlink(Path::new("b"), Path::new("/srv/root/a")).await.unwrap();
        fs.symlink(Path::new("a"), Path::new("/srv/root/b")).await.unwrap();

        assert_eq!(code_of(&resolver, "/a", Lookup::STRICT).await, ErrorCode::Loop);
    }

    #[tokio::test]
    async fn test_dangling_link_permissive_lands_on_target() {
        let (fs, resolver) = memory_resolver(true);
        fs.symlink(Path::new("dir/later.txt"), Path::new("/srv/root/pending"))
            .await
            .unwrap();

        let resolved = resolver.resolve("/pending", false, Lookup::PERMISSIVE).await.unwrap();
        assert_eq!(resolved.real, PathBuf::from("/srv/root/dir/later.txt"));
        assert_eq!(code_of(&resolver, "/pending", Lookup::STRICT).await, ErrorCode::NotFound);
    }
}
