//! Lexical path handling.
//!
//! Pure functions with no filesystem access: normalizing virtual paths,
//! cleaning real paths, and the segment-wise containment test every
//! resolution ends with.

use std::path::{Component, Path, PathBuf};

use crate::error::{VfsError, VfsResult};

/// Normalize a virtual path into a root-relative path.
///
/// `.` segments are dropped and `..` pops the previous segment. A `..` with
/// nothing left to pop escapes the root and is rejected rather than clamped.
/// The empty result denotes the root itself.
pub fn normalize_virtual(vpath: &str) -> VfsResult<PathBuf> {
    let mut result = PathBuf::new();
    for component in Path::new(vpath).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    return Err(VfsError::path_escapes_root(vpath));
                }
            }
            Component::Normal(s) => result.push(s),
        }
    }
    Ok(result)
}

/// Lexically clean an absolute path.
///
/// `..` at the filesystem root stays at the root, as POSIX does. Relative
/// input is returned cleaned but still relative.
pub fn clean(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Whether `path` lies at or below `root`.
///
/// Comparison is by whole segments, so `/rootfoo` is not inside `/root`.
pub fn is_contained(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Render a real path under `root` back into the virtual namespace.
pub fn to_virtual(real: &Path, root: &Path) -> Option<String> {
    let rel = real.strip_prefix(root).ok()?;
    let mut out = String::from("/");
    out.push_str(
        &rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    );
    Some(out)
}

/// Final segment of a virtual path; `/` for the root.
pub fn base_name(vpath: &str) -> String {
    vpath
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("/")
        .to_string()
}

/// Join a virtual directory path and a child name.
pub fn join_virtual(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    format!("{dir}/{name}")
}
