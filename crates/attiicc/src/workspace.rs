//! Filesystem helpers shared by the loaders and the batch runners.
//!
//! Each folder of an experiment is an independent unit of work, so failures
//! below the root are logged and skipped rather than aborting the run.

use std::io;
use std::path::{Path, PathBuf};

/// Create `root` and every `sub_dirs` entry below it.
///
/// Failing to create the root is an error. A failing subdirectory is logged
/// and the remaining ones are still attempted. Returns the subdirectories that
/// exist afterwards.
pub fn create_directories<S: AsRef<Path>>(root: &Path, sub_dirs: &[S]) -> io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(root)?;
    tracing::info!("Root directory ready: {}", root.display());

    let mut created = Vec::with_capacity(sub_dirs.len());
    for sub in sub_dirs {
        let dir = root.join(sub);
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!("Subdirectory ready: {}", dir.display());
                created.push(dir);
            }
            Err(e) => tracing::warn!("Failed to create subdirectory {}: {}", dir.display(), e),
        }
    }
    Ok(created)
}

/// All directories below and including `root`, sorted by path.
///
/// An unreadable root is an error; unreadable subdirectories are logged and
/// skipped.
pub fn walk_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = vec![root.to_path_buf()];
    let mut stack = subdirs(root)?;
    while let Some(dir) = stack.pop() {
        match subdirs(&dir) {
            Ok(children) => stack.extend(children),
            Err(e) => tracing::warn!("Skipping unreadable directory {}: {}", dir.display(), e),
        }
        out.push(dir);
    }
    out.sort();
    Ok(out)
}

fn subdirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Regular files directly inside `dir` whose extension matches one of `exts`
/// (case-insensitive), sorted by name.
pub fn files_with_extensions(dir: &Path, exts: &[&str]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if has_extension(&path, exts) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Last path component as UTF-8, or empty.
pub(crate) fn dir_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Map `path` (inside `from_root`) to the same relative location under `to_root`.
pub(crate) fn mirror_path(path: &Path, from_root: &Path, to_root: &Path) -> PathBuf {
    match path.strip_prefix(from_root) {
        Ok(rel) => to_root.join(rel),
        Err(_) => to_root.join(dir_name(path)),
    }
}
