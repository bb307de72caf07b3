//! Filesystem helpers shared by the handlers.
//!
//! The two rules every handler follows live here: externally visible
//! directories are built under a `.wip-` prefix and renamed into place, and
//! a target that already exists halts the handler rather than being
//! clobbered.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{EngineError, Result};

/// Prefix for work-in-progress directories. Dot-prefixed so directory
/// listings shown to curators never include half-built trees.
pub const WIP_PREFIX: &str = ".wip-";

/// The hidden work-in-progress name for a directory.
pub fn wip_name(name: &str) -> String {
    format!("{WIP_PREFIX}{name}")
}

/// Returns a `Precondition` error if the path exists in any form.
pub fn must_not_exist(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        return Err(EngineError::Precondition(format!(
            "{} already exists",
            path.display()
        )));
    }
    Ok(())
}

/// Recursively copies `src` into `dest`, which must not exist yet.
pub fn copy_directory(src: &Path, dest: &Path) -> Result<()> {
    must_not_exist(dest)?;
    copy_directory_over(src, dest)
}

/// Recursively copies `src` into `dest`, creating directories as needed and
/// overwriting files that are already present.
pub fn copy_directory_over(src: &Path, dest: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(EngineError::Precondition(format!(
            "{} is not a directory",
            src.display()
        )));
    }

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| EngineError::Io(e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| EngineError::Invariant(format!("walk escaped {}: {e}", src.display())))?;
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Hard-links `src` to `dest`, copying instead when the link fails (e.g.
/// crossing filesystems).
pub fn link_or_copy(src: &Path, dest: &Path) -> Result<()> {
    if fs::hard_link(src, dest).is_err() {
        fs::copy(src, dest)?;
    }
    Ok(())
}

/// Sorted file names (not directories) directly under `dir`.
pub fn sorted_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Sorted full paths of files directly under `dir`.
pub fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(sorted_file_names(dir)?
        .into_iter()
        .map(|n| dir.join(n))
        .collect())
}

/// Verifies a backup directory is usable before its source is destroyed:
/// it must exist, be a different path than the source, and be readable with
/// at least one entry.
pub fn verify_backup(source: &Path, backup: &Path) -> Result<()> {
    if source == backup {
        return Err(EngineError::Precondition(format!(
            "backup target {} is the source itself",
            backup.display()
        )));
    }
    if !backup.is_dir() {
        return Err(EngineError::Precondition(format!(
            "backup target {} is missing",
            backup.display()
        )));
    }
    let mut entries = fs::read_dir(backup)?;
    if entries.next().is_none() {
        return Err(EngineError::Precondition(format!(
            "backup target {} is empty",
            backup.display()
        )));
    }
    Ok(())
}

/// Atomically writes `contents` to `path` by writing a sibling temp file
/// and renaming it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        EngineError::Invariant(format!("{} has no parent directory", path.display()))
    })?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)?;
    std::io::Write::write_all(&mut tmp, contents)?;
    tmp.persist(path)
        .map_err(|e| EngineError::Io(e.error))?;
    Ok(())
}
