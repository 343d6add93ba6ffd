//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Sibling temp path used while a file is being replaced.
fn temp_path_for(native_path: &Path, tag: &str) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.{}",
        native_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id(),
        tag
    );
    native_path.with_file_name(temp_name)
}

fn write_temp(temp_path: &Path, content: &[u8], lock_for: &Path) -> Result<File> {
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file
        .lock_exclusive()
        .map_err(|_| Error::LockFailed {
            path: lock_for.to_path_buf(),
        })?;

    temp_file
        .write_all(content)
        .map_err(|e| Error::io(temp_path, e))?;

    temp_file.sync_all().map_err(|e| Error::io(temp_path, e))?;

    Ok(temp_file)
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename strategy to prevent partial writes.
/// Acquires an advisory lock to prevent concurrent access.
pub fn write_atomic(path: &NormalizedPath, content: &[u8]) -> Result<()> {
    let native_path = path.to_native();

    if let Some(parent) = native_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_path = temp_path_for(&native_path, "tmp");
    let temp_file = match write_temp(&temp_path, content, &native_path) {
        Ok(file) => file,
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    };

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: native_path.clone(),
    })?;
    drop(temp_file);

    if let Err(e) = fs::rename(&temp_path, &native_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&native_path, e));
    }

    tracing::trace!(path = %path, bytes = content.len(), "Atomic write complete");
    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Read text content, returning `None` when the file does not exist.
pub fn read_text_optional(path: &NormalizedPath) -> Result<Option<String>> {
    let native_path = path.to_native();
    match fs::read_to_string(&native_path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(&native_path, e)),
    }
}

/// Write text content to a file atomically.
pub fn write_text(path: &NormalizedPath, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes())
}

/// Remove a file. Missing files are not an error.
pub fn remove_file_if_exists(path: &NormalizedPath) -> Result<bool> {
    let native_path = path.to_native();
    match fs::remove_file(&native_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(&native_path, e)),
    }
}

/// A batch of file writes flushed all-or-nothing.
///
/// Nothing touches the filesystem until [`StagedWrites::commit`]. The
/// commit runs in two phases: every file is written and synced to a
/// sibling temp file, then every temp file is renamed over its target.
/// If any write in the first phase fails, all temp files and any
/// directories created for them are removed and no target is modified.
/// If a rename in the second phase fails, files already renamed are
/// restored from backups (or removed when they were new).
#[derive(Debug, Default)]
pub struct StagedWrites {
    entries: Vec<(NormalizedPath, Vec<u8>)>,
}

impl StagedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `content` for `path`. A later stage for the same path wins.
    pub fn stage(&mut self, path: NormalizedPath, content: impl Into<Vec<u8>>) {
        let content = content.into();
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| *p == path) {
            entry.1 = content;
        } else {
            self.entries.push((path, content));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flush every staged write. Returns the number of files written.
    pub fn commit(self) -> Result<usize> {
        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut temps: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(self.entries.len());

        let rollback = |temps: &[(PathBuf, PathBuf)], dirs: &[PathBuf]| {
            for (temp, _) in temps {
                let _ = fs::remove_file(temp);
            }
            for dir in dirs.iter().rev() {
                let _ = fs::remove_dir_all(dir);
            }
        };

        // Phase 1: every byte reaches disk beside its target.
        for (path, content) in &self.entries {
            let native_path = path.to_native();
            if let Some(parent) = native_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                let topmost = topmost_missing_ancestor(parent);
                if let Err(e) = fs::create_dir_all(parent) {
                    rollback(&temps, &created_dirs);
                    return Err(Error::io(parent, e));
                }
                created_dirs.push(topmost);
            }

            let temp_path = temp_path_for(&native_path, "staged");
            match write_temp(&temp_path, content, &native_path) {
                Ok(file) => drop(file),
                Err(e) => {
                    let _ = fs::remove_file(&temp_path);
                    rollback(&temps, &created_dirs);
                    return Err(e);
                }
            }
            temps.push((temp_path, native_path));
        }

        // Phase 2: renames only. Replaced files keep a backup until every
        // rename has landed.
        let mut landed: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(temps.len());
        for (index, (temp, target)) in temps.iter().enumerate() {
            let renamed = backup_existing(target)
                .and_then(|backup| match fs::rename(temp, target) {
                    Ok(()) => Ok(backup),
                    Err(e) => {
                        if let Some(backup) = &backup {
                            let _ = fs::remove_file(backup);
                        }
                        Err(Error::io(target, e))
                    }
                });
            match renamed {
                Ok(backup) => landed.push((target.as_path(), backup)),
                Err(e) => {
                    for (remaining, _) in &temps[index..] {
                        let _ = fs::remove_file(remaining);
                    }
                    for (target, backup) in landed.iter().rev() {
                        match backup {
                            Some(backup) => {
                                let _ = fs::rename(backup, target);
                            }
                            None => {
                                let _ = fs::remove_file(target);
                            }
                        }
                    }
                    for dir in created_dirs.iter().rev() {
                        let _ = fs::remove_dir_all(dir);
                    }
                    return Err(e);
                }
            }
        }

        for backup in landed.iter().filter_map(|(_, backup)| backup.as_ref()) {
            let _ = fs::remove_file(backup);
        }

        tracing::debug!(files = temps.len(), "Staged writes committed");
        Ok(temps.len())
    }
}

/// Keep the current content of an existing regular file at a sibling path.
/// The target itself stays in place.
fn backup_existing(target: &Path) -> Result<Option<PathBuf>> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(target, e)),
    }
    let backup = temp_path_for(target, "backup");
    let _ = fs::remove_file(&backup);
    if fs::hard_link(target, &backup).is_err() {
        fs::copy(target, &backup).map_err(|e| Error::io(&backup, e))?;
    }
    Ok(Some(backup))
}

fn topmost_missing_ancestor(dir: &Path) -> PathBuf {
    let mut topmost = dir.to_path_buf();
    let mut current = dir;
    while let Some(parent) = current.parent() {
        if parent.as_os_str().is_empty() || parent.exists() {
            break;
        }
        topmost = parent.to_path_buf();
        current = parent;
    }
    topmost
}
