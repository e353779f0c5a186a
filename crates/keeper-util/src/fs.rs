//! Filesystem helpers shared by the engine: atomic writes, path lists,
//! directory clearing and class-file discovery.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::UtilError;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> UtilError + '_ {
    move |source| UtilError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Treat "not found" as success.
fn tolerate_missing(path: &Path, result: std::io::Result<()>) -> Result<(), UtilError> {
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(io_err(path)(e)),
        _ => Ok(()),
    }
}

/// Create the parent directory of `path`, if it has one.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_parent(path: &Path) -> Result<(), UtilError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(io_err(parent))
        }
        _ => Ok(()),
    }
}

/// Replace `path` with `contents` in one rename, creating parents as needed.
///
/// # Errors
/// Returns an error if any step of the write fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), UtilError> {
    ensure_parent(path)?;
    let mut staging_name = std::ffi::OsString::from(format!(".keeper-{}-", std::process::id()));
    staging_name.push(path.file_name().unwrap_or_default());
    let staging = path.with_file_name(staging_name);

    std::fs::write(&staging, contents).map_err(io_err(&staging))?;
    std::fs::rename(&staging, path).map_err(|e| {
        let _ = std::fs::remove_file(&staging);
        io_err(path)(e)
    })
}

/// Write `entries` one per line, keeping their order.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_path_list(path: &Path, entries: &[PathBuf]) -> Result<(), UtilError> {
    let text: String = entries
        .iter()
        .map(|entry| format!("{}\n", entry.display()))
        .collect();
    write_atomic(path, text.as_bytes())
}

/// Inverse of [`write_path_list`]. Blank lines are ignored.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_path_list(path: &Path) -> Result<Vec<PathBuf>, UtilError> {
    let text = std::fs::read_to_string(path).map_err(io_err(path))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    tolerate_missing(path, std::fs::remove_dir_all(path))
}

/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UtilError> {
    tolerate_missing(path, std::fs::remove_file(path))
}

/// Empty `dir` without removing it and return the number of top-level entries
/// deleted. A missing directory has nothing to delete.
///
/// # Errors
/// Returns an error if an entry cannot be listed or removed.
pub fn clear_dir_contents(dir: &Path) -> Result<usize, UtilError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io_err(dir)(e)),
    };

    let mut removed = 0usize;
    for entry in entries {
        let path = entry.map_err(io_err(dir))?.path();
        let result = if path.is_dir() && !path.is_symlink() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        result.map_err(io_err(&path))?;
        removed = removed.saturating_add(1);
    }
    Ok(removed)
}

/// `~/.keeper`, from `HOME` or, on Windows, `USERPROFILE`.
///
/// # Errors
/// Returns `UtilError::NoHomeDir` when neither is set.
pub fn keeper_home() -> Result<PathBuf, UtilError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".keeper"))
        .ok_or(UtilError::NoHomeDir)
}

/// `path` itself when absolute, else `root/path`.
pub fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    root.join(path)
}

/// Every file under `dir` whose extension is `extension`, sorted.
///
/// # Errors
/// Returns an error if `dir` or one of its subdirectories cannot be read.
pub fn collect_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, UtilError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current).map_err(io_err(&current))? {
            let path = entry.map_err(io_err(&current))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == extension) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
