//! Filesystem side of extraction: listing, writing, renaming and deleting
//! message files in an output directory.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{DbxError, Result};
use crate::export::naming::EXTENSION;

/// Container file extension looked for when an input is a directory.
pub const CONTAINER_EXTENSION: &str = "dbx";

fn has_extension(path: &Path, ext: &str, any_case: bool) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| if any_case { e.eq_ignore_ascii_case(ext) } else { e == ext })
}

fn files_with_extension(dir: &Path, ext: &str, any_case: bool) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| DbxError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DbxError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && has_extension(&path, ext, any_case) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Names of the message files already in `dir`, sorted. Only the exact
/// lowercase extension counts. A missing directory has none.
pub fn list_eml(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = files_with_extension(dir, EXTENSION, false)?
        .into_iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// Expand an input argument: a directory yields its container files
/// (sorted), anything else is taken as a container path.
pub fn list_containers(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_dir() {
        files_with_extension(input, CONTAINER_EXTENSION, true)
    } else if input.exists() {
        Ok(vec![input.to_path_buf()])
    } else {
        Err(DbxError::FileNotFound(input.to_path_buf()))
    }
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| DbxError::io(dir, e))
}

/// Size of `name` in `dir`, `None` when it does not exist.
pub fn file_size(dir: &Path, name: &str) -> Option<u64> {
    fs::metadata(dir.join(name)).ok().map(|m| m.len())
}

/// Write `bytes` to `dir/name`, replacing any existing file, and optionally
/// set its modification time.
pub fn write_message(
    dir: &Path,
    name: &str,
    bytes: &[u8],
    modified: Option<SystemTime>,
) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut file = File::create(&path).map_err(|e| DbxError::io(&path, e))?;
    file.write_all(bytes).map_err(|e| DbxError::io(&path, e))?;
    if let Some(time) = modified {
        if let Err(e) = file.set_modified(time) {
            debug!(path = %path.display(), error = %e, "Could not set modification time");
        }
    }
    Ok(path)
}

pub fn delete(dir: &Path, name: &str) -> Result<()> {
    let path = dir.join(name);
    fs::remove_file(&path).map_err(|e| DbxError::io(&path, e))
}

pub fn rename(dir: &Path, from: &str, to: &str) -> Result<()> {
    let source = dir.join(from);
    fs::rename(&source, dir.join(to)).map_err(|e| DbxError::io(&source, e))
}

/// A modification time for `unix_secs`; times at or before the epoch are
/// treated as unknown.
pub fn system_time(unix_secs: i64) -> Option<SystemTime> {
    u64::try_from(unix_secs)
        .ok()
        .filter(|&s| s > 0)
        .map(|s| UNIX_EPOCH + Duration::from_secs(s))
}

/// The per-container output directory: `<out>/<container stem>`.
pub fn output_dir_for(out_root: &Path, container: &Path) -> PathBuf {
    let stem = container
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());
    out_root.join(stem)
}
