//! Atomic artifact writes.
//!
//! Status and log files are polled by viewers while a tournament runs, so a
//! reader must never observe a half-written file. Every write goes to a
//! temporary file in the destination directory and is then renamed over
//! the target.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::canonical::to_canonical_value;
use crate::Result;

/// Write `data` to `path` atomically, creating parent directories as needed.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as pretty JSON with sorted keys and write it atomically.
///
/// A trailing newline is appended so files diff cleanly.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let sorted = to_canonical_value(value)?;
    let mut bytes = serde_json::to_vec_pretty(&sorted)?;
    bytes.push(b'\n');
    atomic_write(path, &bytes)
}
