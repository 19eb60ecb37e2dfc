//! Atomic file replacement
//!
//! Writes go to a temporary file in the target directory, are fsynced, and are
//! then renamed over the destination. Readers therefore observe either the old
//! file or the new one, never a partial write. The temporary file shares the
//! target's directory, so the rename never crosses a filesystem boundary.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

#[cfg(target_os = "windows")]
use std::{thread, time::Duration};

/// Outcome of an atomic write
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Number of rename retries needed (Windows only)
    pub rename_retry_count: u32,
    /// Non-fatal conditions encountered along the way
    pub warnings: Vec<String>,
}

/// Atomically replace `path` with `content`.
///
/// Parent directories are created as needed. Existing content at `path` is
/// only replaced once the new bytes are durable on disk.
pub fn write_file_atomic(path: &Utf8Path, content: &[u8]) -> Result<AtomicWriteResult> {
    let mut result = AtomicWriteResult::default();

    if let Some(parent) = path.parent()
        && !parent.as_str().is_empty()
    {
        crate::paths::ensure_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    let temp_dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(content)
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    let retry_count = atomic_rename(temp_file, path.as_std_path())
        .with_context(|| format!("Failed to atomically write file: {path}"))?;
    result.rename_retry_count = retry_count;
    if retry_count > 0 {
        result.warnings.push(format!(
            "Rename required {retry_count} retries due to transient filesystem locks"
        ));
    }

    Ok(result)
}

/// Rename with bounded exponential backoff; Windows virus scanners and
/// indexers hold transient locks on freshly written files.
#[cfg(target_os = "windows")]
fn atomic_rename(mut temp_file: NamedTempFile, target: &Path) -> Result<u32> {
    use std::io::ErrorKind;

    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;

    let mut retry_count = 0;
    loop {
        match temp_file.persist(target) {
            Ok(_) => return Ok(retry_count),
            Err(persist_error) => {
                let retryable = matches!(
                    persist_error.error.kind(),
                    ErrorKind::PermissionDenied | ErrorKind::Other
                );
                if !retryable || retry_count >= MAX_RETRIES {
                    return Err(anyhow::anyhow!(persist_error.error));
                }
                thread::sleep(Duration::from_millis(
                    INITIAL_DELAY_MS * 2_u64.pow(retry_count),
                ));
                retry_count += 1;
                temp_file = persist_error.file;
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn atomic_rename(temp_file: NamedTempFile, target: &Path) -> Result<u32> {
    temp_file
        .persist(target)
        .map(|_| 0)
        .map_err(|e| anyhow::anyhow!(e.error))
}
