use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

/// Knobs for [`write_text_atomic`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicWriteOptions {
    /// Copy the destination's current content here before it is replaced.
    /// Ignored when the destination does not exist yet.
    pub backup_path: Option<PathBuf>,
}

impl AtomicWriteOptions {
    pub fn with_backup(backup_path: impl Into<PathBuf>) -> Self {
        Self {
            backup_path: Some(backup_path.into()),
        }
    }
}

/// Replaces `path` with `content` so a crash leaves either the old or the new
/// file, never a torn one.
///
/// The payload is flushed to disk in a sibling temp file before the rename.
/// Returns `true` when a backup copy of the previous file was taken.
pub fn write_text_atomic(
    path: &Path,
    content: &str,
    options: &AtomicWriteOptions,
) -> Result<bool> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_path = parent_dir.join(format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("bridge-state"),
        std::process::id(),
        current_unix_timestamp_ms()
    ));
    if let Err(error) = stage_temp_file(&temp_path, content) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error);
    }

    let mut backed_up = false;
    if let Some(backup_path) = options.backup_path.as_deref() {
        if path.is_file() {
            if let Err(error) = std::fs::copy(path, backup_path) {
                let _ = std::fs::remove_file(&temp_path);
                return Err(error).with_context(|| {
                    format!(
                        "failed to back up {} to {}",
                        path.display(),
                        backup_path.display()
                    )
                });
            }
            backed_up = true;
        }
    }

    if let Err(error) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    sync_directory(parent_dir)?;
    Ok(backed_up)
}

fn stage_temp_file(temp_path: &Path, content: &str) -> Result<()> {
    let mut file = File::create(temp_path)
        .with_context(|| format!("failed to create temporary file {}", temp_path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to flush temporary file {}", temp_path.display()))
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .with_context(|| format!("failed to flush directory {}", dir.display()))
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> Result<()> {
    Ok(())
}
