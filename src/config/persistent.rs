//! Durable commit of a profile to its backing file
//!
//! A commit normalizes the bounded stats, serializes the whole profile and
//! forces it to stable storage before returning.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::profile::Profile;
use crate::policy::{normalize_profile, PolicyReport};

/// Strategy for writing the profile file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStrategy {
    /// Write a sibling temp file, fsync it and rename it over the target
    #[default]
    ReplaceAtomically,
    /// Truncate and rewrite the target file directly, then fsync
    InPlace,
}

/// What a commit did
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub policy: PolicyReport,
    pub bytes_written: usize,
}

/// Normalize and durably write `profile` to `path`
///
/// Prior file content is fully replaced. Any I/O failure is returned with
/// the path attached and the profile is not considered committed.
pub fn commit(profile: &mut Profile, path: &Path, strategy: WriteStrategy) -> Result<CommitReport> {
    let policy = normalize_profile(profile);
    let contents = profile.to_ini_string();

    if let Some(parent) = parent_dir(path) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create profile directory {}", parent.display()))?;
    }

    match strategy {
        WriteStrategy::ReplaceAtomically => replace_atomically(path, contents.as_bytes())?,
        WriteStrategy::InPlace => write_in_place(path, contents.as_bytes())?,
    }

    info!(
        path = %path.display(),
        sections = profile.section_count(),
        clamped = policy.clamped.len(),
        skipped = policy.skipped.len(),
        "Committed profile"
    );

    Ok(CommitReport {
        policy,
        bytes_written: contents.len(),
    })
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn write_in_place(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;

    file.write_all(data)
        .with_context(|| format!("Failed to write profile to {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync profile to {}", path.display()))?;
    Ok(())
}

fn replace_atomically(path: &Path, data: &[u8]) -> Result<()> {
    // Replace what a symlink points at, not the link itself
    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to resolve {}", path.display()));
        }
    };
    let dir = parent_dir(&target).unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(data)
        .with_context(|| format!("Failed to write temp file {}", tmp.path().display()))?;
    if let Some(permissions) = target_permissions(&target) {
        tmp.as_file()
            .set_permissions(permissions)
            .with_context(|| format!("Failed to set permissions on {}", tmp.path().display()))?;
    }
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temp file {}", tmp.path().display()))?;

    // Dropping the temp file on error removes it
    tmp.persist(&target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", target.display()))?;

    sync_dir(dir)
}

/// Mode the replaced file should end up with
///
/// An existing file keeps its own; a new one gets the usual 0644 instead of
/// the temp file's 0600.
fn target_permissions(target: &Path) -> Option<fs::Permissions> {
    match fs::metadata(target) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => new_file_permissions(),
    }
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    let handle = fs::File::open(dir)
        .with_context(|| format!("Failed to open directory {} for sync", dir.display()))?;
    handle
        .sync_all()
        .with_context(|| format!("Failed to sync directory {}", dir.display()))?;
    debug!(dir = %dir.display(), "Synced profile directory");
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
