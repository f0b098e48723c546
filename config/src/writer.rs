//! Persisting a [`ConfigStore`]
//!
//! Only files whose rendered content differs from what was read are
//! written. Each write goes to a hidden temporary file in the target
//! directory which is then renamed over the original. Failures are
//! collected per file and do not stop the remaining writes.

use crate::store::ConfigStore;
use crate::ConfigError;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

const TEMP_PREFIX: &str = ".buckos-flags-";

/// Line-level summary of one file change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: PathBuf,
    /// The file did not exist before
    pub created: bool,
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

/// Outcome of writing a store
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Files written (or that would be written in pretend mode)
    pub changed: Vec<FileChange>,
    /// Files left untouched
    pub unchanged: Vec<PathBuf>,
    /// Per-file write failures
    pub failed: Vec<ConfigError>,
}

impl WriteReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: WriteReport) {
        self.changed.extend(other.changed);
        self.unchanged.extend(other.unchanged);
        self.failed.extend(other.failed);
    }
}

/// Writes changed files of a store back to disk
#[derive(Debug, Clone, Default)]
pub struct StoreWriter {
    pretend: bool,
}

impl StoreWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute changes without touching the filesystem
    pub fn pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    pub fn write(&self, store: &mut ConfigStore) -> WriteReport {
        let mut report = WriteReport::default();

        for file in store.files_mut() {
            let content = file.render();
            let original = file.original();
            let unchanged = match original {
                Some(original) => original == content,
                None => content.is_empty(),
            };
            if unchanged {
                report.unchanged.push(file.path().to_path_buf());
                continue;
            }

            let (removed, added) = diff_lines(original.unwrap_or(""), &content);
            let change = FileChange {
                path: file.path().to_path_buf(),
                created: original.is_none(),
                removed,
                added,
            };

            if self.pretend {
                debug!("Would write {}", file.path().display());
                report.changed.push(change);
                continue;
            }

            match write_atomic(file.path(), &content, change.created) {
                Ok(()) => {
                    info!("Updated {}", file.path().display());
                    file.mark_written(content);
                    report.changed.push(change);
                }
                Err(e) => {
                    error!("Failed to write {}: {}", file.path().display(), e);
                    report.failed.push(ConfigError::write(file.path(), e));
                }
            }
        }

        report
    }
}

fn write_atomic(path: &Path, content: &str, create: bool) -> std::io::Result<()> {
    // symlinked files are updated in place at their target
    let target = if create {
        path.to_path_buf()
    } else {
        std::fs::canonicalize(path)?
    };
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if create {
        std::fs::create_dir_all(dir)?;
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;

    if create {
        set_new_file_permissions(tmp.path())?;
        tmp.persist_noclobber(&target).map_err(|e| e.error)?;
    } else {
        let permissions = std::fs::metadata(&target)?.permissions();
        std::fs::set_permissions(tmp.path(), permissions)?;
        tmp.persist(&target).map_err(|e| e.error)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_new_file_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_new_file_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Lines removed and added between two contents, after trimming the
/// common head and tail
pub fn diff_lines(old: &str, new: &str) -> (Vec<String>, Vec<String>) {
    let old: Vec<&str> = old.lines().collect();
    let new: Vec<&str> = new.lines().collect();

    let head = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let tail = old[head..]
        .iter()
        .rev()
        .zip(new[head..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let removed = old[head..old.len() - tail].iter().map(|s| s.to_string()).collect();
    let added = new[head..new.len() - tail].iter().map(|s| s.to_string()).collect();
    (removed, added)
}
