//! Full-snapshot flushes with a backup redirect for locked targets.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::domain::AccumulatedRowSet;
use crate::infrastructure::TableStore;

/// Windows sharing / lock violations surface as raw OS errors
const LOCK_VIOLATION_CODES: &[i32] = &[32, 33];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Written(PathBuf),
    /// Target was locked; this flush went to the backup path
    Redirected(PathBuf),
    Failed(String),
}

impl FlushOutcome {
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// `data/out.csv` → `data/out_backup.csv`
pub fn backup_path(path: &Path) -> PathBuf {
    sibling_path(path, "_backup")
}

/// `data/out.csv` + `_lots` → `data/out_lots.csv`
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

fn is_locked(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|io_err| {
            io_err.kind() == io::ErrorKind::PermissionDenied
                || io_err
                    .raw_os_error()
                    .is_some_and(|code| LOCK_VIOLATION_CODES.contains(&code))
        })
}

pub struct PersistenceSink<'a> {
    store: &'a dyn TableStore,
}

impl<'a> PersistenceSink<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Self { store }
    }

    /// Writes every row; failures are reported, never raised
    pub fn flush(&self, rows: &AccumulatedRowSet, path: &Path) -> FlushOutcome {
        match self.store.write_rows(rows.rows(), path) {
            Ok(()) => {
                info!("Saved {} rows to {}", rows.len(), path.display());
                FlushOutcome::Written(path.to_path_buf())
            }
            Err(e) if is_locked(&e) => {
                let backup = backup_path(path);
                warn!(
                    "{} is locked (open in another program?); writing {} instead",
                    path.display(),
                    backup.display()
                );
                match self.store.write_rows(rows.rows(), &backup) {
                    Ok(()) => FlushOutcome::Redirected(backup),
                    Err(e) => {
                        error!("Backup write to {} failed: {:#}", backup.display(), e);
                        FlushOutcome::Failed(format!("{e:#}"))
                    }
                }
            }
            Err(e) => {
                error!("Failed to save {}: {:#}", path.display(), e);
                FlushOutcome::Failed(format!("{e:#}"))
            }
        }
    }
}
