//! Mutating operations over theme files.
//!
//! Every operation follows the same sequence:
//!
//! 1. **Plan**: read each file and compute its edit in memory (nothing written)
//! 2. **Backup**: snapshot the files about to change; failure aborts the batch
//! 3. **Edit**: write each file atomically, skipping files changed since planning
//! 4. **Log**: record the outcome and write the operation log
//!
//! Problems with a single file never abort the batch; they become a
//! [`SkipReason`] in that file's report.

use chrono::Local;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backup::{BackupManager, BackupSet};
use crate::codec::validate_id;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::report::{FileOutcome, FileReport, OperationKind, OperationRecord, SkipReason};
use crate::rewriter::{FileEdit, NewEntry, TextPatcher};
use crate::scanner::{ScanError, collect_theme_files};

/// A mapping to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingInput {
    pub local_id: String,
    pub remote_id: String,
}

/// One `(file, local id)` pair of a batch delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub file_path: PathBuf,
    pub local_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Replace present values and insert missing ids.
    #[default]
    Merge,
    /// Like `Merge`, and also remove entries whose local id is not imported.
    Prune,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Merge => write!(f, "merge"),
            ImportMode::Prune => write!(f, "prune"),
        }
    }
}

#[derive(Debug)]
enum Plan {
    Edit { source: String, edit: FileEdit },
    Skip(SkipReason),
}

#[derive(Debug)]
struct PlannedFile {
    path: PathBuf,
    plan: Plan,
}

#[derive(Debug)]
struct Batch {
    kind: OperationKind,
    request: String,
    /// Directory receiving the backup root and the operation log.
    work_dir: PathBuf,
    files: Vec<PlannedFile>,
    /// Back up every readable file instead of only the changed ones.
    backup_all: bool,
}

/// Runs mutating operations. The only writer of theme files.
#[derive(Debug, Clone, Copy)]
pub struct BatchMutator<'a> {
    config: &'a Config,
}

impl<'a> BatchMutator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Inserts `entries` into every theme file of `dir`. Files already holding
    /// a local id skip that entry; the rest are applied as one edit per file.
    pub fn bulk_insert(&self, dir: &Path, entries: &[MappingInput]) -> Result<OperationRecord> {
        let new_entries = self.prepare_inserts(entries)?;
        let files = collect_theme_files(dir, self.config)?;
        let patcher = TextPatcher::new(self.config);
        let planned = plan_each(&files, |source| patcher.insert(source, &new_entries));

        self.execute(Batch {
            kind: OperationKind::Insert,
            request: format!("insert {} mapping(s)", entries.len()),
            work_dir: dir.to_path_buf(),
            files: planned,
            backup_all: false,
        })
    }

    pub fn delete_one(&self, file: &Path, local_id: &str) -> Result<OperationRecord> {
        require_id(local_id)?;
        let ids = [local_id.to_string()];
        let patcher = TextPatcher::new(self.config);
        let planned = vec![PlannedFile {
            path: file.to_path_buf(),
            plan: plan_file(file, &|source: &str| patcher.delete(source, &ids)),
        }];

        self.execute(Batch {
            kind: OperationKind::Delete,
            request: format!("delete local id {} from {}", local_id, file.display()),
            work_dir: parent_dir(file),
            files: planned,
            backup_all: false,
        })
    }

    /// Deletes `(file, local id)` pairs, one combined edit per file. The
    /// backup and the log go to the directory of the first requested file.
    pub fn batch_delete(&self, requests: &[DeleteRequest]) -> Result<OperationRecord> {
        let Some(first) = requests.first() else {
            return Err(Error::EmptyRequest);
        };
        // Spellings of the same file share one edit.
        let mut by_file: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for request in requests {
            require_id(&request.local_id)?;
            let path = fs::canonicalize(&request.file_path)
                .unwrap_or_else(|_| request.file_path.clone());
            let ids = by_file.entry(path).or_default();
            if !ids.contains(&request.local_id) {
                ids.push(request.local_id.clone());
            }
        }

        let patcher = TextPatcher::new(self.config);
        let planned = by_file
            .iter()
            .map(|(path, ids)| PlannedFile {
                path: path.clone(),
                plan: plan_file(path, &|source: &str| patcher.delete(source, ids)),
            })
            .collect();

        self.execute(Batch {
            kind: OperationKind::BatchDelete,
            request: format!(
                "delete {} mapping(s) from {} file(s)",
                requests.len(),
                by_file.len()
            ),
            work_dir: parent_dir(&first.file_path),
            files: planned,
            backup_all: false,
        })
    }

    /// Applies `mappings` (local id to raw value) to every theme file of `dir`.
    /// Every readable file is backed up, even when nothing changes.
    pub fn import_replace(
        &self,
        dir: &Path,
        mappings: &BTreeMap<String, String>,
        mode: ImportMode,
    ) -> Result<OperationRecord> {
        if mappings.is_empty() {
            return Err(Error::EmptyRequest);
        }
        for (local_id, raw_value) in mappings {
            validate_id(local_id)?;
            validate_raw_value(local_id, raw_value)?;
        }

        let files = collect_theme_files(dir, self.config)?;
        let patcher = TextPatcher::new(self.config);
        let prune = mode == ImportMode::Prune;
        let planned = plan_each(&files, |source| patcher.import(source, mappings, prune));

        self.execute(Batch {
            kind: OperationKind::Import,
            request: format!("import {} mapping(s) ({})", mappings.len(), mode),
            work_dir: dir.to_path_buf(),
            files: planned,
            backup_all: true,
        })
    }

    /// Snapshots every theme file of `dir` without changing anything.
    pub fn backup_directory(&self, dir: &Path) -> Result<BackupSet> {
        let files = collect_theme_files(dir, self.config)?;
        if files.is_empty() {
            return Err(Error::Backup {
                dir: dir.to_path_buf(),
                message: "no theme files to back up".into(),
            });
        }
        self.backups(dir).snapshot(&files, Local::now())
    }

    fn backups(&self, work_dir: &Path) -> BackupManager {
        BackupManager::new(work_dir.join(&self.config.backup_dir))
    }

    fn prepare_inserts(&self, entries: &[MappingInput]) -> Result<Vec<NewEntry>> {
        if entries.is_empty() {
            return Err(Error::EmptyRequest);
        }
        let codec = self.config.codec();
        let mut seen = HashSet::new();
        entries
            .iter()
            .map(|input| {
                if !seen.insert(input.local_id.as_str()) {
                    return Err(Error::DuplicateRequest(input.local_id.clone()));
                }
                let (_, raw_value) = codec.encode(&input.local_id, &input.remote_id)?;
                Ok(NewEntry {
                    local_id: input.local_id.clone(),
                    raw_value,
                })
            })
            .collect()
    }

    fn execute(&self, batch: Batch) -> Result<OperationRecord> {
        self.execute_with(batch, write_atomic)
    }

    fn execute_with(&self, batch: Batch, write: WriteFn) -> Result<OperationRecord> {
        let timestamp = Local::now();
        let to_backup: Vec<PathBuf> = batch
            .files
            .iter()
            .filter(|f| match &f.plan {
                Plan::Edit { edit, .. } => batch.backup_all || edit.changed(),
                Plan::Skip(_) => false,
            })
            .map(|f| f.path.clone())
            .collect();

        let backup_dir = if to_backup.is_empty() {
            debug!("no file changes, skipping backup");
            None
        } else {
            let set = self.backups(&batch.work_dir).snapshot(&to_backup, timestamp)?;
            Some(set.backup_dir)
        };

        let reports: Vec<FileReport> = batch
            .files
            .into_iter()
            .map(|planned| apply_file(planned, write))
            .collect();
        let updated = reports.iter().filter(|r| r.is_updated()).count();
        let summary = format!(
            "{}; {} file(s) updated, {} skipped",
            batch.request,
            updated,
            reports.len() - updated
        );

        let mut record = OperationRecord::new(batch.kind, timestamp, summary, backup_dir, reports);
        match record.write_log(&batch.work_dir) {
            Ok(path) => {
                info!(log = %path.display(), "operation log written");
                record.log_path = Some(path);
            }
            Err(e) => {
                warn!(dir = %batch.work_dir.display(), error = %e, "failed to write operation log");
            }
        }
        Ok(record)
    }
}

fn plan_each<F>(files: &[PathBuf], edit: F) -> Vec<PlannedFile>
where
    F: Fn(&str) -> std::result::Result<FileEdit, ScanError> + Sync,
{
    files
        .par_iter()
        .map(|path| PlannedFile {
            path: path.clone(),
            plan: plan_file(path, &edit),
        })
        .collect()
}

fn plan_file<F>(path: &Path, edit: &F) -> Plan
where
    F: Fn(&str) -> std::result::Result<FileEdit, ScanError>,
{
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) if e.kind() == ErrorKind::NotFound => return Plan::Skip(SkipReason::FileNotFound),
        Err(e) => return Plan::Skip(SkipReason::Unreadable(e.to_string())),
    };
    match edit(&source) {
        Ok(edit) => {
            debug!(file = %path.display(), changed = edit.changed(), "planned edit");
            Plan::Edit { source, edit }
        }
        // `ScanError` already renders parse failures as "unreadable: ...",
        // so those keep only the inner message.
        Err(ScanError::Parse(e)) => Plan::Skip(SkipReason::Unreadable(e.to_string())),
        Err(other) => Plan::Skip(SkipReason::Unreadable(other.to_string())),
    }
}

fn apply_file(planned: PlannedFile, write: WriteFn) -> FileReport {
    let PlannedFile { path, plan } = planned;
    let (source, edit) = match plan {
        Plan::Edit { source, edit } => (source, edit),
        Plan::Skip(reason) => {
            warn!(file = %path.display(), %reason, "skipping file");
            return FileReport::skipped(path, reason);
        }
    };

    if !edit.changed() {
        let reason = edit
            .skipped
            .first()
            .map(|s| s.reason.clone())
            .unwrap_or(SkipReason::UpToDate);
        debug!(file = %path.display(), %reason, "nothing to write");
        return FileReport {
            version_before: edit.version_before,
            version_after: edit.version_before,
            skipped_entries: edit.skipped,
            ..FileReport::skipped(path, reason)
        };
    }

    match fs::read_to_string(&path) {
        Ok(current) if current == source => {}
        Ok(_) => {
            warn!(file = %path.display(), "file changed since planning, skipping");
            return FileReport::skipped(path, SkipReason::ModifiedDuringBatch);
        }
        Err(e) => return FileReport::skipped(path, SkipReason::Unreadable(e.to_string())),
    }

    if let Err(e) = write(&path, &edit.text) {
        warn!(file = %path.display(), error = %e, "write failed");
        return FileReport::skipped(path, SkipReason::WriteFailed(e.to_string()));
    }
    info!(
        file = %path.display(),
        added = edit.added.len(),
        removed = edit.removed.len(),
        replaced = edit.replaced.len(),
        "file updated"
    );

    FileReport {
        file_path: path,
        version_before: edit.version_before,
        version_after: edit.version_after,
        outcome: FileOutcome::Updated,
        added: edit.added,
        removed: edit.removed,
        replaced: edit.replaced,
        skipped_entries: edit.skipped,
    }
}

type WriteFn = fn(&Path, &str) -> std::io::Result<()>;

/// Writes through a temporary file in the same directory, then renames it
/// over `path`. Keeps the original file's permissions.
fn write_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    let dir = parent_dir(path);
    let permissions = fs::metadata(path)?.permissions();
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn require_id(local_id: &str) -> Result<()> {
    if local_id.is_empty() {
        return Err(Error::InvalidId {
            id: String::new(),
            reason: "id is empty",
        });
    }
    Ok(())
}

/// Imported values are written between quotes as-is, so they must already be
/// valid string contents.
fn validate_raw_value(local_id: &str, raw_value: &str) -> Result<()> {
    let mut chars = raw_value.chars();
    while let Some(c) = chars.next() {
        let reason = match c {
            '\\' if chars.next().is_none() => Some("value ends with a lone backslash"),
            '"' => Some("value contains an unescaped quote"),
            c if c.is_control() => Some("value contains control characters"),
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(Error::InvalidValue {
                local_id: local_id.to_string(),
                reason,
            });
        }
    }
    Ok(())
}
