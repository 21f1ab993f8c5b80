//! Operation records and the human-readable operation log.
//!
//! Every mutating batch produces one [`OperationRecord`]. The record is
//! returned to the caller and rendered into a timestamped log file next to
//! the files it describes.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Timestamp format shared by backup directories and log file names.
pub const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Delete,
    BatchDelete,
    Import,
}

impl OperationKind {
    fn describe(self) -> &'static str {
        match self {
            OperationKind::Insert => "bulk insert",
            OperationKind::Delete => "single delete",
            OperationKind::BatchDelete => "batch delete",
            OperationKind::Import => "import (replace)",
        }
    }
}

/// Why a file or an entry was left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    DuplicateLocalId,
    NotFound,
    FileNotFound,
    Unreadable(String),
    WriteFailed(String),
    ModifiedDuringBatch,
    UpToDate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DuplicateLocalId => write!(f, "duplicate local id"),
            SkipReason::NotFound => write!(f, "local id not found"),
            SkipReason::FileNotFound => write!(f, "file not found"),
            SkipReason::Unreadable(msg) => write!(f, "unreadable: {}", msg),
            SkipReason::WriteFailed(msg) => write!(f, "write failed: {}", msg),
            SkipReason::ModifiedDuringBatch => write!(f, "file modified during batch"),
            SkipReason::UpToDate => write!(f, "mappings already up to date"),
        }
    }
}

/// A skipped entry within a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySkip {
    pub local_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingChange {
    pub local_id: String,
    pub remote_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum FileOutcome {
    Updated,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub file_path: PathBuf,
    pub version_before: Option<u64>,
    pub version_after: Option<u64>,
    pub outcome: FileOutcome,
    pub added: Vec<MappingChange>,
    pub removed: Vec<MappingChange>,
    pub replaced: Vec<MappingChange>,
    /// Entries skipped in a file that may otherwise have been updated.
    pub skipped_entries: Vec<EntrySkip>,
}

impl FileReport {
    pub fn skipped(file_path: PathBuf, reason: SkipReason) -> Self {
        Self {
            file_path,
            version_before: None,
            version_after: None,
            outcome: FileOutcome::Skipped(reason),
            added: Vec::new(),
            removed: Vec::new(),
            replaced: Vec::new(),
            skipped_entries: Vec::new(),
        }
    }

    pub fn is_updated(&self) -> bool {
        self.outcome == FileOutcome::Updated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub timestamp: DateTime<Local>,
    pub summary: String,
    pub backup_dir: Option<PathBuf>,
    pub files: Vec<FileReport>,
    pub added_ids: BTreeSet<String>,
    pub removed_ids: BTreeSet<String>,
    /// Where the operation log was written, if writing succeeded.
    pub log_path: Option<PathBuf>,
}

impl OperationRecord {
    pub fn new(
        kind: OperationKind,
        timestamp: DateTime<Local>,
        summary: String,
        backup_dir: Option<PathBuf>,
        files: Vec<FileReport>,
    ) -> Self {
        let updated = || files.iter().filter(|f| f.is_updated());
        let added_ids = updated()
            .flat_map(|f| f.added.iter().chain(&f.replaced))
            .map(|m| m.local_id.clone())
            .collect();
        let removed_ids = updated()
            .flat_map(|f| &f.removed)
            .map(|m| m.local_id.clone())
            .collect();
        Self {
            kind,
            timestamp,
            summary,
            backup_dir,
            files,
            added_ids,
            removed_ids,
            log_path: None,
        }
    }

    pub fn updated_files(&self) -> impl Iterator<Item = &Path> {
        self.files
            .iter()
            .filter(|f| f.is_updated())
            .map(|f| f.file_path.as_path())
    }

    /// Every skip in the batch, file-level and entry-level, in file order.
    pub fn skips(&self) -> Vec<(&Path, Option<&str>, &SkipReason)> {
        let mut out = Vec::new();
        for file in &self.files {
            if let FileOutcome::Skipped(reason) = &file.outcome {
                out.push((file.file_path.as_path(), None, reason));
            }
            for skip in &file.skipped_entries {
                out.push((
                    file.file_path.as_path(),
                    Some(skip.local_id.as_str()),
                    &skip.reason,
                ));
            }
        }
        out
    }

    /// Renders the log text.
    pub fn render_log(&self) -> String {
        let rule = "=".repeat(80);
        let mut out = String::new();
        out.push_str(&format!(
            "{rule}\nOperation log - {}\n{rule}\n\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("Operation: {}\n", self.kind.describe()));
        match &self.backup_dir {
            Some(dir) => out.push_str(&format!("Backup: {}\n", dir.display())),
            None => out.push_str("Backup: none (nothing was written)\n"),
        }
        out.push_str(&format!("Summary: {}\n", self.summary));

        let versioned: Vec<_> = self.files.iter().filter(|f| f.is_updated()).collect();
        if !versioned.is_empty() {
            out.push_str("\nVersions:\n");
            for file in versioned {
                match (file.version_before, file.version_after) {
                    (Some(before), Some(after)) if before != after => out.push_str(&format!(
                        "  {}: {} -> {}\n",
                        file.file_path.display(),
                        before,
                        after
                    )),
                    _ => out.push_str(&format!(
                        "  {}: version unchanged\n",
                        file.file_path.display()
                    )),
                }
            }
        }

        render_changes(&mut out, "Added mappings", &self.files, |f| &f.added);
        render_changes(&mut out, "Replaced mappings", &self.files, |f| &f.replaced);
        render_changes(&mut out, "Removed mappings", &self.files, |f| &f.removed);

        let updated: Vec<_> = self.updated_files().collect();
        out.push_str(&format!("\nUpdated files ({}):\n", updated.len()));
        if updated.is_empty() {
            out.push_str("  none\n");
        }
        for path in updated {
            out.push_str(&format!("  - {}\n", path.display()));
        }

        let skips = self.skips();
        if !skips.is_empty() {
            let mut grouped: BTreeMap<(&Path, String), Vec<&str>> = BTreeMap::new();
            for (path, local_id, reason) in &skips {
                let ids = grouped.entry((*path, reason.to_string())).or_default();
                if let Some(id) = local_id {
                    ids.push(*id);
                }
            }
            out.push_str(&format!("\nSkipped ({}):\n", grouped.len()));
            for ((path, reason), ids) in grouped {
                out.push_str(&format!("  - {}\n    reason: {}\n", path.display(), reason));
                if !ids.is_empty() {
                    out.push_str(&format!("    ids: {}\n", ids.join(", ")));
                }
            }
        }

        out.push_str(&format!("\n{rule}\n"));
        out
    }

    /// Writes the log into `dir` as `operation_<stamp>.log`, adding a numeric
    /// suffix when a log with the same stamp already exists.
    pub fn write_log(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let stamp = self.timestamp.format(STAMP_FORMAT).to_string();
        let text = self.render_log();
        for n in 0.. {
            let name = if n == 0 {
                format!("operation_{}.log", stamp)
            } else {
                format!("operation_{}-{}.log", stamp, n)
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(text.as_bytes())?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        unreachable!("unbounded suffix search")
    }
}

fn render_changes(
    out: &mut String,
    title: &str,
    files: &[FileReport],
    pick: impl Fn(&FileReport) -> &Vec<MappingChange>,
) {
    let files: Vec<_> = files
        .iter()
        .filter(|f| f.is_updated() && !pick(f).is_empty())
        .collect();
    let total: usize = files.iter().map(|f| pick(f).len()).sum();
    if total == 0 {
        return;
    }
    out.push_str(&format!("\n{} ({}):\n", title, total));
    for file in files {
        out.push_str(&format!("  {}\n", file.file_path.display()));
        for change in pick(file) {
            out.push_str(&format!(
                "    - local {} | remote {}\n",
                change.local_id,
                change.remote_id.as_deref().unwrap_or("(none)")
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn change(local: &str, remote: Option<&str>) -> MappingChange {
        MappingChange {
            local_id: local.into(),
            remote_id: remote.map(Into::into),
        }
    }

    fn sample() -> OperationRecord {
        let timestamp = Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let updated = FileReport {
            file_path: PathBuf::from("/themes/theme.json"),
            version_before: Some(12),
            version_after: Some(13),
            outcome: FileOutcome::Updated,
            added: vec![change("200", Some("99"))],
            removed: Vec::new(),
            replaced: Vec::new(),
            skipped_entries: Vec::new(),
        };
        let unchanged_version = FileReport {
            file_path: PathBuf::from("/themes/theme_b.json"),
            version_before: None,
            version_after: None,
            ..updated.clone()
        };
        let skipped = FileReport {
            skipped_entries: vec![EntrySkip {
                local_id: "200".into(),
                reason: SkipReason::DuplicateLocalId,
            }],
            ..FileReport::skipped(
                PathBuf::from("/themes/theme_hd.json"),
                SkipReason::DuplicateLocalId,
            )
        };
        OperationRecord::new(
            OperationKind::Insert,
            timestamp,
            "insert 1 mapping(s)".into(),
            Some(PathBuf::from("/themes/backups/20260314-092653")),
            vec![updated, unchanged_version, skipped],
        )
    }

    #[test]
    fn collects_ids_from_updated_files_only() {
        let record = sample();
        assert_eq!(record.added_ids.iter().collect::<Vec<_>>(), vec!["200"]);
        assert!(record.removed_ids.is_empty());
        assert_eq!(record.updated_files().count(), 2);
        assert_eq!(record.skips().len(), 2);
    }

    #[test]
    fn renders_log() {
        insta::assert_snapshot!(sample().render_log(), @r"
        ================================================================================
        Operation log - 2026-03-14 09:26:53
        ================================================================================

        Operation: bulk insert
        Backup: /themes/backups/20260314-092653
        Summary: insert 1 mapping(s)

        Versions:
          /themes/theme.json: 12 -> 13
          /themes/theme_b.json: version unchanged

        Added mappings (2):
          /themes/theme.json
            - local 200 | remote 99
          /themes/theme_b.json
            - local 200 | remote 99

        Updated files (2):
          - /themes/theme.json
          - /themes/theme_b.json

        Skipped (1):
          - /themes/theme_hd.json
            reason: duplicate local id
            ids: 200

        ================================================================================
        ");
    }

    #[test]
    fn log_without_backup_or_updates() {
        let timestamp = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let record = OperationRecord::new(
            OperationKind::Delete,
            timestamp,
            "delete local id 7".into(),
            None,
            vec![FileReport::skipped(
                PathBuf::from("/t/theme.json"),
                SkipReason::NotFound,
            )],
        );
        let log = record.render_log();
        assert!(log.contains("Backup: none (nothing was written)"));
        assert!(log.contains("Updated files (0):\n  none\n"));
        assert!(log.contains("reason: local id not found"));
        assert!(!log.contains("Versions:"));
    }

    #[test]
    fn log_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample();
        let first = record.write_log(dir.path()).unwrap();
        let second = record.write_log(dir.path()).unwrap();
        assert_eq!(
            first.file_name().unwrap().to_str().unwrap(),
            "operation_20260314-092653.log"
        );
        assert_eq!(
            second.file_name().unwrap().to_str().unwrap(),
            "operation_20260314-092653-1.log"
        );
        assert_eq!(std::fs::read_to_string(first).unwrap(), record.render_log());
    }
}
