//! Cross-file analysis of a scan.
//!
//! Groups mapping entries by local id across all files, flags groups whose
//! remote ids disagree, and lists remote ids claimed by more than one local
//! id. Everything here is a pure function of a [`ScanReport`].

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::scanner::{EntryStatus, MappingEntry, ScanReport};

/// One file's entry inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupedEntry {
    pub file_path: PathBuf,
    #[serde(flatten)]
    pub entry: MappingEntry,
}

/// All entries sharing a local id, across files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingGroup {
    pub local_id: String,
    pub entries: Vec<GroupedEntry>,
    /// Every entry has the same remote id (all absent counts as equal).
    pub consistent: bool,
}

impl MappingGroup {
    /// Distinct remote ids in the group; `None` stands for an absent remote id.
    pub fn remote_ids(&self) -> BTreeSet<Option<&str>> {
        self.entries
            .iter()
            .map(|e| e.entry.remote_id.as_deref())
            .collect()
    }
}

/// A remote id used by more than one local id somewhere in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedRemote {
    pub remote_id: String,
    pub local_ids: Vec<String>,
}

/// Summary statistics from a scan.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub total_entries: usize,
    pub duplicate_local: usize,
    pub duplicate_remote: usize,
    pub same_id: usize,
    pub groups: usize,
    pub inconsistent_groups: usize,
}

/// Complete analysis results.
#[derive(Debug, Serialize)]
pub struct Analysis {
    pub groups: Vec<MappingGroup>,
    pub shared_remotes: Vec<SharedRemote>,
    pub diagnostics: Diagnostics,
}

pub fn analyze(report: &ScanReport) -> Analysis {
    let groups = group_by_local_id(report);
    let diagnostics = diagnostics(report, &groups);
    Analysis {
        shared_remotes: shared_remote_ids(report),
        groups,
        diagnostics,
    }
}

/// Groups entries by local id, sorted by local id. Entries keep file order.
pub fn group_by_local_id(report: &ScanReport) -> Vec<MappingGroup> {
    let mut groups: BTreeMap<&str, Vec<GroupedEntry>> = BTreeMap::new();
    for file in &report.files {
        for entry in &file.mappings {
            groups
                .entry(entry.local_id.as_str())
                .or_default()
                .push(GroupedEntry {
                    file_path: file.file_path.clone(),
                    entry: entry.clone(),
                });
        }
    }

    groups
        .into_iter()
        .map(|(local_id, entries)| {
            let consistent = entries
                .windows(2)
                .all(|pair| pair[0].entry.remote_id == pair[1].entry.remote_id);
            MappingGroup {
                local_id: local_id.to_string(),
                entries,
                consistent,
            }
        })
        .collect()
}

/// Remote ids mapped from more than one distinct local id, in any file.
///
/// This complements the per-file `DuplicateRemote` status, which only looks
/// inside a single file.
pub fn shared_remote_ids(report: &ScanReport) -> Vec<SharedRemote> {
    let mut by_remote: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for entry in report.files.iter().flat_map(|f| &f.mappings) {
        if let Some(remote) = &entry.remote_id {
            by_remote
                .entry(remote.as_str())
                .or_default()
                .insert(entry.local_id.as_str());
        }
    }

    by_remote
        .into_iter()
        .filter(|(_, locals)| locals.len() > 1)
        .map(|(remote, locals)| SharedRemote {
            remote_id: remote.to_string(),
            local_ids: locals.into_iter().map(str::to_string).collect(),
        })
        .collect()
}

pub fn diagnostics(report: &ScanReport, groups: &[MappingGroup]) -> Diagnostics {
    let entries = || report.files.iter().flat_map(|f| &f.mappings);
    Diagnostics {
        files_scanned: report.files.len(),
        files_skipped: report.skipped.len(),
        total_entries: entries().count(),
        duplicate_local: entries()
            .filter(|e| e.status == EntryStatus::DuplicateLocal)
            .count(),
        duplicate_remote: entries()
            .filter(|e| e.status == EntryStatus::DuplicateRemote)
            .count(),
        same_id: entries().filter(|e| e.same_id).count(),
        groups: groups.len(),
        inconsistent_groups: groups.iter().filter(|g| !g.consistent).count(),
    }
}
