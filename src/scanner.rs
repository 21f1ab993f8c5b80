//! Theme file scanner.
//!
//! Collects `theme*.json` files from a directory (depth 1, sorted by name),
//! parses each with the loose dialect parser, and extracts the mapping entries
//! of the mapping section together with the byte spans the rewriter needs.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::dialect::{self, Member, ParseError};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Normal,
    DuplicateLocal,
    DuplicateRemote,
}

/// One mapping entry as found in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub local_id: String,
    pub remote_id: Option<String>,
    /// Inner text of the value string, exactly as written.
    pub raw_value: String,
    pub same_id: bool,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMapping {
    pub file_path: PathBuf,
    pub mappings: Vec<MappingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file_path: PathBuf,
    pub reason: String,
}

/// Result of scanning a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub files: Vec<FileMapping>,
    pub skipped: Vec<SkippedFile>,
}

/// Why a single file could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("unreadable: {0}")]
    Parse(#[from] ParseError),
    #[error("no `{0}` section")]
    NoSection(String),
}

/// Location of the mapping section inside a file.
#[derive(Debug, Clone)]
pub struct SectionLayout {
    /// Offset of the opening `{`.
    pub open: usize,
    /// Offset of the closing `}`.
    pub close: usize,
    /// Every member of the section, mapping or not, in source order.
    pub members: Vec<Member>,
}

/// A mapping entry together with the index of its member in the section.
#[derive(Debug, Clone)]
pub struct LocatedEntry {
    pub entry: MappingEntry,
    pub member: usize,
}

#[derive(Debug, Clone)]
pub struct FileScan {
    pub section: SectionLayout,
    pub entries: Vec<LocatedEntry>,
    /// Local ids of every prefixed key, whatever its value.
    pub claimed_ids: HashSet<String>,
}

impl FileScan {
    pub fn mappings(&self) -> Vec<MappingEntry> {
        self.entries.iter().map(|e| e.entry.clone()).collect()
    }

    pub fn contains(&self, local_id: &str) -> bool {
        self.entries.iter().any(|e| e.entry.local_id == local_id)
    }

    /// Whether any key of the section uses `local_id`, mapping or not.
    /// Inserting such an id would duplicate a key.
    pub fn claims(&self, local_id: &str) -> bool {
        self.claimed_ids.contains(local_id)
    }
}

/// Collects theme files directly inside `dir`, sorted by path.
pub fn collect_theme_files(dir: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::DirectoryNotFound(dir.to_path_buf()));
    }
    let Some(matcher) = config.file_matcher() else {
        return Err(Error::Config(format!(
            "invalid file pattern `{}`",
            config.file_pattern
        )));
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| Error::ReadDirectory {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.file_name().to_str().is_some_and(|name| matcher.matches(name))
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Scans one file's text for mapping entries.
///
/// The first object-valued member named `section_key` (depth-first) is the
/// mapping section. Members whose key lacks the mapping prefix, or whose value
/// is not a string, are ignored.
pub fn scan_source(source: &str, config: &Config) -> Result<FileScan, ScanError> {
    let doc = dialect::parse(source)?;
    let sections = doc.find_objects(source, &config.section_key);
    let Some(section) = sections.first() else {
        return Err(ScanError::NoSection(config.section_key.clone()));
    };
    if sections.len() > 1 {
        warn!(
            count = sections.len(),
            "multiple `{}` sections, using the first", config.section_key
        );
    }

    let members = section.value.members().unwrap_or_default().to_vec();
    let codec = config.codec();
    let mut entries = Vec::new();
    let mut claimed_ids = HashSet::new();

    for (index, member) in members.iter().enumerate() {
        if let Some(local_id) = member.key(source).strip_prefix(config.key_prefix.as_str()) {
            claimed_ids.insert(local_id.to_string());
        }
        let Some(inner) = member.value.string_inner() else {
            continue;
        };
        let raw_value = inner.slice(source);
        let Some(ids) = codec.decode(member.key(source), raw_value) else {
            continue;
        };
        let same_id = ids.remote_id.as_deref() == Some(ids.local_id.as_str());
        entries.push(LocatedEntry {
            entry: MappingEntry {
                local_id: ids.local_id,
                remote_id: ids.remote_id,
                raw_value: raw_value.to_string(),
                same_id,
                status: EntryStatus::Normal,
            },
            member: index,
        });
    }

    classify(entries.iter_mut().map(|e| &mut e.entry));

    let section = SectionLayout {
        open: section.value.span.start,
        close: section.value.span.end - 1,
        members,
    };
    Ok(FileScan {
        section,
        entries,
        claimed_ids,
    })
}

/// Marks duplicate local ids and duplicate remote ids within one file.
/// A duplicate local id takes precedence over a duplicate remote id.
pub fn classify<'e>(entries: impl Iterator<Item = &'e mut MappingEntry>) {
    let entries: Vec<&mut MappingEntry> = entries.collect();
    let mut local_counts: HashMap<String, usize> = HashMap::new();
    let mut remote_counts: HashMap<String, usize> = HashMap::new();

    for entry in &entries {
        *local_counts.entry(entry.local_id.clone()).or_default() += 1;
        if let Some(remote) = &entry.remote_id {
            *remote_counts.entry(remote.clone()).or_default() += 1;
        }
    }

    for entry in entries {
        let local = local_counts.get(&entry.local_id).copied().unwrap_or(0);
        let remote = entry
            .remote_id
            .as_ref()
            .and_then(|r| remote_counts.get(r).copied())
            .unwrap_or(0);
        entry.status = if local > 1 {
            EntryStatus::DuplicateLocal
        } else if remote > 1 {
            EntryStatus::DuplicateRemote
        } else {
            EntryStatus::Normal
        };
    }
}

/// Reads and scans one file.
pub fn scan_file(path: &Path, config: &Config) -> Result<(String, FileScan), String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("failed to read: {}", e))?;
    let scan = scan_source(&source, config).map_err(|e| e.to_string())?;
    Ok((source, scan))
}

/// Scans every theme file in `dir`. Files are scanned in parallel; the report
/// keeps file-name order. Files that cannot be scanned are listed as skipped.
pub fn scan_directory(dir: &Path, config: &Config) -> Result<ScanReport> {
    let files = collect_theme_files(dir, config)?;
    debug!(dir = %dir.display(), count = files.len(), "scanning theme files");

    let results: Vec<_> = files
        .par_iter()
        .map(|path| {
            scan_file(path, config).map(|(_, scan)| FileMapping {
                file_path: path.clone(),
                mappings: scan.mappings(),
            })
        })
        .collect();

    let mut report = ScanReport::default();
    for (path, result) in files.into_iter().zip(results) {
        match result {
            Ok(mapping) => report.files.push(mapping),
            Err(reason) => {
                warn!(file = %path.display(), %reason, "skipping file");
                report.skipped.push(SkippedFile {
                    file_path: path,
                    reason,
                });
            }
        }
    }
    Ok(report)
}
