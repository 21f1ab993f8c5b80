//! Timestamped backups of theme files.
//!
//! A backup is a directory `<root>/<YYYYMMDD-HHMMSS>` holding a copy of each
//! file an operation is about to touch. It is created completely or not at
//! all: if any copy fails, the partial directory is removed.

use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::report::STAMP_FORMAT;

/// A completed backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    pub backup_dir: PathBuf,
    /// Original path of each copied file, in copy order.
    pub original_paths: Vec<PathBuf>,
    /// Path of each copy inside `backup_dir`, parallel to `original_paths`.
    pub copies: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies `files` into a new backup directory named after `stamp`.
    pub fn snapshot(&self, files: &[PathBuf], stamp: DateTime<Local>) -> Result<BackupSet> {
        fs::create_dir_all(&self.root).map_err(|e| Error::Backup {
            dir: self.root.clone(),
            message: e.to_string(),
        })?;
        let backup_dir = self.create_unique_dir(&stamp.format(STAMP_FORMAT).to_string())?;

        match copy_all(files, &backup_dir) {
            Ok(copies) => {
                info!(dir = %backup_dir.display(), files = files.len(), "backup created");
                Ok(BackupSet {
                    backup_dir,
                    original_paths: files.to_vec(),
                    copies,
                })
            }
            Err(message) => {
                if let Err(e) = fs::remove_dir_all(&backup_dir) {
                    warn!(dir = %backup_dir.display(), error = %e, "failed to remove partial backup");
                }
                Err(Error::Backup {
                    dir: backup_dir,
                    message,
                })
            }
        }
    }

    /// Creates `<root>/<stamp>`, or `<root>/<stamp>-N` if that name is taken.
    fn create_unique_dir(&self, stamp: &str) -> Result<PathBuf> {
        for n in 0.. {
            let name = if n == 0 {
                stamp.to_string()
            } else {
                format!("{}-{}", stamp, n)
            };
            let dir = self.root.join(name);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(dir = %dir.display(), "backup directory exists, trying next suffix");
                }
                Err(e) => {
                    return Err(Error::Backup {
                        dir,
                        message: e.to_string(),
                    });
                }
            }
        }
        unreachable!("unbounded suffix search")
    }
}

/// Copies each file by name; files sharing a name get `.1`, `.2`, ... appended.
fn copy_all(files: &[PathBuf], backup_dir: &Path) -> std::result::Result<Vec<PathBuf>, String> {
    let mut used = HashSet::new();
    let mut copies = Vec::with_capacity(files.len());
    for file in files {
        let name = file
            .file_name()
            .ok_or_else(|| format!("{} has no file name", file.display()))?
            .to_string_lossy()
            .into_owned();
        let mut target_name = name.clone();
        let mut n = 1;
        while !used.insert(target_name.clone()) {
            target_name = format!("{}.{}", name, n);
            n += 1;
        }
        let target = backup_dir.join(&target_name);
        fs::copy(file, &target).map_err(|e| format!("{}: {}", file.display(), e))?;
        copies.push(target);
    }
    Ok(copies)
}
