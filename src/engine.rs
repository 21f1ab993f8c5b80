//! Entry points for callers: one method per operation.
//!
//! The engine keeps no file state between calls; every method re-reads the
//! files it works on.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::analyzer::{self, Analysis};
use crate::backup::BackupSet;
use crate::batch::{BatchMutator, DeleteRequest, ImportMode, MappingInput};
use crate::config::Config;
use crate::error::Result;
use crate::exchange::{self, ImportedMapping};
use crate::report::OperationRecord;
use crate::scanner::{self, ScanReport};

#[derive(Debug, Clone)]
pub struct Engine {
    config: Config,
}

impl Engine {
    /// Validates `config` and builds an engine around it.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scan(&self, dir: &Path) -> Result<ScanReport> {
        let report = scanner::scan_directory(dir, &self.config)?;
        info!(
            files = report.files.len(),
            skipped = report.skipped.len(),
            "scan complete"
        );
        Ok(report)
    }

    /// Scans `dir` and groups its entries across files.
    pub fn analyze(&self, dir: &Path) -> Result<Analysis> {
        Ok(analyzer::analyze(&self.scan(dir)?))
    }

    pub fn bulk_insert(&self, dir: &Path, entries: &[MappingInput]) -> Result<OperationRecord> {
        self.mutator().bulk_insert(dir, entries)
    }

    pub fn delete_one(&self, file: &Path, local_id: &str) -> Result<OperationRecord> {
        self.mutator().delete_one(file, local_id)
    }

    pub fn batch_delete(&self, requests: &[DeleteRequest]) -> Result<OperationRecord> {
        self.mutator().batch_delete(requests)
    }

    pub fn export(&self, dir: &Path) -> Result<String> {
        Ok(exchange::export(&self.scan(dir)?, &self.config))
    }

    /// Parses an export document without touching any file.
    pub fn read_export(&self, text: &str) -> Result<Vec<ImportedMapping>> {
        exchange::import(text, &self.config)
    }

    pub fn import_replace(
        &self,
        dir: &Path,
        mappings: &[ImportedMapping],
        mode: ImportMode,
    ) -> Result<OperationRecord> {
        let raw: BTreeMap<String, String> = exchange::raw_values(mappings);
        self.mutator().import_replace(dir, &raw, mode)
    }

    pub fn backup(&self, dir: &Path) -> Result<BackupSet> {
        self.mutator().backup_directory(dir)
    }

    fn mutator(&self) -> BatchMutator<'_> {
        BatchMutator::new(&self.config)
    }
}
