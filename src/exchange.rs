//! Export and import of the whole mapping set as one document.
//!
//! The export document has the same shape as a theme file's mapping section:
//!
//! ```text
//! {
//!   "sExtOptions": {
//!     "portal_frag_101": "...es_tabId=55&...",
//!     ...
//!   }
//! }
//! ```
//!
//! so it can be read back with the same scanner.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::scanner::{ScanError, ScanReport, scan_source};

/// One mapping read from an export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedMapping {
    pub local_id: String,
    pub remote_id: Option<String>,
    pub raw_value: String,
}

/// Renders every distinct local id of `report` into one document. The first
/// occurrence in file order wins; values are copied verbatim.
pub fn export(report: &ScanReport, config: &Config) -> String {
    let codec = config.codec();
    let mut seen = HashSet::new();
    let lines: Vec<String> = report
        .files
        .iter()
        .flat_map(|file| &file.mappings)
        .filter(|entry| seen.insert(entry.local_id.as_str()))
        .map(|entry| {
            format!(
                "    \"{}\": \"{}\"",
                codec.key(&entry.local_id),
                entry.raw_value
            )
        })
        .collect();

    if lines.is_empty() {
        return format!("{{\n  \"{}\": {{}}\n}}\n", config.section_key);
    }
    format!(
        "{{\n  \"{}\": {{\n{}\n  }}\n}}\n",
        config.section_key,
        lines.join(",\n")
    )
}

/// Reads an export document. Keys without the mapping prefix are dropped;
/// a repeated local id keeps its first value.
pub fn import(text: &str, config: &Config) -> Result<Vec<ImportedMapping>> {
    let scan = scan_source(text, config).map_err(|e| match e {
        ScanError::Parse(source) => Error::Parse {
            what: "export document".into(),
            source,
        },
        ScanError::NoSection(key) => Error::MissingSection(key),
    })?;

    let mut seen = HashSet::new();
    Ok(scan
        .mappings()
        .into_iter()
        .filter(|m| seen.insert(m.local_id.clone()))
        .map(|m| ImportedMapping {
            local_id: m.local_id,
            remote_id: m.remote_id,
            raw_value: m.raw_value,
        })
        .collect())
}

/// Local id to raw value, the input of an import batch.
pub fn raw_values(mappings: &[ImportedMapping]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for mapping in mappings {
        out.entry(mapping.local_id.clone())
            .or_insert_with(|| mapping.raw_value.clone());
    }
    out
}
