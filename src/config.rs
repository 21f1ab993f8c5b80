//! Engine configuration.
//!
//! Every setting has a default matching the theme files this tool was written
//! for, so a config file only needs to list what differs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codec::EntryCodec;
use crate::error::{Error, Result};

pub const DEFAULT_VALUE_TEMPLATE: &str = "com.ipanel.join.gw_ui_sdk.GwPortalFragment|intent://?es_tabId={id}&es_title=&es_focusStartColor=&es_focusEndColor=&es_focusImg=";

/// Placeholder replaced by the remote id when rendering a value.
pub const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Glob matched against file names in the target directory.
    pub file_pattern: String,
    /// Key of the object holding the mapping entries.
    pub section_key: String,
    /// Mapping keys are `key_prefix` followed by the local id.
    pub key_prefix: String,
    /// Marker preceding the remote id inside a mapping value.
    pub remote_marker: String,
    /// Value written for new entries; must contain `remote_marker` directly followed by `{id}`.
    pub value_template: String,
    /// Top-level numeric field incremented when a file is updated.
    pub version_key: String,
    pub bump_version: bool,
    /// Backup root, relative to the directory holding the touched files.
    pub backup_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_pattern: "theme*.json".to_string(),
            section_key: "sExtOptions".to_string(),
            key_prefix: "portal_frag_".to_string(),
            remote_marker: "es_tabId=".to_string(),
            value_template: DEFAULT_VALUE_TEMPLATE.to_string(),
            version_key: "version".to_string(),
            bump_version: false,
            backup_dir: "backups".to_string(),
        }
    }
}

impl Config {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(Error::Config("key_prefix must not be empty".into()));
        }
        if self.remote_marker.is_empty() {
            return Err(Error::Config("remote_marker must not be empty".into()));
        }
        let anchor = format!("{}{}", self.remote_marker, ID_PLACEHOLDER);
        if !self.value_template.contains(&anchor) {
            return Err(Error::Config(format!(
                "value_template must contain `{}`",
                anchor
            )));
        }
        if self.value_template.contains('"') || self.value_template.contains('\\') {
            return Err(Error::Config(
                "value_template must not contain quotes or backslashes".into(),
            ));
        }
        glob::Pattern::new(&self.file_pattern)
            .map_err(|e| Error::Config(format!("file_pattern: {}", e)))?;
        Ok(())
    }

    pub fn codec(&self) -> EntryCodec<'_> {
        EntryCodec::new(&self.key_prefix, &self.remote_marker, &self.value_template)
    }

    /// Compiled file-name pattern. Falls back to matching nothing if the
    /// pattern is invalid; [`Config::validate`] reports that case.
    pub fn file_matcher(&self) -> Option<glob::Pattern> {
        glob::Pattern::new(&self.file_pattern).ok()
    }
}
