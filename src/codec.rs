//! Conversion between mapping key/value text and local/remote id pairs.

use crate::config::ID_PLACEHOLDER;
use crate::error::{Error, Result};

/// Characters that terminate the remote id inside a value.
const REMOTE_TERMINATORS: [char; 3] = ['&', '|', '"'];

/// Ids decoded from one mapping key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIds {
    pub local_id: String,
    pub remote_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct EntryCodec<'a> {
    key_prefix: &'a str,
    marker: &'a str,
    template: &'a str,
}

impl<'a> EntryCodec<'a> {
    pub fn new(key_prefix: &'a str, marker: &'a str, template: &'a str) -> Self {
        Self {
            key_prefix,
            marker,
            template,
        }
    }

    /// Returns `None` when `raw_key` is not a mapping key.
    pub fn decode(&self, raw_key: &str, raw_value: &str) -> Option<DecodedIds> {
        let local_id = raw_key.strip_prefix(self.key_prefix)?;
        Some(DecodedIds {
            local_id: local_id.to_string(),
            remote_id: self.extract_remote(raw_value),
        })
    }

    /// Finds `marker=token` in a value. The token ends at `&`, `|`, a quote or
    /// the end of the value.
    pub fn extract_remote(&self, raw_value: &str) -> Option<String> {
        let start = raw_value.find(self.marker)? + self.marker.len();
        let rest = &raw_value[start..];
        let end = rest.find(REMOTE_TERMINATORS).unwrap_or(rest.len());
        let token = rest[..end].trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    /// Renders the key and value text (without quotes) for a new entry.
    pub fn encode(&self, local_id: &str, remote_id: &str) -> Result<(String, String)> {
        validate_id(local_id)?;
        validate_id(remote_id)?;
        Ok((self.key(local_id), self.template.replace(ID_PLACEHOLDER, remote_id)))
    }

    pub fn key(&self, local_id: &str) -> String {
        format!("{}{}", self.key_prefix, local_id)
    }
}

/// Rejects ids that would corrupt the value string or the marker token.
pub fn validate_id(id: &str) -> Result<()> {
    let reason = if id.is_empty() {
        Some("id is empty")
    } else if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("id contains whitespace or control characters")
    } else if id.contains(['"', '\\']) {
        Some("id contains a quote or backslash")
    } else if id.contains(['&', '|']) {
        Some("id contains `&` or `|`")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidId {
            id: id.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn decodes_mapping_key_and_remote() {
        let config = Config::default();
        let codec = config.codec();
        let value = "com.x.Frag|intent://?es_tabId=55&es_title=";
        let ids = codec.decode("portal_frag_101", value).unwrap();
        assert_eq!(ids.local_id, "101");
        assert_eq!(ids.remote_id.as_deref(), Some("55"));
    }

    #[test]
    fn ignores_other_keys() {
        let config = Config::default();
        assert!(config.codec().decode("title", "x").is_none());
    }

    #[test]
    fn missing_marker_is_not_an_error() {
        let config = Config::default();
        let ids = config.codec().decode("portal_frag_7", "com.x.Frag").unwrap();
        assert_eq!(ids.local_id, "7");
        assert_eq!(ids.remote_id, None);
    }

    #[test]
    fn remote_token_terminators() {
        let config = Config::default();
        let codec = config.codec();
        assert_eq!(codec.extract_remote("es_tabId=1|rest").as_deref(), Some("1"));
        assert_eq!(codec.extract_remote("es_tabId=2\"").as_deref(), Some("2"));
        assert_eq!(codec.extract_remote("a?es_tabId=3").as_deref(), Some("3"));
        assert_eq!(codec.extract_remote("es_tabId=&x=1"), None);
        assert_eq!(codec.extract_remote("es_tabId= 4 &"), Some("4".to_string()));
    }

    #[test]
    fn encode_then_decode_recovers_ids() {
        let config = Config::default();
        let codec = config.codec();
        for (local, remote) in [("200", "99"), ("a-b_c", "X.1"), ("101", "101"), ("7", "中文")] {
            let (key, value) = codec.encode(local, remote).unwrap();
            let ids = codec.decode(&key, &value).unwrap();
            assert_eq!(ids.local_id, local);
            assert_eq!(ids.remote_id.as_deref(), Some(remote));
        }
    }

    #[test]
    fn encode_uses_template() {
        let config = Config::default();
        let (key, value) = config.codec().encode("200", "99").unwrap();
        assert_eq!(key, "portal_frag_200");
        assert!(value.starts_with("com.ipanel.join.gw_ui_sdk.GwPortalFragment|intent://?es_tabId=99&"));
    }

    #[test]
    fn rejects_ids_that_break_the_value() {
        let config = Config::default();
        let codec = config.codec();
        assert!(codec.encode("", "1").is_err());
        assert!(codec.encode("1", "a&b").is_err());
        assert!(codec.encode("1", "a|b").is_err());
        assert!(codec.encode("1 2", "3").is_err());
        assert!(codec.encode("1", "q\"").is_err());
    }
}
