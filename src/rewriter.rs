//! Format-preserving edits of the mapping section.
//!
//! Edits are collected as byte-range replacements against the original text
//! using the spans recorded by the scanner. Replacements are sorted by
//! position and applied in reverse order to preserve offset validity, so every
//! byte outside the edited ranges is carried over unchanged.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::dialect::{self, NodeKind, Span};
use crate::report::{EntrySkip, MappingChange, SkipReason};
use crate::scanner::{FileScan, ScanError, SectionLayout, scan_source};

/// Indentation added below the section's own line when no entry exists to copy from.
const INDENT_UNIT: &str = "  ";

/// A single text replacement with position information.
#[derive(Debug, Clone)]
struct Replacement {
    start: usize,
    end: usize,
    new_text: String,
    /// Insertion order; later inserts at the same offset land after earlier ones.
    seq: usize,
}

/// A set of non-overlapping replacements against one source text.
#[derive(Debug, Default)]
struct Patch {
    replacements: Vec<Replacement>,
}

impl Patch {
    fn replace(&mut self, start: usize, end: usize, new_text: impl Into<String>) {
        let seq = self.replacements.len();
        self.replacements.push(Replacement {
            start,
            end,
            new_text: new_text.into(),
            seq,
        });
    }

    fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    fn remove(&mut self, start: usize, end: usize) {
        self.replace(start, end, "");
    }

    fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Applies replacements from the end of the text towards the start.
    fn apply(mut self, content: &str) -> String {
        self.replacements
            .sort_by(|a, b| b.start.cmp(&a.start).then(b.seq.cmp(&a.seq)));

        let mut result = content.to_string();
        for rep in self.replacements {
            if rep.start <= result.len() && rep.end <= result.len() && rep.start <= rep.end {
                result.replace_range(rep.start..rep.end, &rep.new_text);
            }
        }
        result
    }
}

/// An entry to insert: the local id and the value text without quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub local_id: String,
    pub raw_value: String,
}

/// Result of editing one file's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub text: String,
    pub version_before: Option<u64>,
    pub version_after: Option<u64>,
    pub added: Vec<MappingChange>,
    pub removed: Vec<MappingChange>,
    pub replaced: Vec<MappingChange>,
    pub skipped: Vec<EntrySkip>,
}

impl FileEdit {
    pub fn changed(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.replaced.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBump {
    pub text: String,
    pub before: u64,
    pub after: u64,
}

/// Computes text edits for one theme file.
#[derive(Debug, Clone, Copy)]
pub struct TextPatcher<'a> {
    config: &'a Config,
}

impl<'a> TextPatcher<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Appends entries after the last member of the mapping section.
    ///
    /// Entries whose local id already exists in the file are skipped. All
    /// remaining entries are inserted in one edit.
    pub fn insert(&self, source: &str, entries: &[NewEntry]) -> Result<FileEdit, ScanError> {
        let scan = scan_source(source, self.config)?;
        let mut skipped = Vec::new();
        let mut pending = Vec::new();
        for entry in entries {
            if scan.claims(&entry.local_id) {
                skipped.push(EntrySkip {
                    local_id: entry.local_id.clone(),
                    reason: SkipReason::DuplicateLocalId,
                });
            } else {
                pending.push(entry.clone());
            }
        }

        let mut patch = Patch::default();
        self.insert_into(&mut patch, source, &scan.section, &pending);
        let edit = FileEdit {
            text: patch.apply(source),
            version_before: None,
            version_after: None,
            added: self.changes_for(&pending),
            removed: Vec::new(),
            replaced: Vec::new(),
            skipped,
        };
        Ok(self.finish(source, edit))
    }

    /// Removes every entry whose local id is listed, including its separator.
    /// Ids absent from the file are reported as skipped.
    pub fn delete(&self, source: &str, local_ids: &[String]) -> Result<FileEdit, ScanError> {
        let scan = scan_source(source, self.config)?;
        let targets: BTreeSet<&str> = local_ids.iter().map(String::as_str).collect();
        let skipped = targets
            .iter()
            .filter(|id| !scan.contains(id))
            .map(|id| EntrySkip {
                local_id: id.to_string(),
                reason: SkipReason::NotFound,
            })
            .collect();

        let (remove, removed) = select_members(&scan, |id| targets.contains(id));
        let mut patch = Patch::default();
        remove_members(&mut patch, source, &scan.section, &remove);
        let edit = FileEdit {
            text: patch.apply(source),
            version_before: None,
            version_after: None,
            added: Vec::new(),
            removed,
            replaced: Vec::new(),
            skipped,
        };
        Ok(self.finish(source, edit))
    }

    /// Applies imported mappings: values of existing local ids are replaced in
    /// place, missing ids are appended. With `prune`, entries whose local id is
    /// not imported are removed first.
    pub fn import(
        &self,
        source: &str,
        mappings: &BTreeMap<String, String>,
        prune: bool,
    ) -> Result<FileEdit, ScanError> {
        let mut current = Cow::Borrowed(source);
        let mut removed = Vec::new();

        if prune {
            let scan = scan_source(source, self.config)?;
            let (remove, entries) = select_members(&scan, |id| !mappings.contains_key(id));
            if !remove.is_empty() {
                let mut patch = Patch::default();
                remove_members(&mut patch, source, &scan.section, &remove);
                current = Cow::Owned(patch.apply(source));
                removed = entries;
            }
        }

        let scan = scan_source(&current, self.config)?;
        let codec = self.config.codec();
        let mut patch = Patch::default();
        let mut replaced = Vec::new();

        for located in &scan.entries {
            let Some(raw) = mappings.get(&located.entry.local_id) else {
                continue;
            };
            if *raw == located.entry.raw_value {
                continue;
            }
            let member = &scan.section.members[located.member];
            if let Some(inner) = member.value.string_inner() {
                patch.replace(inner.start, inner.end, raw.as_str());
                replaced.push(MappingChange {
                    local_id: located.entry.local_id.clone(),
                    remote_id: codec.extract_remote(raw),
                });
            }
        }

        // A prefixed key with a non-string value can be neither replaced nor
        // duplicated.
        let skipped = mappings
            .keys()
            .filter(|id| scan.claims(id) && !scan.contains(id))
            .map(|id| EntrySkip {
                local_id: id.to_string(),
                reason: SkipReason::DuplicateLocalId,
            })
            .collect();
        let missing: Vec<NewEntry> = mappings
            .iter()
            .filter(|(id, _)| !scan.claims(id))
            .map(|(id, raw)| NewEntry {
                local_id: id.clone(),
                raw_value: raw.clone(),
            })
            .collect();
        self.insert_into(&mut patch, &current, &scan.section, &missing);

        let text = if patch.is_empty() {
            current.into_owned()
        } else {
            patch.apply(&current)
        };
        let edit = FileEdit {
            text,
            version_before: None,
            version_after: None,
            added: self.changes_for(&missing),
            removed,
            replaced,
            skipped,
        };
        Ok(self.finish(source, edit))
    }

    /// Reads the top-level version field, if it holds a non-negative integer.
    pub fn read_version(&self, source: &str) -> Option<u64> {
        self.locate_version(source).map(|(_, value)| value)
    }

    /// Increments the top-level version field by one. Returns `None` when the
    /// file has no usable version field.
    pub fn bump_version(&self, source: &str) -> Option<VersionBump> {
        let (span, before) = self.locate_version(source)?;
        let after = before.checked_add(1)?;
        let mut patch = Patch::default();
        patch.replace(span.start, span.end, after.to_string());
        Some(VersionBump {
            text: patch.apply(source),
            before,
            after,
        })
    }

    fn locate_version(&self, source: &str) -> Option<(Span, u64)> {
        let doc = dialect::parse(source).ok()?;
        let member = doc.root_member(source, &self.config.version_key)?;
        let span = match member.value.kind {
            NodeKind::Scalar => member.value.span,
            NodeKind::String => member.value.string_inner()?,
            _ => return None,
        };
        let digits = span.slice(source);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((span, digits.parse().ok()?))
    }

    /// Fills in version numbers, bumping the version when the edit changed
    /// mappings and bumping is enabled.
    fn finish(&self, source: &str, mut edit: FileEdit) -> FileEdit {
        edit.version_before = self.read_version(source);
        edit.version_after = edit.version_before;
        if edit.changed() && self.config.bump_version {
            if let Some(bump) = self.bump_version(&edit.text) {
                edit.text = bump.text;
                edit.version_after = Some(bump.after);
            }
        }
        edit
    }

    fn changes_for(&self, entries: &[NewEntry]) -> Vec<MappingChange> {
        let codec = self.config.codec();
        entries
            .iter()
            .map(|e| MappingChange {
                local_id: e.local_id.clone(),
                remote_id: codec.extract_remote(&e.raw_value),
            })
            .collect()
    }

    /// Adds the replacements that append `entries` to the section, copying
    /// the indentation, key/value separator and trailing-comma style of the
    /// last existing member.
    fn insert_into(
        &self,
        patch: &mut Patch,
        source: &str,
        section: &SectionLayout,
        entries: &[NewEntry],
    ) {
        if entries.is_empty() {
            return;
        }
        let codec = self.config.codec();
        let nl = line_ending(source);
        let bare_keys = section
            .members
            .last()
            .is_some_and(|m| !m.key_span.slice(source).starts_with('"'));
        let render = |entry: &NewEntry, sep: &str| {
            let key = codec.key(&entry.local_id);
            if bare_keys && key.bytes().all(dialect::is_word_byte) {
                format!("{}{}\"{}\"", key, sep, entry.raw_value)
            } else {
                format!("\"{}\"{}\"{}\"", key, sep, entry.raw_value)
            }
        };

        let Some(last) = section.members.last() else {
            let base = line_indent(source, section.open);
            let indent = format!("{base}{INDENT_UNIT}");
            let body = entries
                .iter()
                .map(|e| format!("{indent}{}", render(e, ":")))
                .collect::<Vec<_>>()
                .join(&format!(",{nl}"));
            let ws_start = trailing_ws_start(source, section.open + 1, section.close);
            patch.replace(ws_start, section.close, format!("{nl}{body}{nl}{base}"));
            return;
        };

        let sep = last.separator(source);
        let sep = if is_plain_separator(sep) { sep } else { ":" };
        let trailing = last.comma.is_some();
        let anchor = last.comma.map_or(last.end(), |c| c + 1);
        if !trailing {
            patch.insert(last.end(), ",");
        }

        match line_break_after(source, anchor, section.close) {
            Some(pos) => {
                let indent = own_line_indent(source, last.start())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}{INDENT_UNIT}", line_indent(source, section.open)));
                let mut text = String::new();
                for (i, entry) in entries.iter().enumerate() {
                    text.push_str(nl);
                    text.push_str(&indent);
                    text.push_str(&render(entry, sep));
                    if i + 1 < entries.len() || trailing {
                        text.push(',');
                    }
                }
                patch.insert(pos, text);
            }
            None => {
                let body = entries
                    .iter()
                    .map(|e| render(e, sep))
                    .collect::<Vec<_>>()
                    .join(", ");
                let text = if trailing {
                    format!(" {body},")
                } else {
                    format!(" {body}")
                };
                patch.insert(anchor, text);
            }
        }
    }
}

/// Member indices and change records of the mapping entries matching `pick`.
fn select_members(
    scan: &FileScan,
    pick: impl Fn(&str) -> bool,
) -> (BTreeSet<usize>, Vec<MappingChange>) {
    let mut indices = BTreeSet::new();
    let mut changes = Vec::new();
    for located in &scan.entries {
        if pick(&located.entry.local_id) {
            indices.insert(located.member);
            changes.push(MappingChange {
                local_id: located.entry.local_id.clone(),
                remote_id: located.entry.remote_id.clone(),
            });
        }
    }
    (indices, changes)
}

/// Adds removals for the given members. Each member goes with its trailing
/// comma, and with its whole line when it sits alone on that line. If the
/// section had no trailing comma, the comma of the new last member is dropped.
fn remove_members(
    patch: &mut Patch,
    source: &str,
    section: &SectionLayout,
    remove: &BTreeSet<usize>,
) {
    let members = &section.members;
    for &index in remove {
        let member = &members[index];
        let end = member.comma.map_or(member.end(), |c| c + 1);
        let (start, end) = widen_to_line(source, member.start(), end);
        patch.remove(start, end);
    }

    let had_trailing = members.last().is_some_and(|m| m.comma.is_some());
    if had_trailing {
        return;
    }
    if let Some(last_kept) = (0..members.len()).rev().find(|i| !remove.contains(i)) {
        if last_kept + 1 != members.len() {
            if let Some(comma) = members[last_kept].comma {
                patch.remove(comma, comma + 1);
            }
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.bytes().all(|b| b == b' ' || b == b'\t')
}

fn line_start(source: &str, pos: usize) -> usize {
    source[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// Leading whitespace of the line containing `pos`.
fn line_indent(source: &str, pos: usize) -> &str {
    let start = line_start(source, pos);
    let line = &source[start..];
    let len = line.bytes().take_while(|b| *b == b' ' || *b == b'\t').count();
    &line[..len]
}

/// Indentation before `pos` when nothing else precedes it on its line.
fn own_line_indent(source: &str, pos: usize) -> Option<&str> {
    let prefix = &source[line_start(source, pos)..pos];
    is_blank(prefix).then_some(prefix)
}

/// Extends `start..end` to cover the full line, newline included, when the
/// range is the only non-blank content on it.
fn widen_to_line(source: &str, start: usize, end: usize) -> (usize, usize) {
    let Some(line_begin) = own_line_indent(source, start).map(|indent| start - indent.len()) else {
        return (start, end);
    };
    let bytes = source.as_bytes();
    let after = end + source[end..].bytes().take_while(|b| *b == b' ' || *b == b'\t').count();
    match bytes.get(after) {
        Some(b'\n') => (line_begin, after + 1),
        Some(b'\r') if bytes.get(after + 1) == Some(&b'\n') => (line_begin, after + 2),
        None => (line_begin, after),
        _ => (start, end),
    }
}

/// Offset of the line break ending the line that contains `from`, skipping
/// blanks and comments. `None` when other content follows on the same line.
fn line_break_after(source: &str, from: usize, limit: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut i = from;
    while i < limit {
        match bytes[i] {
            b' ' | b'\t' => i += 1,
            b'\n' => return Some(i),
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => return Some(i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let newline = i + source[i..limit].find('\n')?;
                return Some(if bytes[newline - 1] == b'\r' {
                    newline - 1
                } else {
                    newline
                });
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2 + source[i + 2..limit].find("*/")? + 2;
            }
            _ => return None,
        }
    }
    None
}

/// Start of the whitespace run ending at `end`, not going below `floor`.
fn trailing_ws_start(source: &str, floor: usize, end: usize) -> usize {
    let bytes = source.as_bytes();
    let mut idx = end;
    while idx > floor && bytes[idx - 1].is_ascii_whitespace() {
        idx -= 1;
    }
    idx
}

fn line_ending(source: &str) -> &'static str {
    if source.contains("\r\n") { "\r\n" } else { "\n" }
}

fn is_plain_separator(sep: &str) -> bool {
    sep.contains(':') && sep.bytes().all(|b| b == b':' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUE: &str = "Frag|intent://?es_tabId=";

    fn entry(local: &str, remote: &str) -> NewEntry {
        NewEntry {
            local_id: local.into(),
            raw_value: format!("{VALUE}{remote}"),
        }
    }

    fn ids(edit: &[MappingChange]) -> Vec<&str> {
        edit.iter().map(|c| c.local_id.as_str()).collect()
    }

    /// Asserts `after` equals `before` with only `added` spliced in somewhere.
    fn assert_only_addition(before: &str, after: &str) {
        let prefix = before
            .bytes()
            .zip(after.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        let suffix = before[prefix..]
            .bytes()
            .rev()
            .zip(after[prefix..].bytes().rev())
            .take_while(|(a, b)| a == b)
            .count();
        assert!(
            prefix + suffix >= before.len(),
            "edit removed original bytes:\n{before}\n---\n{after}"
        );
    }

    #[test]
    fn patch_applies_replacements_in_reverse() {
        let content = "{ a = 1; b = 22; }";
        let mut patch = Patch::default();
        patch.replace(6, 7, "111");
        patch.replace(13, 15, "2");
        assert_eq!(patch.apply(content), "{ a = 111; b = 2; }");
    }

    #[test]
    fn patch_inserts_at_same_offset_keep_order() {
        let mut patch = Patch::default();
        patch.insert(1, ",");
        patch.insert(1, " x");
        assert_eq!(patch.apply("ab"), "a, xb");
    }

    #[test]
    fn empty_patch_returns_original() {
        let content = "{ \"x\": 1 }";
        assert_eq!(Patch::default().apply(content), content);
    }

    #[test]
    fn inserts_after_last_entry_without_trailing_comma() {
        let source = "{\n  \"sExtOptions\": {\n    \"portal_frag_1\": \"Frag|intent://?es_tabId=1\"\n  }\n}\n";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("2", "20"), entry("3", "30")])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\n  \"sExtOptions\": {\n    \"portal_frag_1\": \"Frag|intent://?es_tabId=1\",\n    \"portal_frag_2\": \"Frag|intent://?es_tabId=20\",\n    \"portal_frag_3\": \"Frag|intent://?es_tabId=30\"\n  }\n}\n"
        );
        assert_eq!(ids(&edit.added), vec!["2", "3"]);
        assert_eq!(edit.added[0].remote_id.as_deref(), Some("20"));
        assert_only_addition(source, &edit.text);
    }

    #[test]
    fn insert_keeps_trailing_comma_style_and_comments() {
        let source = "{\"sExtOptions\": {\n\t\"portal_frag_1\":\"Frag|intent://?es_tabId=1\", // first\n\t// tail\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("2", "2")])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\"sExtOptions\": {\n\t\"portal_frag_1\":\"Frag|intent://?es_tabId=1\", // first\n\t\"portal_frag_2\":\"Frag|intent://?es_tabId=2\",\n\t// tail\n}}"
        );
        assert_only_addition(source, &edit.text);
    }

    #[test]
    fn insert_into_single_line_section() {
        let source = r#"{"sExtOptions": {"portal_frag_1": "Frag|intent://?es_tabId=1"}}"#;
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("2", "2")])
            .unwrap();
        assert_eq!(
            edit.text,
            r#"{"sExtOptions": {"portal_frag_1": "Frag|intent://?es_tabId=1", "portal_frag_2": "Frag|intent://?es_tabId=2"}}"#
        );
    }

    #[test]
    fn insert_into_empty_section() {
        let source = "{\n  \"sExtOptions\": {\n  },\n  \"x\": 1\n}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("1", "1"), entry("2", "2")])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\n  \"sExtOptions\": {\n    \"portal_frag_1\":\"Frag|intent://?es_tabId=1\",\n    \"portal_frag_2\":\"Frag|intent://?es_tabId=2\"\n  },\n  \"x\": 1\n}"
        );
    }

    #[test]
    fn insert_uses_crlf_when_file_does() {
        let source = "{\r\n  \"sExtOptions\": {\r\n    \"a\": 1\r\n  }\r\n}\r\n";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("9", "9")])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\r\n  \"sExtOptions\": {\r\n    \"a\": 1,\r\n    \"portal_frag_9\": \"Frag|intent://?es_tabId=9\"\r\n  }\r\n}\r\n"
        );
    }

    #[test]
    fn insert_skips_existing_local_ids() {
        let source = r#"{"sExtOptions": {"portal_frag_1": "Frag|intent://?es_tabId=1"}}"#;
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("1", "5")])
            .unwrap();
        assert!(!edit.changed());
        assert_eq!(edit.text, source);
        assert_eq!(
            edit.skipped,
            vec![EntrySkip {
                local_id: "1".into(),
                reason: SkipReason::DuplicateLocalId
            }]
        );
    }

    #[test]
    fn insert_skips_ids_held_by_non_string_values() {
        let source = "{\"sExtOptions\": {\n  \"portal_frag_1\": 5,\n  \"portal_frag_2\": \"es_tabId=2\"\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("1", "1")])
            .unwrap();
        assert!(!edit.changed());
        assert_eq!(edit.text, source);
        assert_eq!(edit.skipped[0].reason, SkipReason::DuplicateLocalId);
    }

    #[test]
    fn insert_copies_bare_key_style() {
        let source = "{sExtOptions: {\n  portal_frag_1: \"es_tabId=1\"\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("2", "2")])
            .unwrap();
        assert_eq!(
            edit.text,
            "{sExtOptions: {\n  portal_frag_1: \"es_tabId=1\",\n  portal_frag_2: \"Frag|intent://?es_tabId=2\"\n}}"
        );

        // Keys that would not lex as a bare word stay quoted.
        let odd = TextPatcher::new(&config)
            .insert(source, &[entry("a b", "3")])
            .unwrap();
        assert!(odd.text.contains("\n  \"portal_frag_a b\": \"Frag"));
        assert!(scan_source(&odd.text, &config).unwrap().contains("a b"));
    }

    #[test]
    fn insert_keeps_byte_order_mark() {
        let source = "\u{feff}{\"sExtOptions\": {\n  \"portal_frag_1\": \"es_tabId=1\"\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .insert(source, &[entry("2", "2")])
            .unwrap();
        assert!(edit.text.starts_with("\u{feff}{\"sExtOptions\""));
        assert_only_addition(source, &edit.text);
        assert_eq!(ids(&edit.added), vec!["2"]);
        assert!(scan_source(&edit.text, &config).unwrap().contains("2"));
    }

    #[test]
    fn deletes_middle_entry_with_its_line() {
        let source = "{\"sExtOptions\": {\n  // keep me\n  \"portal_frag_1\": \"es_tabId=1\",\n  \"portal_frag_2\": \"es_tabId=2\",\n  /* and me */\n  \"portal_frag_3\": \"es_tabId=3\"\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .delete(source, &["2".to_string()])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\"sExtOptions\": {\n  // keep me\n  \"portal_frag_1\": \"es_tabId=1\",\n  /* and me */\n  \"portal_frag_3\": \"es_tabId=3\"\n}}"
        );
        assert_eq!(ids(&edit.removed), vec!["2"]);
        assert_eq!(edit.removed[0].remote_id.as_deref(), Some("2"));
    }

    #[test]
    fn deleting_last_entry_drops_dangling_comma() {
        let source = "{\"sExtOptions\": {\n  \"portal_frag_1\": \"es_tabId=1\",\n  \"portal_frag_2\": \"es_tabId=2\"\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .delete(source, &["2".to_string()])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\"sExtOptions\": {\n  \"portal_frag_1\": \"es_tabId=1\"\n}}"
        );
        dialect::parse(&edit.text).unwrap();
    }

    #[test]
    fn deleting_with_trailing_comma_style_keeps_it() {
        let source = "{\"sExtOptions\": {\n  \"portal_frag_1\": \"es_tabId=1\",\n  \"portal_frag_2\": \"es_tabId=2\",\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .delete(source, &["2".to_string()])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\"sExtOptions\": {\n  \"portal_frag_1\": \"es_tabId=1\",\n}}"
        );
    }

    #[test]
    fn deletes_inline_entries() {
        let source = r#"{"sExtOptions": {"portal_frag_1": "a", "portal_frag_2": "b", "portal_frag_3": "c"}}"#;
        let config = Config::default();
        let patcher = TextPatcher::new(&config);
        let first = patcher.delete(source, &["1".to_string()]).unwrap();
        assert_eq!(
            first.text,
            r#"{"sExtOptions": { "portal_frag_2": "b", "portal_frag_3": "c"}}"#
        );
        let last = patcher.delete(source, &["3".to_string()]).unwrap();
        assert_eq!(
            last.text,
            r#"{"sExtOptions": {"portal_frag_1": "a", "portal_frag_2": "b" }}"#
        );
    }

    #[test]
    fn deletes_several_entries_in_one_edit() {
        let source = "{\"sExtOptions\": {\n  \"portal_frag_1\": \"a\",\n  \"title\": \"t\",\n  \"portal_frag_2\": \"b\",\n  \"portal_frag_3\": \"c\"\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .delete(source, &["2".to_string(), "3".to_string(), "9".to_string()])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\"sExtOptions\": {\n  \"portal_frag_1\": \"a\",\n  \"title\": \"t\"\n}}"
        );
        assert_eq!(ids(&edit.removed), vec!["2", "3"]);
        assert_eq!(
            edit.skipped,
            vec![EntrySkip {
                local_id: "9".into(),
                reason: SkipReason::NotFound
            }]
        );
    }

    #[test]
    fn deleting_duplicated_local_id_removes_all_copies() {
        let source = "{\"sExtOptions\": {\n  \"portal_frag_1\": \"a\",\n  \"portal_frag_1\": \"b\",\n  \"portal_frag_2\": \"c\"\n}}";
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .delete(source, &["1".to_string()])
            .unwrap();
        assert_eq!(
            edit.text,
            "{\"sExtOptions\": {\n  \"portal_frag_2\": \"c\"\n}}"
        );
        assert_eq!(edit.removed.len(), 2);
    }

    #[test]
    fn deleting_absent_id_is_a_noop() {
        let source = r#"{"sExtOptions": {"portal_frag_1": "a"}}"#;
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .delete(source, &["2".to_string()])
            .unwrap();
        assert!(!edit.changed());
        assert_eq!(edit.text, source);
        assert_eq!(edit.skipped.len(), 1);
    }

    #[test]
    fn bumps_bare_and_quoted_versions() {
        let config = Config::default();
        let patcher = TextPatcher::new(&config);
        let bare = patcher.bump_version("{ \"version\": 41, \"x\": {\"version\": 1} }").unwrap();
        assert_eq!(bare.text, "{ \"version\": 42, \"x\": {\"version\": 1} }");
        assert_eq!((bare.before, bare.after), (41, 42));
        let quoted = patcher.bump_version("{\"version\":\"9\"}").unwrap();
        assert_eq!(quoted.text, "{\"version\":\"10\"}");
    }

    #[test]
    fn missing_or_odd_version_is_not_bumped() {
        let config = Config::default();
        let patcher = TextPatcher::new(&config);
        assert!(patcher.bump_version("{\"x\": 1}").is_none());
        assert!(patcher.bump_version("{\"version\": \"1.2\"}").is_none());
        assert!(patcher.bump_version("{\"version\": -3}").is_none());
        assert!(patcher.bump_version("{\"version\": {}}").is_none());
    }

    #[test]
    fn version_bumps_once_per_edit_when_enabled() {
        let source = "{\"version\": 7, \"sExtOptions\": {}}";
        let enabled = Config {
            bump_version: true,
            ..Config::default()
        };
        let edit = TextPatcher::new(&enabled)
            .insert(source, &[entry("1", "1"), entry("2", "2")])
            .unwrap();
        assert_eq!((edit.version_before, edit.version_after), (Some(7), Some(8)));
        assert!(edit.text.starts_with("{\"version\": 8,"));

        let disabled = Config::default();
        let edit = TextPatcher::new(&disabled)
            .insert(source, &[entry("1", "1")])
            .unwrap();
        assert_eq!((edit.version_before, edit.version_after), (Some(7), Some(7)));
    }

    #[test]
    fn unchanged_file_keeps_version() {
        let source = "{\"version\": 7, \"sExtOptions\": {\"portal_frag_1\": \"x\"}}";
        let config = Config {
            bump_version: true,
            ..Config::default()
        };
        let edit = TextPatcher::new(&config)
            .delete(source, &["5".to_string()])
            .unwrap();
        assert_eq!(edit.text, source);
        assert_eq!(edit.version_after, Some(7));
    }

    #[test]
    fn import_replaces_values_in_place_and_appends_missing() {
        let source = "{\"sExtOptions\": {\n  \"portal_frag_1\": \"Frag|intent://?es_tabId=1\", // one\n  \"portal_frag_2\": \"Frag|intent://?es_tabId=2\"\n}}";
        let mappings = BTreeMap::from([
            ("1".to_string(), "Frag|intent://?es_tabId=11".to_string()),
            ("2".to_string(), "Frag|intent://?es_tabId=2".to_string()),
            ("3".to_string(), "Frag|intent://?es_tabId=3".to_string()),
        ]);
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .import(source, &mappings, false)
            .unwrap();
        assert_eq!(
            edit.text,
            "{\"sExtOptions\": {\n  \"portal_frag_1\": \"Frag|intent://?es_tabId=11\", // one\n  \"portal_frag_2\": \"Frag|intent://?es_tabId=2\",\n  \"portal_frag_3\": \"Frag|intent://?es_tabId=3\"\n}}"
        );
        assert_eq!(ids(&edit.replaced), vec!["1"]);
        assert_eq!(edit.replaced[0].remote_id.as_deref(), Some("11"));
        assert_eq!(ids(&edit.added), vec!["3"]);
        assert!(edit.removed.is_empty());
    }

    #[test]
    fn import_of_identical_mappings_changes_nothing() {
        let source = "{\"sExtOptions\": {\"portal_frag_1\": \"a\", \"portal_frag_2\": \"b\"}}";
        let mappings = BTreeMap::from([
            ("1".to_string(), "a".to_string()),
            ("2".to_string(), "b".to_string()),
        ]);
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .import(source, &mappings, false)
            .unwrap();
        assert!(!edit.changed());
        assert_eq!(edit.text, source);
    }

    #[test]
    fn import_with_prune_removes_unlisted_entries() {
        let source = "{\"sExtOptions\": {\n  \"title\": \"t\",\n  \"portal_frag_1\": \"a\",\n  \"portal_frag_2\": \"b\"\n}}";
        let mappings = BTreeMap::from([
            ("2".to_string(), "bb".to_string()),
            ("4".to_string(), "d".to_string()),
        ]);
        let config = Config::default();
        let edit = TextPatcher::new(&config)
            .import(source, &mappings, true)
            .unwrap();
        assert_eq!(
            edit.text,
            "{\"sExtOptions\": {\n  \"title\": \"t\",\n  \"portal_frag_2\": \"bb\",\n  \"portal_frag_4\": \"d\"\n}}"
        );
        assert_eq!(ids(&edit.removed), vec!["1"]);
        assert_eq!(ids(&edit.replaced), vec!["2"]);
        assert_eq!(ids(&edit.added), vec!["4"]);
    }

    #[test]
    fn import_leaves_ids_held_by_non_string_values() {
        let source = "{\"sExtOptions\": {\n  \"portal_frag_1\": null,\n  \"portal_frag_2\": \"b\"\n}}";
        let config = Config::default();
        let mappings: BTreeMap<String, String> = [("1", "a"), ("2", "b")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let edit = TextPatcher::new(&config)
            .import(source, &mappings, false)
            .unwrap();
        assert!(!edit.changed());
        assert_eq!(edit.text, source);
        assert_eq!(
            edit.skipped,
            vec![EntrySkip {
                local_id: "1".into(),
                reason: SkipReason::DuplicateLocalId
            }]
        );
    }

    #[test]
    fn fixture_insert_then_delete_restores_original() {
        let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/themes/theme.json");
        let source = std::fs::read_to_string(path).unwrap();
        let config = Config::default();
        let patcher = TextPatcher::new(&config);
        let (_, value) = config.codec().encode("200", "99").unwrap();
        let inserted = patcher
            .insert(
                &source,
                &[NewEntry {
                    local_id: "200".into(),
                    raw_value: value,
                }],
            )
            .unwrap();
        assert_only_addition(&source, &inserted.text);
        assert!(scan_source(&inserted.text, &config).unwrap().contains("200"));

        let deleted = patcher.delete(&inserted.text, &["200".to_string()]).unwrap();
        assert_eq!(deleted.text, source);
    }
}
