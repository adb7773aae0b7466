//! Parsing of `ldapsearch -LLL` style responses into directory entries
//!
//! The response is a sequence of blocks, each introduced by a `dn:` line
//! and followed by `attribute: value` lines. Long lines are folded by the
//! producer: a newline followed by a single space continues the previous
//! line. Attributes are multi-valued, so a key seen twice within a block
//! collects both values in the order they appeared.

use serde::Serialize;
use std::collections::BTreeMap;

/// One directory entry: its distinguished name plus multi-valued attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Appends `value` to the list held under `key`
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// All values of `key`, empty when the attribute is absent
    pub fn values(&self, key: &str) -> &[String] {
        self.attributes
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First value of `key`
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }
}

/// Joins folded continuation lines back into single logical lines
pub fn unfold(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace("\n ", "")
}

/// Splits `key: value` on the first colon, trimming both sides
///
/// Base64 encoded values (`key:: value`) keep their encoded text.
fn split_attribute(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let value = value.strip_prefix(':').unwrap_or(value);
    Some((key.trim(), value.trim()))
}

/// Parses a raw search response into entries, in response order
///
/// Blocks without a distinguished name and lines that are not
/// `key: value` pairs are skipped. Parsing the same input twice always
/// yields equal output.
///
/// # Examples
///
/// ```
/// use bdiiq::ldif::parse;
///
/// let raw = "dn: GlueSALocalID=ops,o=grid\nGlueSAPath: /dpm/\n cern.ch/ops\n";
/// let entries = parse(raw);
/// assert_eq!(entries[0].values("GlueSAPath"), ["/dpm/cern.ch/ops"]);
/// ```
pub fn parse(raw: &str) -> Vec<DirectoryEntry> {
    let unfolded = unfold(raw);
    let mut entries = Vec::new();
    let mut current: Option<DirectoryEntry> = None;

    for line in unfolded.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = split_attribute(line) else {
            continue;
        };

        if key.eq_ignore_ascii_case("dn") {
            entries.extend(current.take().filter(|e| !e.dn.is_empty()));
            current = Some(DirectoryEntry::new(value));
            continue;
        }

        if let Some(entry) = current.as_mut() {
            if !key.is_empty() {
                entry.push(key, value);
            }
        }
    }
    entries.extend(current.filter(|e| !e.dn.is_empty()));

    entries
}
