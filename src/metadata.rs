//! `metadata.txt`: the document's key → value map.
//!
//! One `key: value` pair per line. Multi-valued fields are stored as a single
//! comma-separated value. Values never contain newlines; any that sneak in are
//! folded to spaces on write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name of the metadata map inside a document folder.
pub const METADATA_FILE: &str = "metadata.txt";

// Well-known keys written by the pipeline.
pub const TITLE: &str = "title";
pub const TITLE_IS_FILEPATH: &str = "title-is-original-filepath";
pub const MIME_TYPE: &str = "apparent-mime-type";
pub const SHA_HASH: &str = "sha-hash";
pub const PAGE_COUNT: &str = "page-count";
pub const SUMMARY: &str = "summary";
pub const PARAGRAPH_IDS: &str = "paragraph-ids";
pub const NO_TEXT: &str = "contains-no-text";
pub const BAD_TEXT_SCORE: &str = "bad-text-score";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    /// Set only if the key is absent.
    pub fn set_default(&mut self, key: &str, value: impl ToString) {
        if !self.0.contains_key(key) {
            self.0.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `other`, replacing existing values.
    pub fn extend(&mut self, other: &Metadata) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    /// Comma-separated values of `key`.
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn parse(text: &str) -> Self {
        let mut m = Self::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                if !key.is_empty() {
                    m.set(key, value.trim());
                }
            }
        }
        m
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (k, v) in self.iter() {
            let v = v.replace(['\r', '\n'], " ");
            out.push_str(&format!("{k}: {v}\n"));
        }
        out
    }

    /// Read a metadata file; a missing file is an empty map.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.render())
    }

    /// Merge `updates` into the file at `path`, creating it if needed.
    pub fn update_file(path: &Path, updates: &Metadata) -> std::io::Result<Metadata> {
        let mut current = Self::read(path)?;
        current.extend(updates);
        current.write(path)?;
        Ok(current)
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut m = Self::new();
        for (k, v) in iter {
            m.set(k, v);
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render() {
        let m = Metadata::parse("title: A: B\nauthors: x, y\n\nnot a pair\n");
        assert_eq!(m.get("title"), Some("A: B"));
        assert_eq!(m.values("authors"), vec!["x", "y"]);
        assert_eq!(m.len(), 2);
        assert_eq!(Metadata::parse(&m.render()), m);
    }

    #[test]
    fn newlines_folded_on_write() {
        let m: Metadata = [("summary", "one\ntwo")].into_iter().collect();
        assert_eq!(m.render(), "summary: one two\n");
    }

    #[test]
    fn update_file_merges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(METADATA_FILE);
        assert!(Metadata::read(&path).unwrap().is_empty());
        Metadata::update_file(&path, &[("a", "1"), ("b", "2")].into_iter().collect()).unwrap();
        let merged = Metadata::update_file(&path, &[("b", "3")].into_iter().collect()).unwrap();
        assert_eq!(merged.get("a"), Some("1"));
        assert_eq!(merged.get("b"), Some("3"));
    }
}
