//! Immutable documentation snapshots.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::chunk::{chunk_markdown, DEFAULT_MAX_CHARS};
use crate::error::DocsError;
use crate::index::SearchIndex;
use crate::models::{ExtractedTree, SearchHit};

/// A fully-built, read-only view of the documentation: every file by path
/// plus a search index over their contents.
///
/// Snapshots are never mutated after [`DocsSnapshot::build`] returns.
#[derive(Debug, Default)]
pub struct DocsSnapshot {
    files: BTreeMap<String, String>,
    index: SearchIndex,
    fingerprint: String,
    total_bytes: u64,
}

impl DocsSnapshot {
    /// Build a snapshot from an extracted tree.
    ///
    /// Payloads are decoded as UTF-8; invalid sequences are replaced rather
    /// than rejected so one odd file cannot fail a whole update.
    pub fn build(tree: ExtractedTree) -> Result<Self, DocsError> {
        let total_bytes = tree.total_bytes();
        let mut hasher = Sha256::new();
        let mut files = BTreeMap::new();
        let mut chunks = Vec::new();

        for file in tree.into_files() {
            hasher.update(file.path.as_bytes());
            hasher.update([0u8]);
            hasher.update((file.data.len() as u64).to_le_bytes());
            hasher.update(&file.data);

            let text = match String::from_utf8(file.data) {
                Ok(text) => text,
                Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
            };
            chunks.extend(chunk_markdown(&file.path, &text, DEFAULT_MAX_CHARS));
            files.insert(file.path, text);
        }

        let index = SearchIndex::build(chunks)?;
        let fingerprint = format!("{:x}", hasher.finalize());
        tracing::debug!(
            files = files.len(),
            chunks = index.chunk_count(),
            terms = index.term_count(),
            "built docs snapshot"
        );

        Ok(Self {
            files,
            index,
            fingerprint,
            total_bytes,
        })
    }

    /// A snapshot with no documents.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Content of the document at `path`, if present.
    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// All document paths, sorted.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.index.search(query, limit)
    }

    /// SHA-256 over every path and payload, hex-encoded. Empty for
    /// [`DocsSnapshot::empty`].
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn chunk_count(&self) -> usize {
        self.index.chunk_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedFile;

    fn tree(files: &[(&str, &[u8])]) -> ExtractedTree {
        files
            .iter()
            .map(|(path, data)| ExtractedFile {
                path: path.to_string(),
                data: data.to_vec(),
            })
            .collect()
    }

    #[test]
    fn test_build_and_lookup() {
        let snap = DocsSnapshot::build(tree(&[
            ("querying/basics.md", b"# Querying basics\n\nPromQL selects time series."),
            ("introduction/overview.md", b"# Overview\n\nPrometheus is a monitoring system."),
        ]))
        .unwrap();

        assert_eq!(snap.len(), 2);
        assert_eq!(
            snap.file_names().collect::<Vec<_>>(),
            vec!["introduction/overview.md", "querying/basics.md"]
        );
        assert!(snap.file("querying/basics.md").unwrap().contains("PromQL"));
        assert!(snap.file("missing.md").is_none());
        assert_eq!(snap.fingerprint().len(), 64);
    }

    #[test]
    fn test_search_through_snapshot() {
        let snap = DocsSnapshot::build(tree(&[
            ("a.md", b"Alerting rules fire alerts."),
            ("b.md", b"Recording rules precompute expressions."),
        ]))
        .unwrap();
        let hits = snap.search("precompute", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "b.md");
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = DocsSnapshot::build(tree(&[("a.md", b"one")])).unwrap();
        let b = DocsSnapshot::build(tree(&[("a.md", b"one")])).unwrap();
        let c = DocsSnapshot::build(tree(&[("a.md", b"two")])).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let snap = DocsSnapshot::build(tree(&[("bin.md", b"ok \xff bytes")])).unwrap();
        assert_eq!(snap.file("bin.md"), Some("ok \u{fffd} bytes"));
    }

    #[test]
    fn test_empty() {
        let snap = DocsSnapshot::empty();
        assert!(snap.is_empty());
        assert_eq!(snap.fingerprint(), "");
        assert!(snap.search("anything", 5).is_empty());
    }
}
