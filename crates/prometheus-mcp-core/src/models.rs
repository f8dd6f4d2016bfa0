//! Data types shared across the pipeline.

use std::collections::BTreeMap;

use serde::Serialize;

/// A single document accepted by the extractor.
///
/// `path` is relative to the documentation root, `/`-separated, and free of
/// `.`/`..` components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: String,
    pub data: Vec<u8>,
}

/// The closed set of files produced by one extraction, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTree {
    files: BTreeMap<String, Vec<u8>>,
    total_bytes: u64,
}

impl ExtractedTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, replacing an earlier entry with the same path.
    ///
    /// Archives may legally repeat a path; the last occurrence wins, as it
    /// would when unpacking to disk.
    pub fn insert(&mut self, file: ExtractedFile) {
        let len = file.data.len() as u64;
        if let Some(prev) = self.files.insert(file.path, file.data) {
            self.total_bytes -= prev.len() as u64;
        }
        self.total_bytes += len;
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of payload sizes currently held.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn into_files(self) -> impl Iterator<Item = ExtractedFile> {
        self.files
            .into_iter()
            .map(|(path, data)| ExtractedFile { path, data })
    }
}

impl FromIterator<ExtractedFile> for ExtractedTree {
    fn from_iter<I: IntoIterator<Item = ExtractedFile>>(iter: I) -> Self {
        let mut tree = ExtractedTree::new();
        for file in iter {
            tree.insert(file);
        }
        tree
    }
}

/// One ranked search result, grouped per document.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub score: f64,
    /// Chunk id (`path#n`) of the best-matching chunk.
    pub chunk: String,
    pub snippet: String,
}
