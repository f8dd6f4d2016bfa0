//! In-memory inverted index with BM25 ranking.
//!
//! Built once per snapshot and never mutated. Postings are addressed with
//! `u32` chunk ordinals; a snapshot with more chunks than that is refused
//! with [`DocsError::IndexBuild`].
//!
//! Query terms are expanded against the vocabulary before scoring:
//!
//! | Match | Weight |
//! |-------|--------|
//! | exact token | 1.0 |
//! | query is a substring of the token | 0.6 |
//! | one edit away (query tokens of 4+ chars) | 0.5 |
//!
//! Each vocabulary term keeps its best weight. Queries with no indexable
//! tokens (e.g. `{}`) fall back to case-insensitive substring search.

use std::collections::HashMap;

use crate::chunk::Chunk;
use crate::error::DocsError;
use crate::models::SearchHit;

const K1: f64 = 1.2;
const B: f64 = 0.75;
const SUBSTRING_WEIGHT: f64 = 0.6;
const FUZZY_WEIGHT: f64 = 0.5;
const FUZZY_MIN_LEN: usize = 4;
const SNIPPET_CHARS: usize = 240;

#[derive(Debug, Clone, Copy)]
struct Posting {
    chunk: u32,
    tf: u32,
}

#[derive(Debug)]
struct IndexedChunk {
    id: String,
    path: String,
    text: String,
    len: u32,
}

/// Immutable search index over a set of chunks.
#[derive(Debug, Default)]
pub struct SearchIndex {
    chunks: Vec<IndexedChunk>,
    postings: HashMap<String, Vec<Posting>>,
    avg_len: f64,
}

impl SearchIndex {
    /// Index `chunks`, taking ownership of their text.
    pub fn build(chunks: Vec<Chunk>) -> Result<Self, DocsError> {
        if u32::try_from(chunks.len()).is_err() {
            return Err(DocsError::IndexBuild(format!(
                "{} chunks exceed the index capacity of {}",
                chunks.len(),
                u32::MAX
            )));
        }

        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut indexed = Vec::with_capacity(chunks.len());
        let mut total_len: u64 = 0;

        for (ordinal, chunk) in chunks.into_iter().enumerate() {
            let ordinal = ordinal as u32;
            let tokens = tokenize(&chunk.text);
            let len = u32::try_from(tokens.len()).map_err(|_| {
                DocsError::IndexBuild(format!("chunk {} has too many tokens", chunk.id))
            })?;
            total_len += u64::from(len);

            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push(Posting {
                    chunk: ordinal,
                    tf: count,
                });
            }

            indexed.push(IndexedChunk {
                id: chunk.id,
                path: chunk.path,
                text: chunk.text,
                len,
            });
        }

        let avg_len = if indexed.is_empty() {
            0.0
        } else {
            total_len as f64 / indexed.len() as f64
        };

        Ok(Self {
            chunks: indexed,
            postings,
            avg_len,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Rank documents for `query`, best first, at most `limit` hits.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        if limit == 0 || self.chunks.is_empty() {
            return Vec::new();
        }

        let mut tokens = tokenize(query);
        tokens.sort();
        tokens.dedup();

        let scores = if tokens.is_empty() {
            self.substring_scores(query)
        } else {
            self.bm25_scores(&tokens)
        };

        let mut best: HashMap<&str, (f64, u32)> = HashMap::new();
        for (ordinal, score) in scores {
            let path = self.chunks[ordinal as usize].path.as_str();
            let entry = best.entry(path).or_insert((score, ordinal));
            if score > entry.0 || (score == entry.0 && ordinal < entry.1) {
                *entry = (score, ordinal);
            }
        }

        let mut ranked: Vec<(&str, f64, u32)> = best
            .into_iter()
            .map(|(path, (score, ordinal))| (path, score, ordinal))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(b.0))
        });
        ranked.truncate(limit);

        let needles: Vec<String> = if tokens.is_empty() {
            vec![query.trim().to_ascii_lowercase()]
        } else {
            tokens
        };

        ranked
            .into_iter()
            .map(|(path, score, ordinal)| {
                let chunk = &self.chunks[ordinal as usize];
                SearchHit {
                    path: path.to_string(),
                    score,
                    chunk: chunk.id.clone(),
                    snippet: snippet(&chunk.text, &needles),
                }
            })
            .collect()
    }

    fn bm25_scores(&self, tokens: &[String]) -> HashMap<u32, f64> {
        let mut weights: HashMap<&str, f64> = HashMap::new();
        for token in tokens {
            for term in self.postings.keys() {
                let weight = if term == token {
                    1.0
                } else if term.contains(token.as_str()) {
                    SUBSTRING_WEIGHT
                } else if token.chars().count() >= FUZZY_MIN_LEN && within_one_edit(token, term) {
                    FUZZY_WEIGHT
                } else {
                    continue;
                };
                let slot = weights.entry(term.as_str()).or_insert(0.0);
                if weight > *slot {
                    *slot = weight;
                }
            }
        }

        let n = self.chunks.len() as f64;
        let mut scores: HashMap<u32, f64> = HashMap::new();
        for (term, weight) in weights {
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let df = list.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for posting in list {
                let len = f64::from(self.chunks[posting.chunk as usize].len);
                let tf = f64::from(posting.tf);
                let norm = if self.avg_len > 0.0 {
                    1.0 - B + B * len / self.avg_len
                } else {
                    1.0
                };
                let score = weight * idf * (tf * (K1 + 1.0)) / (tf + K1 * norm);
                *scores.entry(posting.chunk).or_insert(0.0) += score;
            }
        }
        scores
    }

    fn substring_scores(&self, query: &str) -> HashMap<u32, f64> {
        let needle = query.trim().to_lowercase();
        let mut scores = HashMap::new();
        if needle.is_empty() {
            return scores;
        }
        for (ordinal, chunk) in self.chunks.iter().enumerate() {
            let hits = chunk.text.to_lowercase().matches(needle.as_str()).count();
            if hits > 0 {
                scores.insert(ordinal as u32, hits as f64);
            }
        }
        scores
    }
}

/// Split text into lowercase index terms.
///
/// A term is a run of alphanumerics, `_` and `:`, with `:` trimmed from both
/// ends so that `rate:` and `rate` match while recording rule names such as
/// `job:http_requests:rate5m` stay whole.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .map(|raw| raw.trim_matches(':'))
        .filter(|raw| !raw.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// True when `a` and `b` differ by exactly one insertion, deletion or
/// substitution.
fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if long.len() - short.len() > 1 {
        return false;
    }

    let mut i = 0;
    let mut j = 0;
    let mut edits = 0;
    while i < short.len() && j < long.len() {
        if short[i] == long[j] {
            i += 1;
            j += 1;
            continue;
        }
        edits += 1;
        if edits > 1 {
            return false;
        }
        if short.len() == long.len() {
            i += 1;
        }
        j += 1;
    }
    edits += (long.len() - j) + (short.len() - i);
    edits == 1
}

/// Window of `text` around the first needle occurrence.
fn snippet(text: &str, needles: &[String]) -> String {
    let lower = text.to_ascii_lowercase();
    let found = needles
        .iter()
        .filter(|n| !n.is_empty())
        .filter_map(|n| lower.find(n.as_str()))
        .min()
        .unwrap_or(0);

    let start = floor_boundary(text, found.saturating_sub(SNIPPET_CHARS / 3));
    let end = floor_boundary(text, (start + SNIPPET_CHARS).min(text.len()));
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(text[start..end].trim());
    if end < text.len() {
        out.push_str("...");
    }
    out
}

fn floor_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
