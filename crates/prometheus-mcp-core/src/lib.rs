//! # prometheus-mcp core
//!
//! Synchronous building blocks of the documentation sync pipeline:
//! untrusted archive extraction, snapshot construction (file lookup plus a
//! BM25 search index), and the lock-free published-state container.
//!
//! This crate performs no network or filesystem I/O. Callers hand it a
//! [`std::io::Read`] over a gzip-compressed tar stream and get back a
//! [`snapshot::DocsSnapshot`] ready to publish through [`state::DocsState`].

pub mod chunk;
pub mod error;
pub mod extract;
pub mod index;
pub mod models;
pub mod snapshot;
pub mod state;

pub use error::{DocsError, StreamAbort, UpdateError, UpdateStage};
pub use extract::{extract_docs, ExtractConfig};
pub use models::{ExtractedFile, ExtractedTree, SearchHit};
pub use snapshot::DocsSnapshot;
pub use state::{DocsState, PublishedDocs};
