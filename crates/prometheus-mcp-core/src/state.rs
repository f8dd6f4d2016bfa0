//! The single published documentation slot.
//!
//! Readers call [`DocsState::current`] and get an `Arc` to a complete
//! [`PublishedDocs`]; they never block on, or observe, an update in progress.
//! The updater replaces the whole value with [`DocsState::swap`].

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::snapshot::DocsSnapshot;

/// A snapshot together with the upstream commit it was built from.
#[derive(Debug)]
pub struct PublishedDocs {
    pub snapshot: Arc<DocsSnapshot>,
    /// Upstream commit hash. Empty when nothing has been applied yet.
    pub commit: String,
    /// When the update that produced this state finished. `None` for the
    /// embedded baseline.
    pub published_at: Option<DateTime<Utc>>,
}

impl PublishedDocs {
    pub fn new(snapshot: DocsSnapshot, commit: impl Into<String>) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            commit: commit.into(),
            published_at: None,
        }
    }

    pub fn published_now(mut self) -> Self {
        self.published_at = Some(Utc::now());
        self
    }
}

#[derive(Debug)]
pub struct DocsState {
    inner: ArcSwap<PublishedDocs>,
}

impl DocsState {
    pub fn new(initial: PublishedDocs) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    /// Lock-free read of the published state.
    pub fn current(&self) -> Arc<PublishedDocs> {
        self.inner.load_full()
    }

    pub fn snapshot(&self) -> Arc<DocsSnapshot> {
        Arc::clone(&self.inner.load().snapshot)
    }

    pub fn commit(&self) -> String {
        self.inner.load().commit.clone()
    }

    /// Publish `next` and return the state it replaced.
    pub fn swap(&self, next: PublishedDocs) -> Arc<PublishedDocs> {
        self.inner.swap(Arc::new(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedFile, ExtractedTree};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn snapshot_with(marker: &str, files: usize) -> DocsSnapshot {
        let tree: ExtractedTree = (0..files)
            .map(|i| ExtractedFile {
                path: format!("f{i}.md"),
                data: marker.as_bytes().to_vec(),
            })
            .collect();
        DocsSnapshot::build(tree).unwrap()
    }

    #[test]
    fn test_swap_returns_previous() {
        let state = DocsState::new(PublishedDocs::new(DocsSnapshot::empty(), "abc123"));
        assert_eq!(state.commit(), "abc123");
        assert!(state.current().published_at.is_none());

        let old = state.swap(PublishedDocs::new(snapshot_with("new", 1), "def456").published_now());
        assert_eq!(old.commit, "abc123");
        assert_eq!(state.commit(), "def456");
        assert!(state.current().published_at.is_some());
        assert_eq!(state.snapshot().len(), 1);
    }

    #[test]
    fn test_held_reference_survives_swap() {
        let state = DocsState::new(PublishedDocs::new(snapshot_with("old", 2), "a"));
        let held = state.snapshot();
        state.swap(PublishedDocs::new(snapshot_with("new", 3), "b"));
        assert_eq!(held.len(), 2);
        assert_eq!(held.file("f0.md"), Some("old"));
        assert_eq!(state.snapshot().len(), 3);
    }

    #[test]
    fn test_concurrent_readers_see_whole_states() {
        let state = Arc::new(DocsState::new(PublishedDocs::new(snapshot_with("old", 4), "old")));
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    let mut reads = 0u64;
                    while !stop.load(Ordering::Relaxed) || reads == 0 {
                        let current = state.current();
                        let expected = current.commit.as_str();
                        let files = if expected == "old" { 4 } else { 8 };
                        assert_eq!(current.snapshot.len(), files);
                        for name in current.snapshot.file_names() {
                            assert_eq!(current.snapshot.file(name), Some(expected));
                        }
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for round in 0..50 {
            let (marker, files) = if round % 2 == 0 { ("new", 8) } else { ("old", 4) };
            state.swap(PublishedDocs::new(snapshot_with(marker, files), marker));
        }
        stop.store(true, Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
    }
}
