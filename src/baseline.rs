//! Documentation compiled into the binary, used as the cold-start state.

use prometheus_mcp_core::{extract_docs, DocsError, DocsSnapshot, ExtractConfig, PublishedDocs};

static BASELINE_ARCHIVE: &[u8] = include_bytes!("../assets/docs-baseline.tar.gz");
static BASELINE_COMMIT: &str = include_str!("../assets/docs-baseline.commit");

/// Commit the embedded archive was taken from.
pub fn baseline_commit() -> &'static str {
    BASELINE_COMMIT.trim()
}

/// Extract and index the embedded archive.
pub fn load_baseline(config: &ExtractConfig) -> Result<PublishedDocs, DocsError> {
    let tree = extract_docs(BASELINE_ARCHIVE, config)?;
    let snapshot = DocsSnapshot::build(tree)?;
    Ok(PublishedDocs::new(snapshot, baseline_commit()))
}

/// [`load_baseline`], or an empty snapshot with no tracked commit so that the
/// first update always fetches.
pub fn initial_docs(config: &ExtractConfig) -> PublishedDocs {
    match load_baseline(config) {
        Ok(docs) => {
            tracing::info!(
                commit = %docs.commit,
                files = docs.snapshot.len(),
                "loaded embedded docs baseline"
            );
            docs
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to load embedded docs baseline");
            PublishedDocs::new(DocsSnapshot::empty(), "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_loads() {
        let docs = load_baseline(&ExtractConfig::default()).unwrap();
        assert_eq!(docs.commit, baseline_commit());
        assert!(docs.published_at.is_none());
        assert!(docs.snapshot.file("querying/basics.md").is_some());
        assert!(docs.snapshot.file("README.md").is_none());
        assert!(!docs.snapshot.search("histogram", 5).is_empty());
    }

    #[test]
    fn test_baseline_commit_is_hex() {
        let commit = baseline_commit();
        assert_eq!(commit.len(), 40);
        assert!(commit.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_unusable_baseline_falls_back_to_empty() {
        let config = ExtractConfig {
            docs_dir: "nonexistent".into(),
            ..ExtractConfig::default()
        };
        let docs = initial_docs(&config);
        assert!(docs.snapshot.is_empty());
        assert_eq!(docs.commit, "");
    }
}
