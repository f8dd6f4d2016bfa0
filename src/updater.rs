//! Documentation sync controller.
//!
//! One cycle runs `checking_remote → downloading → extracting → indexing →
//! publishing`. Cycles are serialized by an async mutex: a second caller
//! waits, then re-checks and usually finds nothing to do. A failed or
//! cancelled cycle leaves [`DocsState`] untouched and bumps the failure
//! counter; failures log at `warn`, cancellations at `info`.
//!
//! Extraction and indexing run on the blocking pool. The download stream is
//! bridged into a synchronous reader so the archive is decompressed as it
//! arrives, with no intermediate buffer of the compressed body.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use prometheus_mcp_core::{
    extract_docs, DocsError, DocsSnapshot, DocsState, ExtractConfig, ExtractedTree, PublishedDocs,
    UpdateError, UpdateStage,
};

use crate::config::DocsConfig;
use crate::fetch::{ArchiveFetcher, HttpArchiveFetcher};
use crate::metrics::DocsMetrics;
use crate::remote::{latest_commit, GitCliRefLister, RefLister};

/// What a cycle needs to know about upstream.
#[derive(Debug, Clone)]
pub struct UpdaterSettings {
    pub archive_url: String,
    pub branch: String,
    pub extract: ExtractConfig,
    /// Bound on download plus extraction.
    pub http_timeout: Duration,
}

impl UpdaterSettings {
    pub fn from_config(docs: &DocsConfig) -> Self {
        Self {
            archive_url: docs.archive_url.clone(),
            branch: docs.branch.clone(),
            extract: docs.extract_config(),
            http_timeout: docs.http_timeout(),
        }
    }
}

/// Result of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate {
        commit: String,
    },
    Updated {
        old_commit: String,
        new_commit: String,
        files: usize,
    },
}

/// Upstream head compared with the published commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub tracked: String,
    pub latest: String,
}

impl RemoteStatus {
    pub fn changed(&self) -> bool {
        self.latest != self.tracked
    }
}

pub struct DocsUpdater {
    lock: Mutex<()>,
    state: Arc<DocsState>,
    refs: Arc<dyn RefLister>,
    fetcher: Arc<dyn ArchiveFetcher>,
    settings: UpdaterSettings,
    metrics: DocsMetrics,
}

impl DocsUpdater {
    pub fn new(
        state: Arc<DocsState>,
        refs: Arc<dyn RefLister>,
        fetcher: Arc<dyn ArchiveFetcher>,
        settings: UpdaterSettings,
        metrics: DocsMetrics,
    ) -> Self {
        Self {
            lock: Mutex::new(()),
            state,
            refs,
            fetcher,
            settings,
            metrics,
        }
    }

    /// Wire up `git ls-remote` and the HTTP fetcher from `[docs]`.
    pub fn from_config(
        docs: &DocsConfig,
        state: Arc<DocsState>,
        metrics: DocsMetrics,
    ) -> anyhow::Result<Self> {
        let fetcher = HttpArchiveFetcher::new(docs.http_timeout(), docs.max_archive_bytes)?;
        Ok(Self::new(
            state,
            Arc::new(GitCliRefLister::new(docs.repo_url.clone())),
            Arc::new(fetcher),
            UpdaterSettings::from_config(docs),
            metrics,
        ))
    }

    pub fn state(&self) -> &Arc<DocsState> {
        &self.state
    }

    /// Query upstream without downloading anything.
    pub async fn check(&self, cancel: &CancellationToken) -> Result<RemoteStatus, DocsError> {
        let refs = self.refs.list_refs(cancel).await?;
        Ok(RemoteStatus {
            tracked: self.state.commit(),
            latest: latest_commit(&refs, &self.settings.branch)?,
        })
    }

    /// Run one cycle.
    pub async fn update(&self, cancel: &CancellationToken) -> Result<UpdateOutcome, UpdateError> {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(UpdateError::new(UpdateStage::CheckingRemote, DocsError::Cancelled));
            }
            guard = self.lock.lock() => guard,
        };

        let result = self.run_cycle(cancel).await;
        if let Err(err) = &result {
            self.metrics.update_failures.inc();
            if err.is_cancelled() {
                info!(stage = %err.stage, "docs update cancelled");
            } else {
                warn!(stage = %err.stage, error = %err.source, "docs update failed");
            }
        }
        result
    }

    /// Tick every `interval`, starting immediately, until `cancel` fires.
    pub async fn run_periodic(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "starting periodic docs updates");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.update(&cancel).await {
                Ok(UpdateOutcome::UpToDate { commit }) => {
                    debug!(commit = %commit, "docs already up to date")
                }
                Ok(UpdateOutcome::Updated { .. }) => {}
                Err(err) if err.is_cancelled() => break,
                Err(_) => {}
            }
        }
        debug!("periodic docs updates stopped");
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<UpdateOutcome, UpdateError> {
        let tracked = self.state.commit();

        let refs = self
            .refs
            .list_refs(cancel)
            .await
            .map_err(|e| UpdateError::new(UpdateStage::CheckingRemote, e))?;
        let latest = latest_commit(&refs, &self.settings.branch)
            .map_err(|e| UpdateError::new(UpdateStage::CheckingRemote, e))?;

        if latest == tracked {
            return Ok(UpdateOutcome::UpToDate { commit: latest });
        }
        info!(old_commit = %tracked, new_commit = %latest, "docs update available");

        let tree = self.download_and_extract(cancel).await?;
        let files = tree.len();

        let snapshot = tokio::task::spawn_blocking(move || DocsSnapshot::build(tree))
            .await
            .map_err(|e| DocsError::IndexBuild(format!("indexing task failed: {}", e)))
            .and_then(|built| built)
            .map_err(|e| UpdateError::new(UpdateStage::Indexing, e))?;

        if cancel.is_cancelled() {
            return Err(UpdateError::new(UpdateStage::Publishing, DocsError::Cancelled));
        }

        let published = PublishedDocs::new(snapshot, latest.clone()).published_now();
        let published_at = published.published_at;
        let previous = self.state.swap(published);
        if let Some(at) = published_at {
            self.metrics
                .last_update_timestamp
                .set(at.timestamp_millis() as f64 / 1000.0);
        }

        info!(
            old_commit = %previous.commit,
            new_commit = %latest,
            files,
            "docs updated"
        );
        Ok(UpdateOutcome::Updated {
            old_commit: previous.commit.clone(),
            new_commit: latest,
            files,
        })
    }

    async fn download_and_extract(&self, cancel: &CancellationToken) -> Result<ExtractedTree, UpdateError> {
        let stream = self
            .fetcher
            .fetch(&self.settings.archive_url, cancel)
            .await
            .map_err(|e| UpdateError::new(UpdateStage::Downloading, e))?;

        // Ends the body stream when the cycle is cancelled, times out, or
        // returns, so the blocking reader below always sees EOF and exits.
        let stop = cancel.child_token();
        let _stop_on_exit = stop.clone().drop_guard();
        let stream = stream.take_until(stop.cancelled_owned()).boxed();

        let reader = SyncIoBridge::new(StreamReader::new(stream));
        let extract = self.settings.extract.clone();
        let task = tokio::task::spawn_blocking(move || extract_docs(reader, &extract));

        let timeout = self.settings.http_timeout;
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(UpdateError::new(UpdateStage::Downloading, DocsError::Cancelled));
            }
            joined = tokio::time::timeout(timeout, task) => joined,
        };

        let extracted = match joined {
            Err(_) => Err(DocsError::Download {
                status: None,
                message: format!("archive download timed out after {}s", timeout.as_secs()),
            }),
            Ok(Err(join_err)) => Err(DocsError::MalformedArchive(format!(
                "extraction task failed: {}",
                join_err
            ))),
            Ok(Ok(result)) => result,
        };

        extracted.map_err(|e| {
            let stage = match e {
                DocsError::Download { .. } | DocsError::Cancelled => UpdateStage::Downloading,
                _ => UpdateStage::Extracting,
            };
            UpdateError::new(stage, e)
        })
    }
}
