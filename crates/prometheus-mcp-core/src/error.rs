//! Error taxonomy for the documentation sync pipeline.
//!
//! Every stage returns a [`DocsError`]. The update controller wraps it in an
//! [`UpdateError`] tagged with the [`UpdateStage`] that failed. None of these
//! errors are fatal to the process; the previously published snapshot stays
//! in place whenever one is returned.

use std::fmt;
use std::io;

/// Failure of a single sync stage.
#[derive(Debug, thiserror::Error)]
pub enum DocsError {
    #[error("failed to query remote refs: {0}")]
    RemoteQuery(String),

    #[error("{reference} not found")]
    RefNotFound { reference: String },

    #[error("{}", download_message(.status, .message))]
    Download { status: Option<u16>, message: String },

    #[error("{0}")]
    SizeLimitExceeded(String),

    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    #[error("no markdown files found in archive")]
    EmptyArchive,

    #[error("failed to build search index: {0}")]
    IndexBuild(String),

    #[error("update cancelled")]
    Cancelled,
}

fn download_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("archive download returned status {}: {}", code, message),
        None => format!("archive download failed: {}", message),
    }
}

impl DocsError {
    /// Classify an I/O error raised while reading an archive stream.
    ///
    /// Errors that carry a [`StreamAbort`] keep their original cause; anything
    /// else is a decompression or tar framing problem.
    pub fn from_read_error(err: io::Error) -> Self {
        if let Some(abort) = err.get_ref().and_then(|e| e.downcast_ref::<StreamAbort>()) {
            return match abort {
                StreamAbort::TooLarge { limit } => DocsError::SizeLimitExceeded(format!(
                    "archive exceeds maximum size of {} bytes",
                    limit
                )),
                StreamAbort::Transport(msg) => DocsError::Download {
                    status: None,
                    message: msg.clone(),
                },
                StreamAbort::Cancelled => DocsError::Cancelled,
            };
        }
        DocsError::MalformedArchive(err.to_string())
    }
}

/// Reason a byte stream feeding the extractor stopped early.
///
/// Travels inside an [`io::Error`] through the gzip and tar readers so the
/// extractor can tell a hostile archive apart from a network failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamAbort {
    #[error("archive exceeds maximum size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("stream cancelled")]
    Cancelled,
}

impl From<StreamAbort> for io::Error {
    fn from(abort: StreamAbort) -> Self {
        io::Error::other(abort)
    }
}

/// Pipeline stage, used to tag failures and log progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    CheckingRemote,
    Downloading,
    Extracting,
    Indexing,
    Publishing,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateStage::CheckingRemote => "checking_remote",
            UpdateStage::Downloading => "downloading",
            UpdateStage::Extracting => "extracting",
            UpdateStage::Indexing => "indexing",
            UpdateStage::Publishing => "publishing",
        };
        f.write_str(s)
    }
}

/// A failed update cycle.
#[derive(Debug, thiserror::Error)]
#[error("docs update failed while {stage}: {source}")]
pub struct UpdateError {
    pub stage: UpdateStage,
    #[source]
    pub source: DocsError,
}

impl UpdateError {
    pub fn new(stage: UpdateStage, source: DocsError) -> Self {
        Self { stage, source }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, DocsError::Cancelled)
    }
}
