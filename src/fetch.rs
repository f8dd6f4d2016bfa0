//! Bounded HTTP download of the documentation archive.
//!
//! The body is never buffered whole. [`HttpArchiveFetcher::fetch`] returns a
//! lazy byte stream wrapped in a counter that fails with
//! [`StreamAbort::TooLarge`] as soon as more than `max_bytes` have arrived,
//! whatever `Content-Length` claimed.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use prometheus_mcp_core::{DocsError, StreamAbort};

use crate::version::user_agent;

/// Maximum number of response body bytes quoted in a download error.
const ERROR_BODY_LIMIT: usize = 512;

/// Lazily-read archive body. Errors carry a [`StreamAbort`].
pub type ArchiveStream = BoxStream<'static, io::Result<Bytes>>;

#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<ArchiveStream, DocsError>;
}

pub struct HttpArchiveFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpArchiveFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<ArchiveStream, DocsError> {
        let request = self.client.get(url).send();
        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DocsError::Cancelled),
            response = request => response.map_err(|e| DocsError::Download {
                status: None,
                message: describe_error(&e),
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let mut body = Vec::new();
            while body.len() < ERROR_BODY_LIMIT {
                match response.chunk().await {
                    Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                    _ => break,
                }
            }
            body.truncate(ERROR_BODY_LIMIT);
            return Err(DocsError::Download {
                status: Some(status.as_u16()),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                return Err(DocsError::SizeLimitExceeded(format!(
                    "archive Content-Length {} exceeds maximum size of {} bytes",
                    declared, self.max_bytes
                )));
            }
        }

        let body = response.bytes_stream().map(|chunk| chunk.map_err(|e| describe_error(&e)));
        Ok(bounded(body, self.max_bytes))
    }
}

/// Render a reqwest error with its cause chain; timeouts always say so.
fn describe_error(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    if err.is_timeout() && !message.contains("timed out") {
        message.push_str(" (timed out)");
    }
    message
}

/// Fail the stream once more than `limit` bytes have passed through it.
pub fn bounded<S, E>(stream: S, limit: u64) -> ArchiveStream
where
    S: futures_util::Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display,
{
    let mut seen: u64 = 0;
    stream
        .map(move |chunk| {
            let chunk = chunk.map_err(|e| io::Error::from(StreamAbort::Transport(e.to_string())))?;
            seen += chunk.len() as u64;
            if seen > limit {
                return Err(StreamAbort::TooLarge { limit }.into());
            }
            Ok(chunk)
        })
        .boxed()
}
