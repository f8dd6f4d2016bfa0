//! Upstream change detection via `git ls-remote`.
//!
//! The lister returns the full ref map; [`latest_commit`] picks the tracked
//! branch out of it. A missing branch is an error, never "no change".

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use prometheus_mcp_core::DocsError;

/// Source of an upstream repository's reference list.
#[async_trait]
pub trait RefLister: Send + Sync {
    /// Fully-qualified ref name (`refs/heads/main`) to commit hash.
    async fn list_refs(&self, cancel: &CancellationToken) -> Result<HashMap<String, String>, DocsError>;
}

/// Runs `git ls-remote <url>`.
pub struct GitCliRefLister {
    url: String,
}

impl GitCliRefLister {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RefLister for GitCliRefLister {
    async fn list_refs(&self, cancel: &CancellationToken) -> Result<HashMap<String, String>, DocsError> {
        let child = Command::new("git")
            .args(["ls-remote", "--", &self.url])
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DocsError::RemoteQuery(format!("failed to execute 'git ls-remote'. Is git installed? {}", e))
            })?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DocsError::Cancelled),
            output = child.wait_with_output() => output
                .map_err(|e| DocsError::RemoteQuery(format!("git ls-remote failed: {}", e)))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocsError::RemoteQuery(format!(
                "git ls-remote exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ls_remote(&stdout)
    }
}

/// Parse `<hash>\t<ref>` lines.
pub fn parse_ls_remote(output: &str) -> Result<HashMap<String, String>, DocsError> {
    let mut refs = HashMap::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let Some((hash, name)) = line.split_once('\t') else {
            return Err(DocsError::RemoteQuery(format!("malformed ls-remote line: {:?}", line)));
        };
        let hash = hash.trim();
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DocsError::RemoteQuery(format!("malformed commit hash: {:?}", hash)));
        }
        refs.insert(name.trim().to_string(), hash.to_string());
    }
    Ok(refs)
}

/// `refs/heads/<branch>`.
pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

/// Commit hash of `branch` in `refs`.
pub fn latest_commit(refs: &HashMap<String, String>, branch: &str) -> Result<String, DocsError> {
    let reference = branch_ref(branch);
    refs.get(&reference)
        .cloned()
        .ok_or(DocsError::RefNotFound { reference })
}
