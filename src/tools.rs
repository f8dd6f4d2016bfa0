//! Built-in tools: documentation access and Prometheus query passthrough.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::promapi::{parse_duration, parse_timestamp};
use crate::traits::{Tool, ToolContext};
use crate::updater::UpdateOutcome;

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 100;
const DEFAULT_RANGE: Duration = Duration::from_secs(5 * 60);
const RANGE_QUERY_POINTS: f64 = 250.0;

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    let value = params[key].as_str().unwrap_or("").trim();
    if value.is_empty() {
        bail!("{} must not be empty", key);
    }
    Ok(value)
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params[key].as_str().map(str::trim).filter(|s| !s.is_empty())
}

// ═══════════════════════════════════════════════════════════════════════
// Documentation
// ═══════════════════════════════════════════════════════════════════════

/// Lists every document in the published snapshot.
pub struct DocsListTool;

#[async_trait]
impl Tool for DocsListTool {
    fn name(&self) -> &str {
        "docs_list"
    }

    fn description(&self) -> &str {
        "List the paths of all available Prometheus documentation files"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let current = ctx.state().current();
        let files: Vec<&str> = current.snapshot.file_names().collect();
        Ok(json!({
            "commit": current.commit,
            "published_at": current.published_at,
            "count": files.len(),
            "files": files,
        }))
    }
}

/// Returns one document by path.
pub struct DocsReadTool;

#[async_trait]
impl Tool for DocsReadTool {
    fn name(&self) -> &str {
        "docs_read"
    }

    fn description(&self) -> &str {
        "Read a Prometheus documentation file by path (as returned by docs_list)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file": { "type": "string", "description": "Document path, e.g. querying/basics.md" }
            },
            "required": ["file"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let file = required_str(&params, "file")?.trim_start_matches('/');
        let docs = ctx.docs();
        match docs.file(file) {
            Some(content) => Ok(json!({ "file": file, "content": content })),
            None => bail!("document not found: {}", file),
        }
    }
}

/// Ranked full-text search over the published snapshot.
pub struct DocsSearchTool;

#[async_trait]
impl Tool for DocsSearchTool {
    fn name(&self) -> &str {
        "docs_search"
    }

    fn description(&self) -> &str {
        "Search the Prometheus documentation and return the best matching files"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search terms" },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of files to return",
                    "default": DEFAULT_SEARCH_LIMIT,
                    "minimum": 1,
                    "maximum": MAX_SEARCH_LIMIT
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let limit = match params.get("limit").and_then(Value::as_i64) {
            None => DEFAULT_SEARCH_LIMIT,
            Some(n) if n >= 1 => (n as usize).min(MAX_SEARCH_LIMIT),
            Some(_) => bail!("limit must be >= 1"),
        };

        let current = ctx.state().current();
        let hits = current.snapshot.search(query, limit);
        Ok(json!({
            "query": query,
            "commit": current.commit,
            "results": hits,
        }))
    }
}

/// Runs one documentation update cycle on demand.
pub struct DocsRefreshTool;

#[async_trait]
impl Tool for DocsRefreshTool {
    fn name(&self) -> &str {
        "docs_refresh"
    }

    fn description(&self) -> &str {
        "Check upstream for newer Prometheus documentation and apply it"
    }

    fn read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let Some(updater) = ctx.updater() else {
            bail!("docs updates are disabled");
        };
        match updater.update(ctx.shutdown()).await? {
            UpdateOutcome::UpToDate { commit } => Ok(json!({
                "status": "up_to_date",
                "commit": commit,
            })),
            UpdateOutcome::Updated {
                old_commit,
                new_commit,
                files,
            } => Ok(json!({
                "status": "updated",
                "old_commit": old_commit,
                "new_commit": new_commit,
                "files": files,
            })),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Prometheus queries
// ═══════════════════════════════════════════════════════════════════════

/// Instant query passthrough.
pub struct QueryTool;

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &str {
        "query"
    }

    fn description(&self) -> &str {
        "Execute an instant PromQL query"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "PromQL expression" },
                "time": { "type": "string", "description": "Evaluation time (Unix seconds or RFC 3339), defaults to now" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let time = match optional_str(&params, "time") {
            Some(raw) => parse_timestamp(raw)?,
            None => Utc::now(),
        };
        let result = ctx.prometheus().query(query, time).await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// Range query passthrough.
pub struct RangeQueryTool;

#[async_trait]
impl Tool for RangeQueryTool {
    fn name(&self) -> &str {
        "range_query"
    }

    fn description(&self) -> &str {
        "Execute a PromQL query over a time range"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "PromQL expression" },
                "start": { "type": "string", "description": "Range start (Unix seconds or RFC 3339), defaults to end - 5m" },
                "end": { "type": "string", "description": "Range end (Unix seconds or RFC 3339), defaults to now" },
                "step": { "type": "string", "description": "Resolution, e.g. 15s or 1m; defaults to about 250 points" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&params, "query")?;
        let end = match optional_str(&params, "end") {
            Some(raw) => parse_timestamp(raw)?,
            None => Utc::now(),
        };
        let start = match optional_str(&params, "start") {
            Some(raw) => parse_timestamp(raw)?,
            None => end - chrono::Duration::from_std(DEFAULT_RANGE)?,
        };
        if start > end {
            bail!("start must not be after end");
        }
        let step = match optional_str(&params, "step") {
            Some(raw) => parse_duration(raw)?,
            None => default_step(end - start),
        };

        let result = ctx.prometheus().query_range(query, start, end, step).await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// Step that yields about [`RANGE_QUERY_POINTS`] samples, never under 1s.
fn default_step(range: chrono::Duration) -> Duration {
    let secs = (range.num_milliseconds() as f64 / 1000.0 / RANGE_QUERY_POINTS).floor();
    Duration::from_secs(secs.max(1.0) as u64)
}

/// Lists metric names known to Prometheus.
pub struct ListMetricsTool;

#[async_trait]
impl Tool for ListMetricsTool {
    fn name(&self) -> &str {
        "list_metrics"
    }

    fn description(&self) -> &str {
        "List all metric names known to the Prometheus server"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let result = ctx.prometheus().label_values("__name__").await?;
        Ok(serde_json::to_value(result)?)
    }
}
