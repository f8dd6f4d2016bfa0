//! Tool extension point.
//!
//! Every tool, whether reached over MCP (stdio or streamable HTTP) or via
//! `POST /tools/{name}`, implements [`Tool`] and lives in one
//! [`ToolRegistry`]. Tools reach the docs state, the updater, and the
//! Prometheus client through [`ToolContext`].
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌──────────────┐  ┌──────────────────┐  │
//! │  │ docs_list    │  │ query            │  │
//! │  │ docs_read    │  │ range_query      │  │
//! │  │ docs_search  │  │ list_metrics     │  │
//! │  │ docs_refresh │  │                  │  │
//! │  └──────────────┘  └──────────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     McpBridge / POST /tools/{name}
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use prometheus_mcp_core::{DocsSnapshot, DocsState};

use crate::promapi::PrometheusClient;
use crate::tools::{
    DocsListTool, DocsReadTool, DocsRefreshTool, DocsSearchTool, ListMetricsTool, QueryTool,
    RangeQueryTool,
};
use crate::updater::DocsUpdater;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A tool that agents can discover and call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use prometheus_mcp::traits::{Tool, ToolContext};
///
/// pub struct DocsCountTool;
///
/// #[async_trait]
/// impl Tool for DocsCountTool {
///     fn name(&self) -> &str { "docs_count" }
///     fn description(&self) -> &str { "Number of documentation pages" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         Ok(json!({ "count": ctx.docs().len() }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, used as the MCP tool name and
    /// the `POST /tools/{name}` path.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether the tool only reads state. Defaults to `true`.
    fn read_only(&self) -> bool {
        true
    }

    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Shared handles given to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    state: Arc<DocsState>,
    updater: Option<Arc<DocsUpdater>>,
    prometheus: Arc<PrometheusClient>,
    shutdown: CancellationToken,
}

impl ToolContext {
    pub fn new(
        state: Arc<DocsState>,
        updater: Option<Arc<DocsUpdater>>,
        prometheus: Arc<PrometheusClient>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            updater,
            prometheus,
            shutdown,
        }
    }

    /// The currently published snapshot.
    pub fn docs(&self) -> Arc<DocsSnapshot> {
        self.state.snapshot()
    }

    pub fn state(&self) -> &Arc<DocsState> {
        &self.state
    }

    pub fn updater(&self) -> Option<&Arc<DocsUpdater>> {
        self.updater.as_ref()
    }

    pub fn prometheus(&self) -> &PrometheusClient {
        &self.prometheus
    }

    /// Fires on process shutdown.
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of every tool the server exposes.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry with the docs and query tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(DocsListTool));
        registry.register(Box::new(DocsReadTool));
        registry.register(Box::new(DocsSearchTool));
        registry.register(Box::new(DocsRefreshTool));
        registry.register(Box::new(QueryTool));
        registry.register(Box::new(RangeQueryTool));
        registry.register(Box::new(ListMetricsTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
