//! MCP JSON-RPC bridge.
//!
//! Exposes the [`ToolRegistry`] as MCP tools and the published docs as MCP
//! resources. The same bridge serves the stdio transport and the streamable
//! HTTP endpoint at `/mcp`; each HTTP session gets a clone (everything is
//! behind `Arc`).
//!
//! | URI | Content |
//! |-----|---------|
//! | `prometheus://docs` | Newline-separated document paths |
//! | `prometheus://docs/{+file}` | One markdown document |

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};

use crate::metrics::Metrics;
use crate::traits::{ToolContext, ToolRegistry};
use crate::version::VERSION;

const RESOURCE_SCHEME: &str = "prometheus";
const DOCS_LIST_URI: &str = "prometheus://docs";
const DOCS_FILE_TEMPLATE: &str = "prometheus://docs/{+file}";

#[derive(Clone)]
pub struct McpBridge {
    tools: Arc<ToolRegistry>,
    ctx: ToolContext,
    metrics: Arc<Metrics>,
}

impl McpBridge {
    pub fn new(tools: Arc<ToolRegistry>, ctx: ToolContext, metrics: Arc<Metrics>) -> Self {
        Self { tools, ctx, metrics }
    }

    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        let input_schema = match tool.parameters_schema() {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(tool.read_only())),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    /// Resolve a `prometheus://docs[/<file>]` URI against the published snapshot.
    fn read_docs_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let parsed = Url::parse(uri).map_err(|e| {
            McpError::invalid_params(format!("invalid resource URI {}: {}", uri, e), None)
        })?;
        if parsed.scheme() != RESOURCE_SCHEME || parsed.host_str() != Some("docs") {
            return Err(McpError::resource_not_found(
                format!("unknown resource: {}", uri),
                None,
            ));
        }

        let current = self.ctx.state().current();
        let file = parsed.path().trim_start_matches('/');
        if file.is_empty() {
            if parsed.path() == "/" {
                return Err(McpError::invalid_params(
                    "at least 1 filename is required when requesting docs to read",
                    None,
                ));
            }
            let names: Vec<&str> = current.snapshot.file_names().collect();
            return Ok(ReadResourceResult {
                contents: vec![ResourceContents::TextResourceContents {
                    uri: uri.to_string(),
                    mime_type: Some("text/plain".to_string()),
                    text: names.join("\n"),
                    meta: None,
                }],
            });
        }

        match current.snapshot.file(file) {
            Some(content) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::TextResourceContents {
                    uri: uri.to_string(),
                    mime_type: Some("text/markdown".to_string()),
                    text: content.to_string(),
                    meta: None,
                }],
            }),
            None => Err(McpError::resource_not_found(
                format!("document not found: {}", file),
                None,
            )),
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "prometheus-mcp".to_string(),
                title: Some("Prometheus MCP".to_string()),
                version: VERSION.to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Query a Prometheus server and read the Prometheus documentation. \
                 Use query, range_query and list_metrics for live data; docs_search, \
                 docs_list and docs_read (or the prometheus://docs resources) for \
                 reference material."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let started = Instant::now();
        let result = tool.execute(params, &self.ctx).await;
        self.metrics
            .observe_tool_call(tool.name(), started.elapsed(), result.is_err());

        match result {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => {
                tracing::debug!(tool = tool.name(), error = %e, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let mut docs = RawResource::new(
            DOCS_LIST_URI,
            "List of Official Prometheus Documentation Files",
        );
        docs.description = Some("Paths of every published document, one per line".to_string());
        docs.mime_type = Some("text/plain".to_string());
        std::future::ready(Ok(ListResourcesResult::with_all_items(vec![
            docs.no_annotation(),
        ])))
    }

    fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourceTemplatesResult, McpError>> + Send + '_
    {
        let template = RawResourceTemplate {
            uri_template: DOCS_FILE_TEMPLATE.to_string(),
            name: "Official Prometheus Documentation".to_string(),
            title: None,
            description: Some("One markdown document, addressed by its path".to_string()),
            mime_type: Some("text/markdown".to_string()),
            icons: None,
        };
        std::future::ready(Ok(ListResourceTemplatesResult::with_all_items(vec![
            template.no_annotation(),
        ])))
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        std::future::ready(self.read_docs_resource(&request.uri))
    }
}
