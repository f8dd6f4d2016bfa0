//! # prometheus-mcp
//!
//! ```bash
//! prometheus-mcp serve                          # MCP over stdio
//! prometheus-mcp serve --transport http         # streamable HTTP on [server].bind
//! prometheus-mcp docs search "rate counter"     # search the embedded docs
//! prometheus-mcp docs read querying/basics.md
//! prometheus-mcp docs check                     # compare with upstream
//! prometheus-mcp docs refresh                   # one sync cycle, then print the result
//! prometheus-mcp query 'up{job="node"}'
//! ```
//!
//! Every command accepts `--config <file>`; without it built-in defaults apply.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use prometheus_mcp::baseline::initial_docs;
use prometheus_mcp::config::{self, Config};
use prometheus_mcp::logging::init_logging;
use prometheus_mcp::mcp::McpBridge;
use prometheus_mcp::metrics::Metrics;
use prometheus_mcp::promapi::{parse_timestamp, PrometheusClient};
use prometheus_mcp::server;
use prometheus_mcp::traits::{ToolContext, ToolRegistry};
use prometheus_mcp::updater::{DocsUpdater, UpdateOutcome};
use prometheus_mcp_core::DocsState;

#[derive(Parser)]
#[command(
    name = "prometheus-mcp",
    about = "MCP server for Prometheus queries and documentation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server.
    Serve {
        /// Overrides `[server].transport`.
        #[arg(long, value_enum)]
        transport: Option<Transport>,

        /// Listen address for `http`; overrides `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Inspect or refresh the documentation snapshot.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Run an instant PromQL query and print the JSON result.
    Query {
        expr: String,

        /// Evaluation time (Unix seconds or RFC 3339).
        #[arg(long)]
        time: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

impl Transport {
    fn as_str(self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Http => "http",
        }
    }
}

#[derive(Subcommand)]
enum DocsAction {
    /// List every document path.
    List,

    /// Print one document.
    Read { file: String },

    /// Ranked search.
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the tracked and upstream commits without downloading.
    Check,

    /// Run one update cycle against upstream.
    Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_or_default(cli.config.as_deref())?;
    init_logging(&cfg.logging)?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received interrupt, shutting down");
                shutdown.cancel();
            }
        });
    }

    match cli.command {
        Commands::Serve { transport, bind } => {
            if let Some(transport) = transport {
                cfg.server.transport = transport.as_str().to_string();
            }
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            serve(&cfg, shutdown).await
        }
        Commands::Docs { action } => docs(&cfg, action, shutdown).await,
        Commands::Query { expr, time } => {
            let client = PrometheusClient::new(&cfg.prometheus)?;
            let time = match time {
                Some(raw) => parse_timestamp(&raw)?,
                None => Utc::now(),
            };
            let result = client.query(&expr, time).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

async fn serve(cfg: &Config, shutdown: CancellationToken) -> Result<()> {
    let metrics = Arc::new(Metrics::new()?);
    let state = Arc::new(DocsState::new(initial_docs(&cfg.docs.extract_config())));
    let updater = Arc::new(DocsUpdater::from_config(
        &cfg.docs,
        state.clone(),
        metrics.docs.clone(),
    )?);

    let periodic = if cfg.docs.auto_update {
        let updater = updater.clone();
        let interval = cfg.docs.update_interval();
        let cancel = shutdown.clone();
        Some(tokio::spawn(async move {
            updater.run_periodic(interval, cancel).await
        }))
    } else {
        info!("automatic docs updates disabled");
        None
    };

    let prometheus = Arc::new(PrometheusClient::new(&cfg.prometheus)?);
    let ctx = ToolContext::new(state, Some(updater), prometheus, shutdown.clone());
    let tools = Arc::new(ToolRegistry::with_builtins());

    let result = match cfg.server.transport.as_str() {
        "http" => {
            let router = server::router(tools, ctx, metrics);
            server::run_http(&cfg.server.bind, router, shutdown.clone()).await
        }
        "stdio" => server::run_stdio(McpBridge::new(tools, ctx, metrics), shutdown.clone()).await,
        other => Err(anyhow::anyhow!("unknown server transport: '{}'", other)),
    };

    shutdown.cancel();
    if let Some(handle) = periodic {
        if let Err(err) = handle.await {
            error!(error = %err, "docs update task panicked");
        }
    }
    result
}

async fn docs(cfg: &Config, action: DocsAction, shutdown: CancellationToken) -> Result<()> {
    let state = Arc::new(DocsState::new(initial_docs(&cfg.docs.extract_config())));

    match action {
        DocsAction::List => {
            let current = state.current();
            for name in current.snapshot.file_names() {
                println!("{}", name);
            }
        }
        DocsAction::Read { file } => match state.snapshot().file(file.trim_start_matches('/')) {
            Some(content) => print!("{}", content),
            None => anyhow::bail!("document not found: {}", file),
        },
        DocsAction::Search { query, limit } => {
            let hits = state.snapshot().search(&query, limit.max(1));
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, hit.score, hit.path);
                println!("    {}", hit.snippet.replace('\n', " "));
            }
        }
        DocsAction::Check => {
            let updater = DocsUpdater::from_config(&cfg.docs, state, Metrics::new()?.docs)?;
            let status = updater.check(&shutdown).await?;
            println!("tracked:  {}", status.tracked);
            println!("upstream: {}", status.latest);
            if status.changed() {
                println!("update available");
            } else {
                println!("up to date");
            }
        }
        DocsAction::Refresh => {
            let updater = DocsUpdater::from_config(&cfg.docs, state, Metrics::new()?.docs)?;
            match updater.update(&shutdown).await? {
                UpdateOutcome::UpToDate { commit } => println!("up to date at {}", commit),
                UpdateOutcome::Updated {
                    old_commit,
                    new_commit,
                    files,
                } => println!("updated {} -> {} ({} files)", old_commit, new_commit, files),
            }
        }
    }
    Ok(())
}
