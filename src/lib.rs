//! # Prometheus MCP
//!
//! An MCP server that lets AI agents query a Prometheus server and read the
//! official Prometheus documentation.
//!
//! The documentation ships inside the binary and is kept current in the
//! background: a sync cycle asks the upstream git repository for its latest
//! commit, downloads a tarball only when that commit changed, extracts the
//! markdown under a hardened set of limits, indexes it, and swaps the new
//! snapshot in atomically. Readers never block and never see a partial
//! update.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  ┌─────────────┐  ┌──────────────┐  ┌───────────┐
//! │ RefLister  │─▶│ Archive     │─▶│ extract_docs │─▶│ DocsState │
//! │ ls-remote  │  │ Fetcher     │  │ + index      │  │ (ArcSwap) │
//! └────────────┘  └─────────────┘  └──────────────┘  └─────┬─────┘
//!                                                          │
//!                                 ┌────────────────────────┤
//!                                 ▼                        ▼
//!                           ┌──────────┐            ┌──────────────┐
//!                           │   CLI    │            │ MCP (stdio / │
//!                           │          │            │ HTTP /mcp)   │
//!                           └──────────┘            └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`metrics`] | Self-metrics on `/metrics` |
//! | [`remote`] | Upstream commit detection |
//! | [`fetch`] | Bounded archive download |
//! | [`updater`] | Docs sync controller |
//! | [`baseline`] | Embedded docs snapshot |
//! | [`promapi`] | Prometheus HTTP API client |
//! | [`traits`] | `Tool` trait and registry |
//! | [`tools`] | Built-in tools |
//! | [`mcp`] | MCP protocol bridge |
//! | [`server`] | HTTP and stdio serving |
//!
//! Archive extraction, indexing and the published state live in
//! [`prometheus_mcp_core`].

pub mod baseline;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod promapi;
pub mod remote;
pub mod server;
pub mod tools;
pub mod traits;
pub mod updater;
pub mod version;
