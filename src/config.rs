use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use prometheus_mcp_core::ExtractConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_url")]
    pub url: String,
    #[serde(default = "default_prometheus_timeout")]
    pub timeout_secs: u64,
}

fn default_prometheus_url() -> String {
    "http://127.0.0.1:9090".to_string()
}
fn default_prometheus_timeout() -> u64 {
    60
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: default_prometheus_url(),
            timeout_secs: default_prometheus_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_transport")]
    pub transport: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_transport() -> String {
    "stdio".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            transport: default_transport(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_true")]
    pub auto_update: bool,
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
    #[serde(default = "default_archive_url")]
    pub archive_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
    #[serde(default = "default_max_decompressed_bytes")]
    pub max_decompressed_bytes: u64,
    #[serde(default = "default_max_file_count")]
    pub max_file_count: usize,
}

fn default_true() -> bool {
    true
}
fn default_repo_url() -> String {
    "https://github.com/prometheus/docs.git".to_string()
}
fn default_archive_url() -> String {
    "https://github.com/prometheus/docs/archive/refs/heads/main.tar.gz".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_docs_dir() -> String {
    "docs".to_string()
}
fn default_extension() -> String {
    "md".to_string()
}
fn default_update_interval() -> u64 {
    24 * 60 * 60
}
fn default_http_timeout() -> u64 {
    300
}
fn default_max_archive_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_max_decompressed_bytes() -> u64 {
    200 * 1024 * 1024
}
fn default_max_file_count() -> usize {
    10_000
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            auto_update: default_true(),
            repo_url: default_repo_url(),
            archive_url: default_archive_url(),
            branch: default_branch(),
            docs_dir: default_docs_dir(),
            extension: default_extension(),
            update_interval_secs: default_update_interval(),
            http_timeout_secs: default_http_timeout(),
            max_archive_bytes: default_max_archive_bytes(),
            max_decompressed_bytes: default_max_decompressed_bytes(),
            max_file_count: default_max_file_count(),
        }
    }
}

impl DocsConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Extraction limits derived from this section.
    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig {
            docs_dir: self.docs_dir.clone(),
            extension: self.extension.clone(),
            max_decompressed_bytes: self.max_decompressed_bytes,
            max_file_count: self.max_file_count,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Optional log file, opened in append mode alongside stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

/// Load and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Defaults when no `--config` is given, otherwise the loaded file.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.prometheus.url.trim().is_empty() {
        anyhow::bail!("prometheus.url must not be empty");
    }
    if config.prometheus.timeout_secs == 0 {
        anyhow::bail!("prometheus.timeout_secs must be > 0");
    }

    match config.server.transport.as_str() {
        "stdio" | "http" => {}
        other => anyhow::bail!(
            "Unknown server transport: '{}'. Must be stdio or http.",
            other
        ),
    }

    let docs = &config.docs;
    for (name, value) in [
        ("docs.repo_url", &docs.repo_url),
        ("docs.archive_url", &docs.archive_url),
        ("docs.branch", &docs.branch),
        ("docs.docs_dir", &docs.docs_dir),
        ("docs.extension", &docs.extension),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("{} must not be empty", name);
        }
    }
    if docs.update_interval_secs == 0 {
        anyhow::bail!("docs.update_interval_secs must be > 0");
    }
    if docs.http_timeout_secs == 0 {
        anyhow::bail!("docs.http_timeout_secs must be > 0");
    }
    if docs.max_archive_bytes == 0 {
        anyhow::bail!("docs.max_archive_bytes must be > 0");
    }
    if docs.max_decompressed_bytes == 0 {
        anyhow::bail!("docs.max_decompressed_bytes must be > 0");
    }
    if docs.max_file_count == 0 {
        anyhow::bail!("docs.max_file_count must be > 0");
    }

    if config
        .logging
        .level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .is_err()
    {
        anyhow::bail!(
            "Unknown logging.level: '{}'. Must be off, error, warn, info, debug, or trace.",
            config.logging.level
        );
    }

    Ok(())
}
