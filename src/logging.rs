//! Structured logging with `tracing`.
//!
//! One registry fans records out to a stderr layer and, when
//! `[logging].file` is set, an append-mode file layer. Stdout is never
//! written to: it carries the MCP stdio transport and CLI output.
//!
//! `RUST_LOG` overrides `[logging].level` when set.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let file = config.file.as_deref().map(open_log_file).transpose()?;

    // Layer types differ between the plain and JSON formats.
    if config.json {
        let stderr = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        let file = file.map(|f| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(f))
        });
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .with(file)
            .try_init()?;
    } else {
        let stderr = fmt::layer().with_target(true).with_writer(std::io::stderr);
        let file = file.map(|f| {
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(f))
        });
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .with(file)
            .try_init()?;
    }

    tracing::debug!(level = %config.level, json = config.json, "logging initialized");
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}
