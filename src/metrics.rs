//! Prometheus metrics for the server itself, exposed on `GET /metrics`.

use std::time::Duration;

use anyhow::Result;
use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::version::VERSION;

const NAMESPACE: &str = "prom_mcp";

/// Counters touched by the docs updater.
#[derive(Clone)]
pub struct DocsMetrics {
    pub last_update_timestamp: Gauge,
    pub update_failures: IntCounter,
}

/// Every metric the process exports, registered in a private registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub docs: DocsMetrics,
    pub tool_call_duration: HistogramVec,
    pub tool_calls_failed: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let last_update_timestamp = Gauge::with_opts(
            Opts::new(
                "docs_last_update_timestamp_seconds",
                "Unix timestamp of the last successful documentation update.",
            )
            .namespace(NAMESPACE),
        )?;
        let update_failures = IntCounter::with_opts(
            Opts::new(
                "docs_update_failures_total",
                "Total number of failed documentation update attempts.",
            )
            .namespace(NAMESPACE),
        )?;
        let build_info = IntGauge::with_opts(
            Opts::new("build_info", "Build information, value is always 1.")
                .namespace(NAMESPACE)
                .const_label("version", VERSION),
        )?;
        let tool_call_duration = HistogramVec::new(
            HistogramOpts::new(
                "tool_call_duration_seconds",
                "Duration of MCP tool calls in seconds.",
            )
            .namespace(NAMESPACE),
            &["tool_name"],
        )?;
        let tool_calls_failed = IntCounterVec::new(
            Opts::new("tool_calls_failed_total", "Total number of failed tool calls.")
                .namespace(NAMESPACE),
            &["tool_name"],
        )?;

        registry.register(Box::new(last_update_timestamp.clone()))?;
        registry.register(Box::new(update_failures.clone()))?;
        registry.register(Box::new(build_info.clone()))?;
        registry.register(Box::new(tool_call_duration.clone()))?;
        registry.register(Box::new(tool_calls_failed.clone()))?;
        build_info.set(1);

        Ok(Self {
            registry,
            docs: DocsMetrics {
                last_update_timestamp,
                update_failures,
            },
            tool_call_duration,
            tool_calls_failed,
        })
    }

    /// Record one tool invocation.
    pub fn observe_tool_call(&self, tool: &str, elapsed: Duration, failed: bool) {
        self.tool_call_duration
            .with_label_values(&[tool])
            .observe(elapsed.as_secs_f64());
        if failed {
            self.tool_calls_failed.with_label_values(&[tool]).inc();
        }
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}
