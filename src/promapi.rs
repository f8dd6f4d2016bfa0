//! Thin client for the Prometheus HTTP API.
//!
//! PromQL is passed through verbatim. Responses are unwrapped from the
//! `{status, data, errorType, error, warnings}` envelope; an `error` status
//! becomes an `Err` carrying `errorType` and `error`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PrometheusConfig;
use crate::version::user_agent;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

/// Successful API payload.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResult {
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct PrometheusClient {
    client: reqwest::Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/v1/query`.
    pub async fn query(&self, expr: &str, time: DateTime<Utc>) -> Result<ApiResult> {
        self.get(
            "/api/v1/query",
            &[("query", expr.to_string()), ("time", format_timestamp(time))],
        )
        .await
    }

    /// `GET /api/v1/query_range`.
    pub async fn query_range(
        &self,
        expr: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<ApiResult> {
        self.get(
            "/api/v1/query_range",
            &[
                ("query", expr.to_string()),
                ("start", format_timestamp(start)),
                ("end", format_timestamp(end)),
                ("step", format!("{}", step.as_secs_f64())),
            ],
        )
        .await
    }

    /// `GET /api/v1/label/<label>/values`.
    pub async fn label_values(&self, label: &str) -> Result<ApiResult> {
        self.get(&format!("/api/v1/label/{}/values", label), &[]).await
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<ApiResult> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed reading response from {}", url))?;

        let envelope: Envelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                let snippet = String::from_utf8_lossy(&body[..body.len().min(512)]).into_owned();
                bail!("prometheus returned status {}: {}", status.as_u16(), snippet.trim());
            }
            Err(e) => return Err(e).context("failed to decode prometheus response"),
        };

        if envelope.status != "success" {
            bail!(
                "prometheus API error ({}): {}",
                envelope.error_type.as_deref().unwrap_or("unknown"),
                envelope.error.as_deref().unwrap_or("no error message")
            );
        }

        Ok(ApiResult {
            data: envelope.data,
            warnings: envelope.warnings,
        })
    }
}

/// Parse a Unix timestamp in seconds (fractional allowed) or RFC 3339.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<f64>() {
        if secs.is_finite() {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            if let Some(ts) = DateTime::from_timestamp(whole as i64, nanos) {
                return Ok(ts);
            }
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    bail!("failed to parse {} to timestamp", input)
}

/// Parse a step: plain seconds (`15`, `0.5`) or a Prometheus duration
/// (`30s`, `5m`, `1h30m`, `250ms`).
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<f64>() {
        if secs.is_finite() && secs > 0.0 {
            return Ok(Duration::from_secs_f64(secs));
        }
        bail!("duration must be positive: {}", input);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    if rest.is_empty() {
        bail!("empty duration");
    }
    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            bail!("invalid duration: {}", input);
        }
        let value: u64 = rest[..digits].parse()?;
        rest = &rest[digits..];
        let unit_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];
        let millis = match unit {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            "w" => 7 * 86_400_000,
            "y" => 365 * 86_400_000,
            _ => bail!("invalid duration unit {:?} in {}", unit, input),
        };
        total += Duration::from_millis(value.saturating_mul(millis));
    }
    if total.is_zero() {
        bail!("duration must be positive: {}", input);
    }
    Ok(total)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0)
}
