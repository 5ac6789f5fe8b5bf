//! File-backed configuration.
//!
//! Everything here has a default, so the binary runs without a config file.
//! Secrets (the robot access token) stay in the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aggregator::{AggregatorConfig, DEFAULT_AUDIT_QUEUE_CAPACITY};
use anyhow::{Context, Result};
use serde::Deserialize;

/// TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub aggregator: AggregatorSection,
    pub renderer: RendererSection,
    pub dingtalk: DingTalkSection,
    pub audit: AuditSection,
    pub telemetry: TelemetrySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatorSection {
    pub debounce_delay_secs: u64,
    pub staging_ttl_secs: u64,
    pub janitor_interval_secs: u64,
}

impl Default for AggregatorSection {
    fn default() -> Self {
        Self {
            debounce_delay_secs: AggregatorConfig::DEFAULT_DEBOUNCE_DELAY.as_secs(),
            staging_ttl_secs: AggregatorConfig::DEFAULT_STAGING_TTL.as_secs(),
            janitor_interval_secs: 60,
        }
    }
}

impl AggregatorSection {
    /// Validated engine timing.
    pub fn to_aggregator_config(&self) -> Result<AggregatorConfig> {
        AggregatorConfig::new(
            Duration::from_secs(self.debounce_delay_secs),
            Duration::from_secs(self.staging_ttl_secs),
        )
        .context("invalid [aggregator] section")
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererSection {
    /// Issue tracker base URL; subjects link to `{issue_base_url}/browse/{subject}`.
    pub issue_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DingTalkSection {
    pub webhook_url: String,
    pub title: String,
    pub timeout_secs: u64,
}

impl Default for DingTalkSection {
    fn default() -> Self {
        Self {
            webhook_url: dingtalk::DEFAULT_WEBHOOK_URL.to_string(),
            title: "Issue event notification".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSection {
    /// JSON-lines audit file. Auditing is off when unset.
    pub path: Option<PathBuf>,
    pub queue_capacity: usize,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            path: None,
            queue_capacity: DEFAULT_AUDIT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    pub log_format: LogFormat,
    /// OTLP/gRPC collector endpoint (e.g. `http://localhost:4317`). Spans are
    /// only exported when set.
    pub otlp_endpoint: Option<String>,
}

/// Loads the config file at `path`, or the defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse(content: &str) -> Result<FileConfig> {
    Ok(toml::from_str(content)?)
}
