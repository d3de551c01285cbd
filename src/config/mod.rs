// src/config/mod.rs
//! Application configuration: one TOML (or JSON) file.
//!
//! Lookup order:
//! 1) $BARGAIN_CONFIG_PATH
//! 2) config/config.toml
//! 3) config/config.json

pub mod criteria;
pub mod llm;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::breaker::{BreakerSettings, MAX_RECOVERY_SECS};
use crate::deal::is_http_url;
use crate::ingest::{MonitorSettings, PollerSettings};

pub use criteria::UserCriteria;
pub use llm::{ApiLlmConfig, ApiProvider, JudgeKind, LlmConfig, LocalLlmConfig};

pub const ENV_CONFIG_PATH: &str = "BARGAIN_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/config.toml";
pub const DEFAULT_JSON_PATH: &str = "config/config.json";

fn default_polling_interval() -> u64 {
    300
}
fn default_tick() -> u64 {
    10
}
fn default_max_feeds() -> usize {
    10
}
fn default_max_age_hours() -> u32 {
    24
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_eval_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub feeds: Vec<String>,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
    #[serde(default = "default_max_feeds")]
    pub max_concurrent_feeds: usize,
    #[serde(default = "default_max_age_hours")]
    pub max_deal_age_hours: u32,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_eval_timeout")]
    pub evaluation_timeout_secs: u64,
    #[serde(default)]
    pub breaker: BreakerSettings,
    /// Serve Prometheus `/metrics` here when set.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
    pub criteria: UserCriteria,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = Self::parse(&content, &ext)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.finish()
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(candidate);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        bail!("no configuration found (set {ENV_CONFIG_PATH} or create {DEFAULT_TOML_PATH})")
    }

    fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        if hint_ext == "json" {
            return Ok(serde_json::from_str(s)?);
        }
        Ok(toml::from_str(s)?)
    }

    fn finish(mut self) -> Result<Self> {
        self.feeds = self
            .feeds
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        self.llm = self.llm.resolve()?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            bail!("feeds must list at least one feed URL");
        }
        if let Some(bad) = self.feeds.iter().find(|f| !is_http_url(f)) {
            bail!("feeds contains an invalid URL: {bad}");
        }
        if self.polling_interval_secs < 60 {
            bail!(
                "polling_interval_secs must be at least 60, got {}",
                self.polling_interval_secs
            );
        }
        if self.tick_secs == 0 {
            bail!("tick_secs must be positive");
        }
        if !(1..=50).contains(&self.max_concurrent_feeds) {
            bail!(
                "max_concurrent_feeds must be between 1 and 50, got {}",
                self.max_concurrent_feeds
            );
        }
        if !(1..=168).contains(&self.max_deal_age_hours) {
            bail!(
                "max_deal_age_hours must be between 1 and 168, got {}",
                self.max_deal_age_hours
            );
        }
        if self.fetch_timeout_secs == 0 {
            bail!("fetch_timeout_secs must be positive");
        }
        if self.evaluation_timeout_secs == 0 {
            bail!("evaluation_timeout_secs must be positive");
        }
        if self.breaker.failure_threshold == 0 {
            bail!("breaker.failure_threshold must be positive");
        }
        if !(1..=MAX_RECOVERY_SECS).contains(&self.breaker.recovery_secs) {
            bail!(
                "breaker.recovery_secs must be between 1 and {MAX_RECOVERY_SECS}, got {}",
                self.breaker.recovery_secs
            );
        }
        self.criteria.validate()
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_secs(self.polling_interval_secs),
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            breaker: self.breaker,
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            tick: Duration::from_secs(self.tick_secs),
            max_feeds: self.max_concurrent_feeds,
            poller: self.poller_settings(),
        }
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }
}
