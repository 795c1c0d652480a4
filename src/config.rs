use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fetch::DEFAULT_USER_AGENT;
use crate::models::Theater;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub request_timeout_secs: u64,
    pub source_timeout_secs: u64,
    pub aggregate_timeout_secs: u64,
    pub detail_concurrency: usize,
    pub user_agent: String,
    pub log_level: String,
    /// Theaters to scrape; empty means all of them.
    pub sources: Vec<Theater>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 20,
            source_timeout_secs: 45,
            aggregate_timeout_secs: 90,
            detail_concurrency: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            log_level: "info".to_string(),
            sources: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn aggregate_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregate_timeout_secs)
    }
}

/// Config file (if any), then `.env`, then the process environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let file_config = match path {
        Some(path) => read_config(path)?,
        None => AppConfig::default(),
    };
    apply_env(file_config, |key| std::env::var(key))
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let unreadable = |reason: String| ConfigError::Unreadable {
        path: path.display().to_string(),
        reason,
    };
    let contents = fs::read_to_string(path).map_err(|err| unreadable(err.to_string()))?;
    serde_json::from_str(&contents).map_err(|err| unreadable(err.to_string()))
}

/// Overrides `config` with any `SCREEN_SCRAPE_*` variables `lookup` knows.
pub fn apply_env<F>(config: AppConfig, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let invalid = |var: &str, reason: String| ConfigError::InvalidValue {
        var: var.to_string(),
        reason,
    };
    let parse_u64 = |var: &str, current: u64| -> Result<u64, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.trim().parse().map_err(|e| invalid(var, format!("{e}"))),
            Err(_) => Ok(current),
        }
    };

    let mut config = AppConfig {
        request_timeout_secs: parse_u64(
            "SCREEN_SCRAPE_REQUEST_TIMEOUT_SECS",
            config.request_timeout_secs,
        )?,
        source_timeout_secs: parse_u64(
            "SCREEN_SCRAPE_SOURCE_TIMEOUT_SECS",
            config.source_timeout_secs,
        )?,
        aggregate_timeout_secs: parse_u64(
            "SCREEN_SCRAPE_AGGREGATE_TIMEOUT_SECS",
            config.aggregate_timeout_secs,
        )?,
        detail_concurrency: parse_u64(
            "SCREEN_SCRAPE_DETAIL_CONCURRENCY",
            config.detail_concurrency as u64,
        )? as usize,
        ..config
    };

    if let Ok(agent) = lookup("SCREEN_SCRAPE_USER_AGENT") {
        if !agent.trim().is_empty() {
            config.user_agent = agent.trim().to_string();
        }
    }
    if let Ok(level) = lookup("SCREEN_SCRAPE_LOG_LEVEL") {
        config.log_level = level.trim().to_string();
    }
    if let Ok(raw) = lookup("SCREEN_SCRAPE_SOURCES") {
        config.sources = parse_sources(&raw)
            .map_err(|err| invalid("SCREEN_SCRAPE_SOURCES", err.to_string()))?;
    }

    validate(config)
}

fn parse_sources(raw: &str) -> Result<Vec<Theater>, crate::error::ModelParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::parse::<Theater>)
        .collect()
}

fn validate(config: AppConfig) -> Result<AppConfig, ConfigError> {
    let positive = [
        ("request_timeout_secs", config.request_timeout_secs),
        ("source_timeout_secs", config.source_timeout_secs),
        ("aggregate_timeout_secs", config.aggregate_timeout_secs),
        ("detail_concurrency", config.detail_concurrency as u64),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                var: name.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
    }
    Ok(config)
}
