// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://tunelog.db".to_string(),
            pool_max_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Settings for the external play-history source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrobbleConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub user: Option<String>,
    /// Tracks requested per page.
    pub page_size: u32,
    /// Safety cap on the paginated fetch loop.
    pub max_pages: u32,
    /// Minimum delay between requests, in milliseconds.
    pub request_interval_ms: u64,
}

impl Default for ScrobbleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            user: None,
            page_size: 200,
            max_pages: 50,
            request_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
    pub scrobble: ScrobbleConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: TUNELOG_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("TUNELOG_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}
