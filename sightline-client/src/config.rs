//! Client configuration
//!
//! Resolution order per field: environment (`SIGHTLINE_*`) → TOML file
//! (`~/.config/sightline/client.toml` or an explicit path) → defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ClientError, Result};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 600;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Environment variable holding a comma-separated base URL list
pub const BASE_URLS_ENV: &str = "SIGHTLINE_BASE_URLS";

fn default_base_urls() -> Vec<String> {
    vec![
        "http://localhost:8000".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Candidate backends, tried in order
    pub base_urls: Vec<String>,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_urls: default_base_urls(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

pub fn default_client_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sightline").join("client.toml"))
}

impl ClientConfig {
    /// Config with an explicit base URL list, everything else defaulted
    pub fn with_base_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base_urls: urls.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Load from file (explicit path must exist), then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None => match default_client_config_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };

        if let Ok(value) = std::env::var(BASE_URLS_ENV) {
            let urls = parse_url_list(&value);
            if urls.is_empty() {
                warn!("{} is set but empty, ignoring", BASE_URLS_ENV);
            } else {
                config.base_urls = urls;
            }
        }
        if let Some(ms) = env_u64("SIGHTLINE_POLL_INTERVAL_MS") {
            config.poll_interval_ms = ms;
        }
        if let Some(ms) = env_u64("SIGHTLINE_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = ms;
        }

        config.normalize()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("Read {} failed: {}", path.display(), e))
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("Parse {} failed: {}", path.display(), e))
        })?;
        info!("Loaded client config: {}", path.display());
        Ok(config)
    }

    /// Trim trailing slashes, drop blanks and duplicates
    pub fn normalize(&mut self) -> Result<()> {
        let mut urls: Vec<String> = Vec::new();
        for url in &self.base_urls {
            let url = url.trim().trim_end_matches('/').to_string();
            if !url.is_empty() && !urls.contains(&url) {
                urls.push(url);
            }
        }
        if urls.is_empty() {
            return Err(ClientError::Config("base_urls must not be empty".to_string()));
        }
        self.base_urls = urls;
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        Ok(())
    }
}

fn parse_url_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_u64(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", name, value);
            None
        }
    }
}
