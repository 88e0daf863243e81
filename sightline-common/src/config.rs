//! Configuration loading and root folder resolution
//!
//! Every server setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SIGHTLINE_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error; the server starts on defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Default upload ceiling (200 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Completed progress records are kept this long for late pollers
pub const DEFAULT_PROGRESS_RETENTION_SECS: u64 = 3600;

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "sightline.db";

/// TOML file contents
///
/// All fields are optional; anything absent falls through to the
/// compiled default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
    pub fallback_url: Option<String>,
    pub detector_url: Option<String>,
    pub tts_url: Option<String>,
    pub max_upload_bytes: Option<usize>,
    pub max_concurrent_jobs: Option<usize>,
    pub progress_retention_secs: Option<u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_folder: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub detector_url: Option<String>,
    pub tts_url: Option<String>,
    pub log_level: Option<String>,
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
    pub detector_url: String,
    pub tts_url: String,
    pub max_concurrent_jobs: usize,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = dirs::data_local_dir()
            .map(|d| d.join("sightline"))
            .unwrap_or_else(|| PathBuf::from("./sightline_data"));

        // Detection is CPU heavy; keep half the cores free for request handling
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);

        Self {
            root_folder,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            detector_url: "http://127.0.0.1:9000/detect".to_string(),
            tts_url: "https://translate.google.com/translate_tts".to_string(),
            max_concurrent_jobs: (cpus / 2).max(1),
        }
    }
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
    /// URL advertised to clients as the primary backend
    pub public_url: String,
    /// URL advertised to clients when the primary is unreachable
    pub fallback_url: String,
    pub detector_url: String,
    pub tts_url: String,
    pub max_upload_bytes: usize,
    pub max_concurrent_jobs: usize,
    pub progress_retention_secs: u64,
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Resolve configuration from CLI overrides, environment and TOML
    pub fn resolve(overrides: &ConfigOverrides, toml: Option<&TomlConfig>) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();
        let empty = TomlConfig::default();
        let toml = toml.unwrap_or(&empty);

        let root_folder = overrides
            .root_folder
            .clone()
            .or_else(|| env_value("SIGHTLINE_ROOT_FOLDER").map(PathBuf::from))
            .or_else(|| toml.root_folder.clone())
            .unwrap_or(defaults.root_folder);

        let host = overrides
            .host
            .clone()
            .or_else(|| env_value("SIGHTLINE_HOST"))
            .or_else(|| toml.host.clone())
            .unwrap_or(defaults.host);

        let port = match overrides.port {
            Some(port) => port,
            None => match env_value("SIGHTLINE_PORT") {
                Some(raw) => parse_env("SIGHTLINE_PORT", &raw)?,
                None => toml.port.unwrap_or(defaults.port),
            },
        };

        let detector_url = overrides
            .detector_url
            .clone()
            .or_else(|| env_value("SIGHTLINE_DETECTOR_URL"))
            .or_else(|| toml.detector_url.clone())
            .unwrap_or(defaults.detector_url);

        let tts_url = overrides
            .tts_url
            .clone()
            .or_else(|| env_value("SIGHTLINE_TTS_URL"))
            .or_else(|| toml.tts_url.clone())
            .unwrap_or(defaults.tts_url);

        let public_url = env_value("SIGHTLINE_PUBLIC_URL")
            .or_else(|| toml.public_url.clone())
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let fallback_url = env_value("SIGHTLINE_FALLBACK_URL")
            .or_else(|| toml.fallback_url.clone())
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", port));

        let max_upload_bytes = match env_value("SIGHTLINE_MAX_UPLOAD_BYTES") {
            Some(raw) => parse_env("SIGHTLINE_MAX_UPLOAD_BYTES", &raw)?,
            None => toml.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };

        let max_concurrent_jobs = match env_value("SIGHTLINE_MAX_JOBS") {
            Some(raw) => parse_env("SIGHTLINE_MAX_JOBS", &raw)?,
            None => toml
                .max_concurrent_jobs
                .unwrap_or(defaults.max_concurrent_jobs),
        };
        if max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }

        let progress_retention_secs = toml
            .progress_retention_secs
            .unwrap_or(DEFAULT_PROGRESS_RETENTION_SECS);

        let mut logging = toml.logging.clone();
        if let Some(level) = overrides.log_level.clone() {
            logging.level = level;
        }

        Ok(Self {
            root_folder,
            host,
            port,
            public_url,
            fallback_url,
            detector_url,
            tts_url,
            max_upload_bytes,
            max_concurrent_jobs,
            progress_retention_secs,
            logging,
        })
    }

    /// Configuration rooted at `root`, everything else defaulted
    ///
    /// Does not consult the environment; used by tests and tools.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            root_folder: root.into(),
            host: "127.0.0.1".to_string(),
            port: defaults.port,
            public_url: format!("http://localhost:{}", defaults.port),
            fallback_url: format!("http://127.0.0.1:{}", defaults.port),
            detector_url: defaults.detector_url,
            tts_url: defaults.tts_url,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_concurrent_jobs: defaults.max_concurrent_jobs,
            progress_retention_secs: DEFAULT_PROGRESS_RETENTION_SECS,
            logging: LoggingConfig::default(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    /// Temporary upload area, emptied as jobs finish
    pub fn uploads_dir(&self) -> PathBuf {
        self.root_folder.join("uploads")
    }

    /// Permanent per-user artifact tree
    pub fn history_dir(&self) -> PathBuf {
        self.root_folder.join("history")
    }

    /// Ad-hoc narrations from `/detect/generate-audio`
    pub fn tmp_dir(&self) -> PathBuf {
        self.root_folder.join("tmp")
    }

    /// Create the root folder and its storage subdirectories
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.root_folder.clone(),
            self.uploads_dir(),
            self.history_dir(),
            self.tmp_dir(),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }
}

/// Default TOML location (`~/.config/sightline/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sightline").join("config.toml"))
}

/// Load the TOML config file
///
/// An explicitly requested file must exist. The default location is
/// optional: when absent, a warning is logged and `None` returned.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<Option<TomlConfig>> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(None),
        },
    };

    if !path.exists() {
        if required {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!(
            "No config file at {}, using defaults",
            path.display()
        );
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config file: {}", path.display());
    Ok(Some(config))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{} has invalid value '{}'", name, raw)))
}
