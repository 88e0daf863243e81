//! User-facing client settings
//!
//! Owned by the caller and passed explicitly to whatever needs them;
//! persisted as TOML with an explicit load/save lifecycle.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

pub const MIN_PLAYBACK_RATE: f32 = 0.5;
pub const MAX_PLAYBACK_RATE: f32 = 2.0;
pub const PLAYBACK_RATE_STEP: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    HighContrast,
}

impl Theme {
    pub fn label(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::HighContrast => "high contrast",
        }
    }
}

/// When page tips are spoken on navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceTips {
    Always,
    FirstVisit,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Narration language code, e.g. `en`
    pub language: String,
    pub playback_rate: f32,
    pub theme: Theme,
    pub voice_tips: VoiceTips,
    /// Short tones when listening starts and stops
    pub tones: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            playback_rate: 1.0,
            theme: Theme::Light,
            voice_tips: VoiceTips::FirstVisit,
            tones: true,
        }
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sightline").join("settings.toml"))
}

impl AppSettings {
    /// Read settings; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut settings: Self = toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("Parse {} failed: {}", path.display(), e))
        })?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClientError::Config(format!("Serialize settings failed: {}", e)))?;
        std::fs::write(path, content)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    fn sanitize(&mut self) {
        if !self.playback_rate.is_finite() {
            warn!("Invalid playback_rate in settings, resetting to 1.0");
            self.playback_rate = 1.0;
        }
        self.playback_rate = self.playback_rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
        if self.language.trim().is_empty() {
            self.language = "en".to_string();
        }
    }

    /// Step playback up; returns the new rate
    pub fn faster(&mut self) -> f32 {
        self.playback_rate = (self.playback_rate + PLAYBACK_RATE_STEP).min(MAX_PLAYBACK_RATE);
        self.playback_rate
    }

    pub fn slower(&mut self) -> f32 {
        self.playback_rate = (self.playback_rate - PLAYBACK_RATE_STEP).max(MIN_PLAYBACK_RATE);
        self.playback_rate
    }
}
