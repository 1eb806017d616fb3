//! Application Configuration
//!
//! User settings stored in TOML format.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::capture::{FacingMode, FrameOptions, StreamConstraints};

/// Environment variables consulted, in order, when no key is configured
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera settings
    pub capture: CaptureSettings,
    /// Reading service settings
    pub reading: ReadingSettings,
    /// Persistence settings
    pub storage: StorageSettings,
}

/// Camera-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Webcam index
    pub device_index: u32,
    /// Ideal stream width
    pub width: u32,
    /// Ideal stream height
    pub height: u32,
    /// Preferred camera orientation
    pub facing: FacingMode,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Blur applied to the still before encoding, 0 disables it
    pub blur_sigma: f32,
    /// How long to wait for the stream to deliver its first frame
    pub ready_timeout_secs: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 720,
            height: 720,
            facing: FacingMode::User,
            jpeg_quality: 92,
            blur_sigma: 10.0,
            ready_timeout_secs: 10,
        }
    }
}

impl CaptureSettings {
    pub fn constraints(&self) -> StreamConstraints {
        StreamConstraints {
            width: self.width,
            height: self.height,
            facing: self.facing,
        }
    }

    pub fn frame_options(&self) -> FrameOptions {
        FrameOptions {
            jpeg_quality: self.jpeg_quality,
            blur_sigma: self.blur_sigma,
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

/// Generative model settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingSettings {
    /// API key; falls back to `GEMINI_API_KEY` then `API_KEY`
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// API base URL
    pub endpoint: String,
    /// Sampling temperature (0.0 - 1.0)
    pub temperature: f32,
    /// Request timeout
    pub timeout_secs: u64,
    /// Require exactly three `#RRGGBB` colours in a reading
    pub enforce_palette: bool,
}

impl Default for ReadingSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.8,
            timeout_secs: 60,
            enforce_palette: true,
        }
    }
}

// Keeps the key out of logs
impl std::fmt::Debug for ReadingSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("enforce_palette", &self.enforce_palette)
            .finish()
    }
}

impl ReadingSettings {
    /// Resolve the credential from config, then the environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.api_key
            .clone()
            .into_iter()
            .chain(API_KEY_ENV_VARS.iter().filter_map(|name| lookup(name)))
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
    }
}

/// Persistence settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Keep every captured still in the data directory
    pub keep_captures: bool,
}

impl AppConfig {
    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if capture.width == 0 || capture.height == 0 {
            bail!("capture.width and capture.height must be non-zero");
        }
        if !(1..=100).contains(&capture.jpeg_quality) {
            bail!("capture.jpeg_quality must be between 1 and 100");
        }
        if !capture.blur_sigma.is_finite() || capture.blur_sigma < 0.0 {
            bail!("capture.blur_sigma must be zero or positive");
        }
        if capture.ready_timeout_secs == 0 {
            bail!("capture.ready_timeout_secs must be non-zero");
        }

        let reading = &self.reading;
        if !(0.0..=1.0).contains(&reading.temperature) {
            bail!("reading.temperature must be between 0.0 and 1.0");
        }
        if reading.model.trim().is_empty() {
            bail!("reading.model must not be empty");
        }
        if reading.timeout_secs == 0 {
            bail!("reading.timeout_secs must be non-zero");
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
