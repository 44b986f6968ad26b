//! Configuration loading and saving.
//!
//! Settings are read once at startup. Changing the engine mode or model
//! requires a restart since the model handle is built exactly once.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::APP_NAME;

/// Which transcription engine to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// OpenAI Whisper API (fast, requires a key and network)
    #[default]
    Api,
    /// Local whisper.cpp model (offline, slower)
    Local,
}

/// Configuration structure for the application.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Transcription engine mode
    #[serde(default, skip_serializing_if = "is_default_mode")]
    pub mode: EngineMode,

    /// OpenAI API key, required in api mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_key: Option<String>,

    /// Preferred language for transcription (ISO 639-1 code)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Model selector. In api mode an API model name; in local mode a
    /// size name (tiny, base, small, medium, large).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Global hotkey, "modifier+modifier+key" e.g. "meta+shift+Semicolon"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,

    /// Recordings under this duration (seconds) are classified as
    /// no-speech without invoking the model
    #[serde(
        default = "default_discard_duration",
        skip_serializing_if = "is_default_discard_duration"
    )]
    pub discard_duration: f32,

    /// Path of the append-only activity log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_log: Option<PathBuf>,
}

fn is_default_mode(mode: &EngineMode) -> bool {
    *mode == EngineMode::default()
}

fn default_discard_duration() -> f32 {
    0.5
}

fn is_default_discard_duration(v: &f32) -> bool {
    (*v - default_discard_duration()).abs() < f32::EPSILON
}

/// Default hotkey. Cmd+Space would collide with Spotlight on macOS.
pub const DEFAULT_HOTKEY: &str = "meta+shift+Semicolon";

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: EngineMode::default(),
            openai_key: None,
            language: None,
            model: None,
            hotkey: None,
            discard_duration: default_discard_duration(),
            activity_log: None,
        }
    }
}

impl Config {
    /// Get the OpenAI API key
    pub fn key_openai(&self) -> Option<&str> {
        self.openai_key.as_deref()
    }

    /// Get the preferred language
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Get the model selector
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Get the hotkey string, falling back to the default binding
    pub fn hotkey(&self) -> &str {
        self.hotkey.as_deref().unwrap_or(DEFAULT_HOTKEY)
    }

    /// Get the discard duration as a Duration. Values a Duration cannot
    /// represent fall back to the default rather than panic.
    pub fn discard_duration(&self) -> Duration {
        Duration::try_from_secs_f32(self.discard_duration)
            .unwrap_or_else(|_| Duration::from_secs_f32(default_discard_duration()))
    }

    /// Path of the activity log, defaulting to the user data directory.
    pub fn activity_log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.activity_log {
            return Ok(path.clone());
        }
        let data_dir = data_dir().context("Failed to retrieve data directory")?;
        Ok(data_dir.join(APP_NAME).join("activity.log"))
    }
}

/// Manages loading and saving configuration files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the default configuration directory.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Creates a new ConfigManager with a specified configuration directory.
    #[cfg(test)]
    pub fn with_config_dir<P: AsRef<Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(format!("{}.toml", APP_NAME));
        Self { config_path }
    }

    /// Returns the default path to the configuration file.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to retrieve configuration directory")?;
        Ok(config_dir.join(APP_NAME).join(format!("{}.toml", APP_NAME)))
    }

    /// Loads the configuration from the config file or returns default.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file at {:?}", self.config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file at {:?}", self.config_path))?;

        if !config.discard_duration.is_finite() || config.discard_duration < 0.0 {
            bail!(
                "Invalid discard_duration {} in {:?}: must be a non-negative number of seconds",
                config.discard_duration,
                self.config_path
            );
        }

        if config.mode == EngineMode::Api && config.key_openai().is_none() {
            warn!(
                "OpenAI API key is not set. Transcription will fail in api mode; \
                 set openai_key in the config file or switch mode to local."
            );
        }

        Ok(config)
    }

    /// Saves the configuration, writing only non-default fields.
    pub fn save(&self, config: &Config) -> Result<()> {
        let config_dir = self
            .config_path
            .parent()
            .with_context(|| format!("Failed to get parent directory of {:?}", self.config_path))?;

        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory at {:?}", config_dir))?;

        let serialized =
            toml::to_string_pretty(&config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, serialized)
            .with_context(|| format!("Failed to write config file at {:?}", self.config_path))?;

        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mode, EngineMode::Api);
        assert!(config.openai_key.is_none());
        assert_eq!(config.hotkey(), DEFAULT_HOTKEY);
        assert_eq!(config.discard_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp = tempdir().expect("Failed to create temp dir");
        let manager = ConfigManager::with_config_dir(temp.path());
        let config = manager.load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = tempdir().expect("Failed to create temp dir");
        let manager = ConfigManager::with_config_dir(temp.path());

        let config = Config {
            mode: EngineMode::Local,
            model: Some("small".to_string()),
            language: Some("en".to_string()),
            hotkey: Some("control+shift+KeyD".to_string()),
            ..Default::default()
        };
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.hotkey(), "control+shift+KeyD");
    }

    #[test]
    fn test_save_creates_config_file() {
        let temp = tempdir().expect("Failed to create temp dir");
        let manager = ConfigManager::with_config_dir(temp.path());

        manager.save(&Config::default()).unwrap();
        assert!(manager.config_path().exists());
    }

    #[test]
    fn test_mode_round_trip() {
        let serialized = toml::to_string_pretty(&Config {
            mode: EngineMode::Local,
            ..Default::default()
        })
        .unwrap();
        assert!(serialized.contains("mode = \"local\""));

        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.mode, EngineMode::Local);
    }

    #[test]
    fn test_default_fields_not_serialized() {
        let serialized = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(serialized.trim().is_empty());
    }

    #[test]
    fn test_negative_discard_duration_is_rejected() {
        let temp = tempdir().expect("Failed to create temp dir");
        let manager = ConfigManager::with_config_dir(temp.path());
        fs::write(manager.config_path(), "discard_duration = -0.5\n").unwrap();

        let err = manager.load().unwrap_err();
        assert!(err.to_string().contains("discard_duration"));
    }

    #[test]
    fn test_non_finite_discard_duration_is_rejected() {
        let temp = tempdir().expect("Failed to create temp dir");
        let manager = ConfigManager::with_config_dir(temp.path());
        fs::write(manager.config_path(), "discard_duration = nan\n").unwrap();

        assert!(manager.load().is_err());
    }

    #[test]
    fn test_discard_duration_accessor_never_panics() {
        let config = Config {
            discard_duration: -1.0,
            ..Default::default()
        };
        assert_eq!(config.discard_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_custom_activity_log_path() {
        let config = Config {
            activity_log: Some(PathBuf::from("/tmp/dicta.log")),
            ..Default::default()
        };
        assert_eq!(
            config.activity_log_path().unwrap(),
            PathBuf::from("/tmp/dicta.log")
        );
    }
}
