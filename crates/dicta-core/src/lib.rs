//! Core types and configuration for dicta.
//!
//! Platform-agnostic pieces shared by the audio, transcription, and
//! application crates.

mod config;
mod state;

pub use config::{Config, ConfigManager, EngineMode};
pub use state::{Phase, SessionOutcome};

/// Application name
pub const APP_NAME: &str = "dicta";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";
