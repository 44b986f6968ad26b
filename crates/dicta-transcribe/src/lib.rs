//! Transcription backends for dicta.
//!
//! A trait-based abstraction over speech-to-text engines, with an OpenAI
//! Whisper API implementation and an optional local whisper.cpp one. The
//! engine is constructed once at startup and shared read-only across all
//! sessions.

mod api;

#[cfg(feature = "local-whisper")]
mod local;
#[cfg(feature = "local-whisper")]
mod model;

use async_trait::async_trait;
#[cfg(feature = "local-whisper")]
pub use local::{LocalWhisper, LocalWhisperConfig};
#[cfg(feature = "local-whisper")]
pub use model::{WhisperModel, download_model, ensure_model, model_exists, model_path};
pub use api::{WhisperApi, WhisperApiConfig};
use thiserror::Error;

/// Errors that can occur during transcription.
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),
}

/// Result type for transcription operations.
pub type Result<T> = std::result::Result<T, TranscribeError>;

/// Trait for transcription backends.
///
/// An empty result string is a valid outcome (no speech detected), not an
/// error; callers classify it.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a WAV-framed audio buffer to text. Blocks the calling
    /// task for the duration of inference; there are no partial results.
    ///
    /// # Arguments
    /// * `audio` - WAV audio data
    /// * `language` - Optional language hint (ISO 639-1 code, e.g., "en")
    async fn transcribe(&self, audio: &[u8], language: Option<&str>) -> Result<String>;

    /// Returns the name of this transcriber for logging/debugging.
    fn name(&self) -> &str;
}
