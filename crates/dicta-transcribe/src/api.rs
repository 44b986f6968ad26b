//! OpenAI Whisper API transcription backend.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{Result, TranscribeError, Transcriber};

const TRANSCRIPTION_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEFAULT_MODEL: &str = "whisper-1";

/// Configuration for the Whisper API client.
#[derive(Debug, Clone)]
pub struct WhisperApiConfig {
    /// OpenAI API key
    pub api_key: String,

    /// API model name (defaults to whisper-1)
    pub model: Option<String>,
}

impl WhisperApiConfig {
    /// Create a new config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Get the model name, using the default if not set.
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Whisper API client. Cheap to clone; holds a shared reqwest client.
#[derive(Debug, Clone)]
pub struct WhisperApi {
    client: reqwest::Client,
    config: WhisperApiConfig,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperApi {
    /// Create a new client with the given configuration.
    pub fn new(config: WhisperApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Create a client from just an API key with default settings.
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        Self::new(WhisperApiConfig::new(api_key))
    }
}

#[async_trait]
impl Transcriber for WhisperApi {
    async fn transcribe(&self, audio: &[u8], language: Option<&str>) -> Result<String> {
        debug!(
            model = self.config.model(),
            audio_bytes = audio.len(),
            language = ?language,
            "Sending transcription request"
        );

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("recording.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| TranscribeError::ApiError(e.to_string()))?,
            )
            .part(
                "model",
                reqwest::multipart::Part::text(self.config.model().to_string()),
            );

        if let Some(lang) = language {
            form = form.part("language", reqwest::multipart::Part::text(lang.to_string()));
        }

        let response = self
            .client
            .post(TRANSCRIPTION_ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::ApiError(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let transcription: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::TranscriptionFailed(e.to_string()))?;

        Ok(transcription.text.trim().to_string())
    }

    fn name(&self) -> &str {
        "whisper-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let config = WhisperApiConfig::new("key");
        assert_eq!(config.model(), "whisper-1");
    }

    #[test]
    fn test_model_override() {
        let config = WhisperApiConfig::new("key").with_model("gpt-4o-mini-transcribe");
        assert_eq!(config.model(), "gpt-4o-mini-transcribe");
    }
}
