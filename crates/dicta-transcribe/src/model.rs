//! Local model management: size selection, locating, and downloading.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Base URL for downloading Whisper models from Hugging Face.
const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// The model-size selector. Larger models are more accurate and slower;
/// the selection is read once at startup and a change requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperModel {
    /// Tiny model (~78 MB)
    Tiny,
    /// Base model (~148 MB)
    Base,
    /// Small model (~488 MB) - recommended default
    Small,
    /// Medium model (~1.5 GB)
    Medium,
    /// Large v3 model (~3.1 GB)
    Large,
}

impl WhisperModel {
    /// Returns the ggml filename for this model.
    pub fn filename(&self) -> &'static str {
        match self {
            Self::Tiny => "ggml-tiny.bin",
            Self::Base => "ggml-base.bin",
            Self::Small => "ggml-small.bin",
            Self::Medium => "ggml-medium.bin",
            Self::Large => "ggml-large-v3.bin",
        }
    }

    /// Returns the download URL for this model.
    pub fn url(&self) -> String {
        format!("{}/{}", MODEL_BASE_URL, self.filename())
    }

    /// Returns the approximate size of this model in bytes.
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::Tiny => 77_700_000,
            Self::Base => 148_000_000,
            Self::Small => 488_000_000,
            Self::Medium => 1_530_000_000,
            Self::Large => 3_100_000_000,
        }
    }

    /// Returns a human-readable size string.
    pub fn size_human(&self) -> &'static str {
        match self {
            Self::Tiny => "~78 MB",
            Self::Base => "~148 MB",
            Self::Small => "~488 MB",
            Self::Medium => "~1.5 GB",
            Self::Large => "~3.1 GB",
        }
    }

    /// Parses a size name into a WhisperModel.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "tiny" => Some(Self::Tiny),
            "base" => Some(Self::Base),
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" | "large-v3" => Some(Self::Large),
            _ => None,
        }
    }
}

impl Default for WhisperModel {
    fn default() -> Self {
        Self::Small
    }
}

/// Directory where model files are stored.
pub fn models_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Failed to retrieve data directory")?;
    Ok(data_dir.join("dicta").join("models"))
}

/// Returns the path where a model should be stored.
pub fn model_path(model: WhisperModel) -> Result<PathBuf> {
    Ok(models_dir()?.join(model.filename()))
}

/// Checks if a model exists locally.
pub fn model_exists(model: WhisperModel) -> Result<bool> {
    let path = model_path(model)?;
    Ok(path.exists())
}

/// Downloads a model to the local models directory.
///
/// The `progress_callback` is called periodically with (bytes_downloaded, total_bytes).
pub async fn download_model<F>(model: WhisperModel, progress_callback: F) -> Result<PathBuf>
where
    F: Fn(u64, u64) + Send + 'static,
{
    let path = model_path(model)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create models directory: {:?}", parent))?;
    }

    let url = model.url();
    info!(model = ?model, url = %url, "Downloading Whisper model");

    let client = reqwest::Client::new();
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to start download from {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to download model: HTTP {}", response.status());
    }

    let total_size = response.content_length().unwrap_or(model.size_bytes());

    // Download to a temporary file first, then rename
    let temp_path = path.with_extension("bin.tmp");
    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;

    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    use futures_util::StreamExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| "Failed to read chunk during download")?;
        file.write_all(&chunk)
            .with_context(|| "Failed to write chunk to file")?;
        downloaded += chunk.len() as u64;
        progress_callback(downloaded, total_size);
    }

    file.flush().with_context(|| "Failed to flush file")?;
    drop(file);

    fs::rename(&temp_path, &path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    info!(path = ?path, "Model download complete");
    Ok(path)
}

/// Ensures a model is available locally, downloading it if necessary.
///
/// Returns the path to the model file.
pub async fn ensure_model<F>(model: WhisperModel, progress_callback: F) -> Result<PathBuf>
where
    F: Fn(u64, u64) + Send + 'static,
{
    if model_exists(model)? {
        info!(model = ?model, "Model already exists locally");
        return model_path(model);
    }

    warn!(
        model = ?model,
        size = model.size_human(),
        "Model not found locally, downloading..."
    );

    download_model(model, progress_callback).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_from_name() {
        assert_eq!(WhisperModel::from_name("tiny"), Some(WhisperModel::Tiny));
        assert_eq!(WhisperModel::from_name("Small"), Some(WhisperModel::Small));
        assert_eq!(WhisperModel::from_name("large"), Some(WhisperModel::Large));
        assert_eq!(
            WhisperModel::from_name("large-v3"),
            Some(WhisperModel::Large)
        );
        assert_eq!(WhisperModel::from_name("invalid"), None);
    }

    #[test]
    fn test_model_urls() {
        let model = WhisperModel::Base;
        assert!(model.url().contains("ggml-base.bin"));
        assert!(model.url().starts_with("https://"));
    }

    #[test]
    fn test_default_model() {
        assert_eq!(WhisperModel::default(), WhisperModel::Small);
    }
}
