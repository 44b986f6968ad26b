//! Local Whisper transcription using whisper-rs.
//!
//! Wraps a whisper.cpp context loaded from a ggml model file. The context
//! is expensive to build, so it is loaded once and reused for every
//! session; a load failure at startup is fatal to the service.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::model::{WhisperModel, model_path};
use crate::{Result, TranscribeError, Transcriber};

/// Sample rate whisper.cpp expects.
const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Configuration for the local Whisper transcriber.
#[derive(Debug, Clone, Default)]
pub struct LocalWhisperConfig {
    /// The model size to use.
    pub model: WhisperModel,
    /// Optional override path to the model file.
    pub model_path: Option<PathBuf>,
}

impl LocalWhisperConfig {
    /// Create a new config with the specified model.
    pub fn new(model: WhisperModel) -> Self {
        Self {
            model,
            model_path: None,
        }
    }

    /// Create a config with a custom model path.
    pub fn with_model_path(mut self, path: PathBuf) -> Self {
        self.model_path = Some(path);
        self
    }
}

/// Local Whisper transcriber using whisper.cpp.
pub struct LocalWhisper {
    config: LocalWhisperConfig,
    /// Context created by `preload` or on first use.
    context: Mutex<Option<WhisperContext>>,
}

impl LocalWhisper {
    /// Create a new local Whisper client. The model is not loaded until
    /// `preload` or the first transcription.
    pub fn new(config: LocalWhisperConfig) -> Self {
        Self {
            config,
            context: Mutex::new(None),
        }
    }

    /// Load the model eagerly so a broken model file fails the process at
    /// startup rather than mid-session.
    pub fn preload(&self) -> Result<()> {
        self.ensure_context().map(|_| ())
    }

    /// Get or initialize the whisper context, returning a guard.
    fn ensure_context(&self) -> Result<std::sync::MutexGuard<'_, Option<WhisperContext>>> {
        let mut guard = self
            .context
            .lock()
            .map_err(|e| TranscribeError::ModelLoad(format!("Failed to lock context: {}", e)))?;
        if guard.is_none() {
            let path = match &self.config.model_path {
                Some(p) => p.clone(),
                None => model_path(self.config.model)
                    .map_err(|e| TranscribeError::ModelLoad(e.to_string()))?,
            };

            info!(path = ?path, "Loading Whisper model");

            let ctx = WhisperContext::new_with_params(
                path.to_str()
                    .ok_or_else(|| TranscribeError::ModelLoad("Invalid model path".to_string()))?,
                WhisperContextParameters::default(),
            )
            .map_err(|e| TranscribeError::ModelLoad(format!("Failed to load model: {}", e)))?;

            info!("Whisper model loaded");
            *guard = Some(ctx);
        }
        Ok(guard)
    }

    /// Decode WAV audio into 16 kHz mono f32 samples.
    fn convert_audio(&self, audio: &[u8]) -> Result<Vec<f32>> {
        use std::io::Cursor;

        let reader = hound::WavReader::new(Cursor::new(audio)).map_err(|e| {
            TranscribeError::InvalidAudioFormat(format!("Failed to read WAV: {}", e))
        })?;

        let spec = reader.spec();
        let sample_rate = spec.sample_rate;
        let channels = spec.channels as usize;

        debug!(
            sample_rate = sample_rate,
            channels = channels,
            bits_per_sample = spec.bits_per_sample,
            "Converting audio"
        );

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    TranscribeError::InvalidAudioFormat(format!("Failed to read samples: {}", e))
                })?,
            hound::SampleFormat::Int => {
                let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| {
                        TranscribeError::InvalidAudioFormat(format!(
                            "Failed to read samples: {}",
                            e
                        ))
                    })?
                    .into_iter()
                    .map(|s| s as f32 / max_val)
                    .collect()
            }
        };

        let mono: Vec<f32> = if channels > 1 {
            samples
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        } else {
            samples
        };

        Ok(if sample_rate != WHISPER_SAMPLE_RATE {
            resample(&mono, sample_rate, WHISPER_SAMPLE_RATE)
        } else {
            mono
        })
    }
}

/// Linear interpolation resampling.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 * ratio;
        let src_idx_floor = src_idx.floor() as usize;
        let frac = src_idx - src_idx_floor as f64;

        let sample = if src_idx_floor + 1 < samples.len() {
            let s0 = samples[src_idx_floor] as f64;
            let s1 = samples[src_idx_floor + 1] as f64;
            (s0 * (1.0 - frac) + s1 * frac) as f32
        } else if src_idx_floor < samples.len() {
            samples[src_idx_floor]
        } else {
            0.0
        };

        result.push(sample);
    }

    result
}

#[async_trait]
impl Transcriber for LocalWhisper {
    async fn transcribe(&self, audio: &[u8], language: Option<&str>) -> Result<String> {
        let samples = self.convert_audio(audio)?;

        let context = self.ensure_context()?;
        let ctx = context
            .as_ref()
            .ok_or_else(|| TranscribeError::ModelLoad("context missing after load".to_string()))?;

        let mut state = ctx.create_state().map_err(|e| {
            TranscribeError::TranscriptionFailed(format!("Failed to create state: {}", e))
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        // None auto-detects the language
        params.set_language(language);

        // Keep whisper.cpp quiet on stdout
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state.full(params, &samples).map_err(|e| {
            TranscribeError::TranscriptionFailed(format!("Transcription failed: {}", e))
        })?;

        let num_segments = state.full_n_segments().map_err(|e| {
            TranscribeError::TranscriptionFailed(format!("Failed to get segments: {}", e))
        })?;

        let mut result = String::new();
        for i in 0..num_segments {
            let segment = state.full_get_segment_text(i).map_err(|e| {
                TranscribeError::TranscriptionFailed(format!("Failed to get segment {}: {}", i, e))
            })?;
            result.push_str(&segment);
        }

        Ok(result.trim().to_string())
    }

    fn name(&self) -> &str {
        "local-whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_downsamples() {
        let samples: Vec<f32> = (0..48_000).map(|i| (i as f32 / 48_000.0).sin()).collect();
        let resampled = resample(&samples, 48_000, 16_000);
        assert_eq!(resampled.len(), 16_000);
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.25, -0.5, 0.75];
        assert_eq!(resample(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn test_config_default() {
        let config = LocalWhisperConfig::default();
        assert_eq!(config.model, WhisperModel::Small);
        assert!(config.model_path.is_none());
    }
}
