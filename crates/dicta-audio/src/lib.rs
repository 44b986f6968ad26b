//! Microphone capture. There can only be one active recording at a time;
//! the controller enforces this, and [`Recorder::start`] fails fast if the
//! contract is violated anyway.
//!
//! Frames are captured at the device's native rate and channel count into
//! an in-memory WAV buffer; the transcription engine resamples as needed.

use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Host, SupportedStreamConfig};
use hound::WavWriter;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RecorderError {
    /// generic anyhow error
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    /// No recording device available, or the device refused to open
    #[error("no input device available")]
    NoInputDevice,
    /// A recording is already in progress
    #[error("a recording is already active")]
    AlreadyRecording,
    /// Sample format not supported
    #[error("sample format not supported: {0}")]
    SampleFormatNotSupported(String),
    /// Build stream error
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
}

type Result<T> = std::result::Result<T, RecorderError>;
type WavWriterHandle = Arc<Mutex<Option<WavWriter<MemoryWriter>>>>;

/// A cheaply cloneable handle to the buffer being recorded into. The wav
/// writer's finalize method does not return the inner data, so the buffer
/// lives behind an Arc<Mutex> that both the writer and the handle share.
#[derive(Clone)]
struct MemoryWriter {
    inner: Arc<Mutex<Cursor<Vec<u8>>>>,
}

impl MemoryWriter {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cursor::new(Vec::with_capacity(8 * 1024)))),
        }
    }

    fn try_into_inner(self) -> Result<Vec<u8>> {
        let owned = Arc::try_unwrap(self.inner).map_err(|_| {
            RecorderError::Anyhow(anyhow!("Failed to unwrap inner Arc in MemoryWriter"))
        })?;
        Ok(owned.into_inner().into_inner())
    }
}

impl Seek for MemoryWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.lock().seek(pos)
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// A finished capture: WAV-framed bytes plus the stream parameters they
/// were recorded with.
#[derive(Debug, Clone)]
pub struct Recording {
    data: Vec<u8>,
    sample_rate: u32,
    channels: u16,
    samples: usize,
}

impl Recording {
    /// Encode raw f32 frames into a Recording. Used by tests and anywhere
    /// a synthetic buffer has to stand in for the microphone.
    pub fn from_samples(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 4));
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| RecorderError::Anyhow(anyhow!("Failed to create wav writer: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| RecorderError::Anyhow(anyhow!("Failed to write sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| RecorderError::Anyhow(anyhow!("Failed to finalize writer: {}", e)))?;
        Ok(Self {
            data: cursor.into_inner(),
            sample_rate,
            channels,
            samples: samples.len(),
        })
    }

    /// The WAV-framed bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the recording, returning the WAV bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Number of individual samples captured (frames * channels).
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Wall-clock length of the capture.
    pub fn duration(&self) -> Duration {
        let frames = self.samples / self.channels.max(1) as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Owns the audio host and the single-recording guard.
pub struct Recorder {
    host: Host,
    active: Arc<AtomicBool>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the default input device and start capturing into a fresh
    /// buffer. The returned handle must be finished to obtain the data;
    /// dropping it releases the device.
    pub fn start(&self) -> Result<RecordingHandle> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::AlreadyRecording);
        }
        match self.open_stream() {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn open_stream(&self) -> Result<RecordingHandle> {
        let device = self
            .host
            .default_input_device()
            .ok_or(RecorderError::NoInputDevice)?;
        let config = device
            .default_input_config()
            .map_err(|_| RecorderError::NoInputDevice)?;

        info!(device_name = %device.name().unwrap_or_else(|_| "<unknown>".into()),
              config = ?config, "Recording from device");

        let buffer = MemoryWriter::new();
        let writer = WavWriter::new(buffer.clone(), wav_spec_from_config(&config))
            .map_err(|e| RecorderError::Anyhow(e.into()))?;
        let writer = Arc::new(Mutex::new(Some(writer)));
        let writer_2 = writer.clone();

        let sample_count = Arc::new(AtomicUsize::new(0));
        let sample_count_2 = sample_count.clone();

        let err_fn = move |err| {
            error!("an error occurred on stream: {}", err);
        };

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| write_frames(data, &writer_2, &sample_count_2),
                err_fn,
                None,
            )?,
            sample_format => {
                return Err(RecorderError::SampleFormatNotSupported(format!(
                    "{:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|_| anyhow!("failed to play stream"))?;

        Ok(RecordingHandle {
            stream,
            writer,
            buffer: Some(buffer),
            sample_rate,
            channels,
            sample_count,
            active: self.active.clone(),
        })
    }
}

/// Handle to the active recording. Finishing (or dropping) the handle
/// stops the stream, finalizes the WAV framing, and frees the device.
pub struct RecordingHandle {
    stream: cpal::Stream,
    writer: WavWriterHandle,
    // Presence of the buffer indicates the recording has not been
    // finalized yet.
    buffer: Option<MemoryWriter>,
    sample_rate: u32,
    channels: u16,
    sample_count: Arc<AtomicUsize>,
    active: Arc<AtomicBool>,
}

impl RecordingHandle {
    /// Stop capture and return the accumulated buffer. Returns None if
    /// the recording was already finished.
    pub fn finish(&mut self) -> Result<Option<Recording>> {
        let Some(buffer) = self.buffer.take() else {
            return Ok(None);
        };
        info!("Ending recording");
        // Pause rather than drop; the stream field is behind &mut self.
        self.stream.pause().ok();
        // Finalize so the proper framing information gets written.
        if let Some(writer) = self.writer.lock().take() {
            writer
                .finalize()
                .map_err(|e| RecorderError::Anyhow(anyhow!("Failed to finalize writer: {}", e)))?;
        }
        self.active.store(false, Ordering::SeqCst);
        let data = buffer.try_into_inner()?;
        Ok(Some(Recording {
            data,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: self.sample_count.load(Ordering::SeqCst),
        }))
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        if self.buffer.is_some() {
            if let Err(e) = self.finish() {
                error!("failed to finalize recording: {}", e);
            }
        }
        self.active.store(false, Ordering::SeqCst);
    }
}

fn wav_spec_from_config(config: &SupportedStreamConfig) -> hound::WavSpec {
    hound::WavSpec {
        channels: config.channels(),
        sample_rate: config.sample_rate().0,
        bits_per_sample: (config.sample_format().sample_size() * 8) as _,
        sample_format: if config.sample_format().is_float() {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    }
}

fn write_frames(data: &[f32], writer: &WavWriterHandle, count: &AtomicUsize) {
    if let Some(mut guard) = writer.try_lock() {
        if let Some(writer) = guard.as_mut() {
            for &sample in data.iter() {
                writer.write_sample(sample).ok();
            }
            count.fetch_add(data.len(), Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_duration_mono() {
        let recording = Recording::from_samples(&vec![0.0; 16_000], 16_000, 1).unwrap();
        assert_eq!(recording.duration(), Duration::from_secs(1));
        assert_eq!(recording.samples(), 16_000);
    }

    #[test]
    fn test_recording_duration_stereo() {
        // Two channels halve the frame count.
        let recording = Recording::from_samples(&vec![0.0; 96_000], 48_000, 2).unwrap();
        assert_eq!(recording.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_recording_is_valid_wav() {
        let samples: Vec<f32> = (0..800).map(|i| (i as f32 / 800.0).sin()).collect();
        let recording = Recording::from_samples(&samples, 16_000, 1).unwrap();

        let reader = hound::WavReader::new(Cursor::new(recording.data())).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.len(), 800);
    }

    #[test]
    fn test_empty_recording_has_zero_duration() {
        let recording = Recording::from_samples(&[], 16_000, 1).unwrap();
        assert_eq!(recording.duration(), Duration::ZERO);
    }
}
