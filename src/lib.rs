//! dicta: hands-free dictation for the desktop.
//!
//! A background process listens for a global hotkey. One press starts
//! recording the microphone, the next stops it and sends the audio to a
//! speech-to-text engine, and the transcript is pasted wherever the
//! cursor is. Activity is appended to a flat log file.

pub mod activity;
pub mod controller;
pub mod event;
pub mod paste;
pub mod pipeline;

pub use activity::ActivityLogger;
pub use controller::{Capture, DictationController, Dispatch, Inject, MicCapture};
pub use dicta_audio::{Recorder, RecorderError, Recording, RecordingHandle};
pub use dicta_core::{
    APP_NAME, Config, ConfigManager, DEFAULT_LOG_LEVEL, EngineMode, Phase, SessionOutcome,
};
pub use dicta_transcribe::{TranscribeError, Transcriber, WhisperApi, WhisperApiConfig};
pub use event::ControlEvent;
pub use paste::{PasteDispatcher, PasteError};
pub use pipeline::TranscribePipeline;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
