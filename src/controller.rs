//! The dictation state machine.
//!
//! The controller consumes one ordered queue of [`ControlEvent`]s and
//! sequences Idle -> Recording -> Transcribing -> Idle. At most one
//! session is open at any time; a hotkey press while transcribing is
//! dropped rather than queued. Every per-session failure is converted to
//! a logged outcome here so the listening process survives it.

use anyhow::Context as _;
use crossbeam_channel::Receiver;
use dicta_audio::{Recorder, RecorderError, Recording, RecordingHandle};
use dicta_core::{Phase, SessionOutcome};
use tracing::{error, info, warn};

use crate::activity::ActivityLogger;
use crate::event::ControlEvent;

/// Audio capture seam. The production implementation is [`MicCapture`].
pub trait Capture {
    /// Start appending microphone frames to a fresh buffer.
    fn begin(&mut self) -> anyhow::Result<()>;
    /// Halt capture and return the accumulated buffer.
    fn finish(&mut self) -> anyhow::Result<Recording>;
}

/// Transcription dispatch seam. Every accepted buffer must eventually
/// produce exactly one `ControlEvent::SessionDone` on the controller
/// queue.
pub trait Dispatch {
    fn dispatch(&mut self, recording: Recording) -> anyhow::Result<()>;
}

/// Text injection seam. The production implementation is
/// [`crate::paste::PasteDispatcher`].
pub trait Inject {
    fn inject(&mut self, text: &str) -> anyhow::Result<()>;
}

/// Capture backed by the real microphone recorder.
pub struct MicCapture {
    recorder: Recorder,
    handle: Option<RecordingHandle>,
}

impl MicCapture {
    pub fn new() -> Self {
        Self {
            recorder: Recorder::new(),
            handle: None,
        }
    }
}

impl Default for MicCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Capture for MicCapture {
    fn begin(&mut self) -> anyhow::Result<()> {
        if self.handle.is_some() {
            return Err(RecorderError::AlreadyRecording.into());
        }
        self.handle = Some(self.recorder.start()?);
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<Recording> {
        let mut handle = self.handle.take().context("no active recording")?;
        let recording = handle
            .finish()?
            .context("recording was already finalized")?;
        Ok(recording)
    }
}

/// Owns the capture, dispatch, and injection seams plus the activity log,
/// and drives the phase transitions.
pub struct DictationController<C, D, P> {
    capture: C,
    dispatcher: D,
    injector: P,
    activity: ActivityLogger,
    phase: Phase,
}

impl<C, D, P> DictationController<C, D, P>
where
    C: Capture,
    D: Dispatch,
    P: Inject,
{
    pub fn new(capture: C, dispatcher: D, injector: P, activity: ActivityLogger) -> Self {
        Self {
            capture,
            dispatcher,
            injector,
            activity,
            phase: Phase::Idle,
        }
    }

    /// The current phase of the state machine.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Consume events until the queue closes. Runs for the process
    /// lifetime; individual session failures never end the loop.
    pub fn run(&mut self, events: &Receiver<ControlEvent>) {
        while let Ok(event) = events.recv() {
            self.handle(event);
        }
        info!("Event queue closed, controller stopping");
    }

    /// Apply one event to the state machine.
    pub fn handle(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::HotkeyToggled => self.on_toggle(),
            ControlEvent::SessionDone(outcome) => self.on_session_done(outcome),
        }
    }

    fn on_toggle(&mut self) {
        match self.phase {
            Phase::Idle => match self.capture.begin() {
                Ok(()) => {
                    info!("Recording started");
                    self.activity.info("recording started");
                    self.phase = Phase::Recording;
                }
                Err(e) => {
                    error!(error = ?e, "Failed to start recording");
                    self.activity
                        .error(&format!("failed to start recording: {:#}", e));
                }
            },
            Phase::Recording => match self.capture.finish() {
                Ok(recording) => {
                    info!(
                        samples = recording.samples(),
                        length_seconds = recording.duration().as_secs_f64(),
                        "Recording stopped"
                    );
                    self.activity.info("recording stopped, transcribing");
                    match self.dispatcher.dispatch(recording) {
                        Ok(()) => self.phase = Phase::Transcribing,
                        Err(e) => {
                            error!(error = ?e, "Failed to dispatch transcription");
                            self.activity
                                .error(&format!("failed to dispatch transcription: {:#}", e));
                            self.phase = Phase::Idle;
                        }
                    }
                }
                Err(e) => {
                    error!(error = ?e, "Failed to finish recording");
                    self.activity
                        .error(&format!("failed to finish recording: {:#}", e));
                    self.phase = Phase::Idle;
                }
            },
            Phase::Transcribing => {
                // Deliberately dropped, never queued: a toggle here would
                // start a recording the user no longer expects.
                warn!("Hotkey pressed while transcribing, ignored");
                self.activity.warning("busy transcribing, hotkey ignored");
            }
        }
    }

    fn on_session_done(&mut self, outcome: SessionOutcome) {
        if self.phase != Phase::Transcribing {
            warn!(phase = ?self.phase, "Stray session completion, ignored");
            return;
        }
        match outcome {
            SessionOutcome::Success(text) => {
                info!(chars = text.len(), "Transcription succeeded");
                // The text goes to the log before injection so it is
                // recoverable when the paste is refused.
                self.activity.info(&format!("transcribed: {}", text));
                if let Err(e) = self.injector.inject(&text) {
                    error!(error = ?e, "Failed to paste transcription");
                    self.activity.error(&format!("paste failed: {:#}", e));
                }
            }
            SessionOutcome::NoSpeechDetected => {
                info!("No speech detected");
                self.activity.info("no speech detected");
            }
            SessionOutcome::Error(message) => {
                error!(error = %message, "Transcription failed");
                self.activity
                    .error(&format!("transcription failed: {}", message));
            }
        }
        self.phase = Phase::Idle;
    }
}
