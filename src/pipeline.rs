//! Bridges finished recordings to the transcription engine.
//!
//! Transcription runs on a small tokio runtime so a slow model or a slow
//! network call never blocks the controller thread. Every accepted buffer
//! produces exactly one `SessionDone` event, whatever happens to it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use dicta_audio::Recording;
use dicta_core::SessionOutcome;
use dicta_transcribe::Transcriber;
use tokio::runtime::Runtime;
use tracing::{error, info};

use crate::controller::Dispatch;
use crate::event::ControlEvent;

/// Accepts recordings and turns them into `SessionDone` events.
pub struct TranscribePipeline {
    runtime: Runtime,
    engine: Arc<dyn Transcriber>,
    language: Option<String>,
    discard_duration: Duration,
    events: Sender<ControlEvent>,
}

impl TranscribePipeline {
    pub fn new(
        engine: Arc<dyn Transcriber>,
        language: Option<String>,
        discard_duration: Duration,
        events: Sender<ControlEvent>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("Failed to create transcription runtime")?;
        Ok(Self {
            runtime,
            engine,
            language,
            discard_duration,
            events,
        })
    }

    /// Queue a recording for transcription. Returns once the work is
    /// handed off; the result arrives later as a `SessionDone` event.
    pub fn submit(&self, recording: Recording) -> Result<()> {
        let duration = recording.duration();
        info!(
            engine = self.engine.name(),
            bytes = recording.data().len(),
            length_seconds = duration.as_secs_f64(),
            "Audio submitted for transcription"
        );

        // Buffers shorter than the threshold are accidental taps. They
        // complete like any other session but never reach the engine.
        if duration < self.discard_duration {
            info!(
                threshold_seconds = self.discard_duration.as_secs_f64(),
                "Buffer under discard threshold, treating as no speech"
            );
            self.events
                .send(ControlEvent::SessionDone(SessionOutcome::NoSpeechDetected))
                .context("Controller queue closed")?;
            return Ok(());
        }

        let engine = self.engine.clone();
        let language = self.language.clone();
        let events = self.events.clone();
        let audio = recording.into_data();

        self.runtime.spawn(async move {
            let started = Instant::now();
            let outcome = match engine.transcribe(&audio, language.as_deref()).await {
                Ok(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        SessionOutcome::NoSpeechDetected
                    } else {
                        SessionOutcome::Success(text.to_string())
                    }
                }
                Err(e) => {
                    error!(error = %e, "Transcription failed");
                    SessionOutcome::Error(e.to_string())
                }
            };
            info!(
                elapsed_seconds = started.elapsed().as_secs_f64(),
                "Transcription finished"
            );
            if events.send(ControlEvent::SessionDone(outcome)).is_err() {
                error!("Controller queue closed, dropping transcription result");
            }
        });

        Ok(())
    }
}

impl Dispatch for TranscribePipeline {
    fn dispatch(&mut self, recording: Recording) -> Result<()> {
        self.submit(recording)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use dicta_transcribe::{Result, Transcriber};

    /// An engine double that counts calls and returns a canned result.
    pub(crate) struct StubEngine {
        response: std::result::Result<String, String>,
        calls: AtomicUsize,
    }

    impl StubEngine {
        /// Always transcribes to the given text.
        pub(crate) fn speaking(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        /// Always transcribes to the empty string, as the model does for
        /// silence.
        pub(crate) fn silent() -> Self {
            Self::speaking("")
        }

        /// Always fails with the given message.
        pub(crate) fn broken(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transcriber for StubEngine {
        async fn transcribe(&self, _audio: &[u8], _language: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(dicta_transcribe::TranscribeError::TranscriptionFailed(
                    message.clone(),
                )),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbeam_channel::{Receiver, unbounded};

    use super::testing::StubEngine;
    use super::*;

    fn recording(seconds: f32) -> Recording {
        let samples = vec![0.0f32; (16_000.0 * seconds) as usize];
        Recording::from_samples(&samples, 16_000, 1).unwrap()
    }

    fn recv_outcome(receiver: &Receiver<ControlEvent>) -> SessionOutcome {
        match receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("no completion event")
        {
            ControlEvent::SessionDone(outcome) => outcome,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    fn pipeline(
        engine: Arc<StubEngine>,
        discard_millis: u64,
    ) -> (TranscribePipeline, Receiver<ControlEvent>) {
        let (sender, receiver) = unbounded();
        let pipeline = TranscribePipeline::new(
            engine,
            None,
            Duration::from_millis(discard_millis),
            sender,
        )
        .unwrap();
        (pipeline, receiver)
    }

    #[test]
    fn test_short_buffer_completes_without_engine_call() {
        let engine = Arc::new(StubEngine::speaking("should never be seen"));
        let (pipeline, receiver) = pipeline(engine.clone(), 500);

        pipeline.submit(recording(0.2)).unwrap();

        assert!(matches!(
            recv_outcome(&receiver),
            SessionOutcome::NoSpeechDetected
        ));
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn test_empty_transcript_is_no_speech() {
        let engine = Arc::new(StubEngine::silent());
        let (pipeline, receiver) = pipeline(engine.clone(), 500);

        pipeline.submit(recording(2.0)).unwrap();

        assert!(matches!(
            recv_outcome(&receiver),
            SessionOutcome::NoSpeechDetected
        ));
        assert_eq!(engine.calls(), 1);
    }

    #[test]
    fn test_whitespace_transcript_is_no_speech() {
        let engine = Arc::new(StubEngine::speaking("  \n\t "));
        let (pipeline, receiver) = pipeline(engine, 500);

        pipeline.submit(recording(2.0)).unwrap();

        assert!(matches!(
            recv_outcome(&receiver),
            SessionOutcome::NoSpeechDetected
        ));
    }

    #[test]
    fn test_transcript_is_trimmed_success() {
        let engine = Arc::new(StubEngine::speaking("  hello world \n"));
        let (pipeline, receiver) = pipeline(engine, 500);

        pipeline.submit(recording(2.0)).unwrap();

        match recv_outcome(&receiver) {
            SessionOutcome::Success(text) => assert_eq!(text, "hello world"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_engine_failure_becomes_error_outcome() {
        let engine = Arc::new(StubEngine::broken("model exploded"));
        let (pipeline, receiver) = pipeline(engine, 500);

        pipeline.submit(recording(2.0)).unwrap();

        match recv_outcome(&receiver) {
            SessionOutcome::Error(message) => assert!(message.contains("model exploded")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_every_submission_completes_exactly_once() {
        let engine = Arc::new(StubEngine::speaking("again"));
        let (pipeline, receiver) = pipeline(engine, 500);

        for _ in 0..3 {
            pipeline.submit(recording(1.0)).unwrap();
            recv_outcome(&receiver);
        }
        assert!(receiver.try_recv().is_err());
    }
}
