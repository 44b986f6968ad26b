//! Controller phase and session outcome types.

/// The phase of the dictation controller. Exactly one recorder exists
/// process-wide and its activity always matches this phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a hotkey press, microphone free
    Idle,
    /// Actively capturing microphone audio
    Recording,
    /// A finished buffer is with the transcription engine
    Transcribing,
}

/// How a session ended. Every session that reaches the transcription
/// stage produces exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Speech was recognized; the text is ready to paste
    Success(String),
    /// The buffer was empty, too short, or contained no recognizable
    /// speech. Not an error.
    NoSpeechDetected,
    /// The engine failed; the session is abandoned
    Error(String),
}
