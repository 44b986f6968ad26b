//! Control events consumed by the dictation controller.
//!
//! Hotkey callbacks and worker completions are both translated into items
//! on one queue so the state machine sees a single, ordered event stream.

use dicta_core::SessionOutcome;

/// Events for the controller queue.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// The global hotkey was pressed
    HotkeyToggled,
    /// The in-flight session finished transcription
    SessionDone(SessionOutcome),
}
