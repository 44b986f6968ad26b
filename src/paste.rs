//! Injects transcribed text at the system cursor.
//!
//! The text travels through the clipboard: save whatever is there, put
//! the transcript in, synthesize the platform paste chord, then put the
//! previous contents back. The restore always happens, even when the
//! chord is refused, so the user's clipboard survives every outcome.

use std::thread;
use std::time::Duration;

use enigo::Direction::{Click, Press, Release};
use enigo::{Enigo, Key, Keyboard};
use thiserror::Error;
use tracing::{debug, warn};

use crate::controller::Inject;

/// How long the frontmost application gets to consume the paste chord
/// before the clipboard is restored underneath it.
const PASTE_SETTLE: Duration = Duration::from_millis(150);

#[derive(Debug, Error)]
pub enum PasteError {
    /// The OS refused the synthetic keystroke, typically a missing
    /// accessibility or input permission.
    #[error("Synthetic input rejected: {0}")]
    InputDenied(String),

    /// The clipboard could not be read or written.
    #[error("Clipboard error: {0}")]
    Clipboard(String),
}

/// Clipboard seam.
pub trait ClipboardText {
    fn get(&mut self) -> Result<String, PasteError>;
    fn set(&mut self, text: &str) -> Result<(), PasteError>;
}

/// Keystroke synthesis seam.
pub trait Keystrokes {
    fn paste_chord(&mut self) -> Result<(), PasteError>;
}

/// Pastes text at the cursor while preserving the clipboard.
pub struct PasteDispatcher<C, K> {
    clipboard: C,
    keys: K,
}

impl PasteDispatcher<SystemClipboard, SystemKeys> {
    /// Build a dispatcher against the real clipboard and input system.
    pub fn system() -> Result<Self, PasteError> {
        Ok(Self::with_parts(SystemClipboard::new()?, SystemKeys::new()?))
    }
}

impl<C, K> PasteDispatcher<C, K>
where
    C: ClipboardText,
    K: Keystrokes,
{
    pub fn with_parts(clipboard: C, keys: K) -> Self {
        Self { clipboard, keys }
    }

    /// Paste `text` at the cursor. The previous clipboard contents are
    /// restored before returning, on success and on failure alike.
    pub fn paste(&mut self, text: &str) -> Result<(), PasteError> {
        // Non-text contents read as an error here; then there is nothing
        // to put back.
        let previous = self.clipboard.get().ok();

        self.clipboard.set(text)?;
        let chord = self.keys.paste_chord();
        if chord.is_ok() {
            // Give the focused application time to read the clipboard
            // before we overwrite it again.
            thread::sleep(PASTE_SETTLE);
        }
        self.restore(previous);
        chord
    }

    fn restore(&mut self, previous: Option<String>) {
        match previous {
            Some(contents) => {
                if let Err(e) = self.clipboard.set(&contents) {
                    warn!(error = %e, "Failed to restore clipboard contents");
                }
            }
            None => debug!("No previous clipboard text to restore"),
        }
    }
}

impl<C, K> Inject for PasteDispatcher<C, K>
where
    C: ClipboardText,
    K: Keystrokes,
{
    fn inject(&mut self, text: &str) -> anyhow::Result<()> {
        self.paste(text).map_err(Into::into)
    }
}

/// The real system clipboard.
pub struct SystemClipboard {
    clipboard: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, PasteError> {
        let clipboard =
            arboard::Clipboard::new().map_err(|e| PasteError::Clipboard(e.to_string()))?;
        Ok(Self { clipboard })
    }
}

impl ClipboardText for SystemClipboard {
    fn get(&mut self) -> Result<String, PasteError> {
        self.clipboard
            .get_text()
            .map_err(|e| PasteError::Clipboard(e.to_string()))
    }

    fn set(&mut self, text: &str) -> Result<(), PasteError> {
        self.clipboard
            .set_text(text)
            .map_err(|e| PasteError::Clipboard(e.to_string()))
    }
}

/// Keystroke synthesis through enigo.
pub struct SystemKeys {
    enigo: Enigo,
}

impl SystemKeys {
    pub fn new() -> Result<Self, PasteError> {
        let enigo = Enigo::new(&enigo::Settings::default())
            .map_err(|e| PasteError::InputDenied(e.to_string()))?;
        Ok(Self { enigo })
    }
}

impl Keystrokes for SystemKeys {
    fn paste_chord(&mut self) -> Result<(), PasteError> {
        let denied = |e: enigo::InputError| PasteError::InputDenied(e.to_string());
        chord(|key, direction| self.enigo.key(key, direction).map_err(denied))
    }
}

/// Run the platform paste chord through `key`. Once the modifier press
/// succeeds the release is always attempted, so a failed click cannot
/// leave the modifier held down.
fn chord<F>(mut key: F) -> Result<(), PasteError>
where
    F: FnMut(Key, enigo::Direction) -> Result<(), PasteError>,
{
    #[cfg(target_os = "macos")]
    let modifier = Key::Meta;
    #[cfg(not(target_os = "macos"))]
    let modifier = Key::Control;

    key(modifier, Press)?;
    let clicked = key(Key::Unicode('v'), Click);
    let released = key(modifier, Release);
    clicked.and(released)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    pub(crate) type ClipboardStore = Arc<Mutex<Option<String>>>;

    pub(crate) fn shared_clipboard(initial: Option<String>) -> ClipboardStore {
        Arc::new(Mutex::new(initial))
    }

    /// An in-memory clipboard over a shared store.
    pub(crate) struct MemClipboard {
        store: ClipboardStore,
    }

    impl MemClipboard {
        pub(crate) fn new(store: &ClipboardStore) -> Self {
            Self {
                store: store.clone(),
            }
        }
    }

    impl ClipboardText for MemClipboard {
        fn get(&mut self) -> Result<String, PasteError> {
            self.store
                .lock()
                .clone()
                .ok_or_else(|| PasteError::Clipboard("clipboard is empty".to_string()))
        }

        fn set(&mut self, text: &str) -> Result<(), PasteError> {
            *self.store.lock() = Some(text.to_string());
            Ok(())
        }
    }

    /// Counts chords and snapshots the shared clipboard at chord time.
    #[derive(Clone)]
    pub(crate) struct RecordingKeys {
        store: ClipboardStore,
        presses: Arc<AtomicUsize>,
        seen: Arc<Mutex<Option<String>>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingKeys {
        pub(crate) fn new(store: &ClipboardStore) -> Self {
            Self {
                store: store.clone(),
                presses: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(None)),
                fail: Arc::new(AtomicBool::new(false)),
            }
        }

        pub(crate) fn deny(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        pub(crate) fn presses(&self) -> usize {
            self.presses.load(Ordering::SeqCst)
        }

        /// What the clipboard held when the chord fired.
        pub(crate) fn seen_at_chord(&self) -> Option<String> {
            self.seen.lock().clone()
        }
    }

    impl Keystrokes for RecordingKeys {
        fn paste_chord(&mut self) -> Result<(), PasteError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PasteError::InputDenied("not permitted".to_string()));
            }
            self.presses.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock() = self.store.lock().clone();
            Ok(())
        }
    }
}
