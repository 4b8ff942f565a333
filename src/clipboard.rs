use crate::error::ClipboardError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Destination for copied text
pub trait ClipboardSink {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// The platform clipboard.
///
/// The handle is opened lazily and then kept alive: on X11/Wayland the copied
/// text is only served while the owning `arboard::Clipboard` exists.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        if self.inner.is_none() {
            let clipboard =
                arboard::Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            self.inner = Some(clipboard);
        }
        let Some(clipboard) = self.inner.as_mut() else {
            return Err(ClipboardError::Unavailable("clipboard not initialised".to_string()));
        };
        clipboard
            .set_text(text.to_string())
            .map_err(|e| ClipboardError::Write(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Acknowledgment {
    index: usize,
    expires_at: Instant,
}

/// Copy-to-clipboard affordance with a self-clearing "Copied" acknowledgment.
///
/// Time is passed in by the caller so the acknowledgment window can be driven
/// by a virtual clock.
pub struct CopyTracker<C: ClipboardSink> {
    sink: C,
    ack_duration: Duration,
    ack: Option<Acknowledgment>,
}

impl<C: ClipboardSink> CopyTracker<C> {
    pub fn new(sink: C, ack_duration: Duration) -> Self {
        Self {
            sink,
            ack_duration,
            ack: None,
        }
    }

    /// Copy `text` for message `index`. A newer copy replaces any pending acknowledgment.
    pub fn copy(&mut self, index: usize, text: &str, now: Instant) -> Result<(), ClipboardError> {
        match self.sink.set_text(text) {
            Ok(()) => {
                debug!(index, chars = text.chars().count(), "copied message to clipboard");
                self.ack = Some(Acknowledgment {
                    index,
                    expires_at: now + self.ack_duration,
                });
                Ok(())
            }
            Err(err) => {
                warn!(index, error = %err, "failed to copy message");
                Err(err)
            }
        }
    }

    /// Index of the message currently showing "Copied", if any
    pub fn acknowledged(&self, now: Instant) -> Option<usize> {
        self.ack
            .filter(|ack| now < ack.expires_at)
            .map(|ack| ack.index)
    }

    /// Drop an expired acknowledgment. Returns true when something changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.ack {
            Some(ack) if now >= ack.expires_at => {
                self.ack = None;
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn sink(&self) -> &C {
        &self.sink
    }

    /// Forget any acknowledgment, e.g. after the messages it pointed at are gone
    pub fn reset(&mut self) {
        self.ack = None;
    }
}
