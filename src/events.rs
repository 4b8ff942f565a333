use chrono::{DateTime, Local};

use crate::error::CompletionError;

/// Internal application events delivered to the UI loop
#[derive(Debug)]
pub enum AppEvent {
    /// A completion round-trip finished for the turn issued under `generation`
    CompletionFinished {
        generation: u64,
        outcome: Result<String, CompletionError>,
    },
}

/// TUI-specific events (keyboard, paste, resize, redraw)
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Paste event
    Paste(String),

    /// Terminal resize; the next draw picks up the new size
    Resize,

    /// Periodic redraw tick
    Tick,
}

impl TuiEvent {
    /// Map a raw crossterm event; mouse and focus events are dropped.
    pub fn from_crossterm(event: crossterm::event::Event) -> Option<Self> {
        use crossterm::event::Event;
        match event {
            Event::Key(key) => Some(TuiEvent::Key(key)),
            Event::Paste(text) => Some(TuiEvent::Paste(text)),
            Event::Resize(..) => Some(TuiEvent::Resize),
            _ => None,
        }
    }
}

/// Author of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn display_name(&self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Bot => "bit.",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Sender::User => "👤",
            Sender::Bot => "🤖",
        }
    }
}

/// One turn in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
    sender: Sender,
    sent_at: DateTime<Local>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Sender::User)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Bot)
    }

    fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            sent_at: Local::now(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn sent_at(&self) -> DateTime<Local> {
        self.sent_at
    }

    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }
}
