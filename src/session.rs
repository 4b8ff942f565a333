use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::CompletionError;
use crate::events::{AppEvent, Message};
use crate::llm::CompletionService;
use crate::postprocess;
use crate::prompts::FALLBACK_REPLY;

/// Conversation state for one UI session
#[derive(Debug, Default)]
pub struct Session {
    messages: Vec<Message>,
    busy: bool,
    started: bool,
    generation: u64,
}

/// A user turn waiting for its reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub generation: u64,
    pub request_id: Uuid,
    pub prompt: String,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Accept user input and append it as a user turn.
    ///
    /// Returns `None` for blank input or while a reply is outstanding.
    pub fn begin_turn(&mut self, text: &str) -> Option<PendingTurn> {
        if text.trim().is_empty() || self.busy {
            return None;
        }

        self.started = true;
        self.messages.push(Message::user(text));
        self.busy = true;

        Some(PendingTurn {
            generation: self.generation,
            request_id: Uuid::new_v4(),
            prompt: text.to_string(),
        })
    }

    /// Append the bot reply for a turn issued under `generation`.
    ///
    /// Replies from an older generation are discarded. Returns the appended message.
    pub fn finish_turn(
        &mut self,
        generation: u64,
        outcome: Result<String, CompletionError>,
    ) -> Option<&Message> {
        if generation != self.generation || !self.busy {
            info!(generation, current = self.generation, "discarding stale completion");
            return None;
        }

        let text = match outcome {
            Ok(raw) => postprocess::process(&raw),
            Err(err) => {
                warn!(error = %err, "completion failed");
                FALLBACK_REPLY.to_string()
            }
        };

        self.messages.push(Message::bot(text));
        self.busy = false;
        self.messages.last()
    }

    /// Empty the conversation. Refused while a reply is outstanding.
    pub fn clear(&mut self) -> bool {
        if self.busy {
            return false;
        }
        self.messages.clear();
        self.started = false;
        self.generation += 1;
        true
    }
}

/// Drives a [`Session`] against a completion service
pub struct SessionController {
    session: Session,
    service: Arc<dyn CompletionService>,
}

impl SessionController {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            session: Session::new(),
            service,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Start a turn and run its completion on a background task.
    ///
    /// The result arrives on `events` as [`AppEvent::CompletionFinished`].
    pub fn submit(&mut self, text: &str, events: &mpsc::UnboundedSender<AppEvent>) -> bool {
        let Some(turn) = self.session.begin_turn(text) else {
            return false;
        };
        info!(request_id = %turn.request_id, generation = turn.generation, "dispatching completion");

        let service = Arc::clone(&self.service);
        let events = events.clone();
        tokio::spawn(async move {
            let outcome = service.complete(&turn.prompt).await;
            if let Err(err) = &outcome {
                warn!(request_id = %turn.request_id, error = %err, "completion request failed");
            }
            let event = AppEvent::CompletionFinished {
                generation: turn.generation,
                outcome,
            };
            if events.send(event).is_err() {
                warn!(request_id = %turn.request_id, "UI loop gone before completion arrived");
            }
        });
        true
    }

    /// Apply an event produced by [`SessionController::submit`]
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::CompletionFinished { generation, outcome } => {
                self.session.finish_turn(generation, outcome).is_some()
            }
        }
    }

    /// Run one full turn in place: user append, completion, bot append
    pub async fn submit_and_wait(&mut self, text: &str) -> Option<&Message> {
        let turn = self.session.begin_turn(text)?;
        info!(request_id = %turn.request_id, generation = turn.generation, "running completion");
        let outcome = self.service.complete(&turn.prompt).await;
        self.session.finish_turn(turn.generation, outcome)
    }

    pub fn clear(&mut self) -> bool {
        let cleared = self.session.clear();
        if cleared {
            info!(generation = self.session.generation(), "session cleared");
        }
        cleared
    }
}
