use crate::clipboard::{ClipboardSink, CopyTracker, SystemClipboard};
use crate::config::UiConfig;
use crate::events::AppEvent;
use crate::session::{Session, SessionController};
use crate::ui::conversation::composer::ConversationResult;
use crate::ui::conversation::history::wrap_line;
use crate::ui::conversation::{
    get_help_text, ConversationComposer, ConversationHistory, ParsedCommand, SlashCommand,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};
use std::cell::Cell;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

const NOTICE_TTL: Duration = Duration::from_secs(6);
const SPINNER_FRAME: Duration = Duration::from_millis(300);
const MAX_STATUS_ROWS: usize = 4;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoticeLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct Notice {
    text: String,
    level: NoticeLevel,
    expires_at: Instant,
}

/// Manages the conversation flow and UI components
pub struct ConversationManager<C: ClipboardSink = SystemClipboard> {
    controller: SessionController,
    history: ConversationHistory,
    composer: ConversationComposer,
    copy: CopyTracker<C>,
    events: mpsc::UnboundedSender<AppEvent>,
    notice: Option<Notice>,
    model: String,
    started_at: Instant,
    page_rows: Cell<usize>,
}

impl<C: ClipboardSink> ConversationManager<C> {
    pub fn new(
        controller: SessionController,
        clipboard: C,
        ui: &UiConfig,
        model: impl Into<String>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            controller,
            history: ConversationHistory::new(),
            composer: ConversationComposer::new(ui.max_input_lines),
            copy: CopyTracker::new(clipboard, ui.copy_ack()),
            events,
            notice: None,
            model: model.into(),
            started_at: Instant::now(),
            page_rows: Cell::new(10),
        }
    }

    pub fn session(&self) -> &Session {
        self.controller.session()
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> ConversationAction {
        if key.kind == KeyEventKind::Release {
            return ConversationAction::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return ConversationAction::Exit,
            KeyCode::Char('l') if ctrl => {
                self.clear(now);
                return ConversationAction::None;
            }
            KeyCode::Char('y') if ctrl => {
                self.copy_reply(None, now);
                return ConversationAction::None;
            }
            KeyCode::PageUp => {
                self.history.scroll_up(self.page_rows.get());
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.history.scroll_down(self.page_rows.get());
                return ConversationAction::None;
            }
            KeyCode::Esc if self.composer.content().is_empty() => {
                return ConversationAction::Exit;
            }
            _ => {}
        }

        match self.composer.handle_key(key) {
            ConversationResult::Submitted(input) => {
                self.handle_input(&input);
                ConversationAction::None
            }
            ConversationResult::Command(command) => self.handle_slash_command(command, now),
            ConversationResult::None => ConversationAction::None,
        }
    }

    /// Show a warning in the status line
    pub fn warn(&mut self, text: impl Into<String>, now: Instant) {
        self.notify(text, NoticeLevel::Warning, now);
    }

    pub fn handle_paste(&mut self, text: &str) {
        self.composer.paste(text);
    }

    /// Apply a completion delivered by the background task
    pub fn handle_app_event(&mut self, event: AppEvent) -> bool {
        let applied = self.controller.handle_event(event);
        if applied {
            self.history.sync(self.controller.session());
        }
        self.composer.set_locked(self.controller.session().is_busy());
        applied
    }

    /// Expire timed UI state. Returns true when a redraw is needed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = self.copy.tick(now);
        if self.notice.as_ref().is_some_and(|notice| now >= notice.expires_at) {
            self.notice = None;
            changed = true;
        }
        changed || self.controller.session().is_busy()
    }

    fn handle_input(&mut self, input: &str) {
        if !self.controller.submit(input, &self.events) {
            return;
        }
        self.notice = None;
        self.history.sync(self.controller.session());
        self.composer.set_locked(true);
    }

    fn handle_slash_command(&mut self, command: ParsedCommand, now: Instant) -> ConversationAction {
        debug!(command = command.command.command(), "slash command");
        if self.session().is_busy() && !command.command.available_while_busy() {
            self.notify(
                format!("/{} is unavailable while a reply is pending", command.command.command()),
                NoticeLevel::Warning,
                now,
            );
            return ConversationAction::None;
        }

        match command.command {
            SlashCommand::Clear => self.clear(now),
            SlashCommand::Copy => match command.copy_target() {
                Ok(target) => self.copy_reply(target, now),
                Err(message) => self.notify(message, NoticeLevel::Warning, now),
            },
            SlashCommand::Help => self.notify(get_help_text(), NoticeLevel::Info, now),
            SlashCommand::Bye => return ConversationAction::Exit,
        }
        ConversationAction::None
    }

    fn clear(&mut self, now: Instant) {
        if self.controller.clear() {
            self.history.sync(self.controller.session());
            self.copy.reset();
            self.composer.clear();
            self.notify("Conversation cleared", NoticeLevel::Info, now);
        } else {
            self.notify(
                "Wait for the pending reply before clearing",
                NoticeLevel::Warning,
                now,
            );
        }
    }

    /// Copy bot reply number `target` (1-based), or the latest reply
    fn copy_reply(&mut self, target: Option<usize>, now: Instant) {
        let messages = self.controller.session().messages();
        let mut replies = messages.iter().enumerate().filter(|(_, m)| m.is_bot());
        let found = match target {
            Some(n) => replies.nth(n - 1),
            None => replies.last(),
        };

        let Some((index, message)) = found else {
            let text = match target {
                Some(n) => format!("There is no reply {n}"),
                None => "No reply to copy yet".to_string(),
            };
            self.notify(text, NoticeLevel::Warning, now);
            return;
        };

        let text = message.text().to_string();
        if let Err(err) = self.copy.copy(index, &text, now) {
            self.notify(format!("Couldn't copy: {err}"), NoticeLevel::Warning, now);
        }
    }

    fn notify(&mut self, text: impl Into<String>, level: NoticeLevel, now: Instant) {
        self.notice = Some(Notice {
            text: text.into(),
            level,
            expires_at: now + NOTICE_TTL,
        });
    }

    fn status_lines(&self, width: u16) -> Vec<Line<'static>> {
        let line = match &self.notice {
            Some(notice) => {
                let color = match notice.level {
                    NoticeLevel::Info => Color::Cyan,
                    NoticeLevel::Warning => Color::Yellow,
                };
                Line::from(Span::styled(notice.text.clone(), Style::default().fg(color)))
            }
            None => Line::from(vec![
                Span::styled(self.model.clone(), Style::default().fg(Color::Green)),
                Span::styled(
                    " · PgUp/PgDn scroll · /help · Ctrl+C quit",
                    Style::default().fg(Color::DarkGray),
                ),
            ]),
        };

        let mut rows = wrap_line(&line, width.max(1) as usize);
        rows.truncate(MAX_STATUS_ROWS);
        rows
    }

    /// Render the conversation UI components
    pub fn render_conversation_ui(&self, area: Rect, buf: &mut Buffer, now: Instant) {
        let status = self.status_lines(area.width);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(status.len() as u16),
                Constraint::Length(self.composer.desired_height(area.width)),
            ])
            .split(area);

        self.page_rows
            .set((chunks[0].height as usize).saturating_sub(3).max(1));

        let spinner_phase = (now.saturating_duration_since(self.started_at).as_millis()
            / SPINNER_FRAME.as_millis()) as usize;
        self.history
            .view(
                self.controller.session(),
                self.copy.acknowledged(now),
                spinner_phase,
            )
            .render(chunks[0], buf);

        for (row, line) in status.iter().enumerate() {
            if row as u16 >= chunks[1].height {
                break;
            }
            buf.set_line(chunks[1].x, chunks[1].y + row as u16, line, chunks[1].width);
        }

        self.composer.render(chunks[2], buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::tests::RecordingClipboard;
    use crate::error::CompletionError;
    use crate::prompts::FALLBACK_REPLY;
    use crate::session::tests::ScriptedCompletions;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn manager(
        replies: Vec<Result<String, CompletionError>>,
    ) -> (
        ConversationManager<RecordingClipboard>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = SessionController::new(ScriptedCompletions::replying(replies));
        let manager = ConversationManager::new(
            controller,
            RecordingClipboard::default(),
            &UiConfig::default(),
            "test-model",
            tx,
        );
        (manager, rx)
    }

    fn type_line(
        manager: &mut ConversationManager<RecordingClipboard>,
        text: &str,
        now: Instant,
    ) -> ConversationAction {
        for c in text.chars() {
            manager.handle_key(key(KeyCode::Char(c)), now);
        }
        manager.handle_key(key(KeyCode::Enter), now)
    }

    async fn complete_turn(
        manager: &mut ConversationManager<RecordingClipboard>,
        rx: &mut mpsc::UnboundedReceiver<AppEvent>,
        text: &str,
        now: Instant,
    ) {
        type_line(manager, text, now);
        let event = rx.recv().await.unwrap();
        assert!(manager.handle_app_event(event));
    }

    fn screen(manager: &ConversationManager<RecordingClipboard>, now: Instant) -> String {
        let area = Rect::new(0, 0, 70, 24);
        let mut buf = Buffer::empty(area);
        manager.render_conversation_ui(area, &mut buf, now);
        let mut out = String::new();
        for y in 0..area.height {
            for x in 0..area.width {
                out.push_str(buf.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[tokio::test]
    async fn submitting_shows_user_turn_then_reply() {
        let (mut manager, mut rx) = manager(vec![Ok("It went great".to_string())]);
        let now = Instant::now();

        type_line(&mut manager, "hello", now);
        assert!(manager.session().is_busy());
        assert_eq!(manager.session().messages().len(), 1);
        assert!(screen(&manager, now).contains("Analyzing"));

        let event = rx.recv().await.unwrap();
        assert!(manager.handle_app_event(event));
        assert!(!manager.session().is_busy());
        assert_eq!(manager.session().messages()[1].text(), "It went 🎉 great");
    }

    #[tokio::test]
    async fn input_is_refused_while_busy() {
        let (mut manager, _rx) = manager(vec![Ok("one".to_string())]);
        let now = Instant::now();

        type_line(&mut manager, "first", now);
        type_line(&mut manager, "second", now);
        assert_eq!(manager.session().messages().len(), 1);
    }

    #[tokio::test]
    async fn clear_is_refused_while_busy_and_works_after() {
        let (mut manager, mut rx) = manager(vec![Err(CompletionError::Timeout)]);
        let now = Instant::now();

        type_line(&mut manager, "hi", now);
        manager.handle_key(ctrl('l'), now);
        assert_eq!(manager.session().messages().len(), 1);
        assert!(screen(&manager, now).contains("Wait for the pending reply"));

        let event = rx.recv().await.unwrap();
        manager.handle_app_event(event);
        assert_eq!(manager.session().messages()[1].text(), FALLBACK_REPLY);

        assert_eq!(type_line(&mut manager, "/clear", now), ConversationAction::None);
        assert!(manager.session().messages().is_empty());
        assert!(!manager.session().is_started());
        assert!(screen(&manager, now).contains("use chat to get started"));
    }

    #[tokio::test]
    async fn copy_writes_raw_reply_and_acknowledges_briefly() {
        let (mut manager, mut rx) =
            manager(vec![Ok("first **bold**".to_string()), Ok("second".to_string())]);
        let now = Instant::now();
        complete_turn(&mut manager, &mut rx, "a", now).await;
        complete_turn(&mut manager, &mut rx, "b", now).await;

        manager.handle_key(ctrl('y'), now);
        type_line(&mut manager, "/copy 1", now);
        assert_eq!(
            manager.copy.sink().writes,
            vec!["second".to_string(), "first **bold**".to_string()]
        );
        assert_eq!(manager.copy.acknowledged(now), Some(1));
        assert!(screen(&manager, now).contains("✓ Copied"));

        let later = now + Duration::from_secs(2);
        assert!(manager.tick(later));
        assert!(!screen(&manager, later).contains("✓ Copied"));
    }

    #[tokio::test]
    async fn copy_without_reply_reports_notice() {
        let (mut manager, _rx) = manager(vec![]);
        let now = Instant::now();
        type_line(&mut manager, "/copy", now);
        assert!(screen(&manager, now).contains("No reply to copy yet"));
        type_line(&mut manager, "/copy 3", now);
        assert!(screen(&manager, now).contains("There is no reply 3"));
        assert!(manager.copy.sink().writes.is_empty());
    }

    #[test]
    fn quit_keys_and_command_exit() {
        let (mut manager, _rx) = manager(vec![]);
        let now = Instant::now();
        assert_eq!(manager.handle_key(ctrl('c'), now), ConversationAction::Exit);
        assert_eq!(manager.handle_key(key(KeyCode::Esc), now), ConversationAction::Exit);
        assert_eq!(type_line(&mut manager, "/bye", now), ConversationAction::Exit);

        manager.handle_key(key(KeyCode::Char('x')), now);
        assert_eq!(manager.handle_key(key(KeyCode::Esc), now), ConversationAction::None);
    }

    #[test]
    fn help_notice_expires() {
        let (mut manager, _rx) = manager(vec![]);
        let now = Instant::now();
        type_line(&mut manager, "/help", now);
        assert!(screen(&manager, now).contains("/clear"));

        assert!(manager.tick(now + NOTICE_TTL));
        assert!(screen(&manager, now + NOTICE_TTL).contains("test-model"));
    }

    #[tokio::test]
    async fn stale_completion_after_clear_is_ignored() {
        let service = ScriptedCompletions::replying(vec![Ok("late".to_string())]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut manager = ConversationManager::new(
            SessionController::new(service),
            RecordingClipboard::default(),
            &UiConfig::default(),
            "m",
            tx,
        );

        let stale = AppEvent::CompletionFinished {
            generation: 41,
            outcome: Ok("ghost".to_string()),
        };
        assert!(!manager.handle_app_event(stale));
        assert!(manager.session().messages().is_empty());
    }
}
