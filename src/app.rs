use crate::clipboard::SystemClipboard;
use crate::config::Config;
use crate::events::{AppEvent, TuiEvent};
use crate::llm::CompletionService;
use crate::session::SessionController;
use crate::ui::conversation::{ConversationAction, ConversationManager};
use anyhow::{Context, Result};
use crossterm::{
    event::{
        DisableBracketedPaste, EnableBracketedPaste, EventStream, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Terminal chat application: owns the UI state and drives the event loop
pub struct App {
    manager: ConversationManager<SystemClipboard>,
    events: mpsc::UnboundedReceiver<AppEvent>,
    tick_rate: Duration,
    should_quit: bool,
}

impl App {
    pub fn new(config: &Config, service: Arc<dyn CompletionService>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut manager = ConversationManager::new(
            SessionController::new(service),
            SystemClipboard::new(),
            &config.ui,
            config.model.clone(),
            tx,
        );

        if !config.has_api_key() {
            warn!(env = %config.api_key_env, "no API key configured");
            manager.warn(
                format!(
                    "No API key found: set {} or api_key in the config file",
                    config.api_key_env
                ),
                Instant::now(),
            );
        }

        Self {
            manager,
            events: rx,
            tick_rate: config.ui.tick(),
            should_quit: false,
        }
    }

    /// Take over the terminal, run until the user quits, then restore it
    pub async fn run(&mut self) -> Result<()> {
        let enhanced_keys = matches!(supports_keyboard_enhancement(), Ok(true));
        let mut terminal = setup_terminal(enhanced_keys)?;

        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            if enhanced_keys {
                let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
            }
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableBracketedPaste);
            original_hook(panic_info);
        }));

        info!(enhanced_keys, "terminal ui started");
        let result = self.event_loop(&mut terminal).await;
        restore_terminal(&mut terminal, enhanced_keys)?;
        info!("terminal ui stopped");
        result
    }

    async fn event_loop(&mut self, terminal: &mut Tui) -> Result<()> {
        let mut event_stream = EventStream::new();
        let mut tick = tokio::time::interval(self.tick_rate);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut dirty = true;

        loop {
            if dirty {
                terminal.draw(|frame| {
                    let area = frame.size();
                    self.manager
                        .render_conversation_ui(area, frame.buffer_mut(), Instant::now());
                })?;
                dirty = false;
            }

            if self.should_quit {
                return Ok(());
            }

            tokio::select! {
                maybe_event = event_stream.next() => match maybe_event {
                    Some(Ok(event)) => {
                        if let Some(event) = TuiEvent::from_crossterm(event) {
                            dirty = self.handle_tui_event(event);
                        }
                    }
                    Some(Err(err)) => return Err(err).context("Failed to read terminal events"),
                    None => return Ok(()),
                },

                Some(event) = self.events.recv() => {
                    self.manager.handle_app_event(event);
                    dirty = true;
                }

                _ = tick.tick() => {
                    dirty = self.handle_tui_event(TuiEvent::Tick);
                }
            }
        }
    }

    /// Returns true when the screen needs a redraw
    fn handle_tui_event(&mut self, event: TuiEvent) -> bool {
        let now = Instant::now();
        match event {
            TuiEvent::Key(key) => {
                if self.manager.handle_key(key, now) == ConversationAction::Exit {
                    self.should_quit = true;
                }
                true
            }
            TuiEvent::Paste(text) => {
                self.manager.handle_paste(&text);
                true
            }
            TuiEvent::Resize => true,
            TuiEvent::Tick => self.manager.tick(now),
        }
    }
}

fn setup_terminal(enhanced_keys: bool) -> Result<Tui> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    if enhanced_keys {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )?;
    }
    let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Tui, enhanced_keys: bool) -> Result<()> {
    if enhanced_keys {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;
    Ok(())
}
