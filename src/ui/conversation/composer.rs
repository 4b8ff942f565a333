use crate::prompts::INPUT_PLACEHOLDER;
use crate::ui::conversation::commands::{command_entries, parse_slash_command, CommandEntry, ParsedCommand};
use crate::ui::conversation::history::wrap_line;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::block::{Position, Title},
    widgets::{Block, Borders, Clear, Widget},
};

const CURSOR: char = '▌';

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ConversationResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// State for the text area within the composer. `cursor` is a byte offset on a char boundary.
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    pub cursor: usize,
}

impl TextAreaState {
    fn insert_str(&mut self, text: &str) {
        self.content.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    fn backspace(&mut self) -> bool {
        let Some((prev, _)) = self.content[..self.cursor].char_indices().next_back() else {
            return false;
        };
        self.content.remove(prev);
        self.cursor = prev;
        true
    }

    fn delete(&mut self) -> bool {
        if self.cursor < self.content.len() {
            self.content.remove(self.cursor);
            true
        } else {
            false
        }
    }

    fn move_left(&mut self) {
        if let Some((prev, _)) = self.content[..self.cursor].char_indices().next_back() {
            self.cursor = prev;
        }
    }

    fn move_right(&mut self) {
        if let Some(c) = self.content[self.cursor..].chars().next() {
            self.cursor += c.len_utf8();
        }
    }

    fn line_start(&self) -> usize {
        self.content[..self.cursor].rfind('\n').map_or(0, |i| i + 1)
    }

    fn line_end(&self) -> usize {
        self.content[self.cursor..]
            .find('\n')
            .map_or(self.content.len(), |i| self.cursor + i)
    }

    fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
    }
}

/// Multi-line input area with a slash-command palette
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    locked: bool,
    max_lines: u16,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(max_lines: u16) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: INPUT_PLACEHOLDER.to_string(),
            locked: false,
            max_lines: max_lines.max(1),
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationResult {
        if key.kind == KeyEventKind::Release {
            return ConversationResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) {
                    self.state.insert_str("\n");
                    self.close_command_palette();
                } else if self.show_command_palette
                    && self.selection_differs_from_input()
                    && self.apply_selected_command()
                {
                    return ConversationResult::None;
                } else {
                    return self.submit();
                }
            }
            KeyCode::Up => {
                if self.show_command_palette {
                    self.move_command_selection(-1);
                }
            }
            KeyCode::Down => {
                if self.show_command_palette {
                    self.move_command_selection(1);
                }
            }
            KeyCode::Esc => {
                if self.show_command_palette {
                    self.close_command_palette();
                }
            }
            KeyCode::Tab => {
                if self.show_command_palette {
                    self.apply_selected_command();
                }
            }
            KeyCode::Char(c) => {
                if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
                    return ConversationResult::None;
                }
                self.state.insert_str(c.encode_utf8(&mut [0; 4]));
                self.sync_command_palette();
            }
            KeyCode::Backspace => {
                if self.state.backspace() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Delete => {
                if self.state.delete() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Left => self.state.move_left(),
            KeyCode::Right => self.state.move_right(),
            KeyCode::Home => self.state.cursor = self.state.line_start(),
            KeyCode::End => self.state.cursor = self.state.line_end(),
            _ => {}
        }

        ConversationResult::None
    }

    /// Insert pasted text at the cursor; CRLF is normalised to LF
    pub fn paste(&mut self, text: &str) {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        self.state.insert_str(&text);
        self.sync_command_palette();
    }

    fn submit(&mut self) -> ConversationResult {
        if let Some(command) = parse_slash_command(&self.state.content) {
            self.state.clear();
            self.close_command_palette();
            return ConversationResult::Command(command);
        }

        if self.locked || self.state.content.trim().is_empty() {
            return ConversationResult::None;
        }

        let content = std::mem::take(&mut self.state.content);
        self.state.cursor = 0;
        self.close_command_palette();
        ConversationResult::Submitted(content)
    }

    fn sync_command_palette(&mut self) {
        let content = &self.state.content;
        let is_command_head = content.starts_with('/') && !content.contains(char::is_whitespace);
        if is_command_head {
            if !self.show_command_palette {
                self.show_command_palette = true;
                self.selected_command = Some(0);
            }
            self.refresh_command_palette();
        } else if self.show_command_palette {
            self.close_command_palette();
        }
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        if self.filtered_commands.is_empty() {
            self.selected_command = None;
        } else {
            let index = self.selected_command.unwrap_or(0);
            self.selected_command = Some(index.min(self.filtered_commands.len() - 1));
        }
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len);
        self.selected_command = Some(next as usize);
    }

    /// True when Enter should complete the highlighted entry rather than run what was typed
    fn selection_differs_from_input(&self) -> bool {
        self.selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .is_some_and(|entry| {
                let typed = self.state.content.trim().trim_start_matches('/');
                !typed.eq_ignore_ascii_case(entry.keyword)
            })
    }

    fn apply_selected_command(&mut self) -> bool {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
        else {
            return false;
        };

        self.state.content = format!("/{}", entry.keyword);
        self.state.cursor = self.state.content.len();
        self.close_command_palette();
        true
    }

    /// Refuse plain submissions (commands still go through) while a reply is outstanding
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Get current content
    pub fn content(&self) -> &str {
        &self.state.content
    }

    /// Whether Enter would send a message right now
    pub fn can_send(&self) -> bool {
        !self.locked && !self.state.content.trim().is_empty()
    }

    /// Rows needed to draw the composer in an area `width` columns wide, borders included
    pub fn desired_height(&self, width: u16) -> u16 {
        let rows = if self.state.content.is_empty() {
            1
        } else {
            self.wrapped_rows(width.saturating_sub(2)).0.len()
        };
        u16::try_from(rows).unwrap_or(u16::MAX).clamp(1, self.max_lines) + 2
    }

    /// Content with the cursor drawn in, word-wrapped to `width` columns.
    /// Also returns the index of the row holding the cursor.
    fn wrapped_rows(&self, width: u16) -> (Vec<Line<'static>>, usize) {
        let mut content = self.state.content.clone();
        let cursor = self.state.cursor.min(content.len());
        content.insert(cursor, CURSOR);
        let cursor_char = content[..cursor].chars().count();

        let mut rows = Vec::new();
        let mut cursor_row = 0;
        let mut consumed = 0;
        for text in content.split('\n') {
            for row in wrap_line(&Line::from(text.to_string()), width.max(1) as usize) {
                let len: usize = row.spans.iter().map(|span| span.content.chars().count()).sum();
                if (consumed..consumed + len).contains(&cursor_char) {
                    cursor_row = rows.len();
                }
                consumed += len;
                rows.push(row);
            }
            consumed += 1;
        }
        (rows, cursor_row)
    }

    /// Clear content
    pub fn clear(&mut self) {
        self.state.clear();
        self.close_command_palette();
    }

    fn title(&self) -> Line<'static> {
        let hint = if self.locked {
            Span::styled(" Analyzing… ", Style::default().fg(Color::Yellow))
        } else if self.can_send() {
            Span::styled(" Enter to send ", Style::default().fg(Color::Green))
        } else {
            Span::styled(" Message ", Style::default().fg(Color::Gray))
        };
        Line::from(vec![hint])
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title())
            .title(
                Title::from(" Shift+Enter newline · Ctrl+L clear · Ctrl+Y copy ")
                    .position(Position::Bottom)
                    .alignment(Alignment::Right),
            )
            .border_style(if !self.locked {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::DarkGray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            ));
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            let (rows, cursor_row) = self.wrapped_rows(inner_area.width);
            let visible = inner_area.height as usize;
            let first = cursor_row.saturating_sub(visible.saturating_sub(1));
            for (row, line) in rows.iter().skip(first).take(visible).enumerate() {
                buf.set_line(inner_area.x, inner_area.y + row as u16, line, inner_area.width);
            }
        }

        if self.show_command_palette && !self.filtered_commands.is_empty() {
            let palette_height = (self.filtered_commands.len().min(5) + 2) as u16;
            let palette_area = Rect {
                x: area.x,
                y: area.y.saturating_sub(palette_height),
                width: area.width,
                height: palette_height.min(area.y),
            };
            if palette_area.height < 3 {
                return;
            }

            Clear.render(palette_area, buf);
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .border_style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            block.render(palette_area, buf);

            for (index, entry) in self.filtered_commands.iter().enumerate() {
                if index >= inner.height as usize {
                    break;
                }

                let style = if self.selected_command == Some(index) {
                    Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled(" · ", Style::default().fg(Color::DarkGray)),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);

                buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
            }
        }
    }
}
