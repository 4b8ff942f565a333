//! Conversation history display component

use crate::events::{Message, Sender};
use crate::prompts::{ANALYZING, WELCOME_HEADING, WELCOME_SUBHEADING};
use crate::render::{self, RenderedMessage};
use crate::session::Session;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
        StatefulWidget, Widget,
    },
};
use std::cell::Cell;
use unicode_width::UnicodeWidthChar;

const BODY_INDENT: &str = "  ";

/// Rendered view of the Message Store with bottom-anchored scrollback.
///
/// Messages never change once appended, so each one is rendered exactly once
/// and cached until the session generation moves on.
pub struct ConversationHistory {
    rendered: Vec<RenderedMessage>,
    generation: u64,
    scroll_offset: usize,
    max_scroll: Cell<usize>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self {
            rendered: Vec::new(),
            generation: 0,
            scroll_offset: 0,
            max_scroll: Cell::new(0),
        }
    }

    /// Render any messages appended since the last call. Returns true when the cache changed.
    pub fn sync(&mut self, session: &Session) -> bool {
        let messages = session.messages();
        if session.generation() != self.generation || messages.len() < self.rendered.len() {
            self.rendered.clear();
            self.generation = session.generation();
            self.scroll_to_bottom();
        }
        if messages.len() == self.rendered.len() {
            return false;
        }

        self.rendered
            .extend(messages[self.rendered.len()..].iter().map(render::render));
        self.scroll_to_bottom();
        true
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.scroll_offset = (self.scroll_offset + rows).min(self.max_scroll.get());
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(rows);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    #[cfg(test)]
    pub fn rendered_count(&self) -> usize {
        self.rendered.len()
    }

    /// Widget drawing this history for `session`
    pub fn view<'a>(
        &'a self,
        session: &'a Session,
        copied: Option<usize>,
        spinner_phase: usize,
    ) -> HistoryView<'a> {
        HistoryView {
            history: self,
            session,
            copied,
            spinner_phase,
        }
    }
}

pub struct HistoryView<'a> {
    history: &'a ConversationHistory,
    session: &'a Session,
    copied: Option<usize>,
    spinner_phase: usize,
}

impl HistoryView<'_> {
    fn welcome_lines(height: u16) -> Vec<Line<'static>> {
        let top = (height as usize).saturating_sub(4) / 2;
        let mut lines = vec![Line::default(); top];
        lines.push(
            Line::from(Span::styled(
                WELCOME_HEADING,
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ))
            .alignment(ratatui::layout::Alignment::Center),
        );
        lines.push(
            Line::from(Span::styled(WELCOME_SUBHEADING, Style::default().fg(Color::Gray)))
                .alignment(ratatui::layout::Alignment::Center),
        );
        lines.push(Line::default());
        lines.push(
            Line::from(Span::styled(
                "Enter to send · Shift+Enter for a new line · /help for commands",
                Style::default().fg(Color::DarkGray),
            ))
            .alignment(ratatui::layout::Alignment::Center),
        );
        lines
    }

    fn message_lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        let mut reply_number = 0;

        for (index, (message, rendered)) in self
            .session
            .messages()
            .iter()
            .zip(self.history.rendered.iter())
            .enumerate()
        {
            if message.is_bot() {
                reply_number += 1;
            }
            lines.push(header_line(message, reply_number, self.copied == Some(index)));
            lines.extend(rendered.lines.iter().map(|line| {
                let mut spans = vec![Span::raw(BODY_INDENT)];
                spans.extend(line.spans.iter().cloned());
                Line::from(spans)
            }));
            lines.push(Line::default());
        }

        if self.session.is_busy() {
            let dots = match self.spinner_phase % 4 {
                0 => ".",
                1 => "..",
                2 => "...",
                _ => "",
            };
            lines.push(Line::from(vec![
                Span::styled("🤖 ", Style::default().fg(Color::Green)),
                Span::styled(ANALYZING, Style::default().fg(Color::Green)),
                Span::styled(dots, Style::default().fg(Color::Yellow)),
            ]));
        }

        lines
    }
}

impl Widget for HistoryView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " bit. ",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ));

        let inner_area = block.inner(area);
        block.render(area, buf);
        if inner_area.width == 0 || inner_area.height == 0 {
            return;
        }

        if !self.session.is_started() && self.session.messages().is_empty() {
            self.history.max_scroll.set(0);
            Paragraph::new(Self::welcome_lines(inner_area.height)).render(inner_area, buf);
            return;
        }

        let width = inner_area.width.saturating_sub(1).max(1) as usize;
        let rows: Vec<Line<'static>> = self
            .message_lines()
            .iter()
            .flat_map(|line| wrap_line(line, width))
            .collect();

        let height = inner_area.height as usize;
        let max_scroll = rows.len().saturating_sub(height);
        self.history.max_scroll.set(max_scroll);
        let offset = self.history.scroll_offset.min(max_scroll);
        let start = max_scroll - offset;

        for (i, line) in rows.iter().skip(start).take(height).enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, width as u16);
        }

        if max_scroll > 0 {
            let mut state = ScrollbarState::new(max_scroll).position(start);
            Scrollbar::default()
                .orientation(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .render(inner_area, buf, &mut state);
        }
    }
}

fn header_line(message: &Message, reply_number: usize, copied: bool) -> Line<'static> {
    let time = message.sent_at().format("%H:%M").to_string();
    let sender = message.sender();
    let color = match sender {
        Sender::User => Color::Blue,
        Sender::Bot => Color::Green,
    };

    let mut spans = vec![
        Span::raw(format!("{} ", sender.icon())),
        Span::styled(
            sender.display_name(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" · {time}"), Style::default().fg(Color::DarkGray)),
    ];

    if sender == Sender::Bot {
        if copied {
            spans.push(Span::styled(
                "  ✓ Copied",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::styled(
                format!("  ⧉ /copy {reply_number}"),
                Style::default().fg(Color::DarkGray),
            ));
        }
    }

    Line::from(spans)
}

/// Word-wrap a styled line to `width` columns, splitting mid-word only when a word is too long
pub fn wrap_line(line: &Line<'_>, width: usize) -> Vec<Line<'static>> {
    let cells: Vec<(char, Style, usize)> = line
        .spans
        .iter()
        .flat_map(|span| {
            let style = line.style.patch(span.style);
            span.content
                .chars()
                .map(move |c| (c, style, c.width().unwrap_or(0)))
        })
        .collect();

    if cells.is_empty() || width == 0 {
        return vec![aligned_like(Line::from(collect_spans(&cells)), line)];
    }

    let mut rows = Vec::new();
    let mut start = 0;
    while start < cells.len() {
        let mut used = 0;
        let mut end = start;
        let mut last_space = None;
        while end < cells.len() && used + cells[end].2 <= width {
            if cells[end].0 == ' ' {
                last_space = Some(end);
            }
            used += cells[end].2;
            end += 1;
        }

        if end < cells.len() {
            match last_space {
                Some(space) if space > start => end = space + 1,
                _ if end == start => end = start + 1,
                _ => {}
            }
        }

        rows.push(aligned_like(Line::from(collect_spans(&cells[start..end])), line));
        start = end;
    }
    rows
}

fn collect_spans(cells: &[(char, Style, usize)]) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut text = String::new();
    let mut current: Option<Style> = None;

    for &(c, style, _) in cells {
        if current.is_some_and(|s| s != style) {
            spans.push(Span::styled(std::mem::take(&mut text), current.unwrap_or_default()));
        }
        current = Some(style);
        text.push(c);
    }
    if !text.is_empty() {
        spans.push(Span::styled(text, current.unwrap_or_default()));
    }
    spans
}

fn aligned_like(mut row: Line<'static>, source: &Line<'_>) -> Line<'static> {
    row.alignment = source.alignment;
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;

    fn text_of(line: &Line) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    fn buffer_text(buf: &Buffer) -> String {
        let area = buf.area;
        let mut out = String::new();
        for y in area.y..area.y + area.height {
            for x in area.x..area.x + area.width {
                out.push_str(buf.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn wrap_prefers_word_boundaries() {
        let line = Line::from("the quick brown fox");
        let rows: Vec<String> = wrap_line(&line, 10).iter().map(text_of).collect();
        assert_eq!(rows, vec!["the quick ", "brown fox"]);
    }

    #[test]
    fn wrap_splits_long_words_and_keeps_styles() {
        let line = Line::from(vec![
            Span::styled("abcdef", Style::default().fg(Color::Red)),
            Span::raw("gh"),
        ]);
        let rows = wrap_line(&line, 4);
        assert_eq!(rows.iter().map(text_of).collect::<Vec<_>>(), vec!["abcd", "efgh"]);
        assert_eq!(rows[1].spans[0].style.fg, Some(Color::Red));
        assert_eq!(rows[1].spans[1].style.fg, None);
    }

    #[test]
    fn empty_lines_stay_one_row() {
        assert_eq!(wrap_line(&Line::default(), 10).len(), 1);
    }

    #[test]
    fn sync_renders_only_new_messages_and_resets_on_clear() {
        let mut session = Session::new();
        let mut history = ConversationHistory::new();
        assert!(!history.sync(&session));

        let turn = session.begin_turn("hi").unwrap();
        assert!(history.sync(&session));
        assert_eq!(history.rendered_count(), 1);

        session.finish_turn(turn.generation, Ok("hello".to_string()));
        assert!(history.sync(&session));
        assert_eq!(history.rendered_count(), 2);
        assert!(!history.sync(&session));

        session.clear();
        history.sync(&session);
        assert_eq!(history.rendered_count(), 0);
    }

    #[test]
    fn welcome_is_shown_before_the_first_message() {
        let session = Session::new();
        let history = ConversationHistory::new();
        let area = Rect::new(0, 0, 40, 10);
        let mut buf = Buffer::empty(area);
        history.view(&session, None, 0).render(area, &mut buf);

        let text = buffer_text(&buf);
        assert!(text.contains("Hi"));
        assert!(text.contains(WELCOME_SUBHEADING));
    }

    #[test]
    fn busy_session_shows_analyzing_and_copy_ack() {
        let mut session = Session::new();
        let mut history = ConversationHistory::new();
        let turn = session.begin_turn("first").unwrap();
        session.finish_turn(turn.generation, Err(CompletionError::Timeout));
        session.begin_turn("second").unwrap();
        history.sync(&session);

        let area = Rect::new(0, 0, 60, 14);
        let mut buf = Buffer::empty(area);
        history.view(&session, Some(1), 2).render(area, &mut buf);

        let text = buffer_text(&buf);
        assert!(text.contains("Analyzing..."));
        assert!(text.contains("✓ Copied"));
        assert!(text.contains("second"));
    }

    #[test]
    fn scrolling_is_clamped_to_content() {
        let mut session = Session::new();
        let mut history = ConversationHistory::new();
        for i in 0..6 {
            let turn = session.begin_turn(&format!("question {i}")).unwrap();
            session.finish_turn(turn.generation, Ok(format!("answer {i}")));
        }
        history.sync(&session);

        let area = Rect::new(0, 0, 40, 8);
        let mut buf = Buffer::empty(area);
        history.view(&session, None, 0).render(area, &mut buf);
        assert!(buffer_text(&buf).contains("answer 5"));

        history.scroll_up(10_000);
        let mut buf = Buffer::empty(area);
        history.view(&session, None, 0).render(area, &mut buf);
        let text = buffer_text(&buf);
        assert!(text.contains("question 0"));
        assert!(!text.contains("answer 5"));

        history.scroll_to_bottom();
        let mut buf = Buffer::empty(area);
        history.view(&session, None, 0).render(area, &mut buf);
        assert!(buffer_text(&buf).contains("answer 5"));
    }
}
