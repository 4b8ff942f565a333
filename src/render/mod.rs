//! Message rendering: plain text for user turns, markdown for bot turns.

pub mod code;

use crate::events::{Message, Sender};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::UnicodeWidthStr;

const INLINE_CODE: Style = Style::new().fg(Color::Yellow);
const QUOTE_BAR: &str = "▎ ";
const CODE_INDENT: &str = "  ";

/// Display form of one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedMessage {
    pub lines: Vec<Line<'static>>,
}

impl RenderedMessage {
    /// Text content with styling stripped, one entry per line
    pub fn plain_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
            .collect()
    }
}

/// Render a message. Pure: the message is only read.
pub fn render(message: &Message) -> RenderedMessage {
    let lines = match message.sender() {
        Sender::User => render_plain(message.text()),
        Sender::Bot => render_markdown(message.text()),
    };
    RenderedMessage { lines }
}

/// Plain text, one line per source line, no interpretation
pub fn render_plain(text: &str) -> Vec<Line<'static>> {
    text.split('\n')
        .map(|line| Line::from(line.trim_end_matches('\r').to_string()))
        .collect()
}

/// Markdown with tables, strikethrough, task lists, and soft breaks rendered as line breaks
pub fn render_markdown(text: &str) -> Vec<Line<'static>> {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut writer = MarkdownWriter::default();
    for event in Parser::new_ext(text, options) {
        writer.handle(event);
    }
    writer.finish()
}

struct CodeBuffer {
    lang: Option<String>,
    text: String,
}

#[derive(Default)]
struct TableBuffer {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
    has_header: bool,
}

#[derive(Default)]
struct MarkdownWriter {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    item_marker: Option<String>,
    quote_depth: usize,
    links: Vec<String>,
    code: Option<CodeBuffer>,
    table: Option<TableBuffer>,
}

impl MarkdownWriter {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.push_str(&code);
                } else {
                    self.spans.push(Span::styled(code.to_string(), INLINE_CODE));
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => self.text(html.trim_end_matches('\n')),
            Event::SoftBreak | Event::HardBreak => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.push(' ');
                } else {
                    self.flush_line();
                }
            }
            Event::Rule => {
                self.flush_line();
                self.lines
                    .push(Line::from(Span::styled("─".repeat(24), Style::new().fg(Color::DarkGray))));
                self.blank_line();
            }
            Event::TaskListMarker(checked) => {
                self.spans
                    .push(Span::raw(if checked { "[x] " } else { "[ ] " }));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.flush_line();
                let style = Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD);
                self.push_style(style);
                let hashes = "#".repeat(heading_depth(level));
                self.spans.push(Span::styled(format!("{hashes} "), style));
            }
            Tag::BlockQuote => {
                self.flush_line();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some(CodeBuffer {
                    lang,
                    text: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_line();
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.item_marker = Some(marker);
            }
            Tag::Emphasis => self.push_style(Style::new().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::new().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.push_style(Style::new().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { dest_url, .. } => {
                self.push_style(Style::new().fg(Color::Blue).add_modifier(Modifier::UNDERLINED));
                self.links.push(dest_url.to_string());
            }
            Tag::Image { dest_url, .. } => {
                self.spans.push(Span::raw("[image: "));
                self.links.push(dest_url.to_string());
            }
            Tag::Table(_) => {
                self.flush_line();
                self.table = Some(TableBuffer::default());
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell.clear();
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush_line();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Heading(_) => {
                self.styles.pop();
                self.flush_line();
                self.blank_line();
            }
            TagEnd::BlockQuote => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    self.blank_line();
                }
            }
            TagEnd::CodeBlock => {
                if let Some(block) = self.code.take() {
                    self.write_code_block(block);
                }
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => {
                self.flush_line();
                self.item_marker = None;
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link => {
                self.styles.pop();
                if let Some(url) = self.links.pop().filter(|url| !url.is_empty()) {
                    self.spans
                        .push(Span::styled(format!(" ({url})"), Style::new().fg(Color::DarkGray)));
                }
            }
            TagEnd::Image => {
                self.links.pop();
                self.spans.push(Span::raw("]"));
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = std::mem::take(&mut table.cell);
                    table.row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                    table.has_header = true;
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.write_table(table);
                }
                self.blank_line();
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.text.push_str(text);
            return;
        }
        if let Some(table) = self.table.as_mut() {
            table.cell.push_str(text);
            return;
        }
        let style = self.current_style();
        let mut parts = text.split('\n').peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                self.spans.push(Span::styled(part.to_string(), style));
            }
            if parts.peek().is_some() {
                self.flush_line();
            }
        }
    }

    fn current_style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, style: Style) {
        let next = self.current_style().patch(style);
        self.styles.push(next);
    }

    /// Prefix for a new output line: quote bars, list indentation, item marker
    fn line_prefix(&mut self) -> Option<Span<'static>> {
        let mut prefix = QUOTE_BAR.repeat(self.quote_depth);
        if !self.lists.is_empty() {
            prefix.push_str(&"  ".repeat(self.lists.len() - 1));
            match self.item_marker.take() {
                Some(marker) => {
                    let width = marker.chars().count();
                    prefix.push_str(&marker);
                    self.item_marker = Some(" ".repeat(width));
                }
                None => prefix.push_str("  "),
            }
        }
        if prefix.is_empty() {
            None
        } else {
            Some(Span::styled(prefix, Style::new().fg(Color::DarkGray)))
        }
    }

    fn flush_line(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.spans.len() + 1);
        if let Some(prefix) = self.line_prefix() {
            spans.push(prefix);
        }
        spans.append(&mut self.spans);
        self.lines.push(Line::from(spans));
    }

    fn blank_line(&mut self) {
        if self.lines.last().is_some_and(|line| !line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn write_code_block(&mut self, block: CodeBuffer) {
        if let Some(lang) = block.lang.as_deref() {
            let label = Span::styled(format!("{CODE_INDENT}╭─ {lang}"), Style::new().fg(Color::DarkGray));
            self.spans.push(label);
            self.flush_line();
        }
        for line in code::render_code_block(&block.text, block.lang.as_deref()) {
            let mut spans = vec![Span::raw(CODE_INDENT)];
            spans.extend(line.spans);
            self.spans = spans;
            self.flush_line();
        }
    }

    fn write_table(&mut self, table: TableBuffer) {
        let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for row in &table.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.width());
            }
        }
        let separator = Style::new().fg(Color::DarkGray);

        for (index, row) in table.rows.iter().enumerate() {
            let is_header = table.has_header && index == 0;
            let cell_style = if is_header {
                Style::new().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            for (i, width) in widths.iter().enumerate() {
                if i > 0 {
                    self.spans.push(Span::styled(" │ ", separator));
                }
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                let padding = width.saturating_sub(cell.width());
                self.spans
                    .push(Span::styled(format!("{cell}{}", " ".repeat(padding)), cell_style));
            }
            self.flush_line();

            if is_header {
                let rule = widths
                    .iter()
                    .map(|width| "─".repeat(*width))
                    .collect::<Vec<_>>()
                    .join("─┼─");
                self.spans.push(Span::styled(rule, separator));
                self.flush_line();
            }
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        if let Some(block) = self.code.take() {
            self.write_code_block(block);
        }
        self.flush_line();
        while self.lines.last().is_some_and(|line| line.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
