//! Code block rendering: syntect highlighting for known languages, plain text otherwise.

use once_cell::sync::Lazy;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

const THEME_NAME: &str = "base16-ocean.dark";

/// Style for code blocks without a recognized fence tag
pub const PLAIN_CODE: Style = Style::new().fg(Color::Gray);

struct HighlightAssets {
    syntax_set: SyntaxSet,
    theme: Option<Theme>,
}

static ASSETS: Lazy<HighlightAssets> = Lazy::new(|| {
    let syntax_set = SyntaxSet::load_defaults_newlines();
    let mut themes = ThemeSet::load_defaults().themes;
    let theme = themes
        .remove(THEME_NAME)
        .or_else(|| themes.into_values().next());
    HighlightAssets { syntax_set, theme }
});

/// How a code block is drawn, decided from its fence tag alone
#[derive(Clone, Copy)]
pub enum CodeStyle {
    Highlighted(&'static SyntaxReference),
    Plain,
}

/// Pick the renderer for a fence language tag
pub fn code_style_for(lang: Option<&str>) -> CodeStyle {
    let Some(lang) = lang.map(str::trim).filter(|lang| !lang.is_empty()) else {
        return CodeStyle::Plain;
    };
    if ASSETS.theme.is_none() {
        return CodeStyle::Plain;
    }
    ASSETS
        .syntax_set
        .find_syntax_by_token(lang)
        .or_else(|| ASSETS.syntax_set.find_syntax_by_extension(lang))
        .map(CodeStyle::Highlighted)
        .unwrap_or(CodeStyle::Plain)
}

/// Render a code block body into lines. The trailing newline is dropped.
pub fn render_code_block(code: &str, lang: Option<&str>) -> Vec<Line<'static>> {
    match code_style_for(lang) {
        CodeStyle::Highlighted(syntax) => highlight(code, syntax),
        CodeStyle::Plain => plain(code),
    }
}

fn plain(code: &str) -> Vec<Line<'static>> {
    code.trim_end_matches('\n')
        .split('\n')
        .map(|line| Line::from(Span::styled(line.to_string(), PLAIN_CODE)))
        .collect()
}

fn highlight(code: &str, syntax: &SyntaxReference) -> Vec<Line<'static>> {
    let Some(theme) = ASSETS.theme.as_ref() else {
        return plain(code);
    };
    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();

    for source_line in LinesWithEndings::from(code.trim_end_matches('\n')) {
        let ranges = match highlighter.highlight_line(source_line, &ASSETS.syntax_set) {
            Ok(ranges) => ranges,
            Err(err) => {
                tracing::debug!(error = %err, "highlighting failed, falling back to plain text");
                return plain(code);
            }
        };

        let spans: Vec<Span<'static>> = ranges
            .into_iter()
            .filter_map(|(style, text)| {
                let text = text.trim_end_matches(['\n', '\r']);
                if text.is_empty() {
                    return None;
                }
                let fg = style.foreground;
                let mut span_style = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
                if style.font_style.contains(FontStyle::BOLD) {
                    span_style = span_style.add_modifier(Modifier::BOLD);
                }
                if style.font_style.contains(FontStyle::ITALIC) {
                    span_style = span_style.add_modifier(Modifier::ITALIC);
                }
                if style.font_style.contains(FontStyle::UNDERLINE) {
                    span_style = span_style.add_modifier(Modifier::UNDERLINED);
                }
                Some(Span::styled(text.to_string(), span_style))
            })
            .collect();
        lines.push(Line::from(spans));
    }

    if lines.is_empty() {
        lines.push(Line::default());
    }
    lines
}
