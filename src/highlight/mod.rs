use ratatui::{
    style::{Color, Style},
    text::Span,
};
use syntect::{
    easy::HighlightLines,
    highlighting::{Color as SyntectColor, Theme, ThemeSet},
    parsing::SyntaxSet,
};

use crate::viewer::{DiffLine, LineKind};

/// Maximum line length for syntax highlighting (skip longer lines for performance).
const MAX_LINE_LENGTH: usize = 10_000;

/// Syntax highlighter for template bodies.
///
/// Loading the bundled syntaxes is slow, so build one and share it; use
/// `for_file()` to get a stateful session for a single file.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl Highlighter {
    pub fn new() -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();
        let theme = theme_set
            .themes
            .get("base16-ocean.dark")
            .or_else(|| theme_set.themes.values().next())
            .cloned()
            .unwrap_or_default();

        Self { syntax_set, theme }
    }

    /// Session for one file; parse state carries across lines, so feed lines
    /// in order.
    pub fn for_file(&self, file_ext: &str) -> FileHighlighter<'_> {
        FileHighlighter::new(&self.syntax_set, &self.theme, file_ext)
    }

    fn syntect_to_ratatui(color: SyntectColor) -> Color {
        Color::Rgb(color.r, color.g, color.b)
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn kind_color(kind: LineKind) -> Color {
    match kind {
        LineKind::Added => Color::Green,
        LineKind::Removed => Color::Red,
        LineKind::Context => Color::Reset,
    }
}

pub struct FileHighlighter<'a> {
    highlighter: Option<HighlightLines<'a>>,
    syntax_set: &'a SyntaxSet,
}

impl<'a> FileHighlighter<'a> {
    fn new(syntax_set: &'a SyntaxSet, theme: &'a Theme, file_ext: &str) -> Self {
        // Templates are mostly YAML; fall back to matching by syntax name.
        let syntax = syntax_set
            .find_syntax_by_extension(file_ext)
            .or_else(|| syntax_set.find_syntax_by_name(file_ext));

        let highlighter = syntax.map(|s| HighlightLines::new(s, theme));

        Self {
            highlighter,
            syntax_set,
        }
    }

    /// Spans for one diff line: a colored `+`/`-`/` ` marker followed by the
    /// syntax-colored text. Falls back to plain diff coloring for unknown
    /// file types, overlong lines, or highlighting errors.
    pub fn highlight_diff_line(&mut self, line: &DiffLine) -> Vec<Span<'static>> {
        let color = kind_color(line.kind);
        let marker = Span::styled(line.kind.prefix().to_string(), Style::default().fg(color));

        let mut spans = vec![marker];
        spans.extend(self.highlight_text(&line.text, color));
        spans
    }

    /// Spans for one line of the edit buffer.
    pub fn highlight_plain(&mut self, text: &str) -> Vec<Span<'static>> {
        self.highlight_text(text, Color::Reset)
    }

    fn highlight_text(&mut self, text: &str, fallback: Color) -> Vec<Span<'static>> {
        let plain = || vec![Span::styled(text.to_string(), Style::default().fg(fallback))];

        if text.is_empty() {
            return vec![Span::raw(String::new())];
        }
        if text.len() > MAX_LINE_LENGTH {
            return plain();
        }
        let Some(ref mut highlighter) = self.highlighter else {
            return plain();
        };

        // syntect's newline syntaxes expect the terminator.
        let owned = format!("{}\n", text);
        match highlighter.highlight_line(&owned, self.syntax_set) {
            Ok(regions) => regions
                .into_iter()
                .map(|(style, piece)| {
                    Span::styled(
                        piece.trim_end_matches('\n').to_string(),
                        Style::default().fg(Highlighter::syntect_to_ratatui(style.foreground)),
                    )
                })
                .filter(|span| !span.content.is_empty())
                .collect(),
            Err(_) => plain(),
        }
    }
}
