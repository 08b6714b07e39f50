//! Source text handling for the pseudo-code notation used to build and inspect
//! trees: source files, spans, symbol interning, the lexer and the reader.

use std::path::PathBuf;

use colored::Colorize;

pub use self::lexer::Span;

pub mod intern;
pub mod lexer;
pub mod reader;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

impl SourceFile {
    pub fn from_memory(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn value_of_span(&self, span: Span) -> &str {
        &self.contents[span.start..span.end]
    }

    /// One-based line containing `position`
    pub fn row_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());

        self.contents[..position]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    }

    /// One-based column of `position` within its line
    pub fn column_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());
        let line_start = self.contents[..position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);

        position - line_start + 1
    }

    /// Renders the line containing `span` with the span underlined
    pub fn highlight_span(&self, span: Span) -> String {
        let start = span.start.min(self.contents.len());
        let line_start = self.contents[..start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = self.contents[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(self.contents.len());

        let line = &self.contents[line_start..line_end];
        let width = span.end.clamp(start, line_end).saturating_sub(start).max(1);
        let gutter = format!("{} | ", self.row_for_position(start));

        format!(
            "{}{}\n{}{}",
            gutter.blue(),
            line,
            " ".repeat(gutter.len() + start - line_start),
            "^".repeat(width).red()
        )
    }
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}
