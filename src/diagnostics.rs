//! Problems in the program being compiled. Passes report these through a
//! [`DiagnosticSink`] and keep going.

use colored::Colorize;
use itertools::Itertools;
use strum::{Display, EnumIter, IntoStaticStr};

use crate::{
    frontend::{SourceFile, Span},
    middle::tree::name::Name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, IntoStaticStr,
)]
pub enum MessageTemplate {
    /// `[child]`
    MalformedFlow,
    /// `[name, uncovered positions]`
    UseBeforeInitialization,
    /// `[name, preceding write, declaration]`
    IllegalReassignment,
    /// `[description]`
    InternalError,
}

/// A value substituted into a [`MessageTemplate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticValue {
    Name(Name),
    Span(Span),
    Spans(Vec<Span>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub template: MessageTemplate,
    pub span: Span,
    pub values: Vec<DiagnosticValue>,
}

pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

impl Diagnostic {
    pub fn error(template: MessageTemplate, span: Span, values: Vec<DiagnosticValue>) -> Self {
        Self {
            severity: Severity::Error,
            template,
            span,
            values,
        }
    }

    /// The message with positions as `row:col` when the source is known and
    /// as byte offsets otherwise
    pub fn message(&self, source: Option<&SourceFile>) -> String {
        let value = |index: usize| {
            self.values
                .get(index)
                .map(|v| v.describe(source))
                .unwrap_or_else(|| "?".to_owned())
        };

        match self.template {
            MessageTemplate::MalformedFlow => {
                format!("{} is used by more than one part of the control flow", value(0))
            }
            MessageTemplate::UseBeforeInitialization => format!(
                "{} is read before it is initialized along paths through {}",
                value(0),
                value(1)
            ),
            MessageTemplate::IllegalReassignment => format!(
                "{} is reassigned after {} but not declared `var` at {}",
                value(0),
                value(1),
                value(2)
            ),
            MessageTemplate::InternalError => value(0),
        }
    }

    /// Renders the diagnostic the way fatal compiler errors are printed: the
    /// message, its location, then the offending source line
    pub fn render(&self, source: &SourceFile) -> String {
        let severity = match self.severity {
            Severity::Error => self.severity.to_string().red(),
            Severity::Warning => self.severity.to_string().yellow(),
        };

        format!(
            "{}: {} {}\n{}",
            severity,
            self.message(Some(source)),
            format!(
                "(at {}:{}:{})",
                source.origin,
                source.row_for_position(self.span.start),
                source.column_for_position(self.span.start)
            )
            .white(),
            source.highlight_span(self.span)
        )
    }
}

impl DiagnosticValue {
    fn describe(&self, source: Option<&SourceFile>) -> String {
        match self {
            DiagnosticValue::Name(name) => format!("`{name}`"),
            DiagnosticValue::Span(span) => describe_span(*span, source),
            DiagnosticValue::Spans(spans) if spans.is_empty() => "<nowhere>".to_owned(),
            DiagnosticValue::Spans(spans) => spans
                .iter()
                .map(|s| describe_span(*s, source))
                .join(", "),
            DiagnosticValue::Text(text) => text.clone(),
        }
    }
}

fn describe_span(span: Span, source: Option<&SourceFile>) -> String {
    match source {
        Some(source) => format!(
            "{}:{}",
            source.row_for_position(span.start),
            source.column_for_position(span.start)
        ),
        None => format!("{}..{}", span.start, span.end),
    }
}
