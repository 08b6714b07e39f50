use indoc::indoc;

use crate::{
    diagnostics::{Diagnostic, DiagnosticValue, MessageTemplate, Severity},
    frontend::{SourceFile, Span},
    middle::tree::name::Name,
};

fn reassignment() -> Diagnostic {
    Diagnostic::error(
        MessageTemplate::IllegalReassignment,
        Span::new(14, 20),
        vec![
            DiagnosticValue::Name(Name::source("x")),
            DiagnosticValue::Span(Span::new(7, 13)),
            DiagnosticValue::Span(Span::new(0, 6)),
        ],
    )
}

#[test]
fn test_messages_without_source_use_offsets() {
    assert_eq!(
        reassignment().message(None),
        "`x` is reassigned after 7..13 but not declared `var` at 0..6"
    );

    let uninitialized = Diagnostic::error(
        MessageTemplate::UseBeforeInitialization,
        Span::new(3, 4),
        vec![
            DiagnosticValue::Name(Name::source("y")),
            DiagnosticValue::Spans(vec![Span::new(0, 2), Span::new(5, 9)]),
        ],
    );
    assert_eq!(
        uninitialized.message(None),
        "`y` is read before it is initialized along paths through 0..2, 5..9"
    );
}

#[test]
fn test_empty_positions_print_as_nowhere() {
    let diagnostic = Diagnostic::error(
        MessageTemplate::UseBeforeInitialization,
        Span::new(0, 1),
        vec![DiagnosticValue::Name(Name::source("y")), DiagnosticValue::Spans(vec![])],
    );

    assert!(diagnostic.message(None).ends_with("through <nowhere>"));
}

#[test]
fn test_missing_values_are_marked() {
    let diagnostic = Diagnostic::error(MessageTemplate::MalformedFlow, Span::new(0, 1), vec![]);
    assert_eq!(
        diagnostic.message(None),
        "? is used by more than one part of the control flow"
    );
}

#[test]
fn test_render_points_into_source() {
    let source = SourceFile::from_memory(indoc! {"
        let x;
        x = 1;
        x = 2;
    "});

    let diagnostic = reassignment();
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(
        diagnostic.message(Some(&source)),
        "`x` is reassigned after 2:1 but not declared `var` at 1:1"
    );

    let rendered = strip_ansi_escapes::strip_str(diagnostic.render(&source));
    let mut lines = rendered.lines();

    assert_eq!(
        lines.next(),
        Some("error: `x` is reassigned after 2:1 but not declared `var` at 1:1 (at <memory>:3:1)")
    );
    assert_eq!(lines.next(), Some("3 | x = 2;"));
    assert_eq!(lines.next(), Some("    ^^^^^^"));
}

#[test]
fn test_internal_errors_carry_their_text() {
    let diagnostic = Diagnostic::error(
        MessageTemplate::InternalError,
        Span::new(0, 0),
        vec![DiagnosticValue::Text("internal error: cleanup did not settle".to_owned())],
    );

    assert_eq!(diagnostic.message(None), "internal error: cleanup did not settle");
}
