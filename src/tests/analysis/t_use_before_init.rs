use indoc::indoc;

use crate::{
    diagnostics::{Diagnostic, DiagnosticValue, MessageTemplate},
    middle::{
        analysis::check_use_before_init,
        tree::{Tree, name::Name, value::Builtin},
    },
    tests::common::{read, render, with_template},
};

fn check(source: &str) -> (Tree, Vec<Diagnostic>) {
    let (mut tree, _) = read(source);
    let mut diagnostics = Vec::new();

    let root = tree.root();
    check_use_before_init(&mut tree, root, &mut diagnostics);

    (tree, diagnostics)
}

#[test]
fn test_read_after_partial_initialization() {
    let (tree, diagnostics) = check(indoc! {"
        let x;
        if (%cond()) {
            x = 1;
        }
        %log(x);
    "});

    let reported = with_template(&diagnostics, MessageTemplate::UseBeforeInitialization);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].values[0], DiagnosticValue::Name(Name::source("x")));
    assert!(matches!(&reported[0].values[1], DiagnosticValue::Spans(spans) if !spans.is_empty()));

    // The bad read now fails when evaluated
    let log = tree.children(tree.root())[3];
    assert!(tree.is_call_to(tree.child(log, 1), Builtin::Error));
}

#[test]
fn test_both_branches_initialize() {
    let (tree, diagnostics) = check(indoc! {"
        let x;
        if (%cond()) {
            x = 1;
        } else {
            x = 2;
        }
        %log(x);
    "});

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert!(render(&tree).contains("%log(x);"));
}

#[test]
fn test_undeclared_and_external_names_are_ignored() {
    let (_, diagnostics) = check("%f(::g, y, %h);");
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[test]
fn test_loop_carried_write_does_not_initialize_first_iteration() {
    let (_, diagnostics) = check(indoc! {"
        let x;
        while (%c()) {
            %f(x);
            x = 1;
        }
    "});

    assert_eq!(diagnostics.len(), 1);
}

#[test]
fn test_stray_temporary_reads_are_dropped() {
    let (tree, diagnostics) = check("let t#0; t#0;");

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    let statement = tree.children(tree.root())[1];
    assert!(tree.is_void_value(statement));
}

#[test]
fn test_function_reading_name_before_assignment() {
    let (_, diagnostics) = check(indoc! {"
        let x;
        g = fn () {
            %f(x);
        };
        x = 1;
    "});

    let reported = with_template(&diagnostics, MessageTemplate::UseBeforeInitialization);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].values[0], DiagnosticValue::Name(Name::source("x")));
}

#[test]
fn test_function_defined_after_assignment() {
    let (_, diagnostics) = check(indoc! {"
        let x;
        x = 1;
        g = fn () {
            %f(x);
        };
    "});

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[test]
fn test_inputs_are_initialized() {
    let (_, diagnostics) = check(indoc! {"
        g = fn (a) -> r {
            r = a;
        };
    "});

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}
