use indoc::indoc;

use crate::{
    diagnostics::{DiagnosticValue, MessageTemplate},
    error::InternalErrorKind,
    middle::{
        optimization::{CleanupOptions, cleanup},
        tree::name::Name,
    },
    tests::common::{clean_source, read, render, run, statements, weave_source, with_template},
};

/// Weaving then cleaning up must not change what the program does
fn assert_same_behavior(source: &str) {
    let (before, _) = read(source);
    let (after, _) = clean_source(source);

    assert_eq!(run(&before), run(&after), "{}", render(&after));
}

#[test]
fn test_single_use_temporary_is_inlined() {
    let (tree, diagnostics) = clean_source("let t#0 = %f(); %g(t#0);");

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(statements(&tree), vec!["%g(%f());"]);
}

#[test]
fn test_inlining_keeps_effects_in_order() {
    let (tree, _) = clean_source("let t#0 = %f(); %h(); %g(t#0);");
    let lines = statements(&tree);

    assert!(lines.contains(&"t#0 = %f();".to_owned()), "{lines:?}");
    assert!(lines.contains(&"%g(t#0);".to_owned()), "{lines:?}");
}

#[test]
fn test_inlining_only_passes_stable_names() {
    let (stable, _) = clean_source("let t#0 = %f(); %g(::k, t#0);");
    assert!(statements(&stable).contains(&"%g(::k, %f());".to_owned()));

    // `y` might be assigned by `%f()`
    let (unstable, _) = clean_source("let t#0 = %f(); %g(y, t#0);");
    assert!(statements(&unstable).contains(&"%g(y, t#0);".to_owned()));
}

#[test]
fn test_dead_temporary_store_keeps_its_effect() {
    let (tree, _) = clean_source("let t#0; t#0 = %f();");
    assert_eq!(statements(&tree), vec!["%f();"]);
}

#[test]
fn test_copy_into_user_name_collapses() {
    let (tree, _) = clean_source("let x; let t#0 = %f(); x = t#0; %g(x);");
    assert_eq!(statements(&tree), vec!["let x;", "x = %f();", "%g(x);"]);
}

#[test]
fn test_copy_keeps_value_from_before_a_later_write() {
    let source = "var t#0; var t#1; t#0 = %f(); t#1 = t#0; t#0 = %g(); %log(t#1);";
    let (tree, diagnostics) = clean_source(source);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    assert_eq!(run(&tree).effects, ["%f()", "%g()", "%log(0)"], "{}", render(&tree));
    assert_same_behavior(source);
}

#[test]
fn test_canonical_function_name_is_kept() {
    let (tree, _) = clean_source(indoc! {"
        @ssa let t#0;
        t#0 = fn () {
            %g();
        };
        let y;
        y = t#0;
        %h(y);
    "});

    // The function goes by `t#0`, so its assignment stays put
    let text = render(&tree);
    assert!(text.contains("t#0 = fn ()"), "{text}");
}

#[test]
fn test_if_expression_assigns_user_name_directly() {
    let source = indoc! {"
        let x;
        x = if (%c()) { 1 } else { 2 };
        %log(x);
    "};
    let (tree, diagnostics) = clean_source(source);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    let text = render(&tree);
    assert!(!text.contains("t#"), "{text}");
    assert!(text.contains("x = 1;"), "{text}");
    assert!(text.contains("x = 2;"), "{text}");
    assert_same_behavior(source);
}

#[test]
fn test_reassigned_let_is_reported() {
    let (tree, diagnostics) = clean_source("let x; x = 1; x = 2; %f(x);");

    let reported = with_template(&diagnostics, MessageTemplate::IllegalReassignment);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].values[0], DiagnosticValue::Name(Name::source("x")));
    assert!(matches!(reported[0].values[1], DiagnosticValue::Span(_)));

    // Marked `var` so nothing trips over it again
    assert!(statements(&tree).contains(&"var x;".to_owned()));
}

#[test]
fn test_var_may_be_reassigned() {
    let (_, diagnostics) = clean_source("var x; x = 1; x = 2; %f(x);");
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[test]
fn test_cleanup_preserves_behavior() {
    let sources = [
        "%f(x = 1); %g(x);",
        "%g(%h(), { %f(); 1 });",
        "var i = 0; while ({ %f(i); i = i + 1; i } < 3) { %g(i); }",
        "let a = %f(); let b = %g(a); %h(b, a);",
        indoc! {"
            var n = 0;
            attempt: {
                n = %f();
                bubble();
            } orelse {
                %g(n);
            }
        "},
    ];

    for source in sources {
        assert_same_behavior(source);
    }
}

#[test]
fn test_cleanup_gives_up_after_too_many_rounds() {
    let (mut tree, _, _) = weave_source("let t#0 = %f(); %g(t#0);");
    let mut diagnostics = Vec::new();

    let error = cleanup(&mut tree, &CleanupOptions { max_iterations: 0 }, &mut diagnostics)
        .expect_err("no rounds allowed");

    assert_eq!(error.kind, InternalErrorKind::CleanupDidNotConverge { iterations: 0 });
}
