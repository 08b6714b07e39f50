use indoc::indoc;

use crate::{
    diagnostics::{DiagnosticValue, MessageTemplate},
    error::InternalErrorKind,
    frontend::Span,
    middle::{
        optimization::CleanupOptions,
        tree::{
            BlockFlow, Tree,
            control_flow::{ChildRef, ControlFlow, StmtBlock},
            name::{Name, NameMaker},
            value::Value,
        },
    },
    pipeline::{self, PipelineOptions},
    tests::common::{read, render, run, run_pipeline, statements, with_template},
};

#[test]
fn test_weaves_then_cleans_up() {
    let (tree, diagnostics) = run_pipeline("let t#0 = %f(); %g(t#0);");

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(statements(&tree), vec!["%g(%f());"]);
}

#[test]
fn test_reports_use_before_initialization() {
    let (tree, diagnostics) = run_pipeline(indoc! {"
        let x;
        if (%cond()) {
            x = 1;
        }
        %log(x);
    "});

    let reported = with_template(&diagnostics, MessageTemplate::UseBeforeInitialization);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].values[0], DiagnosticValue::Name(Name::source("x")));
    assert!(render(&tree).contains("%log(error("));
}

#[test]
fn test_stages_can_be_turned_off() {
    let source = "let x; %log(x); let t#0 = %f(); %g(t#0);";
    let options = PipelineOptions {
        check_use_before_init: false,
        run_cleanup: false,
        ..PipelineOptions::default()
    };

    let (mut tree, mut names) = read(source);
    let mut diagnostics = Vec::new();
    pipeline::run(&mut tree, &mut names, &options, &mut diagnostics).expect("pipeline failed");

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert!(statements(&tree).contains(&"%g(t#0);".to_owned()));
}

#[test]
fn test_pipeline_preserves_behavior() {
    let source = indoc! {"
        var total = 0;
        var i = 0;
        while ({ i = i + 1; i } < 4) {
            total = total + if (%even(i)) { i } else { 0 };
        }
        %report(total);
    "};

    let (before, _) = read(source);
    let (after, diagnostics) = run_pipeline(source);

    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(run(&before), run(&after), "{}", render(&after));
}

#[test]
fn test_internal_errors_are_reported_and_returned() {
    let mut tree = Tree::new();
    let value = tree.add_value(Span::new(0, 1), Value::Int(1));
    tree.set_root(value);

    let mut diagnostics = Vec::new();
    let error = pipeline::run(
        &mut tree,
        &mut NameMaker::new(),
        &PipelineOptions::default(),
        &mut diagnostics,
    )
    .expect_err("the root is not a block");

    assert_eq!(error.kind, InternalErrorKind::NotABlock { node: value });
    #[cfg(not(feature = "error-backtrace"))]
    assert!(error.location.is_empty(), "{}", error.location);

    let reported = with_template(&diagnostics, MessageTemplate::InternalError);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].values, vec![DiagnosticValue::Text(error.to_string())]);
}

#[test]
fn test_cleanup_that_does_not_settle_stops_the_pipeline() {
    let (mut tree, mut names) = read("let t#0 = %f(); %g(t#0);");
    let options = PipelineOptions {
        cleanup: CleanupOptions { max_iterations: 0 },
        ..PipelineOptions::default()
    };

    let mut diagnostics = Vec::new();
    let error = pipeline::run(&mut tree, &mut names, &options, &mut diagnostics)
        .expect_err("cleanup has no rounds");

    assert!(matches!(error.kind, InternalErrorKind::CleanupDidNotConverge { .. }));
    assert_eq!(with_template(&diagnostics, MessageTemplate::InternalError).len(), 1);
}

#[test]
fn test_malformed_flow_is_a_diagnostic_not_an_error() {
    let (mut tree, mut names) = read("%g({ %f(); 1 });");
    let root = tree.root();
    tree.set_flow(
        root,
        BlockFlow::Structured(StmtBlock::new(vec![
            ControlFlow::Stmt(ChildRef::new(0)),
            ControlFlow::Stmt(ChildRef::new(0)),
        ])),
    );

    let options = PipelineOptions {
        run_cleanup: false,
        ..PipelineOptions::default()
    };
    let mut diagnostics = Vec::new();
    pipeline::run(&mut tree, &mut names, &options, &mut diagnostics).expect("pipeline failed");

    assert_eq!(with_template(&diagnostics, MessageTemplate::MalformedFlow).len(), 1);
    assert!(with_template(&diagnostics, MessageTemplate::InternalError).is_empty());
}
