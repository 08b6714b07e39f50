use indoc::indoc;

use crate::{
    diagnostics::MessageTemplate,
    middle::{
        tree::{
            BlockFlow, check_flow_soundness,
            control_flow::{ChildRef, ControlFlow, If, StmtBlock},
        },
        weave::{WeaverOptions, weave},
    },
    tests::common::{read, render, run, statements, weave_source, weave_source_with, with_template},
};

/// Weaving must not change what the program does
fn assert_same_behavior(source: &str) {
    let (before, _) = read(source);
    let (after, _, _) = weave_source(source);

    assert_eq!(run(&before), run(&after), "{}", render(&after));
}

#[test]
fn test_assigned_bubble_just_bubbles() {
    let (tree, _, diagnostics) = weave_source("x = bubble();");

    assert!(diagnostics.is_empty());
    assert_eq!(render(&tree), "bubble();\n");
}

#[test]
fn test_block_argument_runs_before_call() {
    let (tree, _, _) = weave_source("%g({ %f(); 1 });");

    // The constant result takes the place of the block, not a statement of its own
    assert_eq!(statements(&tree), vec!["%f();", "%g(1);"]);
}

#[test]
fn test_earlier_arguments_are_captured() {
    let source = "%g(%h(), { %f(); 1 });";
    let (tree, _, _) = weave_source(source);

    assert!(!render(&tree).contains("%g(%h()"));
    assert_same_behavior(source);
}

#[test]
fn test_loop_condition_block_moves_into_body() {
    let source = indoc! {"
        var i = 0;
        while ({ %f(i); i = i + 1; i } < 3) {
            %g(i);
        }
    "};
    let (tree, _, _) = weave_source(source);
    let text = render(&tree);

    assert!(text.contains("while (true) {"), "{text}");
    assert_eq!(text.matches("%f(").count(), 1, "{text}");
    assert!(text.contains("break;"), "{text}");

    let (before, _) = read(source);
    let expected = ["%f(0)", "%g(1)", "%f(1)", "%g(2)", "%f(2)"];
    assert_eq!(run(&before).effects, expected);
    assert_eq!(run(&tree).effects, expected);
}

/// `%f(1)`, `%f(2)`, `%g(3)`, `%f(3)`, `%g(4)`, `%f(4)` for the do/while
/// loops below
fn assert_continue_reaches_condition(source: &str) {
    let (tree, _, diagnostics) = weave_source(source);
    assert!(diagnostics.is_empty(), "{diagnostics:?}");

    let text = render(&tree);
    assert_eq!(text.matches("%f(").count(), 1, "{text}");

    let (before, _) = read(source);
    let expected = ["%f(1)", "%f(2)", "%g(3)", "%f(3)", "%g(4)", "%f(4)"];
    assert_eq!(run(&before).effects, expected);
    assert_eq!(run(&tree).effects, expected, "{text}");
    assert_eq!(run(&before), run(&tree));
}

#[test]
fn test_continue_in_do_while_runs_condition_block() {
    assert_continue_reaches_condition(indoc! {"
        var i = 0;
        do {
            i = i + 1;
            if (i < 3) {
                continue;
            }
            %g(i);
        } while ({ %f(i); i } < 4);
    "});
}

#[test]
fn test_labeled_continue_in_do_while_runs_condition_block() {
    assert_continue_reaches_condition(indoc! {"
        var i = 0;
        outer: do {
            i = i + 1;
            if (i < 3) {
                continue outer;
            }
            %g(i);
        } while ({ %f(i); i } < 4);
    "});
}

#[test]
fn test_if_expression_result_is_stored() {
    let source = indoc! {"
        x = if (%c()) { 1 } else { 2 };
        %log(x);
    "};
    let (tree, _, _) = weave_source(source);

    assert!(render(&tree).contains("if (%c()) {"));
    assert!(render(&tree).starts_with("var t#0;\n"));
    assert_same_behavior(source);
}

#[test]
fn test_failure_checks_are_explicit() {
    let (tree, _, _) = weave_source("hs(fail, %f());");
    let text = render(&tree);

    assert!(text.contains("hs(fail, %f())"), "{text}");
    assert!(text.contains("if (fail) {"), "{text}");
    assert!(text.contains("bubble();"), "{text}");
}

#[test]
fn test_failure_checks_can_be_skipped() {
    let options = WeaverOptions {
        failure_condition_needs_checking: |_, _| false,
        ..WeaverOptions::default()
    };
    let (tree, _, _) = weave_source_with("hs(fail, %f());", &options);

    assert!(!render(&tree).contains("if (fail)"));
}

#[test]
fn test_bubble_in_or_clause_becomes_break() {
    let source = indoc! {"
        attempt: {
            %f();
            bubble();
        } orelse {
            %g();
        }
    "};
    let (tree, _, _) = weave_source(source);
    let text = render(&tree);

    assert!(text.contains("break attempt;"), "{text}");
    assert!(!text.contains("bubble"), "{text}");
    assert_same_behavior(source);
}

#[test]
fn test_void_calls_leave_void_behind() {
    let (tree, _, _) = weave_source("%g(%f()::Void);");
    assert_eq!(statements(&tree), vec!["%f();", "%g(void);"]);
}

#[test]
fn test_nested_assignments_move_to_statements() {
    let source = "%f(x = 1); %g(x);";

    let (pulled, _, _) = weave_source(source);
    assert!(statements(&pulled).iter().any(|s| s.starts_with("x = ")));
    assert_same_behavior(source);

    let options = WeaverOptions {
        pull_specials_rootward: false,
        ..WeaverOptions::default()
    };
    let (kept, _, _) = weave_source_with(source, &options);
    assert!(!statements(&kept).iter().any(|s| s.starts_with("x = ")));
}

#[test]
fn test_functions_can_be_named() {
    let source = "%f(fn () { %g(); });";

    let (unnamed, _, _) = weave_source(source);
    assert!(render(&unnamed).contains("%f(fn ()"));

    let options = WeaverOptions {
        name_all_functions: true,
        ..WeaverOptions::default()
    };
    let (named, _, _) = weave_source_with(source, &options);
    let text = render(&named);

    assert!(text.contains("fn#0 = fn ()"), "{text}");
    assert!(!text.contains("%f(fn"), "{text}");
}

#[test]
fn test_nested_function_bodies_are_woven() {
    let (tree, _, _) = weave_source(indoc! {"
        g = fn (a) -> r {
            r = %h({ %f(a); 2 });
        };
    "});
    let text = render(&tree);

    assert!(text.contains("%f(a);"), "{text}");
    assert!(text.contains("r = %h(2);"), "{text}");
}

#[test]
fn test_weaving_is_idempotent() {
    let sources = [
        "%g(%h(), { %f(); 1 });",
        "x = if (%c()) { 1 } else { 2 }; %log(x);",
        "var i = 0; while ({ %f(i); i = i + 1; i } < 3) { %g(i); }",
        "hs(fail, %f());",
    ];

    for source in sources {
        let (mut tree, mut names, _) = weave_source(source);
        let once = render(&tree);
        let snapshot = tree.clone();

        let mut diagnostics = Vec::new();
        weave(&mut tree, &mut names, &WeaverOptions::default(), &mut diagnostics)
            .expect("weaving failed");

        assert_eq!(render(&tree), once, "weaving again changed\n{once}");
        assert!(tree.structurally_equal(tree.root(), &snapshot, snapshot.root()));
        assert!(diagnostics.is_empty());
    }
}

#[test]
fn test_statement_used_twice_is_malformed() {
    let (mut tree, mut names) = read("%g({ %f(); 1 });");
    let root = tree.root();
    tree.set_flow(
        root,
        BlockFlow::Structured(StmtBlock::new(vec![
            ControlFlow::Stmt(ChildRef::new(0)),
            ControlFlow::Stmt(ChildRef::new(0)),
        ])),
    );

    let mut diagnostics = Vec::new();
    weave(&mut tree, &mut names, &WeaverOptions::default(), &mut diagnostics)
        .expect("weaving failed");

    assert_eq!(with_template(&diagnostics, MessageTemplate::MalformedFlow).len(), 1);

    let problems = check_flow_soundness(&tree, root);
    assert!(problems.is_empty(), "{problems:?}\n{}", render(&tree));
}

#[test]
fn test_child_used_as_statement_and_condition_is_malformed() {
    let (mut tree, mut names) = read("%h({ %f(); true }); %g();");
    let root = tree.root();
    tree.set_flow(
        root,
        BlockFlow::Structured(StmtBlock::new(vec![
            ControlFlow::Stmt(ChildRef::new(0)),
            ControlFlow::If(If {
                condition: ChildRef::new(0),
                then_clause: StmtBlock::new(vec![ControlFlow::Stmt(ChildRef::new(1))]),
                else_clause: StmtBlock::default(),
            }),
        ])),
    );

    let mut diagnostics = Vec::new();
    weave(&mut tree, &mut names, &WeaverOptions::default(), &mut diagnostics)
        .expect("weaving failed");

    assert_eq!(with_template(&diagnostics, MessageTemplate::MalformedFlow).len(), 1);

    let problems = check_flow_soundness(&tree, root);
    assert!(problems.is_empty(), "{problems:?}\n{}", render(&tree));

    // The condition got an error of its own
    let text = render(&tree);
    assert_eq!(text.matches("error(").count(), 2, "{text}");
    assert_eq!(text.matches("%f()").count(), 1, "{text}");
}
