//! Property-based tests for the whole pipeline
//!
//! Cleanup rewrites the woven tree heavily: inlining temporaries, collapsing
//! copies and dropping dead stores. None of that may change what the
//! program does, and a second run over the result must not find more to do.

use proptest::prelude::*;

use weft::{
    diagnostics::MessageTemplate,
    frontend::reader::read_str,
    middle::{
        optimization::{CleanupOptions, cleanup},
        tree::{Tree, check_flow_soundness, pseudo_code::render_tree},
    },
    pipeline::{self, PipelineOptions},
    test_support::run,
};

fn expression() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0i64..4).prop_map(|n| n.to_string()),
        Just("a".to_owned()),
        Just("b".to_owned()),
        Just("%f()".to_owned()),
    ];

    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("({l} + {r})")),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| format!("%g({l}, {r})")),
            (inner.clone(), inner.clone()).prop_map(|(s, e)| format!("{{ %h({s}); {e} }}")),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, t, e)| format!("(if ({c} < 2) {{ {t} }} else {{ {e} }})")),
        ]
    })
}

fn program() -> impl Strategy<Value = String> {
    let statement = prop_oneof![
        expression().prop_map(|e| format!("a = {e};")),
        expression().prop_map(|e| format!("b = {e};")),
        expression().prop_map(|e| format!("%k({e});")),
        (expression(), expression())
            .prop_map(|(c, t)| format!("if ({c} < 2) {{ b = {t}; }}")),
        // Temporaries copied into each other and then reassigned
        expression().prop_map(|e| format!("t#0 = {e};")),
        Just("t#1 = t#0;".to_owned()),
        Just("%k(t#1);".to_owned()),
        Just("%k(t#0);".to_owned()),
    ];

    prop::collection::vec(statement, 1..7).prop_map(|stmts| {
        format!(
            "var a = 0;\nvar b = 0;\nvar t#0 = 0;\nvar t#1 = 0;\n{}\n%k(a, b);\n",
            stmts.join("\n")
        )
    })
}

fn through_pipeline(source: &str) -> Tree {
    let (mut tree, mut names) = read_str(source).expect("generated program reads");
    let mut diagnostics = Vec::new();

    pipeline::run(&mut tree, &mut names, &PipelineOptions::default(), &mut diagnostics)
        .unwrap_or_else(|error| panic!("pipeline failed: {error}\n{source}"));

    let uninitialized = diagnostics
        .iter()
        .filter(|d| d.template == MessageTemplate::UseBeforeInitialization)
        .count();
    assert_eq!(uninitialized, 0, "{diagnostics:?}\n{}", render_tree(&tree));

    tree
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Weaving plus cleanup keeps effects and final variable values
    #[test]
    fn pipeline_preserves_behavior(source in program()) {
        let (before, _) = read_str(&source).expect("generated program reads");
        let after = through_pipeline(&source);

        prop_assert_eq!(
            run(&before).expect("original runs"),
            run(&after).expect("cleaned up tree runs"),
            "{}",
            render_tree(&after)
        );
        prop_assert!(check_flow_soundness(&after, after.root()).is_empty());
    }

    /// Cleaning up a cleaned up tree finds nothing left to do
    #[test]
    fn cleanup_settles(source in program()) {
        let mut tree = through_pipeline(&source);
        let once = render_tree(&tree);

        let mut diagnostics = Vec::new();
        cleanup(&mut tree, &CleanupOptions::default(), &mut diagnostics).expect("cleanup failed");

        prop_assert_eq!(once, render_tree(&tree));
    }
}
