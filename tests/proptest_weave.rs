//! Property-based tests for weaving
//!
//! Small programs mixing calls, block expressions and if-expressions are
//! woven and then run. Weaving must keep effects in order, leave variables
//! with the same final values, produce sound flow and settle after one pass.

use proptest::prelude::*;

use weft::{
    frontend::reader::read_str,
    middle::{
        tree::{Tree, check_flow_soundness, pseudo_code::render_tree},
        weave::{WeaverOptions, weave},
    },
    test_support::{Run, run},
};

// ============================================================================
// Program generation
// ============================================================================

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
            (inner.clone(), inner.clone()).prop_map(|(s, e)| format!("{{ a = {s}; {e} }}")),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, t, e)| format!("(if ({c} < 2) {{ {t} }} else {{ {e} }})")),
        ]
    })
}

fn statement() -> impl Strategy<Value = String> {
    prop_oneof![
        expression().prop_map(|e| format!("a = {e};")),
        expression().prop_map(|e| format!("b = {e};")),
        expression().prop_map(|e| format!("%k({e});")),
        (expression(), expression(), expression())
            .prop_map(|(c, t, e)| format!("if ({c} < 2) {{ a = {t}; }} else {{ %k({e}); }}")),
    ]
}

fn program() -> impl Strategy<Value = String> {
    prop::collection::vec(statement(), 1..5)
        .prop_map(|stmts| format!("var a = 0;\nvar b = 0;\n{}\n", stmts.join("\n")))
}

// ============================================================================
// Helpers
// ============================================================================

fn read(source: &str) -> Tree {
    read_str(source)
        .unwrap_or_else(|error| panic!("generated program did not read: {error}\n{source}"))
        .0
}

fn behavior(tree: &Tree) -> Run {
    run(tree).unwrap_or_else(|error| panic!("run failed: {error}\n{}", render_tree(tree)))
}

fn woven(source: &str) -> (Tree, weft::middle::tree::name::NameMaker) {
    let (mut tree, mut names) = read_str(source).expect("generated program reads");
    let mut diagnostics = Vec::new();
    weave(&mut tree, &mut names, &WeaverOptions::default(), &mut diagnostics)
        .expect("weaving failed");

    assert!(diagnostics.is_empty(), "{diagnostics:?}\n{source}");
    (tree, names)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Effects and final variable values are unchanged by weaving
    #[test]
    fn weaving_preserves_behavior(source in program()) {
        let before = behavior(&read(&source));
        let (after, _) = woven(&source);

        prop_assert_eq!(before, behavior(&after), "{}", render_tree(&after));
    }

    /// Woven flow never reuses or drops a child
    #[test]
    fn woven_flow_is_sound(source in program()) {
        let (tree, _) = woven(&source);
        let problems = check_flow_soundness(&tree, tree.root());

        prop_assert!(problems.is_empty(), "{:?}\n{}", problems, render_tree(&tree));
    }

    /// Weaving a woven tree changes nothing
    #[test]
    fn weaving_settles(source in program()) {
        let (mut tree, mut names) = woven(&source);
        let once = render_tree(&tree);

        let mut diagnostics = Vec::new();
        weave(&mut tree, &mut names, &WeaverOptions::default(), &mut diagnostics)
            .expect("weaving failed");

        prop_assert_eq!(once, render_tree(&tree));
    }
}
