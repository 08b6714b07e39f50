use std::collections::BTreeSet;

use indoc::indoc;

use crate::{
    middle::{
        flow::{Direction, MaximalPaths, PathIndex, PathOptions},
        tree::Tree,
    },
    tests::common::read,
};

fn paths_of(source: &str, options: PathOptions) -> (Tree, MaximalPaths) {
    let (tree, _) = read(source);
    let paths = MaximalPaths::build(&tree, tree.root(), options);
    (tree, paths)
}

/// The path holding the root's child at `index`
fn path_with(paths: &MaximalPaths, index: usize) -> PathIndex {
    paths
        .indices()
        .find(|p| paths[*p].evaluation_order().iter().any(|e| e.child.index == index))
        .unwrap_or_else(|| panic!("no path holds child {index}\n{paths}"))
}

#[test]
fn test_straight_line_is_one_path() {
    let (_, paths) = paths_of("%f(); %g(); %h();", PathOptions::default());

    assert_eq!(paths.len(), 1);
    assert_eq!(paths.exit, Some(paths.entry()));
    assert_eq!(paths.fail_exit, None);

    let children = paths[paths.entry()]
        .elements
        .iter()
        .map(|e| e.child.index)
        .collect::<Vec<_>>();
    assert_eq!(children, vec![0, 1, 2]);
}

#[test]
fn test_if_else_covers_every_child() {
    let (tree, paths) = paths_of(
        indoc! {"
            if (%c()) {
                %f();
            } else {
                %g();
            }
            %h();
        "},
        PathOptions::default(),
    );

    let covered = paths.elements().map(|e| e.child.index).collect::<BTreeSet<_>>();
    assert_eq!(covered, (0..tree.children(tree.root()).len()).collect());

    let entry = &paths[paths.entry()];
    assert_eq!(entry.followers.len(), 2);

    let guarded = entry
        .followers
        .iter()
        .filter_map(|f| f.condition)
        .collect::<Vec<_>>();
    assert_eq!(guarded.len(), 1);
    assert!(guarded[0].is_condition);
    assert_eq!(guarded[0].child.index, 0);

    // Both branches reach the path running `%h()`
    let join = path_with(&paths, 3);
    assert_eq!(paths[join].preceders.len(), 2);
    assert_eq!(paths.exit, Some(join));
}

#[test]
fn test_loops_jump_back() {
    let (_, paths) = paths_of("while (%c()) { %f(); }", PathOptions::default());

    let back_edges = paths
        .indices()
        .flat_map(|p| paths[p].followers.iter().copied())
        .filter(|f| f.direction == Direction::Back)
        .count();
    assert_eq!(back_edges, 1);

    let order = paths.ordered_path_indices(Direction::Back);
    assert_eq!(order.len(), paths.len());
    assert_eq!(order[0], paths.entry());
}

#[test]
fn test_constant_conditions_fold() {
    let (_, folded) = paths_of("if (true) { %f(); } else { %g(); }", PathOptions::default());
    assert_eq!(folded[path_with(&folded, 2)].preceders.len(), 0);

    let (_, kept) = paths_of(
        "if (true) { %f(); } else { %g(); }",
        PathOptions {
            fold_constant_conditions: false,
            ..PathOptions::default()
        },
    );
    assert_eq!(kept[path_with(&kept, 2)].preceders.len(), 1);
}

#[test]
fn test_bubble_leaves_through_fail_exit() {
    let (_, paths) = paths_of("%f(); bubble();", PathOptions::default());

    assert_eq!(paths.exit, None);
    assert_eq!(paths.fail_exit, Some(paths.entry()));
}

#[test]
fn test_failure_reaches_else_clause() {
    let source = indoc! {"
        attempt: {
            %f();
        } orelse {
            %g();
        }
    "};

    let (_, strict) = paths_of(source, PathOptions::default());
    assert!(strict[path_with(&strict, 1)].preceders.is_empty());

    let (_, assumed) = paths_of(
        source,
        PathOptions {
            assume_failure_can_happen: true,
            ..PathOptions::default()
        },
    );
    assert_eq!(assumed[path_with(&assumed, 1)].preceders.len(), 1);
}

#[test]
fn test_bubble_in_or_clause_enters_else_clause() {
    let (_, paths) = paths_of(
        indoc! {"
            attempt: {
                %f();
                bubble();
            } orelse {
                %g();
            }
        "},
        PathOptions::default(),
    );

    // Nothing else enters the else-clause, so it continues the bubbling path
    assert_eq!(path_with(&paths, 2), path_with(&paths, 1));
    assert_eq!(paths.exit, Some(paths.entry()));
    assert_eq!(paths.fail_exit, None);
}

#[test]
fn test_yield_ends_path() {
    let source = "%f(); yield(1); %g();";

    let (_, whole) = paths_of(source, PathOptions::default());
    assert_eq!(whole.len(), 1);

    let (_, split) = paths_of(
        source,
        PathOptions {
            yielding_calls_end_paths: true,
            ..PathOptions::default()
        },
    );
    assert_eq!(split.len(), 2);
    assert!(split[split.entry()].ends_at_yield);
    assert_ne!(path_with(&split, 1), path_with(&split, 2));
}

#[test]
fn test_mermaid_output() {
    let (_, paths) = paths_of("if (%c()) { %f(); }", PathOptions::default());
    let chart = paths.to_mermaid(|e| format!("#{}", e.child.index));

    assert!(chart.starts_with("flowchart TD\n"));
    assert!(chart.contains("entry"));
    assert!(chart.contains("|\"#0\"|"));
}
