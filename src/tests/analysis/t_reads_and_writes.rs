use std::collections::BTreeSet;

use indoc::indoc;

use crate::{
    middle::{
        analysis::{
            ReadsAndWrites,
            reads_and_writes::{ReadKind, WriteKind},
        },
        tree::{control_flow::ChildRef, name::Name},
    },
    tests::common::read,
};

fn summarize(source: &str) -> (crate::middle::tree::Tree, ReadsAndWrites) {
    let (tree, _) = read(source);
    let summary = ReadsAndWrites::for_body(&tree, tree.root());
    (tree, summary)
}

#[test]
fn test_straight_line_read_sees_its_write() {
    let (_, summary) = summarize("let x; x = 1; %f(x);");
    let x = Name::source("x");

    let [read] = summary.reads_of(x) else {
        panic!("expected one read of x");
    };
    let [write] = summary.writes_of(x) else {
        panic!("expected one write of x");
    };

    assert_eq!(summary.read(*read).kind, ReadKind::Read);
    assert_eq!(summary.write(*write).kind, WriteKind::SimpleAssignment);
    assert_eq!(summary.upstream(*read), Some(&BTreeSet::from([*write])));
    assert!(summary.downstream(*write).is_some_and(|reads| reads.contains(read)));
    assert_eq!(summary.declarations_of(x).len(), 1);
}

#[test]
fn test_branches_merge_live_writes() {
    let (_, summary) = summarize(indoc! {"
        var x;
        x = 1;
        if (%c()) {
            x = 2;
        }
        %f(x);
    "});
    let x = Name::source("x");

    let [read] = summary.reads_of(x) else {
        panic!("expected one read of x");
    };

    assert_eq!(summary.writes_of(x).len(), 2);
    assert_eq!(summary.upstream(*read).map(BTreeSet::len), Some(2));
}

#[test]
fn test_overwritten_write_is_not_upstream() {
    let (_, summary) = summarize("var x; x = 1; x = 2; %f(x);");
    let x = Name::source("x");

    let writes = summary.writes_of(x);
    let [read] = summary.reads_of(x) else {
        panic!("expected one read of x");
    };

    assert_eq!(summary.upstream(*read), Some(&BTreeSet::from([writes[1]])));
    assert!(summary.downstream(writes[0]).is_none());
}

#[test]
fn test_write_kinds_and_assigned_reads() {
    let (_, summary) = summarize("%f(x = 1); y = x; hs(fail, %g());");

    let x = summary.writes_of(Name::source("x"));
    assert_eq!(summary.write(x[0]).kind, WriteKind::NestedAssignment);

    let y = summary.writes_of(Name::source("y"));
    let assigned = summary.write(y[0]).assigned.expect("y is assigned a name");
    assert_eq!(summary.read(assigned).name, Name::source("x"));

    let fail = summary.writes_of(Name::source("fail"));
    assert_eq!(summary.write(fail[0]).kind, WriteKind::Other);
    assert!(!summary.write(fail[0]).kind.is_assignment());
}

#[test]
fn test_function_body_has_inputs_and_output() {
    let (tree, _) = read("g = fn (a) -> r { r = a; };");
    let assignment = tree.children(tree.root())[0];
    let (_, fun) = tree.assignment_parts(assignment).expect("assignment");
    let body = tree.fun_parts(fun).expect("function").body;

    let summary = ReadsAndWrites::for_body(&tree, body);
    let a = Name::source("a");
    let r = Name::source("r");

    assert_eq!(summary.input_names, vec![a]);
    assert_eq!(summary.output_name, Some(r));

    let input = summary.input_write(a).expect("input write");
    assert_eq!(summary.write(input).node, None);

    let [read_a] = summary.reads_of(a) else {
        panic!("expected one read of a");
    };
    assert_eq!(summary.upstream(*read_a), Some(&BTreeSet::from([input])));

    let returned = summary.return_read().expect("return read");
    assert_eq!(
        summary.upstream(returned),
        Some(&BTreeSet::from([summary.writes_of(r)[0]]))
    );
}

#[test]
fn test_names_captured_by_functions_are_not_local() {
    let (_, summary) = summarize("let x; let y; g = fn () { %f(x); };");

    assert!(summary.local_names.contains(&Name::source("y")));
    assert!(!summary.local_names.contains(&Name::source("x")));
}

#[test]
fn test_reified_reads_of_named_types() {
    let (_, summary) = summarize("let p: Point;");

    let [read] = summary.reads_of(Name::source("Point")) else {
        panic!("expected one read of Point");
    };
    assert_eq!(summary.read(*read).kind, ReadKind::ReifiedRead);
}

#[test]
fn test_writes_live_around_loops() {
    let (_, summary) = summarize(indoc! {"
        var x;
        x = 1;
        while (%c()) {
            %f(x);
            x = 2;
        }
    "});
    let x = Name::source("x");

    // `%f(x)` is the fourth child of the root
    let live = summary.writes_live(x, ChildRef::new(3));
    assert_eq!(live.len(), 2);

    let all = summary.all_writes().collect::<Vec<_>>();
    assert_eq!(all, vec![(x, summary.writes_of(x))]);
}

#[test]
fn test_declared_after_assignment() {
    let (tree, summary) = summarize("x = 1; let y; y = x;");
    assert!(summary.declared_after_assignment(&tree, Name::source("y"), Name::source("x")));

    let (tree, summary) = summarize("let y; x = 1; y = x;");
    assert!(!summary.declared_after_assignment(&tree, Name::source("y"), Name::source("x")));
}
