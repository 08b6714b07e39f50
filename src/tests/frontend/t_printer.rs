use indoc::indoc;

use crate::{
    frontend::Span,
    middle::tree::{
        Tree, name::Name, pseudo_code::render_node, value::{Builtin, MetadataKey, Value},
    },
    tests::common::{read, render},
};

/// Reading then printing gives back the same text
fn assert_round_trip(source: &str) {
    let (tree, _) = read(source);
    assert_eq!(render(&tree), source);
}

#[test]
fn test_statements() {
    assert_round_trip(indoc! {"
        let x;
        x = 1;
        %f(x, \"two\", true);
    "});
}

#[test]
fn test_operators_parenthesize_operands() {
    assert_round_trip(indoc! {"
        %f((x + 1) * 2, !(a < b));
    "});
}

#[test]
fn test_if_else() {
    assert_round_trip(indoc! {"
        if (%c()) {
            %f();
        } else {
            %g();
        }
    "});
}

#[test]
fn test_loops_and_jumps() {
    assert_round_trip(indoc! {"
        outer: while (%c()) {
            if (%d()) {
                break outer;
            }
            continue;
        }
        do {
            %f();
            next {
                %g();
            }
        } while (%c());
    "});
}

#[test]
fn test_or_else() {
    assert_round_trip(indoc! {"
        attempt: {
            %f();
            bubble();
        } orelse {
            %g();
        }
    "});
}

#[test]
fn test_declarations() {
    assert_round_trip(indoc! {"
        @ssa let t#0: Int;
        var y;
        let z: Bool;
    "});
}

#[test]
fn test_function() {
    assert_round_trip(indoc! {"
        f = fn (a: Int, b) -> r: Int {
            r = a;
        };
    "});
}

#[test]
fn test_nested_block_expression() {
    assert_round_trip(indoc! {"
        x = {
            %f();
            1;
        };
    "});
}

#[test]
fn test_builtin_names() {
    let mut tree = Tree::new();
    let span = Span::new(0, 0);

    let flag = tree.add_left_name(span, Name::source("fail"));
    let operation = tree.add_value(span, Value::Int(1));
    let call = tree.add_builtin_call(span, Builtin::HandlerScope, vec![flag, operation]);
    let key = tree.add_value(span, Value::Key(MetadataKey::Ssa));

    assert_eq!(strip_ansi_escapes::strip_str(render_node(&tree, call)), "hs(fail, 1)");
    assert_eq!(strip_ansi_escapes::strip_str(render_node(&tree, key)), "@ssa");
}
