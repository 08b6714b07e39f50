use indoc::indoc;

use crate::{
    frontend::reader::{ReadError, read_str},
    middle::tree::{
        BlockFlow, NodeKind,
        control_flow::{CheckPosition, ControlFlow},
        name::Name,
        value::{Builtin, MetadataKey, Value},
    },
    middle::ty::Type,
    tests::common::{read, render},
};

#[test]
fn test_straight_line_root_is_linear() {
    let (tree, _) = read("%f(); %g();");
    let root = tree.root();

    assert!(matches!(
        tree.block_flow(root),
        Some(BlockFlow::Linear { label: None })
    ));
    assert_eq!(tree.children(root).len(), 2);
}

#[test]
fn test_initializer_splits_into_declaration_and_assignment() {
    let (tree, _) = read("let x = 1;");
    let root = tree.root();
    let children = tree.children(root);

    assert_eq!(children.len(), 2);

    let parts = tree.decl_parts(children[0]).expect("declaration");
    assert_eq!(parts.name, Name::source("x"));
    assert!(!parts.is_var());

    let (assigned, value) = tree.assignment_parts(children[1]).expect("assignment");
    assert_eq!(assigned, Name::source("x"));
    assert_eq!(tree.value(value), Some(&Value::Int(1)));
}

#[test]
fn test_declaration_metadata_and_type() {
    let (tree, _) = read("@ssa var t#4: Int;");
    let decl = tree.children(tree.root())[0];
    let parts = tree.decl_parts(decl).expect("declaration");

    assert!(parts.name.is_temporary());
    assert!(parts.has(MetadataKey::Ssa));
    assert!(parts.is_var());
    assert_eq!(tree.decl_type(decl), Some(&Type::INT));
}

#[test]
fn test_temporaries_are_reserved() {
    let (_, mut names) = read("t#7 = 1;");

    let Name::Temporary { uid, .. } = names.temporary("t") else {
        panic!("expected a temporary");
    };
    assert_eq!(uid, 8);
}

#[test]
fn test_name_kinds() {
    let (tree, _) = read("%f(::g, x, t#0);");
    let call = tree.children(tree.root())[0];
    let names = tree
        .children(call)
        .iter()
        .map(|c| tree.right_name(*c).expect("name"))
        .collect::<Vec<_>>();

    assert!(names[0].is_builtin());
    assert!(names[1].is_exported());
    assert_eq!(names[2], Name::source("x"));
    assert!(names[3].is_temporary());
}

#[test]
fn test_builtin_calls_use_function_values() {
    let (tree, _) = read("hs(fail, %f());");
    let call = tree.children(tree.root())[0];

    assert_eq!(tree.callee_builtin(call), Some(Builtin::HandlerScope));
    // The flag is written, not read
    assert_eq!(tree.left_name(tree.child(call, 1)), Some(Name::source("fail")));
}

#[test]
fn test_control_flow_makes_root_structured() {
    let (tree, _) = read(indoc! {"
        if (%c()) {
            %f();
        } else {
            %g();
        }
        %h();
    "});

    let flow = tree.structured_flow(tree.root()).expect("structured root");
    assert_eq!(flow.stmts.len(), 2);
    assert!(matches!(flow.stmts[0], ControlFlow::If(_)));
    assert_eq!(flow.refs().len(), 4);
}

#[test]
fn test_do_while_checks_on_the_right() {
    let (tree, _) = read("l: do { %f(); } while (%c());");
    let flow = tree.structured_flow(tree.root()).expect("structured root");

    let ControlFlow::Loop(lp) = &flow.stmts[0] else {
        panic!("expected a loop, got {:?}", flow.stmts[0]);
    };

    assert_eq!(lp.check_position, CheckPosition::Right);
    assert_eq!(lp.label, Some(Name::source("l")));
}

#[test]
fn test_if_in_expression_position_is_a_block() {
    let (tree, _) = read("x = if (%c()) { 1 } else { 2 };");
    let assignment = tree.children(tree.root())[0];
    let (_, value) = tree.assignment_parts(assignment).expect("assignment");

    assert!(matches!(
        tree.kind(value),
        NodeKind::Block(BlockFlow::Structured(_))
    ));
}

#[test]
fn test_errors() {
    assert!(matches!(
        read_str("1 = 2;"),
        Err(ReadError::InvalidAssignmentTarget { .. })
    ));
    assert!(matches!(
        read_str("%f(let x = 1);"),
        Err(ReadError::NestedInitializer { .. })
    ));
    assert!(matches!(
        read_str("@bogus let x;"),
        Err(ReadError::UnknownMetadataKey { .. })
    ));
    assert!(matches!(
        read_str("%f("),
        Err(ReadError::UnexpectedEof { .. })
    ));
}

#[test]
fn test_type_ascription() {
    let (tree, _) = read("%f()::Void;");
    let call = tree.children(tree.root())[0];

    assert_eq!(tree.ty(call), Some(&Type::VOID));
    assert_eq!(render(&tree), "%f();\n");
}
