use crate::{
    diagnostics::{Diagnostic, MessageTemplate},
    frontend::reader::read_str,
    middle::{
        optimization::{CleanupOptions, cleanup},
        tree::{Tree, check_flow_soundness, name::NameMaker, pseudo_code::render_tree},
        weave::{WeaverOptions, weave},
    },
    pipeline::{self, PipelineOptions},
    test_support::{self, Run},
};

pub fn read(source: &str) -> (Tree, NameMaker) {
    match read_str(source) {
        Ok(read) => read,
        Err(error) => panic!("failed to read test source: {error}\n{source}"),
    }
}

/// The pseudo-code rendering without colors
pub fn render(tree: &Tree) -> String {
    strip_ansi_escapes::strip_str(render_tree(tree))
}

/// Rendered statements, trimmed, leaving out `void;` placeholders
pub fn statements(tree: &Tree) -> Vec<String> {
    render(tree)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "void;")
        .map(str::to_owned)
        .collect()
}

pub fn weave_source(source: &str) -> (Tree, NameMaker, Vec<Diagnostic>) {
    weave_source_with(source, &WeaverOptions::default())
}

pub fn weave_source_with(
    source: &str,
    options: &WeaverOptions,
) -> (Tree, NameMaker, Vec<Diagnostic>) {
    let (mut tree, mut names) = read(source);
    let mut diagnostics = Vec::new();

    weave(&mut tree, &mut names, options, &mut diagnostics).expect("weaving failed");

    let problems = check_flow_soundness(&tree, tree.root());
    assert!(problems.is_empty(), "unsound flow after weaving: {problems:?}");

    (tree, names, diagnostics)
}

/// Weaves then cleans up, without the use-before-init check
pub fn clean_source(source: &str) -> (Tree, Vec<Diagnostic>) {
    let (mut tree, _, mut diagnostics) = weave_source(source);

    cleanup(&mut tree, &CleanupOptions::default(), &mut diagnostics).expect("cleanup failed");

    (tree, diagnostics)
}

pub fn run_pipeline(source: &str) -> (Tree, Vec<Diagnostic>) {
    let (mut tree, mut names) = read(source);
    let mut diagnostics = Vec::new();

    pipeline::run(&mut tree, &mut names, &PipelineOptions::default(), &mut diagnostics)
        .expect("pipeline failed");

    (tree, diagnostics)
}

pub fn run(tree: &Tree) -> Run {
    match test_support::run(tree) {
        Ok(run) => run,
        Err(error) => panic!("running the tree failed: {error}\n{}", render(tree)),
    }
}

pub fn with_template(diagnostics: &[Diagnostic], template: MessageTemplate) -> Vec<&Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| d.template == template)
        .collect()
}
