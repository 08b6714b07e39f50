//! Runs the passes over a tree in order: weaving, a flow soundness check,
//! the use-before-init check, then cleanup

use tracing::{debug, info_span, warn};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink, DiagnosticValue, MessageTemplate},
    error::{InternalError, InternalErrorKind, internal_error},
    middle::{
        analysis::check_use_before_init,
        optimization::{CleanupOptions, cleanup},
        tree::{Tree, check_flow_soundness, name::NameMaker},
        weave::{WeaverOptions, weave},
    },
};

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub weaver: WeaverOptions,
    pub cleanup: CleanupOptions,
    pub check_use_before_init: bool,
    pub run_cleanup: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            weaver: WeaverOptions::default(),
            cleanup: CleanupOptions::default(),
            check_use_before_init: true,
            run_cleanup: true,
        }
    }
}

/// Weaves `tree` and cleans up after it. Problems in the program become
/// diagnostics. An internal error is reported as a diagnostic too and then
/// returned, leaving the tree in whatever state the failing pass left it.
pub fn run(
    tree: &mut Tree,
    names: &mut NameMaker,
    options: &PipelineOptions,
    sink: &mut impl DiagnosticSink,
) -> Result<(), InternalError> {
    let span = info_span!("pipeline", nodes = tree.len());
    let _enter = span.enter();

    let result = run_stages(tree, names, options, sink);

    if let Err(error) = &result {
        warn!(%error, "pipeline stopped");

        let root = tree.root();
        sink.report(Diagnostic::error(
            MessageTemplate::InternalError,
            tree.span(root),
            vec![DiagnosticValue::Text(error.to_string())],
        ));
    }

    result
}

fn run_stages(
    tree: &mut Tree,
    names: &mut NameMaker,
    options: &PipelineOptions,
    sink: &mut impl DiagnosticSink,
) -> Result<(), InternalError> {
    weave(tree, names, &options.weaver, sink)?;
    debug!("woven");

    let root = tree.root();
    let problems = check_flow_soundness(tree, root);

    if !problems.is_empty() {
        return Err(internal_error!(InternalErrorKind::UnsoundFlow { problems }));
    }

    if options.check_use_before_init {
        check_use_before_init(tree, root, sink);
        debug!("checked use before init");
    }

    if options.run_cleanup {
        cleanup(tree, &options.cleanup, sink)?;
        debug!("cleaned up");
    }

    Ok(())
}
