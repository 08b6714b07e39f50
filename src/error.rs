use thiserror::Error;

use crate::middle::tree::{FlowSoundnessProblem, NodeId};

/// An invariant the passes rely on does not hold. Unlike diagnostics, these
/// stop the pass that hit them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("internal error: {kind}{location}")]
pub struct InternalError {
    pub kind: InternalErrorKind,
    /// Where in this crate the error was raised. Empty unless built with the
    /// `error-backtrace` feature.
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalErrorKind {
    #[error("{node:?} was expected to be a block")]
    NotABlock { node: NodeId },
    #[error("cleanup did not settle after {iterations} iterations")]
    CleanupDidNotConverge { iterations: usize },
    #[error("control flow is unsound after weaving: {problems:?}")]
    UnsoundFlow { problems: Vec<FlowSoundnessProblem> },
}

macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

/// Builds an [`InternalError`], recording where it was raised when the
/// `error-backtrace` feature is on
macro_rules! internal_error {
    ($kind:expr $(,)?) => {{
        let location = if cfg!(feature = "error-backtrace") {
            format!(
                " (raised in {}::{} at {}:{}:{})",
                module_path!(),
                $crate::error::function!(),
                file!(),
                line!(),
                column!()
            )
        } else {
            String::new()
        };

        $crate::error::InternalError {
            kind: $kind,
            location,
        }
    }};
}

pub(crate) use function;
pub(crate) use internal_error;
