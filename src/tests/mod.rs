mod common;

mod analysis;
mod cleanup;
mod flow;
mod frontend;
mod t_diagnostics;
mod t_pipeline;
mod weave;
