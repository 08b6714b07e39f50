//! Everything that works on [`tree::Tree`]s: the flow representation, the
//! analyses built on it and the passes that rewrite trees.

pub mod analysis;
pub mod flow;
pub mod optimization;
pub mod tree;
pub mod ty;
pub mod weave;
