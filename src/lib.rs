//! Weaves expression trees into statement trees, and analyzes and cleans up
//! the result.
//!
//! The [`pipeline`] module strings the passes together. Individual passes live
//! under [`middle`], and [`frontend`] reads the pseudo-code notation used to
//! build trees by hand.

pub mod diagnostics;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;
pub mod pipeline;
#[doc(hidden)]
pub mod test_support;

#[cfg(test)]
mod tests;
