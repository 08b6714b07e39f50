//! Passes that simplify woven trees without changing what they do

pub mod cleanup;

pub use self::cleanup::{CleanupOptions, cleanup};
