//! Analyses over woven bodies. They read the tree and its maximal paths and
//! report or patch what they find.

pub mod reads_and_writes;
pub mod use_before_init;

pub use self::{
    reads_and_writes::{BodySignature, ReadsAndWrites},
    use_before_init::check_use_before_init,
};
