//! Path-based view of a block's control flow

pub mod maximal_path;

pub use self::maximal_path::{
    Direction, Element, Follower, MaximalPath, MaximalPaths, PathIndex, PathOptions, Preceder,
};
