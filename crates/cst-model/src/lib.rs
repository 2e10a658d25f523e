//! Value types shared by the cluster-state task executors.
//!
//! Everything here is an immutable snapshot or a builder producing one.
//! Nothing in this crate knows how states are published or applied.

mod error;
pub use error::ModelError;

mod domain;
pub use domain::*;
