//! Shared primitives for the mvtboost workspace.
//!
//! `mvtboost-core` is the foundation the other crates build on:
//!
//! - **Error types** — [`MvtbError`] and [`Result`] for structured error handling
//! - **Traits** — [`Summarizable`] for one-line reports of fitted artifacts
//! - **Matrices** — [`Matrix`], a dense row-major `f64` matrix with sample
//!   covariance and canonical outcome-pair (upper triangle) indexing

pub mod error;
pub mod matrix;
pub mod traits;

pub use error::{MvtbError, Result};
pub use matrix::{outcome_pairs, pair_count, pair_index, Matrix};
pub use traits::*;
