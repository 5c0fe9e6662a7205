//! Distance matrices and agglomerative hierarchical clustering.
//!
//! - **Distances** — Euclidean, Manhattan, maximum and Canberra metrics over
//!   matrix rows, packed into a symmetric [`DistanceMatrix`]
//! - **Hierarchical** — single, complete, average, McQuitty and Ward linkage
//!   producing a full [`Dendrogram`] with merge heights and a leaf ordering
//!   suitable for reordering heatmap rows and columns
//!
//! Method names parse case-insensitively through [`std::str::FromStr`], so
//! callers holding a string can resolve it to a closed set of variants.

pub mod distance;
pub mod hierarchical;

pub use distance::{DistanceMatrix, DistanceMethod};
pub use hierarchical::{hierarchical, Dendrogram, Linkage, MergeStep};
