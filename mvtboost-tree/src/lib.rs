//! Squared-error regression trees for boosting.
//!
//! - **Predictor kinds** — numeric and categorical columns ([`FeatureKind`]),
//!   missing values encoded as `NaN`
//! - **Tree growth** — depth-limited CART growth minimizing squared error,
//!   with a minimum leaf size and per-split improvement bookkeeping
//! - **Missing values** — each split remembers the majority direction and
//!   routes missing (and unseen categorical) values that way at prediction
//! - **Sampling** — seeded row subsampling without replacement for bagging

pub mod feature;
pub mod sampling;
mod split;
pub mod tree;

pub use feature::{validate_predictors, FeatureKind};
pub use sampling::bag_rows;
pub use tree::{CategorySplit, RegressionTree, SplitRule, TreeConfig, TreeNode};
