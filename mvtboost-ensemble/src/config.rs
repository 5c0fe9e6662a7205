//! Fitting configuration and eager validation.

use mvtboost_core::{MvtbError, Result};
use mvtboost_tree::TreeConfig;

/// What to do with the covariance-explained matrices of CV folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CovexAggregation {
    /// Keep only the full-data covex (fold covex stays in the CV report).
    #[default]
    None,
    /// Also store the element-wise sum over folds.
    Sum,
    /// Also store the element-wise mean over folds.
    Mean,
}

/// Configuration for a joint multivariate boosting fit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoostConfig {
    /// Total boosting rounds N; one tree for one outcome per round (default: 100).
    pub n_trees: usize,
    /// Shrinkage applied to every tree, in (0, 1] (default: 0.01).
    pub shrinkage: f64,
    /// Maximum depth of each tree (default: 1).
    pub interaction_depth: usize,
    /// Minimum number of observations per child of a split (default: 10).
    pub min_leaf_size: usize,
    /// Fraction of training rows drawn without replacement per round (default: 1.0).
    pub bag_fraction: f64,
    /// Leading fraction of rows used for training; the rest is the test set (default: 1.0).
    pub train_fraction: f64,
    /// Number of CV folds; 0 disables CV, 1 is rejected (default: 0).
    pub cv_folds: usize,
    /// Upper bound on concurrently fitted CV folds (default: 1).
    pub n_workers: usize,
    /// Random seed for bagging and fold assignment (default: 42).
    pub seed: u64,
    /// Keep a per-round record of outcome, predictor and covariance deltas.
    pub keep_round_details: bool,
    /// Whether to also aggregate fold covex matrices into the model.
    pub covex_fold_aggregation: CovexAggregation,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            shrinkage: 0.01,
            interaction_depth: 1,
            min_leaf_size: 10,
            bag_fraction: 1.0,
            train_fraction: 1.0,
            cv_folds: 0,
            n_workers: 1,
            seed: 42,
            keep_round_details: false,
            covex_fold_aggregation: CovexAggregation::None,
        }
    }
}

impl BoostConfig {
    /// Growth limits handed to every tree.
    pub fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.interaction_depth,
            min_leaf_size: self.min_leaf_size,
        }
    }

    pub fn cv_enabled(&self) -> bool {
        self.cv_folds >= 2
    }
}

/// Reject out-of-range settings before any fitting work starts.
pub fn validate_config(config: &BoostConfig) -> Result<()> {
    if config.n_trees == 0 {
        return Err(MvtbError::InvalidConfiguration(
            "n_trees must be > 0".into(),
        ));
    }
    if !(config.shrinkage > 0.0 && config.shrinkage <= 1.0) {
        return Err(MvtbError::InvalidConfiguration(
            "shrinkage must be in (0, 1]".into(),
        ));
    }
    if config.interaction_depth == 0 {
        return Err(MvtbError::InvalidConfiguration(
            "interaction_depth must be >= 1".into(),
        ));
    }
    if config.min_leaf_size == 0 {
        return Err(MvtbError::InvalidConfiguration(
            "min_leaf_size must be >= 1".into(),
        ));
    }
    if !(config.bag_fraction > 0.0 && config.bag_fraction <= 1.0) {
        return Err(MvtbError::InvalidConfiguration(
            "bag_fraction must be in (0, 1]".into(),
        ));
    }
    if !(config.train_fraction > 0.0 && config.train_fraction <= 1.0) {
        return Err(MvtbError::InvalidConfiguration(
            "train_fraction must be in (0, 1]".into(),
        ));
    }
    if config.cv_folds == 1 {
        return Err(MvtbError::InvalidConfiguration(
            "cv_folds must be 0 (disabled) or >= 2".into(),
        ));
    }
    if config.n_workers == 0 {
        return Err(MvtbError::InvalidConfiguration(
            "n_workers must be >= 1".into(),
        ));
    }
    Ok(())
}
