//! Arena-allocated regression tree.
//!
//! Nodes live in a flat `Vec` with index 0 as the root, so a fitted tree is a
//! plain value that can be cloned, compared and serialized. Every split keeps
//! the squared-error improvement it achieved, which feeds relative influence
//! and the choice of a tree's most influential predictor.

use mvtboost_core::{Matrix, MvtbError, Result, Summarizable};

use crate::feature::{validate_predictors, FeatureKind};
use crate::split::find_best_split;

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeConfig {
    /// Maximum depth (0 = a single leaf).
    pub max_depth: usize,
    /// Minimum number of non-missing observations in each child of a split.
    pub min_leaf_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            min_leaf_size: 10,
        }
    }
}

/// Level routing for a categorical split.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategorySplit {
    /// `goes_left[level]` for every level seen at fit time.
    pub goes_left: Vec<bool>,
    /// Levels present in the node's training rows; others route like missing.
    pub seen: Vec<bool>,
}

/// Decision rule of a split node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SplitRule {
    /// `value <= threshold` goes left.
    Threshold(f64),
    /// Level subset that goes left.
    Categories(CategorySplit),
}

/// A single node in the tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TreeNode {
    /// Internal split node.
    Split {
        feature_idx: usize,
        rule: SplitRule,
        /// Direction taken by missing values and unseen levels.
        missing_left: bool,
        left: usize,  // index into arena
        right: usize, // index into arena
        /// Reduction in sum of squared error achieved by this split.
        improvement: f64,
        n_samples: usize,
    },
    /// Terminal leaf node.
    Leaf { value: f64, n_samples: usize },
}

/// A squared-error regression tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
}

impl RegressionTree {
    /// Fit a tree to `targets` using the rows of `x` listed in `sample`.
    ///
    /// * `x` — predictors, `NaN` = missing
    /// * `kinds` — one [`FeatureKind`] per predictor column
    /// * `targets` — one value per row of `x`
    /// * `sample` — in-bag row indices into `x` / `targets`
    ///
    /// # Errors
    ///
    /// Returns [`MvtbError::ShapeMismatch`] if `targets` or `kinds` disagree
    /// with `x`, and [`MvtbError::InvalidInput`] for values that do not fit
    /// their column kind (see [`validate_predictors`]) or a `sample` that is
    /// empty or indexes past the end of `x`.
    pub fn fit(
        x: &Matrix,
        kinds: &[FeatureKind],
        targets: &[f64],
        sample: &[usize],
        config: &TreeConfig,
    ) -> Result<Self> {
        if targets.len() != x.nrows() {
            return Err(MvtbError::ShapeMismatch(format!(
                "targets length {} != predictor rows {}",
                targets.len(),
                x.nrows()
            )));
        }
        validate_predictors(x, kinds)?;
        if sample.is_empty() {
            return Err(MvtbError::InvalidInput("empty sample set".into()));
        }
        if let Some(&bad) = sample.iter().find(|&&i| i >= x.nrows()) {
            return Err(MvtbError::InvalidInput(format!(
                "sample index {} out of range for {} rows",
                bad,
                x.nrows()
            )));
        }

        let mut nodes = Vec::new();
        build_tree(x, kinds, targets, sample, config, 0, &mut nodes);
        Ok(Self {
            nodes,
            n_features: x.ncols(),
        })
    }

    /// Predict the value for a single row of predictors.
    pub fn predict(&self, sample: &[f64]) -> f64 {
        match &self.nodes[self.find_leaf(sample)] {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { .. } => unreachable!("find_leaf returns a leaf"),
        }
    }

    /// Predict every row of `x`.
    pub fn predict_rows(&self, x: &Matrix) -> Vec<f64> {
        x.rows().map(|row| self.predict(row)).collect()
    }

    /// Arena index of the leaf that `sample` routes to.
    pub fn find_leaf(&self, sample: &[f64]) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { .. } => return idx,
                TreeNode::Split {
                    feature_idx,
                    rule,
                    missing_left,
                    left,
                    right,
                    ..
                } => {
                    let go_left = routes_left(rule, *missing_left, sample[*feature_idx]);
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }

    /// The node arena, root first.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Number of predictors the tree was fit on.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of split nodes.
    pub fn n_splits(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Split { .. }))
            .count()
    }

    /// A tree that collapsed to a single leaf.
    pub fn is_degenerate(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Total split improvement per predictor.
    pub fn improvements(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_features];
        for node in &self.nodes {
            if let TreeNode::Split {
                feature_idx,
                improvement,
                ..
            } = node
            {
                totals[*feature_idx] += *improvement;
            }
        }
        totals
    }

    /// Predictor with the greatest total improvement, with that improvement.
    ///
    /// Ties go to the smaller predictor index. `None` for a degenerate tree.
    pub fn most_influential(&self) -> Option<(usize, f64)> {
        if self.is_degenerate() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (j, total) in self.improvements().into_iter().enumerate() {
            if best.map_or(true, |(_, b)| total > b) {
                best = Some((j, total));
            }
        }
        best
    }

    /// Predictors used by at least one split, ascending.
    pub fn split_features(&self) -> Vec<usize> {
        let mut used: Vec<usize> = self
            .nodes
            .iter()
            .filter_map(|n| match n {
                TreeNode::Split { feature_idx, .. } => Some(*feature_idx),
                TreeNode::Leaf { .. } => None,
            })
            .collect();
        used.sort_unstable();
        used.dedup();
        used
    }
}

impl Summarizable for RegressionTree {
    fn summary(&self) -> String {
        format!(
            "RegressionTree: {} nodes, {} splits",
            self.nodes.len(),
            self.n_splits()
        )
    }
}

fn routes_left(rule: &SplitRule, missing_left: bool, value: f64) -> bool {
    if value.is_nan() {
        return missing_left;
    }
    match rule {
        SplitRule::Threshold(threshold) => value <= *threshold,
        SplitRule::Categories(split) => {
            // non-integer codes are not levels
            let level = value as usize;
            let known = value >= 0.0
                && value.fract() == 0.0
                && level < split.seen.len()
                && split.seen[level];
            if known {
                split.goes_left[level]
            } else {
                missing_left
            }
        }
    }
}

fn mean_target(targets: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64
}

fn push_leaf(nodes: &mut Vec<TreeNode>, targets: &[f64], indices: &[usize]) -> usize {
    let idx = nodes.len();
    nodes.push(TreeNode::Leaf {
        value: mean_target(targets, indices),
        n_samples: indices.len(),
    });
    idx
}

/// Recursively build the tree, returning the arena index of the created node.
fn build_tree(
    x: &Matrix,
    kinds: &[FeatureKind],
    targets: &[f64],
    indices: &[usize],
    config: &TreeConfig,
    depth: usize,
    nodes: &mut Vec<TreeNode>,
) -> usize {
    let min_leaf = config.min_leaf_size.max(1);
    if depth >= config.max_depth || indices.len() < 2 * min_leaf {
        return push_leaf(nodes, targets, indices);
    }

    // Check if all targets are the same
    let first = targets[indices[0]];
    if indices.iter().all(|&i| targets[i] == first) {
        return push_leaf(nodes, targets, indices);
    }

    let Some(split) = find_best_split(x, kinds, targets, indices, min_leaf) else {
        return push_leaf(nodes, targets, indices);
    };

    let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| routes_left(&split.rule, split.missing_left, x.get(i, split.feature_idx)));
    if left_indices.is_empty() || right_indices.is_empty() {
        return push_leaf(nodes, targets, indices);
    }

    let node_idx = nodes.len();
    nodes.push(TreeNode::Leaf {
        value: 0.0,
        n_samples: 0,
    }); // placeholder

    let left = build_tree(x, kinds, targets, &left_indices, config, depth + 1, nodes);
    let right = build_tree(x, kinds, targets, &right_indices, config, depth + 1, nodes);

    nodes[node_idx] = TreeNode::Split {
        feature_idx: split.feature_idx,
        rule: split.rule,
        missing_left: split.missing_left,
        left,
        right,
        improvement: split.improvement,
        n_samples: indices.len(),
    };
    node_idx
}
