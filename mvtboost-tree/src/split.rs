//! Best-split search under squared error.
//!
//! Candidates are scored by the reduction in the node's sum of squared
//! deviations. Rows missing the split predictor are sent to the child that
//! holds more non-missing rows, and are included in that child's error.

use mvtboost_core::Matrix;

use crate::feature::FeatureKind;
use crate::tree::{CategorySplit, SplitRule};

/// The winning split for one node.
#[derive(Debug, Clone)]
pub(crate) struct SplitCandidate {
    pub feature_idx: usize,
    pub rule: SplitRule,
    pub missing_left: bool,
    pub improvement: f64,
}

/// Running sums for a set of targets.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n: usize,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn push(&mut self, t: f64) {
        self.n += 1;
        self.sum += t;
        self.sum_sq += t * t;
    }

    fn merged(self, other: Moments) -> Moments {
        Moments {
            n: self.n + other.n,
            sum: self.sum + other.sum,
            sum_sq: self.sum_sq + other.sum_sq,
        }
    }

    fn minus(self, other: Moments) -> Moments {
        Moments {
            n: self.n - other.n,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    /// Sum of squared deviations from the mean.
    fn sse(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        (self.sum_sq - self.sum * self.sum / self.n as f64).max(0.0)
    }
}

/// Smallest improvement treated as real rather than rounding noise.
fn min_gain(parent_sse: f64) -> f64 {
    parent_sse * 1e-12
}

/// Error of a two-way partition once missing rows join the larger side.
fn partition_sse(left: Moments, right: Moments, missing: Moments) -> (f64, bool) {
    let missing_left = left.n >= right.n;
    let sse = if missing_left {
        left.merged(missing).sse() + right.sse()
    } else {
        left.sse() + right.merged(missing).sse()
    };
    (sse, missing_left)
}

/// Find the best split of `indices` across all predictors.
///
/// Returns `None` when no candidate respects `min_leaf_size` or improves on
/// the parent.
pub(crate) fn find_best_split(
    x: &Matrix,
    kinds: &[FeatureKind],
    targets: &[f64],
    indices: &[usize],
    min_leaf_size: usize,
) -> Option<SplitCandidate> {
    let mut parent = Moments::default();
    for &i in indices {
        parent.push(targets[i]);
    }
    let parent_sse = parent.sse();

    let mut best: Option<SplitCandidate> = None;
    for (feat, kind) in kinds.iter().enumerate() {
        let candidate = match kind {
            FeatureKind::Numeric => {
                numeric_split(x, feat, targets, indices, min_leaf_size, parent_sse)
            }
            FeatureKind::Categorical { n_levels } => categorical_split(
                x,
                feat,
                *n_levels,
                targets,
                indices,
                min_leaf_size,
                parent_sse,
            ),
        };
        if let Some(c) = candidate {
            // strict comparison keeps the lowest feature index on ties
            if best.as_ref().map_or(true, |b| c.improvement > b.improvement) {
                best = Some(c);
            }
        }
    }
    best
}

fn numeric_split(
    x: &Matrix,
    feat: usize,
    targets: &[f64],
    indices: &[usize],
    min_leaf_size: usize,
    parent_sse: f64,
) -> Option<SplitCandidate> {
    let mut missing = Moments::default();
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(indices.len());
    for &i in indices {
        let v = x.get(i, feat);
        if v.is_nan() {
            missing.push(targets[i]);
        } else {
            pairs.push((v, targets[i]));
        }
    }
    if pairs.len() < 2 {
        return None;
    }
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut total = Moments::default();
    for &(_, t) in &pairs {
        total.push(t);
    }

    let mut left = Moments::default();
    let mut best: Option<(f64, f64, bool)> = None;
    for i in 0..pairs.len() - 1 {
        left.push(pairs[i].1);
        // no threshold separates equal values
        if pairs[i].0 == pairs[i + 1].0 {
            continue;
        }
        let right = total.minus(left);
        if left.n < min_leaf_size || right.n < min_leaf_size {
            continue;
        }
        let (sse, missing_left) = partition_sse(left, right, missing);
        let improvement = parent_sse - sse;
        if improvement > best.map_or(min_gain(parent_sse), |b| b.0) {
            let threshold = midpoint_below(pairs[i].0, pairs[i + 1].0);
            best = Some((improvement, threshold, missing_left));
        }
    }

    best.map(|(improvement, threshold, missing_left)| SplitCandidate {
        feature_idx: feat,
        rule: SplitRule::Threshold(threshold),
        missing_left,
        improvement,
    })
}

/// A threshold `t` with `a <= t < b`, halfway when representable.
fn midpoint_below(a: f64, b: f64) -> f64 {
    let mid = a + (b - a) / 2.0;
    if mid < b {
        mid
    } else {
        a
    }
}

fn categorical_split(
    x: &Matrix,
    feat: usize,
    n_levels: usize,
    targets: &[f64],
    indices: &[usize],
    min_leaf_size: usize,
    parent_sse: f64,
) -> Option<SplitCandidate> {
    let mut missing = Moments::default();
    let mut per_level = vec![Moments::default(); n_levels];
    for &i in indices {
        let v = x.get(i, feat);
        match per_level.get_mut(v as usize) {
            Some(level) if v >= 0.0 && v.fract() == 0.0 => level.push(targets[i]),
            _ => missing.push(targets[i]),
        }
    }

    // order present levels by mean target; prefixes of this order are the
    // only subsets that can be optimal under squared error
    let mut order: Vec<usize> = (0..n_levels).filter(|&l| per_level[l].n > 0).collect();
    if order.len() < 2 {
        return None;
    }
    order.sort_by(|&a, &b| {
        let ma = per_level[a].sum / per_level[a].n as f64;
        let mb = per_level[b].sum / per_level[b].n as f64;
        ma.partial_cmp(&mb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let total = order
        .iter()
        .fold(Moments::default(), |acc, &l| acc.merged(per_level[l]));

    let mut left = Moments::default();
    let mut best: Option<(f64, usize, bool)> = None;
    for k in 0..order.len() - 1 {
        left = left.merged(per_level[order[k]]);
        let right = total.minus(left);
        if left.n < min_leaf_size || right.n < min_leaf_size {
            continue;
        }
        let (sse, missing_left) = partition_sse(left, right, missing);
        let improvement = parent_sse - sse;
        if improvement > best.map_or(min_gain(parent_sse), |b| b.0) {
            best = Some((improvement, k + 1, missing_left));
        }
    }

    best.map(|(improvement, n_left, missing_left)| {
        let mut goes_left = vec![false; n_levels];
        let mut seen = vec![false; n_levels];
        for (k, &l) in order.iter().enumerate() {
            seen[l] = true;
            goes_left[l] = k < n_left;
        }
        SplitCandidate {
            feature_idx: feat,
            rule: SplitRule::Categories(CategorySplit { goes_left, seen }),
            missing_left,
            improvement,
        }
    })
}
