//! One boosting step for one outcome, and the per-outcome ensembles it builds.

use mvtboost_core::{Matrix, MvtbError, Result};
use mvtboost_tree::{validate_predictors, FeatureKind, RegressionTree, TreeConfig};

/// Result of fitting one tree to one outcome's residual.
#[derive(Debug, Clone)]
pub struct TreeFit {
    pub tree: RegressionTree,
    /// Most influential predictor; 0 for a degenerate tree.
    pub predictor: usize,
    /// Total improvement of `predictor` in this tree.
    pub improvement: f64,
    /// Unscaled tree output for every row the fitter was built over.
    pub fitted: Vec<f64>,
    /// The tree collapsed to a single leaf.
    pub degenerate: bool,
}

/// Fits single regression trees to residual columns over a fixed set of rows.
#[derive(Debug, Clone, Copy)]
pub struct TreeEnsembleFitter<'a> {
    x: &'a Matrix,
    kinds: &'a [FeatureKind],
    config: TreeConfig,
}

impl<'a> TreeEnsembleFitter<'a> {
    /// # Errors
    ///
    /// Returns [`MvtbError::ShapeMismatch`] if `kinds` does not have one entry
    /// per column of `x`, and [`MvtbError::InvalidInput`] for infinite values
    /// or invalid categorical level codes.
    pub fn new(x: &'a Matrix, kinds: &'a [FeatureKind], config: TreeConfig) -> Result<Self> {
        validate_predictors(x, kinds)?;
        Ok(Self { x, kinds, config })
    }

    /// Fit one tree to `residual` using the in-bag rows in `sample`.
    ///
    /// Fitted values cover all rows, in-bag or not. A residual that is
    /// constant over the sample yields a degenerate tree, which is reported
    /// through [`TreeFit::degenerate`] rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns [`MvtbError::ShapeMismatch`] if `residual` does not have one
    /// value per predictor row.
    pub fn fit(&self, residual: &[f64], sample: &[usize]) -> Result<TreeFit> {
        if residual.len() != self.x.nrows() {
            return Err(MvtbError::ShapeMismatch(format!(
                "residual length {} != predictor rows {}",
                residual.len(),
                self.x.nrows()
            )));
        }
        let tree = RegressionTree::fit(self.x, self.kinds, residual, sample, &self.config)?;
        let fitted = tree.predict_rows(self.x);
        let (predictor, improvement) = tree.most_influential().unwrap_or((0, 0.0));
        let degenerate = tree.is_degenerate();
        Ok(TreeFit {
            tree,
            predictor,
            improvement,
            fitted,
            degenerate,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }
}

/// A tree as stored in an outcome's ensemble.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnsembleTree {
    /// Zero-based boosting round that produced the tree.
    pub round: usize,
    pub tree: RegressionTree,
    /// Most influential predictor of the tree.
    pub predictor: usize,
    pub improvement: f64,
}

/// The intercept and trees of one outcome, in round order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutcomeEnsemble {
    pub outcome: usize,
    /// Mean of the outcome over the training rows.
    pub intercept: f64,
    pub trees: Vec<EnsembleTree>,
}

impl OutcomeEnsemble {
    pub fn new(outcome: usize, intercept: f64) -> Self {
        Self {
            outcome,
            intercept,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Trees fitted in the first `count` rounds.
    pub fn trees_before(&self, count: usize) -> &[EnsembleTree] {
        let end = self.trees.partition_point(|t| t.round < count);
        &self.trees[..end]
    }

    /// Prediction for one row after `count` rounds.
    ///
    /// Summation starts at the intercept and adds scaled trees in round order.
    pub fn predict_row(&self, row: &[f64], shrinkage: f64, count: usize) -> f64 {
        self.trees_before(count)
            .iter()
            .fold(self.intercept, |acc, t| acc + shrinkage * t.tree.predict(row))
    }

    /// Per-predictor improvement totals over the first `count` rounds.
    pub fn relative_influence(&self, n_predictors: usize, count: usize) -> Vec<f64> {
        let mut totals = vec![0.0; n_predictors];
        for t in self.trees_before(count) {
            for (total, imp) in totals.iter_mut().zip(t.tree.improvements()) {
                *total += imp;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Matrix {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![(i % 4) as f64, i as f64]).collect();
        let refs: Vec<&[f64]> = rows.iter().map(|r| r.as_slice()).collect();
        Matrix::from_rows(&refs).unwrap()
    }

    fn stump() -> TreeConfig {
        TreeConfig {
            max_depth: 1,
            min_leaf_size: 2,
        }
    }

    #[test]
    fn picks_informative_predictor() {
        let x = grid();
        let kinds = vec![FeatureKind::Numeric; 2];
        let fitter = TreeEnsembleFitter::new(&x, &kinds, stump()).unwrap();
        let residual: Vec<f64> = (0..20).map(|i| if i >= 10 { 3.0 } else { -3.0 }).collect();
        let all: Vec<usize> = (0..20).collect();
        let fit = fitter.fit(&residual, &all).unwrap();
        assert!(!fit.degenerate);
        assert_eq!(fit.predictor, 1);
        assert!(fit.improvement > 0.0);
        assert_eq!(fit.fitted.len(), 20);
        assert!((fit.fitted[0] + 3.0).abs() < 1e-12);
    }

    #[test]
    fn constant_residual_is_degenerate() {
        let x = grid();
        let kinds = vec![FeatureKind::Numeric; 2];
        let fitter = TreeEnsembleFitter::new(&x, &kinds, stump()).unwrap();
        let all: Vec<usize> = (0..20).collect();
        let fit = fitter.fit(&[1.5; 20], &all).unwrap();
        assert!(fit.degenerate);
        assert_eq!(fit.predictor, 0);
        assert_eq!(fit.improvement, 0.0);
        assert!(fit.fitted.iter().all(|&v| (v - 1.5).abs() < 1e-12));
    }

    #[test]
    fn residual_length_checked() {
        let x = grid();
        let kinds = vec![FeatureKind::Numeric; 2];
        let fitter = TreeEnsembleFitter::new(&x, &kinds, stump()).unwrap();
        assert!(matches!(
            fitter.fit(&[0.0; 5], &[0, 1]),
            Err(MvtbError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn trees_before_respects_rounds() {
        let x = grid();
        let kinds = vec![FeatureKind::Numeric; 2];
        let fitter = TreeEnsembleFitter::new(&x, &kinds, stump()).unwrap();
        let all: Vec<usize> = (0..20).collect();
        let residual: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let mut ens = OutcomeEnsemble::new(0, 10.0);
        for round in [1, 3, 5] {
            let fit = fitter.fit(&residual, &all).unwrap();
            ens.trees.push(EnsembleTree {
                round,
                tree: fit.tree,
                predictor: fit.predictor,
                improvement: fit.improvement,
            });
        }
        assert_eq!(ens.trees_before(1).len(), 0);
        assert_eq!(ens.trees_before(2).len(), 1);
        assert_eq!(ens.trees_before(6).len(), 3);
        assert_eq!(ens.predict_row(&[0.0, 0.0], 0.5, 1), 10.0);
        let infl = ens.relative_influence(2, 6);
        assert!(infl[1] > 0.0);
    }
}
