//! Evaluating a fitted model at one or more iteration counts.
//!
//! Predictions always come back as a `rows x outcomes x counts` array, even
//! when a single count is requested. For count `c` an outcome's value is its
//! intercept plus the shrunken output of every tree it received in the first
//! `c` rounds, summed in round order; every requested count is read off the
//! same running sum, so asking for `c` alone or inside a list gives
//! bit-identical values.

use mvtboost_core::{Matrix, MvtbError, Result};
use ndarray::Array3;

use crate::model::FittedModel;

/// Which iteration counts to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IterationRequest {
    /// The model's combined best iteration count.
    #[default]
    Best,
    Count(usize),
    Counts(Vec<usize>),
}

impl From<usize> for IterationRequest {
    fn from(c: usize) -> Self {
        IterationRequest::Count(c)
    }
}

impl From<Vec<usize>> for IterationRequest {
    fn from(counts: Vec<usize>) -> Self {
        IterationRequest::Counts(counts)
    }
}

impl From<&[usize]> for IterationRequest {
    fn from(counts: &[usize]) -> Self {
        IterationRequest::Counts(counts.to_vec())
    }
}

impl IterationRequest {
    /// Concrete counts, each checked against `1..=n_trees`.
    pub fn resolve(&self, model: &FittedModel) -> Result<Vec<usize>> {
        let counts = match self {
            IterationRequest::Best => vec![model.best_iteration()],
            IterationRequest::Count(c) => vec![*c],
            IterationRequest::Counts(cs) => cs.clone(),
        };
        if counts.is_empty() {
            return Err(MvtbError::InvalidInput("no iteration counts requested".into()));
        }
        let n = model.n_trees();
        if let Some(bad) = counts.iter().find(|&&c| c == 0 || c > n) {
            return Err(MvtbError::ShapeMismatch(format!(
                "iteration count {} outside 1..={}",
                bad, n
            )));
        }
        Ok(counts)
    }
}

/// Evaluates a fitted model on new predictor rows.
#[derive(Debug, Clone, Copy)]
pub struct PredictionEngine<'m> {
    model: &'m FittedModel,
}

impl<'m> PredictionEngine<'m> {
    pub fn new(model: &'m FittedModel) -> Self {
        Self { model }
    }

    /// Predict every row of `x` at the requested counts.
    ///
    /// # Errors
    ///
    /// Returns [`MvtbError::ShapeMismatch`] if `x` has the wrong number of
    /// columns or a count lies outside `1..=n_trees`.
    pub fn predict(&self, x: &Matrix, request: impl Into<IterationRequest>) -> Result<Array3<f64>> {
        self.check_columns(x)?;
        let counts = request.into().resolve(self.model)?;
        let q = self.model.n_outcomes();
        let k = counts.len();

        // visit counts in increasing order while filling their original slots
        let mut order: Vec<usize> = (0..k).collect();
        order.sort_by_key(|&i| counts[i]);

        let row_values = |row: &[f64]| -> Vec<f64> {
            let mut out = vec![0.0; q * k];
            for (o, ensemble) in self.model.ensembles().iter().enumerate() {
                let mut acc = ensemble.intercept;
                let mut trees = ensemble.trees.iter().peekable();
                for &slot in &order {
                    let c = counts[slot];
                    while let Some(t) = trees.next_if(|t| t.round < c) {
                        acc += self.model.shrinkage() * t.tree.predict(row);
                    }
                    out[o * k + slot] = acc;
                }
            }
            out
        };

        #[cfg(feature = "parallel")]
        let per_row: Vec<Vec<f64>> = {
            use rayon::prelude::*;
            (0..x.nrows())
                .into_par_iter()
                .map(|i| row_values(x.row(i)))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let per_row: Vec<Vec<f64>> = x.rows().map(row_values).collect();

        let mut out = Array3::<f64>::zeros((x.nrows(), q, k));
        for (i, values) in per_row.iter().enumerate() {
            for o in 0..q {
                for c in 0..k {
                    out[[i, o, c]] = values[o * k + c];
                }
            }
        }
        Ok(out)
    }

    /// Shrunken output of each of `outcome`'s trees on every row of `x`.
    ///
    /// Column `t` holds the `t`-th tree of the outcome, in round order.
    pub fn tree_contributions(&self, x: &Matrix, outcome: usize) -> Result<Matrix> {
        self.check_columns(x)?;
        let ensemble = self.model.ensemble(outcome).ok_or_else(|| {
            MvtbError::InvalidInput(format!(
                "outcome {} out of range for {} outcomes",
                outcome,
                self.model.n_outcomes()
            ))
        })?;
        let shrinkage = self.model.shrinkage();
        let mut out = Matrix::zeros(x.nrows(), ensemble.n_trees());
        for (i, row) in x.rows().enumerate() {
            for (cell, t) in out.row_mut(i).iter_mut().zip(&ensemble.trees) {
                *cell = shrinkage * t.tree.predict(row);
            }
        }
        Ok(out)
    }

    fn check_columns(&self, x: &Matrix) -> Result<()> {
        if x.ncols() != self.model.n_predictors() {
            return Err(MvtbError::ShapeMismatch(format!(
                "{} predictor columns, model was fit on {}",
                x.ncols(),
                self.model.n_predictors()
            )));
        }
        Ok(())
    }
}

/// Shorthand for [`PredictionEngine::predict`].
pub fn predict(
    model: &FittedModel,
    x: &Matrix,
    request: impl Into<IterationRequest>,
) -> Result<Array3<f64>> {
    PredictionEngine::new(model).predict(x, request)
}
