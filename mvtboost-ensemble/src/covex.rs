//! Covariance explained by each predictor, per outcome pair.
//!
//! After every boosting round the residual covariance matrix is compared with
//! the one before the round. The squared element-wise change over the upper
//! triangle (diagonal included) is added to the row of the round's most
//! influential predictor. Accumulation is purely additive: the matrix after
//! N rounds is the sum of the N per-round contributions.

use mvtboost_core::{outcome_pairs, pair_count, Matrix, MvtbError, Result, Summarizable};

use crate::coordinator::RoundRecord;

/// Squared upper-triangle difference between two covariance matrices.
///
/// # Errors
///
/// Returns [`MvtbError::ShapeMismatch`] unless both matrices are square and
/// of the same size.
pub fn covariance_delta_sq(before: &Matrix, after: &Matrix) -> Result<Vec<f64>> {
    if before.shape() != after.shape() {
        return Err(MvtbError::ShapeMismatch(format!(
            "covariance shapes {:?} and {:?} differ",
            before.shape(),
            after.shape()
        )));
    }
    let b = before.upper_triangle()?;
    let a = after.upper_triangle()?;
    Ok(b.iter().zip(&a).map(|(x, y)| (x - y).powi(2)).collect())
}

/// Running predictor x outcome-pair covex matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CovexAccumulator {
    covex: Matrix,
    n_outcomes: usize,
}

impl CovexAccumulator {
    /// An all-zero accumulator for `n_predictors` rows and `n_outcomes` outcomes.
    pub fn new(n_predictors: usize, n_outcomes: usize) -> Self {
        Self {
            covex: Matrix::zeros(n_predictors, pair_count(n_outcomes)),
            n_outcomes,
        }
    }

    /// Add the contribution of one round and return it.
    pub fn accumulate(&mut self, before: &Matrix, after: &Matrix, predictor: usize) -> Result<Vec<f64>> {
        if before.nrows() != self.n_outcomes {
            return Err(MvtbError::ShapeMismatch(format!(
                "covariance over {} outcomes, expected {}",
                before.nrows(),
                self.n_outcomes
            )));
        }
        let delta = covariance_delta_sq(before, after)?;
        self.add(predictor, &delta)?;
        Ok(delta)
    }

    /// Add a precomputed squared delta to `predictor`'s row.
    pub fn add(&mut self, predictor: usize, delta_sq: &[f64]) -> Result<()> {
        if predictor >= self.covex.nrows() {
            return Err(MvtbError::InvalidInput(format!(
                "predictor {} out of range for {} predictors",
                predictor,
                self.covex.nrows()
            )));
        }
        if delta_sq.len() != self.covex.ncols() {
            return Err(MvtbError::ShapeMismatch(format!(
                "delta of length {} for {} outcome pairs",
                delta_sq.len(),
                self.covex.ncols()
            )));
        }
        for (cell, d) in self.covex.row_mut(predictor).iter_mut().zip(delta_sq) {
            *cell += d;
        }
        Ok(())
    }

    /// Rebuild a covex matrix one round at a time from stored round records.
    pub fn replay<'r, I>(n_predictors: usize, n_outcomes: usize, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'r RoundRecord>,
    {
        let mut acc = Self::new(n_predictors, n_outcomes);
        for record in records {
            acc.add(record.predictor, &record.delta_sq)?;
        }
        Ok(acc)
    }

    /// Element-wise sum of several accumulated matrices of the same shape.
    pub fn sum_of(matrices: &[&Matrix]) -> Result<Matrix> {
        let first = matrices
            .first()
            .ok_or_else(|| MvtbError::InvalidInput("no covex matrices to combine".into()))?;
        let mut total = Matrix::zeros(first.nrows(), first.ncols());
        for m in matrices {
            total.add_assign(m)?;
        }
        Ok(total)
    }

    pub fn matrix(&self) -> &Matrix {
        &self.covex
    }

    pub fn into_matrix(self) -> Matrix {
        self.covex
    }
}

impl Summarizable for CovexAccumulator {
    fn summary(&self) -> String {
        let total: f64 = self.covex.as_slice().iter().sum();
        format!(
            "CovexAccumulator: {} predictors x {} outcome pairs, total {:.4e}",
            self.covex.nrows(),
            self.covex.ncols(),
            total
        )
    }
}

/// Column labels `"a-b"` for the canonical outcome pairs.
pub fn pair_labels(outcome_names: &[String]) -> Vec<String> {
    outcome_pairs(outcome_names.len())
        .into_iter()
        .map(|(a, b)| format!("{}-{}", outcome_names[a], outcome_names[b]))
        .collect()
}

/// Scale every column to sum to 100; all-zero columns stay zero.
pub fn column_percent(m: &Matrix) -> Matrix {
    let mut out = m.clone();
    for j in 0..m.ncols() {
        let total: f64 = m.column(j).iter().sum();
        if total > 0.0 {
            for i in 0..m.nrows() {
                out.set(i, j, 100.0 * m.get(i, j) / total);
            }
        }
    }
    out
}
