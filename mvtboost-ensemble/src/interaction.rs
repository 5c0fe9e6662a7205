//! Departure-from-additivity scores for predictor pairs.
//!
//! Uses Friedman's H statistic: with centered partial dependence functions
//! `F_a`, `F_b` and `F_ab` evaluated at a grid of observed rows,
//!
//! ```text
//! H²(a, b) = Σ (F_ab − F_a − F_b)² / Σ F_ab²
//! ```
//!
//! A value of 0 means the outcome's ensemble is additive in the pair.
//! Partial dependence is computed by brute force over the grid rows.

use mvtboost_core::{Matrix, MvtbError, Result};

use crate::fitter::OutcomeEnsemble;
use crate::model::FittedModel;

/// H² score of one predictor pair for one outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InteractionScore {
    pub a: usize,
    pub b: usize,
    pub h2: f64,
}

/// Mean prediction over the rows of `x` with `predictors` fixed at `at`.
pub fn partial_dependence(
    model: &FittedModel,
    x: &Matrix,
    outcome: usize,
    predictors: &[usize],
    at: &[f64],
    count: usize,
) -> Result<f64> {
    let ensemble = check_inputs(model, x, outcome, count)?;
    if predictors.len() != at.len() {
        return Err(MvtbError::ShapeMismatch(format!(
            "{} predictors with {} values",
            predictors.len(),
            at.len()
        )));
    }
    if let Some(&bad) = predictors.iter().find(|&&j| j >= model.n_predictors()) {
        return Err(MvtbError::InvalidInput(format!(
            "predictor {} out of range for {} predictors",
            bad,
            model.n_predictors()
        )));
    }
    if x.nrows() == 0 {
        return Err(MvtbError::InvalidInput("no rows to average over".into()));
    }
    Ok(pd_at(ensemble, model.shrinkage(), x, predictors, at, count))
}

/// Score every predictor pair of `outcome` and rank them, strongest first.
///
/// Partial dependence is evaluated at up to `grid_rows` evenly spaced rows
/// of `x`, which also serve as the rows averaged over. Pairs where either
/// predictor never splits a tree in the first `count` rounds score 0.
pub fn detect_interactions(
    model: &FittedModel,
    x: &Matrix,
    outcome: usize,
    count: usize,
    grid_rows: usize,
) -> Result<Vec<InteractionScore>> {
    let ensemble = check_inputs(model, x, outcome, count)?;
    if grid_rows == 0 || x.nrows() == 0 {
        return Err(MvtbError::InvalidInput("need at least one grid row".into()));
    }
    let n = x.nrows();
    let m = grid_rows.min(n);
    let picks: Vec<usize> = (0..m).map(|i| i * n / m).collect();
    let grid = x.select_rows(&picks);
    let shrinkage = model.shrinkage();

    let p = model.n_predictors();
    let mut used = vec![false; p];
    for t in ensemble.trees_before(count) {
        for j in t.tree.split_features() {
            used[j] = true;
        }
    }

    let single: Vec<Option<Vec<f64>>> = (0..p)
        .map(|j| {
            used[j].then(|| {
                let values: Vec<f64> = grid
                    .rows()
                    .map(|row| pd_at(ensemble, shrinkage, &grid, &[j], &[row[j]], count))
                    .collect();
                centered(values)
            })
        })
        .collect();

    let mut scores = Vec::with_capacity(p * p.saturating_sub(1) / 2);
    for a in 0..p {
        for b in (a + 1)..p {
            let h2 = match (&single[a], &single[b]) {
                (Some(fa), Some(fb)) => {
                    let joint: Vec<f64> = grid
                        .rows()
                        .map(|row| {
                            pd_at(ensemble, shrinkage, &grid, &[a, b], &[row[a], row[b]], count)
                        })
                        .collect();
                    h_squared(&centered(joint), fa, fb)
                }
                _ => 0.0,
            };
            scores.push(InteractionScore { a, b, h2 });
        }
    }
    scores.sort_by(|l, r| {
        r.h2.partial_cmp(&l.h2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then((l.a, l.b).cmp(&(r.a, r.b)))
    });
    Ok(scores)
}

fn check_inputs<'m>(
    model: &'m FittedModel,
    x: &Matrix,
    outcome: usize,
    count: usize,
) -> Result<&'m OutcomeEnsemble> {
    if x.ncols() != model.n_predictors() {
        return Err(MvtbError::ShapeMismatch(format!(
            "{} predictor columns, model was fit on {}",
            x.ncols(),
            model.n_predictors()
        )));
    }
    if count == 0 || count > model.n_trees() {
        return Err(MvtbError::ShapeMismatch(format!(
            "iteration count {} outside 1..={}",
            count,
            model.n_trees()
        )));
    }
    model.ensemble(outcome).ok_or_else(|| {
        MvtbError::InvalidInput(format!(
            "outcome {} out of range for {} outcomes",
            outcome,
            model.n_outcomes()
        ))
    })
}

fn pd_at(
    ensemble: &OutcomeEnsemble,
    shrinkage: f64,
    x: &Matrix,
    predictors: &[usize],
    at: &[f64],
    count: usize,
) -> f64 {
    let mut row = vec![0.0; x.ncols()];
    let mut total = 0.0;
    for source in x.rows() {
        row.copy_from_slice(source);
        for (&j, &v) in predictors.iter().zip(at) {
            row[j] = v;
        }
        total += ensemble.predict_row(&row, shrinkage, count);
    }
    total / x.nrows() as f64
}

fn centered(mut values: Vec<f64>) -> Vec<f64> {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    for v in &mut values {
        *v -= mean;
    }
    values
}

fn h_squared(joint: &[f64], fa: &[f64], fb: &[f64]) -> f64 {
    let den: f64 = joint.iter().map(|v| v * v).sum();
    if den <= 0.0 {
        return 0.0;
    }
    let num: f64 = joint
        .iter()
        .zip(fa.iter().zip(fb))
        .map(|(j, (a, b))| (j - a - b).powi(2))
        .sum();
    num / den
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fit, BoostConfig, Dataset};

    fn data() -> (Matrix, Matrix) {
        let xs: Vec<Vec<f64>> = (0..64)
            .map(|i| vec![(i % 4) as f64, ((i / 4) % 4) as f64, ((i * 5) % 7) as f64])
            .collect();
        // y0 is a product of x1 and x2; y1 is additive
        let ys: Vec<Vec<f64>> = xs
            .iter()
            .map(|r| vec![r[0] * r[1], r[0] + 2.0 * r[2]])
            .collect();
        let xr: Vec<&[f64]> = xs.iter().map(|r| r.as_slice()).collect();
        let yr: Vec<&[f64]> = ys.iter().map(|r| r.as_slice()).collect();
        (Matrix::from_rows(&xr).unwrap(), Matrix::from_rows(&yr).unwrap())
    }

    fn fitted(depth: usize) -> (FittedModel, Matrix) {
        let (x, y) = data();
        let cfg = BoostConfig {
            n_trees: 60,
            shrinkage: 0.3,
            interaction_depth: depth,
            min_leaf_size: 2,
            ..Default::default()
        };
        let model = fit(&Dataset::new(x.clone(), y).unwrap(), &cfg).unwrap();
        (model, x)
    }

    #[test]
    fn stumps_are_additive() {
        let (model, x) = fitted(1);
        let scores = detect_interactions(&model, &x, 0, 60, 20).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| s.h2 < 1e-9));
    }

    #[test]
    fn product_pair_ranks_first() {
        let (model, x) = fitted(2);
        let scores = detect_interactions(&model, &x, 0, 60, 64).unwrap();
        assert_eq!((scores[0].a, scores[0].b), (0, 1));
        assert!(scores[0].h2 > 0.01);
    }

    #[test]
    fn partial_dependence_of_constant_model_is_intercept() {
        let (model, x) = fitted(1);
        let intercept = model.ensembles()[1].intercept;
        // round 0 fits outcome 0 only, so outcome 1 is still its intercept
        let pd = partial_dependence(&model, &x, 1, &[0], &[2.0], 1).unwrap();
        assert!((pd - intercept).abs() < 1e-12);
    }

    #[test]
    fn inputs_validated() {
        let (model, x) = fitted(1);
        assert!(partial_dependence(&model, &x, 0, &[0, 1], &[1.0], 5).is_err());
        assert!(partial_dependence(&model, &x, 0, &[7], &[1.0], 5).is_err());
        assert!(detect_interactions(&model, &x, 2, 5, 10).is_err());
        assert!(detect_interactions(&model, &x, 0, 61, 10).is_err());
        assert!(detect_interactions(&model, &x, 0, 5, 0).is_err());
    }
}
