//! Summary reporting: best iterations, relative influence and covex.

use mvtboost_core::{Matrix, MvtbError, Result, Summarizable};

use crate::covex::{column_percent, pair_labels};
use crate::error_tracker::BestIterations;
use crate::model::FittedModel;

/// Report of a fitted model at one iteration count.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelSummary {
    pub best: BestIterations,
    /// Iteration count the influence figures were computed at.
    pub count: usize,
    pub predictor_names: Vec<String>,
    pub outcome_names: Vec<String>,
    /// Labels of the covex columns, `"a-b"` per outcome pair.
    pub pair_labels: Vec<String>,
    /// Split improvement totals, predictors x outcomes.
    pub relative_influence: Matrix,
    /// Relative influence scaled so every outcome column sums to 100.
    pub relative_influence_pct: Matrix,
    pub covex: Matrix,
    /// Covex scaled so every outcome-pair column sums to 100.
    pub covex_pct: Matrix,
    pub n_degenerate: usize,
}

/// Per-predictor improvement totals for every outcome after `count` rounds.
pub fn relative_influence(model: &FittedModel, count: usize) -> Result<Matrix> {
    if count == 0 || count > model.n_trees() {
        return Err(MvtbError::ShapeMismatch(format!(
            "iteration count {} outside 1..={}",
            count,
            model.n_trees()
        )));
    }
    let p = model.n_predictors();
    let columns: Vec<Vec<f64>> = model
        .ensembles()
        .iter()
        .map(|e| e.relative_influence(p, count))
        .collect();
    Matrix::from_columns(&columns)
}

/// Summarize `model` at its combined best iteration count.
pub fn summarize(model: &FittedModel) -> Result<ModelSummary> {
    summarize_at(model, model.best_iteration())
}

/// Summarize `model` with relative influence taken after `count` rounds.
pub fn summarize_at(model: &FittedModel, count: usize) -> Result<ModelSummary> {
    let influence = relative_influence(model, count)?;
    Ok(ModelSummary {
        best: *model.best_iterations(),
        count,
        predictor_names: model.predictor_names().to_vec(),
        outcome_names: model.outcome_names().to_vec(),
        pair_labels: pair_labels(model.outcome_names()),
        relative_influence_pct: column_percent(&influence),
        relative_influence: influence,
        covex: model.covex().clone(),
        covex_pct: column_percent(model.covex()),
        n_degenerate: model.diagnostics().n_degenerate,
    })
}

impl ModelSummary {
    /// Predictors ranked by influence on `outcome`, largest first.
    pub fn ranked_predictors(&self, outcome: usize) -> Result<Vec<(usize, f64)>> {
        if outcome >= self.relative_influence_pct.ncols() {
            return Err(MvtbError::InvalidInput(format!(
                "outcome {} out of range for {} outcomes",
                outcome,
                self.relative_influence_pct.ncols()
            )));
        }
        let mut ranked: Vec<(usize, f64)> = self
            .relative_influence_pct
            .column(outcome)
            .into_iter()
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }
}

impl Summarizable for ModelSummary {
    fn summary(&self) -> String {
        let sources = [
            Some(format!("train {}", self.best.train)),
            self.best.test.map(|b| format!("test {b}")),
            self.best.cv.map(|b| format!("cv {b}")),
        ];
        let sources: Vec<String> = sources.into_iter().flatten().collect();
        format!(
            "ModelSummary: best {} by {} ({}), {} predictors x {} outcome pairs, {} degenerate",
            self.best.combined,
            self.best.combined_source,
            sources.join(", "),
            self.predictor_names.len(),
            self.pair_labels.len(),
            self.n_degenerate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fit, BoostConfig, Dataset};

    fn model() -> FittedModel {
        // outcome 0 depends on x1, outcome 1 on x2; x3 is noise
        let xs: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![(i % 6) as f64, ((i / 6) % 5) as f64, ((i * 7) % 11) as f64])
            .collect();
        let ys: Vec<Vec<f64>> = xs.iter().map(|r| vec![3.0 * r[0], -2.0 * r[1]]).collect();
        let xr: Vec<&[f64]> = xs.iter().map(|r| r.as_slice()).collect();
        let yr: Vec<&[f64]> = ys.iter().map(|r| r.as_slice()).collect();
        let data = Dataset::new(Matrix::from_rows(&xr).unwrap(), Matrix::from_rows(&yr).unwrap())
            .unwrap()
            .with_outcome_names(vec!["a", "b"])
            .unwrap();
        let cfg = BoostConfig {
            n_trees: 30,
            shrinkage: 0.2,
            min_leaf_size: 3,
            ..Default::default()
        };
        fit(&data, &cfg).unwrap()
    }

    #[test]
    fn influence_tracks_generating_predictor() {
        let m = model();
        let s = summarize(&m).unwrap();
        assert_eq!(s.ranked_predictors(0).unwrap()[0].0, 0);
        assert_eq!(s.ranked_predictors(1).unwrap()[0].0, 1);
        assert!(matches!(s.ranked_predictors(2), Err(MvtbError::InvalidInput(_))));
        for q in 0..2 {
            let total: f64 = s.relative_influence_pct.column(q).iter().sum();
            assert!((total - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn covex_percent_and_labels() {
        let m = model();
        let s = summarize_at(&m, 30).unwrap();
        assert_eq!(s.pair_labels, vec!["a-a", "a-b", "b-b"]);
        assert_eq!(s.covex.shape(), (3, 3));
        let aa: f64 = s.covex_pct.column(0).iter().sum();
        assert!((aa - 100.0).abs() < 1e-9);
        assert!(s.summary().starts_with("ModelSummary: best"));
    }

    #[test]
    fn influence_grows_with_count() {
        let m = model();
        let early = relative_influence(&m, 4).unwrap();
        let late = relative_influence(&m, 30).unwrap();
        let sum = |mat: &Matrix| mat.as_slice().iter().sum::<f64>();
        assert!(sum(&late) >= sum(&early));
        assert!(relative_influence(&m, 31).is_err());
    }
}
