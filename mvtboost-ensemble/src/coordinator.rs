//! The joint boosting loop over all outcomes.
//!
//! Rounds visit outcomes round-robin. Each round fits one tree to the chosen
//! outcome's residual column, subtracts the shrunken fit, and hands the
//! residual covariance before and after the update to the covex accumulator.
//! The residual matrix is moved into [`ResidualUpdateCoordinator::round`] and
//! moved back out, so a coordinator never shares mutable state with anything
//! else and independent coordinators can run on separate threads.

use mvtboost_core::{Matrix, MvtbError, Result};
use mvtboost_tree::{bag_rows, FeatureKind};
use rand_chacha::ChaCha8Rng;
use tracing::{trace, warn};

use crate::config::BoostConfig;
use crate::covex::CovexAccumulator;
use crate::error_tracker::ErrorCurve;
use crate::fitter::{EnsembleTree, OutcomeEnsemble, TreeEnsembleFitter};

/// Where the coordinator is in its round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Created; no round fitted yet.
    Idle,
    /// A tree for `outcome` is being fitted.
    Fitting { outcome: usize },
    /// `outcome`'s residual column has just been updated.
    Updated { outcome: usize },
    /// All rounds are done.
    Terminal,
}

/// Everything observed in one round.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoundRecord {
    pub round: usize,
    pub outcome: usize,
    pub predictor: usize,
    pub improvement: f64,
    pub degenerate: bool,
    /// Squared covariance change in canonical outcome-pair order.
    pub delta_sq: Vec<f64>,
}

/// A round whose tree collapsed to a single leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DegenerateRound {
    pub round: usize,
    pub outcome: usize,
}

/// Non-fatal conditions met while fitting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitDiagnostics {
    pub n_degenerate: usize,
    pub degenerate_rounds: Vec<DegenerateRound>,
}

impl FitDiagnostics {
    fn record(&mut self, round: usize, outcome: usize) {
        self.n_degenerate += 1;
        self.degenerate_rounds.push(DegenerateRound { round, outcome });
    }
}

/// Output of a finished coordinator.
#[derive(Debug, Clone)]
pub struct BoostRun {
    pub ensembles: Vec<OutcomeEnsemble>,
    pub covex: Matrix,
    pub train_errors: ErrorCurve,
    /// Errors on the evaluation rows, when any were attached.
    pub eval_errors: Option<ErrorCurve>,
    /// Training residuals after the last round.
    pub residuals: Matrix,
    pub diagnostics: FitDiagnostics,
    /// Per-round records; empty unless round details were requested.
    pub rounds: Vec<RoundRecord>,
}

/// Held-out rows scored after every round.
#[derive(Debug)]
struct EvalSet<'a> {
    x: &'a Matrix,
    y: &'a Matrix,
    predictions: Matrix,
    mse: Vec<f64>,
}

/// Drives boosting rounds over the training rows of one fit (or one CV fold).
#[derive(Debug)]
pub struct ResidualUpdateCoordinator<'a> {
    fitter: TreeEnsembleFitter<'a>,
    config: &'a BoostConfig,
    rng: ChaCha8Rng,
    eval: Option<EvalSet<'a>>,
    state: CoordinatorState,
    round: usize,
    ensembles: Vec<OutcomeEnsemble>,
    accumulator: CovexAccumulator,
    covariance: Matrix,
    train_mse: Vec<f64>,
    train_errors: ErrorCurve,
    eval_errors: Option<ErrorCurve>,
    diagnostics: FitDiagnostics,
    rounds: Vec<RoundRecord>,
}

impl<'a> ResidualUpdateCoordinator<'a> {
    /// Set up a coordinator on training rows `x` / `y` and return it with the
    /// initial residuals (`y` minus per-outcome training means).
    ///
    /// # Errors
    ///
    /// Returns [`MvtbError::ShapeMismatch`] if `x` and `y` disagree and
    /// [`MvtbError::InvalidInput`] for fewer than two rows.
    pub fn start(
        x: &'a Matrix,
        y: &Matrix,
        kinds: &'a [FeatureKind],
        config: &'a BoostConfig,
        rng: ChaCha8Rng,
    ) -> Result<(Self, Matrix)> {
        if x.nrows() != y.nrows() {
            return Err(MvtbError::ShapeMismatch(format!(
                "predictor rows {} != outcome rows {}",
                x.nrows(),
                y.nrows()
            )));
        }
        if y.ncols() == 0 {
            return Err(MvtbError::InvalidInput("need at least one outcome".into()));
        }
        let fitter = TreeEnsembleFitter::new(x, kinds, config.tree_config())?;

        let intercepts = y.column_means();
        let mut residuals = y.clone();
        for row_idx in 0..residuals.nrows() {
            for (r, m) in residuals.row_mut(row_idx).iter_mut().zip(&intercepts) {
                *r -= m;
            }
        }
        let covariance = residuals.covariance()?;
        let train_mse = (0..y.ncols())
            .map(|q| mean_square(&residuals.column(q)))
            .collect();
        let ensembles = intercepts
            .iter()
            .enumerate()
            .map(|(q, &m)| OutcomeEnsemble::new(q, m))
            .collect();

        let coordinator = Self {
            fitter,
            config,
            rng,
            eval: None,
            state: CoordinatorState::Idle,
            round: 0,
            ensembles,
            accumulator: CovexAccumulator::new(x.ncols(), y.ncols()),
            covariance,
            train_mse,
            train_errors: ErrorCurve::new(y.ncols()),
            eval_errors: None,
            diagnostics: FitDiagnostics::default(),
            rounds: Vec::new(),
        };
        Ok((coordinator, residuals))
    }

    /// Score `x` / `y` after every round. Must be called before the first round.
    pub fn with_eval_set(mut self, x: &'a Matrix, y: &'a Matrix) -> Result<Self> {
        if self.state != CoordinatorState::Idle {
            return Err(MvtbError::Other("evaluation rows attached after fitting started".into()));
        }
        if x.nrows() != y.nrows() || y.ncols() != self.ensembles.len() {
            return Err(MvtbError::ShapeMismatch(format!(
                "evaluation set {}x{} predictors with {}x{} outcomes, expected {} outcomes",
                x.nrows(),
                x.ncols(),
                y.nrows(),
                y.ncols(),
                self.ensembles.len()
            )));
        }
        let mut predictions = Matrix::zeros(y.nrows(), y.ncols());
        for row_idx in 0..y.nrows() {
            for (p, e) in predictions.row_mut(row_idx).iter_mut().zip(&self.ensembles) {
                *p = e.intercept;
            }
        }
        let mse = (0..y.ncols())
            .map(|q| column_mse(y, &predictions, q))
            .collect();
        self.eval_errors = Some(ErrorCurve::new(y.ncols()));
        self.eval = Some(EvalSet {
            x,
            y,
            predictions,
            mse,
        });
        Ok(self)
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Rounds completed so far.
    pub fn rounds_done(&self) -> usize {
        self.round
    }

    pub fn is_terminal(&self) -> bool {
        self.state == CoordinatorState::Terminal
    }

    /// Run one boosting round and return the updated residuals.
    pub fn round(&mut self, mut residuals: Matrix) -> Result<Matrix> {
        if self.is_terminal() {
            return Err(MvtbError::Other(format!(
                "all {} rounds already fitted",
                self.config.n_trees
            )));
        }
        if residuals.shape() != (self.fitter.n_rows(), self.ensembles.len()) {
            return Err(MvtbError::ShapeMismatch(format!(
                "residuals {:?}, expected ({}, {})",
                residuals.shape(),
                self.fitter.n_rows(),
                self.ensembles.len()
            )));
        }
        let round = self.round;
        let outcome = round % self.ensembles.len();
        self.state = CoordinatorState::Fitting { outcome };

        let sample = bag_rows(&mut self.rng, self.fitter.n_rows(), self.config.bag_fraction);
        let mut column = residuals.column(outcome);
        let fit = self.fitter.fit(&column, &sample)?;

        let shrinkage = self.config.shrinkage;
        for (r, f) in column.iter_mut().zip(&fit.fitted) {
            *r -= shrinkage * f;
        }
        residuals.set_column(outcome, &column)?;
        self.state = CoordinatorState::Updated { outcome };

        let after = residuals.covariance()?;
        let delta_sq = self
            .accumulator
            .accumulate(&self.covariance, &after, fit.predictor)?;
        self.covariance = after;

        self.train_mse[outcome] = mean_square(&column);
        self.train_errors.push(&self.train_mse)?;
        if let (Some(eval), Some(curve)) = (self.eval.as_mut(), self.eval_errors.as_mut()) {
            for row_idx in 0..eval.x.nrows() {
                let step = shrinkage * fit.tree.predict(eval.x.row(row_idx));
                eval.predictions.row_mut(row_idx)[outcome] += step;
            }
            eval.mse[outcome] = column_mse(eval.y, &eval.predictions, outcome);
            curve.push(&eval.mse)?;
        }

        if fit.degenerate {
            warn!(round, outcome, "degenerate tree: residual constant over the sample");
            self.diagnostics.record(round, outcome);
        }
        trace!(
            round,
            outcome,
            predictor = fit.predictor,
            improvement = fit.improvement,
            train_mse = self.train_mse[outcome],
            "boosting round"
        );
        if self.config.keep_round_details {
            self.rounds.push(RoundRecord {
                round,
                outcome,
                predictor: fit.predictor,
                improvement: fit.improvement,
                degenerate: fit.degenerate,
                delta_sq,
            });
        }
        self.ensembles[outcome].trees.push(EnsembleTree {
            round,
            tree: fit.tree,
            predictor: fit.predictor,
            improvement: fit.improvement,
        });

        self.round += 1;
        if self.round == self.config.n_trees {
            self.state = CoordinatorState::Terminal;
        }
        Ok(residuals)
    }

    /// Run the remaining rounds and collect the results.
    pub fn run(mut self, mut residuals: Matrix) -> Result<BoostRun> {
        while !self.is_terminal() {
            residuals = self.round(residuals)?;
        }
        self.finish(residuals)
    }

    /// Collect the results of a terminal coordinator.
    pub fn finish(self, residuals: Matrix) -> Result<BoostRun> {
        if !self.is_terminal() {
            return Err(MvtbError::Other(format!(
                "finished after {} of {} rounds",
                self.round, self.config.n_trees
            )));
        }
        Ok(BoostRun {
            ensembles: self.ensembles,
            covex: self.accumulator.into_matrix(),
            train_errors: self.train_errors,
            eval_errors: self.eval_errors,
            residuals,
            diagnostics: self.diagnostics,
            rounds: self.rounds,
        })
    }
}

fn mean_square(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64
}

fn column_mse(y: &Matrix, predictions: &Matrix, q: usize) -> f64 {
    let n = y.nrows();
    if n == 0 {
        return 0.0;
    }
    (0..n)
        .map(|i| (y.get(i, q) - predictions.get(i, q)).powi(2))
        .sum::<f64>()
        / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn data(n: usize) -> (Matrix, Matrix) {
        let xs: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64, ((i * 3) % 4) as f64])
            .collect();
        let ys: Vec<Vec<f64>> = xs
            .iter()
            .map(|r| vec![2.0 * r[0] + r[1], r[0] - 3.0 * r[2]])
            .collect();
        let xr: Vec<&[f64]> = xs.iter().map(|r| r.as_slice()).collect();
        let yr: Vec<&[f64]> = ys.iter().map(|r| r.as_slice()).collect();
        (Matrix::from_rows(&xr).unwrap(), Matrix::from_rows(&yr).unwrap())
    }

    fn config(n_trees: usize) -> BoostConfig {
        BoostConfig {
            n_trees,
            shrinkage: 0.1,
            min_leaf_size: 3,
            keep_round_details: true,
            ..Default::default()
        }
    }

    #[test]
    fn state_machine_walks_round_robin() {
        let (x, y) = data(30);
        let kinds = vec![FeatureKind::Numeric; 3];
        let cfg = config(3);
        let rng = ChaCha8Rng::seed_from_u64(1);
        let (mut coord, mut res) = ResidualUpdateCoordinator::start(&x, &y, &kinds, &cfg, rng).unwrap();
        assert_eq!(coord.state(), CoordinatorState::Idle);
        res = coord.round(res).unwrap();
        assert_eq!(coord.state(), CoordinatorState::Updated { outcome: 0 });
        res = coord.round(res).unwrap();
        assert_eq!(coord.state(), CoordinatorState::Updated { outcome: 1 });
        res = coord.round(res).unwrap();
        assert_eq!(coord.state(), CoordinatorState::Terminal);
        assert!(coord.round(res.clone()).is_err());

        let run = coord.finish(res).unwrap();
        assert_eq!(run.ensembles[0].n_trees(), 2);
        assert_eq!(run.ensembles[1].n_trees(), 1);
        let outcomes: Vec<usize> = run.rounds.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![0, 1, 0]);
    }

    #[test]
    fn residual_update_matches_fitted_trees() {
        let (x, y) = data(40);
        let kinds = vec![FeatureKind::Numeric; 3];
        let cfg = config(8);
        let rng = ChaCha8Rng::seed_from_u64(1);
        let (coord, res) = ResidualUpdateCoordinator::start(&x, &y, &kinds, &cfg, rng).unwrap();
        let run = coord.run(res).unwrap();
        for (q, ens) in run.ensembles.iter().enumerate() {
            for i in 0..x.nrows() {
                let pred = ens.predict_row(x.row(i), cfg.shrinkage, cfg.n_trees);
                assert!((y.get(i, q) - pred - run.residuals.get(i, q)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn covex_replays_from_round_records() {
        let (x, y) = data(40);
        let kinds = vec![FeatureKind::Numeric; 3];
        let cfg = config(12);
        let rng = ChaCha8Rng::seed_from_u64(9);
        let (coord, res) = ResidualUpdateCoordinator::start(&x, &y, &kinds, &cfg, rng).unwrap();
        let run = coord.run(res).unwrap();
        assert_eq!(run.rounds.len(), 12);
        let replayed = CovexAccumulator::replay(3, 2, &run.rounds).unwrap();
        for (a, b) in replayed.matrix().as_slice().iter().zip(run.covex.as_slice()) {
            assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
        }
    }

    #[test]
    fn eval_set_tracks_held_out_error() {
        let (x, y) = data(40);
        let (xe, ye) = data(10);
        let kinds = vec![FeatureKind::Numeric; 3];
        let cfg = config(6);
        let rng = ChaCha8Rng::seed_from_u64(3);
        let (coord, res) = ResidualUpdateCoordinator::start(&x, &y, &kinds, &cfg, rng).unwrap();
        let coord = coord.with_eval_set(&xe, &ye).unwrap();
        let run = coord.run(res).unwrap();
        let eval = run.eval_errors.unwrap();
        assert_eq!(eval.len(), 6);
        assert_eq!(run.train_errors.len(), 6);
    }

    #[test]
    fn constant_outcome_counts_degenerate_rounds() {
        let (x, y) = data(30);
        let mut y = y;
        for i in 0..30 {
            y.set(i, 1, 4.0);
        }
        let kinds = vec![FeatureKind::Numeric; 3];
        let cfg = config(6);
        let rng = ChaCha8Rng::seed_from_u64(3);
        let (coord, res) = ResidualUpdateCoordinator::start(&x, &y, &kinds, &cfg, rng).unwrap();
        let run = coord.run(res).unwrap();
        assert_eq!(run.diagnostics.n_degenerate, 3);
        assert!(run.diagnostics.degenerate_rounds.iter().all(|d| d.outcome == 1));
        assert_eq!(run.ensembles[1].n_trees(), 3);
    }

    #[test]
    fn too_few_rows_rejected() {
        let (x, y) = data(1);
        let kinds = vec![FeatureKind::Numeric; 3];
        let cfg = config(2);
        let rng = ChaCha8Rng::seed_from_u64(3);
        assert!(ResidualUpdateCoordinator::start(&x, &y, &kinds, &cfg, rng).is_err());
    }
}
