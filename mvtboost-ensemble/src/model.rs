//! The immutable result of a fit.

use mvtboost_core::{Matrix, Summarizable};
use mvtboost_tree::FeatureKind;

use crate::config::BoostConfig;
use crate::coordinator::{FitDiagnostics, RoundRecord};
use crate::cv::CvReport;
use crate::error_tracker::{BestIterations, ErrorTracker};
use crate::fitter::OutcomeEnsemble;

/// A fitted multivariate boosting model.
///
/// Built once by [`fit`](crate::fit) and read-only afterwards; consumed by
/// the prediction engine, the covex clusterer and summary reporting.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FittedModel {
    pub(crate) config: BoostConfig,
    pub(crate) feature_kinds: Vec<FeatureKind>,
    pub(crate) predictor_names: Vec<String>,
    pub(crate) outcome_names: Vec<String>,
    pub(crate) ensembles: Vec<OutcomeEnsemble>,
    pub(crate) covex: Matrix,
    pub(crate) fold_covex: Option<Matrix>,
    pub(crate) errors: ErrorTracker,
    pub(crate) best: BestIterations,
    pub(crate) diagnostics: FitDiagnostics,
    pub(crate) rounds: Vec<RoundRecord>,
    pub(crate) cv: Option<CvReport>,
    pub(crate) n_train: usize,
    pub(crate) n_test: usize,
}

impl FittedModel {
    pub fn config(&self) -> &BoostConfig {
        &self.config
    }

    /// Total boosting rounds N.
    pub fn n_trees(&self) -> usize {
        self.config.n_trees
    }

    pub fn shrinkage(&self) -> f64 {
        self.config.shrinkage
    }

    pub fn bag_fraction(&self) -> f64 {
        self.config.bag_fraction
    }

    pub fn n_predictors(&self) -> usize {
        self.feature_kinds.len()
    }

    pub fn n_outcomes(&self) -> usize {
        self.ensembles.len()
    }

    pub fn feature_kinds(&self) -> &[FeatureKind] {
        &self.feature_kinds
    }

    pub fn predictor_names(&self) -> &[String] {
        &self.predictor_names
    }

    pub fn outcome_names(&self) -> &[String] {
        &self.outcome_names
    }

    pub fn ensembles(&self) -> &[OutcomeEnsemble] {
        &self.ensembles
    }

    pub fn ensemble(&self, outcome: usize) -> Option<&OutcomeEnsemble> {
        self.ensembles.get(outcome)
    }

    /// Covex of the full-data fit: predictors x canonical outcome pairs.
    pub fn covex(&self) -> &Matrix {
        &self.covex
    }

    /// Fold covex aggregated per [`BoostConfig::covex_fold_aggregation`].
    pub fn fold_covex(&self) -> Option<&Matrix> {
        self.fold_covex.as_ref()
    }

    pub fn errors(&self) -> &ErrorTracker {
        &self.errors
    }

    pub fn best_iterations(&self) -> &BestIterations {
        &self.best
    }

    /// Iteration count used when a prediction asks for the best one.
    pub fn best_iteration(&self) -> usize {
        self.best.combined
    }

    pub fn diagnostics(&self) -> &FitDiagnostics {
        &self.diagnostics
    }

    /// Per-round records; empty unless `keep_round_details` was set.
    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn cv_report(&self) -> Option<&CvReport> {
        self.cv.as_ref()
    }

    pub fn n_train(&self) -> usize {
        self.n_train
    }

    pub fn n_test(&self) -> usize {
        self.n_test
    }
}

impl Summarizable for FittedModel {
    fn summary(&self) -> String {
        format!(
            "FittedModel: {} outcomes, {} predictors, {} trees, best {} ({}), {} degenerate",
            self.n_outcomes(),
            self.n_predictors(),
            self.n_trees(),
            self.best.combined,
            self.best.combined_source,
            self.diagnostics.n_degenerate
        )
    }
}
