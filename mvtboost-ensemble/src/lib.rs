//! Joint multivariate tree boosting with covariance-explained attribution.
//!
//! Several continuous outcomes are boosted together: every round fits one
//! shallow regression tree to one outcome's residual, visiting outcomes
//! round-robin, so ensemble size and learning rate are shared across them.
//!
//! - **Fitting** — [`fit`] validates a [`BoostConfig`], splits off test rows,
//!   optionally cross-validates ([`cross_validate`]) and runs the
//!   [`ResidualUpdateCoordinator`] over all training rows
//! - **Covariance explained** — the squared change in residual covariance of
//!   every outcome pair per round, credited to the round's most influential
//!   predictor ([`CovexAccumulator`])
//! - **Model selection** — train, test and CV error curves with a fixed
//!   precedence for the combined best iteration ([`ErrorTracker`])
//! - **Prediction** — [`PredictionEngine`] returns `rows x outcomes x counts`
//!   arrays for any set of iteration counts
//! - **Interpretation** — relative influence and covex summaries
//!   ([`summarize`]), hierarchical clustering of covex ([`cluster_covex`]) and
//!   pairwise interaction scores ([`detect_interactions`])
//!
//! # Example
//!
//! ```
//! use mvtboost_core::Matrix;
//! use mvtboost_ensemble::{fit, predict, BoostConfig, Dataset};
//!
//! let xs: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
//! let ys: Vec<Vec<f64>> = xs.iter().map(|r| vec![r[0], r[1] * 2.0]).collect();
//! let xr: Vec<&[f64]> = xs.iter().map(|r| r.as_slice()).collect();
//! let yr: Vec<&[f64]> = ys.iter().map(|r| r.as_slice()).collect();
//! let x = Matrix::from_rows(&xr).unwrap();
//! let data = Dataset::new(x.clone(), Matrix::from_rows(&yr).unwrap()).unwrap();
//!
//! let config = BoostConfig { n_trees: 10, shrinkage: 0.1, min_leaf_size: 2, ..Default::default() };
//! let model = fit(&data, &config).unwrap();
//! let preds = predict(&model, &x, vec![5usize, 10]).unwrap();
//! assert_eq!(preds.shape(), &[40, 2, 2]);
//! ```

pub mod clustering;
pub mod config;
pub mod coordinator;
pub mod covex;
pub mod cv;
pub mod dataset;
pub mod error_tracker;
pub mod fit;
pub mod fitter;
pub mod interaction;
pub mod model;
pub mod predict;
pub mod summary;

pub use clustering::{cluster_covex, ClusterConfig, CovexClustering};
pub use config::{validate_config, BoostConfig, CovexAggregation};
pub use coordinator::{
    BoostRun, CoordinatorState, DegenerateRound, FitDiagnostics, ResidualUpdateCoordinator,
    RoundRecord,
};
pub use covex::{column_percent, covariance_delta_sq, pair_labels, CovexAccumulator};
pub use cv::{cross_validate, CancelToken, CvReport, FoldResult};
pub use dataset::Dataset;
pub use error_tracker::{BestIterations, ErrorCurve, ErrorSource, ErrorTracker};
pub use fit::{fit, fit_with_cancel};
pub use fitter::{EnsembleTree, OutcomeEnsemble, TreeEnsembleFitter, TreeFit};
pub use interaction::{detect_interactions, partial_dependence, InteractionScore};
pub use model::FittedModel;
pub use predict::{predict, IterationRequest, PredictionEngine};
pub use summary::{relative_influence, summarize, summarize_at, ModelSummary};
