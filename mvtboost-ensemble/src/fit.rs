//! The fit call: validation, train/test split, optional CV, full-data fit.

use mvtboost_core::{MvtbError, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::{validate_config, BoostConfig};
use crate::coordinator::ResidualUpdateCoordinator;
use crate::cv::{cross_validate, CancelToken};
use crate::dataset::Dataset;
use crate::error_tracker::ErrorTracker;
use crate::model::FittedModel;

/// Fit a joint boosting model to every outcome of `dataset`.
///
/// The first `floor(n * train_fraction)` rows train the model and the rest
/// are scored as a test set after every round. With `cv_folds >= 2` the
/// training rows are cross-validated first; the reported covex always comes
/// from the fit on all training rows.
///
/// # Errors
///
/// Configuration errors are returned before any fitting starts. Fold errors
/// abort the fit as [`MvtbError::FoldFailure`].
pub fn fit(dataset: &Dataset, config: &BoostConfig) -> Result<FittedModel> {
    fit_with_cancel(dataset, config, &CancelToken::new())
}

/// [`fit`] with a token that can stop cross-validation folds from starting.
pub fn fit_with_cancel(
    dataset: &Dataset,
    config: &BoostConfig,
    cancel: &CancelToken,
) -> Result<FittedModel> {
    validate_config(config)?;
    let n = dataset.n_rows();
    let (n_train, n_test) = split_sizes(n, config.train_fraction)?;
    if config.cv_enabled() && config.cv_folds > n_train {
        return Err(MvtbError::InvalidConfiguration(format!(
            "cv_folds ({}) > training rows ({})",
            config.cv_folds, n_train
        )));
    }

    info!(
        n_rows = n,
        n_train,
        n_test,
        n_predictors = dataset.n_predictors(),
        n_outcomes = dataset.n_outcomes(),
        n_trees = config.n_trees,
        cv_folds = config.cv_folds,
        "fit started"
    );

    let train_rows: Vec<usize> = (0..n_train).collect();
    let test_rows: Vec<usize> = (n_train..n).collect();
    let x_train = dataset.x().select_rows(&train_rows);
    let y_train = dataset.y().select_rows(&train_rows);
    let kinds = dataset.feature_kinds();

    let cv = if config.cv_enabled() {
        Some(cross_validate(&x_train, &y_train, kinds, config, cancel)?)
    } else {
        None
    };
    if cancel.is_cancelled() {
        return Err(MvtbError::Cancelled("full-data fit not started".into()));
    }

    let rng = ChaCha8Rng::seed_from_u64(config.seed);
    let (coordinator, residuals) =
        ResidualUpdateCoordinator::start(&x_train, &y_train, kinds, config, rng)?;
    let x_test = dataset.x().select_rows(&test_rows);
    let y_test = dataset.y().select_rows(&test_rows);
    let coordinator = if n_test > 0 {
        coordinator.with_eval_set(&x_test, &y_test)?
    } else {
        coordinator
    };
    let run = coordinator.run(residuals)?;

    let errors = ErrorTracker::new(
        run.train_errors,
        run.eval_errors,
        cv.as_ref().map(|r| r.curve.clone()),
    )?;
    let best = errors.best_iterations();
    let fold_covex = match &cv {
        Some(report) => report.aggregate_covex(config.covex_fold_aggregation)?,
        None => None,
    };

    info!(
        best = best.combined,
        source = %best.combined_source,
        n_degenerate = run.diagnostics.n_degenerate,
        "fit finished"
    );

    Ok(FittedModel {
        config: config.clone(),
        feature_kinds: kinds.to_vec(),
        predictor_names: dataset.predictor_names().to_vec(),
        outcome_names: dataset.outcome_names().to_vec(),
        ensembles: run.ensembles,
        covex: run.covex,
        fold_covex,
        errors,
        best,
        diagnostics: run.diagnostics,
        rounds: run.rounds,
        cv,
        n_train,
        n_test,
    })
}

/// Training and test row counts for `n` rows.
fn split_sizes(n: usize, train_fraction: f64) -> Result<(usize, usize)> {
    let n_train = if train_fraction >= 1.0 {
        n
    } else {
        (n as f64 * train_fraction).floor() as usize
    };
    if n_train < 2 {
        return Err(MvtbError::InvalidInput(format!(
            "train_fraction {} of {} rows leaves {} training rows, need 2",
            train_fraction, n, n_train
        )));
    }
    let n_test = n - n_train;
    if train_fraction < 1.0 && n_test == 0 {
        return Err(MvtbError::InvalidInput(format!(
            "train_fraction {} of {} rows leaves no test rows",
            train_fraction, n
        )));
    }
    Ok((n_train, n_test))
}
