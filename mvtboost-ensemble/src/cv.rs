//! K-fold cross-validation of the boosting loop.
//!
//! Training rows are shuffled with the configured seed and cut into `k`
//! contiguous folds. Every fold runs its own [`ResidualUpdateCoordinator`] on
//! the other `k - 1` folds and scores the held-out fold after each round. The
//! CV curve is the pointwise mean of the fold curves.
//!
//! Folds share the dataset read-only and own everything else, so with the
//! `parallel` feature they run on a rayon pool of `n_workers` threads. Any
//! fold failure aborts the run: the failing fold with the lowest index is
//! reported as [`MvtbError::FoldFailure`] and no partial curve is returned.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use mvtboost_core::{Matrix, MvtbError, Result, Summarizable};
use mvtboost_tree::FeatureKind;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::{BoostConfig, CovexAggregation};
use crate::coordinator::ResidualUpdateCoordinator;
use crate::covex::CovexAccumulator;
use crate::error_tracker::ErrorCurve;

/// RNG stream used to shuffle rows into folds. The full-data fit uses
/// stream 0 and fold `i` uses stream `i + 1`.
const SHUFFLE_STREAM: u64 = u64::MAX;

/// Cooperative cancellation flag shared between a caller and running folds.
///
/// Checked when a fold is about to start; a fold already running finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result for a single fold.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FoldResult {
    /// Fold number (0-indexed).
    pub fold: usize,
    /// Number of training samples.
    pub n_train: usize,
    /// Number of held-out samples.
    pub n_test: usize,
    /// Held-out error after each round.
    pub errors: ErrorCurve,
    /// Covex accumulated by the fold's own fit.
    pub covex: Matrix,
    pub n_degenerate: usize,
}

/// Aggregated cross-validation result.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CvReport {
    pub folds: Vec<FoldResult>,
    /// Mean held-out error across folds, one entry per round.
    pub curve: ErrorCurve,
}

impl CvReport {
    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Fold covex combined as requested; `None` for [`CovexAggregation::None`].
    pub fn aggregate_covex(&self, how: CovexAggregation) -> Result<Option<Matrix>> {
        let matrices: Vec<&Matrix> = self.folds.iter().map(|f| &f.covex).collect();
        match how {
            CovexAggregation::None => Ok(None),
            CovexAggregation::Sum => CovexAccumulator::sum_of(&matrices).map(Some),
            CovexAggregation::Mean => {
                let mut total = CovexAccumulator::sum_of(&matrices)?;
                total.scale(1.0 / matrices.len() as f64);
                Ok(Some(total))
            }
        }
    }
}

impl Summarizable for CvReport {
    fn summary(&self) -> String {
        let best = self.curve.best().map_or("-".to_string(), |b| b.to_string());
        format!(
            "CvReport: {} folds, {} rounds, best {}",
            self.folds.len(),
            self.curve.len(),
            best
        )
    }
}

/// Cross-validate the boosting loop over the rows of `x` / `y`.
///
/// # Errors
///
/// Returns [`MvtbError::InvalidConfiguration`] if `config.cv_folds` is below 2
/// or above the row count, [`MvtbError::InvalidInput`] if a fold would train
/// on fewer than two rows, and [`MvtbError::FoldFailure`] wrapping the first
/// failing fold's error.
pub fn cross_validate(
    x: &Matrix,
    y: &Matrix,
    kinds: &[FeatureKind],
    config: &BoostConfig,
    cancel: &CancelToken,
) -> Result<CvReport> {
    let n = x.nrows();
    let k = config.cv_folds;
    if k < 2 {
        return Err(MvtbError::InvalidConfiguration(
            "cv_folds must be at least 2".into(),
        ));
    }
    if k > n {
        return Err(MvtbError::InvalidConfiguration(format!(
            "cv_folds ({}) > training rows ({})",
            k, n
        )));
    }
    // the largest fold is n.div_ceil(k) rows
    if n - (n + k - 1) / k < 2 {
        return Err(MvtbError::InvalidInput(format!(
            "{} training rows leave fewer than 2 rows to fit some of {} folds",
            n, k
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    rng.set_stream(SHUFFLE_STREAM);
    indices.shuffle(&mut rng);
    let folds = build_folds(&indices, k);

    info!(folds = k, n_rows = n, n_trees = config.n_trees, "cross-validation started");
    let first_failed = AtomicUsize::new(usize::MAX);
    let run = |fold: usize| run_fold(x, y, kinds, config, &folds, fold, cancel, &first_failed);

    #[cfg(feature = "parallel")]
    let outcomes: Vec<Result<Option<FoldResult>>> = {
        use rayon::prelude::*;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_workers)
            .build()
            .map_err(|e| MvtbError::Other(format!("failed to build worker pool: {e}")))?;
        pool.install(|| (0..k).into_par_iter().map(run).collect())
    };
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<Result<Option<FoldResult>>> = (0..k).map(run).collect();

    let mut results = Vec::with_capacity(k);
    for (fold, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(Some(result)) => results.push(result),
            // skipped after a lower fold failed; that failure is reported
            Ok(None) => {}
            Err(e) => {
                warn!(fold, error = %e, "cross-validation aborted");
                return Err(e.in_fold(fold));
            }
        }
    }
    if results.len() != k {
        return Err(MvtbError::Other(format!(
            "only {} of {} folds completed",
            results.len(),
            k
        )));
    }

    let curves: Vec<ErrorCurve> = results.iter().map(|f| f.errors.clone()).collect();
    let curve = ErrorCurve::mean_of(&curves)?;
    info!(folds = k, best = curve.best(), "cross-validation finished");
    Ok(CvReport {
        folds: results,
        curve,
    })
}

/// Fit one fold. `Ok(None)` means the fold was skipped because a fold with a
/// lower index already failed. Folds are never skipped for a higher failing
/// fold, so the lowest failing fold always runs and is the one reported.
#[allow(clippy::too_many_arguments)]
fn run_fold(
    x: &Matrix,
    y: &Matrix,
    kinds: &[FeatureKind],
    config: &BoostConfig,
    folds: &[Vec<usize>],
    fold: usize,
    cancel: &CancelToken,
    first_failed: &AtomicUsize,
) -> Result<Option<FoldResult>> {
    if first_failed.load(Ordering::SeqCst) < fold {
        return Ok(None);
    }
    let result = if cancel.is_cancelled() {
        Err(MvtbError::Cancelled(format!("fold {fold} not started")))
    } else {
        fit_fold(x, y, kinds, config, folds, fold)
    };
    if result.is_err() {
        first_failed.fetch_min(fold, Ordering::SeqCst);
    }
    result.map(Some)
}

fn fit_fold(
    x: &Matrix,
    y: &Matrix,
    kinds: &[FeatureKind],
    config: &BoostConfig,
    folds: &[Vec<usize>],
    fold: usize,
) -> Result<FoldResult> {
    let test = &folds[fold];
    let train: Vec<usize> = folds
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != fold)
        .flat_map(|(_, v)| v.iter().copied())
        .collect();

    let x_train = x.select_rows(&train);
    let y_train = y.select_rows(&train);
    let x_test = x.select_rows(test);
    let y_test = y.select_rows(test);

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    rng.set_stream(fold as u64 + 1);
    let (coordinator, residuals) =
        ResidualUpdateCoordinator::start(&x_train, &y_train, kinds, config, rng)?;
    let run = coordinator
        .with_eval_set(&x_test, &y_test)?
        .run(residuals)?;
    let errors = run
        .eval_errors
        .ok_or_else(|| MvtbError::Other("fold produced no held-out errors".into()))?;

    debug!(
        fold,
        n_train = train.len(),
        n_test = test.len(),
        best = errors.best(),
        "fold finished"
    );
    Ok(FoldResult {
        fold,
        n_train: train.len(),
        n_test: test.len(),
        errors,
        covex: run.covex,
        n_degenerate: run.diagnostics.n_degenerate,
    })
}

/// Split indices into `k` contiguous folds whose sizes differ by at most one.
fn build_folds(indices: &[usize], k: usize) -> Vec<Vec<usize>> {
    let n = indices.len();
    let base_size = n / k;
    let remainder = n % k;

    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base_size + usize::from(i < remainder);
        folds.push(indices[start..start + size].to_vec());
        start += size;
    }
    folds
}
