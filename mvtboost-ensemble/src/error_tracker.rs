//! Error curves and best-iteration selection.
//!
//! Each curve holds one mean squared error per outcome per boosting round,
//! plus an overall value that is the sum of the per-outcome errors. Index `r`
//! of a curve is the error after `r + 1` rounds; best iterations are reported
//! 1-based.

use std::fmt;

use mvtboost_core::{MvtbError, Result};

/// Per-round errors for every outcome and their sum.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorCurve {
    per_outcome: Vec<Vec<f64>>,
    overall: Vec<f64>,
}

impl ErrorCurve {
    pub fn new(n_outcomes: usize) -> Self {
        Self {
            per_outcome: vec![Vec::new(); n_outcomes],
            overall: Vec::new(),
        }
    }

    /// Append the errors observed after one more round.
    pub fn push(&mut self, errors: &[f64]) -> Result<()> {
        if errors.len() != self.per_outcome.len() {
            return Err(MvtbError::ShapeMismatch(format!(
                "{} errors for {} outcomes",
                errors.len(),
                self.per_outcome.len()
            )));
        }
        for (curve, &e) in self.per_outcome.iter_mut().zip(errors) {
            curve.push(e);
        }
        self.overall.push(errors.iter().sum());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.overall.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overall.is_empty()
    }

    pub fn n_outcomes(&self) -> usize {
        self.per_outcome.len()
    }

    pub fn overall(&self) -> &[f64] {
        &self.overall
    }

    pub fn outcome(&self, q: usize) -> Option<&[f64]> {
        self.per_outcome.get(q).map(Vec::as_slice)
    }

    /// 1-based iteration count minimizing the overall curve.
    pub fn best(&self) -> Option<usize> {
        argmin(&self.overall)
    }

    pub fn best_for_outcome(&self, q: usize) -> Option<usize> {
        self.per_outcome.get(q).and_then(|c| argmin(c))
    }

    /// Pointwise mean of curves of equal length and outcome count.
    pub fn mean_of(curves: &[ErrorCurve]) -> Result<ErrorCurve> {
        let first = curves
            .first()
            .ok_or_else(|| MvtbError::InvalidInput("no curves to average".into()))?;
        let (len, q) = (first.len(), first.n_outcomes());
        if let Some(bad) = curves.iter().find(|c| c.len() != len || c.n_outcomes() != q) {
            return Err(MvtbError::ShapeMismatch(format!(
                "curve of length {} over {} outcomes, expected {} over {}",
                bad.len(),
                bad.n_outcomes(),
                len,
                q
            )));
        }
        let k = curves.len() as f64;
        let mut mean = ErrorCurve::new(q);
        for r in 0..len {
            let errors: Vec<f64> = (0..q)
                .map(|o| curves.iter().map(|c| c.per_outcome[o][r]).sum::<f64>() / k)
                .collect();
            mean.push(&errors)?;
        }
        Ok(mean)
    }
}

/// First index of the smallest value, 1-based. `NaN` never wins.
fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v < b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i + 1)
}

/// Where an error curve was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSource {
    /// Held-out test rows.
    Test,
    /// Mean over cross-validation folds.
    Cv,
    /// Training rows.
    Train,
}

impl ErrorSource {
    /// Model-selection precedence, most preferred first.
    pub const PRECEDENCE: [ErrorSource; 3] = [ErrorSource::Test, ErrorSource::Cv, ErrorSource::Train];

    pub fn name(&self) -> &'static str {
        match self {
            ErrorSource::Test => "test",
            ErrorSource::Cv => "cv",
            ErrorSource::Train => "train",
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Best iteration counts per source and the combined choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BestIterations {
    pub train: usize,
    pub test: Option<usize>,
    pub cv: Option<usize>,
    /// Best count of the first available source in [`ErrorSource::PRECEDENCE`].
    pub combined: usize,
    pub combined_source: ErrorSource,
}

/// Training, test and CV curves of one fit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorTracker {
    train: ErrorCurve,
    test: Option<ErrorCurve>,
    cv: Option<ErrorCurve>,
}

impl ErrorTracker {
    /// Bundle finished curves. All present curves must have the same length.
    pub fn new(train: ErrorCurve, test: Option<ErrorCurve>, cv: Option<ErrorCurve>) -> Result<Self> {
        if train.is_empty() {
            return Err(MvtbError::InvalidInput("empty training error curve".into()));
        }
        for (source, curve) in [(ErrorSource::Test, &test), (ErrorSource::Cv, &cv)] {
            if let Some(c) = curve {
                if c.len() != train.len() {
                    return Err(MvtbError::ShapeMismatch(format!(
                        "{} curve has {} rounds, training curve {}",
                        source,
                        c.len(),
                        train.len()
                    )));
                }
            }
        }
        Ok(Self { train, test, cv })
    }

    pub fn curve(&self, source: ErrorSource) -> Option<&ErrorCurve> {
        match source {
            ErrorSource::Train => Some(&self.train),
            ErrorSource::Test => self.test.as_ref(),
            ErrorSource::Cv => self.cv.as_ref(),
        }
    }

    pub fn train(&self) -> &ErrorCurve {
        &self.train
    }

    pub fn n_rounds(&self) -> usize {
        self.train.len()
    }

    pub fn best(&self, source: ErrorSource) -> Option<usize> {
        self.curve(source).and_then(ErrorCurve::best)
    }

    /// Best count of the most preferred available source, with that source.
    pub fn best_overall(&self) -> (usize, ErrorSource) {
        ErrorSource::PRECEDENCE
            .into_iter()
            .find_map(|s| self.best(s).map(|b| (b, s)))
            // an all-NaN training curve still selects the full ensemble
            .unwrap_or((self.n_rounds(), ErrorSource::Train))
    }

    /// Per-outcome best counts for the most preferred available source.
    pub fn best_per_outcome(&self) -> Vec<usize> {
        let (_, source) = self.best_overall();
        let curve = self.curve(source).unwrap_or(&self.train);
        (0..curve.n_outcomes())
            .map(|q| curve.best_for_outcome(q).unwrap_or(self.n_rounds()))
            .collect()
    }

    pub fn best_iterations(&self) -> BestIterations {
        let (combined, combined_source) = self.best_overall();
        BestIterations {
            train: self.best(ErrorSource::Train).unwrap_or(self.n_rounds()),
            test: self.best(ErrorSource::Test),
            cv: self.best(ErrorSource::Cv),
            combined,
            combined_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(rows: &[[f64; 2]]) -> ErrorCurve {
        let mut c = ErrorCurve::new(2);
        for r in rows {
            c.push(r).unwrap();
        }
        c
    }

    #[test]
    fn overall_is_sum_of_outcomes() {
        let c = curve(&[[1.0, 2.0], [0.5, 1.0]]);
        assert_eq!(c.overall(), &[3.0, 1.5]);
        assert_eq!(c.outcome(1), Some(&[2.0, 1.0][..]));
        assert_eq!(c.outcome(2), None);
    }

    #[test]
    fn best_ties_take_smallest_count() {
        let c = curve(&[[3.0, 0.0], [1.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        assert_eq!(c.best(), Some(2));
        assert_eq!(c.best_for_outcome(1), Some(1));
        assert_eq!(ErrorCurve::new(2).best(), None);
    }

    #[test]
    fn push_checks_outcome_count() {
        let mut c = ErrorCurve::new(2);
        assert!(c.push(&[1.0]).is_err());
    }

    #[test]
    fn mean_of_folds() {
        let a = curve(&[[1.0, 1.0], [0.0, 0.0]]);
        let b = curve(&[[3.0, 1.0], [2.0, 0.0]]);
        let m = ErrorCurve::mean_of(&[a, b.clone()]).unwrap();
        assert_eq!(m.overall(), &[3.0, 1.0]);
        assert!(ErrorCurve::mean_of(&[b, curve(&[[1.0, 1.0]])]).is_err());
    }

    #[test]
    fn precedence_test_then_cv_then_train() {
        let train = curve(&[[3.0, 0.0], [2.0, 0.0], [1.0, 0.0]]);
        let test = curve(&[[3.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        let cv = curve(&[[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);

        let only_train = ErrorTracker::new(train.clone(), None, None).unwrap();
        assert_eq!(only_train.best_overall(), (3, ErrorSource::Train));

        let with_cv = ErrorTracker::new(train.clone(), None, Some(cv.clone())).unwrap();
        assert_eq!(with_cv.best_overall(), (1, ErrorSource::Cv));

        let all = ErrorTracker::new(train, Some(test), Some(cv)).unwrap();
        let best = all.best_iterations();
        assert_eq!(best.combined, 2);
        assert_eq!(best.combined_source, ErrorSource::Test);
        assert_eq!(best.train, 3);
        assert_eq!(best.cv, Some(1));
    }

    #[test]
    fn curve_lengths_must_agree() {
        let train = curve(&[[1.0, 0.0], [0.5, 0.0]]);
        let test = curve(&[[1.0, 0.0]]);
        assert!(ErrorTracker::new(train, Some(test), None).is_err());
    }
}
