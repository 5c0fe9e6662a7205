//! Predictors and outcomes bundled with their column metadata.

use mvtboost_core::{Matrix, MvtbError, Result, Summarizable};
use mvtboost_tree::{validate_predictors, FeatureKind};

/// Rows of predictors `X` (n x p) paired with continuous outcomes `Y` (n x Q).
///
/// Predictors may contain `NaN` for missing values; outcomes must be finite.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Matrix,
    y: Matrix,
    kinds: Vec<FeatureKind>,
    predictor_names: Vec<String>,
    outcome_names: Vec<String>,
}

impl Dataset {
    /// Pair predictors with outcomes. All predictors start out numeric.
    ///
    /// # Errors
    ///
    /// Returns [`MvtbError::ShapeMismatch`] if row counts differ and
    /// [`MvtbError::InvalidInput`] if there are no rows, no predictors, no
    /// outcomes, or a non-finite outcome.
    pub fn new(x: Matrix, y: Matrix) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(MvtbError::ShapeMismatch(format!(
                "predictor rows {} != outcome rows {}",
                x.nrows(),
                y.nrows()
            )));
        }
        if x.nrows() == 0 {
            return Err(MvtbError::InvalidInput("empty data".into()));
        }
        if x.ncols() == 0 {
            return Err(MvtbError::InvalidInput("need at least one predictor".into()));
        }
        if y.ncols() == 0 {
            return Err(MvtbError::InvalidInput("need at least one outcome".into()));
        }
        if let Some(pos) = y.as_slice().iter().position(|v| !v.is_finite()) {
            return Err(MvtbError::InvalidInput(format!(
                "non-finite outcome at row {}, column {}",
                pos / y.ncols(),
                pos % y.ncols()
            )));
        }
        let kinds = vec![FeatureKind::Numeric; x.ncols()];
        validate_predictors(&x, &kinds)?;
        let predictor_names = (0..x.ncols()).map(|j| format!("x{}", j + 1)).collect();
        let outcome_names = (0..y.ncols()).map(|j| format!("y{}", j + 1)).collect();
        Ok(Self {
            x,
            y,
            kinds,
            predictor_names,
            outcome_names,
        })
    }

    /// Declare the kind of each predictor column.
    pub fn with_feature_kinds(mut self, kinds: Vec<FeatureKind>) -> Result<Self> {
        validate_predictors(&self.x, &kinds)?;
        self.kinds = kinds;
        Ok(self)
    }

    pub fn with_predictor_names<S: Into<String>>(mut self, names: Vec<S>) -> Result<Self> {
        self.predictor_names = check_names(names, self.x.ncols(), "predictor")?;
        Ok(self)
    }

    pub fn with_outcome_names<S: Into<String>>(mut self, names: Vec<S>) -> Result<Self> {
        self.outcome_names = check_names(names, self.y.ncols(), "outcome")?;
        Ok(self)
    }

    pub fn x(&self) -> &Matrix {
        &self.x
    }

    pub fn y(&self) -> &Matrix {
        &self.y
    }

    pub fn feature_kinds(&self) -> &[FeatureKind] {
        &self.kinds
    }

    pub fn predictor_names(&self) -> &[String] {
        &self.predictor_names
    }

    pub fn outcome_names(&self) -> &[String] {
        &self.outcome_names
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_predictors(&self) -> usize {
        self.x.ncols()
    }

    pub fn n_outcomes(&self) -> usize {
        self.y.ncols()
    }
}

impl Summarizable for Dataset {
    fn summary(&self) -> String {
        format!(
            "Dataset: {} rows, {} predictors, {} outcomes",
            self.n_rows(),
            self.n_predictors(),
            self.n_outcomes()
        )
    }
}

fn check_names<S: Into<String>>(names: Vec<S>, expected: usize, what: &str) -> Result<Vec<String>> {
    if names.len() != expected {
        return Err(MvtbError::ShapeMismatch(format!(
            "{} {} names for {} columns",
            names.len(),
            what,
            expected
        )));
    }
    Ok(names.into_iter().map(Into::into).collect())
}
