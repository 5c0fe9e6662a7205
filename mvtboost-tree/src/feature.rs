//! Predictor column kinds and validation.

use mvtboost_core::{Matrix, MvtbError, Result};

/// How a predictor column is interpreted when splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeatureKind {
    /// Ordered numeric values; splits are thresholds.
    #[default]
    Numeric,
    /// Level codes `0..n_levels` stored as `f64`; splits are level subsets.
    Categorical { n_levels: usize },
}

impl FeatureKind {
    pub fn is_categorical(&self) -> bool {
        matches!(self, FeatureKind::Categorical { .. })
    }
}

/// Check that every predictor value is compatible with its column kind.
///
/// `NaN` is always accepted (missing). Infinite values are rejected, as are
/// categorical codes that are negative, fractional, or `>= n_levels`.
pub fn validate_predictors(x: &Matrix, kinds: &[FeatureKind]) -> Result<()> {
    if kinds.len() != x.ncols() {
        return Err(MvtbError::ShapeMismatch(format!(
            "{} feature kinds for {} predictors",
            kinds.len(),
            x.ncols()
        )));
    }
    for (i, row) in x.rows().enumerate() {
        for (j, (&v, kind)) in row.iter().zip(kinds).enumerate() {
            if v.is_nan() {
                continue;
            }
            if v.is_infinite() {
                return Err(MvtbError::InvalidInput(format!(
                    "infinite predictor value at row {i}, column {j}"
                )));
            }
            if let FeatureKind::Categorical { n_levels } = kind {
                if v < 0.0 || v.fract() != 0.0 || v as usize >= *n_levels {
                    return Err(MvtbError::InvalidInput(format!(
                        "invalid level code {v} at row {i}, column {j} ({n_levels} levels)"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_accepts_nan() {
        let x = Matrix::from_rows(&[&[1.0], &[f64::NAN]]).unwrap();
        assert!(validate_predictors(&x, &[FeatureKind::Numeric]).is_ok());
    }

    #[test]
    fn categorical_codes_checked() {
        let kinds = [FeatureKind::Categorical { n_levels: 3 }];
        let ok = Matrix::from_rows(&[&[0.0], &[2.0], &[f64::NAN]]).unwrap();
        assert!(validate_predictors(&ok, &kinds).is_ok());
        let too_big = Matrix::from_rows(&[&[3.0]]).unwrap();
        assert!(validate_predictors(&too_big, &kinds).is_err());
        let fractional = Matrix::from_rows(&[&[1.5]]).unwrap();
        assert!(validate_predictors(&fractional, &kinds).is_err());
    }

    #[test]
    fn kind_count_must_match() {
        let x = Matrix::from_rows(&[&[1.0, 2.0]]).unwrap();
        assert!(validate_predictors(&x, &[FeatureKind::Numeric]).is_err());
    }
}
