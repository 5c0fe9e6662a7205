//! Row distances for clustering attribution matrices.

use std::fmt;
use std::str::FromStr;

use mvtboost_core::{Matrix, MvtbError, Result, Summarizable};

/// Metric used to compare two rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceMethod {
    /// L2.
    Euclidean,
    /// L1; the default for covex heatmaps.
    #[default]
    Manhattan,
    /// L-infinity.
    Maximum,
    /// Sum of `|a - b| / (|a| + |b|)`, skipping coordinates where both are zero.
    Canberra,
}

impl DistanceMethod {
    pub const ALL: [DistanceMethod; 4] = [
        DistanceMethod::Euclidean,
        DistanceMethod::Manhattan,
        DistanceMethod::Maximum,
        DistanceMethod::Canberra,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMethod::Euclidean => "euclidean",
            DistanceMethod::Manhattan => "manhattan",
            DistanceMethod::Maximum => "maximum",
            DistanceMethod::Canberra => "canberra",
        }
    }

    /// Distance between two equal-length rows.
    pub fn between(&self, a: &[f64], b: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());
        let gaps = a.iter().zip(b).map(|(u, v)| (u - v).abs());
        match self {
            DistanceMethod::Euclidean => gaps.map(|g| g * g).sum::<f64>().sqrt(),
            DistanceMethod::Manhattan => gaps.sum(),
            DistanceMethod::Maximum => gaps.fold(0.0, f64::max),
            DistanceMethod::Canberra => a
                .iter()
                .zip(b)
                .filter(|(u, v)| u.abs() + v.abs() > 0.0)
                .map(|(u, v)| (u - v).abs() / (u.abs() + v.abs()))
                .sum(),
        }
    }
}

impl fmt::Display for DistanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMethod {
    type Err = MvtbError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                MvtbError::InvalidConfiguration(format!(
                    "distance '{s}' is not one of euclidean, manhattan, maximum, canberra"
                ))
            })
    }
}

/// Pairwise distances between the rows of a matrix.
///
/// Only the strict upper triangle is stored, row by row: for `n` rows that
/// is `n * (n - 1) / 2` values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceMatrix {
    upper: Vec<f64>,
    n: usize,
}

impl DistanceMatrix {
    /// Distances between every pair of rows of `m`.
    pub fn between_rows(m: &Matrix, method: DistanceMethod) -> Result<Self> {
        let n = m.nrows();
        if n == 0 || m.ncols() == 0 {
            return Err(MvtbError::InvalidInput(format!(
                "cannot measure distances on a {}x{} matrix",
                n,
                m.ncols()
            )));
        }
        let row_block = |i: usize| -> Vec<f64> {
            let a = m.row(i);
            ((i + 1)..n).map(|j| method.between(a, m.row(j))).collect()
        };
        #[cfg(feature = "parallel")]
        let blocks: Vec<Vec<f64>> = {
            use rayon::prelude::*;
            (0..n).into_par_iter().map(row_block).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let blocks: Vec<Vec<f64>> = (0..n).map(row_block).collect();

        Ok(Self {
            upper: blocks.concat(),
            n,
        })
    }

    /// Distance between rows `i` and `j`; zero on the diagonal.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        match i.cmp(&j) {
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Less => self.upper[self.offset(i, j)],
            std::cmp::Ordering::Greater => self.upper[self.offset(j, i)],
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Position of `(i, j)`, `i < j`, in the packed triangle.
    fn offset(&self, i: usize, j: usize) -> usize {
        let before: usize = i * (2 * self.n - i - 1) / 2;
        before + (j - i - 1)
    }
}

impl Summarizable for DistanceMatrix {
    fn summary(&self) -> String {
        format!("DistanceMatrix: {} rows, {} pairs", self.n, self.upper.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corners() -> Matrix {
        Matrix::from_rows(&[&[0.0, 0.0], &[3.0, 0.0], &[0.0, 4.0], &[3.0, 4.0]]).unwrap()
    }

    #[test]
    fn metrics_on_a_3_4_5_triangle() {
        let (a, b) = ([0.0, 0.0], [3.0, -4.0]);
        assert!((DistanceMethod::Euclidean.between(&a, &b) - 5.0).abs() < 1e-12);
        assert!((DistanceMethod::Manhattan.between(&a, &b) - 7.0).abs() < 1e-12);
        assert!((DistanceMethod::Maximum.between(&a, &b) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn canberra_ignores_shared_zeros() {
        let d = DistanceMethod::Canberra.between(&[2.0, 0.0, 1.0], &[6.0, 0.0, 1.0]);
        assert!((d - 0.5).abs() < 1e-12);
    }

    #[test]
    fn parse_is_case_and_space_insensitive() {
        for m in DistanceMethod::ALL {
            assert_eq!(m.to_string().to_uppercase().parse::<DistanceMethod>().unwrap(), m);
        }
        assert_eq!(
            " maximum\t".parse::<DistanceMethod>().unwrap(),
            DistanceMethod::Maximum
        );
        assert!("binary".parse::<DistanceMethod>().is_err());
    }

    #[test]
    fn packed_lookup_matches_direct_distance() {
        let m = corners();
        for method in DistanceMethod::ALL {
            let dm = DistanceMatrix::between_rows(&m, method).unwrap();
            assert_eq!(dm.n(), 4);
            for i in 0..4 {
                for j in 0..4 {
                    let direct = method.between(m.row(i), m.row(j));
                    assert!((dm.get(i, j) - direct).abs() < 1e-12);
                    assert_eq!(dm.get(i, j), dm.get(j, i));
                }
            }
        }
    }

    #[test]
    fn one_row_has_no_pairs() {
        let m = Matrix::from_rows(&[&[1.0, 2.0]]).unwrap();
        let dm = DistanceMatrix::between_rows(&m, DistanceMethod::Manhattan).unwrap();
        assert_eq!(dm.summary(), "DistanceMatrix: 1 rows, 0 pairs");
        assert_eq!(dm.get(0, 0), 0.0);
    }

    #[test]
    fn empty_matrix_rejected() {
        let m = Matrix::zeros(0, 3);
        assert!(DistanceMatrix::between_rows(&m, DistanceMethod::Euclidean).is_err());
    }
}
