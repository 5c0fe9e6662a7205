//! Dense row-major matrices, sample covariance, and outcome-pair indexing.
//!
//! Data is stored flat and row-major, the same layout used for predictor and
//! outcome data everywhere in the workspace. Outcome pairs `(a, b)` with
//! `a <= b` are enumerated in a fixed canonical order: row by row through the
//! upper triangle of a `q x q` matrix, diagonal included.

use crate::{MvtbError, Result, Summarizable};

/// A dense `nrows x ncols` matrix of `f64` stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix {
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
}

impl Matrix {
    /// Build a matrix from flat row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`MvtbError::ShapeMismatch`] if `data.len() != nrows * ncols`.
    pub fn from_row_major(data: Vec<f64>, nrows: usize, ncols: usize) -> Result<Self> {
        if data.len() != nrows * ncols {
            return Err(MvtbError::ShapeMismatch(format!(
                "data length {} != {} x {}",
                data.len(),
                nrows,
                ncols
            )));
        }
        Ok(Self { data, nrows, ncols })
    }

    /// Build a matrix from a slice of equal-length rows.
    pub fn from_rows(rows: &[&[f64]]) -> Result<Self> {
        let ncols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * ncols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != ncols {
                return Err(MvtbError::ShapeMismatch(format!(
                    "row {} has length {}, expected {}",
                    i,
                    row.len(),
                    ncols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            nrows: rows.len(),
            ncols,
        })
    }

    /// Build a matrix from column vectors of equal length.
    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self> {
        let ncols = columns.len();
        let nrows = columns.first().map_or(0, |c| c.len());
        if let Some((j, c)) = columns.iter().enumerate().find(|(_, c)| c.len() != nrows) {
            return Err(MvtbError::ShapeMismatch(format!(
                "column {} has length {}, expected {}",
                j,
                c.len(),
                nrows
            )));
        }
        let mut data = vec![0.0; nrows * ncols];
        for (j, col) in columns.iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                data[i * ncols + j] = v;
            }
        }
        Ok(Self { data, nrows, ncols })
    }

    /// An all-zero matrix.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![0.0; nrows * ncols],
            nrows,
            ncols,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// `(nrows, ncols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Element at row `i`, column `j`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.nrows && j < self.ncols, "index ({i}, {j}) out of bounds");
        self.data[i * self.ncols + j]
    }

    /// Overwrite the element at row `i`, column `j`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        assert!(i < self.nrows && j < self.ncols, "index ({i}, {j}) out of bounds");
        self.data[i * self.ncols + j] = value;
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    /// Mutable view of row `i`.
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    /// Iterator over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.nrows).map(move |i| self.row(i))
    }

    /// Copy of column `j`.
    ///
    /// # Panics
    ///
    /// Panics if `j >= ncols`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        assert!(j < self.ncols, "column {j} out of bounds for {} columns", self.ncols);
        (0..self.nrows).map(|i| self.data[i * self.ncols + j]).collect()
    }

    /// Replace column `j` with `values`.
    ///
    /// Nothing is written unless `j` and the length of `values` both fit.
    pub fn set_column(&mut self, j: usize, values: &[f64]) -> Result<()> {
        if j >= self.ncols {
            return Err(MvtbError::ShapeMismatch(format!(
                "column {} out of bounds for {} columns",
                j, self.ncols
            )));
        }
        if values.len() != self.nrows {
            return Err(MvtbError::ShapeMismatch(format!(
                "column length {} != nrows {}",
                values.len(),
                self.nrows
            )));
        }
        for (i, &v) in values.iter().enumerate() {
            self.data[i * self.ncols + j] = v;
        }
        Ok(())
    }

    /// Flat row-major storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// New matrix containing only the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.ncols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            data,
            nrows: indices.len(),
            ncols: self.ncols,
        }
    }

    /// New matrix containing only the given columns, in the given order.
    pub fn select_columns(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(self.nrows * indices.len());
        for i in 0..self.nrows {
            let row = self.row(i);
            data.extend(indices.iter().map(|&j| row[j]));
        }
        Matrix {
            data,
            nrows: self.nrows,
            ncols: indices.len(),
        }
    }

    pub fn transpose(&self) -> Matrix {
        let mut data = vec![0.0; self.data.len()];
        for i in 0..self.nrows {
            for j in 0..self.ncols {
                data[j * self.nrows + i] = self.data[i * self.ncols + j];
            }
        }
        Matrix {
            data,
            nrows: self.ncols,
            ncols: self.nrows,
        }
    }

    /// Element-wise `self += other`.
    pub fn add_assign(&mut self, other: &Matrix) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(MvtbError::ShapeMismatch(format!(
                "cannot add {:?} to {:?}",
                other.shape(),
                self.shape()
            )));
        }
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// Multiply every element by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    /// Mean of each column.
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.ncols];
        if self.nrows == 0 {
            return means;
        }
        for row in self.rows() {
            for (m, &v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        let n = self.nrows as f64;
        for m in &mut means {
            *m /= n;
        }
        means
    }

    /// Sample covariance matrix (`n - 1` denominator) of the columns.
    ///
    /// The result is a symmetric `ncols x ncols` matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if there are fewer than two rows.
    pub fn covariance(&self) -> Result<Matrix> {
        if self.nrows < 2 {
            return Err(MvtbError::InvalidInput(format!(
                "covariance needs at least 2 rows, got {}",
                self.nrows
            )));
        }
        let q = self.ncols;
        let means = self.column_means();
        let mut cov = vec![0.0; q * q];
        for row in self.rows() {
            for a in 0..q {
                let da = row[a] - means[a];
                for b in a..q {
                    cov[a * q + b] += da * (row[b] - means[b]);
                }
            }
        }
        let denom = (self.nrows - 1) as f64;
        for a in 0..q {
            for b in a..q {
                let v = cov[a * q + b] / denom;
                cov[a * q + b] = v;
                cov[b * q + a] = v;
            }
        }
        Ok(Matrix {
            data: cov,
            nrows: q,
            ncols: q,
        })
    }

    /// Upper triangle (diagonal included) of a square matrix in canonical
    /// outcome-pair order.
    pub fn upper_triangle(&self) -> Result<Vec<f64>> {
        if self.nrows != self.ncols {
            return Err(MvtbError::ShapeMismatch(format!(
                "upper triangle of non-square {}x{} matrix",
                self.nrows, self.ncols
            )));
        }
        Ok(outcome_pairs(self.nrows)
            .into_iter()
            .map(|(a, b)| self.data[a * self.ncols + b])
            .collect())
    }
}

impl Summarizable for Matrix {
    fn summary(&self) -> String {
        format!("Matrix: {}x{}", self.nrows, self.ncols)
    }
}

/// Number of unordered outcome pairs, self-pairs included: `q(q+1)/2`.
pub fn pair_count(q: usize) -> usize {
    q * (q + 1) / 2
}

/// Canonical index of the pair `(a, b)` among [`outcome_pairs`]`(q)`.
///
/// Order of `a` and `b` does not matter.
pub fn pair_index(q: usize, a: usize, b: usize) -> usize {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    // row a starts after a rows of decreasing length q, q-1, ...
    a * (2 * q - a + 1) / 2 + (b - a)
}

/// All outcome pairs `(a, b)` with `a <= b`, in canonical order.
pub fn outcome_pairs(q: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(pair_count(q));
    for a in 0..q {
        for b in a..q {
            pairs.push((a, b));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_rows_and_access() {
        let m = Matrix::from_rows(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]).unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.get(2, 1), 6.0);
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert_eq!(m.column(0), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn ragged_rows_rejected() {
        assert!(Matrix::from_rows(&[&[1.0, 2.0], &[3.0]]).is_err());
    }

    #[test]
    fn set_column_out_of_range_leaves_matrix_untouched() {
        let mut m = Matrix::from_rows(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]).unwrap();
        let before = m.clone();
        assert!(matches!(
            m.set_column(2, &[9.0, 9.0, 9.0]),
            Err(MvtbError::ShapeMismatch(_))
        ));
        assert_eq!(m, before);
        m.set_column(1, &[7.0, 8.0, 9.0]).unwrap();
        assert_eq!(m.column(1), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn column_out_of_range_panics() {
        let m = Matrix::zeros(4, 2);
        let _ = m.column(2);
    }

    #[test]
    fn row_major_length_checked() {
        assert!(Matrix::from_row_major(vec![1.0, 2.0, 3.0], 2, 2).is_err());
    }

    #[test]
    fn from_columns_matches_rows() {
        let by_cols = Matrix::from_columns(&[vec![1.0, 3.0], vec![2.0, 4.0]]).unwrap();
        let by_rows = Matrix::from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]).unwrap();
        assert_eq!(by_cols, by_rows);
    }

    #[test]
    fn covariance_known() {
        // x = [1,2,3], y = [2,4,6] -> var(x)=1, var(y)=4, cov=2
        let m = Matrix::from_rows(&[&[1.0, 2.0], &[2.0, 4.0], &[3.0, 6.0]]).unwrap();
        let c = m.covariance().unwrap();
        assert!((c.get(0, 0) - 1.0).abs() < 1e-12);
        assert!((c.get(1, 1) - 4.0).abs() < 1e-12);
        assert!((c.get(0, 1) - 2.0).abs() < 1e-12);
        assert!((c.get(1, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn covariance_needs_two_rows() {
        let m = Matrix::from_rows(&[&[1.0, 2.0]]).unwrap();
        assert!(m.covariance().is_err());
    }

    #[test]
    fn upper_triangle_order() {
        let m = Matrix::from_rows(&[&[1.0, 2.0, 3.0], &[2.0, 4.0, 5.0], &[3.0, 5.0, 6.0]])
            .unwrap();
        assert_eq!(m.upper_triangle().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn pairs_canonical() {
        assert_eq!(pair_count(3), 6);
        assert_eq!(
            outcome_pairs(3),
            vec![(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]
        );
        for (k, (a, b)) in outcome_pairs(4).into_iter().enumerate() {
            assert_eq!(pair_index(4, a, b), k);
            assert_eq!(pair_index(4, b, a), k);
        }
    }

    #[test]
    fn select_rows_and_columns() {
        let m = Matrix::from_rows(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]).unwrap();
        let r = m.select_rows(&[2, 0]);
        assert_eq!(r.as_slice(), &[5.0, 6.0, 1.0, 2.0]);
        let c = m.select_columns(&[1]);
        assert_eq!(c.as_slice(), &[2.0, 4.0, 6.0]);
        assert_eq!(m.transpose().shape(), (2, 3));
    }

    proptest! {
        #[test]
        fn covariance_is_symmetric(
            values in proptest::collection::vec(-100.0f64..100.0, 12),
        ) {
            let m = Matrix::from_row_major(values, 4, 3).unwrap();
            let c = m.covariance().unwrap();
            for a in 0..3 {
                prop_assert!(c.get(a, a) >= -1e-9);
                for b in 0..3 {
                    prop_assert!((c.get(a, b) - c.get(b, a)).abs() < 1e-9);
                }
            }
        }
    }
}
