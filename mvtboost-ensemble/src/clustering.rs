//! Hierarchical clustering of the covex matrix for heatmap ordering.

use mvtboost_cluster::{hierarchical, Dendrogram, DistanceMatrix, DistanceMethod, Linkage};
use mvtboost_core::{Matrix, MvtbError, Result, Summarizable};

use crate::model::FittedModel;

/// Distance and linkage choices for [`cluster_covex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterConfig {
    /// Distance between rows (and columns) of the covex matrix (default: Manhattan).
    pub distance: DistanceMethod,
    /// Linkage criterion (default: complete).
    pub linkage: Linkage,
    /// Also cluster the outcome-pair columns (default: true).
    pub cluster_columns: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            distance: DistanceMethod::Manhattan,
            linkage: Linkage::Complete,
            cluster_columns: true,
        }
    }
}

impl ClusterConfig {
    /// Resolve method names such as `"manhattan"` and `"average"`.
    pub fn from_names(distance: &str, linkage: &str) -> Result<Self> {
        Ok(Self {
            distance: distance.parse()?,
            linkage: linkage.parse()?,
            cluster_columns: true,
        })
    }
}

/// Orderings and dendrograms for a covex matrix.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CovexClustering {
    pub rows: Dendrogram,
    pub columns: Option<Dendrogram>,
    /// Predictor indices in display order.
    pub row_order: Vec<usize>,
    /// Outcome-pair indices in display order; identity when columns are not clustered.
    pub col_order: Vec<usize>,
    /// The covex matrix with rows and columns permuted.
    pub reordered: Matrix,
}

impl Summarizable for CovexClustering {
    fn summary(&self) -> String {
        format!(
            "CovexClustering: {} rows, {} columns ({})",
            self.row_order.len(),
            self.col_order.len(),
            if self.columns.is_some() { "clustered" } else { "fixed" }
        )
    }
}

/// Cluster predictor rows and, optionally, outcome-pair columns of `covex`.
///
/// The input matrix is not modified; the result depends only on its values
/// and `config`.
pub fn cluster_covex(covex: &Matrix, config: &ClusterConfig) -> Result<CovexClustering> {
    if covex.nrows() == 0 || covex.ncols() == 0 {
        return Err(MvtbError::InvalidInput("empty covex matrix".into()));
    }
    let rows = cluster_rows(covex, config)?;
    let columns = if config.cluster_columns {
        Some(cluster_rows(&covex.transpose(), config)?)
    } else {
        None
    };
    let row_order = rows.order.clone();
    let col_order = match &columns {
        Some(d) => d.order.clone(),
        None => (0..covex.ncols()).collect(),
    };
    let reordered = covex.select_rows(&row_order).select_columns(&col_order);
    Ok(CovexClustering {
        rows,
        columns,
        row_order,
        col_order,
        reordered,
    })
}

fn cluster_rows(m: &Matrix, config: &ClusterConfig) -> Result<Dendrogram> {
    let distances = DistanceMatrix::between_rows(m, config.distance)?;
    hierarchical(&distances, config.linkage)
}

impl FittedModel {
    /// Cluster this model's covex using distance and linkage method names.
    pub fn cluster_covex(&self, distance: &str, linkage: &str) -> Result<CovexClustering> {
        cluster_covex(self.covex(), &ClusterConfig::from_names(distance, linkage)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn blocky() -> Matrix {
        Matrix::from_rows(&[
            &[10.0, 0.0, 9.0],
            &[0.1, 5.0, 0.0],
            &[9.5, 0.2, 8.0],
            &[0.0, 4.0, 0.3],
        ])
        .unwrap()
    }

    #[test]
    fn similar_rows_become_adjacent() {
        let c = cluster_covex(&blocky(), &ClusterConfig::default()).unwrap();
        let pos = |r: usize| c.row_order.iter().position(|&x| x == r).unwrap();
        assert_eq!((pos(0) as i64 - pos(2) as i64).abs(), 1);
        assert_eq!((pos(1) as i64 - pos(3) as i64).abs(), 1);
        assert_eq!(c.rows.merges.len(), 3);
        assert_eq!(c.columns.as_ref().map(|d| d.n_leaves()), Some(3));
    }

    #[test]
    fn reordered_is_permutation_of_input() {
        let m = blocky();
        let c = cluster_covex(&m, &ClusterConfig::default()).unwrap();
        for (i, &r) in c.row_order.iter().enumerate() {
            for (j, &col) in c.col_order.iter().enumerate() {
                assert_eq!(c.reordered.get(i, j), m.get(r, col));
            }
        }
    }

    #[test]
    fn columns_optional() {
        let config = ClusterConfig {
            cluster_columns: false,
            ..Default::default()
        };
        let c = cluster_covex(&blocky(), &config).unwrap();
        assert!(c.columns.is_none());
        assert_eq!(c.col_order, vec![0, 1, 2]);
    }

    #[test]
    fn single_predictor() {
        let m = Matrix::from_rows(&[&[1.0, 2.0, 3.0]]).unwrap();
        let c = cluster_covex(&m, &ClusterConfig::default()).unwrap();
        assert_eq!(c.row_order, vec![0]);
        assert!(c.rows.merges.is_empty());
    }

    #[test]
    fn names_resolve() {
        let cfg = ClusterConfig::from_names("euclidean", "Ward").unwrap();
        assert_eq!(cfg.distance, DistanceMethod::Euclidean);
        assert_eq!(cfg.linkage, Linkage::Ward);
        assert!(ClusterConfig::from_names("cosine", "ward").is_err());
        assert!(ClusterConfig::from_names("euclidean", "centroid").is_err());
    }

    proptest! {
        #[test]
        fn clustering_is_pure(
            values in proptest::collection::vec(0.0f64..100.0, 12),
            method in 0usize..4,
            link in 0usize..5,
        ) {
            let m = Matrix::from_row_major(values, 4, 3).unwrap();
            let config = ClusterConfig {
                distance: DistanceMethod::ALL[method],
                linkage: Linkage::ALL[link],
                cluster_columns: true,
            };
            let before = m.clone();
            let a = cluster_covex(&m, &config).unwrap();
            let b = cluster_covex(&m, &config).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(&m, &before);
        }
    }
}
