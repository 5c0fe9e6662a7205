//! Agglomerative hierarchical clustering.
//!
//! Clusters are merged until one remains, producing a complete dendrogram.
//! Node ids follow the usual convention: leaves are `0..n`, and the cluster
//! created by merge step `s` gets id `n + s`. Distances between a merged
//! cluster and the others are updated with the Lance-Williams recurrence for
//! the chosen linkage. Ties are broken towards the lowest pair of slot
//! indices, so results are a pure function of the distance matrix.

use std::fmt;
use std::str::FromStr;

use mvtboost_core::{MvtbError, Result, Summarizable};

use crate::distance::DistanceMatrix;

/// Linkage criterion for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Linkage {
    Single,
    #[default]
    Complete,
    Average,
    /// Weighted average (WPGMA).
    McQuitty,
    /// Ward's minimum variance; heights are on the distance scale.
    Ward,
}

impl Linkage {
    pub const ALL: [Linkage; 5] = [
        Linkage::Single,
        Linkage::Complete,
        Linkage::Average,
        Linkage::McQuitty,
        Linkage::Ward,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::McQuitty => "mcquitty",
            Linkage::Ward => "ward",
        }
    }

    /// Distance from cluster `c` to the union of `a` and `b`.
    ///
    /// For Ward the inputs and output are squared distances.
    fn update(
        &self,
        d_ac: f64,
        d_bc: f64,
        d_ab: f64,
        size_a: f64,
        size_b: f64,
        size_c: f64,
    ) -> f64 {
        match self {
            Linkage::Single => d_ac.min(d_bc),
            Linkage::Complete => d_ac.max(d_bc),
            Linkage::Average => (d_ac * size_a + d_bc * size_b) / (size_a + size_b),
            Linkage::McQuitty => (d_ac + d_bc) / 2.0,
            Linkage::Ward => {
                ((size_a + size_c) * d_ac + (size_b + size_c) * d_bc - size_c * d_ab)
                    / (size_a + size_b + size_c)
            }
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Linkage {
    type Err = MvtbError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        // accept the ward.D / ward.D2 spellings
        let lower = match lower.as_str() {
            "ward.d" | "ward.d2" => "ward".to_string(),
            _ => lower,
        };
        Linkage::ALL
            .into_iter()
            .find(|l| l.name() == lower)
            .ok_or_else(|| MvtbError::InvalidConfiguration(format!("unknown linkage '{s}'")))
    }
}

/// A single merge step in the dendrogram.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergeStep {
    /// Node id of the first merged cluster.
    pub left: usize,
    /// Node id of the second merged cluster.
    pub right: usize,
    /// Linkage distance at which the merge happened.
    pub height: f64,
    /// Number of leaves in the merged cluster.
    pub size: usize,
}

/// A complete dendrogram over `n` leaves.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dendrogram {
    /// Ordered merge history, `n - 1` steps.
    pub merges: Vec<MergeStep>,
    /// Leaves in left-to-right drawing order.
    pub order: Vec<usize>,
    n_leaves: usize,
    linkage: Linkage,
}

impl Dendrogram {
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Merge heights in merge order.
    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.height).collect()
    }

    /// Cut the tree into `k` clusters.
    ///
    /// Labels are numbered by first appearance in leaf index order.
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        let n = self.n_leaves;
        if k == 0 || k > n {
            return Err(MvtbError::InvalidInput(format!(
                "cannot cut {n} leaves into {k} clusters"
            )));
        }
        // union-find over node ids, replaying the first n - k merges
        let mut parent: Vec<usize> = (0..2 * n).collect();
        fn root(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }
        for (s, m) in self.merges.iter().take(n - k).enumerate() {
            let id = n + s;
            let ra = root(&mut parent, m.left);
            let rb = root(&mut parent, m.right);
            parent[ra] = id;
            parent[rb] = id;
        }
        let mut labels = vec![0usize; n];
        let mut seen: Vec<(usize, usize)> = Vec::new();
        for (leaf, label) in labels.iter_mut().enumerate() {
            let r = root(&mut parent, leaf);
            *label = match seen.iter().find(|(root_id, _)| *root_id == r) {
                Some(&(_, l)) => l,
                None => {
                    seen.push((r, seen.len()));
                    seen.len() - 1
                }
            };
        }
        Ok(labels)
    }
}

impl Summarizable for Dendrogram {
    fn summary(&self) -> String {
        let top = self.merges.last().map_or(0.0, |m| m.height);
        format!(
            "Dendrogram: {} leaves, {} linkage, height {:.4}",
            self.n_leaves, self.linkage, top,
        )
    }
}

/// Run agglomerative hierarchical clustering on a precomputed distance matrix.
pub fn hierarchical(distances: &DistanceMatrix, linkage: Linkage) -> Result<Dendrogram> {
    let n = distances.n();
    if n == 0 {
        return Err(MvtbError::InvalidInput("no points to cluster".into()));
    }

    // Working distance matrix (full n x n, but we only use active pairs)
    let ward = linkage == Linkage::Ward;
    let mut dist = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distances.get(i, j);
            let d = if ward { d * d } else { d };
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }

    // slot i holds the cluster currently identified by node_id[i]
    let mut node_id: Vec<usize> = (0..n).collect();
    let mut sizes: Vec<usize> = vec![1; n];
    let mut active: Vec<usize> = (0..n).collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    while active.len() > 1 {
        // Find the two closest active clusters
        let mut best_dist = f64::INFINITY;
        let mut best_a = active[0];
        let mut best_b = active[1];
        for (ai, &a) in active.iter().enumerate() {
            for &b in &active[ai + 1..] {
                if dist[a][b] < best_dist {
                    best_dist = dist[a][b];
                    best_a = a;
                    best_b = b;
                }
            }
        }

        let size_a = sizes[best_a] as f64;
        let size_b = sizes[best_b] as f64;
        let d_ab = dist[best_a][best_b];

        // Update distances from merged cluster to all other active clusters
        for &c in &active {
            if c == best_a || c == best_b {
                continue;
            }
            let new_d = linkage.update(
                dist[best_a][c],
                dist[best_b][c],
                d_ab,
                size_a,
                size_b,
                sizes[c] as f64,
            );
            dist[best_a][c] = new_d;
            dist[c][best_a] = new_d;
        }

        let height = if ward { d_ab.max(0.0).sqrt() } else { d_ab };
        let new_size = sizes[best_a] + sizes[best_b];
        merges.push(MergeStep {
            left: node_id[best_a],
            right: node_id[best_b],
            height,
            size: new_size,
        });

        sizes[best_a] = new_size;
        node_id[best_a] = n + merges.len() - 1;
        active.retain(|&c| c != best_b);
    }

    let order = leaf_order(&merges, n);
    Ok(Dendrogram {
        merges,
        order,
        n_leaves: n,
        linkage,
    })
}

/// Left-to-right leaf order from the root down.
fn leaf_order(merges: &[MergeStep], n: usize) -> Vec<usize> {
    if merges.is_empty() {
        return (0..n).collect();
    }
    let mut order = Vec::with_capacity(n);
    let mut stack = vec![n + merges.len() - 1];
    while let Some(node) = stack.pop() {
        if node < n {
            order.push(node);
        } else {
            let m = &merges[node - n];
            // right pushed first so left is visited first
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMethod;
    use mvtboost_core::Matrix;
    use proptest::prelude::*;

    fn line(points: &[f64]) -> DistanceMatrix {
        let m = Matrix::from_row_major(points.to_vec(), points.len(), 1).unwrap();
        DistanceMatrix::between_rows(&m, DistanceMethod::Euclidean).unwrap()
    }

    #[test]
    fn two_groups_merge_last() {
        let dm = line(&[0.0, 10.0, 0.5, 10.5, 1.0]);
        let d = hierarchical(&dm, Linkage::Complete).unwrap();
        assert_eq!(d.merges.len(), 4);
        let labels = d.cut(2).unwrap();
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[0], labels[4]);
        assert_eq!(labels[1], labels[3]);
        assert_ne!(labels[0], labels[1]);
        // groups are contiguous in the leaf order
        let pos: Vec<usize> = (0..5)
            .map(|leaf| d.order.iter().position(|&o| o == leaf).unwrap())
            .collect();
        let low_max = [pos[0], pos[2], pos[4]].into_iter().max().unwrap();
        let high_min = [pos[1], pos[3]].into_iter().min().unwrap();
        let low_min = [pos[0], pos[2], pos[4]].into_iter().min().unwrap();
        let high_max = [pos[1], pos[3]].into_iter().max().unwrap();
        assert!(low_max < high_min || high_max < low_min);
    }

    #[test]
    fn heights_non_decreasing_for_monotone_linkages() {
        let dm = line(&[0.0, 1.0, 3.0, 7.0, 15.0, 16.0]);
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            let d = hierarchical(&dm, linkage).unwrap();
            let h = d.heights();
            assert!(h.windows(2).all(|w| w[0] <= w[1] + 1e-12), "{linkage}: {h:?}");
        }
    }

    #[test]
    fn single_linkage_known_heights() {
        let dm = line(&[0.0, 1.0, 3.0]);
        let d = hierarchical(&dm, Linkage::Single).unwrap();
        assert_eq!(d.merges[0].left, 0);
        assert_eq!(d.merges[0].right, 1);
        assert!((d.merges[0].height - 1.0).abs() < 1e-12);
        assert_eq!(d.merges[1].left, 3);
        assert_eq!(d.merges[1].right, 2);
        assert!((d.merges[1].height - 2.0).abs() < 1e-12);
        assert_eq!(d.order, vec![0, 1, 2]);
    }

    #[test]
    fn ward_two_points_height_is_distance() {
        let dm = line(&[0.0, 4.0]);
        let d = hierarchical(&dm, Linkage::Ward).unwrap();
        assert!((d.merges[0].height - 4.0).abs() < 1e-12);
    }

    #[test]
    fn single_leaf_has_no_merges() {
        let dm = line(&[2.0]);
        let d = hierarchical(&dm, Linkage::Average).unwrap();
        assert!(d.merges.is_empty());
        assert_eq!(d.order, vec![0]);
        assert_eq!(d.cut(1).unwrap(), vec![0]);
    }

    #[test]
    fn cut_bounds_checked() {
        let dm = line(&[0.0, 1.0]);
        let d = hierarchical(&dm, Linkage::Average).unwrap();
        assert!(d.cut(0).is_err());
        assert!(d.cut(3).is_err());
        assert_eq!(d.cut(2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn linkage_names_parse() {
        for l in Linkage::ALL {
            assert_eq!(l.name().parse::<Linkage>().unwrap(), l);
        }
        assert_eq!("ward.D2".parse::<Linkage>().unwrap(), Linkage::Ward);
        assert!("centroid".parse::<Linkage>().is_err());
    }

    proptest! {
        #[test]
        fn clustering_is_pure(points in proptest::collection::vec(-10.0f64..10.0, 2..12)) {
            let dm = line(&points);
            let a = hierarchical(&dm, Linkage::Average).unwrap();
            let b = hierarchical(&dm, Linkage::Average).unwrap();
            prop_assert_eq!(&a, &b);
            let mut sorted = a.order.clone();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, (0..points.len()).collect::<Vec<_>>());
        }
    }
}
