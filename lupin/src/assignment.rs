//! Cluster assignment store
//!
//! Cluster ids are 1-based SOM node numbers, metacluster ids are
//! 1-based group numbers. Both stay plain integers; they are never
//! mixed into the expression matrix.

use crate::error::{LupinError, Result};
use matrix_util::utils::count_one_based;

/// Nearest-prototype membership of every cell
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    ids: Vec<usize>,
    num_clusters: usize,
}

impl ClusterAssignment {
    /// * `ids` - one cluster id in `[1, num_clusters]` per cell
    pub fn new(ids: Vec<usize>, num_clusters: usize) -> Result<Self> {
        if let Some(&bad) = ids.iter().find(|&&k| k == 0 || k > num_clusters) {
            return Err(LupinError::InvalidConfiguration(format!(
                "cluster id {} outside [1, {}]",
                bad, num_clusters
            )));
        }
        Ok(Self { ids, num_clusters })
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn num_cells(&self) -> usize {
        self.ids.len()
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// Cluster id of a cell
    pub fn cluster_of(&self, cell: usize) -> Option<usize> {
        self.ids.get(cell).copied()
    }

    /// Number of cells in each cluster; entry `k - 1` for cluster `k`
    pub fn cluster_sizes(&self) -> Vec<usize> {
        count_one_based(&self.ids, self.num_clusters)
    }
}

/// Cluster id -> metacluster id, total over the clusters and onto
/// `[1, num_metaclusters]`
#[derive(Debug, Clone, PartialEq)]
pub struct MetaclusterMap {
    map: Vec<usize>,
    num_metaclusters: usize,
    cut_height: f64,
}

impl MetaclusterMap {
    /// * `map` - entry `k - 1` is the metacluster of cluster `k`
    /// * `cut_height` - dendrogram height at which the groups were cut
    pub fn new(map: Vec<usize>, num_metaclusters: usize, cut_height: f64) -> Result<Self> {
        if let Some(&bad) = map.iter().find(|&&m| m == 0 || m > num_metaclusters) {
            return Err(LupinError::InvalidConfiguration(format!(
                "metacluster id {} outside [1, {}]",
                bad, num_metaclusters
            )));
        }

        let sizes = count_one_based(&map, num_metaclusters);
        if let Some(empty) = sizes.iter().position(|&s| s == 0) {
            return Err(LupinError::EmptyMetacluster { id: empty + 1 });
        }

        Ok(Self {
            map,
            num_metaclusters,
            cut_height,
        })
    }

    pub fn num_clusters(&self) -> usize {
        self.map.len()
    }

    pub fn num_metaclusters(&self) -> usize {
        self.num_metaclusters
    }

    pub fn cut_height(&self) -> f64 {
        self.cut_height
    }

    /// Metacluster ids indexed by `cluster - 1`
    pub fn as_slice(&self) -> &[usize] {
        &self.map
    }

    /// Metacluster of a (1-based) cluster
    pub fn metacluster_of(&self, cluster: usize) -> Option<usize> {
        cluster.checked_sub(1).and_then(|k| self.map.get(k)).copied()
    }

    /// Clusters (1-based) merged into a metacluster
    pub fn members(&self, metacluster: usize) -> Vec<usize> {
        self.map
            .iter()
            .enumerate()
            .filter(|&(_, &m)| m == metacluster)
            .map(|(k, _)| k + 1)
            .collect()
    }
}

/// Per-cell cluster and metacluster ids of one run
#[derive(Debug, Clone)]
pub struct CellAssignments {
    clusters: ClusterAssignment,
    metaclusters: MetaclusterMap,
    cell_metaclusters: Vec<usize>,
}

impl CellAssignments {
    pub fn new(clusters: ClusterAssignment, metaclusters: MetaclusterMap) -> Result<Self> {
        check_compatible(&clusters, &metaclusters)?;

        let cell_metaclusters = clusters
            .ids()
            .iter()
            .map(|&k| metaclusters.as_slice()[k - 1])
            .collect();

        Ok(Self {
            clusters,
            metaclusters,
            cell_metaclusters,
        })
    }

    pub fn clusters(&self) -> &ClusterAssignment {
        &self.clusters
    }

    pub fn metaclusters(&self) -> &MetaclusterMap {
        &self.metaclusters
    }

    pub fn num_cells(&self) -> usize {
        self.clusters.num_cells()
    }

    /// Metacluster id of every cell
    pub fn cell_metaclusters(&self) -> &[usize] {
        &self.cell_metaclusters
    }

    /// `(cluster, metacluster)` of a cell
    pub fn cell(&self, cell: usize) -> Option<(usize, usize)> {
        let k = self.clusters.cluster_of(cell)?;
        Some((k, self.cell_metaclusters[cell]))
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.clusters.cluster_sizes()
    }

    pub fn metacluster_sizes(&self) -> Vec<usize> {
        count_one_based(&self.cell_metaclusters, self.metaclusters.num_metaclusters())
    }

    /// Metacluster sizes as ASCII bars, showing up to `max_show`
    /// largest metaclusters sorted by size (descending)
    pub fn histogram_ascii(&self, max_width: usize, max_show: usize) -> String {
        let sizes = self.metacluster_sizes();
        let ntot = self.num_cells().max(1);

        let mut ranked: Vec<(usize, usize)> = sizes
            .iter()
            .enumerate()
            .map(|(k, &s)| (k + 1, s))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let n_show = max_show.min(ranked.len());
        let max_size = ranked.first().map(|&(_, s)| s).unwrap_or(1).max(1);

        let mut lines = vec![format!(
            "Metaclusters ({} cells, {} metaclusters, {} SOM nodes):",
            self.num_cells(),
            self.metaclusters.num_metaclusters(),
            self.clusters.num_clusters()
        )];

        for &(id, size) in ranked.iter().take(n_show) {
            let pct = 100.0 * size as f64 / ntot as f64;
            let bar_len = ((size as f64 / max_size as f64) * max_width as f64) as usize;
            lines.push(format!(
                "  Metacluster {:3}  {:>8} cells ({:>5.1}%)  {}",
                id,
                size,
                pct,
                "█".repeat(bar_len.max(1))
            ));
        }

        if ranked.len() > n_show {
            let hidden: usize = ranked[n_show..].iter().map(|&(_, s)| s).sum();
            lines.push(format!(
                "  ... and {} more metaclusters ({} cells)",
                ranked.len() - n_show,
                hidden
            ));
        }

        lines.join("\n")
    }
}

/// The map must cover every cluster of the assignment
pub(crate) fn check_compatible(
    clusters: &ClusterAssignment,
    metaclusters: &MetaclusterMap,
) -> Result<()> {
    if clusters.num_clusters() != metaclusters.num_clusters() {
        return Err(LupinError::InvalidConfiguration(format!(
            "assignment has {} clusters but the metacluster map covers {}",
            clusters.num_clusters(),
            metaclusters.num_clusters()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_ids_in_range() {
        assert!(ClusterAssignment::new(vec![1, 2, 3], 3).is_ok());
        assert!(ClusterAssignment::new(vec![0, 1], 3).is_err());
        assert!(ClusterAssignment::new(vec![4], 3).is_err());
    }

    #[test]
    fn test_map_must_be_onto() {
        let err = MetaclusterMap::new(vec![1, 1, 3], 3, 0.0).unwrap_err();
        assert_eq!(err, LupinError::EmptyMetacluster { id: 2 });

        let map = MetaclusterMap::new(vec![2, 1, 2], 2, 0.5).unwrap();
        assert_eq!(map.members(2), vec![1, 3]);
        assert_eq!(map.metacluster_of(2), Some(1));
        assert_eq!(map.metacluster_of(0), None);
    }

    #[test]
    fn test_cell_assignments() {
        let clusters = ClusterAssignment::new(vec![1, 3, 3, 2, 1], 4).unwrap();
        let map = MetaclusterMap::new(vec![1, 2, 2, 1], 2, 1.0).unwrap();
        let cells = CellAssignments::new(clusters, map).unwrap();

        assert_eq!(cells.cell_metaclusters(), &[1, 2, 2, 2, 1]);
        assert_eq!(cells.cell(1), Some((3, 2)));
        assert_eq!(cells.cluster_sizes(), vec![2, 1, 2, 0]);
        assert_eq!(cells.metacluster_sizes(), vec![2, 3]);

        let hist = cells.histogram_ascii(20, 10);
        assert!(hist.contains("5 cells"));
        assert!(hist.contains("2 metaclusters"));
    }

    #[test]
    fn test_incompatible_map() {
        let clusters = ClusterAssignment::new(vec![1, 2], 2).unwrap();
        let map = MetaclusterMap::new(vec![1, 1, 1], 1, 0.0).unwrap();
        assert!(matches!(
            CellAssignments::new(clusters, map),
            Err(LupinError::InvalidConfiguration(_))
        ));
    }
}
