//! Frequencies and expression summaries per cluster and metacluster

use crate::assignment::{check_compatible, ClusterAssignment, MetaclusterMap};
use crate::common::*;
use crate::error::{LupinError, Result};
use crate::expression::ExpressionMatrix;
use crate::markers::MarkerSubset;

use matrix_util::dmatrix_util::median;
use matrix_util::utils::{count_one_based, partition_by_membership};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Cell counts and percentages. Every cluster id `1..=nodes` and every
/// metacluster id `1..=nClus` is present, zero counts included.
#[derive(Debug, Clone)]
pub struct Frequencies {
    pub num_cells: usize,
    pub cluster_counts: BTreeMap<usize, usize>,
    pub metacluster_counts: BTreeMap<usize, usize>,
    /// cluster id -> percentage of cells
    pub cluster: BTreeMap<usize, f64>,
    /// metacluster id -> percentage of cells
    pub metacluster: BTreeMap<usize, f64>,
}

fn percentages(counts: &BTreeMap<usize, usize>, total: usize) -> BTreeMap<usize, f64> {
    counts
        .iter()
        .map(|(&k, &n)| (k, 100.0 * n as f64 / total as f64))
        .collect()
}

fn one_based_map(counts: Vec<usize>) -> BTreeMap<usize, usize> {
    counts.into_iter().enumerate().map(|(k, n)| (k + 1, n)).collect()
}

/// Percentage of cells in each cluster and metacluster
pub fn frequencies(assignment: &ClusterAssignment, map: &MetaclusterMap) -> Result<Frequencies> {
    check_compatible(assignment, map)?;

    let num_cells = assignment.num_cells();
    if num_cells == 0 {
        return Err(LupinError::EmptyInput("assignment has 0 cells".into()));
    }

    let cluster_sizes = assignment.cluster_sizes();
    let mut meta_sizes = vec![0_usize; map.num_metaclusters()];
    for (k, &n) in cluster_sizes.iter().enumerate() {
        meta_sizes[map.as_slice()[k] - 1] += n;
    }

    let cluster_counts = one_based_map(cluster_sizes);
    let metacluster_counts = one_based_map(meta_sizes);

    Ok(Frequencies {
        num_cells,
        cluster: percentages(&cluster_counts, num_cells),
        metacluster: percentages(&metacluster_counts, num_cells),
        cluster_counts,
        metacluster_counts,
    })
}

/// Per-metacluster summary of the subset markers; row `m - 1` is
/// metacluster `m`
#[derive(Debug, Clone)]
pub struct ExpressionByMetacluster {
    values: Mat,
    markers: Vec<Box<str>>,
}

impl ExpressionByMetacluster {
    /// `nClus x |subset|`
    pub fn values(&self) -> &Mat {
        &self.values
    }

    pub fn markers(&self) -> &[Box<str>] {
        &self.markers
    }

    pub fn num_metaclusters(&self) -> usize {
        self.values.nrows()
    }

    /// Value of the `j`-th subset marker in metacluster `m` (1-based)
    pub fn get(&self, metacluster: usize, j: usize) -> Option<f32> {
        if metacluster == 0 || metacluster > self.values.nrows() || j >= self.values.ncols() {
            return None;
        }
        Some(self.values[(metacluster - 1, j)])
    }

    /// Row names `1..=nClus` for tabular output
    pub fn row_names(&self) -> Vec<Box<str>> {
        (1..=self.num_metaclusters())
            .map(|m| m.to_string().into_boxed_str())
            .collect()
    }
}

/// Per-node mean expression; nodes without cells have `None`
#[derive(Debug, Clone)]
pub struct ExpressionByCluster {
    pub means: Vec<Option<Vec<f32>>>,
    pub markers: Vec<Box<str>>,
}

impl ExpressionByCluster {
    pub fn num_clusters(&self) -> usize {
        self.means.len()
    }

    /// Number of nodes without cells
    pub fn num_empty(&self) -> usize {
        self.means.iter().filter(|m| m.is_none()).count()
    }

    /// `nodes x |subset|`, with NaN rows for empty nodes
    pub fn to_mat(&self) -> Mat {
        let mut values = Mat::from_element(self.means.len(), self.markers.len(), f32::NAN);
        for (k, row) in self.means.iter().enumerate() {
            if let Some(row) = row {
                for (j, &v) in row.iter().enumerate() {
                    values[(k, j)] = v;
                }
            }
        }
        values
    }
}

fn column_mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = values.fold((0_f64, 0_usize), |(s, n), x| (s + x as f64, n + 1));
    (sum / n as f64) as f32
}

fn column_median(values: impl Iterator<Item = f32>) -> f32 {
    let xx: Vec<f32> = values.collect();
    median(&xx).unwrap_or(f32::NAN)
}

/// Summarize the subset columns over the rows of each group
/// `1..=ngroups`; groups without rows give `None`
fn summarize_groups<F>(xx: &Mat, labels: &[usize], ngroups: usize, stat: F) -> Vec<Option<Vec<f32>>>
where
    F: Fn(&mut dyn Iterator<Item = f32>) -> f32 + Sync,
{
    let groups = partition_by_membership(labels, None, 0);

    (1..=ngroups)
        .into_par_iter()
        .map(|g| {
            let rows = groups.get(&g)?;
            Some(
                (0..xx.ncols())
                    .map(|j| stat(&mut rows.iter().map(|&i| xx[(i, j)])))
                    .collect(),
            )
        })
        .collect()
}

/// Subset data, with every shape check the aggregations need
fn checked_subset(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    assignment: &ClusterAssignment,
) -> Result<Mat> {
    subset.check_bounds(matrix.ncols())?;
    if matrix.nrows() != assignment.num_cells() {
        return Err(LupinError::EmptyInput(format!(
            "length mismatch: assignment covers {} cells but matrix has {} rows",
            assignment.num_cells(),
            matrix.nrows()
        )));
    }
    if matrix.nrows() == 0 {
        return Err(LupinError::EmptyInput("expression matrix has 0 cells".into()));
    }
    matrix.subset_data(subset)
}

fn by_metacluster<F>(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    assignment: &ClusterAssignment,
    map: &MetaclusterMap,
    stat: F,
) -> Result<ExpressionByMetacluster>
where
    F: Fn(&mut dyn Iterator<Item = f32>) -> f32 + Sync,
{
    check_compatible(assignment, map)?;
    let xx = checked_subset(matrix, subset, assignment)?;

    let cell_meta: Vec<usize> = assignment
        .ids()
        .iter()
        .map(|&k| map.as_slice()[k - 1])
        .collect();

    let nclus = map.num_metaclusters();
    let rows = summarize_groups(&xx, &cell_meta, nclus, stat);

    let sizes = count_one_based(&cell_meta, nclus);
    if let Some(empty) = sizes.iter().position(|&n| n == 0) {
        return Err(LupinError::EmptyMetacluster { id: empty + 1 });
    }

    let ncols = xx.ncols();
    let mut values = Mat::zeros(nclus, ncols);
    for (m, row) in rows.into_iter().enumerate() {
        let row = row.ok_or(LupinError::EmptyMetacluster { id: m + 1 })?;
        for (j, v) in row.into_iter().enumerate() {
            values[(m, j)] = v;
        }
    }

    Ok(ExpressionByMetacluster {
        values,
        markers: subset.names.clone(),
    })
}

/// Arithmetic mean of each subset marker within each metacluster.
///
/// Fails with `EmptyMetacluster` rather than producing NaN when a
/// metacluster has no cells.
pub fn mean_expression(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    assignment: &ClusterAssignment,
    map: &MetaclusterMap,
) -> Result<ExpressionByMetacluster> {
    by_metacluster(matrix, subset, assignment, map, |x| column_mean(x))
}

/// Median of each subset marker within each metacluster
pub fn median_expression(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    assignment: &ClusterAssignment,
    map: &MetaclusterMap,
) -> Result<ExpressionByMetacluster> {
    by_metacluster(matrix, subset, assignment, map, |x| column_median(x))
}

/// Mean of each subset marker within each SOM node
pub fn cluster_mean_expression(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    assignment: &ClusterAssignment,
) -> Result<ExpressionByCluster> {
    let xx = checked_subset(matrix, subset, assignment)?;
    let means = summarize_groups(&xx, assignment.ids(), assignment.num_clusters(), |x| {
        column_mean(x)
    });
    Ok(ExpressionByCluster {
        means,
        markers: subset.names.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (ExpressionMatrix, ClusterAssignment, MetaclusterMap) {
        // 5 cells x 3 channels
        let data = Mat::from_row_slice(
            5,
            3,
            &[
                1.0, 10.0, 0.0, //
                3.0, 20.0, 0.0, //
                5.0, 30.0, 1.0, //
                7.0, 40.0, 1.0, //
                9.0, 50.0, 1.0, //
            ],
        );
        let channels = vec!["CD3".into(), "CD4".into(), "Time".into()];
        let xx = ExpressionMatrix::new(data, None, channels, &[]).unwrap();
        let clusters = ClusterAssignment::new(vec![1, 1, 2, 3, 3], 4).unwrap();
        let map = MetaclusterMap::new(vec![1, 2, 2, 1], 2, 1.0).unwrap();
        (xx, clusters, map)
    }

    #[test]
    fn test_frequencies_sum_to_100() {
        let (_, clusters, map) = toy();
        let freq = frequencies(&clusters, &map).unwrap();

        assert_eq!(freq.cluster.len(), 4);
        assert_eq!(freq.cluster[&4], 0.0);
        approx::assert_abs_diff_eq!(freq.cluster[&1], 40.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(freq.metacluster[&2], 60.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(freq.cluster.values().sum::<f64>(), 100.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(
            freq.metacluster.values().sum::<f64>(),
            100.0,
            epsilon = 1e-6
        );
        assert_eq!(freq.metacluster_counts[&1], 2);
    }

    #[test]
    fn test_mean_expression() {
        let (xx, clusters, map) = toy();
        let subset = MarkerSubset::from_indices(xx.markers(), &[0, 1]).unwrap();
        let means = mean_expression(&xx, &subset, &clusters, &map).unwrap();

        // metacluster 1 = cells 0, 1 (cluster 1); metacluster 2 = cells 2, 3, 4
        assert_eq!(means.values().shape(), (2, 2));
        approx::assert_abs_diff_eq!(means.get(1, 0).unwrap(), 2.0);
        approx::assert_abs_diff_eq!(means.get(1, 1).unwrap(), 15.0);
        approx::assert_abs_diff_eq!(means.get(2, 0).unwrap(), 7.0);
        approx::assert_abs_diff_eq!(means.get(2, 1).unwrap(), 40.0);
        assert_eq!(means.get(3, 0), None);
        assert_eq!(means.markers()[1].as_ref(), "CD4");
    }

    #[test]
    fn test_median_expression() {
        let (xx, clusters, map) = toy();
        let subset = MarkerSubset::from_indices(xx.markers(), &[0]).unwrap();
        let medians = median_expression(&xx, &subset, &clusters, &map).unwrap();
        approx::assert_abs_diff_eq!(medians.get(1, 0).unwrap(), 2.0);
        approx::assert_abs_diff_eq!(medians.get(2, 0).unwrap(), 7.0);
    }

    #[test]
    fn test_empty_metacluster_is_an_error() {
        let (xx, _, _) = toy();
        // cluster 4 has no cells and is alone in metacluster 2
        let clusters = ClusterAssignment::new(vec![1, 1, 2, 3, 3], 4).unwrap();
        let map = MetaclusterMap::new(vec![1, 1, 1, 2], 2, 1.0).unwrap();
        let subset = MarkerSubset::all(xx.markers());

        assert_eq!(
            mean_expression(&xx, &subset, &clusters, &map).unwrap_err(),
            LupinError::EmptyMetacluster { id: 2 }
        );
        // frequencies are still available
        let freq = frequencies(&clusters, &map).unwrap();
        assert_eq!(freq.metacluster[&2], 0.0);
    }

    #[test]
    fn test_cluster_means_allow_empty_nodes() {
        let (xx, clusters, _) = toy();
        let subset = MarkerSubset::from_indices(xx.markers(), &[2]).unwrap();
        let by_node = cluster_mean_expression(&xx, &subset, &clusters).unwrap();
        assert_eq!(by_node.means.len(), 4);
        assert_eq!(by_node.means[0], Some(vec![0.0]));
        assert_eq!(by_node.means[2], Some(vec![1.0]));
        assert_eq!(by_node.means[3], None);
        assert_eq!(by_node.num_clusters(), 4);
        assert_eq!(by_node.num_empty(), 1);

        let values = by_node.to_mat();
        assert_eq!(values.shape(), (4, 1));
        approx::assert_abs_diff_eq!(values[(2, 0)], 1.0);
        assert!(values[(3, 0)].is_nan());
    }

    #[test]
    fn test_length_mismatch() {
        let (xx, _, map) = toy();
        let clusters = ClusterAssignment::new(vec![1, 2, 3, 4], 4).unwrap();
        let subset = MarkerSubset::all(xx.markers());
        assert!(matches!(
            mean_expression(&xx, &subset, &clusters, &map),
            Err(LupinError::EmptyInput(_))
        ));
    }
}
