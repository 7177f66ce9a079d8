//! Merge SOM nodes into metaclusters
//!
//! Prototypes are clustered hierarchically and the tree is cut into a
//! requested number of groups. Without a requested number, the count
//! is taken at the elbow of the within-metacluster sum of squares.

use crate::assignment::{ClusterAssignment, MetaclusterMap};
use crate::common::*;
use crate::dendrogram::Dendrogram;
use crate::error::{LupinError, Result};
use crate::som::SomGrid;

use matrix_util::dmatrix_util::sample_indices;
use matrix_util::traits::DistanceOps;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeMethod {
    /// UPGMA over Euclidean distances between prototypes
    Average,
    /// UPGMA over `1 - M`, where `M[i][j]` is how often nodes `i` and
    /// `j` end up together when a random `p_item` fraction of the
    /// prototypes is clustered, over `reps` resamplings
    Consensus { reps: usize, p_item: f64 },
}

impl MergeMethod {
    pub fn consensus() -> Self {
        MergeMethod::Consensus {
            reps: 100,
            p_item: 0.9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeArgs {
    /// Number of metaclusters; chosen automatically if `None`
    pub n_clus: Option<usize>,
    /// Upper bound for the automatic choice
    pub max_clus: usize,
    pub method: MergeMethod,
    pub seed: u64,
}

impl Default for MergeArgs {
    fn default() -> Self {
        Self {
            n_clus: None,
            max_clus: 20,
            method: MergeMethod::Average,
            seed: DEFAULT_SEED,
        }
    }
}

impl MergeArgs {
    pub fn with_n_clus(n_clus: usize) -> Self {
        Self {
            n_clus: Some(n_clus),
            ..Default::default()
        }
    }

    /// Check the arguments against a grid with `num_nodes` nodes
    pub fn validate(&self, num_nodes: usize) -> Result<()> {
        match self.n_clus {
            Some(0) => {
                return Err(LupinError::InvalidConfiguration(
                    "requested 0 metaclusters".into(),
                ));
            }
            Some(k) if k > num_nodes => {
                return Err(LupinError::InvalidConfiguration(format!(
                    "requested {} metaclusters but grid has only {} nodes",
                    k, num_nodes
                )));
            }
            None if self.max_clus == 0 => {
                return Err(LupinError::InvalidConfiguration(
                    "max_clus must be positive, got 0".into(),
                ));
            }
            _ => {}
        }

        if let MergeMethod::Consensus { reps, p_item } = self.method {
            if reps == 0 {
                return Err(LupinError::InvalidConfiguration(
                    "consensus needs at least one resampling, got 0".into(),
                ));
            }
            if !(p_item > 0.0 && p_item <= 1.0) {
                return Err(LupinError::InvalidConfiguration(format!(
                    "consensus item fraction must be in (0, 1], got {}",
                    p_item
                )));
            }
            let nsub = consensus_sample_size(num_nodes, p_item);
            if let Some(k) = self.n_clus {
                if k > nsub {
                    return Err(LupinError::InvalidConfiguration(format!(
                        "consensus resamples {} of {} nodes and cannot form {} metaclusters; \
                         lower nClus to at most {} or raise p_item",
                        nsub, num_nodes, k, nsub
                    )));
                }
            }
        }
        Ok(())
    }

    /// Largest count the automatic choice may return
    fn max_auto_count(&self, num_nodes: usize) -> usize {
        match self.method {
            MergeMethod::Average => self.max_clus,
            MergeMethod::Consensus { p_item, .. } => {
                self.max_clus.min(consensus_sample_size(num_nodes, p_item))
            }
        }
    }
}

/// Number of nodes drawn in each consensus resampling
fn consensus_sample_size(num_nodes: usize, p_item: f64) -> usize {
    ((p_item * num_nodes as f64).ceil() as usize).clamp(1, num_nodes.max(1))
}

/// Group the nodes of `grid` into metaclusters.
///
/// `assignment` must come from the same grid. Metacluster ids are
/// numbered by first appearance in node order.
pub fn merge(
    grid: &SomGrid,
    assignment: &ClusterAssignment,
    args: &MergeArgs,
) -> Result<MetaclusterMap> {
    let nodes = grid.num_nodes();
    args.validate(nodes)?;

    if assignment.num_clusters() != nodes {
        return Err(LupinError::InvalidConfiguration(format!(
            "assignment refers to {} clusters but grid has {} nodes",
            assignment.num_clusters(),
            nodes
        )));
    }

    let dist = prototype_distances(grid.codes());
    let average = Dendrogram::average_linkage(&dist)?;

    let k = match args.n_clus {
        Some(k) => k,
        None => {
            let k = suggest_num_metaclusters(grid, &average, args.max_auto_count(nodes))?;
            info!("Elbow of the within-metacluster sum of squares at {}", k);
            k
        }
    };

    let tree = match args.method {
        MergeMethod::Average => average,
        MergeMethod::Consensus { reps, p_item } => {
            consensus_tree(&dist, k, reps, p_item, args.seed)?
        }
    };

    let (labels, cut_height) = tree.cut(k)?;

    info!(
        "Merged {} SOM nodes into {} metaclusters, cut height {:.4}",
        nodes, k, cut_height
    );

    MetaclusterMap::new(labels, k, cut_height)
}

fn prototype_distances(codes: &Mat) -> Vec<Vec<f64>> {
    codes
        .pairwise_column_distances()
        .into_iter()
        .map(|row| row.into_iter().map(|d| d as f64).collect())
        .collect()
}

/// Sum over groups of squared distances between prototypes and their
/// group centroid
pub fn within_sum_of_squares(codes: &Mat, labels: &[usize], num_groups: usize) -> f64 {
    let dd = codes.nrows();
    let mut sums = vec![vec![0_f64; dd]; num_groups];
    let mut counts = vec![0_usize; num_groups];

    for (j, &g) in labels.iter().enumerate() {
        counts[g - 1] += 1;
        for (s, &x) in sums[g - 1].iter_mut().zip(codes.column_values(j)) {
            *s += x as f64;
        }
    }

    labels
        .iter()
        .enumerate()
        .map(|(j, &g)| {
            let n = counts[g - 1] as f64;
            codes
                .column_values(j)
                .iter()
                .zip(sums[g - 1].iter())
                .map(|(&x, &s)| {
                    let d = x as f64 - s / n;
                    d * d
                })
                .sum::<f64>()
        })
        .sum()
}

/// Pick the metacluster count at the elbow of the WCSS curve.
///
/// Every count in `[1, min(max_clus, nodes)]` that the tree can be cut
/// into is scored; counts that fall on tied merge heights are skipped.
pub fn suggest_num_metaclusters(
    grid: &SomGrid,
    tree: &Dendrogram,
    max_clus: usize,
) -> Result<usize> {
    let kmax = max_clus.min(grid.num_nodes());

    let mut curve = Vec::with_capacity(kmax);
    for k in 1..=kmax {
        match tree.cut(k) {
            Ok((labels, _)) => {
                curve.push((k, within_sum_of_squares(grid.codes(), &labels, k)));
            }
            Err(LupinError::MergeInfeasible { .. }) => {
                warn!("{} metaclusters fall on tied merge heights; skipped", k);
            }
            Err(e) => return Err(e),
        }
    }

    elbow(&curve).ok_or(LupinError::InvalidConfiguration(format!(
        "no metacluster count in [1, {}] can be cut from the tree",
        kmax
    )))
}

/// The point of a decreasing `(k, wcss)` curve farthest below the
/// chord between its end points, after scaling both axes to `[0, 1]`.
/// Ties go to the smallest `k`.
pub fn elbow(curve: &[(usize, f64)]) -> Option<usize> {
    let &(k0, w0) = curve.first()?;
    let &(k1, w1) = curve.last()?;

    if k1 == k0 || w0 <= w1 {
        return Some(k0);
    }

    let xs = (k1 - k0) as f64;
    let ys = w0 - w1;

    let mut best = (k0, 0_f64);
    for &(k, w) in curve {
        let x = (k - k0) as f64 / xs;
        let y = (w - w1) / ys;
        let gap = 1.0 - x - y;
        if gap > best.1 {
            best = (k, gap);
        }
    }
    Some(best.0)
}

/// UPGMA over the consensus distance `1 - M`
fn consensus_tree(
    dist: &[Vec<f64>],
    k: usize,
    reps: usize,
    p_item: f64,
    seed: u64,
) -> Result<Dendrogram> {
    let nn = dist.len();
    let nsub = consensus_sample_size(nn, p_item);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut together = vec![vec![0_usize; nn]; nn];
    let mut sampled = vec![vec![0_usize; nn]; nn];
    let mut used = 0;

    for _ in 0..reps {
        let mut items = sample_indices(nn, nsub, &mut rng);
        items.sort_unstable();

        let sub: Vec<Vec<f64>> = items
            .iter()
            .map(|&a| items.iter().map(|&b| dist[a][b]).collect())
            .collect();

        let labels = match Dendrogram::average_linkage(&sub)?.cut(k) {
            Ok((labels, _)) => labels,
            Err(LupinError::MergeInfeasible { .. }) => continue,
            Err(e) => return Err(e),
        };
        used += 1;

        for (a, &ia) in items.iter().enumerate() {
            for (b, &ib) in items.iter().enumerate() {
                sampled[ia][ib] += 1;
                if labels[a] == labels[b] {
                    together[ia][ib] += 1;
                }
            }
        }
    }

    if used == 0 {
        return Err(LupinError::InvalidConfiguration(format!(
            "none of {} resamplings of {} nodes could be cut into {} groups",
            reps, nsub, k
        )));
    }
    info!("Consensus over {} of {} resamplings", used, reps);

    let consensus_dist: Vec<Vec<f64>> = (0..nn)
        .map(|i| {
            (0..nn)
                .map(|j| match (i == j, sampled[i][j]) {
                    (true, _) => 0.0,
                    (false, 0) => 1.0,
                    (false, s) => 1.0 - together[i][j] as f64 / s as f64,
                })
                .collect()
        })
        .collect();

    Dendrogram::average_linkage(&consensus_dist)
}
