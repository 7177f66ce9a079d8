//! Self-organizing map over marker space
//!
//! A classic online SOM: prototypes sit on an `xdim x ydim` grid, each
//! presented cell pulls its best-matching unit and the grid neighbours
//! of that unit toward itself. Learning rate and neighbourhood radius
//! shrink linearly over a fixed number of epochs; there is no
//! convergence test.

use crate::assignment::ClusterAssignment;
use crate::common::*;
use crate::error::{LupinError, Result};
use crate::expression::ExpressionMatrix;
use crate::markers::MarkerSubset;

use indicatif::{ProgressBar, ProgressDrawTarget};
use matrix_util::dmatrix_util::sample_indices;
use matrix_util::traits::DistanceOps;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

/// Quantile of the grid distances used as the starting radius
const RADIUS_QUANTILE: f32 = 0.67;

/// Arguments for SOM training
#[derive(Debug, Clone)]
pub struct SomArgs {
    /// Grid width
    pub xdim: usize,
    /// Grid height
    pub ydim: usize,
    /// Number of passes over the training cells
    pub rlen: usize,
    /// Learning rate at the first and the last step
    pub alpha: (f32, f32),
    /// Neighbourhood radius (in grid steps) at the first and the last
    /// step; `None` starts at the 0.67 quantile of all grid distances
    /// and ends at 0
    pub radius: Option<(f32, f32)>,
    /// Random seed for initialization, training order and subsampling
    pub seed: u64,
    /// Train on at most this many randomly chosen cells
    pub max_train_cells: Option<usize>,
    pub show_progress: bool,
}

impl Default for SomArgs {
    fn default() -> Self {
        Self {
            xdim: 10,
            ydim: 10,
            rlen: 10,
            alpha: (0.05, 0.01),
            radius: None,
            seed: DEFAULT_SEED,
            max_train_cells: None,
            show_progress: false,
        }
    }
}

impl SomArgs {
    /// Create args with a specified grid
    pub fn with_grid(xdim: usize, ydim: usize) -> Self {
        Self {
            xdim,
            ydim,
            ..Default::default()
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.xdim * self.ydim
    }

    pub fn validate(&self) -> Result<()> {
        if self.xdim == 0 || self.ydim == 0 {
            return Err(LupinError::InvalidConfiguration(format!(
                "grid dimensions must be positive, got {} x {}",
                self.xdim, self.ydim
            )));
        }
        if self.rlen == 0 {
            return Err(LupinError::InvalidConfiguration(
                "number of training epochs (rlen) must be positive, got 0".into(),
            ));
        }
        let (a0, a1) = self.alpha;
        if !(a0.is_finite() && a1.is_finite()) || a0 < a1 || a1 < 0.0 || a0 > 1.0 {
            return Err(LupinError::InvalidConfiguration(format!(
                "learning rate must decrease within [0, 1], got ({}, {})",
                a0, a1
            )));
        }
        if let Some((r0, r1)) = self.radius {
            if !(r0.is_finite() && r1.is_finite()) || r0 < r1 || r1 < 0.0 {
                return Err(LupinError::InvalidConfiguration(format!(
                    "radius must decrease and stay non-negative, got ({}, {})",
                    r0, r1
                )));
            }
        }
        if self.max_train_cells == Some(0) {
            return Err(LupinError::InvalidConfiguration(
                "max_train_cells must be positive, got 0".into(),
            ));
        }
        Ok(())
    }
}

/// A trained grid of prototypes
#[derive(Debug, Clone)]
pub struct SomGrid {
    xdim: usize,
    ydim: usize,
    /// `|subset| x nodes`; column `k` is the prototype of node `k`
    codes: Mat,
    subset: MarkerSubset,
}

impl SomGrid {
    /// Wrap given prototypes as a grid without training; `map_rows`
    /// then assigns cells to them.
    ///
    /// * `codes` - `|subset| x (xdim * ydim)`, one column per node
    pub fn from_codes(xdim: usize, ydim: usize, codes: Mat, subset: MarkerSubset) -> Result<Self> {
        if xdim == 0 || ydim == 0 {
            return Err(LupinError::InvalidConfiguration(format!(
                "grid dimensions must be positive, got {} x {}",
                xdim, ydim
            )));
        }
        if codes.ncols() != xdim * ydim || codes.nrows() != subset.len() {
            return Err(LupinError::InvalidConfiguration(format!(
                "codes are {} x {}, expected {} x {}",
                codes.nrows(),
                codes.ncols(),
                subset.len(),
                xdim * ydim
            )));
        }
        Ok(Self {
            xdim,
            ydim,
            codes,
            subset,
        })
    }

    pub fn xdim(&self) -> usize {
        self.xdim
    }

    pub fn ydim(&self) -> usize {
        self.ydim
    }

    pub fn num_nodes(&self) -> usize {
        self.xdim * self.ydim
    }

    /// Dimension of the prototypes, `|subset|`
    pub fn dim(&self) -> usize {
        self.codes.nrows()
    }

    pub fn subset(&self) -> &MarkerSubset {
        &self.subset
    }

    /// Prototype of node `k` (0-based)
    pub fn prototype(&self, k: usize) -> &[f32] {
        self.codes.column_values(k)
    }

    /// Prototypes as columns, `|subset| x nodes`
    pub fn codes(&self) -> &Mat {
        &self.codes
    }

    /// Prototypes as rows, `nodes x |subset|`
    pub fn codes_by_node(&self) -> Mat {
        self.codes.transpose()
    }

    /// Grid coordinate `(x, y)` of node `k` (0-based)
    pub fn grid_position(&self, k: usize) -> (usize, usize) {
        (k % self.xdim, k / self.xdim)
    }

    /// Chebyshev distance between two nodes on the grid
    pub fn grid_distance(&self, a: usize, b: usize) -> f32 {
        let (ax, ay) = self.grid_position(a);
        let (bx, by) = self.grid_position(b);
        ax.abs_diff(bx).max(ay.abs_diff(by)) as f32
    }

    /// Assign every cell of `matrix` to its nearest prototype
    pub fn map_rows(&self, matrix: &ExpressionMatrix) -> Result<ClusterAssignment> {
        let xx_t = self.cells_as_columns(matrix)?;
        let bmu = self.best_matching_units(&xx_t)?;
        ClusterAssignment::new(bmu.into_iter().map(|(k, _)| k + 1).collect(), self.num_nodes())
    }

    /// Mean Euclidean distance between cells and their best-matching
    /// prototypes
    pub fn quantization_error(&self, matrix: &ExpressionMatrix) -> Result<f32> {
        let xx_t = self.cells_as_columns(matrix)?;
        let bmu = self.best_matching_units(&xx_t)?;
        Ok(mean_distance(&bmu))
    }

    fn cells_as_columns(&self, matrix: &ExpressionMatrix) -> Result<Mat> {
        if matrix.nrows() == 0 {
            return Err(LupinError::EmptyInput("expression matrix has 0 cells".into()));
        }
        Ok(matrix.subset_data(&self.subset)?.transpose())
    }

    /// Nearest node (0-based) and squared distance for every column
    /// of `xx_t`; parallel over cells
    fn best_matching_units(&self, xx_t: &Mat) -> Result<Vec<(usize, f32)>> {
        (0..xx_t.ncols())
            .into_par_iter()
            .map(|i| self.codes.nearest_column(xx_t.column_values(i)))
            .collect::<Option<Vec<_>>>()
            .ok_or(LupinError::EmptyInput("SOM grid has no prototypes".into()))
    }
}

fn mean_distance(bmu: &[(usize, f32)]) -> f32 {
    if bmu.is_empty() {
        return 0.0;
    }
    bmu.iter().map(|&(_, d)| (d as f64).sqrt()).sum::<f64>() as f32 / bmu.len() as f32
}

/// Linearly interpolated (type 7) quantile of a sorted vector
fn quantile_sorted(sorted: &[f32], q: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let h = (sorted.len() - 1) as f32 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f32) * (sorted[hi] - sorted[lo])
}

/// All-pairs grid distances, `nodes x nodes`
fn grid_distances(grid: &SomGrid) -> Vec<Vec<f32>> {
    let nn = grid.num_nodes();
    (0..nn)
        .map(|a| (0..nn).map(|b| grid.grid_distance(a, b)).collect())
        .collect()
}

fn default_radius(dist: &[Vec<f32>]) -> (f32, f32) {
    let mut all: Vec<f32> = dist.iter().flatten().copied().collect();
    all.sort_by(|a, b| a.total_cmp(b));
    (quantile_sorted(&all, RADIUS_QUANTILE), 0.0)
}

/// Everything `train` needs before touching the data
pub fn check_training_input(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    args: &SomArgs,
) -> Result<()> {
    if matrix.nrows() == 0 {
        return Err(LupinError::EmptyInput("expression matrix has 0 cells".into()));
    }
    if subset.is_empty() {
        return Err(LupinError::EmptyInput("marker subset selects 0 columns".into()));
    }
    subset.check_bounds(matrix.ncols())?;
    args.validate()
}

/// Train a SOM on the `subset` columns of `matrix` and assign every
/// cell to its nearest prototype.
///
/// Returns the trained grid and 1-based cluster ids, one per cell.
/// The same input and `args` (including the seed) give identical
/// results.
pub fn train(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    args: &SomArgs,
) -> Result<(SomGrid, ClusterAssignment)> {
    check_training_input(matrix, subset, args)?;

    let mut rng = StdRng::seed_from_u64(args.seed);

    // d x n, one contiguous column per cell
    let xx_t = matrix.subset_data(subset)?.transpose();
    let ncells = xx_t.ncols();
    let dd = xx_t.nrows();

    let mut train_cells: Vec<usize> = match args.max_train_cells {
        Some(m) if m < ncells => {
            let mut idx = sample_indices(ncells, m, &mut rng);
            idx.sort_unstable();
            idx
        }
        _ => (0..ncells).collect(),
    };
    let ntrain = train_cells.len();

    let nodes = args.num_nodes();
    let init = sample_indices(ntrain, nodes, &mut rng);
    let mut codes = Mat::zeros(dd, nodes);
    for (k, &t) in init.iter().enumerate() {
        codes
            .column_mut(k)
            .copy_from_slice(xx_t.column_values(train_cells[t]));
    }

    let mut grid = SomGrid {
        xdim: args.xdim,
        ydim: args.ydim,
        codes,
        subset: subset.clone(),
    };

    let dist = grid_distances(&grid);
    let (r0, r1) = args.radius.unwrap_or_else(|| default_radius(&dist));
    let (a0, a1) = args.alpha;

    info!(
        "SOM: {} x {} grid, {} training cells (of {}) x {} markers, {} epochs",
        args.xdim, args.ydim, ntrain, ncells, dd, args.rlen
    );
    info!("SOM: alpha {}..{}, radius {}..{}", a0, a1, r0, r1);

    let pb = ProgressBar::new(args.rlen as u64);
    if !args.show_progress {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let nsteps = args.rlen * ntrain;
    let denom = nsteps.saturating_sub(1).max(1) as f32;
    let mut step = 0_usize;

    for _epoch in 0..args.rlen {
        train_cells.shuffle(&mut rng);

        for &i in train_cells.iter() {
            let frac = step as f32 / denom;
            let alpha = a0 - (a0 - a1) * frac;
            let radius = r0 - (r0 - r1) * frac;

            let x = xx_t.column_values(i);
            let (bmu, _) = grid
                .codes
                .nearest_column(x)
                .ok_or(LupinError::EmptyInput("SOM grid has no prototypes".into()))?;

            let codes = grid.codes.as_mut_slice();
            for (k, &gd) in dist[bmu].iter().enumerate() {
                if gd <= radius {
                    for (c, &xj) in codes[(k * dd)..((k + 1) * dd)].iter_mut().zip(x) {
                        *c += alpha * (xj - *c);
                    }
                }
            }
            step += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let bmu = grid.best_matching_units(&xx_t)?;
    info!("SOM quantization error: {:.4}", mean_distance(&bmu));

    let assignment =
        ClusterAssignment::new(bmu.into_iter().map(|(k, _)| k + 1).collect(), nodes)?;

    Ok((grid, assignment))
}
