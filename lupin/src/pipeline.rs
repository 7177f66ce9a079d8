//! Train, merge and summarize in one call

use crate::aggregate::*;
use crate::assignment::CellAssignments;
use crate::common::*;
use crate::error::Result;
use crate::expression::ExpressionMatrix;
use crate::markers::MarkerSubset;
use crate::metacluster::{merge, MergeArgs};
use crate::som::{check_training_input, train, SomArgs, SomGrid};

#[derive(Debug, Clone, Default)]
pub struct PipelineArgs {
    pub som: SomArgs,
    pub merge: MergeArgs,
}

impl PipelineArgs {
    pub fn new(xdim: usize, ydim: usize, n_clus: Option<usize>, seed: u64) -> Self {
        Self {
            som: SomArgs {
                seed,
                ..SomArgs::with_grid(xdim, ydim)
            },
            merge: MergeArgs {
                n_clus,
                seed,
                ..Default::default()
            },
        }
    }
}

/// Everything one run produces
#[derive(Debug)]
pub struct PipelineOutput {
    pub grid: SomGrid,
    pub cells: CellAssignments,
    pub quantization_error: f32,
    pub frequencies: Frequencies,
    /// Summaries fail on an empty metacluster without discarding the
    /// assignments above
    pub mean_expression: Result<ExpressionByMetacluster>,
    pub median_expression: Result<ExpressionByMetacluster>,
    /// Mean per SOM node; empty nodes are `None`
    pub node_expression: ExpressionByCluster,
}

/// SOM training, metacluster merging and aggregation.
///
/// Every argument is checked before the SOM is trained, including the
/// requested number of metaclusters against the grid size.
pub fn run_pipeline(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    args: &PipelineArgs,
) -> Result<PipelineOutput> {
    check_training_input(matrix, subset, &args.som)?;
    args.merge.validate(args.som.num_nodes())?;

    let (grid, clusters) = train(matrix, subset, &args.som)?;
    let quantization_error = grid.quantization_error(matrix)?;

    let map = merge(&grid, &clusters, &args.merge)?;
    let cells = CellAssignments::new(clusters, map)?;

    info!("\n{}", cells.histogram_ascii(40, 20));

    let frequencies = frequencies(cells.clusters(), cells.metaclusters())?;
    let mean_expression = mean_expression(matrix, subset, cells.clusters(), cells.metaclusters());
    let median_expression =
        median_expression(matrix, subset, cells.clusters(), cells.metaclusters());

    let node_expression = cluster_mean_expression(matrix, subset, cells.clusters())?;

    if let Err(e) = &mean_expression {
        warn!("mean expression not available: {}", e);
    }

    Ok(PipelineOutput {
        grid,
        cells,
        quantization_error,
        frequencies,
        mean_expression,
        median_expression,
        node_expression,
    })
}
