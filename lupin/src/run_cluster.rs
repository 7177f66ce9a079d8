use clap::Args;
use lupin::aggregate::{ExpressionByCluster, ExpressionByMetacluster, Frequencies};
use lupin::common::*;
use lupin::expression::ExpressionMatrix;
use lupin::markers::{select_markers, MarkerSubset, DEFAULT_SURFACE_PATTERNS};
use lupin::metacluster::{MergeArgs, MergeMethod};
use lupin::pipeline::{run_pipeline, PipelineArgs, PipelineOutput};
use lupin::som::SomArgs;

use matrix_util::common_io::{mkdir, write_lines};
use matrix_util::traits::IoOps;
use rayon::ThreadPoolBuilder;
use std::collections::BTreeMap;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Expression table (cells x channels): .tsv/.csv[.gz] with channel
    /// names on the first line, or .parquet with cell names in the
    /// first column
    data_file: Box<str>,

    #[arg(
        long,
        short = 'm',
        help = "Marker description file (channel <TAB> marker)",
        long_help = "Two-column table mapping channel identifiers to marker names.\n\
		     Channels not listed keep their identifier as the marker name."
    )]
    markers: Option<Box<str>>,

    #[arg(
        long,
        short = 'p',
        value_delimiter = ',',
        help = "Marker name patterns selecting the clustering markers",
        long_help = "Comma-separated substrings; a marker is used for clustering\n\
		     if its name contains any of them (case-sensitive).\n\
		     Default: CD,Ig,HLA,CCR,CXC (surface markers)"
    )]
    patterns: Option<Vec<Box<str>>>,

    #[arg(long, default_value_t = DEFAULT_COFACTOR, help = "asinh cofactor")]
    cofactor: f32,

    #[arg(long, default_value_t = false, help = "Skip the asinh transform")]
    no_transform: bool,

    #[arg(long, default_value_t = 10, help = "SOM grid width")]
    xdim: usize,

    #[arg(long, default_value_t = 10, help = "SOM grid height")]
    ydim: usize,

    #[arg(long, default_value_t = 10, help = "Number of SOM training epochs")]
    rlen: usize,

    #[arg(
        long,
        short = 'k',
        help = "Number of metaclusters",
        long_help = "Number of metaclusters; at most xdim * ydim.\n\
		     If not given, chosen in [1, --max-clus] at the elbow of\n\
		     the within-metacluster sum of squares."
    )]
    nclus: Option<usize>,

    #[arg(
        long,
        default_value_t = 20,
        help = "Largest number of metaclusters considered when --nclus is not set"
    )]
    max_clus: usize,

    #[arg(long, default_value_t = false, help = "Merge by consensus clustering")]
    consensus: bool,

    #[arg(long, default_value_t = 100, help = "Consensus resamplings")]
    reps: usize,

    #[arg(
        long,
        default_value_t = 0.9,
        help = "Fraction of SOM nodes drawn in each consensus resampling"
    )]
    p_item: f64,

    #[arg(long, help = "Train the SOM on at most this many random cells")]
    max_train_cells: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_SEED, help = "Random seed")]
    seed: u64,

    #[arg(
        long,
        default_value_t = 16,
        help = "Maximum number of threads",
        long_help = "Maximum number of threads to use for parallel processing. \n\
		     Choose the right number in HPC environments."
    )]
    max_threads: usize,

    #[arg(
        long,
        short = 'o',
        required = true,
        help = "Output file prefix",
        long_help = "Output file prefix.\n\n\
		     Generates:\n\
		     - {out}.cells.tsv.gz: cluster and metacluster of each cell\n\
		     - {out}.codes.tsv.gz: SOM prototypes (node x marker)\n\
		     - {out}.metaclusters.tsv.gz: SOM node -> metacluster\n\
		     - {out}.frequency.tsv.gz: cell counts and percentages\n\
		     - {out}.expression.tsv.gz: mean marker expression per metacluster\n\
		     - {out}.median.tsv.gz: median marker expression per metacluster\n\
		     - {out}.node_expression.tsv.gz: mean marker expression per SOM node\n\
		     - {out}.summary.json: parameters and results"
    )]
    out: Box<str>,

    #[arg(long, default_value_t = false, help = "Write matrices as .parquet")]
    parquet: bool,

    #[arg(long, short, help = "Verbose output")]
    verbose: bool,
}

impl RunArgs {
    fn pipeline_args(&self) -> PipelineArgs {
        PipelineArgs {
            som: SomArgs {
                xdim: self.xdim,
                ydim: self.ydim,
                rlen: self.rlen,
                seed: self.seed,
                max_train_cells: self.max_train_cells,
                show_progress: self.verbose,
                ..Default::default()
            },
            merge: MergeArgs {
                n_clus: self.nclus,
                max_clus: self.max_clus,
                method: if self.consensus {
                    MergeMethod::Consensus {
                        reps: self.reps,
                        p_item: self.p_item,
                    }
                } else {
                    MergeMethod::Average
                },
                seed: self.seed,
            },
        }
    }

    fn matrix_ext(&self) -> &'static str {
        if self.parquet {
            "parquet"
        } else {
            "tsv.gz"
        }
    }
}

/// Selected clustering markers, by the given or the default patterns
pub fn marker_subset(matrix: &ExpressionMatrix, patterns: Option<&[Box<str>]>) -> MarkerSubset {
    match patterns {
        Some(patterns) => select_markers(matrix.markers(), patterns),
        None => select_markers(matrix.markers(), &DEFAULT_SURFACE_PATTERNS),
    }
}

pub fn run_cluster(args: &RunArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let max_threads = num_cpus::get().min(args.max_threads).max(1);
    ThreadPoolBuilder::new()
        .num_threads(max_threads)
        .build_global()?;
    info!("will use {} threads", rayon::current_num_threads());

    mkdir(&args.out)?;

    let mut matrix = ExpressionMatrix::from_file(&args.data_file, args.markers.as_deref())?;

    if args.no_transform {
        info!("Skipping the asinh transform");
    } else {
        matrix.arcsinh_inplace(args.cofactor)?;
        info!("asinh transform with cofactor {}", args.cofactor);
    }

    let subset = marker_subset(&matrix, args.patterns.as_deref());
    info!(
        "Clustering on {} of {} markers: {}",
        subset.len(),
        matrix.ncols(),
        subset.names.join(",")
    );

    let output = run_pipeline(&matrix, &subset, &args.pipeline_args())?;

    write_cells(&matrix, &output, args)?;
    write_codes(&output, args)?;
    write_metaclusters(&output, args)?;
    write_frequencies(&output.frequencies, &args.out)?;

    let ext = args.matrix_ext();
    match &output.mean_expression {
        Ok(means) => write_expression(means, &format!("{}.expression.{}", args.out, ext))?,
        Err(e) => warn!("no mean expression table: {}", e),
    }
    match &output.median_expression {
        Ok(medians) => write_expression(medians, &format!("{}.median.{}", args.out, ext))?,
        Err(e) => warn!("no median expression table: {}", e),
    }
    write_node_expression(
        &output.node_expression,
        &format!("{}.node_expression.{}", args.out, ext),
    )?;

    write_summary(&matrix, &subset, &output, args)?;

    info!("Done");
    Ok(())
}

fn write_cells(
    matrix: &ExpressionMatrix,
    output: &PipelineOutput,
    args: &RunArgs,
) -> anyhow::Result<()> {
    let cells = &output.cells;
    let file = format!("{}.cells.{}", args.out, args.matrix_ext());

    if args.parquet {
        let mut ids = Mat::zeros(cells.num_cells(), 2);
        for (i, (&k, &m)) in cells
            .clusters()
            .ids()
            .iter()
            .zip(cells.cell_metaclusters())
            .enumerate()
        {
            ids[(i, 0)] = k as f32;
            ids[(i, 1)] = m as f32;
        }
        let cols: Vec<Box<str>> = vec!["cluster".into(), "metacluster".into()];
        ids.to_parquet_with_names(&file, (Some(matrix.cells()), Some(cols.as_slice())), "cell")?;
    } else {
        let mut lines: Vec<Box<str>> = Vec::with_capacity(cells.num_cells() + 1);
        lines.push("cell\tcluster\tmetacluster".into());
        for (i, name) in matrix.cells().iter().enumerate() {
            if let Some((k, m)) = cells.cell(i) {
                lines.push(format!("{}\t{}\t{}", name, k, m).into_boxed_str());
            }
        }
        write_lines(&lines, &file)?;
    }
    info!("Wrote {}", file);
    Ok(())
}

fn write_codes(output: &PipelineOutput, args: &RunArgs) -> anyhow::Result<()> {
    let grid = &output.grid;
    let file = format!("{}.codes.{}", args.out, args.matrix_ext());
    let nodes: Vec<Box<str>> = (1..=grid.num_nodes())
        .map(|k| k.to_string().into_boxed_str())
        .collect();
    let names = (Some(nodes.as_slice()), Some(grid.subset().names.as_slice()));

    let codes = grid.codes_by_node();
    if args.parquet {
        codes.to_parquet_with_names(&file, names, "node")?;
    } else {
        codes.to_tsv_with_names(&file, names, "node")?;
    }
    info!("Wrote {}", file);
    Ok(())
}

fn write_metaclusters(output: &PipelineOutput, args: &RunArgs) -> anyhow::Result<()> {
    let grid = &output.grid;
    let map = output.cells.metaclusters();
    let file = format!("{}.metaclusters.tsv.gz", args.out);

    let mut lines: Vec<Box<str>> = vec!["node\tx\ty\tmetacluster".into()];
    for (k, &m) in map.as_slice().iter().enumerate() {
        let (x, y) = grid.grid_position(k);
        lines.push(format!("{}\t{}\t{}\t{}", k + 1, x + 1, y + 1, m).into_boxed_str());
    }
    write_lines(&lines, &file)?;
    info!("Wrote {}", file);
    Ok(())
}

fn write_frequencies(freq: &Frequencies, out: &str) -> anyhow::Result<()> {
    let file = format!("{}.frequency.tsv.gz", out);

    let mut lines: Vec<Box<str>> = vec!["id\tlevel\tcount\tpercent".into()];
    for (level, counts, pct) in [
        ("cluster", &freq.cluster_counts, &freq.cluster),
        ("metacluster", &freq.metacluster_counts, &freq.metacluster),
    ] {
        for (id, n) in counts.iter() {
            let p = pct.get(id).copied().unwrap_or(0.0);
            lines.push(format!("{}\t{}\t{}\t{}", id, level, n, p).into_boxed_str());
        }
    }
    write_lines(&lines, &file)?;
    info!("Wrote {}", file);
    Ok(())
}

fn write_expression(expr: &ExpressionByMetacluster, file: &str) -> anyhow::Result<()> {
    let rows = expr.row_names();
    let names = (Some(rows.as_slice()), Some(expr.markers()));
    if file.ends_with(".parquet") {
        expr.values().to_parquet_with_names(file, names, "metacluster")?;
    } else {
        expr.values().to_tsv_with_names(file, names, "metacluster")?;
    }
    info!("Wrote {}", file);
    Ok(())
}

/// Empty nodes are `NA` rows in text and NaN in parquet
fn write_node_expression(expr: &ExpressionByCluster, file: &str) -> anyhow::Result<()> {
    if file.ends_with(".parquet") {
        let rows: Vec<Box<str>> = (1..=expr.num_clusters())
            .map(|k| k.to_string().into_boxed_str())
            .collect();
        let names = (Some(rows.as_slice()), Some(expr.markers.as_slice()));
        expr.to_mat().to_parquet_with_names(file, names, "node")?;
    } else {
        let mut lines: Vec<Box<str>> = Vec::with_capacity(expr.num_clusters() + 1);
        lines.push(format!("node\t{}", expr.markers.join("\t")).into_boxed_str());
        for (k, row) in expr.means.iter().enumerate() {
            let values: Vec<String> = match row {
                Some(row) => row.iter().map(|v| v.to_string()).collect(),
                None => vec!["NA".to_string(); expr.markers.len()],
            };
            lines.push(format!("{}\t{}", k + 1, values.join("\t")).into_boxed_str());
        }
        write_lines(&lines, file)?;
    }
    if expr.num_empty() > 0 {
        info!("{} of {} SOM nodes have no cells", expr.num_empty(), expr.num_clusters());
    }
    info!("Wrote {}", file);
    Ok(())
}

fn write_summary(
    matrix: &ExpressionMatrix,
    subset: &MarkerSubset,
    output: &PipelineOutput,
    args: &RunArgs,
) -> anyhow::Result<()> {
    let file = format!("{}.summary.json", args.out);
    let map = output.cells.metaclusters();

    let metacluster_percent: BTreeMap<String, f64> = output
        .frequencies
        .metacluster
        .iter()
        .map(|(k, p)| (k.to_string(), *p))
        .collect();

    let summary = serde_json::json!({
        "command": "run",
        "data_file": args.data_file,
        "marker_file": args.markers,
        "num_cells": matrix.nrows(),
        "num_channels": matrix.ncols(),
        "clustering_markers": subset.names,
        "asinh_cofactor": if args.no_transform { None } else { Some(args.cofactor) },
        "xdim": args.xdim,
        "ydim": args.ydim,
        "rlen": args.rlen,
        "max_train_cells": args.max_train_cells,
        "seed": args.seed,
        "merge_method": if args.consensus { "consensus" } else { "average" },
        "requested_nclus": args.nclus,
        "nclus": map.num_metaclusters(),
        "cut_height": map.cut_height(),
        "quantization_error": output.quantization_error,
        "metacluster_percent": metacluster_percent,
    });

    std::fs::write(&file, serde_json::to_string_pretty(&summary)?)?;
    info!("Wrote {}", file);
    Ok(())
}
