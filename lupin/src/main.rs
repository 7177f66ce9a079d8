mod run_cluster;
mod run_markers;

use crate::run_cluster::*;
use crate::run_markers::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LUPIN",
    long_about = "Lightweight Unsupervised Phenotyping of cytometry INtensities\n\
		  Self-organizing map clustering of one cytometry sample,\n\
		  followed by metaclustering of the map nodes.\n\
		  Input: a cells x channels table (.tsv/.csv[.gz] or .parquet)"
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Cluster cells with a self-organizing map and merge the nodes",
        long_about = "Cluster cells in the four stages: \n\
		      (1) asinh transform and marker selection\n\
		      (2) train a self-organizing map on the selected markers\n\
		      (3) merge the map nodes into metaclusters\n\
		      (4) summarize frequencies and expression per metacluster.\n"
    )]
    Run(RunArgs),

    /// show channels, marker names and the clustering markers
    Markers(MarkersArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Run(args) => {
            run_cluster(args)?;
        }
        Commands::Markers(args) => {
            show_markers(args)?;
        }
    }

    Ok(())
}
