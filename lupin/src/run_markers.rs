use crate::run_cluster::marker_subset;

use clap::Args;
use lupin::common::*;
use lupin::expression::ExpressionMatrix;
use matrix_util::common_io::write_lines;

#[derive(Args, Debug)]
pub struct MarkersArgs {
    /// Expression table, as for `lupin run`
    data_file: Box<str>,

    #[arg(long, short = 'm', help = "Marker description file (channel <TAB> marker)")]
    markers: Option<Box<str>>,

    #[arg(
        long,
        short = 'p',
        value_delimiter = ',',
        help = "Marker name patterns (default: CD,Ig,HLA,CCR,CXC)"
    )]
    patterns: Option<Vec<Box<str>>>,

    #[arg(long, short, help = "Output file (default: stdout)")]
    out: Option<Box<str>>,

    #[arg(long, short, help = "Verbose output")]
    verbose: bool,
}

/// List channels, cleaned marker names and the clustering selection
pub fn show_markers(args: &MarkersArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let matrix = ExpressionMatrix::from_file(&args.data_file, args.markers.as_deref())?;
    let subset = marker_subset(&matrix, args.patterns.as_deref());

    let mut lines: Vec<Box<str>> = vec!["column\tchannel\tmarker\tselected".into()];
    for (j, (channel, marker)) in matrix.channels().iter().zip(matrix.markers()).enumerate() {
        let selected = subset.indices.binary_search(&j).is_ok();
        lines.push(format!("{}\t{}\t{}\t{}", j + 1, channel, marker, selected).into_boxed_str());
    }

    let out = args.out.as_deref().unwrap_or("stdout");
    write_lines(&lines, out)?;

    info!("{} of {} markers selected", subset.len(), matrix.ncols());
    Ok(())
}
