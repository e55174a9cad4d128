use anndata_beans::simulate::{generate_expression_data_h5ad, SimArgs};
use clap::Args;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(long = "h5ad", default_value = "file.h5ad", help = "Output `.h5ad` file")]
    h5ad_file: Box<str>,

    #[arg(
        short = 'w',
        long = "weights",
        default_value = "geneset.zscore.tsv",
        help = "Output gene weight table"
    )]
    weight_file: Box<str>,

    #[arg(short = 'n', long, default_value_t = 500, help = "Number of cells")]
    cells: usize,

    #[arg(short = 'g', long, default_value_t = 1000, help = "Number of genes")]
    genes: usize,

    #[arg(short = 't', long = "cell-types", default_value_t = 4, help = "Number of cell types")]
    cell_types: usize,

    #[arg(long, default_value_t = 2000, help = "Expected counts per cell")]
    depth: usize,

    #[arg(long, default_value_t = 20, help = "Marker genes per cell type")]
    markers: usize,

    #[arg(long = "marker-lfc", default_value_t = 2.0, help = "Log fold change of marker genes")]
    marker_lfc: f32,

    #[arg(
        long = "weighted-genes",
        default_value_t = 200,
        help = "Genes of the weight table found in the data"
    )]
    weighted_genes: usize,

    #[arg(
        long = "unmatched-genes",
        default_value_t = 20,
        help = "Genes of the weight table absent from the data"
    )]
    unmatched_genes: usize,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    rseed: u64,

    #[arg(short, long, help = "Verbosity", long_help = "Increase output verbosity.")]
    verbose: bool,
}

pub fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let sim_args = SimArgs {
        cells: args.cells,
        genes: args.genes,
        cell_types: args.cell_types,
        depth: args.depth,
        markers: args.markers,
        marker_lfc: args.marker_lfc,
        weighted_genes: args.weighted_genes,
        unmatched_genes: args.unmatched_genes,
        rseed: args.rseed,
    };

    generate_expression_data_h5ad(&sim_args, &args.h5ad_file, &args.weight_file)?;
    Ok(())
}
