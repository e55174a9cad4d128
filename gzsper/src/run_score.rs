use anndata_beans::h5ad::read_h5ad;
use anndata_beans::weight_table::GeneWeights;
use clap::Args;
use gzsper::disease_score::{
    calculate_disease_score, score_table_lines, DegeneratePolicy, ScoreOptions,
};
use matrix_util::common_io::write_lines;

#[derive(Args, Debug)]
pub struct ScoreArgs {
    #[arg(long = "h5ad", default_value = "file.h5ad", help = "Expression data in `.h5ad` format")]
    h5ad_file: Box<str>,

    #[arg(
        short = 'w',
        long = "weights",
        default_value = "geneset.zscore.tsv",
        help = "Gene weight table"
    )]
    weight_file: Box<str>,

    #[arg(
        short,
        long,
        default_value = "stdout",
        help = "Output file",
        long_help = "Output table of `cell  raw_score  disease_score`.\n\
		     Gzipped if the name ends with `.gz`; `stdout` by default."
    )]
    out: Box<str>,

    #[arg(long = "gene-column", default_value = "GENE", help = "Gene column of the weight table")]
    gene_column: Box<str>,

    #[arg(long = "weight-column", default_value = "MI", help = "Weight column of the weight table")]
    weight_column: Box<str>,

    #[arg(long = "score-max", default_value_t = 10.0, help = "Upper end of the score range")]
    score_max: f64,

    #[arg(
        long,
        value_enum,
        default_value = "fail",
        help = "What to do if all cells score the same"
    )]
    degenerate: DegeneratePolicy,

    #[arg(short, long, help = "Verbosity", long_help = "Increase output verbosity.")]
    verbose: bool,
}

pub fn run_score(args: &ScoreArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let mut data = read_h5ad(&args.h5ad_file)?;
    let weights = GeneWeights::from_tsv(&args.weight_file, &args.gene_column, &args.weight_column)?;

    let opts = ScoreOptions {
        score_max: args.score_max,
        degenerate: args.degenerate,
    };
    let score = calculate_disease_score(&mut data, &weights, &opts)?;

    let lines = score_table_lines(&data, &score)?;
    write_lines(&lines, &args.out)?;
    Ok(())
}
