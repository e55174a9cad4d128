mod run_analysis;
mod run_score;
mod run_simulate;

use run_analysis::*;
use run_score::*;
use run_simulate::*;

use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "GZSper",
    long_about = "Score single cells by GWAS-derived gene weights.\n\
		  Expression data in `.h5ad` format; gene weights in a\n\
		  tab-separated table with `GENE` and `MI` columns."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Score cells, embed them, and draw figures",
        long_about = "Run the whole analysis in four stages:\n\
		      (1) Load the `.h5ad` data and the gene weight table\n\
		      (2) Score each cell by the weighted sum of shared genes\n\
		      (3) Highly variable genes, PCA, kNN graph, and UMAP\n\
		      (4) Draw UMAPs, a violin plot, and a top-gene dot plot.\n"
    )]
    Run(RunArgs),

    #[command(
        about = "Score cells and write a table",
        long_about = "Compute the disease score of each cell and write\n\
		      `cell  raw_score  disease_score` lines to a file\n\
		      (gzipped if it ends with `.gz`) or `stdout`.\n"
    )]
    Score(ScoreArgs),

    #[command(
        about = "Simulate a toy data set",
        long_about = "Simulate log-normalized expression of a few cell types\n\
		      with `cell_type` annotations and a matching gene weight table.\n"
    )]
    Simulate(SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Run(args) => {
            run_analysis(args)?;
        }
        Commands::Score(args) => {
            run_score(args)?;
        }
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
    }

    info!("Done");
    Ok(())
}
