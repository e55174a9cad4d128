use clap::Args;
use gzsper::disease_score::{DegeneratePolicy, ScoreOptions};
use gzsper::pipeline::{run_pipeline, PipelineConfig};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(
        long = "h5ad",
        default_value = "file.h5ad",
        help = "Expression data in `.h5ad` format",
        long_help = "Annotated cells x genes expression data in `.h5ad` format.\n\
		     `X` may be dense or sparse (CSR/CSC); values are\n\
		     expected to be log-normalized."
    )]
    h5ad_file: Box<str>,

    #[arg(
        short = 'w',
        long = "weights",
        default_value = "geneset.zscore.tsv",
        help = "Gene weight table",
        long_help = "Tab-separated gene weight table with a header line.\n\
		     Gzipped if the name ends with `.gz`."
    )]
    weight_file: Box<str>,

    #[arg(
        short,
        long = "out-dir",
        default_value = ".",
        help = "Output directory",
        long_help = "Directory of the four `.png` figures."
    )]
    out_dir: Box<str>,

    #[arg(
        short,
        long,
        default_value = "cell_type",
        help = "Cell type annotation",
        long_help = "Categorical cell annotation (`obs` column) for the\n\
		     cell type UMAP, the violins, and the dot plot rows."
    )]
    groupby: Box<str>,

    #[arg(long = "gene-column", default_value = "GENE", help = "Gene column of the weight table")]
    gene_column: Box<str>,

    #[arg(long = "weight-column", default_value = "MI", help = "Weight column of the weight table")]
    weight_column: Box<str>,

    #[arg(
        long = "score-max",
        default_value_t = 10.0,
        help = "Upper end of the score range",
        long_help = "Scores are rescaled to [0, score-max]."
    )]
    score_max: f64,

    #[arg(
        long,
        value_enum,
        default_value = "fail",
        help = "What to do if all cells score the same",
        long_help = "What to do if all cells get the same raw score:\n\
		     * fail: stop with an error\n\
		     * zeros: give every cell a score of 0"
    )]
    degenerate: DegeneratePolicy,

    #[arg(long = "n-top-genes", default_value_t = 2000, help = "Number of highly variable genes")]
    n_top_genes: usize,

    #[arg(long = "n-comps", default_value_t = 50, help = "Number of principal components")]
    n_comps: usize,

    #[arg(
        short = 'k',
        long = "n-neighbors",
        default_value_t = 10,
        help = "Neighbourhood size of the kNN graph",
        long_help = "Neighbourhood size of the kNN graph, counting the cell itself."
    )]
    n_neighbors: usize,

    #[arg(long = "n-pcs", default_value_t = 40, help = "Principal components for the kNN graph")]
    n_pcs: usize,

    #[arg(long = "min-dist", default_value_t = 0.5, help = "UMAP minimum distance")]
    min_dist: f32,

    #[arg(long, default_value_t = 1.0, help = "UMAP spread")]
    spread: f32,

    #[arg(
        long = "n-epochs",
        help = "UMAP epochs",
        long_help = "Number of UMAP epochs.\n\
		     Default: 500 up to 10,000 cells, 200 beyond."
    )]
    n_epochs: Option<usize>,

    #[arg(long = "top-genes", default_value_t = 20, help = "Genes in the dot plot")]
    top_genes: usize,

    #[arg(long, default_value_t = 300, help = "Figure resolution (dots per inch)")]
    dpi: u32,

    #[arg(long = "point-size", default_value_t = 20.0, help = "UMAP marker area in pt^2")]
    point_size: f32,

    #[arg(long = "cell-type-title", default_value = "Cell Types in Heart Global Dataset")]
    cell_type_title: Box<str>,

    #[arg(long = "score-title", default_value = "Disease Relevance Score")]
    score_title: Box<str>,

    #[arg(long = "violin-title", default_value = "Disease Relevance Score by Cell Type")]
    violin_title: Box<str>,

    #[arg(long = "dotplot-title", default_value = "Expression of Top Genes in Cell Types")]
    dotplot_title: Box<str>,

    #[arg(long, default_value_t = 0, help = "Random seed")]
    seed: u64,

    #[arg(short, long, help = "Verbosity", long_help = "Increase output verbosity.")]
    verbose: bool,
}

impl RunArgs {
    fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            h5ad_file: self.h5ad_file.clone(),
            weight_file: self.weight_file.clone(),
            out_dir: self.out_dir.clone(),
            groupby: self.groupby.clone(),
            gene_column: self.gene_column.clone(),
            weight_column: self.weight_column.clone(),
            score: ScoreOptions {
                score_max: self.score_max,
                degenerate: self.degenerate,
            },
            n_top_genes: self.n_top_genes,
            n_comps: self.n_comps,
            n_neighbors: self.n_neighbors,
            n_pcs: self.n_pcs,
            min_dist: self.min_dist,
            spread: self.spread,
            n_epochs: self.n_epochs,
            n_dotplot_genes: self.top_genes,
            dpi: self.dpi,
            point_size: self.point_size,
            cell_type_title: self.cell_type_title.clone(),
            score_title: self.score_title.clone(),
            violin_title: self.violin_title.clone(),
            dotplot_title: self.dotplot_title.clone(),
            seed: self.seed,
        }
    }
}

pub fn run_analysis(args: &RunArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let out = run_pipeline(&args.to_config())?;

    for img in out.images.iter() {
        log::info!("saved {}", img);
    }
    Ok(())
}
