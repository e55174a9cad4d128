use crate::common::*;
use crate::disease_score::*;
use crate::feature_selection::{subset_highly_variable_genes, DEFAULT_N_TOP_GENES};
use crate::neighbors::{compute_neighbors, DEFAULT_N_NEIGHBORS, DEFAULT_N_PCS};
use crate::pca::{run_pca, DEFAULT_N_COMPS};
use crate::plot::{plot_dotplot, plot_embedding, plot_violin, FigureOptions, DEFAULT_DPI};
use crate::top_genes::{top_genes, DEFAULT_TOP_GENES};
use crate::umap_layout::{run_umap, UmapArgs, DEFAULT_MIN_DIST, DEFAULT_SPREAD};

use anndata_beans::h5ad::read_h5ad;
use anndata_beans::weight_table::{DEFAULT_GENE_COLUMN, DEFAULT_WEIGHT_COLUMN};
use std::path::Path;

pub const CELL_TYPES_UMAP_FILE: &str = "cell_types_umap.png";
pub const DISEASE_SCORE_UMAP_FILE: &str = "disease_score_umap.png";
pub const DISEASE_SCORE_VIOLIN_FILE: &str = "disease_score_violin.png";
pub const TOP_GENES_DOTPLOT_FILE: &str = "top_genes_dotplot.png";

/// Settings of one run; `Default` gives the standard analysis
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub h5ad_file: Box<str>,
    pub weight_file: Box<str>,
    pub out_dir: Box<str>,
    /// categorical annotation for colours, violins and dot plot rows
    pub groupby: Box<str>,
    pub gene_column: Box<str>,
    pub weight_column: Box<str>,

    pub score: ScoreOptions,

    pub n_top_genes: usize,
    pub n_comps: usize,
    pub n_neighbors: usize,
    pub n_pcs: usize,
    pub min_dist: f32,
    pub spread: f32,
    pub n_epochs: Option<usize>,

    pub n_dotplot_genes: usize,
    pub dpi: u32,
    pub point_size: f32,

    pub cell_type_title: Box<str>,
    pub score_title: Box<str>,
    pub violin_title: Box<str>,
    pub dotplot_title: Box<str>,

    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            h5ad_file: "file.h5ad".into(),
            weight_file: "geneset.zscore.tsv".into(),
            out_dir: ".".into(),
            groupby: "cell_type".into(),
            gene_column: DEFAULT_GENE_COLUMN.into(),
            weight_column: DEFAULT_WEIGHT_COLUMN.into(),
            score: ScoreOptions::default(),
            n_top_genes: DEFAULT_N_TOP_GENES,
            n_comps: DEFAULT_N_COMPS,
            n_neighbors: DEFAULT_N_NEIGHBORS,
            n_pcs: DEFAULT_N_PCS,
            min_dist: DEFAULT_MIN_DIST,
            spread: DEFAULT_SPREAD,
            n_epochs: None,
            n_dotplot_genes: DEFAULT_TOP_GENES,
            dpi: DEFAULT_DPI,
            point_size: crate::plot::DEFAULT_POINT_SIZE,
            cell_type_title: "Cell Types in Heart Global Dataset".into(),
            score_title: "Disease Relevance Score".into(),
            violin_title: "Disease Relevance Score by Cell Type".into(),
            dotplot_title: "Expression of Top Genes in Cell Types".into(),
            seed: DEFAULT_SEED,
        }
    }
}

impl PipelineConfig {
    fn output(&self, file: &str) -> anyhow::Result<Box<str>> {
        let path = Path::new(self.out_dir.as_ref()).join(file);
        path.to_str()
            .map(Box::from)
            .ok_or_else(|| anyhow::anyhow!("invalid output path under {}", self.out_dir))
    }

    fn figure(&self, title: &str, size: (f32, f32)) -> FigureOptions {
        FigureOptions {
            point_size: self.point_size,
            ..FigureOptions::new(title, size, self.dpi)
        }
    }
}

/// What a run produced
#[derive(Debug)]
pub struct PipelineOut {
    pub score: DiseaseScore,
    /// images written, in order
    pub images: Vec<Box<str>>,
    /// top genes that were drawn in the dot plot
    pub dotplot_genes: Vec<Box<str>>,
}

/// Make sure `groupby` can colour and group cells before any work
pub fn check_groupby(data: &ExpressionData, groupby: &str) -> anyhow::Result<()> {
    data.obs.categorical(groupby).map(|_| ())
}

///
/// Load the data, score the cells, embed them and draw the four
/// figures.
///
/// 1. read the `.h5ad` file and the weight table
/// 2. disease score on all genes
/// 3. highly variable genes, PCA, kNN graph and UMAP
/// 4. cell types and scores on the UMAP, score violins, top-gene dot
///    plot
///
pub fn run_pipeline(config: &PipelineConfig) -> anyhow::Result<PipelineOut> {
    info!("Step 1: Loading data and preprocessing");

    let mut data = read_h5ad(&config.h5ad_file)?;
    check_groupby(&data, &config.groupby)?;
    info!(
        "{} cells x {} genes from {}",
        data.num_cells(),
        data.num_genes(),
        config.h5ad_file
    );

    let weights = GeneWeights::from_tsv(
        &config.weight_file,
        &config.gene_column,
        &config.weight_column,
    )?;

    let score = calculate_disease_score(&mut data, &weights, &config.score)?;

    subset_highly_variable_genes(&mut data, config.n_top_genes)?;
    run_pca(&mut data, config.n_comps, config.seed)?;
    let graph = compute_neighbors(&data, config.n_neighbors, config.n_pcs, config.seed)?;
    run_umap(
        &mut data,
        &graph,
        &UmapArgs {
            min_dist: config.min_dist,
            spread: config.spread,
            n_epochs: config.n_epochs,
            seed: config.seed,
            ..Default::default()
        },
    )?;

    let mut images = vec![];

    let out = config.output(CELL_TYPES_UMAP_FILE)?;
    info!("Step 2: Drawing {}", out);
    plot_embedding(
        &data,
        UMAP_KEY,
        &config.groupby,
        &out,
        &config.figure(&config.cell_type_title, (12.0, 10.0)),
    )?;
    images.push(out);

    let out = config.output(DISEASE_SCORE_UMAP_FILE)?;
    info!("Step 3: Drawing {}", out);
    plot_embedding(
        &data,
        UMAP_KEY,
        DISEASE_SCORE_KEY,
        &out,
        &config.figure(&config.score_title, (12.0, 10.0)),
    )?;
    images.push(out);

    let out = config.output(DISEASE_SCORE_VIOLIN_FILE)?;
    info!("Step 4: Drawing {}", out);
    plot_violin(
        &data,
        &config.groupby,
        DISEASE_SCORE_KEY,
        &out,
        &config.figure(&config.violin_title, (15.0, 10.0)),
    )?;
    images.push(out);

    let out = config.output(TOP_GENES_DOTPLOT_FILE)?;
    info!("Step 5: Drawing {}", out);
    let top = top_genes(&data, config.n_dotplot_genes);
    if top.selected.is_empty() {
        warn!("No genes can be drawn Dotplot, check the data");
    } else {
        plot_dotplot(
            &data,
            &top.selected,
            &config.groupby,
            &out,
            &config.figure(&config.dotplot_title, (20.0, 15.0)),
        )?;
        images.push(out);
    }

    Ok(PipelineOut {
        score,
        images,
        dotplot_genes: top.selected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_standard_run() {
        let config = PipelineConfig::default();
        assert_eq!(config.h5ad_file.as_ref(), "file.h5ad");
        assert_eq!(config.weight_file.as_ref(), "geneset.zscore.tsv");
        assert_eq!(config.groupby.as_ref(), "cell_type");
        assert_eq!(config.n_top_genes, 2000);
        assert_eq!(config.n_neighbors, 10);
        assert_eq!(config.n_pcs, 40);
        assert_eq!(config.dpi, 300);
        assert_eq!(config.score.score_max, 10.0);
    }

    #[test]
    fn outputs_go_to_the_output_directory() -> anyhow::Result<()> {
        let config = PipelineConfig {
            out_dir: "results/run1".into(),
            ..Default::default()
        };
        let out = config.output(CELL_TYPES_UMAP_FILE)?;
        assert_eq!(
            Path::new(out.as_ref()),
            Path::new("results/run1").join("cell_types_umap.png")
        );
        Ok(())
    }
}
