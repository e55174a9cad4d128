use anndata_beans::h5ad::read_h5ad;
use anndata_beans::simulate::{generate_expression_data_h5ad, SimArgs};
use anndata_beans::weight_table::GeneWeights;
use gzsper::common::{DISEASE_SCORE_KEY, PCA_KEY, UMAP_KEY};
use gzsper::disease_score::{calculate_disease_score, score_table_lines, ScoreOptions};
use gzsper::feature_selection::subset_highly_variable_genes;
use gzsper::neighbors::compute_neighbors;
use gzsper::pca::run_pca;
use gzsper::pipeline::{run_pipeline, PipelineConfig};
use gzsper::top_genes::top_genes;
use gzsper::umap_layout::{run_umap, UmapArgs};
use matrix_util::common_io::{read_lines_of_words_delim, write_lines};

use std::path::Path;

fn dir_str(dir: &Path) -> anyhow::Result<Box<str>> {
    dir.to_str()
        .map(Box::from)
        .ok_or_else(|| anyhow::anyhow!("non-utf8 temp path"))
}

/// small simulated `.h5ad` + weight table inside `dir`
fn simulate_inputs(dir: &Path) -> anyhow::Result<(Box<str>, Box<str>)> {
    let h5ad_file = dir_str(&dir.join("toy.h5ad"))?;
    let weight_file = dir_str(&dir.join("toy.zscore.tsv"))?;
    let args = SimArgs {
        cells: 120,
        genes: 150,
        cell_types: 3,
        markers: 10,
        weighted_genes: 60,
        ..Default::default()
    };
    generate_expression_data_h5ad(&args, &h5ad_file, &weight_file)?;
    Ok((h5ad_file, weight_file))
}

fn small_config(h5ad_file: &str, weight_file: &str, out_dir: &str) -> PipelineConfig {
    PipelineConfig {
        h5ad_file: h5ad_file.into(),
        weight_file: weight_file.into(),
        out_dir: out_dir.into(),
        n_top_genes: 100,
        n_comps: 20,
        n_pcs: 10,
        n_epochs: Some(50),
        dpi: 20,
        ..Default::default()
    }
}

#[test]
fn full_run_writes_four_images() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (h5ad_file, weight_file) = simulate_inputs(tmp.path())?;
    let out_dir = dir_str(&tmp.path().join("figures"))?;

    let out = run_pipeline(&small_config(&h5ad_file, &weight_file, &out_dir))?;

    assert_eq!(out.images.len(), 4);
    for name in [
        "cell_types_umap.png",
        "disease_score_umap.png",
        "disease_score_violin.png",
        "top_genes_dotplot.png",
    ] {
        let path = Path::new(out_dir.as_ref()).join(name);
        let meta = std::fs::metadata(&path)?;
        assert!(meta.len() > 0, "{} is empty", name);
    }

    assert_eq!(out.score.raw.len(), 120);
    assert!(!out.score.common_genes.is_empty());
    assert!(!out.dotplot_genes.is_empty() && out.dotplot_genes.len() <= 20);

    let lo = out.score.normalized.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = out.score.normalized.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(lo, 0.0);
    assert!((hi - 10.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn no_shared_genes_stops_before_drawing() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (h5ad_file, _) = simulate_inputs(tmp.path())?;

    let weight_file = dir_str(&tmp.path().join("other.tsv"))?;
    let (weights, _) = GeneWeights::from_pairs(vec![
        (Box::from("NOT_A_GENE_1"), 1.0),
        (Box::from("NOT_A_GENE_2"), -0.5),
    ]);
    weights.to_tsv(&weight_file, "GENE", "MI")?;

    let out_dir = dir_str(&tmp.path().join("figures"))?;
    let err = run_pipeline(&small_config(&h5ad_file, &weight_file, &out_dir)).unwrap_err();
    assert!(err.to_string().contains("No matching genes found"));

    let pngs = std::fs::read_dir(tmp.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "png"))
        .count();
    assert_eq!(pngs, 0);
    assert!(!Path::new(out_dir.as_ref()).exists());
    Ok(())
}

#[test]
fn unknown_groupby_fails_right_after_loading() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (h5ad_file, weight_file) = simulate_inputs(tmp.path())?;
    let out_dir = dir_str(&tmp.path().join("figures"))?;

    let config = PipelineConfig {
        groupby: "tissue".into(),
        ..small_config(&h5ad_file, &weight_file, &out_dir)
    };
    assert!(run_pipeline(&config).is_err());

    // a numeric annotation cannot group cells
    let config = PipelineConfig {
        groupby: "n_counts".into(),
        ..small_config(&h5ad_file, &weight_file, &out_dir)
    };
    assert!(run_pipeline(&config).is_err());
    assert!(!Path::new(out_dir.as_ref()).exists());
    Ok(())
}

#[test]
fn stages_fill_in_the_dataset() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (h5ad_file, weight_file) = simulate_inputs(tmp.path())?;

    let mut data = read_h5ad(&h5ad_file)?;
    let weights = GeneWeights::from_tsv(&weight_file, "GENE", "MI")?;

    calculate_disease_score(&mut data, &weights, &ScoreOptions::default())?;
    assert_eq!(data.obs.numeric(DISEASE_SCORE_KEY)?.len(), 120);

    let hvg = subset_highly_variable_genes(&mut data, 50)?;
    assert_eq!(hvg.selected_indices.len(), 50);
    assert_eq!(data.num_genes(), 50);

    run_pca(&mut data, 10, 0)?;
    assert_eq!(data.obsm[PCA_KEY].shape(), (120, 10));

    let graph = compute_neighbors(&data, 10, 10, 0)?;
    assert_eq!(graph.num_nodes(), 120);

    let umap = run_umap(
        &mut data,
        &graph,
        &UmapArgs {
            n_epochs: Some(30),
            ..Default::default()
        },
    )?;
    assert_eq!(umap.shape(), (120, 2));
    assert!(umap.iter().all(|x| x.is_finite()));
    assert!(data.obsm.contains_key(UMAP_KEY));

    let top = top_genes(&data, 20);
    assert_eq!(top.selected.len(), 20);
    assert!(top.missing.is_empty());
    Ok(())
}

#[test]
fn score_table_reads_back_from_gzip() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let (h5ad_file, weight_file) = simulate_inputs(tmp.path())?;

    let mut data = read_h5ad(&h5ad_file)?;
    let weights = GeneWeights::from_tsv(&weight_file, "GENE", "MI")?;
    let score = calculate_disease_score(&mut data, &weights, &ScoreOptions::default())?;

    let out_file = dir_str(&tmp.path().join("scores.tsv.gz"))?;
    write_lines(&score_table_lines(&data, &score)?, &out_file)?;

    let table = read_lines_of_words_delim(&out_file, "\t", 0)?;
    let header: Vec<&str> = table.header.iter().map(|x| x.as_ref()).collect();
    assert_eq!(header, vec!["cell", "raw_score", "disease_score"]);
    assert_eq!(table.lines.len(), data.num_cells());

    for (i, words) in table.lines.iter().enumerate() {
        assert_eq!(words.len(), 3);
        assert_eq!(words[0], data.obs_names[i]);
        let raw: f64 = words[1].parse()?;
        let normalized: f64 = words[2].parse()?;
        assert_eq!(raw, score.raw[i]);
        assert_eq!(normalized, score.normalized[i]);
    }
    Ok(())
}
