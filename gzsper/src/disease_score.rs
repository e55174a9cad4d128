use crate::common::*;

use clap::ValueEnum;
use ndarray::Axis;
use rayon::prelude::*;

pub const DEFAULT_SCORE_MAX: f64 = 10.0;

/// What to do when every cell gets the same raw score
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
    /// stop with an error
    #[default]
    Fail,
    /// give every cell a score of zero
    Zeros,
}

#[derive(Clone, Debug)]
pub struct ScoreOptions {
    /// upper end of the normalized range `[0, score_max]`
    pub score_max: f64,
    pub degenerate: DegeneratePolicy,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            score_max: DEFAULT_SCORE_MAX,
            degenerate: DegeneratePolicy::Fail,
        }
    }
}

/// Scores of all cells together with the genes that produced them
#[derive(Clone, Debug)]
pub struct DiseaseScore {
    /// lexically sorted genes shared by the data and the weight table
    pub common_genes: Vec<Box<str>>,
    /// weighted sums, one per cell
    pub raw: Vec<f64>,
    /// `raw` rescaled to `[0, score_max]`
    pub normalized: Vec<f64>,
}

/// Genes present in both the expression data and the weight table,
/// sorted lexically
pub fn common_genes(data: &ExpressionData, weights: &GeneWeights) -> Vec<Box<str>> {
    let mut ret: Vec<Box<str>> = data
        .var_names
        .iter()
        .filter(|g| weights.contains(g))
        .cloned()
        .collect();
    ret.sort();
    ret.dedup();
    ret
}

///
/// Score every cell by the weighted sum of its expression over the
/// genes shared with the weight table, rescale to `[0, score_max]` and
/// store the result as the numeric annotation `disease_score`.
///
/// * `data` - expression data; a previous `disease_score` is replaced
/// * `weights` - gene weights
/// * `opts` - output range and the degenerate range policy
///
pub fn calculate_disease_score(
    data: &mut ExpressionData,
    weights: &GeneWeights,
    opts: &ScoreOptions,
) -> anyhow::Result<DiseaseScore> {
    if !opts.score_max.is_finite() || opts.score_max <= 0.0 {
        return Err(anyhow::anyhow!(
            "--score-max must be a positive finite number, got {}",
            opts.score_max
        ));
    }

    let common = common_genes(data, weights);

    if common.is_empty() {
        return Err(anyhow::anyhow!(
            "No matching genes found. Please check that the gene names are consistent \
             between the expression data ({} genes) and the weight table ({} genes)",
            data.num_genes(),
            weights.len()
        ));
    }

    let gene_index = data.gene_index();
    let mut cols = Vec::with_capacity(common.len());
    let mut beta = Vec::with_capacity(common.len());
    for g in common.iter() {
        let (j, w) = gene_index
            .get(g.as_ref())
            .copied()
            .zip(weights.get(g))
            .ok_or_else(|| anyhow::anyhow!("gene {} vanished while scoring", g))?;
        cols.push(j);
        beta.push(w);
    }

    let xx = data.x.select_columns_dense(&cols);

    let raw: Vec<f64> = xx
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|row| {
            row.iter()
                .zip(beta.iter())
                .map(|(&x, &w)| x as f64 * w)
                .sum::<f64>()
        })
        .collect();

    if let Some(i) = raw.iter().position(|s| !s.is_finite()) {
        return Err(anyhow::anyhow!(
            "non-finite raw score {} for cell {}",
            raw[i],
            data.obs_names[i]
        ));
    }

    let normalized = normalize_scores(&raw, opts)?;

    data.obs.insert(
        DISEASE_SCORE_KEY,
        ObsColumn::Numeric(normalized.iter().map(|&s| s as f32).collect()),
    )?;

    info!(
        "Disease score calculation is complete. Using {} common genes",
        common.len()
    );

    Ok(DiseaseScore {
        common_genes: common,
        raw,
        normalized,
    })
}

/// Per-cell table with a `cell  raw_score  disease_score` header,
/// tab-separated, in the cell order of `data`
pub fn score_table_lines(
    data: &ExpressionData,
    score: &DiseaseScore,
) -> anyhow::Result<Vec<Box<str>>> {
    let nn = data.num_cells();
    if score.raw.len() != nn || score.normalized.len() != nn {
        return Err(anyhow::anyhow!(
            "{} cells but {} raw and {} normalized scores",
            nn,
            score.raw.len(),
            score.normalized.len()
        ));
    }

    let mut lines: Vec<Box<str>> = Vec::with_capacity(nn + 1);
    lines.push("cell\traw_score\tdisease_score".into());
    for ((cell, raw), s) in data
        .obs_names
        .iter()
        .zip(score.raw.iter())
        .zip(score.normalized.iter())
    {
        lines.push(format!("{}\t{}\t{}", cell, raw, s).into());
    }
    Ok(lines)
}

/// Min-max rescaling to `[0, score_max]`
pub fn normalize_scores(raw: &[f64], opts: &ScoreOptions) -> anyhow::Result<Vec<f64>> {
    if raw.is_empty() {
        return Ok(vec![]);
    }

    let lo = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if hi <= lo {
        return match opts.degenerate {
            DegeneratePolicy::Fail => Err(anyhow::anyhow!(
                "all {} cells have the same raw score {}; cannot rescale \
                 (use the `zeros` policy to assign 0 instead)",
                raw.len(),
                lo
            )),
            DegeneratePolicy::Zeros => {
                warn!("all cells have the same raw score {}; assigning 0", lo);
                Ok(vec![0.0; raw.len()])
            }
        };
    }

    let denom = hi - lo;
    Ok(raw
        .iter()
        .map(|&s| (s - lo) / denom * opts.score_max)
        .collect())
}
