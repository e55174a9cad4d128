use crate::anndata::ExpressionData;
use crate::annotations::{CellAnnotations, ObsColumn};
use crate::expr_matrix::{ExprMatrix, IndexPointerType, ValuesIndicesPointers};
use crate::h5ad::write_h5ad;
use crate::weight_table::{GeneWeights, DEFAULT_GENE_COLUMN, DEFAULT_WEIGHT_COLUMN};

use indicatif::ParallelProgressIterator;
use log::info;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use rayon::prelude::*;

/// Library size after per-cell normalization
const TARGET_SUM: f64 = 1e4;

pub struct SimArgs {
    pub cells: usize,
    pub genes: usize,
    pub cell_types: usize,
    /// expected number of counts per cell
    pub depth: usize,
    /// marker genes per cell type
    pub markers: usize,
    /// log fold change of marker genes
    pub marker_lfc: f32,
    /// genes of the weight table that also appear in the data
    pub weighted_genes: usize,
    /// genes of the weight table absent from the data
    pub unmatched_genes: usize,
    pub rseed: u64,
}

impl Default for SimArgs {
    fn default() -> Self {
        Self {
            cells: 500,
            genes: 1000,
            cell_types: 4,
            depth: 2000,
            markers: 20,
            marker_lfc: 2.0,
            weighted_genes: 200,
            unmatched_genes: 20,
            rseed: 42,
        }
    }
}

pub struct SimOut {
    pub data: ExpressionData,
    pub weights: GeneWeights,
    /// true cell type of each cell
    pub membership: Vec<usize>,
}

/// Simulate log-normalized expression of cells from a few cell types
/// and a gene weight table that favours the markers of the first type
///
/// ```text
/// Y(i,j) ~ Poisson( depth * softmax(mu + lfc * marker(j, K(i)))_j )
/// X(i,j) = log1p( Y(i,j) / sum_j Y(i,j) * 1e4 )
/// ```
pub fn generate_expression_data(args: &SimArgs) -> anyhow::Result<SimOut> {
    let nn = args.cells;
    let mm = args.genes;
    let kk = args.cell_types.max(1);

    if nn == 0 || mm == 0 {
        return Err(anyhow::anyhow!("need at least one cell and one gene"));
    }
    if args.markers * kk > mm {
        return Err(anyhow::anyhow!(
            "{} marker genes for each of {} cell types exceed {} genes",
            args.markers,
            kk,
            mm
        ));
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(args.rseed);

    // 1. baseline gene profile and marker blocks
    let rnorm = Normal::new(0.0_f32, 1.0)?;
    let baseline: Vec<f32> = (0..mm).map(|_| rnorm.sample(&mut rng)).collect();
    let marker_of = |j: usize| -> Option<usize> {
        let k = j / args.markers.max(1);
        if args.markers > 0 && k < kk {
            Some(k)
        } else {
            None
        }
    };

    let profiles: Vec<Vec<f64>> = (0..kk)
        .map(|k| {
            let logits: Vec<f64> = (0..mm)
                .map(|j| {
                    let lfc = if marker_of(j) == Some(k) {
                        args.marker_lfc
                    } else {
                        0.0
                    };
                    (baseline[j] + lfc) as f64
                })
                .collect();
            let max_logit = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let expd: Vec<f64> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
            let tot: f64 = expd.iter().sum();
            expd.into_iter().map(|x| x / tot).collect()
        })
        .collect();

    // 2. cell type membership
    let membership: Vec<usize> = (0..nn).map(|_| rng.random_range(0..kk)).collect();

    // 3. sample counts cell by cell
    let rows: Vec<(Vec<u64>, Vec<f32>, f32)> = (0..nn)
        .into_par_iter()
        .progress_count(nn as u64)
        .map(|i| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(args.rseed + 1 + i as u64);
            let profile = &profiles[membership[i]];
            let counts: Vec<(u64, f64)> = profile
                .iter()
                .enumerate()
                .filter_map(|(j, &p)| {
                    let lambda = (p * args.depth as f64).max(1e-8);
                    let y = Poisson::new(lambda).ok()?.sample(&mut rng);
                    (y > 0.5).then_some((j as u64, y))
                })
                .collect();
            let tot: f64 = counts.iter().map(|&(_, y)| y).sum();
            let scale = if tot > 0.0 { TARGET_SUM / tot } else { 0.0 };
            let (cols, vals): (Vec<u64>, Vec<f32>) = counts
                .into_iter()
                .map(|(j, y)| (j, (y * scale).ln_1p() as f32))
                .unzip();
            (cols, vals, tot as f32)
        })
        .collect();

    let mut values = vec![];
    let mut indices = vec![];
    let mut indptr = vec![0_u64];
    let mut n_counts = Vec::with_capacity(nn);
    for (cols, vals, tot) in rows {
        indices.extend(cols);
        values.extend(vals);
        indptr.push(values.len() as u64);
        n_counts.push(tot);
    }
    info!("sampled {} non-zero elements", values.len());

    let x = ExprMatrix::from_compressed(
        ValuesIndicesPointers {
            values: &values,
            indices: &indices,
            indptr: &indptr,
        },
        IndexPointerType::Row,
        (nn, mm),
    )?;

    let type_names: Vec<Box<str>> = (0..kk)
        .map(|k| format!("celltype_{}", k).into_boxed_str())
        .collect();

    let mut obs = CellAnnotations::new(nn);
    obs.insert(
        "cell_type",
        ObsColumn::Categorical {
            codes: membership.iter().map(|&k| k as i32).collect(),
            categories: type_names,
        },
    )?;
    obs.insert("n_counts", ObsColumn::Numeric(n_counts))?;

    let obs_names = (0..nn)
        .map(|i| format!("cell_{:05}", i).into_boxed_str())
        .collect();
    let var_names: Vec<Box<str>> = (0..mm)
        .map(|j| format!("GENE{:05}", j).into_boxed_str())
        .collect();

    let data = ExpressionData::new(x, obs_names, var_names.clone(), obs)?;

    // 4. weights: markers of the first type get an extra unit
    let mut gene_order: Vec<usize> = (0..mm).collect();
    gene_order.shuffle(&mut rng);
    let nweighted = args.weighted_genes.min(mm);

    let mut pairs: Vec<(Box<str>, f64)> = gene_order[..nweighted]
        .iter()
        .map(|&j| {
            let bonus = if marker_of(j) == Some(0) { 1.0 } else { 0.0 };
            (var_names[j].clone(), rng.random::<f64>() + bonus)
        })
        .collect();
    pairs.extend(
        (0..args.unmatched_genes)
            .map(|g| (format!("UNMATCHED{:04}", g).into_boxed_str(), rng.random::<f64>())),
    );

    let (weights, _) = GeneWeights::from_pairs(pairs);

    Ok(SimOut {
        data,
        weights,
        membership,
    })
}

/// Simulate and write an `.h5ad` file plus a `GENE`/`MI` weight table
pub fn generate_expression_data_h5ad(
    args: &SimArgs,
    h5ad_file: &str,
    weight_file: &str,
) -> anyhow::Result<SimOut> {
    let sim = generate_expression_data(args)?;
    write_h5ad(&sim.data, h5ad_file)?;
    sim.weights
        .to_tsv(weight_file, DEFAULT_GENE_COLUMN, DEFAULT_WEIGHT_COLUMN)?;
    info!(
        "wrote {} cells x {} genes to {} and {} weights to {}",
        sim.data.num_cells(),
        sim.data.num_genes(),
        h5ad_file,
        sim.weights.len(),
        weight_file
    );
    Ok(sim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_is_reproducible() -> anyhow::Result<()> {
        let args = SimArgs {
            cells: 40,
            genes: 60,
            cell_types: 3,
            markers: 5,
            weighted_genes: 30,
            unmatched_genes: 4,
            ..Default::default()
        };
        let a = generate_expression_data(&args)?;
        let b = generate_expression_data(&args)?;

        assert_eq!(a.data.num_cells(), 40);
        assert_eq!(a.data.num_genes(), 60);
        assert_eq!(a.membership, b.membership);
        assert_eq!(a.data.x.to_dense(), b.data.x.to_dense());
        assert_eq!(a.weights.len(), 34);
        assert_eq!(a.weights.get("UNMATCHED0000"), b.weights.get("UNMATCHED0000"));

        let (codes, categories) = a.data.obs.categorical("cell_type")?;
        assert_eq!(categories.len(), 3);
        assert!(codes.iter().all(|&c| (0..3).contains(&c)));
        Ok(())
    }

    #[test]
    fn too_many_markers() {
        let args = SimArgs {
            genes: 10,
            cell_types: 3,
            markers: 4,
            ..Default::default()
        };
        assert!(generate_expression_data(&args).is_err());
    }
}
