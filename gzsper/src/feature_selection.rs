use crate::common::*;

pub const DEFAULT_N_TOP_GENES: usize = 2000;
pub const DEFAULT_N_BINS: usize = 20;

/// smallest mean used in the dispersion ratio
const MIN_MEAN: f64 = 1e-12;

/// Highly variable genes with their dispersion statistics
pub struct FeatureSelection {
    pub selected_indices: Vec<usize>, // sorted column indices
    pub selected_names: Vec<Box<str>>,
    /// `log1p` of the mean of `expm1(x)`, one per gene
    pub means: Vec<f64>,
    /// log dispersion (`NaN` for zero dispersion)
    pub dispersions: Vec<f64>,
    /// dispersion z-scored within its mean bin
    pub dispersions_norm: Vec<f64>,
}

///
/// Rank genes by normalized dispersion on log-normalized data.
///
/// Values are mapped back with `expm1`, dispersion is `var/mean`, and
/// genes are put into `n_bins` equal-width bins of `log1p(mean)`. Log
/// dispersions are z-scored within each bin, and the `n_top` genes
/// with the largest z-score are kept (all genes if there are fewer).
///
/// * `data` - cells x genes, log-normalized
/// * `n_top` - number of genes to keep
/// * `n_bins` - number of mean bins
///
pub fn select_highly_variable_genes(
    data: &ExpressionData,
    n_top: usize,
    n_bins: usize,
) -> anyhow::Result<FeatureSelection> {
    let ngenes = data.num_genes();
    if ngenes == 0 {
        anyhow::bail!("no genes to select from");
    }
    if n_top == 0 {
        anyhow::bail!("number of highly variable genes must be >= 1");
    }

    info!("Computing dispersion for {} genes ...", ngenes);

    let stat = data.x.column_statistics(|x| x.exp_m1());
    let mean = stat.mean();
    let var = stat.variance(1);

    let mut means = Vec::with_capacity(ngenes);
    let mut dispersions = Vec::with_capacity(ngenes);

    for (&mu, &v) in mean.iter().zip(var.iter()) {
        let mu = if mu == 0.0 { MIN_MEAN } else { mu };
        let disp = v / mu;
        let disp = if disp == 0.0 { f64::NAN } else { disp };
        dispersions.push(disp.ln());
        means.push(mu.ln_1p());
    }

    let bins = equal_width_bins(&means, n_bins.max(1));
    let dispersions_norm = normalize_within_bins(&dispersions, &bins, n_bins.max(1));

    let mut order: Vec<usize> = (0..ngenes).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (dispersions_norm[a], dispersions_norm[b]);
        match (x.is_nan(), y.is_nan()) {
            (false, false) => y.total_cmp(&x),
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (true, true) => std::cmp::Ordering::Equal,
        }
        .then(a.cmp(&b))
    });

    let mut selected_indices: Vec<usize> = order.into_iter().take(n_top).collect();
    selected_indices.sort_unstable();

    let selected_names = selected_indices
        .iter()
        .map(|&j| data.var_names[j].clone())
        .collect();

    info!(
        "Selected {} / {} highly variable genes",
        selected_indices.len(),
        ngenes
    );

    Ok(FeatureSelection {
        selected_indices,
        selected_names,
        means,
        dispersions,
        dispersions_norm,
    })
}

/// Select highly variable genes and drop all the other columns
pub fn subset_highly_variable_genes(
    data: &mut ExpressionData,
    n_top: usize,
) -> anyhow::Result<FeatureSelection> {
    let hvg = select_highly_variable_genes(data, n_top, DEFAULT_N_BINS)?;
    data.subset_genes(&hvg.selected_indices)?;
    Ok(hvg)
}

/// Bin index of each value over `nbins` equal-width intervals of
/// `[min, max]`, right-closed, with the minimum in the first bin.
/// Everything goes to the first bin when all values are equal.
fn equal_width_bins(values: &[f64], nbins: usize) -> Vec<usize> {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (hi - lo) / nbins as f64;

    values
        .iter()
        .map(|&x| {
            if width.is_nan() || width <= 0.0 {
                return 0;
            }
            let k = ((x - lo) / width).ceil() as i64 - 1;
            k.clamp(0, nbins as i64 - 1) as usize
        })
        .collect()
}

/// z-score within each bin, ignoring `NaN`. A bin with a single
/// finite value has no spread; that value is divided by itself.
fn normalize_within_bins(values: &[f64], bins: &[usize], nbins: usize) -> Vec<f64> {
    let mut s0 = vec![0_f64; nbins];
    let mut s1 = vec![0_f64; nbins];
    let mut s2 = vec![0_f64; nbins];

    for (&x, &b) in values.iter().zip(bins) {
        if x.is_nan() {
            continue;
        }
        s0[b] += 1.0;
        s1[b] += x;
        s2[b] += x * x;
    }

    let (bin_mean, bin_std): (Vec<f64>, Vec<f64>) = (0..nbins)
        .map(|b| {
            let n = s0[b];
            if n < 1.0 {
                return (f64::NAN, f64::NAN);
            }
            let mu = s1[b] / n;
            if n < 2.0 {
                // single gene
                return (0.0, mu);
            }
            let var = ((s2[b] - n * mu * mu) / (n - 1.0)).max(0.0);
            (mu, var.sqrt())
        })
        .unzip();

    values
        .iter()
        .zip(bins)
        .map(|(&x, &b)| (x - bin_mean[b]) / bin_std[b])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn dataset(x: Array2<f32>) -> ExpressionData {
        let nn = x.nrows();
        let mm = x.ncols();
        ExpressionData::new(
            ExprMatrix::Dense(x),
            (0..nn).map(|i| format!("c{}", i).into()).collect(),
            (0..mm).map(|j| format!("g{}", j).into()).collect(),
            CellAnnotations::new(nn),
        )
        .unwrap()
    }

    #[test]
    fn bins_follow_right_closed_intervals() {
        let bins = equal_width_bins(&[0.0, 0.5, 1.0, 1.01, 2.0], 2);
        assert_eq!(bins, vec![0, 0, 0, 1, 1]);
        assert_eq!(equal_width_bins(&[3.0, 3.0], 20), vec![0, 0]);
    }

    #[test]
    fn single_gene_bin_is_divided_by_itself() {
        let values = [1.0, 2.0, 3.0, 5.0];
        let bins = [0, 0, 0, 1];
        let z = normalize_within_bins(&values, &bins, 2);
        assert_abs_diff_eq!(z[0], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[3], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn nan_values_do_not_enter_bin_statistics() {
        let values = [f64::NAN, 2.0, 4.0];
        let z = normalize_within_bins(&values, &[0, 0, 0], 1);
        assert!(z[0].is_nan());
        assert_abs_diff_eq!(z[1], -std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn variable_genes_rank_first() -> anyhow::Result<()> {
        // 40 cells; g0 and g3 switch between two levels, g2 is zero
        let x = Array2::from_shape_fn((40, 5), |(i, j)| match j {
            0 => if i % 2 == 0 { 3.0 } else { 0.1 },
            1 => 1.0,
            2 => 0.0,
            3 => if i % 4 == 0 { 2.0 } else { 0.5 },
            _ => 0.5 + 0.01 * (i % 3) as f32,
        });
        let data = dataset(x);

        let hvg = select_highly_variable_genes(&data, 2, 1)?;
        assert_eq!(hvg.selected_indices, vec![0, 3]);
        assert_eq!(hvg.selected_names, vec![Box::from("g0"), "g3".into()]);
        assert!(hvg.dispersions[2].is_nan());
        Ok(())
    }

    #[test]
    fn keeps_all_genes_when_asking_for_more() -> anyhow::Result<()> {
        let x = Array2::from_shape_fn((10, 3), |(i, j)| ((i * (j + 1)) % 5) as f32);
        let mut data = dataset(x);
        let hvg = subset_highly_variable_genes(&mut data, DEFAULT_N_TOP_GENES)?;
        assert_eq!(hvg.selected_indices, vec![0, 1, 2]);
        assert_eq!(data.num_genes(), 3);
        Ok(())
    }
}
