use crate::common::*;

use indicatif::ProgressIterator;
use matrix_util::knn_graph::KnnGraph;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

pub const DEFAULT_MIN_DIST: f32 = 0.5;
pub const DEFAULT_SPREAD: f32 = 1.0;

const GRAD_CLIP: f32 = 4.0;
const INIT_SCALE: f32 = 10.0;
const INIT_NOISE: f64 = 1e-4;
const SMALL_DATA: usize = 10_000;

/// number of points where the membership curve is fitted
const CURVE_POINTS: usize = 300;

#[derive(Clone, Debug)]
pub struct UmapArgs {
    pub min_dist: f32,
    pub spread: f32,
    /// `None`: 500 epochs up to 10k cells, 200 beyond
    pub n_epochs: Option<usize>,
    pub learning_rate: f32,
    /// negative samples per positive sample
    pub negative_sample_rate: usize,
    pub seed: u64,
}

impl Default for UmapArgs {
    fn default() -> Self {
        Self {
            min_dist: DEFAULT_MIN_DIST,
            spread: DEFAULT_SPREAD,
            n_epochs: None,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            seed: DEFAULT_SEED,
        }
    }
}

///
/// Fit `a` and `b` of the low-dimensional membership curve
/// `1 / (1 + a d^(2b))` to the target
///
/// ```text
/// 1                              if d < min_dist
/// exp(-(d - min_dist) / spread)  otherwise
/// ```
///
/// over `d` in `[0, 3 * spread]`, by Levenberg-Marquardt least squares
/// starting from `a = b = 1`.
///
pub fn find_ab_params(spread: f32, min_dist: f32) -> anyhow::Result<(f32, f32)> {
    if spread.is_nan() || spread <= 0.0 {
        anyhow::bail!("spread must be positive, got {}", spread);
    }
    if min_dist < 0.0 || min_dist > spread {
        anyhow::bail!(
            "min_dist must be in [0, spread = {}], got {}",
            spread,
            min_dist
        );
    }

    let spread = spread as f64;
    let min_dist = min_dist as f64;
    let step = 3.0 * spread / (CURVE_POINTS - 1) as f64;

    let xs: Vec<f64> = (0..CURVE_POINTS).map(|i| i as f64 * step).collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| {
            if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            }
        })
        .collect();

    let cost = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(ys.iter())
            .map(|(&x, &y)| {
                let r = 1.0 / (1.0 + a * x.powf(2.0 * b)) - y;
                r * r
            })
            .sum()
    };

    let (mut a, mut b) = (1.0_f64, 1.0_f64);
    let mut lambda = 1e-3;
    let mut current = cost(a, b);

    for _ in 0..500 {
        // normal equations of the Gauss-Newton step
        let (mut jaa, mut jab, mut jbb, mut ga, mut gb) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            let xb = x.powf(2.0 * b);
            let denom = 1.0 + a * xb;
            let r = 1.0 / denom - y;
            let da = -xb / (denom * denom);
            let db = if x > 0.0 {
                -2.0 * a * xb * x.ln() / (denom * denom)
            } else {
                0.0
            };
            jaa += da * da;
            jab += da * db;
            jbb += db * db;
            ga += da * r;
            gb += db * r;
        }

        let mut accepted = false;
        while lambda < 1e12 {
            let haa = jaa * (1.0 + lambda);
            let hbb = jbb * (1.0 + lambda);
            let det = haa * hbb - jab * jab;
            if det.abs() < f64::MIN_POSITIVE {
                lambda *= 10.0;
                continue;
            }
            let step_a = -(hbb * ga - jab * gb) / det;
            let step_b = -(haa * gb - jab * ga) / det;
            let next = cost(a + step_a, b + step_b);
            if next.is_finite() && next <= current {
                a += step_a;
                b += step_b;
                lambda = (lambda / 10.0).max(1e-12);
                let improved = current - next;
                current = next;
                accepted = improved > 1e-15 * current.max(1e-300);
                break;
            }
            lambda *= 10.0;
        }

        if !accepted {
            break;
        }
    }

    if !(a.is_finite() && b.is_finite() && a > 0.0 && b > 0.0) {
        anyhow::bail!("failed to fit the membership curve: a = {}, b = {}", a, b);
    }

    Ok((a as f32, b as f32))
}

/// Number of epochs when none is given
pub fn default_n_epochs(n_cells: usize) -> usize {
    if n_cells <= SMALL_DATA {
        500
    } else {
        200
    }
}

///
/// Starting layout: the first two columns of `pcs` rescaled to
/// `[0, 10]` with a little Gaussian noise. A missing column is drawn
/// uniformly from `[0, 10]`.
///
/// * `pcs` - principal component scores (cells x comps)
/// * `seed` - random seed
///
pub fn initial_layout(pcs: &Mat, seed: u64) -> anyhow::Result<Vec<[f32; 2]>> {
    let nn = pcs.nrows();
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, INIT_NOISE)?;

    let mut ret = vec![[0_f32; 2]; nn];

    for d in 0..2 {
        if d < pcs.ncols() {
            let col = pcs.column(d);
            let lo = col.min();
            let hi = col.max();
            let scale = if hi > lo { INIT_SCALE / (hi - lo) } else { 0.0 };
            for (i, &x) in col.iter().enumerate() {
                ret[i][d] = (x - lo) * scale;
            }
        } else {
            for pt in ret.iter_mut() {
                pt[d] = rng.random_range(0.0..INIT_SCALE);
            }
        }
    }

    for pt in ret.iter_mut() {
        for x in pt.iter_mut() {
            *x += noise.sample(&mut rng) as f32;
        }
    }

    Ok(ret)
}

fn clip(x: f32) -> f32 {
    x.clamp(-GRAD_CLIP, GRAD_CLIP)
}

fn squared_distance(x: &[f32; 2], y: &[f32; 2]) -> f32 {
    let d0 = x[0] - y[0];
    let d1 = x[1] - y[1];
    d0 * d0 + d1 * d1
}

///
/// Optimize the layout by stochastic gradient descent on the fuzzy
/// cross entropy.
///
/// Each directed edge is sampled with a frequency proportional to its
/// weight; edges lighter than `max_weight / n_epochs` are never
/// sampled. Both end points move along the attractive gradient.
/// Every positive sample is followed by negative samples that push
/// the head away from random points. The learning rate decays
/// linearly to zero.
///
pub fn optimize_layout(
    embedding: &mut [[f32; 2]],
    graph: &KnnGraph,
    a: f32,
    b: f32,
    n_epochs: usize,
    args: &UmapArgs,
) -> anyhow::Result<()> {
    let nn = embedding.len();
    if graph.num_nodes() != nn {
        anyhow::bail!(
            "graph has {} nodes for {} points",
            graph.num_nodes(),
            nn
        );
    }
    if n_epochs == 0 || nn == 0 {
        return Ok(());
    }

    // directed edges (head, tail, weight), ordered by head
    let mut heads = vec![];
    let mut tails = vec![];
    let mut weights = vec![];
    for (head, col) in graph.adjacency.col_iter().enumerate() {
        for (&tail, &w) in col.row_indices().iter().zip(col.values()) {
            heads.push(head);
            tails.push(tail);
            weights.push(w);
        }
    }

    let w_max = weights.iter().copied().fold(0_f32, f32::max);
    if w_max <= 0.0 {
        info!("no edges to optimize; keeping the initial layout");
        return Ok(());
    }

    let w_min = w_max / n_epochs as f32;
    let epochs_per_sample: Vec<f32> = weights
        .iter()
        .map(|&w| if w >= w_min { w_max / w } else { -1.0 })
        .collect();

    let neg_rate = args.negative_sample_rate.max(1) as f32;
    let epochs_per_negative: Vec<f32> = epochs_per_sample.iter().map(|&e| e / neg_rate).collect();

    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    let mut rng = StdRng::seed_from_u64(args.seed);
    let two_a_b = 2.0 * a * b;

    info!(
        "UMAP: {} epochs over {} directed edges (a = {:.4}, b = {:.4})",
        n_epochs,
        heads.len(),
        a,
        b
    );

    for epoch in (0..n_epochs).progress_count(n_epochs as u64) {
        let n = epoch as f32;
        let alpha = args.learning_rate * (1.0 - n / n_epochs as f32);

        for e in 0..heads.len() {
            if epochs_per_sample[e] <= 0.0 || next_sample[e] > n {
                continue;
            }

            let (j, k) = (heads[e], tails[e]);
            let current = embedding[j];
            let other = embedding[k];
            let dist_sq = squared_distance(&current, &other);

            let coeff = if dist_sq > 0.0 {
                -two_a_b * dist_sq.powf(b - 1.0) / (a * dist_sq.powf(b) + 1.0)
            } else {
                0.0
            };

            for d in 0..2 {
                let grad = clip(coeff * (current[d] - other[d])) * alpha;
                embedding[j][d] += grad;
                embedding[k][d] -= grad;
            }

            next_sample[e] += epochs_per_sample[e];

            let n_neg = ((n - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;

            for _ in 0..n_neg {
                let k = rng.random_range(0..nn);
                if k == j {
                    continue;
                }
                let current = embedding[j];
                let other = embedding[k];
                let dist_sq = squared_distance(&current, &other);

                let coeff = if dist_sq > 0.0 {
                    2.0 * b / ((0.001 + dist_sq) * (a * dist_sq.powf(b) + 1.0))
                } else {
                    0.0
                };

                for d in 0..2 {
                    let grad = if coeff > 0.0 {
                        clip(coeff * (current[d] - other[d]))
                    } else {
                        GRAD_CLIP
                    };
                    embedding[j][d] += grad * alpha;
                }
            }

            next_negative[e] += n_neg as f32 * epochs_per_negative[e];
        }
    }

    Ok(())
}

///
/// Two-dimensional UMAP layout of the kNN graph, initialized from the
/// PCA scores in `obsm["X_pca"]` and stored as `obsm["X_umap"]`
///
pub fn run_umap(
    data: &mut ExpressionData,
    graph: &KnnGraph,
    args: &UmapArgs,
) -> anyhow::Result<Mat> {
    let nn = data.num_cells();
    let (a, b) = find_ab_params(args.spread, args.min_dist)?;

    let empty = Mat::zeros(nn, 0);
    let pcs = data.obsm.get(PCA_KEY).unwrap_or(&empty);
    let mut embedding = initial_layout(pcs, args.seed)?;

    let n_epochs = args.n_epochs.unwrap_or_else(|| default_n_epochs(nn));
    optimize_layout(&mut embedding, graph, a, b, n_epochs, args)?;

    let ret = Mat::from_fn(nn, 2, |i, d| embedding[i][d]);
    data.obsm.insert(UMAP_KEY.into(), ret.clone());
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use matrix_util::knn_graph::KnnGraphArgs;
    use matrix_util::traits::SampleOps;

    #[test]
    fn membership_curve_parameters() -> anyhow::Result<()> {
        let (a, b) = find_ab_params(1.0, 0.1)?;
        assert_abs_diff_eq!(a, 1.577, epsilon = 2e-2);
        assert_abs_diff_eq!(b, 0.895, epsilon = 2e-2);

        let (a, b) = find_ab_params(1.0, 0.5)?;
        assert_abs_diff_eq!(a, 0.583, epsilon = 2e-2);
        assert_abs_diff_eq!(b, 1.334, epsilon = 2e-2);
        Ok(())
    }

    #[test]
    fn invalid_curve_settings() {
        assert!(find_ab_params(0.0, 0.1).is_err());
        assert!(find_ab_params(1.0, 2.0).is_err());
    }

    #[test]
    fn initial_layout_is_rescaled() -> anyhow::Result<()> {
        let pcs = Mat::from_fn(5, 1, |i, _| i as f32 * 3.0 - 1.0);
        let init = initial_layout(&pcs, 1)?;
        assert_abs_diff_eq!(init[0][0], 0.0, epsilon = 1e-2);
        assert_abs_diff_eq!(init[4][0], 10.0, epsilon = 1e-2);
        for pt in init.iter() {
            assert!(pt[1] > -0.1 && pt[1] < 10.1);
        }
        Ok(())
    }

    fn two_clusters() -> Mat {
        let noise = Mat::rnorm(60, 5, 17);
        Mat::from_fn(60, 5, |i, j| {
            let offset = if i < 30 { 0.0 } else { 20.0 };
            offset + noise[(i, j)]
        })
    }

    fn layout_of(xx: &Mat, seed: u64) -> anyhow::Result<Vec<[f32; 2]>> {
        let graph = KnnGraph::from_rows(
            xx,
            &KnnGraphArgs {
                knn: 8,
                ..Default::default()
            },
        )?;
        let args = UmapArgs {
            seed,
            ..Default::default()
        };
        let (a, b) = find_ab_params(args.spread, args.min_dist)?;
        let mut emb = initial_layout(xx, seed)?;
        optimize_layout(&mut emb, &graph, a, b, 200, &args)?;
        Ok(emb)
    }

    #[test]
    fn same_seed_same_layout() -> anyhow::Result<()> {
        let xx = two_clusters();
        let e1 = layout_of(&xx, 3)?;
        let e2 = layout_of(&xx, 3)?;
        assert_eq!(e1, e2);
        assert!(e1.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
        Ok(())
    }

    #[test]
    fn separated_clusters_stay_apart() -> anyhow::Result<()> {
        let xx = two_clusters();
        let emb = layout_of(&xx, 0)?;

        let centroid = |range: std::ops::Range<usize>| {
            let n = range.len() as f32;
            let mut c = [0_f32; 2];
            for i in range {
                c[0] += emb[i][0] / n;
                c[1] += emb[i][1] / n;
            }
            c
        };
        let c0 = centroid(0..30);
        let c1 = centroid(30..60);

        for (i, pt) in emb.iter().enumerate() {
            let (own, other) = if i < 30 { (c0, c1) } else { (c1, c0) };
            assert!(squared_distance(pt, &own) < squared_distance(pt, &other));
        }
        Ok(())
    }
}
