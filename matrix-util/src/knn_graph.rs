use crate::knn_match::{ColumnDict, VecPoint};

use indicatif::ParallelProgressIterator;
use log::info;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use rayon::prelude::*;

const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Below this many points neighbours are found by exhaustive search
pub const DEFAULT_EXACT_MAX_NODES: usize = 4096;

/// Symmetric k-nearest neighbour graph with fuzzy membership weights
pub struct KnnGraph {
    /// Directed neighbours of each node `(j, d_ij)`, closest first,
    /// excluding the node itself
    pub neighbours: Vec<Vec<(usize, f32)>>,
    /// Symmetric CSC matrix of fuzzy membership weights (n x n)
    pub adjacency: CscMatrix<f32>,
    /// Sorted edge list (i < j), deduplicated
    pub edges: Vec<(usize, usize)>,
    /// Symmetrized membership weights, parallel to `edges`
    pub weights: Vec<f32>,
    /// Number of nodes
    pub n_nodes: usize,
}

pub struct KnnGraphArgs {
    /// neighbourhood size, counting the node itself
    pub knn: usize,
    pub block_size: usize,
    /// use exhaustive search up to this many nodes, HNSW above
    pub exact_max_nodes: usize,
    /// seed of the HNSW index
    pub seed: u64,
}

impl Default for KnnGraphArgs {
    fn default() -> Self {
        Self {
            knn: 10,
            block_size: DEFAULT_BLOCK_SIZE,
            exact_max_nodes: DEFAULT_EXACT_MAX_NODES,
            seed: 0,
        }
    }
}

impl KnnGraph {
    /// Build a kNN graph from row vectors (cells × features).
    ///
    /// * `data` - matrix (n x d), where each row is a point
    /// * `args` - kNN graph construction parameters
    pub fn from_rows(data: &DMatrix<f32>, args: &KnnGraphArgs) -> anyhow::Result<KnnGraph> {
        let nn = data.nrows();
        if nn < 2 {
            anyhow::bail!("need at least 2 points to build a kNN graph, got {}", nn);
        }
        if args.knn < 2 {
            anyhow::bail!("neighbourhood size must be at least 2, got {}", args.knn);
        }

        let nquery = (args.knn - 1).min(nn - 1);

        /////////////////////////////////////////////////////////////////
        // step 1: searching nearest neighbours                        //
        /////////////////////////////////////////////////////////////////

        let neighbours = if nn <= args.exact_max_nodes {
            info!("exhaustive {}-NN search over {} points", nquery, nn);
            exact_neighbours(data, nquery, args.block_size)
        } else {
            info!("HNSW {}-NN search over {} points", nquery, nn);
            hnsw_neighbours(data, nquery, args)?
        };

        //////////////////////////////////////////////////////////
        // step 2: local fuzzy membership and fuzzy union       //
        //////////////////////////////////////////////////////////

        let target = (args.knn as f32).log2();

        let mut directed: Vec<((usize, usize), f32, bool)> = neighbours
            .par_iter()
            .enumerate()
            .flat_map_iter(|(i, nbr)| {
                let dists: Vec<f32> = nbr.iter().map(|&(_, d)| d).collect();
                let rho = nearest_positive(&dists);
                let sigma = smooth_knn_sigma(&dists, rho, target);
                nbr.iter()
                    .map(|&(j, d)| {
                        let w = directed_umap_weight(d, rho, sigma);
                        ((i.min(j), i.max(j)), w, i < j)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        directed.par_sort_by_key(|&(ij, _, forward)| (ij, forward));

        let mut edges = Vec::with_capacity(directed.len());
        let mut weights = Vec::with_capacity(directed.len());

        for &(ij, w, _) in directed.iter() {
            match edges.last() {
                Some(&last) if last == ij => {
                    if let Some(w_prev) = weights.last_mut() {
                        let w_ij: f32 = *w_prev;
                        *w_prev = w_ij + w - w_ij * w;
                    }
                }
                _ => {
                    edges.push(ij);
                    weights.push(w);
                }
            }
        }

        info!("{} edges after fuzzy union", edges.len());

        ///////////////////////////////////////////////
        // step 3: construct sparse network backbone //
        ///////////////////////////////////////////////

        let mut coo = CooMatrix::new(nn, nn);
        for (&(i, j), &w) in edges.iter().zip(weights.iter()) {
            coo.push(i, j, w);
            coo.push(j, i, w);
        }
        let adjacency = CscMatrix::from(&coo);

        Ok(KnnGraph {
            neighbours,
            adjacency,
            edges,
            weights,
            n_nodes: nn,
        })
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.n_nodes
    }
}

fn exact_neighbours(
    data: &DMatrix<f32>,
    nquery: usize,
    block_size: usize,
) -> Vec<Vec<(usize, f32)>> {
    let nn = data.nrows();
    let points: Vec<VecPoint> = data
        .row_iter()
        .map(|r| VecPoint {
            data: r.iter().cloned().collect(),
        })
        .collect();

    let jobs = create_jobs(nn, block_size);
    let njobs = jobs.len() as u64;

    let blocks: Vec<Vec<Vec<(usize, f32)>>> = jobs
        .into_par_iter()
        .progress_count(njobs)
        .map(|(lb, ub)| {
            (lb..ub)
                .map(|i| {
                    let mut dist: Vec<(usize, f32)> = (0..nn)
                        .filter(|&j| j != i)
                        .map(|j| (j, points[i].squared_distance(&points[j])))
                        .collect();
                    dist.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                    dist.truncate(nquery);
                    dist.into_iter().map(|(j, d)| (j, d.sqrt())).collect()
                })
                .collect()
        })
        .collect();

    blocks.into_iter().flatten().collect()
}

fn hnsw_neighbours(
    data: &DMatrix<f32>,
    nquery: usize,
    args: &KnnGraphArgs,
) -> anyhow::Result<Vec<Vec<(usize, f32)>>> {
    let nn = data.nrows();
    let dict = ColumnDict::from_dmatrix_rows(data, (0..nn).collect(), args.seed)?;

    let jobs = create_jobs(nn, args.block_size);
    let njobs = jobs.len() as u64;

    let blocks = jobs
        .into_par_iter()
        .progress_count(njobs)
        .map(|(lb, ub)| -> anyhow::Result<Vec<Vec<(usize, f32)>>> {
            (lb..ub).map(|i| dict.search_others(&i, nquery)).collect()
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(blocks.into_iter().flatten().collect())
}

/// Distance to the nearest neighbour that does not coincide with the
/// point (local connectivity `rho`)
fn nearest_positive(dists: &[f32]) -> f32 {
    let rho = dists
        .iter()
        .cloned()
        .filter(|&d| d > 0.0)
        .fold(f32::INFINITY, f32::min);
    if rho.is_finite() {
        rho
    } else {
        0.0
    }
}

/// Binary search for per-point sigma (UMAP's smooth_knn_dist).
///
/// Finds sigma such that: sum_j exp(-max(0, d_j - rho) / sigma) = target
fn smooth_knn_sigma(dists: &[f32], rho: f32, target: f32) -> f32 {
    const TOLERANCE: f32 = 1e-5;
    const MAX_ITER: usize = 64;
    const MIN_K_DIST_SCALE: f32 = 1e-3;

    let mut lo = 0.0f32;
    let mut hi = f32::INFINITY;
    let mut mid = 1.0f32;

    for _ in 0..MAX_ITER {
        let psum: f32 = dists
            .iter()
            .map(|&d| {
                let gap = d - rho;
                if gap > 0.0 {
                    (-gap / mid).exp()
                } else {
                    1.0
                }
            })
            .sum();

        if (psum - target).abs() < TOLERANCE {
            break;
        }

        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            if hi.is_infinite() {
                mid *= 2.0;
            } else {
                mid = (lo + hi) / 2.0;
            }
        }
    }

    let mean_dist: f32 = dists.iter().sum::<f32>() / dists.len().max(1) as f32;
    mid.max(MIN_K_DIST_SCALE * mean_dist).max(f32::EPSILON)
}

/// Compute a single directed UMAP membership weight.
fn directed_umap_weight(d: f32, rho: f32, sigma: f32) -> f32 {
    if !d.is_finite() || sigma <= 0.0 {
        return 0.0;
    }
    let gap = d - rho;
    if gap <= 0.0 {
        1.0
    } else {
        (-gap / sigma).exp()
    }
}

fn create_jobs(ntot: usize, block_size: usize) -> Vec<(usize, usize)> {
    let block_size = if block_size == 0 {
        DEFAULT_BLOCK_SIZE
    } else {
        block_size
    };
    let nblock = ntot.div_ceil(block_size);
    (0..nblock)
        .map(|block| {
            let lb = block * block_size;
            let ub = ((block + 1) * block_size).min(ntot);
            (lb, ub)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight clusters of 5 points each in 2D, well separated
    fn two_cluster_matrix() -> DMatrix<f32> {
        DMatrix::from_row_slice(
            10,
            2,
            &[
                // Cluster A near origin
                0.0, 0.0, //
                0.1, 0.0, //
                0.0, 0.1, //
                0.1, 0.1, //
                0.05, 0.05, //
                // Cluster B far away
                10.0, 10.0, //
                10.1, 10.0, //
                10.0, 10.1, //
                10.1, 10.1, //
                10.05, 10.05, //
            ],
        )
    }

    fn args(knn: usize, exact_max_nodes: usize) -> KnnGraphArgs {
        KnnGraphArgs {
            knn,
            block_size: 3,
            exact_max_nodes,
            seed: 7,
        }
    }

    #[test]
    fn two_clusters_no_cross_edges() -> anyhow::Result<()> {
        let data = two_cluster_matrix();
        let graph = KnnGraph::from_rows(&data, &args(5, 100))?;

        assert_eq!(graph.num_nodes(), 10);
        assert_eq!(graph.edges.len(), graph.weights.len());
        for &(i, j) in &graph.edges {
            assert!(i < j, "edge ({}, {}) not canonical", i, j);
            let same_cluster = (i < 5 && j < 5) || (i >= 5 && j >= 5);
            assert!(same_cluster, "cross-cluster edge ({}, {})", i, j);
        }
        for nbr in &graph.neighbours {
            assert_eq!(nbr.len(), 4);
            for k in 1..nbr.len() {
                assert!(nbr[k - 1].1 <= nbr[k].1);
            }
        }
        Ok(())
    }

    #[test]
    fn hnsw_matches_exhaustive_on_separated_clusters() -> anyhow::Result<()> {
        let data = two_cluster_matrix();
        let exact = KnnGraph::from_rows(&data, &args(5, 100))?;
        let hnsw = KnnGraph::from_rows(&data, &args(5, 0))?;
        assert_eq!(exact.edges, hnsw.edges);
        Ok(())
    }

    #[test]
    fn fuzzy_weights_symmetric_and_bounded() -> anyhow::Result<()> {
        let data = two_cluster_matrix();
        let graph = KnnGraph::from_rows(&data, &args(4, 100))?;

        for &w in &graph.weights {
            assert!(w > 0.0 && w <= 1.0, "weight {} out of (0, 1]", w);
        }

        let entries: Vec<(usize, usize, f32)> = graph
            .adjacency
            .triplet_iter()
            .map(|(i, j, &w)| (i, j, w))
            .collect();
        assert_eq!(entries.len(), 2 * graph.num_edges());
        for &(i, j, w) in &entries {
            assert!(entries.contains(&(j, i, w)));
        }

        // every node reaches its nearest neighbour with full membership
        for (i, nbr) in graph.neighbours.iter().enumerate() {
            let (j, _) = nbr[0];
            let k = graph
                .edges
                .iter()
                .position(|&e| e == (i.min(j), i.max(j)))
                .unwrap();
            assert!((graph.weights[k] - 1.0).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn too_few_points() {
        let data = DMatrix::<f32>::zeros(1, 3);
        assert!(KnnGraph::from_rows(&data, &KnnGraphArgs::default()).is_err());
    }

    #[test]
    fn smooth_knn_sigma_hits_target() {
        let dists = [0.1, 0.2, 0.3, 0.5, 1.0];
        let rho = 0.1;
        let target = (5.0f32).log2();

        let sigma = smooth_knn_sigma(&dists, rho, target);
        assert!(sigma > 0.0);

        let psum: f32 = dists
            .iter()
            .map(|&d| directed_umap_weight(d, rho, sigma))
            .sum();
        assert!((psum - target).abs() < 0.1, "psum {:.3} vs {:.3}", psum, target);
    }

    #[test]
    fn create_jobs_blocks() {
        assert_eq!(create_jobs(10, 3), vec![(0, 3), (3, 6), (6, 9), (9, 10)]);
        assert_eq!(create_jobs(1, 100), vec![(0, 1)]);
        assert_eq!(create_jobs(5, 0), vec![(0, 5)]);
    }
}
