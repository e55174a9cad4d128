use crate::common::*;

use matrix_util::knn_graph::{KnnGraph, KnnGraphArgs};

pub const DEFAULT_N_NEIGHBORS: usize = 10;
pub const DEFAULT_N_PCS: usize = 40;

///
/// Fuzzy kNN graph of cells over the leading principal components
/// stored in `obsm["X_pca"]`.
///
/// * `data` - expression data after [`crate::pca::run_pca`]
/// * `n_neighbors` - neighbourhood size, counting the cell itself
/// * `n_pcs` - number of leading components to use; all of them if
///   fewer are available
/// * `seed` - seed of the HNSW index for large inputs
///
pub fn compute_neighbors(
    data: &ExpressionData,
    n_neighbors: usize,
    n_pcs: usize,
    seed: u64,
) -> anyhow::Result<KnnGraph> {
    let pcs = data.obsm.get(PCA_KEY).ok_or_else(|| {
        anyhow::anyhow!("`{}` not found; run PCA before the neighbour graph", PCA_KEY)
    })?;

    if n_pcs == 0 {
        anyhow::bail!("number of principal components must be >= 1");
    }

    let npcs = n_pcs.min(pcs.ncols());
    if npcs < n_pcs {
        info!("only {} principal components available (asked {})", npcs, n_pcs);
    }

    let xx = pcs.columns(0, npcs).into_owned();

    let graph = KnnGraph::from_rows(
        &xx,
        &KnnGraphArgs {
            knn: n_neighbors,
            seed,
            ..Default::default()
        },
    )?;

    info!(
        "kNN graph: {} cells, {} edges, k = {}",
        graph.num_nodes(),
        graph.num_edges(),
        n_neighbors
    );

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_pcs(pcs: Mat) -> ExpressionData {
        let nn = pcs.nrows();
        let x = ndarray::Array2::<f32>::zeros((nn, 1));
        let mut data = ExpressionData::new(
            ExprMatrix::Dense(x),
            (0..nn).map(|i| format!("c{}", i).into()).collect(),
            vec!["g".into()],
            CellAnnotations::new(nn),
        )
        .unwrap();
        data.obsm.insert(PCA_KEY.into(), pcs);
        data
    }

    #[test]
    fn uses_only_the_leading_components() -> anyhow::Result<()> {
        // the first column separates two groups; the second would
        // group cells by parity instead
        let pcs = Mat::from_fn(20, 2, |i, j| match j {
            0 => (i / 10) as f32 * 100.0 + (i % 10) as f32 * 0.1,
            _ => (i % 2) as f32 * 1e4,
        });
        let data = with_pcs(pcs);

        let graph = compute_neighbors(&data, 5, 1, 0)?;
        assert_eq!(graph.num_nodes(), 20);
        for &(i, j) in graph.edges.iter() {
            assert_eq!(i / 10, j / 10);
        }
        Ok(())
    }

    #[test]
    fn missing_pca_is_an_error() {
        let mut data = with_pcs(Mat::zeros(3, 2));
        data.obsm.clear();
        assert!(compute_neighbors(&data, 3, 2, 0).is_err());
    }
}
