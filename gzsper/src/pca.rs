use crate::common::*;

use matrix_util::traits::{MatOps, RandomizedAlgs};

pub const DEFAULT_N_COMPS: usize = 50;

pub struct PcaOut {
    /// principal component scores `U * S` (cells x comps)
    pub scores: Mat,
    /// gene loadings (genes x comps), unit columns
    pub loadings: Mat,
    pub singular_values: DVec,
    /// fraction of the total variance explained by each component
    pub variance_ratio: Vec<f32>,
}

/// Dense copy of the expression matrix as a `nalgebra` matrix, filled
/// straight from the stored values
pub fn to_dmatrix(x: &ExprMatrix) -> Mat {
    match x {
        ExprMatrix::Dense(dense) => {
            Mat::from_fn(dense.nrows(), dense.ncols(), |i, j| dense[[i, j]])
        }
        ExprMatrix::Sparse(csr) => {
            let mut ret = Mat::zeros(csr.nrows(), csr.ncols());
            for (i, row) in csr.row_iter().enumerate() {
                for (&j, &v) in row.col_indices().iter().zip(row.values().iter()) {
                    ret[(i, j)] += v;
                }
            }
            ret
        }
    }
}

///
/// Principal component analysis of the rows of `xx` by randomized SVD
/// of the column-centred matrix.
///
/// Keeps `min(n_comps, min(nrows, ncols) - 1)` components. Each loading
/// vector is flipped so that its entry of largest magnitude is positive.
///
/// * `xx` - observations x features
/// * `n_comps` - requested number of components
/// * `seed` - random seed of the projection
///
pub fn fit_pca(xx: &Mat, n_comps: usize, seed: u64) -> anyhow::Result<PcaOut> {
    let (nn, mm) = xx.shape();
    if nn < 2 || mm < 2 {
        anyhow::bail!(
            "PCA needs at least 2 cells and 2 genes, got {} cells x {} genes",
            nn,
            mm
        );
    }
    if n_comps == 0 {
        anyhow::bail!("number of principal components must be >= 1");
    }

    let kk = n_comps.min(nn.min(mm) - 1);
    let xc = xx.centre_columns();

    info!("PCA: {} components of [{} x {}]", kk, nn, mm);

    let (mut uu, ss, mut vv) = xc.rsvd(kk, seed)?;

    for k in 0..vv.ncols() {
        let imax = vv.column(k).iamax();
        if vv[(imax, k)] < 0.0 {
            vv.column_mut(k).neg_mut();
            uu.column_mut(k).neg_mut();
        }
    }

    let mut scores = uu;
    for (mut u_k, &s_k) in scores.column_iter_mut().zip(ss.iter()) {
        u_k *= s_k;
    }

    let denom = (nn - 1) as f64;
    let total_var = xc.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / denom;
    let variance_ratio = ss
        .iter()
        .map(|&s| {
            if total_var > 0.0 {
                ((s as f64) * (s as f64) / denom / total_var) as f32
            } else {
                0.0
            }
        })
        .collect();

    Ok(PcaOut {
        scores,
        loadings: vv,
        singular_values: ss,
        variance_ratio,
    })
}

/// PCA of the expression matrix; scores are stored as `obsm["X_pca"]`
pub fn run_pca(data: &mut ExpressionData, n_comps: usize, seed: u64) -> anyhow::Result<PcaOut> {
    let xx = to_dmatrix(&data.x);
    let out = fit_pca(&xx, n_comps, seed)?;
    data.obsm.insert(PCA_KEY.into(), out.scores.clone());
    Ok(out)
}
