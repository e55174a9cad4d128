use crate::traits::{RandomizedAlgs, SampleOps};
use log::debug;
use nalgebra::{DMatrix, DVector};

type Mat = DMatrix<f32>;
type Vec = DVector<f32>;

const DEFAULT_POWER_ITER: usize = 5;
const DEFAULT_OVERSAMPLE: usize = 10;

impl RandomizedAlgs for Mat {
    type OutMat = Mat;
    type DVec = Vec;

    fn rsvd(&self, max_rank: usize, seed: u64) -> anyhow::Result<(Mat, Vec, Mat)> {
        let mut rsvd = RandomizedSVD::new(max_rank, DEFAULT_POWER_ITER, seed);
        rsvd.compute(self)?;
        Ok((
            rsvd.matrix_u().clone(),
            rsvd.singular_values().clone(),
            rsvd.matrix_v().clone(),
        ))
    }
}

/// Randomized SVD
///
/// Alg 4.4 of Halko et al. (2009): randomized subspace iteration with
/// a QR re-orthonormalization after every multiplication, followed by
/// an exact SVD of the small projected matrix `Q'X`.
///
/// Singular values come out in decreasing order.
pub struct RandomizedSVD {
    max_rank: usize,
    iter: usize,
    seed: u64,
    u_vectors: Mat,
    singular_values: Vec,
    v_vectors: Mat,
}

impl RandomizedSVD {
    pub fn new(max_rank: usize, iter: usize, seed: u64) -> Self {
        Self {
            max_rank,
            iter,
            seed,
            u_vectors: Mat::zeros(0, 0),
            singular_values: Vec::zeros(0),
            v_vectors: Mat::zeros(0, 0),
        }
    }

    pub fn matrix_u(&self) -> &Mat {
        &self.u_vectors
    }

    pub fn matrix_v(&self) -> &Mat {
        &self.v_vectors
    }

    pub fn singular_values(&self) -> &Vec {
        &self.singular_values
    }

    pub fn compute(&mut self, xx: &Mat) -> anyhow::Result<()> {
        let nr = xx.nrows();
        let nc = xx.ncols();
        let full_rank = nr.min(nc);

        if full_rank == 0 {
            anyhow::bail!("cannot decompose an empty [{} x {}] matrix", nr, nc);
        }

        let rank = if self.max_rank > 0 {
            self.max_rank.min(full_rank)
        } else {
            full_rank
        };

        let nsub = (rank + DEFAULT_OVERSAMPLE).min(full_rank);
        let qq = self.rand_subspace_iteration(xx, nsub);

        let bb = qq.transpose() * xx;
        debug!("final svd on [{} x {}]", bb.nrows(), bb.ncols());

        let svd = bb.svd(true, true);

        let (svd_u, svd_vt) = match (svd.u, svd.v_t) {
            (Some(u), Some(vt)) => (u, vt),
            _ => anyhow::bail!("SVD failed on the projected matrix"),
        };

        let mut order: std::vec::Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
        order.truncate(rank);

        let uu = &qq * svd_u;
        self.u_vectors = uu.select_columns(order.iter());
        self.v_vectors = svd_vt.transpose().select_columns(order.iter());
        self.singular_values = Vec::from_iterator(
            order.len(),
            order.iter().map(|&k| svd.singular_values[k]),
        );

        Ok(())
    }

    /// Find an orthonormal matrix `Q` whose range approximates the
    /// range of `xx`
    fn rand_subspace_iteration(&self, xx: &Mat, nsub: usize) -> Mat {
        let omega = Mat::rnorm(xx.ncols(), nsub, self.seed);
        let mut qq = (xx * omega).qr().q();

        for i in 0..self.iter {
            let qt = (xx.transpose() * &qq).qr().q();
            qq = (xx * qt).qr().q();
            debug!("subspace iteration {:>3}", i + 1);
        }

        qq
    }
}
