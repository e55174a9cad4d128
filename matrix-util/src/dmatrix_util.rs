use crate::traits::{MatOps, SampleOps};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

/// Fill a `dd x nn` matrix column by column. Each column draws from
/// its own generator seeded by `seed` and the column index, so the
/// result does not depend on the thread pool.
fn sample_columns<F>(dd: usize, nn: usize, seed: u64, draw: F) -> DMatrix<f32>
where
    F: Fn(&mut StdRng) -> f32 + Sync,
{
    let rvec: Vec<f32> = (0..nn)
        .into_par_iter()
        .flat_map_iter(|j| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(j as u64));
            (0..dd).map(|_| draw(&mut rng)).collect::<Vec<_>>()
        })
        .collect();

    DMatrix::<f32>::from_vec(dd, nn, rvec)
}

impl SampleOps for DMatrix<f32> {
    type Mat = DMatrix<f32>;

    fn rnorm(dd: usize, nn: usize, seed: u64) -> Self::Mat {
        sample_columns(dd, nn, seed, |rng| rng.sample::<f32, _>(StandardNormal))
    }
}

impl MatOps for DMatrix<f32> {
    type Mat = DMatrix<f32>;
    type Scalar = f32;

    fn column_means(&self) -> Vec<f32> {
        let nn = self.nrows().max(1) as f64;
        self.column_iter()
            .map(|x_j| (x_j.iter().map(|&x| x as f64).sum::<f64>() / nn) as f32)
            .collect()
    }

    fn centre_columns_inplace(&mut self) {
        let mu = self.column_means();
        for (mut x_j, mu_j) in self.column_iter_mut().zip(mu) {
            x_j.add_scalar_mut(-mu_j);
        }
    }

    fn centre_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.centre_columns_inplace();
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn seeded_sampling_is_reproducible() {
        let xx = DMatrix::<f32>::rnorm(30, 7, 42);
        let yy = DMatrix::<f32>::rnorm(30, 7, 42);
        let zz = DMatrix::<f32>::rnorm(30, 7, 43);
        assert_eq!(xx, yy);
        assert_ne!(xx, zz);
    }

    #[test]
    fn centred_columns() {
        let xx = DMatrix::<f32>::rnorm(100, 5, 7).add_scalar(3.0);
        let yy = xx.centre_columns();
        for y_j in yy.column_iter() {
            assert_abs_diff_eq!(y_j.sum(), 0.0, epsilon = 1e-3);
        }
        for (mu, x_j) in xx.column_means().iter().zip(xx.column_iter()) {
            assert_abs_diff_eq!(*mu, x_j.mean(), epsilon = 1e-4);
        }
    }
}
