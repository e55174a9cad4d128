use ndarray::{Array1, ArrayView1};

/// Per-feature sufficient statistics over a stream of observations.
///
/// Observations can arrive as dense rows ([`add_row`]) or as the
/// non-zero entries of a sparse row ([`add_entry`] after
/// [`add_observations`]); implicit zeros only contribute to the
/// observation count. Sums are kept in `f64`.
///
/// [`add_row`]: RunningStatistics::add_row
/// [`add_entry`]: RunningStatistics::add_entry
/// [`add_observations`]: RunningStatistics::add_observations
#[derive(Clone, Debug)]
pub struct RunningStatistics {
    nobs: usize,
    npos: Array1<f64>,
    s1: Array1<f64>,
    s2: Array1<f64>,
}

impl RunningStatistics {
    /// * `nfeatures` - the number of features (columns) to track
    pub fn new(nfeatures: usize) -> Self {
        Self {
            nobs: 0,
            npos: Array1::zeros(nfeatures),
            s1: Array1::zeros(nfeatures),
            s2: Array1::zeros(nfeatures),
        }
    }

    pub fn nfeatures(&self) -> usize {
        self.s1.len()
    }

    pub fn nobs(&self) -> usize {
        self.nobs
    }

    /// Add one dense observation
    pub fn add_row(&mut self, xx: &ArrayView1<f32>) {
        debug_assert_eq!(xx.len(), self.nfeatures());
        self.nobs += 1;
        for (j, &x) in xx.iter().enumerate() {
            self.accumulate(j, x);
        }
    }

    /// Register `n` observations whose non-zero entries will be added
    /// by [`RunningStatistics::add_entry`]
    pub fn add_observations(&mut self, n: usize) {
        self.nobs += n;
    }

    /// Add a single (non-zero) entry of feature `j`
    pub fn add_entry(&mut self, j: usize, x: f32) {
        self.accumulate(j, x);
    }

    /// Combine two partial statistics, e.g., from a parallel fold
    pub fn merge(mut self, other: Self) -> Self {
        debug_assert_eq!(self.nfeatures(), other.nfeatures());
        self.nobs += other.nobs;
        self.npos += &other.npos;
        self.s1 += &other.s1;
        self.s2 += &other.s2;
        self
    }

    fn accumulate(&mut self, j: usize, x: f32) {
        if x.is_finite() {
            let x = x as f64;
            if x > 0.0 {
                self.npos[j] += 1.0;
            }
            self.s1[j] += x;
            self.s2[j] += x * x;
        }
    }

    pub fn sum(&self) -> Array1<f64> {
        self.s1.clone()
    }

    /// Fraction of observations with a positive value
    pub fn fraction_positives(&self) -> Array1<f64> {
        let nn = self.nobs.max(1) as f64;
        self.npos.mapv(|x| x / nn)
    }

    pub fn mean(&self) -> Array1<f64> {
        let nn = self.nobs.max(1) as f64;
        self.s1.mapv(|x| x / nn)
    }

    /// Variance with `ddof` delta degrees of freedom; `NaN` if there
    /// are not more than `ddof` observations
    pub fn variance(&self, ddof: usize) -> Array1<f64> {
        if self.nobs <= ddof {
            return Array1::from_elem(self.nfeatures(), f64::NAN);
        }
        let nn = self.nobs as f64;
        let denom = (self.nobs - ddof) as f64;
        let mut ret = Array1::zeros(self.nfeatures());
        ndarray::Zip::from(&mut ret)
            .and(&self.s1)
            .and(&self.s2)
            .for_each(|v, &s1, &s2| {
                let mu = s1 / nn;
                *v = ((s2 - nn * mu * mu) / denom).max(0.0);
            });
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn dense_and_sparse_agree() {
        let xx = array![[1.0_f32, 0.0, 2.0], [0.0, 0.0, 4.0], [3.0, 0.0, 0.0]];

        let mut dense = RunningStatistics::new(3);
        for row in xx.rows() {
            dense.add_row(&row);
        }

        let mut sparse = RunningStatistics::new(3);
        sparse.add_observations(3);
        for ((_, j), &x) in xx.indexed_iter() {
            if x != 0.0 {
                sparse.add_entry(j, x);
            }
        }

        assert_eq!(dense.mean(), sparse.mean());
        assert_eq!(dense.variance(1), sparse.variance(1));

        assert_abs_diff_eq!(dense.mean()[0], 4.0 / 3.0, epsilon = 1e-12);
        // values 1, 0, 3: sample variance = 7/3
        assert_abs_diff_eq!(dense.variance(1)[0], 7.0 / 3.0, epsilon = 1e-12);
        assert_eq!(dense.variance(1)[1], 0.0);
        assert_abs_diff_eq!(dense.fraction_positives()[2], 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn merge_partial_statistics() {
        let mut aa = RunningStatistics::new(1);
        aa.add_row(&array![1.0_f32].view());
        let mut bb = RunningStatistics::new(1);
        bb.add_row(&array![3.0_f32].view());

        let cc = aa.merge(bb);
        assert_eq!(cc.nobs(), 2);
        assert_abs_diff_eq!(cc.mean()[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cc.variance(1)[0], 2.0, epsilon = 1e-12);
        assert!(RunningStatistics::new(1).variance(1)[0].is_nan());
    }
}
