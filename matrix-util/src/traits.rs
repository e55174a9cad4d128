/// Randomized low-rank decomposition
pub trait RandomizedAlgs {
    type OutMat;
    type DVec;

    /// Truncated SVD `X ≈ U diag(S) V'` with reproducible random
    /// projections
    ///
    /// * `max_rank` - number of components to keep
    /// * `seed` - random seed for the test matrix
    fn rsvd(&self, max_rank: usize, seed: u64)
        -> anyhow::Result<(Self::OutMat, Self::DVec, Self::OutMat)>;
}

/// Column-wise centring
pub trait MatOps {
    type Mat;
    type Scalar;

    fn column_means(&self) -> Vec<Self::Scalar>;
    fn centre_columns_inplace(&mut self);
    fn centre_columns(&self) -> Self::Mat;
}

/// Operations to sample random matrices from a seeded generator. The
/// same `seed` always gives the same matrix, regardless of how many
/// threads do the work.
pub trait SampleOps {
    type Mat;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm(dd: usize, nn: usize, seed: u64) -> Self::Mat;
}
