use indicatif::ParallelProgressIterator;
use matrix_util::ndarray_stat::RunningStatistics;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{Array2, Axis};
use rayon::prelude::*;

const DEFAULT_BLOCK_SIZE: usize = 1000;

/// Which dimension the pointers of a compressed sparse matrix run
/// over
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexPointerType {
    /// compressed sparse rows
    Row,
    /// compressed sparse columns
    Column,
}

pub struct ValuesIndicesPointers<'a> {
    pub values: &'a [f32],
    pub indices: &'a [u64],
    pub indptr: &'a [u64],
}

/// Cells x genes expression values, either dense or compressed sparse
/// rows
#[derive(Clone, Debug)]
pub enum ExprMatrix {
    Dense(Array2<f32>),
    Sparse(CsrMatrix<f32>),
}

impl ExprMatrix {
    /// Assemble a matrix from the three arrays of a compressed sparse
    /// layout. Duplicate entries are summed and indices need not be
    /// sorted.
    ///
    /// * `parts` - values, minor indices and major pointers
    /// * `pointer_type` - CSR (`Row`) or CSC (`Column`)
    /// * `shape` - (number of cells, number of genes)
    pub fn from_compressed(
        parts: ValuesIndicesPointers,
        pointer_type: IndexPointerType,
        shape: (usize, usize),
    ) -> anyhow::Result<Self> {
        let (nrows, ncols) = shape;
        let (nmajor, nminor) = match pointer_type {
            IndexPointerType::Row => (nrows, ncols),
            IndexPointerType::Column => (ncols, nrows),
        };

        let ValuesIndicesPointers {
            values,
            indices,
            indptr,
        } = parts;

        if values.len() != indices.len() {
            return Err(anyhow::anyhow!(
                "`data` and `indices` have different sizes: {} vs {}",
                values.len(),
                indices.len()
            ));
        }
        if indptr.len() != nmajor + 1 {
            return Err(anyhow::anyhow!(
                "`indptr` has {} entries, expected {}",
                indptr.len(),
                nmajor + 1
            ));
        }
        if indptr.last().map(|&x| x as usize) != Some(values.len()) {
            return Err(anyhow::anyhow!(
                "`indptr` does not end at the number of stored values {}",
                values.len()
            ));
        }

        let nnz = values.len();
        let mut row_indices = Vec::with_capacity(nnz);
        let mut col_indices = Vec::with_capacity(nnz);

        for major in 0..nmajor {
            let start = indptr[major] as usize;
            let end = indptr[major + 1] as usize;
            if start > end {
                return Err(anyhow::anyhow!("`indptr` decreases at {}", major));
            }
            for &minor in &indices[start..end] {
                let minor = minor as usize;
                if minor >= nminor {
                    return Err(anyhow::anyhow!(
                        "index {} out of bounds for dimension {}",
                        minor,
                        nminor
                    ));
                }
                match pointer_type {
                    IndexPointerType::Row => {
                        row_indices.push(major);
                        col_indices.push(minor);
                    }
                    IndexPointerType::Column => {
                        row_indices.push(minor);
                        col_indices.push(major);
                    }
                }
            }
        }

        let coo = CooMatrix::try_from_triplets(
            nrows,
            ncols,
            row_indices,
            col_indices,
            values.to_vec(),
        )
        .map_err(|e| anyhow::anyhow!("invalid sparse matrix: {:?}", e))?;

        Ok(ExprMatrix::Sparse(CsrMatrix::from(&coo)))
    }

    pub fn nrows(&self) -> usize {
        match self {
            ExprMatrix::Dense(x) => x.nrows(),
            ExprMatrix::Sparse(x) => x.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            ExprMatrix::Dense(x) => x.ncols(),
            ExprMatrix::Sparse(x) => x.ncols(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, ExprMatrix::Sparse(_))
    }

    /// Number of stored entries (all entries for a dense matrix)
    pub fn nnz(&self) -> usize {
        match self {
            ExprMatrix::Dense(x) => x.len(),
            ExprMatrix::Sparse(x) => x.nnz(),
        }
    }

    /// Dense cells x `cols.len()` block of the selected columns, in
    /// the order given
    pub fn select_columns_dense(&self, cols: &[usize]) -> Array2<f32> {
        match self {
            ExprMatrix::Dense(x) => x.select(Axis(1), cols),
            ExprMatrix::Sparse(x) => {
                let pos = column_positions(x.ncols(), cols);
                let mut ret = Array2::<f32>::zeros((x.nrows(), cols.len()));
                for (i, row) in x.row_iter().enumerate() {
                    for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                        if let Some(k) = pos[j] {
                            ret[[i, k]] = v;
                        }
                    }
                }
                ret
            }
        }
    }

    pub fn to_dense(&self) -> Array2<f32> {
        match self {
            ExprMatrix::Dense(x) => x.clone(),
            ExprMatrix::Sparse(_) => {
                let cols: Vec<usize> = (0..self.ncols()).collect();
                self.select_columns_dense(&cols)
            }
        }
    }

    /// Keep the selected columns, in the order given, without changing
    /// the storage kind
    pub fn subset_columns(&self, cols: &[usize]) -> anyhow::Result<Self> {
        if let Some(&j) = cols.iter().find(|&&j| j >= self.ncols()) {
            return Err(anyhow::anyhow!(
                "column {} out of bounds for {} columns",
                j,
                self.ncols()
            ));
        }

        match self {
            ExprMatrix::Dense(x) => Ok(ExprMatrix::Dense(x.select(Axis(1), cols))),
            ExprMatrix::Sparse(x) => {
                let pos = column_positions(x.ncols(), cols);
                let mut rows = vec![];
                let mut columns = vec![];
                let mut values = vec![];
                for (i, row) in x.row_iter().enumerate() {
                    for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                        if let Some(k) = pos[j] {
                            rows.push(i);
                            columns.push(k);
                            values.push(v);
                        }
                    }
                }
                let coo = CooMatrix::try_from_triplets(x.nrows(), cols.len(), rows, columns, values)
                    .map_err(|e| anyhow::anyhow!("invalid sparse matrix: {:?}", e))?;
                Ok(ExprMatrix::Sparse(CsrMatrix::from(&coo)))
            }
        }
    }

    /// Per-column statistics of `transform(x)` over all rows.
    ///
    /// `transform` must map 0 to 0 so that the implicit zeros of a
    /// sparse matrix stay zeros. Rows are processed in fixed blocks
    /// and merged in block order, so the result does not depend on
    /// the number of threads.
    pub fn column_statistics<F>(&self, transform: F) -> RunningStatistics
    where
        F: Fn(f32) -> f32 + Sync,
    {
        let nn = self.nrows();
        let mm = self.ncols();
        let jobs = create_jobs(nn, DEFAULT_BLOCK_SIZE);
        let njobs = jobs.len() as u64;

        let partial: Vec<RunningStatistics> = jobs
            .into_par_iter()
            .progress_count(njobs)
            .map(|(lb, ub)| {
                let mut stat = RunningStatistics::new(mm);
                match self {
                    ExprMatrix::Dense(x) => {
                        for i in lb..ub {
                            let row = x.row(i).mapv(&transform);
                            stat.add_row(&row.view());
                        }
                    }
                    ExprMatrix::Sparse(x) => {
                        stat.add_observations(ub - lb);
                        for i in lb..ub {
                            let row = x.row(i);
                            for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                                stat.add_entry(j, transform(v));
                            }
                        }
                    }
                }
                stat
            })
            .collect();

        partial
            .into_iter()
            .fold(RunningStatistics::new(mm), |acc, stat| acc.merge(stat))
    }

    /// CSR arrays `(data, indices, indptr)` with explicit zeros of a
    /// dense matrix dropped
    pub fn to_csr_parts(&self) -> (Vec<f32>, Vec<i64>, Vec<i64>) {
        match self {
            ExprMatrix::Dense(x) => {
                let mut data = vec![];
                let mut indices = vec![];
                let mut indptr = vec![0_i64];
                for row in x.rows() {
                    for (j, &v) in row.iter().enumerate() {
                        if v != 0.0 {
                            data.push(v);
                            indices.push(j as i64);
                        }
                    }
                    indptr.push(data.len() as i64);
                }
                (data, indices, indptr)
            }
            ExprMatrix::Sparse(x) => (
                x.values().to_vec(),
                x.col_indices().iter().map(|&j| j as i64).collect(),
                x.row_offsets().iter().map(|&p| p as i64).collect(),
            ),
        }
    }
}

fn column_positions(ncols: usize, cols: &[usize]) -> Vec<Option<usize>> {
    let mut pos = vec![None; ncols];
    for (k, &j) in cols.iter().enumerate() {
        pos[j] = Some(k);
    }
    pos
}

fn create_jobs(ntot: usize, block_size: usize) -> Vec<(usize, usize)> {
    let nblock = ntot.div_ceil(block_size);
    (0..nblock)
        .map(|block| (block * block_size, ((block + 1) * block_size).min(ntot)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn dense() -> Array2<f32> {
        array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0], [0.0, 0.0, 6.0]]
    }

    fn sparse_from_dense(x: &Array2<f32>, pointer_type: IndexPointerType) -> ExprMatrix {
        let (nrows, ncols) = x.dim();
        let mut values = vec![];
        let mut indices = vec![];
        let mut indptr = vec![0_u64];
        match pointer_type {
            IndexPointerType::Row => {
                for i in 0..nrows {
                    for j in 0..ncols {
                        if x[[i, j]] != 0.0 {
                            values.push(x[[i, j]]);
                            indices.push(j as u64);
                        }
                    }
                    indptr.push(values.len() as u64);
                }
            }
            IndexPointerType::Column => {
                for j in 0..ncols {
                    for i in 0..nrows {
                        if x[[i, j]] != 0.0 {
                            values.push(x[[i, j]]);
                            indices.push(i as u64);
                        }
                    }
                    indptr.push(values.len() as u64);
                }
            }
        }
        ExprMatrix::from_compressed(
            ValuesIndicesPointers {
                values: &values,
                indices: &indices,
                indptr: &indptr,
            },
            pointer_type,
            (nrows, ncols),
        )
        .unwrap()
    }

    #[test]
    fn csr_and_csc_agree_with_dense() {
        let x = dense();
        let csr = sparse_from_dense(&x, IndexPointerType::Row);
        let csc = sparse_from_dense(&x, IndexPointerType::Column);
        assert!(csr.is_sparse());
        assert_eq!(csr.nnz(), 6);
        assert_eq!(csr.to_dense(), x);
        assert_eq!(csc.to_dense(), x);
        assert_eq!(csr.select_columns_dense(&[2, 0]), x.select(Axis(1), &[2, 0]));
    }

    #[test]
    fn subset_keeps_storage_kind() -> anyhow::Result<()> {
        let x = dense();
        let sub = sparse_from_dense(&x, IndexPointerType::Row).subset_columns(&[0, 2])?;
        assert!(sub.is_sparse());
        assert_eq!(sub.ncols(), 2);
        assert_eq!(sub.to_dense(), x.select(Axis(1), &[0, 2]));

        let sub = ExprMatrix::Dense(x.clone()).subset_columns(&[1])?;
        assert!(!sub.is_sparse());
        assert!(ExprMatrix::Dense(x).subset_columns(&[3]).is_err());
        Ok(())
    }

    #[test]
    fn statistics_do_not_depend_on_storage() {
        let x = dense();
        let a = ExprMatrix::Dense(x.clone()).column_statistics(|v| v.exp_m1());
        let b = sparse_from_dense(&x, IndexPointerType::Row).column_statistics(|v| v.exp_m1());
        assert_eq!(a.nobs(), 4);
        assert_eq!(b.nobs(), 4);
        for (u, v) in a.mean().iter().zip(b.mean().iter()) {
            assert!((u - v).abs() < 1e-9);
        }
        for (u, v) in a.variance(1).iter().zip(b.variance(1).iter()) {
            assert!((u - v).abs() < 1e-9);
        }
    }

    #[test]
    fn reject_malformed_pointers() {
        let values = [1.0_f32, 2.0];
        let indices = [0_u64, 5];
        let indptr = [0_u64, 1, 2];
        let bad_index = ExprMatrix::from_compressed(
            ValuesIndicesPointers {
                values: &values,
                indices: &indices,
                indptr: &indptr,
            },
            IndexPointerType::Row,
            (2, 3),
        );
        assert!(bad_index.is_err());

        let indices = [0_u64, 1];
        let short_indptr = [0_u64, 2];
        let bad_ptr = ExprMatrix::from_compressed(
            ValuesIndicesPointers {
                values: &values,
                indices: &indices,
                indptr: &short_indptr,
            },
            IndexPointerType::Row,
            (2, 3),
        );
        assert!(bad_ptr.is_err());
    }

    #[test]
    fn dense_to_csr_parts_drops_zeros() {
        let (data, indices, indptr) = ExprMatrix::Dense(dense()).to_csr_parts();
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(indices, vec![0, 2, 1, 0, 2, 2]);
        assert_eq!(indptr, vec![0, 2, 3, 5, 6]);
    }
}
