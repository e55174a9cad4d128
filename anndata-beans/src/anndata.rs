use crate::annotations::CellAnnotations;
use crate::expr_matrix::ExprMatrix;

use fnv::FnvHashMap;
use nalgebra::DMatrix;
use std::collections::BTreeMap;

/// Annotated cells x genes expression data, the in-memory
/// counterpart of an `.h5ad` file
#[derive(Clone, Debug)]
pub struct ExpressionData {
    pub x: ExprMatrix,
    /// cell identifiers, one per row
    pub obs_names: Vec<Box<str>>,
    /// gene identifiers, one per column
    pub var_names: Vec<Box<str>>,
    pub obs: CellAnnotations,
    /// per-cell embeddings, e.g., `X_pca` and `X_umap` (cells x dims)
    pub obsm: BTreeMap<Box<str>, DMatrix<f32>>,
}

impl ExpressionData {
    /// Put together a dataset and check that the dimensions agree
    pub fn new(
        x: ExprMatrix,
        obs_names: Vec<Box<str>>,
        var_names: Vec<Box<str>>,
        obs: CellAnnotations,
    ) -> anyhow::Result<Self> {
        let ret = Self {
            x,
            obs_names,
            var_names,
            obs,
            obsm: BTreeMap::new(),
        };
        ret.validate()?;
        Ok(ret)
    }

    pub fn num_cells(&self) -> usize {
        self.x.nrows()
    }

    pub fn num_genes(&self) -> usize {
        self.x.ncols()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let (nn, mm) = (self.x.nrows(), self.x.ncols());
        if self.obs_names.len() != nn {
            return Err(anyhow::anyhow!(
                "{} cell names for {} rows of X",
                self.obs_names.len(),
                nn
            ));
        }
        if self.var_names.len() != mm {
            return Err(anyhow::anyhow!(
                "{} gene names for {} columns of X",
                self.var_names.len(),
                mm
            ));
        }
        if self.obs.ncells() != nn {
            return Err(anyhow::anyhow!(
                "annotations for {} cells, X has {} rows",
                self.obs.ncells(),
                nn
            ));
        }
        for (key, emb) in self.obsm.iter() {
            if emb.nrows() != nn {
                return Err(anyhow::anyhow!(
                    "embedding {} has {} rows for {} cells",
                    key,
                    emb.nrows(),
                    nn
                ));
            }
        }
        Ok(())
    }

    /// Column index of each gene name. With repeated names the last
    /// column wins.
    pub fn gene_index(&self) -> FnvHashMap<&str, usize> {
        self.var_names
            .iter()
            .enumerate()
            .map(|(j, g)| (g.as_ref(), j))
            .collect()
    }

    /// Restrict the dataset to the given gene columns, in the order
    /// given. Cell annotations and embeddings are kept.
    pub fn subset_genes(&mut self, cols: &[usize]) -> anyhow::Result<()> {
        self.x = self.x.subset_columns(cols)?;
        self.var_names = cols.iter().map(|&j| self.var_names[j].clone()).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::ObsColumn;
    use ndarray::array;

    fn names(prefix: &str, n: usize) -> Vec<Box<str>> {
        (0..n).map(|i| format!("{}{}", prefix, i).into()).collect()
    }

    #[test]
    fn subset_genes_keeps_names_aligned() -> anyhow::Result<()> {
        let x = ExprMatrix::Dense(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let mut obs = CellAnnotations::new(2);
        obs.insert("n_counts", ObsColumn::Numeric(vec![6.0, 15.0]))?;
        let mut data = ExpressionData::new(x, names("c", 2), names("g", 3), obs)?;

        data.subset_genes(&[2, 0])?;
        assert_eq!(data.var_names, vec![Box::from("g2"), Box::from("g0")]);
        assert_eq!(data.x.to_dense(), array![[3.0, 1.0], [6.0, 4.0]]);
        assert_eq!(data.gene_index()["g0"], 1);
        assert!(data.obs.contains("n_counts"));
        Ok(())
    }

    #[test]
    fn mismatched_names_are_rejected() {
        let x = ExprMatrix::Dense(array![[1.0, 2.0]]);
        let bad = ExpressionData::new(x, names("c", 1), names("g", 3), CellAnnotations::new(1));
        assert!(bad.is_err());
    }
}
