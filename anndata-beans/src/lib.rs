pub mod annotations; // per-cell categorical and numeric columns
pub mod anndata; // annotated expression data held in memory
pub mod expr_matrix; // dense or sparse cells x genes matrix
pub mod h5ad; // read and write `.h5ad` files
pub mod misc; // hdf5 string and attribute helpers
pub mod simulate; // synthetic data for demos and tests
pub mod weight_table; // gene-level weights from a text table
