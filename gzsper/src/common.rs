#![allow(dead_code)]

pub use log::{info, warn};

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;

pub use anndata_beans::anndata::ExpressionData;
pub use anndata_beans::annotations::{CellAnnotations, ObsColumn, MISSING_CODE};
pub use anndata_beans::expr_matrix::ExprMatrix;
pub use anndata_beans::weight_table::GeneWeights;

/// per-cell annotation holding the normalized score
pub const DISEASE_SCORE_KEY: &str = "disease_score";
pub const PCA_KEY: &str = "X_pca";
pub const UMAP_KEY: &str = "X_umap";

pub const DEFAULT_SEED: u64 = 0;
