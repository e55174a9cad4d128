pub mod common;
pub mod disease_score; // weighted sum over shared genes
pub mod feature_selection; // highly variable genes
pub mod neighbors;
pub mod pca;
pub mod pipeline;
pub mod plot; // png renderers
pub mod top_genes;
pub mod umap_layout; // 2D embedding of the kNN graph
