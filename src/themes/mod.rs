// Theme discovery: embed, reduce, cluster, then name each cluster.
//
// TextEncoder produces dense vectors, reduce projects them to a space where
// density is meaningful, cluster runs HDBSCAN, and labeler asks the
// generative-text service for a short name per cluster.

pub mod cluster;
pub mod embeddings;
pub mod labeler;
pub mod reduce;
pub mod traits;
