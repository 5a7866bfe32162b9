// Batch analysis of a video's comment section.

pub mod batch;
pub mod models;
