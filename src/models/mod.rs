// Local model files: locations on disk and the download helper.

pub mod download;
