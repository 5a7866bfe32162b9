// CommentSense: batch analysis of video comment sections.
//
// This is the library root. Each module corresponds to one stage or
// concern of the analysis pipeline.

pub mod analysis;
pub mod config;
pub mod error;
pub mod keywords;
pub mod llm;
pub mod models;
pub mod output;
pub mod sentiment;
pub mod status;
pub mod themes;

#[cfg(feature = "web")]
pub mod web;
