//! Runtime layer for the EUV log pipeline.
//!
//! Loads many session files concurrently, caches loaded tables between
//! requests and merges per-file tables into one timeline.

pub mod cache;
pub mod loader;
pub mod merge;

pub use euvlog_core as core;
pub use euvlog_data as data;
