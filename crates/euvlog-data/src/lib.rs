//! Ingestion layer for EUV session logs.
//!
//! Discovers SQLite session files, filters out monitoring logs, reads the
//! session table and turns each file into a restored time series. Also
//! writes merged timelines and summaries back out as CSV/JSON.

pub mod classifier;
pub mod error;
pub mod export;
pub mod reader;

pub use euvlog_core as core;
pub use reader::{load_one, LoadOutcome, LoaderConfig, SkipReason};
