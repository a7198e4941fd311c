//! Core types and pure transforms for EUV session logs.
//!
//! Everything here is single-threaded and deterministic: numeric coercion,
//! time-base reconstruction, fault-aware gap restoration, segment energy
//! integration and range summaries.

pub mod calculations;
pub mod conditions;
pub mod data_processors;
pub mod error;
pub mod formatting;
pub mod models;
pub mod restore;
pub mod settings;
pub mod summary;
pub mod time_utils;

pub use error::{LogError, Result};
