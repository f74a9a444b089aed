//! Column type model, schema (de)serialization, and build config parsing for Silo.
//!
//! This crate defines the data-description layer: the closed `ColumnType` enum,
//! the ordered `Schema` with its portable tagged-record form, and the JSON build
//! config (`BuildConfig`) that drives the build pipeline.

pub mod column;
pub mod config;

pub use column::{Column, ColumnKind, ColumnType, Schema};
pub use config::{parse_config_file, parse_config_str, BuildConfig, ColumnSpec};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid build config: {0}")]
    Config(String),
}
