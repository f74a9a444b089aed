//! Schema-driven build pipeline for Silo.
//!
//! Converts a build config + CSV + referenced media files into an immutable
//! columnar package directory: per-column typed accumulation with first-seen
//! category encoding, traversal-guarded image copying, and durable table
//! emission. The builder writes only into the destination directory; the
//! caller owns it and discards it on failure.

pub mod builder;
pub mod convert;

pub use builder::{build, build_from_data_dir, IMAGE_EXTENSIONS};
pub use convert::{CategoryEncoder, ColumnAccumulator};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] silo_schema::SchemaError),
    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv is missing declared column '{0}'")]
    MissingColumn(String),
    #[error("column '{column}': cannot parse '{value}' as {expected}")]
    Convert {
        column: String,
        value: String,
        expected: &'static str,
    },
    #[error("failed to copy image '{0}'")]
    ImageCopy(String),
    #[error("image path '{0}' escapes the package directory")]
    PathTraversal(String),
    #[error(transparent)]
    Store(#[from] silo_store::StoreError),
    #[error("build I/O error: {0}")]
    Io(#[from] std::io::Error),
}
