//! On-disk dataset package store for Silo.
//!
//! This crate provides the storage layer: the `scope/name` grammar
//! (`DatasetName`), the package manager (`Package`) with its hidden marker
//! file and atomic promote/remove transactions, the columnar `Table` store,
//! deterministic tar packing with traversal-safe extraction, and the
//! `Progress` reporting seam.

pub mod archive;
pub mod layout;
pub mod manager;
pub mod progress;
pub mod table;

pub use archive::{archive_package, extract_archive};
pub use layout::{Layout, DATASETS_DIR_NAME, IMAGES_DIR_NAME, MARKER_FILE_NAME, TABLE_DIR_NAME};
pub use manager::{DatasetName, Package};
pub use progress::{NoProgress, Progress};
pub use table::{Cell, ColumnData, Table};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid dataset name: {0}")]
    InvalidName(String),
    #[error("dataset '{0}' is already installed")]
    AlreadyInstalled(String),
    #[error("dataset '{0}' is not installed")]
    NotInstalled(String),
    #[error("cannot set version on dataset '{0}': a version is already recorded")]
    AlreadyVersioned(String),
    #[error("dataset '{0}' has already been pushed")]
    AlreadyPushed(String),
    #[error("dataset '{name}' collides with existing non-package path {}", path.display())]
    PathCollision {
        name: String,
        path: std::path::PathBuf,
    },
    #[error("dataset '{name}' cannot be created under {}: insufficient permissions", path.display())]
    Permission {
        name: String,
        path: std::path::PathBuf,
    },
    #[error("failed to install dataset '{name}': {reason}")]
    Install { name: String, reason: String },
    #[error("dataset '{0}' could not be removed")]
    Remove(String),
    #[error("could not persist metadata file {}", .0.display())]
    Persist(std::path::PathBuf),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("entry '{0}' escapes the destination directory")]
    PathTraversal(String),
    #[error("invalid table: {0}")]
    InvalidTable(String),
    #[error("row index {index} out of bounds for table with {rows} rows")]
    RowOutOfBounds { index: usize, rows: usize },
}
