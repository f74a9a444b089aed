//! Lifecycle engine for Silo dataset packages.
//!
//! This crate ties together the schema layer, the on-disk store, the build
//! pipeline, and the transfer protocol into the `Engine` — the central API
//! for installing, uninstalling, listing, inspecting, building, and pushing
//! dataset packages — plus `Dataset`, the read side of an installed package.

pub mod dataset;
pub mod engine;

pub use dataset::{Dataset, RowValue};
pub use engine::{ColumnSummary, Engine, InstallReport, PackageDetails, PackageSummary};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] silo_store::StoreError),
    #[error("build error: {0}")]
    Build(#[from] silo_build::BuildError),
    #[error("remote error: {0}")]
    Remote(#[from] silo_remote::RemoteError),
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
