//! Remote side of Silo: resumable signed-URL transfers and the catalog API.
//!
//! This crate provides the upload state machine (session init, byte-range
//! probing, partial resend with rolling checksum verification), streaming
//! download into the unarchiver, the `Catalog` trait with its GraphQL HTTP
//! implementation, and remote endpoint configuration.

pub mod catalog;
pub mod config;
pub mod transfer;

pub use catalog::{Catalog, GraphqlCatalog, InstallSource};
pub use config::RemoteConfig;
pub use transfer::{download_and_extract, transfer_agent, upload};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] silo_store::StoreError),
    #[error("failed to create upload session: {0}")]
    UploadSession(String),
    #[error("upload checksum mismatch: expected {expected}, got {actual}")]
    UploadIntegrity { expected: String, actual: String },
    #[error("upload transport error: {0}")]
    UploadTransport(String),
    #[error("download error: {0}")]
    Download(String),
    #[error("catalog error: {0}")]
    Api(String),
    #[error("remote config error: {0}")]
    Config(String),
}
