use crate::manager::DatasetName;
use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under the base path holding all installed packages.
pub const DATASETS_DIR_NAME: &str = "silo_datasets";
/// Hidden marker file whose presence defines an installed package.
pub const MARKER_FILE_NAME: &str = ".silo";
/// Columnar store subdirectory inside a package.
pub const TABLE_DIR_NAME: &str = "table";
/// Image subtree inside a package.
pub const IMAGES_DIR_NAME: &str = "images";

const STAGING_DIR_NAME: &str = ".staging";

/// Path computation for a Silo base directory. Never touches the disk
/// except for [`ensure_staging`](Self::ensure_staging).
#[derive(Debug, Clone)]
pub struct Layout {
    base: PathBuf,
}

impl Layout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[inline]
    pub fn base(&self) -> &Path {
        &self.base
    }

    #[inline]
    pub fn datasets_dir(&self) -> PathBuf {
        self.base.join(DATASETS_DIR_NAME)
    }

    #[inline]
    pub fn package_dir(&self, name: &DatasetName) -> PathBuf {
        self.datasets_dir().join(name.scope()).join(name.local())
    }

    /// Staging area for temporary build/download directories. Lives under
    /// the datasets root so promoting a staged directory is a same-filesystem
    /// rename.
    #[inline]
    pub fn staging_dir(&self) -> PathBuf {
        self.datasets_dir().join(STAGING_DIR_NAME)
    }

    pub fn ensure_staging(&self) -> Result<PathBuf, StoreError> {
        let dir = self.staging_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
