use crate::CoreError;
use serde::Serialize;
use silo_remote::{download_and_extract, transfer_agent, upload, Catalog};
use silo_schema::ColumnKind;
use silo_store::{archive_package, Layout, Package, Progress, StoreError, Table};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

const ARCHIVE_FILE_NAME: &str = "dataset.tar";

/// Central engine for the dataset package lifecycle.
///
/// All operations are synchronous and single-caller: there is no internal
/// locking, and concurrent operations on the same package name are detected
/// only after the fact through `AlreadyInstalled`/`PathCollision`.
pub struct Engine {
    layout: Layout,
}

/// One row of `list` output.
#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub version: Option<u64>,
}

/// Result of a successful install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub name: String,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
}

/// Local details of an installed package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageDetails {
    pub name: String,
    pub version: Option<u64>,
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
}

impl Engine {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            layout: Layout::new(base),
        }
    }

    pub fn base(&self) -> &Path {
        self.layout.base()
    }

    /// A fresh staging directory under the store's staging area. Lives on
    /// the same filesystem as the destination, so promotion is an atomic
    /// rename; deleted on drop on every exit path.
    fn staging(&self) -> Result<TempDir, CoreError> {
        let dir = self.layout.ensure_staging()?;
        Ok(tempfile::Builder::new().prefix("stage-").tempdir_in(dir)?)
    }

    /// Download and install the latest published version of a dataset.
    pub fn install(
        &self,
        name: &str,
        catalog: &dyn Catalog,
        progress: &dyn Progress,
    ) -> Result<InstallReport, CoreError> {
        let package = Package::resolve(name, self.layout.base())?;
        package.check_can_install()?;

        let source = catalog.latest_version(name)?;
        let staging = self.staging()?;
        let agent = transfer_agent();
        download_and_extract(&agent, &source.signed_url, staging.path(), progress)?;
        package.promote(staging.path(), Some(source.version))?;

        info!("installed dataset {name} (v{})", source.version);
        Ok(InstallReport {
            name: package.name().to_string(),
            version: source.version,
        })
    }

    /// Remove an installed dataset.
    pub fn uninstall(&self, name: &str) -> Result<(), CoreError> {
        let package = Package::resolve(name, self.layout.base())?;
        if !package.exists() {
            return Err(StoreError::NotInstalled(package.name().to_string()).into());
        }
        package.remove()?;
        info!("uninstalled dataset {name}");
        Ok(())
    }

    /// All installed packages, sorted by name.
    pub fn list(&self) -> Result<Vec<PackageSummary>, CoreError> {
        let packages = Package::list_installed(self.layout.base())?;
        Ok(packages
            .iter()
            .map(|p| PackageSummary {
                name: p.name().to_string(),
                version: p.version(),
            })
            .collect())
    }

    /// Local details of an installed package: version, row count, columns.
    pub fn info(&self, name: &str) -> Result<PackageDetails, CoreError> {
        let package = Package::resolve(name, self.layout.base())?;
        if !package.exists() {
            return Err(StoreError::NotInstalled(package.name().to_string()).into());
        }
        let table = Table::open(package.path())?;
        let columns = table
            .schema()
            .iter()
            .map(|c| ColumnSummary {
                name: c.name.clone(),
                kind: c.kind.kind(),
            })
            .collect();
        Ok(PackageDetails {
            name: package.name().to_string(),
            version: package.version(),
            rows: table.rows(),
            columns,
        })
    }

    /// Build a package from a build config and install it unversioned.
    pub fn build(
        &self,
        name: &str,
        config_path: &Path,
        progress: &dyn Progress,
    ) -> Result<(), CoreError> {
        let package = Package::resolve(name, self.layout.base())?;
        package.check_can_install()?;

        let staging = self.staging()?;
        silo_build::build(config_path, staging.path(), progress)?;
        package.promote(staging.path(), None)?;

        info!("built dataset {name}");
        Ok(())
    }

    /// Build a single-image-column package from a directory of images and
    /// install it unversioned.
    pub fn build_from_data_dir(
        &self,
        name: &str,
        data_dir: &Path,
        progress: &dyn Progress,
    ) -> Result<(), CoreError> {
        let package = Package::resolve(name, self.layout.base())?;
        package.check_can_install()?;

        let staging = self.staging()?;
        silo_build::build_from_data_dir(data_dir, staging.path(), progress)?;
        package.promote(staging.path(), None)?;

        info!("built dataset {name} from data directory");
        Ok(())
    }

    /// Publish a built package: archive it, upload the archive through a
    /// resumable session, and record the version the catalog assigns.
    pub fn push(
        &self,
        name: &str,
        catalog: &dyn Catalog,
        progress: &dyn Progress,
    ) -> Result<u64, CoreError> {
        let package = Package::resolve(name, self.layout.base())?;
        package.check_can_push()?;

        let session_id = catalog.create_upload_session(name)?;
        let staging = self.staging()?;
        let tar_path = staging.path().join(ARCHIVE_FILE_NAME);
        archive_package(package.path(), &tar_path)?;

        let signed_url = catalog.upload_url(&session_id, ARCHIVE_FILE_NAME)?;
        let agent = transfer_agent();
        upload(&agent, &signed_url, &tar_path, progress)?;

        let version = catalog.complete_upload(&session_id)?;
        package.set_version(Some(version))?;

        info!("pushed dataset {name} (v{version})");
        Ok(version)
    }
}
