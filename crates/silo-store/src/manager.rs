use crate::layout::{Layout, MARKER_FILE_NAME};
use crate::{fsync_dir, StoreError};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// A validated `scope/name` dataset name.
///
/// Both segments are non-empty, alphanumeric-or-hyphen, never start or end
/// with a hyphen, and never contain a double hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetName {
    scope: String,
    local: String,
}

impl DatasetName {
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidName(input.to_owned());
        let (scope, local) = input.split_once('/').ok_or_else(invalid)?;
        if local.contains('/') || !valid_segment(scope) || !valid_segment(local) {
            return Err(invalid());
        }
        Ok(Self {
            scope: scope.to_owned(),
            local: local.to_owned(),
        })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn local(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.local)
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        && !segment.starts_with('-')
        && !segment.ends_with('-')
        && !segment.contains("--")
}

/// A named dataset package at a resolved local path.
///
/// The package exists iff the hidden marker file is present inside its
/// directory; a directory without the marker is a path collision, not a
/// package. All metadata lives in the marker (JSON object; recognized key
/// `version`, unknown keys preserved on rewrite).
#[derive(Debug, Clone)]
pub struct Package {
    name: DatasetName,
    path: PathBuf,
}

impl Package {
    /// Validate `name` and resolve it to its path under `base`. Touches no
    /// disk state.
    pub fn resolve(name: &str, base: &Path) -> Result<Self, StoreError> {
        let name = DatasetName::parse(name)?;
        let path = Layout::new(base).package_dir(&name);
        Ok(Self { name, path })
    }

    /// A package handle at an explicit path, e.g. a staging directory.
    pub fn at(name: DatasetName, path: impl Into<PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
        }
    }

    /// Scan two directory levels under the datasets root for marker files.
    /// Entries whose derived name fails the grammar are skipped: directories
    /// can be tampered with externally and must not break the listing.
    pub fn list_installed(base: &Path) -> Result<Vec<Package>, StoreError> {
        let datasets_dir = Layout::new(base).datasets_dir();
        let mut packages = Vec::new();
        if !datasets_dir.is_dir() {
            return Ok(packages);
        }
        for scope_entry in fs::read_dir(&datasets_dir)? {
            let scope_entry = scope_entry?;
            if !scope_entry.file_type()?.is_dir() {
                continue;
            }
            for pkg_entry in fs::read_dir(scope_entry.path())? {
                let pkg_entry = pkg_entry?;
                if !pkg_entry.path().join(MARKER_FILE_NAME).is_file() {
                    continue;
                }
                let derived = format!(
                    "{}/{}",
                    scope_entry.file_name().to_string_lossy(),
                    pkg_entry.file_name().to_string_lossy()
                );
                match DatasetName::parse(&derived) {
                    Ok(name) => packages.push(Package::at(name, pkg_entry.path())),
                    Err(_) => debug!("skipping invalid package directory '{derived}'"),
                }
            }
        }
        packages.sort_by_key(|p| p.name.to_string());
        Ok(packages)
    }

    pub fn name(&self) -> &DatasetName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn marker_path(&self) -> PathBuf {
        self.path.join(MARKER_FILE_NAME)
    }

    /// Marker file present, i.e. the package is installed.
    pub fn exists(&self) -> bool {
        self.marker_path().is_file()
    }

    /// The recorded version, if any. A missing or malformed marker reads as
    /// "no metadata", never as a hard failure.
    pub fn version(&self) -> Option<u64> {
        self.read_marker().get("version").and_then(Value::as_u64)
    }

    /// Record the version. The field is set-once: any recorded version makes
    /// further calls fail, including re-setting the same value. Passing
    /// `None` writes an explicit null, which is what creates the marker for
    /// a freshly built, not-yet-pushed package.
    pub fn set_version(&self, version: Option<u64>) -> Result<(), StoreError> {
        let mut marker = self.read_marker();
        if marker.get("version").is_some_and(|v| !v.is_null()) {
            return Err(StoreError::AlreadyVersioned(self.name.to_string()));
        }
        let value = version.map_or(Value::Null, Into::into);
        marker.insert("version".to_owned(), value);
        self.write_marker(&marker)
    }

    fn read_marker(&self) -> Map<String, Value> {
        let Ok(content) = fs::read_to_string(self.marker_path()) else {
            return Map::new();
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            _ => {
                debug!("malformed marker file for '{}'", self.name);
                Map::new()
            }
        }
    }

    fn write_marker(&self, marker: &Map<String, Value>) -> Result<(), StoreError> {
        let dest = self.marker_path();
        self.persist_marker(&dest, marker)
            .map_err(|_| StoreError::Persist(dest))
    }

    fn persist_marker(
        &self,
        dest: &Path,
        marker: &Map<String, Value>,
    ) -> Result<(), std::io::Error> {
        let content = serde_json::to_string(marker).expect("marker map serialization is infallible");
        let mut tmp = NamedTempFile::new_in(&self.path)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| e.error)?;
        fsync_dir(&self.path)
    }

    /// Verify the package can be installed at its resolved path.
    pub fn check_can_install(&self) -> Result<(), StoreError> {
        if self.exists() {
            return Err(StoreError::AlreadyInstalled(self.name.to_string()));
        }
        if self.path.exists() {
            return Err(StoreError::PathCollision {
                name: self.name.to_string(),
                path: self.path.clone(),
            });
        }
        let ancestor = nearest_existing_ancestor(&self.path);
        if !dir_is_usable(&ancestor) {
            return Err(StoreError::Permission {
                name: self.name.to_string(),
                path: ancestor,
            });
        }
        Ok(())
    }

    /// Verify the package can be pushed: it must be installed and not yet
    /// carry a version.
    pub fn check_can_push(&self) -> Result<(), StoreError> {
        if !self.exists() {
            return Err(StoreError::NotInstalled(self.name.to_string()));
        }
        if self.version().is_some() {
            return Err(StoreError::AlreadyPushed(self.name.to_string()));
        }
        Ok(())
    }

    /// Atomically promote a caller-owned staging directory into this
    /// package's path. The marker (and version) is written into the staging
    /// directory first, so the rename is the single commit point. On failure
    /// nothing is cleaned up here: staging directories are temporaries with
    /// their own guaranteed cleanup.
    pub fn promote(&self, source_dir: &Path, version: Option<u64>) -> Result<(), StoreError> {
        if self.exists() {
            return Err(StoreError::AlreadyInstalled(self.name.to_string()));
        }

        let staged = Package::at(self.name.clone(), source_dir);
        staged.set_version(version)?;

        let install_err = |reason: String| StoreError::Install {
            name: self.name.to_string(),
            reason,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| install_err(e.to_string()))?;
            if !parent.is_dir() {
                return Err(install_err(format!(
                    "parent {} is not a directory",
                    parent.display()
                )));
            }
        }
        fs::rename(source_dir, &self.path).map_err(|e| install_err(e.to_string()))?;
        debug!("promoted {} into {}", source_dir.display(), self.path.display());
        Ok(())
    }

    /// Recursively delete the package directory. A directory that is already
    /// gone counts as success; a directory without the marker is not a
    /// package and is refused.
    pub fn remove(&self) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Ok(());
        }
        if !self.exists() {
            return Err(StoreError::NotInstalled(self.name.to_string()));
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(_) => Err(StoreError::Remove(self.name.to_string())),
        }
    }
}

fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        if ancestor.exists() {
            return ancestor.to_path_buf();
        }
    }
    PathBuf::from(".")
}

fn dir_is_usable(dir: &Path) -> bool {
    let Ok(meta) = fs::metadata(dir) else {
        return false;
    };
    // read_dir probes read+traverse; the readonly bit covers write access
    meta.is_dir() && !meta.permissions().readonly() && fs::read_dir(dir).is_ok()
}
