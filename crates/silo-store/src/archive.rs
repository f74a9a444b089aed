use crate::layout::MARKER_FILE_NAME;
use crate::StoreError;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Pack a package directory into a deterministic tar archive at `tar_path`.
///
/// The hidden marker file is excluded by name: versions are assigned by the
/// catalog on install, never shipped inside the archive. Determinism:
/// entries sorted lexicographically, timestamps zeroed, ownership 0:0.
pub fn archive_package(source_dir: &Path, tar_path: &Path) -> Result<(), StoreError> {
    let archive_err = |e: std::io::Error| StoreError::Archive(e.to_string());

    let mut entries = collect_entries(source_dir, source_dir)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let file = fs::File::create(tar_path).map_err(archive_err)?;
    let mut ar = tar::Builder::new(file);
    ar.follow_symlinks(false);

    for (rel_path, full_path) in &entries {
        if rel_path == MARKER_FILE_NAME {
            continue;
        }
        let ft = match full_path.symlink_metadata() {
            Ok(m) => m.file_type(),
            Err(e) => {
                warn!("skipping {rel_path}: metadata error: {e}");
                continue;
            }
        };

        if ft.is_file() {
            append_file(&mut ar, rel_path, full_path).map_err(archive_err)?;
        } else if ft.is_dir() {
            append_dir(&mut ar, rel_path, full_path).map_err(archive_err)?;
        } else {
            warn!("skipping unsupported file type: {rel_path}");
        }
    }

    let file = ar.into_inner().map_err(archive_err)?;
    file.sync_all().map_err(archive_err)?;
    Ok(())
}

/// Stream a tar archive into `dest_dir`.
///
/// Every entry path is validated before unpacking: absolute paths and any
/// `..` component are rejected with `PathTraversal`. Entry names are never
/// trusted directly.
pub fn extract_archive<R: Read>(reader: R, dest_dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dest_dir)?;
    let mut ar = tar::Archive::new(reader);
    ar.set_preserve_permissions(true);
    ar.set_preserve_mtime(false);
    ar.set_unpack_xattrs(false);

    let archive_err = |e: std::io::Error| StoreError::Archive(e.to_string());
    for entry in ar.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        let path = entry.path().map_err(archive_err)?.into_owned();
        check_entry_path(&path)?;
        entry.unpack_in(dest_dir).map_err(archive_err)?;
    }
    Ok(())
}

fn check_entry_path(path: &Path) -> Result<(), StoreError> {
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(StoreError::PathTraversal(
            path.to_string_lossy().into_owned(),
        ));
    }
    Ok(())
}

/// Recursively collect (relative_path, full_path) pairs from a directory tree.
fn collect_entries(root: &Path, current: &Path) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let mut result = Vec::new();
    if !current.exists() {
        return Ok(result);
    }
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let full = entry.path();
        let rel = full
            .strip_prefix(root)
            .map_err(|e| StoreError::Io(std::io::Error::other(format!("path strip: {e}"))))?
            .to_string_lossy()
            .to_string();

        let meta = full.symlink_metadata()?;
        if meta.is_dir() {
            result.push((rel.clone(), full.clone()));
            result.extend(collect_entries(root, &full)?);
        } else {
            result.push((rel, full));
        }
    }
    Ok(result)
}

fn make_header(entry_type: tar::EntryType) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(0o644);
    header
}

fn append_file(
    ar: &mut tar::Builder<fs::File>,
    rel_path: &str,
    full_path: &Path,
) -> Result<(), std::io::Error> {
    let data = fs::read(full_path)?;
    let mut header = make_header(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_cksum();
    ar.append_data(&mut header, rel_path, data.as_slice())
}

fn append_dir(
    ar: &mut tar::Builder<fs::File>,
    rel_path: &str,
    _full_path: &Path,
) -> Result<(), std::io::Error> {
    let mut header = make_header(tar::EntryType::Directory);
    header.set_mode(0o755);
    header.set_size(0);
    header.set_cksum();
    let path = if rel_path.ends_with('/') {
        rel_path.to_owned()
    } else {
        format!("{rel_path}/")
    };
    ar.append_data(&mut header, &path, &[] as &[u8])
}
