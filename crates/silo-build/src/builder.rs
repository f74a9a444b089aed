use crate::convert::ColumnAccumulator;
use crate::BuildError;
use silo_schema::{parse_config_file, BuildConfig, Column, ColumnKind, ColumnSpec, ColumnType, Schema};
use silo_store::{Progress, Table, IMAGES_DIR_NAME};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path};
use tracing::{debug, info, warn};

/// File extensions treated as images by `build_from_data_dir`.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

const DATA_CSV_NAME: &str = "data.csv";
const CONFIG_NAME: &str = "config.json";

/// Build an immutable columnar package in `dest_dir` from a build config.
///
/// Reads the config's CSV with columns reindexed to the declared order
/// (extra CSV columns are ignored), converts each cell through the typed
/// accumulators, copies every referenced image under `dest_dir/images/`,
/// and emits the table with the serialized schema and `extra_data`
/// attached. Writes only into `dest_dir`; the caller discards it on error.
pub fn build(
    config_path: &Path,
    dest_dir: &Path,
    progress: &dyn Progress,
) -> Result<(), BuildError> {
    let config = parse_config_file(config_path)?;
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    let csv_path = config_dir.join(&config.path);
    info!("building package from {}", csv_path.display());

    let mut reader = csv::Reader::from_path(&csv_path)?;
    let headers = reader.headers()?.clone();
    let mut indices = Vec::with_capacity(config.columns.len());
    for spec in &config.columns {
        let index = headers
            .iter()
            .position(|h| h == spec.name)
            .ok_or_else(|| BuildError::MissingColumn(spec.name.clone()))?;
        indices.push(index);
    }

    let mut accumulators: Vec<ColumnAccumulator> = config
        .columns
        .iter()
        .map(|spec| ColumnAccumulator::for_kind(spec.kind))
        .collect();

    let mut rows = 0usize;
    for record in reader.records() {
        let record = record?;
        for ((spec, &index), accumulator) in config
            .columns
            .iter()
            .zip(&indices)
            .zip(accumulators.iter_mut())
        {
            accumulator.push(&spec.name, record.get(index).unwrap_or(""))?;
        }
        rows += 1;
    }
    debug!("read {rows} rows across {} columns", config.columns.len());

    copy_images(&config, &accumulators, config_dir, dest_dir, rows, progress)?;

    fs::create_dir_all(dest_dir)?;
    let mut schema = Schema::new();
    let mut columns = Vec::with_capacity(accumulators.len());
    for (spec, accumulator) in config.columns.iter().zip(accumulators) {
        let (data, categories) = accumulator.finish();
        schema.push(Column::new(
            spec.name.clone(),
            ColumnType::from_kind(spec.kind, categories),
        ));
        columns.push(data);
    }
    let table = Table::new(schema, columns, config.extra_data.clone())?;
    table.write(dest_dir)?;
    Ok(())
}

fn copy_images(
    config: &BuildConfig,
    accumulators: &[ColumnAccumulator],
    config_dir: &Path,
    dest_dir: &Path,
    rows: usize,
    progress: &dyn Progress,
) -> Result<(), BuildError> {
    let image_columns: Vec<usize> = config
        .columns
        .iter()
        .enumerate()
        .filter(|(_, spec)| spec.kind == ColumnKind::Image)
        .map(|(index, _)| index)
        .collect();
    progress.begin((image_columns.len() * rows) as u64);

    for &index in &image_columns {
        let ColumnAccumulator::Text(paths) = &accumulators[index] else {
            unreachable!("image columns accumulate text");
        };
        for rel in paths {
            copy_image_file(rel, config_dir, dest_dir)?;
            progress.advance(1);
        }
    }
    Ok(())
}

/// Copy one referenced image into `dest_dir/images/<rel>`, creating
/// intermediate directories on demand. The resolved destination must stay
/// under `dest_dir`.
fn copy_image_file(rel: &str, src_dir: &Path, dest_dir: &Path) -> Result<(), BuildError> {
    let rel_path = Path::new(rel);
    let escapes = rel_path.is_absolute()
        || rel_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(BuildError::PathTraversal(rel.to_owned()));
    }

    let src = src_dir.join(rel_path);
    let dst = dest_dir.join(IMAGES_DIR_NAME).join(rel_path);
    match fs::copy(&src, &dst) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            // usually the destination parent does not exist yet; create it
            // and retry once
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).map_err(|_| BuildError::ImageCopy(rel.to_owned()))?;
            }
            fs::copy(&src, &dst)
                .map(|_| ())
                .map_err(|_| BuildError::ImageCopy(rel.to_owned()))
        }
        Err(_) => Err(BuildError::ImageCopy(rel.to_owned())),
    }
}

/// Build a single-image-column package from a directory of image files.
///
/// Recursively scans `data_dir` for image-extension files, writes a
/// synthetic `data.csv` and `config.json` referencing them, then runs
/// [`build`] on the synthetic config.
pub fn build_from_data_dir(
    data_dir: &Path,
    dest_dir: &Path,
    progress: &dyn Progress,
) -> Result<(), BuildError> {
    let mut images = Vec::new();
    collect_image_files(data_dir, data_dir, &mut images)?;
    images.sort();
    info!("found {} image files under {}", images.len(), data_dir.display());

    let csv_path = data_dir.join(DATA_CSV_NAME);
    let mut writer = csv::Writer::from_path(&csv_path)?;
    writer.write_record(["image"])?;
    for rel in &images {
        writer.write_record([rel.as_str()])?;
    }
    writer.flush().map_err(BuildError::Io)?;

    let config = BuildConfig {
        columns: vec![ColumnSpec {
            name: "image".to_owned(),
            kind: ColumnKind::Image,
        }],
        path: DATA_CSV_NAME.to_owned(),
        extra_data: serde_json::Value::Null,
    };
    let config_path = data_dir.join(CONFIG_NAME);
    fs::write(
        &config_path,
        serde_json::to_string_pretty(&config).expect("config serialization is infallible"),
    )?;

    build(&config_path, dest_dir, progress)
}

fn collect_image_files(
    root: &Path,
    current: &Path,
    out: &mut Vec<String>,
) -> Result<(), BuildError> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_image_files(root, &path, out)?;
            continue;
        }
        if !is_image_file(&path) {
            continue;
        }
        match path
            .strip_prefix(root)
            .expect("scan stays under the root")
            .to_str()
        {
            Some(rel) => out.push(rel.to_owned()),
            None => warn!("skipping non-UTF-8 image path {}", path.display()),
        }
    }
    Ok(())
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
}
