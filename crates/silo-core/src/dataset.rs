use crate::CoreError;
use silo_schema::Schema;
use silo_store::{Cell, Package, StoreError, Table, IMAGES_DIR_NAME};
use std::path::{Path, PathBuf};

/// A decoded row value. Category codes come back as their labels; image
/// cells are paths relative to the package's `images/` subtree.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Int(i64),
    Float(f64),
    Text(String),
    Category(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    CategoryList(Vec<String>),
}

/// Read access to an installed dataset package: random row access with
/// category decoding, image path resolution, and schema/extra_data
/// accessors.
#[derive(Debug)]
pub struct Dataset {
    package: Package,
    table: Table,
    decoders: Vec<Option<Vec<String>>>,
}

impl Dataset {
    pub fn open(name: &str, base: &Path) -> Result<Self, CoreError> {
        let package = Package::resolve(name, base)?;
        if !package.exists() {
            return Err(StoreError::NotInstalled(package.name().to_string()).into());
        }
        let table = Table::open(package.path())?;
        let decoders = table
            .schema()
            .iter()
            .map(|c| c.kind.categories().map(<[String]>::to_vec))
            .collect();
        Ok(Self {
            package,
            table,
            decoders,
        })
    }

    pub fn len(&self) -> usize {
        self.table.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn schema(&self) -> &Schema {
        self.table.schema()
    }

    pub fn extra_data(&self) -> &serde_json::Value {
        self.table.extra_data()
    }

    /// One row in schema column order, with category codes decoded back to
    /// their labels.
    pub fn row(&self, index: usize) -> Result<Vec<RowValue>, CoreError> {
        let cells = self.table.row(index)?;
        let mut values = Vec::with_capacity(cells.len());
        for (position, (cell, decoder)) in cells.into_iter().zip(&self.decoders).enumerate() {
            values.push(decode_cell(cell, decoder.as_deref(), position)?);
        }
        Ok(values)
    }

    /// Absolute path of an image cell value inside this package.
    pub fn image_path(&self, rel: &str) -> PathBuf {
        self.package.path().join(IMAGES_DIR_NAME).join(rel)
    }
}

fn decode_cell(
    cell: Cell,
    labels: Option<&[String]>,
    position: usize,
) -> Result<RowValue, CoreError> {
    let value = match (cell, labels) {
        (Cell::Int(code), Some(labels)) => RowValue::Category(decode(labels, code, position)?),
        (Cell::IntList(codes), Some(labels)) => RowValue::CategoryList(
            codes
                .into_iter()
                .map(|code| decode(labels, code, position))
                .collect::<Result<_, _>>()?,
        ),
        (Cell::Int(v), None) => RowValue::Int(v),
        (Cell::Float(v), None) => RowValue::Float(v),
        (Cell::Text(v), None) => RowValue::Text(v),
        (Cell::IntList(v), None) => RowValue::IntList(v),
        (Cell::FloatList(v), None) => RowValue::FloatList(v),
        (cell, Some(_)) => {
            return Err(CoreError::Dataset(format!(
                "column {position} carries categories but stores {cell:?}"
            )))
        }
    };
    Ok(value)
}

fn decode(labels: &[String], code: i64, position: usize) -> Result<String, CoreError> {
    usize::try_from(code)
        .ok()
        .and_then(|i| labels.get(i))
        .cloned()
        .ok_or_else(|| {
            CoreError::Dataset(format!(
                "category code {code} out of range for column {position}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_store::NoProgress;
    use std::fs;

    fn build_sample(base: &Path) {
        let source = tempfile::tempdir().unwrap();
        fs::write(
            source.path().join("config.json"),
            r#"{
                "columns": [
                    {"name": "image", "type": "image"},
                    {"name": "species", "type": "category"},
                    {"name": "tags", "type": "category_array"}
                ],
                "path": "data.csv",
                "extra_data": {"survey": 3}
            }"#,
        )
        .unwrap();
        fs::write(
            source.path().join("data.csv"),
            "image,species,tags\na.png,finch,small brown\nb.png,crow,big\n",
        )
        .unwrap();
        fs::write(source.path().join("a.png"), "A").unwrap();
        fs::write(source.path().join("b.png"), "B").unwrap();

        let engine = crate::Engine::new(base);
        engine
            .build("acme/birds", &source.path().join("config.json"), &NoProgress)
            .unwrap();
    }

    #[test]
    fn open_requires_installed_package() {
        let base = tempfile::tempdir().unwrap();
        let err = Dataset::open("acme/birds", base.path()).unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::NotInstalled(_))));
    }

    #[test]
    fn rows_decode_categories_to_labels() {
        let base = tempfile::tempdir().unwrap();
        build_sample(base.path());
        let dataset = Dataset::open("acme/birds", base.path()).unwrap();
        assert_eq!(dataset.len(), 2);

        let row = dataset.row(0).unwrap();
        assert_eq!(row[0], RowValue::Text("a.png".to_owned()));
        assert_eq!(row[1], RowValue::Category("finch".to_owned()));
        assert_eq!(
            row[2],
            RowValue::CategoryList(vec!["small".to_owned(), "brown".to_owned()])
        );

        let row = dataset.row(1).unwrap();
        assert_eq!(row[1], RowValue::Category("crow".to_owned()));
        assert_eq!(row[2], RowValue::CategoryList(vec!["big".to_owned()]));
    }

    #[test]
    fn row_out_of_bounds_is_an_error() {
        let base = tempfile::tempdir().unwrap();
        build_sample(base.path());
        let dataset = Dataset::open("acme/birds", base.path()).unwrap();
        assert!(dataset.row(2).is_err());
    }

    #[test]
    fn image_path_resolves_under_images() {
        let base = tempfile::tempdir().unwrap();
        build_sample(base.path());
        let dataset = Dataset::open("acme/birds", base.path()).unwrap();
        let path = dataset.image_path("a.png");
        assert!(path.ends_with("silo_datasets/acme/birds/images/a.png"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "A");
    }

    #[test]
    fn extra_data_and_schema_are_exposed() {
        let base = tempfile::tempdir().unwrap();
        build_sample(base.path());
        let dataset = Dataset::open("acme/birds", base.path()).unwrap();
        assert_eq!(dataset.extra_data()["survey"], 3);
        assert_eq!(dataset.schema().len(), 3);
    }

    #[test]
    fn tampered_codes_out_of_range_error_cleanly() {
        let base = tempfile::tempdir().unwrap();
        build_sample(base.path());
        // overwrite the category column with an impossible code
        let col = category_column_path(base.path());
        fs::write(&col, r#"{"kind":"int","values":[7, 0]}"#).unwrap();
        let dataset = Dataset::open("acme/birds", base.path()).unwrap();
        let err = dataset.row(0).unwrap_err();
        assert!(matches!(err, CoreError::Dataset(_)), "{err}");
    }

    fn category_column_path(base: &Path) -> PathBuf {
        silo_store::Layout::new(base)
            .package_dir(&silo_store::DatasetName::parse("acme/birds").unwrap())
            .join(silo_store::TABLE_DIR_NAME)
            .join("col_1.json")
    }
}
