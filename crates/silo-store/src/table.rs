use crate::layout::TABLE_DIR_NAME;
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use silo_schema::{ColumnType, Schema};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const ATTRS_FILE: &str = "attrs.json";

/// Physical storage for one column: one contiguous, typed array per schema
/// field. Category columns store first-seen integer codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    IntArray(Vec<Vec<i64>>),
    FloatArray(Vec<Vec<f64>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::IntArray(v) => v.len(),
            ColumnData::FloatArray(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, index: usize) -> Cell {
        match self {
            ColumnData::Int(v) => Cell::Int(v[index]),
            ColumnData::Float(v) => Cell::Float(v[index]),
            ColumnData::Text(v) => Cell::Text(v[index].clone()),
            ColumnData::IntArray(v) => Cell::IntList(v[index].clone()),
            ColumnData::FloatArray(v) => Cell::FloatList(v[index].clone()),
        }
    }

    fn matches(&self, kind: &ColumnType) -> bool {
        matches!(
            (kind, self),
            (
                ColumnType::Integer | ColumnType::Category { .. },
                ColumnData::Int(_)
            ) | (ColumnType::Float, ColumnData::Float(_))
                | (
                    ColumnType::String | ColumnType::Image,
                    ColumnData::Text(_)
                )
                | (
                    ColumnType::IntegerArray | ColumnType::CategoryArray { .. },
                    ColumnData::IntArray(_)
                )
                | (ColumnType::FloatArray, ColumnData::FloatArray(_))
        )
    }
}

/// A raw stored cell. Category codes come back as integers; decoding to
/// labels happens at the dataset layer where the schema is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

#[derive(Serialize, Deserialize)]
struct TableAttrs {
    rows: u64,
    schema: Schema,
    extra_data: Value,
}

/// The columnar store of a package: one `ColumnData` per schema field with a
/// uniform row count, plus the serialized schema and the opaque `extra_data`
/// blob, persisted under the package's `table/` subdirectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    schema: Schema,
    columns: Vec<ColumnData>,
    extra_data: Value,
}

impl Table {
    pub fn new(
        schema: Schema,
        columns: Vec<ColumnData>,
        extra_data: Value,
    ) -> Result<Self, StoreError> {
        validate_shape(&schema, &columns)?;
        Ok(Self {
            schema,
            columns,
            extra_data,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn extra_data(&self) -> &Value {
        &self.extra_data
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, ColumnData::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Random access to one row, in schema column order.
    pub fn row(&self, index: usize) -> Result<Vec<Cell>, StoreError> {
        if index >= self.rows() {
            return Err(StoreError::RowOutOfBounds {
                index,
                rows: self.rows(),
            });
        }
        Ok(self.columns.iter().map(|c| c.cell(index)).collect())
    }

    /// Persist into `package_dir/table/`, flushing every file before
    /// returning.
    pub fn write(&self, package_dir: &Path) -> Result<(), StoreError> {
        let dir = package_dir.join(TABLE_DIR_NAME);
        fs::create_dir_all(&dir)?;
        for (index, column) in self.columns.iter().enumerate() {
            write_json(&dir, &column_file(index), column)?;
        }
        let attrs = TableAttrs {
            rows: self.rows() as u64,
            schema: self.schema.clone(),
            extra_data: self.extra_data.clone(),
        };
        write_json(&dir, ATTRS_FILE, &attrs)?;
        fsync_dir(&dir)?;
        Ok(())
    }

    /// Load the columnar store of a package, re-validating the shape
    /// invariants against the stored schema.
    pub fn open(package_dir: &Path) -> Result<Self, StoreError> {
        let dir = package_dir.join(TABLE_DIR_NAME);
        let attrs_path = dir.join(ATTRS_FILE);
        if !attrs_path.is_file() {
            return Err(StoreError::InvalidTable(format!(
                "missing {}",
                attrs_path.display()
            )));
        }
        let attrs: TableAttrs = serde_json::from_str(&fs::read_to_string(&attrs_path)?)?;

        let mut columns = Vec::with_capacity(attrs.schema.len());
        for (index, column) in attrs.schema.iter().enumerate() {
            let path = dir.join(column_file(index));
            let data: ColumnData = serde_json::from_str(&fs::read_to_string(&path).map_err(
                |e| StoreError::InvalidTable(format!("missing column file for '{}': {e}", column.name)),
            )?)?;
            if data.len() as u64 != attrs.rows {
                return Err(StoreError::InvalidTable(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    data.len(),
                    attrs.rows
                )));
            }
            if !data.matches(&column.kind) {
                return Err(StoreError::InvalidTable(format!(
                    "column '{}' storage does not match its schema type",
                    column.name
                )));
            }
            columns.push(data);
        }

        Ok(Self {
            schema: attrs.schema,
            columns,
            extra_data: attrs.extra_data,
        })
    }
}

fn column_file(index: usize) -> String {
    format!("col_{index}.json")
}

fn validate_shape(schema: &Schema, columns: &[ColumnData]) -> Result<(), StoreError> {
    if schema.len() != columns.len() {
        return Err(StoreError::InvalidTable(format!(
            "{} columns for {} schema fields",
            columns.len(),
            schema.len()
        )));
    }
    let rows = columns.first().map_or(0, ColumnData::len);
    for (column, data) in schema.iter().zip(columns) {
        if data.len() != rows {
            return Err(StoreError::InvalidTable(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                data.len(),
                rows
            )));
        }
        if !data.matches(&column.kind) {
            return Err(StoreError::InvalidTable(format!(
                "column '{}' storage does not match its schema type",
                column.name
            )));
        }
    }
    Ok(())
}

fn write_json<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_string(value)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(file))
        .map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
