use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type tag as it appears in build configs and portable schemas.
///
/// Carries no category payload; see [`ColumnType`] for the full type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    String,
    Image,
    Category,
    IntegerArray,
    FloatArray,
    CategoryArray,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::String => "string",
            ColumnKind::Image => "image",
            ColumnKind::Category => "category",
            ColumnKind::IntegerArray => "integer_array",
            ColumnKind::FloatArray => "float_array",
            ColumnKind::CategoryArray => "category_array",
        };
        f.write_str(tag)
    }
}

/// A fully described column type. Category variants carry their ordered
/// label list (first-seen order from the build scan).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Image,
    Category { categories: Vec<String> },
    IntegerArray,
    FloatArray,
    CategoryArray { categories: Vec<String> },
}

impl ColumnType {
    /// Combine a config-level tag with the categories discovered at build time.
    /// Non-category kinds ignore the payload.
    pub fn from_kind(kind: ColumnKind, categories: Option<Vec<String>>) -> Self {
        match kind {
            ColumnKind::Integer => ColumnType::Integer,
            ColumnKind::Float => ColumnType::Float,
            ColumnKind::String => ColumnType::String,
            ColumnKind::Image => ColumnType::Image,
            ColumnKind::Category => ColumnType::Category {
                categories: categories.unwrap_or_default(),
            },
            ColumnKind::IntegerArray => ColumnType::IntegerArray,
            ColumnKind::FloatArray => ColumnType::FloatArray,
            ColumnKind::CategoryArray => ColumnType::CategoryArray {
                categories: categories.unwrap_or_default(),
            },
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnType::Integer => ColumnKind::Integer,
            ColumnType::Float => ColumnKind::Float,
            ColumnType::String => ColumnKind::String,
            ColumnType::Image => ColumnKind::Image,
            ColumnType::Category { .. } => ColumnKind::Category,
            ColumnType::IntegerArray => ColumnKind::IntegerArray,
            ColumnType::FloatArray => ColumnKind::FloatArray,
            ColumnType::CategoryArray { .. } => ColumnKind::CategoryArray,
        }
    }

    /// The ordered category labels, for category-valued types only.
    pub fn categories(&self) -> Option<&[String]> {
        match self {
            ColumnType::Category { categories } | ColumnType::CategoryArray { categories } => {
                Some(categories)
            }
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ColumnType::IntegerArray | ColumnType::FloatArray | ColumnType::CategoryArray { .. }
        )
    }
}

/// Portable wire form of a column: `{name, type, categories?}`.
#[derive(Serialize, Deserialize)]
struct PortableColumn {
    name: String,
    #[serde(rename = "type")]
    kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<String>>,
}

/// A named, typed column. Serializes to the portable tagged-record form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PortableColumn", into = "PortableColumn")]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, ColumnType::Image)
    }
}

impl From<PortableColumn> for Column {
    fn from(p: PortableColumn) -> Self {
        Column {
            name: p.name,
            kind: ColumnType::from_kind(p.kind, p.categories),
        }
    }
}

impl From<Column> for PortableColumn {
    fn from(c: Column) -> Self {
        let kind = c.kind.kind();
        let categories = c.kind.categories().map(<[String]>::to_vec);
        PortableColumn {
            name: c.name,
            kind,
            categories,
        }
    }
}

/// An ordered sequence of columns. Order is the row-tuple order and is
/// preserved across round-trips. Name uniqueness is the caller's problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: Column) {
        self.columns.push(column);
    }

    pub fn add_column(&mut self, name: impl Into<String>, kind: ColumnType) {
        self.push(Column::new(name, kind));
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    /// Serialize to the portable object form (a JSON array of tagged records).
    pub fn to_portable(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("schema serialization is infallible")
    }

    /// Reconstruct a schema from its portable form.
    pub fn from_portable(value: &serde_json::Value) -> Result<Self, crate::SchemaError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
