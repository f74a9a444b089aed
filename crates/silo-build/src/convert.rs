use crate::BuildError;
use silo_schema::ColumnKind;
use silo_store::ColumnData;
use std::collections::HashMap;

/// First-seen category encoder: each distinct value gets the next integer
/// code in order of first appearance. Owned by one build invocation — the
/// encoder is handed back as the ordered label list when the column is
/// finished, never shared as ambient state.
#[derive(Debug, Default)]
pub struct CategoryEncoder {
    index: HashMap<String, i64>,
    labels: Vec<String>,
}

impl CategoryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, value: &str) -> i64 {
        if let Some(&code) = self.index.get(value) {
            return code;
        }
        let code = self.labels.len() as i64;
        self.index.insert(value.to_owned(), code);
        self.labels.push(value.to_owned());
        code
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn into_labels(self) -> Vec<String> {
        self.labels
    }
}

/// Per-column typed accumulator. One variant per `ColumnKind`, matched
/// exhaustively: adding a column type is a compile-time-checked change.
#[derive(Debug)]
pub enum ColumnAccumulator {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    Category {
        codes: Vec<i64>,
        encoder: CategoryEncoder,
    },
    IntArray(Vec<Vec<i64>>),
    FloatArray(Vec<Vec<f64>>),
    CategoryArray {
        codes: Vec<Vec<i64>>,
        encoder: CategoryEncoder,
    },
}

impl ColumnAccumulator {
    pub fn for_kind(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Integer => ColumnAccumulator::Int(Vec::new()),
            ColumnKind::Float => ColumnAccumulator::Float(Vec::new()),
            // image cells are path-valued text
            ColumnKind::String | ColumnKind::Image => ColumnAccumulator::Text(Vec::new()),
            ColumnKind::Category => ColumnAccumulator::Category {
                codes: Vec::new(),
                encoder: CategoryEncoder::new(),
            },
            ColumnKind::IntegerArray => ColumnAccumulator::IntArray(Vec::new()),
            ColumnKind::FloatArray => ColumnAccumulator::FloatArray(Vec::new()),
            ColumnKind::CategoryArray => ColumnAccumulator::CategoryArray {
                codes: Vec::new(),
                encoder: CategoryEncoder::new(),
            },
        }
    }

    /// Convert and append one CSV cell. Array cells split on whitespace and
    /// convert per token.
    pub fn push(&mut self, column: &str, cell: &str) -> Result<(), BuildError> {
        match self {
            ColumnAccumulator::Int(values) => values.push(parse_int(column, cell)?),
            ColumnAccumulator::Float(values) => values.push(parse_float(column, cell)?),
            ColumnAccumulator::Text(values) => values.push(cell.to_owned()),
            ColumnAccumulator::Category { codes, encoder } => codes.push(encoder.encode(cell)),
            ColumnAccumulator::IntArray(values) => values.push(
                cell.split_whitespace()
                    .map(|token| parse_int(column, token))
                    .collect::<Result<_, _>>()?,
            ),
            ColumnAccumulator::FloatArray(values) => values.push(
                cell.split_whitespace()
                    .map(|token| parse_float(column, token))
                    .collect::<Result<_, _>>()?,
            ),
            ColumnAccumulator::CategoryArray { codes, encoder } => codes.push(
                cell.split_whitespace()
                    .map(|token| encoder.encode(token))
                    .collect(),
            ),
        }
        Ok(())
    }

    /// Finish the column: the stored data plus the ordered category labels
    /// for category-valued kinds.
    pub fn finish(self) -> (ColumnData, Option<Vec<String>>) {
        match self {
            ColumnAccumulator::Int(values) => (ColumnData::Int(values), None),
            ColumnAccumulator::Float(values) => (ColumnData::Float(values), None),
            ColumnAccumulator::Text(values) => (ColumnData::Text(values), None),
            ColumnAccumulator::Category { codes, encoder } => {
                (ColumnData::Int(codes), Some(encoder.into_labels()))
            }
            ColumnAccumulator::IntArray(values) => (ColumnData::IntArray(values), None),
            ColumnAccumulator::FloatArray(values) => (ColumnData::FloatArray(values), None),
            ColumnAccumulator::CategoryArray { codes, encoder } => {
                (ColumnData::IntArray(codes), Some(encoder.into_labels()))
            }
        }
    }
}

fn parse_int(column: &str, raw: &str) -> Result<i64, BuildError> {
    raw.trim().parse().map_err(|_| BuildError::Convert {
        column: column.to_owned(),
        value: raw.to_owned(),
        expected: "integer",
    })
}

fn parse_float(column: &str, raw: &str) -> Result<f64, BuildError> {
    raw.trim().parse().map_err(|_| BuildError::Convert {
        column: column.to_owned(),
        value: raw.to_owned(),
        expected: "float",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_codes_follow_first_seen_order() {
        let mut acc = ColumnAccumulator::for_kind(ColumnKind::Category);
        for value in ["x", "y", "x", "z"] {
            acc.push("c", value).unwrap();
        }
        let (data, labels) = acc.finish();
        assert_eq!(data, ColumnData::Int(vec![0, 1, 0, 2]));
        assert_eq!(
            labels.unwrap(),
            vec!["x".to_owned(), "y".to_owned(), "z".to_owned()]
        );
    }

    #[test]
    fn category_encoding_is_deterministic() {
        let encode = |values: &[&str]| {
            let mut enc = CategoryEncoder::new();
            let codes: Vec<i64> = values.iter().map(|v| enc.encode(v)).collect();
            (codes, enc.into_labels())
        };
        assert_eq!(encode(&["a", "b", "a"]), encode(&["a", "b", "a"]));
    }

    #[test]
    fn integer_array_splits_on_whitespace() {
        let mut acc = ColumnAccumulator::for_kind(ColumnKind::IntegerArray);
        acc.push("c", "1 2 3").unwrap();
        acc.push("c", "  4\t5  ").unwrap();
        acc.push("c", "").unwrap();
        let (data, labels) = acc.finish();
        assert_eq!(
            data,
            ColumnData::IntArray(vec![vec![1, 2, 3], vec![4, 5], vec![]])
        );
        assert!(labels.is_none());
    }

    #[test]
    fn float_array_converts_tokens() {
        let mut acc = ColumnAccumulator::for_kind(ColumnKind::FloatArray);
        acc.push("c", "1.5 -2.25").unwrap();
        let (data, _) = acc.finish();
        assert_eq!(data, ColumnData::FloatArray(vec![vec![1.5, -2.25]]));
    }

    #[test]
    fn category_array_shares_one_encoder_per_column() {
        let mut acc = ColumnAccumulator::for_kind(ColumnKind::CategoryArray);
        acc.push("c", "red blue").unwrap();
        acc.push("c", "blue green").unwrap();
        let (data, labels) = acc.finish();
        assert_eq!(data, ColumnData::IntArray(vec![vec![0, 1], vec![1, 2]]));
        assert_eq!(
            labels.unwrap(),
            vec!["red".to_owned(), "blue".to_owned(), "green".to_owned()]
        );
    }

    #[test]
    fn integer_parse_failure_names_column_and_value() {
        let mut acc = ColumnAccumulator::for_kind(ColumnKind::Integer);
        let err = acc.push("age", "twelve").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("age"));
        assert!(msg.contains("twelve"));
    }

    #[test]
    fn float_accepts_integer_literals() {
        let mut acc = ColumnAccumulator::for_kind(ColumnKind::Float);
        acc.push("c", "3").unwrap();
        let (data, _) = acc.finish();
        assert_eq!(data, ColumnData::Float(vec![3.0]));
    }

    #[test]
    fn image_kind_accumulates_text() {
        let mut acc = ColumnAccumulator::for_kind(ColumnKind::Image);
        acc.push("photo", "a/b.png").unwrap();
        let (data, _) = acc.finish();
        assert_eq!(data, ColumnData::Text(vec!["a/b.png".to_owned()]));
    }
}
