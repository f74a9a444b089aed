use crate::{ColumnKind, SchemaError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One declared column in a build config: `{"name": ..., "type": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
}

/// A build config file: declared columns, the CSV path relative to the
/// config's directory, and an opaque `extra_data` value carried through to
/// the built package unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub columns: Vec<ColumnSpec>,
    pub path: String,
    #[serde(default)]
    pub extra_data: serde_json::Value,
}

pub fn parse_config_str(input: &str) -> Result<BuildConfig, SchemaError> {
    let config: BuildConfig = serde_json::from_str(input)?;
    if config.columns.is_empty() {
        return Err(SchemaError::Config(
            "config must declare at least one column".to_owned(),
        ));
    }
    if config.path.is_empty() {
        return Err(SchemaError::Config("csv path must not be empty".to_owned()));
    }
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<BuildConfig, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
