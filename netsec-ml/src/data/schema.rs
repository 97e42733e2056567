//! Declared dataset schema and column type inference.

use crate::error::{PipelineError, Result};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Text,
}

/// One entry of the `columns` list: either a bare name or `{name: dtype}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum ColumnEntry {
    Name(String),
    Typed(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaFile {
    columns: Vec<ColumnEntry>,
    #[serde(default)]
    numeric_features: Vec<String>,
}

/// Expected shape of every table entering validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Expected column names, in declaration order.
    pub columns: Vec<String>,
    /// Columns that must hold numeric values.
    pub numeric_features: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>, numeric_features: Vec<String>) -> Self {
        Self {
            columns,
            numeric_features,
        }
    }

    /// Load a schema from its YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let file: SchemaFile = storage::read_structured_config(path)?;
        let mut columns = Vec::with_capacity(file.columns.len());
        for entry in file.columns {
            match entry {
                ColumnEntry::Name(name) => columns.push(name),
                ColumnEntry::Typed(map) => {
                    if map.len() != 1 {
                        return Err(PipelineError::parse(format!(
                            "schema column entry must have exactly one key, got {}",
                            map.len()
                        )));
                    }
                    columns.extend(map.into_keys());
                }
            }
        }
        Ok(Self::new(columns, file.numeric_features))
    }
}

/// Parse a cell as a finite number. "nan" and "inf" stay text.
pub fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Infer a column type from raw cells: numeric when every present cell parses.
pub fn infer_column_type(cells: &[Option<String>]) -> ColumnType {
    let all_numeric = cells.iter().flatten().all(|s| parse_number(s).is_some());
    if all_numeric {
        ColumnType::Numeric
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_infer_column_type() {
        let nums = vec![Some("1".to_string()), None, Some("-0.5".to_string())];
        assert_eq!(infer_column_type(&nums), ColumnType::Numeric);
        let text = vec![Some("1".to_string()), Some("abc".to_string())];
        assert_eq!(infer_column_type(&text), ColumnType::Text);
        assert_eq!(infer_column_type(&[None, None]), ColumnType::Numeric);
        let literals = vec![Some("nan".to_string()), Some("inf".to_string())];
        assert_eq!(infer_column_type(&literals), ColumnType::Text);
    }

    #[test]
    fn test_load_plain_and_typed_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(
            &path,
            "columns:\n  - f1\n  - f2: int64\n  - Result\nnumeric_features:\n  - f1\n  - f2\n",
        )
        .unwrap();
        let schema = Schema::load(&path).unwrap();
        assert_eq!(schema.columns, vec!["f1", "f2", "Result"]);
        assert_eq!(schema.numeric_features, vec!["f1", "f2"]);
    }

    #[test]
    fn test_load_missing_schema_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Schema::load(&dir.path().join("absent.yaml")).is_err());
    }
}
