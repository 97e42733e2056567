//! Storage utilities — tables, structured config, dense arrays and fitted objects.
//!
//! Every write creates missing parent directories and overwrites in place.
//! Writes are not atomic: a crash mid-write can leave a truncated file.

use crate::algorithms::Matrix;
use crate::data::table::Table;
use crate::error::{PipelineError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn require_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PipelineError::not_found(format!(
            "the file {} does not exist",
            path.display()
        )));
    }
    Ok(())
}

/// Write a table as comma-delimited text with a header row.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.column_names())?;
    for row in 0..table.n_rows() {
        writer.write_record(table.columns().iter().map(|c| c.data.render(row)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a comma-delimited file with a header row into typed columns.
///
/// Only an empty cell is missing; every other literal is kept as written.
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                .collect(),
        );
    }

    Table::from_rows(names, rows).map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {e}", path.display()),
        ))
    })
}

/// Parse a YAML document.
pub fn read_structured_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| PipelineError::parse(format!("{}: {e}", path.display())))
}

/// Serialize a value as YAML.
///
/// With `replace`, an existing file is deleted first so nothing from a
/// differently shaped earlier document can survive.
pub fn write_structured_config<T: Serialize>(path: &Path, content: &T, replace: bool) -> Result<()> {
    if replace && path.exists() {
        std::fs::remove_file(path)?;
    }
    ensure_parent(path)?;
    let yaml = serde_yaml::to_string(content)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Save a dense array in binary form.
pub fn save_array(path: &Path, array: &Matrix) -> Result<()> {
    save_object(path, array)
}

/// Load a dense array written by [`save_array`].
pub fn load_array(path: &Path) -> Result<Matrix> {
    let array: Matrix = load_object(path)?;
    array.check_shape()?;
    Ok(array)
}

/// Serialize any fitted object in binary form.
pub fn save_object<T: Serialize>(path: &Path, obj: &T) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serde::encode_into_std_write(obj, &mut writer, bincode::config::standard())?;
    writer.flush()?;
    Ok(())
}

/// Load an object written by [`save_object`].
pub fn load_object<T: DeserializeOwned>(path: &Path) -> Result<T> {
    require_exists(path)?;
    let bytes = std::fs::read(path)?;
    let (obj, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
    Ok(obj)
}

/// SHA-256 of a file's contents, hex encoded.
pub fn hash_file(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::Column;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_table() -> Table {
        Table::new(vec![
            Column::numeric("f1", vec![Some(1.0), None, Some(-0.25)]),
            Column::text(
                "label",
                vec![Some("phish".into()), Some("ok, \"quoted\"".into()), None],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_table_roundtrip_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("t.csv");
        let table = sample_table();
        write_table(&path, &table).unwrap();
        assert_eq!(read_table(&path).unwrap(), table);
    }

    #[test]
    fn test_missing_value_literals_survive_as_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.csv");
        let table = Table::new(vec![
            Column::numeric("id", vec![Some(1.0), None, Some(3.0)]),
            Column::text(
                "label",
                vec![Some("NA".into()), Some("null".into()), Some("ok".into())],
            ),
            Column::text("raw", vec![Some("nan".into()), None, Some("N/A".into())]),
        ])
        .unwrap();
        write_table(&path, &table).unwrap();
        assert_eq!(read_table(&path).unwrap(), table);
    }

    #[test]
    fn test_read_table_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_table(&dir.path().join("none.csv")).unwrap_err();
        match err {
            PipelineError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_table_malformed_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "a,b\n1,2\n3\n").unwrap();
        assert!(matches!(read_table(&path), Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_structured_config_replace_drops_stale_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report").join("report.yaml");

        let mut first = BTreeMap::new();
        first.insert("old".to_string(), 1);
        first.insert("shared".to_string(), 2);
        write_structured_config(&path, &first, true).unwrap();

        let mut second = BTreeMap::new();
        second.insert("shared".to_string(), 3);
        write_structured_config(&path, &second, true).unwrap();

        let loaded: BTreeMap<String, i32> = read_structured_config(&path).unwrap();
        assert_eq!(loaded, second);
    }

    #[test]
    fn test_structured_config_invalid_syntax_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "columns: [a, b\n").unwrap();
        let err = read_structured_config::<serde_yaml::Value>(&path).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn test_array_roundtrip_and_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("arr").join("train.bin");
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, f64::NAN]]).unwrap();
        save_array(&path, &m).unwrap();
        let loaded = load_array(&path).unwrap();
        assert_eq!(loaded.nrows(), 2);
        assert_eq!(loaded.get(1, 0), 3.0);
        assert!(loaded.get(1, 1).is_nan());

        let err = load_array(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Fitted {
        name: String,
        weights: Vec<f64>,
    }

    #[test]
    fn test_object_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obj.bin");
        let obj = Fitted {
            name: "imputer".into(),
            weights: vec![0.5, 1.5],
        };
        save_object(&path, &obj).unwrap();
        assert_eq!(load_object::<Fitted>(&path).unwrap(), obj);
        assert!(matches!(
            load_object::<Fitted>(&dir.path().join("absent.bin")),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_hash_file_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    proptest! {
        #[test]
        fn prop_table_roundtrip(
            rows in proptest::collection::vec(
                (
                    proptest::option::of(-1.0e6f64..1.0e6),
                    proptest::option::of(prop_oneof![
                        "[a-k]{1,8}",
                        Just("NA".to_string()),
                        Just("N/A".to_string()),
                        Just("null".to_string()),
                        Just("nan".to_string()),
                        Just("NaN".to_string()),
                    ]),
                ),
                0..20,
            )
        ) {
            let (nums, words): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
            let table = Table::new(vec![
                Column::numeric("num", nums),
                Column::text("word", words.clone()),
            ]).unwrap();
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("t.csv");
            write_table(&path, &table).unwrap();
            let loaded = read_table(&path).unwrap();
            // A text column with no present value reads back as an all-missing numeric column.
            if words.iter().all(Option::is_none) {
                prop_assert_eq!(loaded.column("num"), table.column("num"));
            } else {
                prop_assert_eq!(loaded, table);
            }
        }
    }
}
