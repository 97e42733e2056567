//! Data ingestion: document store -> feature store snapshot -> train/test split.

use crate::artifact::IngestionArtifact;
use crate::context::PipelineContext;
use crate::data::store::{DOCUMENT_ID_FIELD, DocumentStore, documents_to_table};
use crate::data::table::Table;
use crate::error::{PipelineError, Result, Stage, StageResultExt};
use crate::layout::IngestionPaths;
use crate::storage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Randomly partition rows into `(train, test)` with `ratio` of them held out.
///
/// The test size is `ceil(ratio * n)`; both sides must end up non-empty. The
/// same seed on the same table always yields the same partition.
pub fn train_test_split(table: &Table, ratio: f64, seed: u64) -> Result<(Table, Table)> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(PipelineError::invalid_input(format!(
            "split ratio must be in (0, 1), got {ratio}"
        )));
    }
    let n = table.n_rows();
    let n_test = ((ratio * n as f64) - 1e-9).ceil().max(0.0) as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::invalid_input(format!(
            "cannot hold out {ratio} of {n} rows and keep both splits non-empty"
        )));
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test_idx, train_idx) = order.split_at(n_test);
    Ok((table.take_rows(train_idx)?, table.take_rows(test_idx)?))
}

pub struct DataIngestion<'a> {
    ctx: &'a PipelineContext,
    store: &'a dyn DocumentStore,
    paths: IngestionPaths,
}

impl<'a> DataIngestion<'a> {
    pub fn new(ctx: &'a PipelineContext, store: &'a dyn DocumentStore) -> Self {
        Self {
            paths: ctx.run.ingestion(&ctx.config.pipeline.feature_store_file),
            ctx,
            store,
        }
    }

    pub fn paths(&self) -> &IngestionPaths {
        &self.paths
    }

    /// Every document of the collection as a table, without the store's id
    /// field and with the missing-value sentinel mapped to missing cells.
    pub fn export_from_store(&self, database: &str, collection: &str) -> Result<Table> {
        let marker = &self.ctx.config.ingestion.missing_marker;
        let mut docs = self.store.fetch_all(database, collection)?;
        for doc in &mut docs {
            doc.shift_remove(DOCUMENT_ID_FIELD);
            for value in doc.values_mut() {
                if value.as_str() == Some(marker.as_str()) {
                    *value = Value::Null;
                }
            }
        }
        let table = documents_to_table(&docs)?;
        info!(
            database,
            collection,
            rows = table.n_rows(),
            columns = table.n_cols(),
            "exported collection"
        );
        Ok(table)
    }

    /// Write the raw snapshot and hand the table back unchanged.
    pub fn export_to_feature_store(&self, table: Table, path: &Path) -> Result<Table> {
        storage::write_table(path, &table)?;
        info!(path = %path.display(), "wrote feature store");
        Ok(table)
    }

    /// Split with the configured ratio and seed, writing both halves.
    pub fn split(&self, table: &Table) -> Result<(Table, Table)> {
        let cfg = &self.ctx.config.ingestion;
        let (train, test) = train_test_split(table, cfg.split_ratio, cfg.seed)?;
        storage::write_table(&self.paths.train_file, &train)?;
        storage::write_table(&self.paths.test_file, &test)?;
        info!(
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            "performed train/test split"
        );
        Ok((train, test))
    }

    pub fn run(&self) -> Result<IngestionArtifact> {
        let _span = self.ctx.stage_span(Stage::Ingestion).entered();
        self.run_inner().stage(Stage::Ingestion)
    }

    fn run_inner(&self) -> Result<IngestionArtifact> {
        let cfg = &self.ctx.config.ingestion;
        let table = self.export_from_store(&cfg.database, &cfg.collection)?;
        if table.n_rows() == 0 {
            return Err(PipelineError::store(format!(
                "collection {}.{} holds no documents",
                cfg.database, cfg.collection
            )));
        }
        let table = self.export_to_feature_store(table, &self.paths.feature_store_file)?;
        self.split(&table)?;
        Ok(IngestionArtifact {
            train_path: self.paths.train_file.clone(),
            test_path: self.paths.test_file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::context::Credentials;
    use crate::data::store::MemoryDocumentStore;
    use crate::layout::RunContext;
    use proptest::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn numbered(n: usize) -> Table {
        Table::from_rows(
            vec!["id".into()],
            (0..n).map(|i| vec![Some(i.to_string())]).collect(),
        )
        .unwrap()
    }

    fn ids(table: &Table) -> Vec<usize> {
        table
            .column("id")
            .unwrap()
            .as_numeric()
            .unwrap()
            .iter()
            .map(|v| v.unwrap() as usize)
            .collect()
    }

    fn context(dir: &TempDir) -> PipelineContext {
        let mut config = PipelineConfig::default();
        config.pipeline.artifacts_dir = dir.path().join("artifacts");
        let run = RunContext::with_timestamp(
            &config.pipeline.artifacts_dir,
            &config.pipeline.name,
            "01-01-2025_00-00-00",
        );
        PipelineContext::with_run(config, Credentials::default(), run)
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let table = numbered(100);
        let (train, test) = train_test_split(&table, 0.2, 42).unwrap();
        assert_eq!(test.n_rows(), 20);
        assert_eq!(train.n_rows(), 80);
        let (train2, test2) = train_test_split(&table, 0.2, 42).unwrap();
        assert_eq!(ids(&train), ids(&train2));
        assert_eq!(ids(&test), ids(&test2));
    }

    #[test]
    fn test_split_rejects_degenerate_tables() {
        assert!(train_test_split(&numbered(1), 0.2, 42).is_err());
        assert!(train_test_split(&numbered(10), 1.0, 42).is_err());
    }

    proptest! {
        #[test]
        fn prop_split_is_a_partition(n in 20usize..300, ratio in 0.05f64..0.95, seed in any::<u64>()) {
            let table = numbered(n);
            let (train, test) = train_test_split(&table, ratio, seed).unwrap();
            prop_assert_eq!(train.n_rows() + test.n_rows(), n);
            prop_assert!((test.n_rows() as f64 - ratio * n as f64).abs() <= 1.0);
            let mut all: Vec<usize> = ids(&train).into_iter().chain(ids(&test)).collect();
            all.sort_unstable();
            prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_export_drops_id_and_maps_sentinel() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let mut store = MemoryDocumentStore::new();
        let docs = vec![
            json!({"f1": 1, "f2": "na", "Result": -1}),
            json!({"f1": 2, "f2": 5, "Result": 1}),
        ];
        store
            .insert_many(
                "network_security",
                "network_data",
                docs.into_iter()
                    .map(|d| d.as_object().cloned().unwrap())
                    .collect(),
            )
            .unwrap();
        let ingestion = DataIngestion::new(&ctx, &store);
        let table = ingestion
            .export_from_store("network_security", "network_data")
            .unwrap();
        assert_eq!(table.column_names(), vec!["f1", "f2", "Result"]);
        assert_eq!(
            table.column("f2").unwrap().as_numeric().unwrap(),
            &[None, Some(5.0)]
        );
    }

    #[test]
    fn test_run_writes_every_file() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let mut store = MemoryDocumentStore::new();
        let docs = (0..10)
            .map(|i| json!({"f1": i, "Result": 1}).as_object().cloned().unwrap())
            .collect();
        store
            .insert_many("network_security", "network_data", docs)
            .unwrap();
        let ingestion = DataIngestion::new(&ctx, &store);
        let artifact = ingestion.run().unwrap();
        assert!(ingestion.paths().feature_store_file.exists());
        assert_eq!(storage::read_table(&artifact.train_path).unwrap().n_rows(), 8);
        assert_eq!(storage::read_table(&artifact.test_path).unwrap().n_rows(), 2);
    }

    #[test]
    fn test_run_on_empty_collection_is_wrapped_store_error() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let store = MemoryDocumentStore::new();
        let err = DataIngestion::new(&ctx, &store).run().unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Ingestion));
        assert!(matches!(err.root(), PipelineError::Store(_)));
    }
}
