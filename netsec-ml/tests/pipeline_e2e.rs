//! Full pipeline runs against synthetic phishing-style data.

use netsec_ml::algorithms::Matrix;
use netsec_ml::config::{CatalogKind, TrackingBackend};
use netsec_ml::data::DataSeeder;
use netsec_ml::data::store::{Document, DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
use netsec_ml::layout::RunContext;
use netsec_ml::training::tracking::RunRegistry;
use netsec_ml::{
    Credentials, NetworkModel, PipelineConfig, PipelineContext, PipelineError, Predictor,
    RunLineage, Stage, StageArtifact, TrainingPipeline,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

const SCHEMA: &str = "columns:\n  - f1: int64\n  - f2: int64\n  - Result: int64\nnumeric_features:\n  - f1\n  - f2\n";

/// 100 rows; `Result` is 1 exactly when `f1 >= 5`, `f2` is noise with a few
/// "na" cells.
fn documents() -> Vec<Document> {
    (0..100)
        .map(|i| {
            let f1 = (i * 7) % 10;
            let f2 = if i % 11 == 0 { json!("na") } else { json!((i * 3) % 5) };
            let result = if f1 >= 5 { 1 } else { -1 };
            let doc = json!({"f1": f1, "f2": f2, "Result": result});
            doc.as_object().cloned().unwrap()
        })
        .collect()
}

fn context(dir: &Path) -> PipelineContext {
    let schema_path = dir.join("schema.yaml");
    std::fs::write(&schema_path, SCHEMA).unwrap();
    let mut config = PipelineConfig::default();
    config.pipeline.artifacts_dir = dir.join("artifacts");
    config.validation.schema_path = schema_path;
    config.trainer.catalog = CatalogKind::Compact;
    config.tracking.backend = TrackingBackend::File;
    let run = RunContext::with_timestamp(
        &config.pipeline.artifacts_dir,
        &config.pipeline.name,
        "01-02-2025_03-04-05",
    );
    PipelineContext::with_run(config, Credentials::default(), run)
}

fn in_unit_interval(x: f64) -> bool {
    (0.0..=1.0).contains(&x)
}

#[test]
fn test_pipeline_produces_usable_model() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let mut store = MemoryDocumentStore::new();
    store
        .insert_many("network_security", "network_data", documents())
        .unwrap();

    let mut stages = Vec::new();
    let artifact = TrainingPipeline::new(&ctx, &store)
        .run_with(|a| stages.push(a.stage()))
        .unwrap();

    assert_eq!(
        stages,
        vec![
            Stage::Ingestion,
            Stage::Validation,
            Stage::Transformation,
            Stage::ModelTrainer
        ]
    );
    for m in [artifact.train_metrics, artifact.test_metrics] {
        assert!(in_unit_interval(m.precision));
        assert!(in_unit_interval(m.recall));
        assert!(in_unit_interval(m.f1_score));
    }

    let bundle = NetworkModel::load(&artifact.trained_model_path).unwrap();
    let held_out = Matrix::from_rows(vec![vec![8.0, f64::NAN], vec![1.0, 2.0]]).unwrap();
    for label in bundle.predict(&held_out).unwrap() {
        assert!(label == 0.0 || label == 1.0);
    }

    let lineage = RunLineage::load(&ctx.run.lineage_file()).unwrap();
    assert_eq!(lineage.artifacts.len(), 10);
    assert!(lineage.verify());

    let registry = RunRegistry::load(&ctx.run.tracking_file()).unwrap();
    let runs: Vec<&str> = registry.runs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(runs, vec!["train", "test"]);
}

#[test]
fn test_pipeline_from_seeded_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let csv = dir.path().join("phishing.csv");
    let mut body = String::from("f1,f2,Result\n");
    for i in 0..100 {
        let f1 = (i * 3) % 10;
        let label = if f1 >= 5 { 1 } else { -1 };
        body.push_str(&format!("{f1},{},{label}\n", i % 4));
    }
    std::fs::write(&csv, body).unwrap();

    let mut store = SqliteDocumentStore::open(&dir.path().join("store.db")).unwrap();
    let inserted = DataSeeder::new(&ctx, &mut store)
        .push_configured(&csv)
        .unwrap();
    assert_eq!(inserted, 100);

    let mut printed = Vec::new();
    let artifact = TrainingPipeline::new(&ctx, &store)
        .run_with(|a: &StageArtifact| printed.push(a.to_string()))
        .unwrap();
    assert!(printed[0].contains("\"stage\": \"ingestion\""));
    assert!(artifact.trained_model_path.exists());
}

#[test]
fn test_schema_mismatch_halts_before_training() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let mut store = MemoryDocumentStore::new();
    let docs = documents()
        .into_iter()
        .map(|mut d| {
            d.shift_remove("f2");
            d
        })
        .collect();
    store
        .insert_many("network_security", "network_data", docs)
        .unwrap();

    let err = TrainingPipeline::new(&ctx, &store).run().unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Validation));
    assert!(matches!(err.root(), PipelineError::SchemaValidation(_)));
    assert!(!ctx.run.model_trainer().trained_model_file.exists());
    assert!(!ctx.run.lineage_file().exists());
}

#[test]
fn test_unwritable_lineage_is_reported_by_stage() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let mut store = MemoryDocumentStore::new();
    store
        .insert_many("network_security", "network_data", documents())
        .unwrap();
    std::fs::create_dir_all(ctx.run.lineage_file()).unwrap();

    let err = TrainingPipeline::new(&ctx, &store).run().unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Lineage));
    assert!(matches!(err.root(), PipelineError::Io(_)));
    assert!(ctx.run.model_trainer().trained_model_file.exists());
}
