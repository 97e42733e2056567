//! Experiment tracking: named runs carrying scalar metrics and model records.

use crate::algorithms::Estimator;
use crate::config::{TrackingBackend, TrackingConfig};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Summary of a logged model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedModel {
    pub artifact_path: String,
    pub class: String,
    pub logged_at: DateTime<Utc>,
}

/// Sink for run metrics and model records.
pub trait ExperimentTracker {
    /// Open a run. Metrics and models go to the open run until `end_run`.
    fn start_run(&mut self, name: &str) -> Result<()>;
    fn log_metric(&mut self, key: &str, value: f64) -> Result<()>;
    fn log_model(&mut self, artifact_path: &str, model: &Estimator) -> Result<()>;
    fn end_run(&mut self) -> Result<()>;
}

/// Tracker that records nothing.
#[derive(Debug, Default)]
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn start_run(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn log_metric(&mut self, _key: &str, _value: f64) -> Result<()> {
        Ok(())
    }

    fn log_model(&mut self, _artifact_path: &str, _model: &Estimator) -> Result<()> {
        Ok(())
    }

    fn end_run(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One run as stored by [`FileTracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedRun {
    pub id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metrics: BTreeMap<String, f64>,
    pub models: Vec<LoggedModel>,
}

/// JSON run registry on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRegistry {
    pub experiment: String,
    pub runs: Vec<TrackedRun>,
}

impl RunRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&TrackedRun> {
        self.runs.iter().find(|r| r.name == name)
    }
}

/// Tracker appending runs to a JSON registry; each finished run is flushed.
#[derive(Debug)]
pub struct FileTracker {
    path: PathBuf,
    registry: RunRegistry,
    active: Option<TrackedRun>,
}

impl FileTracker {
    pub fn open(path: impl Into<PathBuf>, experiment: &str) -> Result<Self> {
        let path = path.into();
        let mut registry = RunRegistry::load(&path)?;
        if registry.experiment.is_empty() {
            registry.experiment = experiment.to_string();
        }
        Ok(Self {
            path,
            registry,
            active: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    fn active(&mut self) -> Result<&mut TrackedRun> {
        self.active
            .as_mut()
            .ok_or_else(|| PipelineError::tracking("no active run"))
    }
}

impl ExperimentTracker for FileTracker {
    fn start_run(&mut self, name: &str) -> Result<()> {
        if let Some(open) = &self.active {
            return Err(PipelineError::tracking(format!(
                "run '{}' is still active",
                open.name
            )));
        }
        self.active = Some(TrackedRun {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            metrics: BTreeMap::new(),
            models: Vec::new(),
        });
        Ok(())
    }

    fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        self.active()?.metrics.insert(key.to_string(), value);
        Ok(())
    }

    fn log_model(&mut self, artifact_path: &str, model: &Estimator) -> Result<()> {
        let class = model.sklearn_class().to_string();
        self.active()?.models.push(LoggedModel {
            artifact_path: artifact_path.to_string(),
            class,
            logged_at: Utc::now(),
        });
        Ok(())
    }

    fn end_run(&mut self) -> Result<()> {
        let mut run = self
            .active
            .take()
            .ok_or_else(|| PipelineError::tracking("no active run"))?;
        run.ended_at = Some(Utc::now());
        debug!(run = %run.name, metrics = run.metrics.len(), "closing tracked run");
        self.registry.runs.push(run);
        self.registry.save(&self.path)
    }
}

const MLFLOW_API: &str = "api/2.0/mlflow";

/// Tracker speaking the MLflow REST API.
pub struct MlflowTracker {
    client: reqwest::blocking::Client,
    base_url: String,
    token: Option<String>,
    experiment: String,
    experiment_id: Option<String>,
    run_id: Option<String>,
}

impl std::fmt::Debug for MlflowTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlflowTracker")
            .field("base_url", &self.base_url)
            .field("experiment", &self.experiment)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl MlflowTracker {
    pub fn new(base_url: &str, experiment: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            experiment: experiment.to_string(),
            experiment_id: None,
            run_id: None,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{MLFLOW_API}/{endpoint}", self.base_url)
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Value> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::tracking(format!(
                "MLflow returned {status}: {body}"
            )));
        }
        Ok(response.json()?)
    }

    fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.send(self.client.post(self.url(endpoint)).json(&body))
    }

    fn experiment_id(&mut self) -> Result<String> {
        if let Some(id) = &self.experiment_id {
            return Ok(id.clone());
        }
        let found = self.send(
            self.client
                .get(self.url("experiments/get-by-name"))
                .query(&[("experiment_name", self.experiment.as_str())]),
        );
        let id = match found {
            Ok(body) => body["experiment"]["experiment_id"].as_str().map(str::to_string),
            Err(_) => {
                let body = self.post("experiments/create", json!({ "name": self.experiment }))?;
                body["experiment_id"].as_str().map(str::to_string)
            }
        }
        .ok_or_else(|| PipelineError::tracking("MLflow response carries no experiment id"))?;
        self.experiment_id = Some(id.clone());
        Ok(id)
    }

    fn run_id(&self) -> Result<&str> {
        self.run_id
            .as_deref()
            .ok_or_else(|| PipelineError::tracking("no active run"))
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl ExperimentTracker for MlflowTracker {
    fn start_run(&mut self, name: &str) -> Result<()> {
        let experiment_id = self.experiment_id()?;
        let body = self.post(
            "runs/create",
            json!({
                "experiment_id": experiment_id,
                "run_name": name,
                "start_time": now_millis(),
            }),
        )?;
        let run_id = body["run"]["info"]["run_id"]
            .as_str()
            .ok_or_else(|| PipelineError::tracking("MLflow response carries no run id"))?;
        info!(run_id, name, "started MLflow run");
        self.run_id = Some(run_id.to_string());
        Ok(())
    }

    fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        let run_id = self.run_id()?;
        self.post(
            "runs/log-metric",
            json!({
                "run_id": run_id,
                "key": key,
                "value": value,
                "timestamp": now_millis(),
                "step": 0,
            }),
        )?;
        Ok(())
    }

    fn log_model(&mut self, artifact_path: &str, model: &Estimator) -> Result<()> {
        let run_id = self.run_id()?;
        let history = json!([{
            "artifact_path": artifact_path,
            "flavors": { "class": model.sklearn_class() },
            "utc_time_created": Utc::now().to_rfc3339(),
        }]);
        self.post(
            "runs/set-tag",
            json!({
                "run_id": run_id,
                "key": "mlflow.log-model.history",
                "value": history.to_string(),
            }),
        )?;
        Ok(())
    }

    fn end_run(&mut self) -> Result<()> {
        let run_id = self.run_id()?.to_string();
        self.post(
            "runs/update",
            json!({
                "run_id": run_id,
                "status": "FINISHED",
                "end_time": now_millis(),
            }),
        )?;
        self.run_id = None;
        Ok(())
    }
}

/// Build the configured tracker. The file backend defaults to
/// `default_file` when no URI is configured.
pub fn tracker_from_config(
    config: &TrackingConfig,
    token: Option<&str>,
    default_file: &Path,
) -> Result<Box<dyn ExperimentTracker>> {
    match config.backend {
        TrackingBackend::None => Ok(Box::new(NoopTracker)),
        TrackingBackend::File => {
            let path = config
                .uri
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| default_file.to_path_buf());
            Ok(Box::new(FileTracker::open(path, &config.experiment)?))
        }
        TrackingBackend::Mlflow => {
            let uri = config.uri.as_deref().ok_or_else(|| {
                PipelineError::config("tracking.uri is required for the mlflow backend")
            })?;
            Ok(Box::new(MlflowTracker::new(
                uri,
                &config.experiment,
                token.map(str::to_string),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::ensemble::AdaBoostClassifier;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_file_tracker_persists_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracking.json");
        let mut tracker = FileTracker::open(&path, "netsec").unwrap();
        tracker.start_run("train").unwrap();
        tracker.log_metric("f1_score", 0.9).unwrap();
        tracker
            .log_model("model", &Estimator::AdaBoost(AdaBoostClassifier::default()))
            .unwrap();
        tracker.end_run().unwrap();

        let registry = RunRegistry::load(&path).unwrap();
        assert_eq!(registry.experiment, "netsec");
        let run = registry.find("train").unwrap();
        assert_eq!(run.metrics["f1_score"], 0.9);
        assert_eq!(run.models[0].class, "sklearn.ensemble.AdaBoostClassifier");
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn test_file_tracker_appends_to_existing_registry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracking.json");
        for name in ["first", "second"] {
            let mut tracker = FileTracker::open(&path, "netsec").unwrap();
            tracker.start_run(name).unwrap();
            tracker.end_run().unwrap();
        }
        let names: Vec<String> = RunRegistry::load(&path)
            .unwrap()
            .runs
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_logging_without_run_fails() {
        let dir = TempDir::new().unwrap();
        let mut tracker = FileTracker::open(dir.path().join("t.json"), "netsec").unwrap();
        assert!(matches!(
            tracker.log_metric("x", 1.0),
            Err(PipelineError::Tracking(_))
        ));
        assert!(tracker.end_run().is_err());
    }

    #[test]
    fn test_mlflow_backend_requires_uri() {
        let config = TrackingConfig {
            backend: TrackingBackend::Mlflow,
            ..Default::default()
        };
        let Err(err) = tracker_from_config(&config, None, Path::new("t.json")) else {
            panic!("mlflow backend without a uri should be rejected");
        };
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_unreachable_mlflow_is_tracking_error() {
        let mut tracker = MlflowTracker::new("http://127.0.0.1:9", "netsec", None).unwrap();
        let err = tracker.start_run("train").unwrap_err();
        assert!(matches!(err, PipelineError::Tracking(_)));
    }
}
