//! Run lineage: every artifact a run wrote, with its content hash.

use crate::error::{PipelineError, Result};
use crate::storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// One artifact file as it was when recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub stage: String,
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Lineage of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLineage {
    pub pipeline_name: String,
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactRecord>,
    /// `hash_chain[0]` seeds from the run identity; each later entry folds in
    /// one artifact hash.
    pub hash_chain: Vec<String>,
}

fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl RunLineage {
    pub fn new(pipeline_name: &str, timestamp: &str) -> Self {
        Self {
            pipeline_name: pipeline_name.to_string(),
            timestamp: timestamp.to_string(),
            created_at: Utc::now(),
            artifacts: Vec::new(),
            hash_chain: vec![compute_hash(&format!("{pipeline_name}:{timestamp}"))],
        }
    }

    /// Hash `path` and append it under `stage`.
    pub fn record(&mut self, stage: &str, path: &Path) -> Result<&ArtifactRecord> {
        let sha256 = storage::hash_file(path)?;
        let size_bytes = std::fs::metadata(path)?.len();
        let prev = self.hash_chain.last().cloned().unwrap_or_default();
        self.hash_chain.push(compute_hash(&format!("{prev}:{sha256}")));
        self.artifacts.push(ArtifactRecord {
            stage: stage.to_string(),
            path: path.to_path_buf(),
            sha256,
            size_bytes,
        });
        let last = self.artifacts.len() - 1;
        Ok(&self.artifacts[last])
    }

    /// True when the chain matches the records and every file still hashes
    /// to its recorded value.
    pub fn verify(&self) -> bool {
        if self.hash_chain.len() != self.artifacts.len() + 1 {
            return false;
        }
        let seed = compute_hash(&format!("{}:{}", self.pipeline_name, self.timestamp));
        if self.hash_chain[0] != seed {
            return false;
        }
        self.artifacts.iter().enumerate().all(|(i, record)| {
            let expected = compute_hash(&format!("{}:{}", self.hash_chain[i], record.sha256));
            self.hash_chain[i + 1] == expected
                && storage::hash_file(&record.path).is_ok_and(|h| h == record.sha256)
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::not_found(format!(
                "lineage file {}",
                path.display()
            )));
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}
