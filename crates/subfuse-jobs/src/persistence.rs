//! Atomic JSON persistence for the job store
//!
//! The file holds `{"jobs": [...]}` and every rewrite goes through a temp
//! file and rename so a crash never leaves a half-written store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::error::JobResult;
use crate::job::Job;

#[derive(Serialize, Deserialize, Default)]
struct StoreFile {
    jobs: Vec<Job>,
}

/// File-backed job store
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    /// Create a store over the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load persisted jobs; a missing file is an empty store
    pub async fn load(&self) -> JobResult<Vec<Job>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path).await?;
        let file: StoreFile = serde_json::from_slice(&data)?;
        Ok(file.jobs)
    }

    /// Rewrite the store atomically
    pub async fn save(&self, jobs: &[Job]) -> JobResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = StoreFile {
            jobs: jobs.to_vec(),
        };
        let data = serde_json::to_vec_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
