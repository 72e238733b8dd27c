use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::types::Job;
use crate::{Error, JobStore};

/// In-memory job store. Reads run concurrently; uploads take the write lock.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
  jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryJobStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl JobStore for MemoryJobStore {
  async fn upload(&self, data: serde_json::Value, description: &str) -> Result<Job, Error> {
    let job = Job {
      id: uuid::Uuid::new_v4().to_string(),
      description: description.to_string(),
      data,
      created_at: Utc::now(),
    };

    self.jobs.write().await.insert(job.id.clone(), job.clone());
    info!(job_id = %job.id, description = %job.description, "job_uploaded");

    Ok(job)
  }

  async fn get(&self, job_id: &str) -> Result<Job, Error> {
    self
      .jobs
      .read()
      .await
      .get(job_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(job_id.to_string()))
  }

  async fn list(&self) -> Result<Vec<Job>, Error> {
    let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(jobs)
  }
}
