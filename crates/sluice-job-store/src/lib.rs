//! Sluice Job Store
//!
//! Uploaded datasets ("jobs") addressed by opaque ids. Jobs are immutable
//! once stored; the store has no update operation.
//!
//! The [`JobStore`] trait defines:
//! - Uploading a dataset and receiving a fresh job id
//! - Fetching a job by id
//! - Listing stored jobs

mod memory;
mod types;

pub use memory::MemoryJobStore;
pub use types::Job;

use async_trait::async_trait;

/// Error type for job store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// No job with this id exists.
  #[error("job not found: {0}")]
  NotFound(String),
}

/// Storage for uploaded datasets.
#[async_trait]
pub trait JobStore: Send + Sync {
  /// Store a dataset under a newly generated id.
  async fn upload(&self, data: serde_json::Value, description: &str) -> Result<Job, Error>;

  /// Get a job by id.
  async fn get(&self, job_id: &str) -> Result<Job, Error>;

  /// List all jobs, oldest first.
  async fn list(&self) -> Result<Vec<Job>, Error>;
}
