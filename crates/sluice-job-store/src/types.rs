use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub id: String,
  pub description: String,
  pub data: serde_json::Value,
  pub created_at: DateTime<Utc>,
}
