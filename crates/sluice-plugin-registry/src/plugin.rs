use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered transformation script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Source text, shared with every compiled step that uses the plugin.
  pub script: Arc<str>,
  /// Set once the runtime has compiled the script.
  pub validated: bool,
  pub created_at: DateTime<Utc>,
}
