use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use chrono::Utc;
use sluice_task_runtime::ScriptRuntime;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::plugin::Plugin;
use crate::registry::PluginRegistry;

/// In-memory plugin registry that validates scripts with a [`ScriptRuntime`].
pub struct MemoryPluginRegistry<R: ScriptRuntime> {
  runtime: R,
  plugins: RwLock<HashMap<String, Plugin>>,
}

impl<R: ScriptRuntime> MemoryPluginRegistry<R> {
  pub fn new(runtime: R) -> Self {
    Self {
      runtime,
      plugins: RwLock::new(HashMap::new()),
    }
  }
}

#[async_trait]
impl<R: ScriptRuntime> PluginRegistry for MemoryPluginRegistry<R> {
  async fn register(
    &self,
    name: &str,
    description: &str,
    script: &str,
  ) -> Result<Plugin, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(RegistryError::InvalidName {
        name: name.to_string(),
      });
    }

    // Compile outside the lock; a rejected script is never inserted.
    if let Err(e) = self.runtime.validate(name, script) {
      warn!(plugin = %name, error = %e, "plugin_rejected");
      return Err(RegistryError::from_sandbox(name, e));
    }

    let plugin = Plugin {
      name: name.to_string(),
      description: description.to_string(),
      script: script.into(),
      validated: true,
      created_at: Utc::now(),
    };

    match self.plugins.write().await.entry(plugin.name.clone()) {
      Entry::Occupied(_) => Err(RegistryError::DuplicatePlugin {
        name: plugin.name,
      }),
      Entry::Vacant(slot) => {
        slot.insert(plugin.clone());
        info!(plugin = %plugin.name, "plugin_registered");
        Ok(plugin)
      }
    }
  }

  async fn lookup(&self, name: &str) -> Result<Plugin, RegistryError> {
    self
      .plugins
      .read()
      .await
      .get(name.trim())
      .cloned()
      .ok_or_else(|| RegistryError::NotFound {
        name: name.to_string(),
      })
  }

  async fn list(&self) -> Result<Vec<Plugin>, RegistryError> {
    let mut plugins: Vec<Plugin> = self.plugins.read().await.values().cloned().collect();
    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(plugins)
  }
}
