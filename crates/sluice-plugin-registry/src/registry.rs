use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::plugin::Plugin;

/// Registry of named plugins.
#[async_trait]
pub trait PluginRegistry: Send + Sync {
  /// Validate and store a plugin. Fails if the script does not compile or
  /// the name is taken; in both cases the registry is left unchanged.
  async fn register(
    &self,
    name: &str,
    description: &str,
    script: &str,
  ) -> Result<Plugin, RegistryError>;

  /// Get a plugin by name. Surrounding whitespace is ignored, as in `register`.
  async fn lookup(&self, name: &str) -> Result<Plugin, RegistryError>;

  /// List all plugins, sorted by name.
  async fn list(&self) -> Result<Vec<Plugin>, RegistryError>;
}

#[async_trait]
impl<T: PluginRegistry + ?Sized> PluginRegistry for Arc<T> {
  async fn register(
    &self,
    name: &str,
    description: &str,
    script: &str,
  ) -> Result<Plugin, RegistryError> {
    (**self).register(name, description, script).await
  }

  async fn lookup(&self, name: &str) -> Result<Plugin, RegistryError> {
    (**self).lookup(name).await
  }

  async fn list(&self) -> Result<Vec<Plugin>, RegistryError> {
    (**self).list().await
  }
}
