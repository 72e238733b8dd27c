use thiserror::Error;

/// Errors raised while decoding configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The document is not valid YAML/JSON or does not match the schema.
  #[error("invalid document: {0}")]
  Decode(#[from] serde_yaml::Error),

  /// The configuration file could not be read.
  #[error("failed to read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}
