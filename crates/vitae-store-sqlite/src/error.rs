//! Error type for `vitae-store-sqlite`.

use thiserror::Error;

use vitae_core::review::DecisionKey;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] vitae_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decode error: {0}")]
  Decode(String),

  /// Attempted to mark a decision applied that was never recorded.
  #[error(
    "decision not found: version {} / candidate {} / field {:?}",
    .0.version_id, .0.parsed_entity_id, .0.field_name
  )]
  DecisionNotFound(DecisionKey),
}

/// Fold into the backend-agnostic core taxonomy. Domain errors pass through;
/// everything else becomes a `Storage` fault.
impl From<Error> for vitae_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      other => vitae_core::Error::Storage(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
