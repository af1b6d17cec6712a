//! Error types for `vitae-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::entity::EntityType;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed input; the caller must correct and resubmit.
  #[error("validation error: {0}")]
  Validation(String),

  /// Optimistic-concurrency version mismatch. The caller's view of the
  /// entity is stale; it must refetch and retry.
  #[error(
    "version conflict on {entity_type} {logical_id}: expected v{expected}, \
     active is v{actual}"
  )]
  Conflict {
    entity_type: EntityType,
    logical_id:  Uuid,
    expected:    i64,
    actual:      i64,
  },

  #[error("no active {entity_type} entity: {logical_id}")]
  EntityNotFound {
    entity_type: EntityType,
    logical_id:  Uuid,
  },

  #[error("unknown field {field:?} for entity type {entity_type}")]
  UnknownField {
    entity_type: EntityType,
    field:       String,
  },

  /// The fuzzy-match collaborator failed; classification never proceeds
  /// with a guessed result.
  #[error("match lookup failed: {0}")]
  MatchLookup(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A backend fault that is not part of the domain taxonomy. Store
  /// implementations fold their own error types into this when handing
  /// errors to backend-agnostic callers.
  #[error("storage error: {0}")]
  Storage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
