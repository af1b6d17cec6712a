//! The `ProfileStore` and `MatchLookup` traits.
//!
//! `ProfileStore` is implemented by storage backends (e.g.
//! `vitae-store-sqlite`). Higher layers (`vitae-reconcile`, `vitae-api`)
//! depend on these abstractions, not on any concrete backend.

use std::future::Future;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  entity::{EntitySource, EntityType, NewEntity, VersionedEntity},
  review::{CandidateEntity, DecisionKey, MergeDecision, NewDecision},
};

/// A field-name → value map merged over an entity's prior payload when a new
/// version is created.
pub type FieldUpdates = Map<String, Value>;

// ─── ProfileStore ────────────────────────────────────────────────────────────

/// Abstraction over a Vitae profile store backend.
///
/// Entity versions are append-only; the only mutable shared state is the
/// per-logical-entity active pointer, which moves exclusively through
/// [`advance_entity`](ProfileStore::advance_entity) — the single atomic
/// compare-and-advance primitive shared by direct edits and decision
/// application.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ProfileStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Persist a brand-new logical entity at version 1, active.
  fn create_entity(
    &self,
    input: NewEntity,
  ) -> impl Future<Output = Result<VersionedEntity, Self::Error>> + Send + '_;

  /// Like [`create_entity`](ProfileStore::create_entity), but additionally
  /// marks the named ledger rows applied in the same transaction. Used by
  /// the decision applicator when an accepted `new` diff creates an entity.
  fn create_entity_with_decisions(
    &self,
    input: NewEntity,
    decisions: Vec<DecisionKey>,
  ) -> impl Future<Output = Result<VersionedEntity, Self::Error>> + Send + '_;

  /// The active version for `(entity_type, logical_id)`, or `None`.
  fn get_active(
    &self,
    entity_type: EntityType,
    logical_id: Uuid,
  ) -> impl Future<Output = Result<Option<VersionedEntity>, Self::Error>>
  + Send
  + '_;

  /// All versions of a logical entity, ordered by version ascending.
  fn get_history(
    &self,
    logical_id: Uuid,
  ) -> impl Future<Output = Result<Vec<VersionedEntity>, Self::Error>>
  + Send
  + '_;

  /// All active entities for an owner, optionally restricted to one type.
  fn list_active(
    &self,
    owner_id: Uuid,
    entity_type: Option<EntityType>,
  ) -> impl Future<Output = Result<Vec<VersionedEntity>, Self::Error>>
  + Send
  + '_;

  /// Atomically advance a logical entity to its next version.
  ///
  /// In a single transaction: verify the current active version's number
  /// equals `expected_version` (a mismatch is a conflict and writes
  /// nothing), merge `updates` over the prior payload, insert version
  /// `expected_version + 1` as the new active row, deactivate the prior
  /// row, and — when `decision` is supplied — mark that ledger row applied.
  ///
  /// `source` of `None` preserves the prior version's source and
  /// confidence; `Some` replaces both.
  fn advance_entity(
    &self,
    entity_type: EntityType,
    logical_id: Uuid,
    expected_version: i64,
    updates: FieldUpdates,
    source: Option<(EntitySource, Option<f64>)>,
    decision: Option<DecisionKey>,
  ) -> impl Future<Output = Result<VersionedEntity, Self::Error>> + Send + '_;

  // ── Candidates ────────────────────────────────────────────────────────

  /// Store the extraction output for a resume version, replacing any batch
  /// previously ingested for it.
  fn ingest_candidates(
    &self,
    version_id: Uuid,
    owner_id: Uuid,
    candidates: Vec<CandidateEntity>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The candidate batch for a resume version, with its owner. `None` if
  /// nothing has been ingested for the version.
  fn list_candidates(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Option<(Uuid, Vec<CandidateEntity>)>, Self::Error>>
  + Send
  + '_;

  // ── Merge decision ledger ─────────────────────────────────────────────

  /// Insert or replace the decision row keyed by
  /// `(version_id, parsed_entity_id, field_name)`. Never touches entity
  /// rows; `applied` starts (or resets to) false.
  fn record_decision(
    &self,
    input: NewDecision,
  ) -> impl Future<Output = Result<MergeDecision, Self::Error>> + Send + '_;

  /// All decisions for a resume version, applied or not, ordered by
  /// recording time.
  fn list_decisions(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Vec<MergeDecision>, Self::Error>>
  + Send
  + '_;

  /// All decisions for a resume version with `applied = false`, ordered by
  /// recording time.
  fn list_pending_decisions(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Vec<MergeDecision>, Self::Error>>
  + Send
  + '_;

  fn get_decision(
    &self,
    key: DecisionKey,
  ) -> impl Future<Output = Result<Option<MergeDecision>, Self::Error>>
  + Send
  + '_;

  /// Mark a decision applied without an entity write. Used for rejects.
  fn mark_decision_applied(
    &self,
    key: DecisionKey,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── MatchLookup ─────────────────────────────────────────────────────────────

/// The outbound fuzzy-matching collaborator: which existing logical entity,
/// if any, corresponds to a candidate.
///
/// The classifier calls and trusts this; it is not itself responsible for
/// text similarity. A lookup failure must surface as
/// [`crate::Error::MatchLookup`] — the classifier never substitutes a
/// guessed classification.
pub trait MatchLookup: Send + Sync {
  fn find_similar<'a>(
    &'a self,
    owner_id: Uuid,
    entity_type: EntityType,
    candidate_fields: &'a Map<String, Value>,
  ) -> impl Future<Output = crate::Result<Option<Uuid>>> + Send + 'a;
}
