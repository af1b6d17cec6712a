//! Handlers for the `/reviews/:version_id` endpoints — the merge review
//! cycle for one resume version.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `PUT`  | `/reviews/:version_id/candidates` | Ingest extraction output; replaces any prior batch |
//! | `GET`  | `/reviews/:version_id/items` | Classified diff items |
//! | `GET`  | `/reviews/:version_id/decisions` | Pending decisions; `?include_applied=true` for all |
//! | `POST` | `/reviews/:version_id/decisions` | Body: [`NewDecisionBody`]; upserts by field |
//! | `POST` | `/reviews/:version_id/apply` | Apply pending decisions, returns counts |
//! | `POST` | `/reviews/:version_id/apply-new` | Bulk-confirm an all-`new` batch |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use vitae_core::{
  entity::EntityType,
  review::{
    ApplyOutcome, CandidateEntity, DecisionType, DiffItem, MergeDecision,
    NewDecision,
  },
  store::{MatchLookup, ProfileStore},
};
use vitae_reconcile::{apply_all, apply_all_new, list_review_items};

use crate::{
  ApiState,
  error::{ApiError, store_err},
};

// ─── Candidates ───────────────────────────────────────────────────────────────

/// JSON body accepted by `PUT /reviews/:version_id/candidates`.
#[derive(Debug, Deserialize)]
pub struct IngestBody {
  pub owner_id:   Uuid,
  pub candidates: Vec<CandidateEntity>,
}

/// `PUT /reviews/:version_id/candidates` — returns 204.
pub async fn ingest<S, M>(
  State(state): State<ApiState<S, M>>,
  Path(version_id): Path<Uuid>,
  Json(body): Json<IngestBody>,
) -> Result<StatusCode, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  state
    .store
    .ingest_candidates(version_id, body.owner_id, body.candidates)
    .await
    .map_err(store_err)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Items ────────────────────────────────────────────────────────────────────

/// `GET /reviews/:version_id/items`
pub async fn items<S, M>(
  State(state): State<ApiState<S, M>>,
  Path(version_id): Path<Uuid>,
) -> Result<Json<Vec<DiffItem>>, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  let items =
    list_review_items(&*state.store, &*state.matcher, version_id).await?;
  Ok(Json(items))
}

// ─── Decisions ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DecisionParams {
  /// If `true`, include already-applied decisions. Default `false`.
  #[serde(default)]
  pub include_applied: bool,
}

/// `GET /reviews/:version_id/decisions[?include_applied=true]`
pub async fn decisions<S, M>(
  State(state): State<ApiState<S, M>>,
  Path(version_id): Path<Uuid>,
  Query(params): Query<DecisionParams>,
) -> Result<Json<Vec<MergeDecision>>, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  let decisions = if params.include_applied {
    state.store.list_decisions(version_id).await
  } else {
    state.store.list_pending_decisions(version_id).await
  }
  .map_err(store_err)?;
  Ok(Json(decisions))
}

/// JSON body accepted by `POST /reviews/:version_id/decisions`.
#[derive(Debug, Deserialize)]
pub struct NewDecisionBody {
  pub parsed_entity_id:  Uuid,
  pub field_name:        String,
  pub entity_type:       EntityType,
  pub profile_entity_id: Option<Uuid>,
  pub decision:          DecisionType,
  pub parsed_value:      Value,
  pub override_value:    Option<Value>,
  pub justification:     Option<String>,
  pub confidence:        Option<f64>,
}

/// `POST /reviews/:version_id/decisions` — returns 201 + the recorded
/// decision. Recording the same `(parsed_entity_id, field_name)` again
/// replaces the earlier decision and resets `applied`.
pub async fn record<S, M>(
  State(state): State<ApiState<S, M>>,
  Path(version_id): Path<Uuid>,
  Json(body): Json<NewDecisionBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  let input = NewDecision {
    version_id,
    parsed_entity_id: body.parsed_entity_id,
    field_name: body.field_name,
    entity_type: body.entity_type,
    profile_entity_id: body.profile_entity_id,
    decision: body.decision,
    parsed_value: body.parsed_value,
    override_value: body.override_value,
    justification: body.justification,
    confidence: body.confidence,
  };
  let decision =
    state.store.record_decision(input).await.map_err(store_err)?;
  Ok((StatusCode::CREATED, Json(decision)))
}

// ─── Apply ────────────────────────────────────────────────────────────────────

/// `POST /reviews/:version_id/apply` — returns the aggregate counts.
pub async fn apply<S, M>(
  State(state): State<ApiState<S, M>>,
  Path(version_id): Path<Uuid>,
) -> Result<Json<ApplyOutcome>, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  let outcome = apply_all(&*state.store, version_id).await?;
  Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct ApplyNewResponse {
  pub entities_created: u32,
}

/// `POST /reviews/:version_id/apply-new` — bulk-confirm when every item is
/// `new`; 400 if anything needs review.
pub async fn apply_new<S, M>(
  State(state): State<ApiState<S, M>>,
  Path(version_id): Path<Uuid>,
) -> Result<Json<ApplyNewResponse>, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  let entities_created =
    apply_all_new(&*state.store, &*state.matcher, version_id).await?;
  Ok(Json(ApplyNewResponse { entities_created }))
}
