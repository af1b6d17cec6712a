//! Handlers for `/entities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/entities` | Body: [`NewEntityBody`]; returns 201 + stored version |
//! | `GET`  | `/entities/:entity_type/:logical_id` | Active version; `?history=true` for all versions |
//! | `PUT`  | `/entities/:entity_type/:logical_id` | Body: [`UpdateBody`]; 409 on version mismatch |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use vitae_core::{
  entity::{EntityPayload, EntitySource, EntityType, NewEntity},
  store::{FieldUpdates, MatchLookup, ProfileStore},
};

use crate::{
  ApiState,
  error::{ApiError, store_err},
};

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /entities`.
#[derive(Debug, Deserialize)]
pub struct NewEntityBody {
  pub owner_id:   Uuid,
  pub payload:    EntityPayload,
  #[serde(default)]
  pub source:     EntitySource,
  pub confidence: Option<f64>,
}

/// `POST /entities` — returns 201 + the stored
/// [`VersionedEntity`](vitae_core::entity::VersionedEntity) at version 1.
pub async fn create<S, M>(
  State(state): State<ApiState<S, M>>,
  Json(body): Json<NewEntityBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  let input = NewEntity {
    owner_id:          body.owner_id,
    payload:           body.payload,
    source:            body.source,
    source_confidence: body.confidence,
  };
  let entity = state.store.create_entity(input).await.map_err(store_err)?;
  Ok((StatusCode::CREATED, Json(entity)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GetParams {
  /// If `true`, return every version, oldest first. Default `false`.
  #[serde(default)]
  pub history: bool,
}

/// `GET /entities/:entity_type/:logical_id[?history=true]`
pub async fn get_one<S, M>(
  State(state): State<ApiState<S, M>>,
  Path((entity_type, logical_id)): Path<(EntityType, Uuid)>,
  Query(params): Query<GetParams>,
) -> Result<Response, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  if params.history {
    let versions =
      state.store.get_history(logical_id).await.map_err(store_err)?;
    if versions.is_empty() {
      return Err(ApiError::NotFound(format!(
        "{entity_type} {logical_id} not found"
      )));
    }
    return Ok(Json(versions).into_response());
  }

  let entity = state
    .store
    .get_active(entity_type, logical_id)
    .await
    .map_err(store_err)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("{entity_type} {logical_id} not found"))
    })?;
  Ok(Json(entity).into_response())
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `PUT /entities/:entity_type/:logical_id`.
///
/// `expected_version` is the version the caller last read; the edit fails
/// with 409 if someone else advanced the entity in between. Omitting
/// `source` keeps the prior version's provenance.
#[derive(Debug, Deserialize)]
pub struct UpdateBody {
  pub expected_version: i64,
  pub updates:          FieldUpdates,
  pub source:           Option<EntitySource>,
  pub confidence:       Option<f64>,
}

/// `PUT /entities/:entity_type/:logical_id` — returns the new active version.
pub async fn update<S, M>(
  State(state): State<ApiState<S, M>>,
  Path((entity_type, logical_id)): Path<(EntityType, Uuid)>,
  Json(body): Json<UpdateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  let source = body.source.map(|s| (s, body.confidence));
  let entity = state
    .store
    .advance_entity(
      entity_type,
      logical_id,
      body.expected_version,
      body.updates,
      source,
      None,
    )
    .await
    .map_err(store_err)?;
  Ok(Json(entity))
}
