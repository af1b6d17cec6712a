//! Handler for `/profiles/:owner_id` — the confirmed profile view.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use vitae_core::{
  entity::{EntityType, VersionedEntity},
  store::{MatchLookup, ProfileStore},
};

use crate::{
  ApiState,
  error::{ApiError, store_err},
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// If set, restrict to entities of this type.
  pub entity_type: Option<EntityType>,
}

/// `GET /profiles/:owner_id[?entity_type=...]` — all active entities for an
/// owner.
pub async fn list<S, M>(
  State(state): State<ApiState<S, M>>,
  Path(owner_id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<VersionedEntity>>, ApiError>
where
  S: ProfileStore,
  S::Error: Into<vitae_core::Error>,
  M: MatchLookup,
{
  let entities = state
    .store
    .list_active(owner_id, params.entity_type)
    .await
    .map_err(store_err)?;
  Ok(Json(entities))
}
