//! [`KeyFieldMatcher`] — a built-in implementation of the match-lookup
//! collaborator.
//!
//! Deployments with a dedicated fuzzy-matching service implement
//! [`MatchLookup`] against it; this matcher covers the common case with
//! normalized key-field equality against the owner's active entities. It
//! deliberately matches on identity fields only (the company, not the title)
//! so that a revised title still resolves to the same logical entity.

use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use vitae_core::{
  Error, Result,
  entity::EntityType,
  store::{MatchLookup, ProfileStore},
};

use crate::classify::values_equivalent;

/// The fields that identify "the same real-world fact" per entity type.
/// Known limit: two positions at the same company resolve to one logical
/// entity; disambiguating those needs a real fuzzy-matching service.
fn key_fields(entity_type: EntityType) -> &'static [&'static str] {
  match entity_type {
    EntityType::WorkExperience => &["company"],
    EntityType::Education => &["institution"],
    EntityType::Skill => &["name"],
    EntityType::Project => &["name"],
    EntityType::Certification => &["name", "issuer"],
  }
}

/// Key-field matcher over a profile store.
pub struct KeyFieldMatcher<S> {
  store: Arc<S>,
}

impl<S> KeyFieldMatcher<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }
}

impl<S> MatchLookup for KeyFieldMatcher<S>
where
  S: ProfileStore,
  S::Error: Into<Error>,
{
  async fn find_similar(
    &self,
    owner_id: Uuid,
    entity_type: EntityType,
    candidate_fields: &Map<String, Value>,
  ) -> Result<Option<Uuid>> {
    let keys = key_fields(entity_type);

    // A candidate with no usable key values matches nothing.
    if keys
      .iter()
      .all(|k| candidate_fields.get(*k).is_none_or(Value::is_null))
    {
      return Ok(None);
    }

    let existing = self
      .store
      .list_active(owner_id, Some(entity_type))
      .await
      .map_err(|e| Error::MatchLookup(e.into().to_string()))?;

    for entity in existing {
      let profile_fields = entity
        .payload
        .fields()
        .map_err(|e| Error::MatchLookup(e.to_string()))?;

      let all_keys_match = keys.iter().all(|k| {
        let candidate = candidate_fields.get(*k).unwrap_or(&Value::Null);
        let confirmed = profile_fields.get(*k).unwrap_or(&Value::Null);
        values_equivalent(candidate, confirmed)
      });
      if all_keys_match {
        return Ok(Some(entity.logical_id));
      }
    }

    Ok(None)
  }
}
