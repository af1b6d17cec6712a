//! The diff classifier: candidate field values → classified [`DiffItem`]s.
//!
//! Pure over the ingested candidates, the confirmed profile, and the match
//! lookup. A lookup failure aborts classification — the classifier never
//! substitutes a guessed `new`.

use serde_json::Value;
use uuid::Uuid;

use vitae_core::{
  Error, Result,
  entity::VersionedEntity,
  review::{CandidateEntity, DiffItem, DiffType},
  store::{MatchLookup, ProfileStore},
};

// ─── Value equivalence ───────────────────────────────────────────────────────

/// Normalized equality for classification: free text compares
/// case-insensitively with whitespace collapsed; everything else (dates,
/// numbers, booleans) compares exactly. "Jan 2020" vs "2020-01" is therefore
/// a conflict — the reviewer decides semantic date equality, not the
/// classifier.
pub fn values_equivalent(a: &Value, b: &Value) -> bool {
  match (a, b) {
    (Value::String(x), Value::String(y)) => {
      normalize_text(x) == normalize_text(y)
    }
    _ => a == b,
  }
}

fn normalize_text(s: &str) -> String {
  s.split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Produce the review items for a resume version: one classified
/// [`DiffItem`] per extracted candidate field.
pub async fn list_review_items<S, M>(
  store: &S,
  matcher: &M,
  version_id: Uuid,
) -> Result<Vec<DiffItem>>
where
  S: ProfileStore,
  S::Error: Into<Error>,
  M: MatchLookup,
{
  let Some((owner_id, candidates)) =
    store.list_candidates(version_id).await.map_err(Into::into)?
  else {
    return Err(Error::Validation(format!(
      "no candidates ingested for resume version {version_id}"
    )));
  };

  let mut items = Vec::new();
  for candidate in &candidates {
    let matched = matcher
      .find_similar(owner_id, candidate.entity_type, &candidate.fields)
      .await?;

    match matched {
      None => classify_unmatched(candidate, &mut items),
      Some(logical_id) => {
        let active = store
          .get_active(candidate.entity_type, logical_id)
          .await
          .map_err(Into::into)?
          .ok_or(Error::EntityNotFound {
            entity_type: candidate.entity_type,
            logical_id,
          })?;
        classify_matched(candidate, &active, &mut items)?;
      }
    }
  }

  Ok(items)
}

/// No existing counterpart: every extracted field is `new`.
fn classify_unmatched(candidate: &CandidateEntity, items: &mut Vec<DiffItem>) {
  for (field_name, value) in &candidate.fields {
    if value.is_null() {
      continue;
    }
    items.push(DiffItem {
      field_name: field_name.clone(),
      parsed_entity_id: candidate.parsed_entity_id,
      profile_entity_id: None,
      entity_type: candidate.entity_type,
      diff_type: DiffType::New,
      parsed_value: value.clone(),
      confidence: candidate.confidence,
      justification: format!(
        "no matching {} in the confirmed profile",
        candidate.entity_type
      ),
    });
  }
}

/// Matched an existing entity: compare field by field against its active
/// version.
fn classify_matched(
  candidate: &CandidateEntity,
  active: &VersionedEntity,
  items: &mut Vec<DiffItem>,
) -> Result<()> {
  let profile_fields = active.payload.fields()?;

  for (field_name, value) in &candidate.fields {
    if value.is_null() {
      continue;
    }
    let confirmed = profile_fields.get(field_name).ok_or_else(|| {
      Error::UnknownField {
        entity_type: candidate.entity_type,
        field:       field_name.clone(),
      }
    })?;

    let (diff_type, justification) = if confirmed.is_null() {
      (
        DiffType::New,
        format!("no confirmed value for {field_name:?}"),
      )
    } else if values_equivalent(value, confirmed) {
      (
        DiffType::Equivalent,
        format!("matches the confirmed value {confirmed}"),
      )
    } else {
      (
        DiffType::Conflicting,
        format!("differs from the confirmed value {confirmed}"),
      )
    };

    items.push(DiffItem {
      field_name: field_name.clone(),
      parsed_entity_id: candidate.parsed_entity_id,
      profile_entity_id: Some(active.logical_id),
      entity_type: candidate.entity_type,
      diff_type,
      parsed_value: value.clone(),
      confidence: candidate.confidence,
      justification,
    });
  }

  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
