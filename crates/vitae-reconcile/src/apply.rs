//! The decision applicator: pending ledger rows → entity writes.
//!
//! Each decision is applied in its own store transaction, so one failure
//! never rolls back its siblings; failed decisions stay pending and the next
//! run picks them up. Accepted `new` diffs are the exception — all decisions
//! for one candidate collapse into a single entity creation, committed
//! together with their ledger rows.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use vitae_core::{
  Error, Result,
  entity::{EntityPayload, EntitySource, NewEntity},
  review::{
    ApplyOutcome, CandidateEntity, DecisionType, DiffItem, DiffType,
    MergeDecision,
  },
  store::{FieldUpdates, MatchLookup, ProfileStore},
};

use crate::classify::list_review_items;

/// How many times a single decision retries its read-check-advance cycle
/// when a concurrent writer moves the active version underneath it.
pub const MAX_CONFLICT_ATTEMPTS: u32 = 3;

// ─── apply_all ───────────────────────────────────────────────────────────────

/// Apply every pending decision recorded for a resume version.
///
/// Partial success is the normal outcome: each failure is logged, the
/// decision is left pending, and the counts report only what committed.
pub async fn apply_all<S>(store: &S, version_id: Uuid) -> Result<ApplyOutcome>
where
  S: ProfileStore,
  S::Error: Into<Error>,
{
  let pending = store
    .list_pending_decisions(version_id)
    .await
    .map_err(Into::into)?;

  let mut outcome = ApplyOutcome::default();

  // Rejects never write an entity row; the ledger row is the whole effect.
  // Field-level rejects on unmatched candidates also carry into the group
  // payload below, as cleared fields.
  let mut rejected_new_fields: BTreeMap<Uuid, Vec<String>> = BTreeMap::new();
  let mut matched = Vec::new();
  let mut new_groups: BTreeMap<Uuid, Vec<MergeDecision>> = BTreeMap::new();

  for decision in pending {
    match (decision.decision, decision.profile_entity_id) {
      (DecisionType::Reject, profile_entity_id) => {
        match store.mark_decision_applied(decision.key()).await {
          Ok(()) => {
            // Only a committed reject may clear a field from a group
            // payload; one that stays pending must not lose its value.
            if profile_entity_id.is_none() {
              rejected_new_fields
                .entry(decision.parsed_entity_id)
                .or_default()
                .push(decision.field_name.clone());
            }
            outcome.rejected += 1;
          }
          Err(e) => warn!(
            field = %decision.field_name,
            error = %e,
            "failed to mark rejected decision applied"
          ),
        }
      }
      (_, Some(_)) => matched.push(decision),
      (_, None) => new_groups
        .entry(decision.parsed_entity_id)
        .or_default()
        .push(decision),
    }
  }

  for decision in matched {
    match apply_to_existing(store, &decision).await {
      Ok(()) => match decision.decision {
        DecisionType::Accept => outcome.applied += 1,
        DecisionType::Override => outcome.overridden += 1,
        DecisionType::Reject => {}
      },
      Err(e) => warn!(
        parsed_entity_id = %decision.parsed_entity_id,
        field = %decision.field_name,
        error = %e,
        "failed to apply decision, leaving it pending"
      ),
    }
  }

  // A missing candidate batch is a per-group failure like any other: the
  // new-entity decisions stay pending, the counts so far still stand.
  let candidates = if new_groups.is_empty() {
    None
  } else {
    match load_candidates(store, version_id).await {
      Ok(c) => Some(c),
      Err(e) => {
        warn!(
          %version_id,
          error = %e,
          "cannot load candidate batch, leaving new-entity decisions pending"
        );
        None
      }
    }
  };

  if let Some(candidates) = candidates {
    for (parsed_entity_id, group) in new_groups {
      let rejected = rejected_new_fields
        .remove(&parsed_entity_id)
        .unwrap_or_default();
      match create_from_group(
        store,
        &candidates,
        parsed_entity_id,
        &group,
        &rejected,
      )
      .await
      {
        Ok(()) => {
          for decision in &group {
            match decision.decision {
              DecisionType::Accept => outcome.applied += 1,
              DecisionType::Override => outcome.overridden += 1,
              DecisionType::Reject => {}
            }
          }
        }
        Err(e) => warn!(
          %parsed_entity_id,
          error = %e,
          "failed to create entity from accepted candidate, \
           leaving its decisions pending"
        ),
      }
    }
  }

  debug!(
    %version_id,
    applied = outcome.applied,
    rejected = outcome.rejected,
    overridden = outcome.overridden,
    "applied pending decisions"
  );
  Ok(outcome)
}

/// Read-check-advance for one decision against a matched entity, retried on
/// version conflicts.
async fn apply_to_existing<S>(
  store: &S,
  decision: &MergeDecision,
) -> Result<()>
where
  S: ProfileStore,
  S::Error: Into<Error>,
{
  let logical_id = decision
    .profile_entity_id
    .ok_or_else(|| Error::Validation(
      "decision has no matched profile entity".to_string(),
    ))?;
  let confirmed = decision.confirmed_value.clone().ok_or_else(|| {
    Error::Validation("decision carries no confirmed value".to_string())
  })?;

  let source = match decision.decision {
    DecisionType::Accept => {
      Some((EntitySource::AiExtraction, decision.confidence))
    }
    DecisionType::Override => Some((EntitySource::UserManual, None)),
    DecisionType::Reject => {
      return Err(Error::Validation(
        "rejects do not write entity versions".to_string(),
      ));
    }
  };

  let mut updates = FieldUpdates::new();
  updates.insert(decision.field_name.clone(), confirmed);

  let mut attempt = 0;
  loop {
    attempt += 1;

    let active = store
      .get_active(decision.entity_type, logical_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::EntityNotFound {
        entity_type: decision.entity_type,
        logical_id,
      })?;

    let result = store
      .advance_entity(
        decision.entity_type,
        logical_id,
        active.version,
        updates.clone(),
        source,
        Some(decision.key()),
      )
      .await
      .map_err(Into::into);

    match result {
      Ok(_) => return Ok(()),
      Err(e @ Error::Conflict { .. }) => {
        if attempt >= MAX_CONFLICT_ATTEMPTS {
          return Err(e);
        }
        debug!(
          %logical_id,
          attempt,
          "version moved underneath decision, retrying"
        );
      }
      Err(e) => return Err(e),
    }
  }
}

async fn load_candidates<S>(
  store: &S,
  version_id: Uuid,
) -> Result<(Uuid, BTreeMap<Uuid, CandidateEntity>)>
where
  S: ProfileStore,
  S::Error: Into<Error>,
{
  let (owner_id, batch) = store
    .list_candidates(version_id)
    .await
    .map_err(Into::into)?
    .ok_or_else(|| {
      Error::Validation(format!(
        "no candidates ingested for resume version {version_id}"
      ))
    })?;
  let by_id = batch
    .into_iter()
    .map(|c| (c.parsed_entity_id, c))
    .collect();
  Ok((owner_id, by_id))
}

/// One unmatched candidate's accepted decisions become one v1 entity: the
/// extracted fields, overlaid with each decision's confirmed value, with
/// rejected fields cleared. The entity insert and the group's ledger updates
/// commit in one transaction.
async fn create_from_group<S>(
  store: &S,
  candidates: &(Uuid, BTreeMap<Uuid, CandidateEntity>),
  parsed_entity_id: Uuid,
  group: &[MergeDecision],
  rejected_fields: &[String],
) -> Result<()>
where
  S: ProfileStore,
  S::Error: Into<Error>,
{
  let (owner_id, by_id) = candidates;
  let candidate = by_id.get(&parsed_entity_id).ok_or_else(|| {
    Error::Validation(format!(
      "decisions reference unknown candidate {parsed_entity_id}"
    ))
  })?;

  let mut fields = candidate.fields.clone();
  for name in rejected_fields {
    fields.insert(name.clone(), Value::Null);
  }
  for decision in group {
    if let Some(confirmed) = decision.confirmed_value.clone() {
      fields.insert(decision.field_name.clone(), confirmed);
    }
  }

  // `from_parts` deserialises with serde's lenient unknown-key handling, so
  // a decision naming a field the type does not have would otherwise vanish
  // while its ledger row gets marked applied. Refuse instead.
  let known = candidate.entity_type.field_names();
  if let Some(bad) = fields.keys().find(|k| !known.contains(&k.as_str())) {
    return Err(Error::UnknownField {
      entity_type: candidate.entity_type,
      field:       bad.clone(),
    });
  }

  let payload =
    EntityPayload::from_parts(candidate.entity_type, Value::Object(fields))?;
  let input =
    NewEntity::extracted(*owner_id, payload, candidate.confidence);
  let keys = group.iter().map(MergeDecision::key).collect();

  store
    .create_entity_with_decisions(input, keys)
    .await
    .map_err(Into::into)?;
  Ok(())
}

// ─── apply_all_new ───────────────────────────────────────────────────────────

/// Fast path for the no-conflict review: when every classified item is `new`,
/// confirm the whole batch at once without recording per-field decisions.
///
/// Errors with a validation failure if any item is equivalent or conflicting
/// — those require explicit review. Returns the number of entities written
/// (created, or advanced where new fields extend a matched entity).
pub async fn apply_all_new<S, M>(
  store: &S,
  matcher: &M,
  version_id: Uuid,
) -> Result<u32>
where
  S: ProfileStore,
  S::Error: Into<Error>,
  M: MatchLookup,
{
  let items = list_review_items(store, matcher, version_id).await?;

  if items.iter().any(|i| i.diff_type != DiffType::New) {
    return Err(Error::Validation(
      "resume version has equivalent or conflicting items; \
       field-level review is required"
        .to_string(),
    ));
  }

  let mut unmatched: BTreeMap<Uuid, Vec<&DiffItem>> = BTreeMap::new();
  let mut extensions: BTreeMap<Uuid, Vec<&DiffItem>> = BTreeMap::new();
  for item in &items {
    match item.profile_entity_id {
      None => unmatched.entry(item.parsed_entity_id).or_default().push(item),
      Some(logical_id) => {
        extensions.entry(logical_id).or_default().push(item);
      }
    }
  }

  let mut written: u32 = 0;

  if !unmatched.is_empty() {
    let (owner_id, by_id) = load_candidates(store, version_id).await?;
    for parsed_entity_id in unmatched.keys() {
      let candidate = by_id.get(parsed_entity_id).ok_or_else(|| {
        Error::Validation(format!(
          "classified items reference unknown candidate {parsed_entity_id}"
        ))
      })?;
      let payload = EntityPayload::from_parts(
        candidate.entity_type,
        Value::Object(candidate.fields.clone()),
      )?;
      store
        .create_entity(NewEntity::extracted(
          owner_id,
          payload,
          candidate.confidence,
        ))
        .await
        .map_err(Into::into)?;
      written += 1;
    }
  }

  // New fields on matched entities fill previously unset slots; the usual
  // compare-and-advance still guards against concurrent edits.
  for (logical_id, group) in &extensions {
    let entity_type = group[0].entity_type;
    let confidence = group[0].confidence;
    let updates: FieldUpdates = group
      .iter()
      .map(|i| (i.field_name.clone(), i.parsed_value.clone()))
      .collect();
    advance_with_retry(
      store,
      entity_type,
      *logical_id,
      updates,
      Some((EntitySource::AiExtraction, confidence)),
    )
    .await?;
    written += 1;
  }

  debug!(%version_id, written, "confirmed all-new resume version");
  Ok(written)
}

async fn advance_with_retry<S>(
  store: &S,
  entity_type: vitae_core::entity::EntityType,
  logical_id: Uuid,
  updates: Map<String, Value>,
  source: Option<(EntitySource, Option<f64>)>,
) -> Result<()>
where
  S: ProfileStore,
  S::Error: Into<Error>,
{
  let mut attempt = 0;
  loop {
    attempt += 1;

    let active = store
      .get_active(entity_type, logical_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::EntityNotFound { entity_type, logical_id })?;

    match store
      .advance_entity(
        entity_type,
        logical_id,
        active.version,
        updates.clone(),
        source,
        None,
      )
      .await
      .map_err(Into::into)
    {
      Ok(_) => return Ok(()),
      Err(e @ Error::Conflict { .. }) if attempt < MAX_CONFLICT_ATTEMPTS => {
        debug!(%logical_id, attempt, error = %e, "retrying advance");
      }
      Err(e) => return Err(e),
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use vitae_core::{
    entity::{
      EntityType, SkillValue, VersionedEntity, WorkExperienceValue,
    },
    review::{DecisionKey, NewDecision},
  };
  use vitae_store_sqlite::SqliteStore;

  use super::*;
  use crate::matcher::KeyFieldMatcher;

  async fn store() -> SqliteStore {
    SqliteStore::open_in_memory().await.unwrap()
  }

  fn work_payload(title: &str, company: &str) -> EntityPayload {
    EntityPayload::WorkExperience(WorkExperienceValue {
      title:       title.into(),
      company:     company.into(),
      location:    None,
      start_date:  None,
      end_date:    None,
      description: None,
    })
  }

  fn decision(
    version_id: Uuid,
    parsed_entity_id: Uuid,
    field_name: &str,
    profile_entity_id: Option<Uuid>,
    kind: DecisionType,
    parsed_value: Value,
    override_value: Option<Value>,
  ) -> NewDecision {
    NewDecision {
      version_id,
      parsed_entity_id,
      field_name: field_name.into(),
      entity_type: EntityType::WorkExperience,
      profile_entity_id,
      decision: kind,
      parsed_value,
      override_value,
      justification: None,
      confidence: Some(0.9),
    }
  }

  fn candidate(
    parsed_entity_id: Uuid,
    pairs: &[(&str, Value)],
  ) -> CandidateEntity {
    CandidateEntity {
      parsed_entity_id,
      entity_type: EntityType::WorkExperience,
      fields: pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect(),
      confidence: Some(0.8),
    }
  }

  #[tokio::test]
  async fn reject_marks_applied_without_touching_the_entity() {
    let store = store().await;
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let entity = store
      .create_entity(NewEntity::manual(owner, work_payload("Eng", "Acme")))
      .await
      .unwrap();

    store
      .record_decision(decision(
        version_id,
        Uuid::new_v4(),
        "title",
        Some(entity.logical_id),
        DecisionType::Reject,
        "Senior Eng".into(),
        None,
      ))
      .await
      .unwrap();

    let outcome = apply_all(&store, version_id).await.unwrap();
    assert_eq!(outcome, ApplyOutcome { applied: 0, rejected: 1, overridden: 0 });

    let active = store
      .get_active(EntityType::WorkExperience, entity.logical_id)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(active.version, 1);
    assert_eq!(active.payload.field("title").unwrap(), Some("Eng".into()));
    assert!(
      store
        .list_pending_decisions(version_id)
        .await
        .unwrap()
        .is_empty()
    );
  }

  #[tokio::test]
  async fn accept_advances_the_matched_entity_with_extraction_source() {
    let store = store().await;
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let entity = store
      .create_entity(NewEntity::manual(owner, work_payload("Eng", "Acme")))
      .await
      .unwrap();

    store
      .record_decision(decision(
        version_id,
        Uuid::new_v4(),
        "title",
        Some(entity.logical_id),
        DecisionType::Accept,
        "Senior Eng".into(),
        None,
      ))
      .await
      .unwrap();

    let outcome = apply_all(&store, version_id).await.unwrap();
    assert_eq!(outcome.applied, 1);

    let active = store
      .get_active(EntityType::WorkExperience, entity.logical_id)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(active.version, 2);
    assert_eq!(
      active.payload.field("title").unwrap(),
      Some("Senior Eng".into())
    );
    assert_eq!(active.source, EntitySource::AiExtraction);
    assert_eq!(active.source_confidence, Some(0.9));
  }

  #[tokio::test]
  async fn override_writes_the_replacement_with_manual_source() {
    let store = store().await;
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let entity = store
      .create_entity(NewEntity::manual(owner, work_payload("Eng", "Acme")))
      .await
      .unwrap();

    store
      .record_decision(decision(
        version_id,
        Uuid::new_v4(),
        "title",
        Some(entity.logical_id),
        DecisionType::Override,
        "Senior Eng".into(),
        Some("Staff Eng".into()),
      ))
      .await
      .unwrap();

    let outcome = apply_all(&store, version_id).await.unwrap();
    assert_eq!(outcome.overridden, 1);

    let active = store
      .get_active(EntityType::WorkExperience, entity.logical_id)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(
      active.payload.field("title").unwrap(),
      Some("Staff Eng".into())
    );
    assert_eq!(active.source, EntitySource::UserManual);
    assert_eq!(active.source_confidence, None);
  }

  #[tokio::test]
  async fn accepted_candidate_group_becomes_one_entity() {
    let store = store().await;
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let parsed = Uuid::new_v4();

    store
      .ingest_candidates(
        version_id,
        owner,
        vec![candidate(
          parsed,
          &[
            ("title", "Engineer".into()),
            ("company", "Acme".into()),
            ("location", "Berlin".into()),
          ],
        )],
      )
      .await
      .unwrap();

    // Two accepts and one reject on the same candidate: one entity, the
    // rejected field left unset.
    for d in [
      decision(version_id, parsed, "title", None, DecisionType::Accept,
        "Engineer".into(), None),
      decision(version_id, parsed, "company", None, DecisionType::Accept,
        "Acme".into(), None),
      decision(version_id, parsed, "location", None, DecisionType::Reject,
        "Berlin".into(), None),
    ] {
      store.record_decision(d).await.unwrap();
    }

    let outcome = apply_all(&store, version_id).await.unwrap();
    assert_eq!(outcome, ApplyOutcome { applied: 2, rejected: 1, overridden: 0 });

    let active = store.list_active(owner, None).await.unwrap();
    assert_eq!(active.len(), 1);
    let entity = &active[0];
    assert_eq!(entity.version, 1);
    assert_eq!(entity.source, EntitySource::AiExtraction);
    assert_eq!(entity.payload.field("title").unwrap(), Some("Engineer".into()));
    assert_eq!(entity.payload.field("location").unwrap(), None);

    assert!(
      store
        .list_pending_decisions(version_id)
        .await
        .unwrap()
        .is_empty()
    );
  }

  #[tokio::test]
  async fn one_failing_decision_leaves_the_rest_applied() {
    let store = store().await;
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let entity = store
      .create_entity(NewEntity::manual(owner, work_payload("Eng", "Acme")))
      .await
      .unwrap();

    let good_fields = ["title", "company", "location", "description"];
    for field in good_fields {
      store
        .record_decision(decision(
          version_id,
          Uuid::new_v4(),
          field,
          Some(entity.logical_id),
          DecisionType::Accept,
          format!("new {field}").into(),
          None,
        ))
        .await
        .unwrap();
    }
    // Points at a logical id that does not exist; application fails and the
    // row stays pending.
    let bad_parsed = Uuid::new_v4();
    store
      .record_decision(decision(
        version_id,
        bad_parsed,
        "title",
        Some(Uuid::new_v4()),
        DecisionType::Accept,
        "ghost".into(),
        None,
      ))
      .await
      .unwrap();

    let outcome = apply_all(&store, version_id).await.unwrap();
    assert_eq!(outcome.applied, 4);

    let pending = store.list_pending_decisions(version_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].parsed_entity_id, bad_parsed);

    // The four good decisions each advanced the entity once.
    let active = store
      .get_active(EntityType::WorkExperience, entity.logical_id)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(active.version, 5);
  }

  #[tokio::test]
  async fn reapplying_is_a_no_op() {
    let store = store().await;
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let entity = store
      .create_entity(NewEntity::manual(owner, work_payload("Eng", "Acme")))
      .await
      .unwrap();

    store
      .record_decision(decision(
        version_id,
        Uuid::new_v4(),
        "title",
        Some(entity.logical_id),
        DecisionType::Accept,
        "Senior Eng".into(),
        None,
      ))
      .await
      .unwrap();

    apply_all(&store, version_id).await.unwrap();
    let second = apply_all(&store, version_id).await.unwrap();
    assert_eq!(second, ApplyOutcome::default());

    let history = store.get_history(entity.logical_id).await.unwrap();
    assert_eq!(history.len(), 2);
  }

  #[tokio::test]
  async fn apply_all_new_confirms_a_fresh_profile() {
    let store = store().await;
    let matcher = KeyFieldMatcher::new(std::sync::Arc::new(store.clone()));
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();

    store
      .ingest_candidates(
        version_id,
        owner,
        vec![
          candidate(
            Uuid::new_v4(),
            &[("title", "Engineer".into()), ("company", "Acme".into())],
          ),
          CandidateEntity {
            parsed_entity_id: Uuid::new_v4(),
            entity_type:      EntityType::Skill,
            fields: [("name".to_string(), Value::from("Rust"))]
              .into_iter()
              .collect(),
            confidence: Some(0.95),
          },
        ],
      )
      .await
      .unwrap();

    let created = apply_all_new(&store, &matcher, version_id)
      .await
      .unwrap();
    assert_eq!(created, 2);

    let active = store.list_active(owner, None).await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|e| e.source == EntitySource::AiExtraction));

    let skills = store
      .list_active(owner, Some(EntityType::Skill))
      .await
      .unwrap();
    assert_eq!(
      skills[0].payload,
      EntityPayload::Skill(SkillValue { name: "Rust".into(), level: None })
    );
  }

  #[tokio::test]
  async fn apply_all_new_fills_unset_fields_on_matched_entities() {
    let store = store().await;
    let matcher = KeyFieldMatcher::new(std::sync::Arc::new(store.clone()));
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let entity = store
      .create_entity(NewEntity::manual(owner, work_payload("Engineer", "Acme")))
      .await
      .unwrap();

    store
      .ingest_candidates(
        version_id,
        owner,
        vec![candidate(
          Uuid::new_v4(),
          &[
            ("title", "Engineer".into()),
            ("company", "Acme".into()),
            ("location", "Berlin".into()),
          ],
        )],
      )
      .await
      .unwrap();

    let written = apply_all_new(&store, &matcher, version_id)
      .await
      .unwrap();
    assert_eq!(written, 1);

    let active = store
      .get_active(EntityType::WorkExperience, entity.logical_id)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(active.version, 2);
    assert_eq!(
      active.payload.field("location").unwrap(),
      Some("Berlin".into())
    );
  }

  #[tokio::test]
  async fn apply_all_new_refuses_conflicting_batches() {
    let store = store().await;
    let matcher = KeyFieldMatcher::new(std::sync::Arc::new(store.clone()));
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let entity = store
      .create_entity(NewEntity::manual(owner, work_payload("Engineer", "Acme")))
      .await
      .unwrap();

    store
      .ingest_candidates(
        version_id,
        owner,
        vec![candidate(
          Uuid::new_v4(),
          &[("title", "Senior Engineer".into()), ("company", "Acme".into())],
        )],
      )
      .await
      .unwrap();

    let err = apply_all_new(&store, &matcher, version_id)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Nothing written.
    let active = store
      .get_active(EntityType::WorkExperience, entity.logical_id)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(active.version, 1);
  }

  #[tokio::test]
  async fn unknown_decision_key_surfaces_through_advance() {
    let store = store().await;
    let owner = Uuid::new_v4();
    let entity = store
      .create_entity(NewEntity::manual(owner, work_payload("Eng", "Acme")))
      .await
      .unwrap();

    let mut updates = FieldUpdates::new();
    updates.insert("title".into(), "Senior Eng".into());
    let err = store
      .advance_entity(
        EntityType::WorkExperience,
        entity.logical_id,
        entity.version,
        updates,
        None,
        Some(DecisionKey {
          version_id:       Uuid::new_v4(),
          parsed_entity_id: Uuid::new_v4(),
          field_name:       "title".into(),
        }),
      )
      .await;
    assert!(err.is_err());
  }

  #[tokio::test]
  async fn decision_naming_a_bogus_field_stays_pending() {
    let store = store().await;
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let parsed = Uuid::new_v4();

    store
      .ingest_candidates(
        version_id,
        owner,
        vec![candidate(
          parsed,
          &[("title", "Engineer".into()), ("company", "Acme".into())],
        )],
      )
      .await
      .unwrap();

    // The second decision names a field work experiences do not have. The
    // whole group must fail loudly rather than silently dropping the value
    // while counting the decisions as applied.
    for d in [
      decision(version_id, parsed, "title", None, DecisionType::Accept,
        "Engineer".into(), None),
      decision(version_id, parsed, "salarie", None, DecisionType::Accept,
        "100k".into(), None),
    ] {
      store.record_decision(d).await.unwrap();
    }

    let outcome = apply_all(&store, version_id).await.unwrap();
    assert_eq!(outcome, ApplyOutcome::default());

    assert!(store.list_active(owner, None).await.unwrap().is_empty());
    let pending = store.list_pending_decisions(version_id).await.unwrap();
    assert_eq!(pending.len(), 2);
  }

  #[tokio::test]
  async fn missing_candidate_batch_leaves_new_decisions_pending() {
    let store = store().await;
    let version_id = Uuid::new_v4();
    let parsed = Uuid::new_v4();

    // No candidates were ever ingested for this version. The reject must
    // still be counted and the accept left pending, not the whole call
    // aborted.
    for d in [
      decision(version_id, parsed, "location", None, DecisionType::Reject,
        "Berlin".into(), None),
      decision(version_id, parsed, "title", None, DecisionType::Accept,
        "Engineer".into(), None),
    ] {
      store.record_decision(d).await.unwrap();
    }

    let outcome = apply_all(&store, version_id).await.unwrap();
    assert_eq!(outcome, ApplyOutcome { applied: 0, rejected: 1, overridden: 0 });

    let pending = store.list_pending_decisions(version_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].field_name, "title");

    // Re-running is still a clean partial success.
    let second = apply_all(&store, version_id).await.unwrap();
    assert_eq!(second, ApplyOutcome::default());
  }

  /// Delegates to a real store but refuses every ledger mark, simulating a
  /// decisions table that keeps failing to update.
  struct StuckLedgerStore {
    inner: SqliteStore,
  }

  impl ProfileStore for StuckLedgerStore {
    type Error = vitae_store_sqlite::Error;

    async fn create_entity(
      &self,
      input: NewEntity,
    ) -> Result<VersionedEntity, Self::Error> {
      self.inner.create_entity(input).await
    }

    async fn create_entity_with_decisions(
      &self,
      input: NewEntity,
      decisions: Vec<DecisionKey>,
    ) -> Result<VersionedEntity, Self::Error> {
      self.inner.create_entity_with_decisions(input, decisions).await
    }

    async fn get_active(
      &self,
      entity_type: EntityType,
      logical_id: Uuid,
    ) -> Result<Option<VersionedEntity>, Self::Error> {
      self.inner.get_active(entity_type, logical_id).await
    }

    async fn get_history(
      &self,
      logical_id: Uuid,
    ) -> Result<Vec<VersionedEntity>, Self::Error> {
      self.inner.get_history(logical_id).await
    }

    async fn list_active(
      &self,
      owner_id: Uuid,
      entity_type: Option<EntityType>,
    ) -> Result<Vec<VersionedEntity>, Self::Error> {
      self.inner.list_active(owner_id, entity_type).await
    }

    async fn advance_entity(
      &self,
      entity_type: EntityType,
      logical_id: Uuid,
      expected_version: i64,
      updates: FieldUpdates,
      source: Option<(EntitySource, Option<f64>)>,
      decision: Option<DecisionKey>,
    ) -> Result<VersionedEntity, Self::Error> {
      self
        .inner
        .advance_entity(
          entity_type,
          logical_id,
          expected_version,
          updates,
          source,
          decision,
        )
        .await
    }

    async fn ingest_candidates(
      &self,
      version_id: Uuid,
      owner_id: Uuid,
      candidates: Vec<CandidateEntity>,
    ) -> Result<(), Self::Error> {
      self.inner.ingest_candidates(version_id, owner_id, candidates).await
    }

    async fn list_candidates(
      &self,
      version_id: Uuid,
    ) -> Result<Option<(Uuid, Vec<CandidateEntity>)>, Self::Error> {
      self.inner.list_candidates(version_id).await
    }

    async fn record_decision(
      &self,
      input: NewDecision,
    ) -> Result<MergeDecision, Self::Error> {
      self.inner.record_decision(input).await
    }

    async fn list_decisions(
      &self,
      version_id: Uuid,
    ) -> Result<Vec<MergeDecision>, Self::Error> {
      self.inner.list_decisions(version_id).await
    }

    async fn list_pending_decisions(
      &self,
      version_id: Uuid,
    ) -> Result<Vec<MergeDecision>, Self::Error> {
      self.inner.list_pending_decisions(version_id).await
    }

    async fn get_decision(
      &self,
      key: DecisionKey,
    ) -> Result<Option<MergeDecision>, Self::Error> {
      self.inner.get_decision(key).await
    }

    async fn mark_decision_applied(
      &self,
      key: DecisionKey,
    ) -> Result<(), Self::Error> {
      Err(vitae_store_sqlite::Error::DecisionNotFound(key))
    }
  }

  #[tokio::test]
  async fn uncommitted_reject_does_not_clear_the_field() {
    let inner = store().await;
    let store = StuckLedgerStore { inner: inner.clone() };
    let owner = Uuid::new_v4();
    let version_id = Uuid::new_v4();
    let parsed = Uuid::new_v4();

    inner
      .ingest_candidates(
        version_id,
        owner,
        vec![candidate(
          parsed,
          &[
            ("title", "Engineer".into()),
            ("company", "Acme".into()),
            ("location", "Berlin".into()),
          ],
        )],
      )
      .await
      .unwrap();

    for d in [
      decision(version_id, parsed, "title", None, DecisionType::Accept,
        "Engineer".into(), None),
      decision(version_id, parsed, "company", None, DecisionType::Accept,
        "Acme".into(), None),
      decision(version_id, parsed, "location", None, DecisionType::Reject,
        "Berlin".into(), None),
    ] {
      inner.record_decision(d).await.unwrap();
    }

    // The reject's ledger mark fails, so it stays pending and is not
    // counted. The entity built from the accepts must keep the extracted
    // location rather than treating the reject as already committed.
    let outcome = apply_all(&store, version_id).await.unwrap();
    assert_eq!(outcome, ApplyOutcome { applied: 2, rejected: 0, overridden: 0 });

    let active = inner.list_active(owner, None).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(
      active[0].payload.field("location").unwrap(),
      Some("Berlin".into())
    );

    let pending = inner.list_pending_decisions(version_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].field_name, "location");
  }
}
