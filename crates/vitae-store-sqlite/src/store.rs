//! [`SqliteStore`] — the SQLite implementation of [`ProfileStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use vitae_core::{
  entity::{EntitySource, EntityType, NewEntity, VersionedEntity},
  review::{CandidateEntity, DecisionKey, MergeDecision, NewDecision},
  store::{FieldUpdates, ProfileStore},
};

use crate::{
  Error, Result,
  encode::{
    RawCandidate, RawDecision, RawEntity, encode_decision_type, encode_dt,
    encode_entity_type, encode_source, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vitae profile store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// What happened inside the compare-and-advance transaction. Domain outcomes
/// are carried out of the connection closure and mapped to errors by the
/// caller, which still holds the typed ids.
enum AdvanceOutcome {
  Done(RawEntity),
  NotFound,
  Conflict { actual: i64 },
  Invalid(vitae_core::Error),
  MissingDecision,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert a fully-built version-1 entity row and mark the given ledger
  /// rows applied, all in one transaction. `decisions` may be empty.
  async fn insert_entity(
    &self,
    entity: &VersionedEntity,
    decisions: Vec<DecisionKey>,
  ) -> Result<()> {
    let logical_id_str = encode_uuid(entity.logical_id);
    let version = entity.version;
    let owner_id_str = encode_uuid(entity.owner_id);
    let entity_type_str = encode_entity_type(entity.payload.entity_type());
    let payload_json = entity.payload.to_json()?.to_string();
    let source_str = encode_source(entity.source).to_owned();
    let confidence = entity.source_confidence;
    let recorded_at_str = encode_dt(entity.recorded_at);

    let decision_params: Vec<(String, String, String)> = decisions
      .iter()
      .map(|k| {
        (
          encode_uuid(k.version_id),
          encode_uuid(k.parsed_entity_id),
          k.field_name.clone(),
        )
      })
      .collect();

    let missing: Option<usize> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO entities (
             logical_id, version, owner_id, entity_type, payload_json,
             source, source_confidence, is_active, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
          rusqlite::params![
            logical_id_str,
            version,
            owner_id_str,
            entity_type_str,
            payload_json,
            source_str,
            confidence,
            recorded_at_str,
          ],
        )?;

        for (idx, (vid, pid, field)) in decision_params.iter().enumerate() {
          let n = tx.execute(
            "UPDATE decisions SET applied = 1
             WHERE version_id = ?1 AND parsed_entity_id = ?2
               AND field_name = ?3",
            rusqlite::params![vid, pid, field],
          )?;
          if n == 0 {
            // Dropping the transaction rolls the insert back.
            return Ok(Some(idx));
          }
        }

        tx.commit()?;
        Ok(None)
      })
      .await?;

    if let Some(idx) = missing {
      return Err(Error::DecisionNotFound(decisions[idx].clone()));
    }
    Ok(())
  }

  async fn create_entity_inner(
    &self,
    input: NewEntity,
    decisions: Vec<DecisionKey>,
  ) -> Result<VersionedEntity> {
    input.validate()?;

    let entity = VersionedEntity {
      logical_id:        Uuid::new_v4(),
      version:           1,
      is_active:         true,
      owner_id:          input.owner_id,
      source:            input.source,
      source_confidence: input.source_confidence,
      payload:           input.payload,
      recorded_at:       Utc::now(),
    };

    self.insert_entity(&entity, decisions).await?;
    Ok(entity)
  }
}

// ─── ProfileStore impl ───────────────────────────────────────────────────────

impl ProfileStore for SqliteStore {
  type Error = Error;

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn create_entity(&self, input: NewEntity) -> Result<VersionedEntity> {
    self.create_entity_inner(input, Vec::new()).await
  }

  async fn create_entity_with_decisions(
    &self,
    input: NewEntity,
    decisions: Vec<DecisionKey>,
  ) -> Result<VersionedEntity> {
    self.create_entity_inner(input, decisions).await
  }

  async fn get_active(
    &self,
    entity_type: EntityType,
    logical_id: Uuid,
  ) -> Result<Option<VersionedEntity>> {
    let id_str = encode_uuid(logical_id);
    let type_str = encode_entity_type(entity_type);

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT logical_id, version, owner_id, entity_type,
                      payload_json, source, source_confidence, is_active,
                      recorded_at
               FROM entities
               WHERE logical_id = ?1 AND entity_type = ?2 AND is_active = 1",
              rusqlite::params![id_str, type_str],
              entity_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn get_history(
    &self,
    logical_id: Uuid,
  ) -> Result<Vec<VersionedEntity>> {
    let id_str = encode_uuid(logical_id);

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT logical_id, version, owner_id, entity_type, payload_json,
                  source, source_confidence, is_active, recorded_at
           FROM entities
           WHERE logical_id = ?1
           ORDER BY version ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], entity_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn list_active(
    &self,
    owner_id: Uuid,
    entity_type: Option<EntityType>,
  ) -> Result<Vec<VersionedEntity>> {
    let owner_str = encode_uuid(owner_id);
    let type_str = entity_type.map(encode_entity_type);

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(t) = type_str {
          let mut stmt = conn.prepare(
            "SELECT logical_id, version, owner_id, entity_type, payload_json,
                    source, source_confidence, is_active, recorded_at
             FROM entities
             WHERE owner_id = ?1 AND entity_type = ?2 AND is_active = 1
             ORDER BY recorded_at, logical_id",
          )?;
          stmt
            .query_map(rusqlite::params![owner_str, t], entity_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(
            "SELECT logical_id, version, owner_id, entity_type, payload_json,
                    source, source_confidence, is_active, recorded_at
             FROM entities
             WHERE owner_id = ?1 AND is_active = 1
             ORDER BY recorded_at, logical_id",
          )?;
          stmt
            .query_map(rusqlite::params![owner_str], entity_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn advance_entity(
    &self,
    entity_type: EntityType,
    logical_id: Uuid,
    expected_version: i64,
    updates: FieldUpdates,
    source: Option<(EntitySource, Option<f64>)>,
    decision: Option<DecisionKey>,
  ) -> Result<VersionedEntity> {
    let id_str = encode_uuid(logical_id);
    let type_str = encode_entity_type(entity_type);
    let now_str = encode_dt(Utc::now());
    let decision_params = decision.as_ref().map(|k| {
      (
        encode_uuid(k.version_id),
        encode_uuid(k.parsed_entity_id),
        k.field_name.clone(),
      )
    });

    let outcome: AdvanceOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let row: Option<(i64, String, String, String, Option<f64>)> = tx
          .query_row(
            "SELECT version, owner_id, payload_json, source,
                    source_confidence
             FROM entities
             WHERE logical_id = ?1 AND entity_type = ?2 AND is_active = 1",
            rusqlite::params![id_str, type_str],
            |r| {
              Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
            },
          )
          .optional()?;

        let Some((version, owner_id, payload_json, prior_source, prior_conf)) =
          row
        else {
          return Ok(AdvanceOutcome::NotFound);
        };

        if version != expected_version {
          return Ok(AdvanceOutcome::Conflict { actual: version });
        }

        // Merge the updates over the prior payload. Validation failures
        // (unknown field, type mismatch) are domain errors, not database
        // errors; carry them out of the closure.
        let merged = serde_json::from_str(&payload_json)
          .map_err(vitae_core::Error::from)
          .and_then(|v| {
            vitae_core::entity::EntityPayload::from_parts(entity_type, v)
          })
          .and_then(|p| p.merged(&updates))
          .and_then(|p| Ok(p.to_json()?.to_string()));
        let new_payload_json = match merged {
          Ok(j) => j,
          Err(e) => return Ok(AdvanceOutcome::Invalid(e)),
        };

        let (new_source, new_conf) = match source {
          Some((s, c)) => (encode_source(s).to_owned(), c),
          None => (prior_source, prior_conf),
        };

        // Deactivate first so the partial unique index never sees two
        // active rows for the same logical id.
        tx.execute(
          "UPDATE entities SET is_active = 0
           WHERE logical_id = ?1 AND version = ?2",
          rusqlite::params![id_str, version],
        )?;
        tx.execute(
          "INSERT INTO entities (
             logical_id, version, owner_id, entity_type, payload_json,
             source, source_confidence, is_active, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
          rusqlite::params![
            id_str,
            version + 1,
            owner_id,
            type_str,
            new_payload_json,
            new_source,
            new_conf,
            now_str,
          ],
        )?;

        if let Some((vid, pid, field)) = &decision_params {
          let n = tx.execute(
            "UPDATE decisions SET applied = 1
             WHERE version_id = ?1 AND parsed_entity_id = ?2
               AND field_name = ?3",
            rusqlite::params![vid, pid, field],
          )?;
          if n == 0 {
            // Dropping the transaction rolls the advance back.
            return Ok(AdvanceOutcome::MissingDecision);
          }
        }

        tx.commit()?;

        Ok(AdvanceOutcome::Done(RawEntity {
          logical_id: id_str,
          version: version + 1,
          owner_id,
          entity_type: type_str,
          payload_json: new_payload_json,
          source: new_source,
          source_confidence: new_conf,
          is_active: true,
          recorded_at: now_str,
        }))
      })
      .await?;

    match outcome {
      AdvanceOutcome::Done(raw) => raw.into_entity(),
      AdvanceOutcome::NotFound => Err(Error::Core(
        vitae_core::Error::EntityNotFound { entity_type, logical_id },
      )),
      AdvanceOutcome::Conflict { actual } => {
        Err(Error::Core(vitae_core::Error::Conflict {
          entity_type,
          logical_id,
          expected: expected_version,
          actual,
        }))
      }
      AdvanceOutcome::Invalid(e) => Err(Error::Core(e)),
      AdvanceOutcome::MissingDecision => {
        let key = decision.unwrap_or(DecisionKey {
          version_id:       Uuid::nil(),
          parsed_entity_id: Uuid::nil(),
          field_name:       String::new(),
        });
        Err(Error::DecisionNotFound(key))
      }
    }
  }

  // ── Candidates ────────────────────────────────────────────────────────────

  async fn ingest_candidates(
    &self,
    version_id: Uuid,
    owner_id: Uuid,
    candidates: Vec<CandidateEntity>,
  ) -> Result<()> {
    for c in &candidates {
      c.validate().map_err(Error::Core)?;
    }

    let version_str = encode_uuid(version_id);
    let owner_str = encode_uuid(owner_id);
    let now_str = encode_dt(Utc::now());
    let rows: Vec<(String, String, String, Option<f64>)> = candidates
      .iter()
      .map(|c| {
        Ok((
          encode_uuid(c.parsed_entity_id),
          encode_entity_type(c.entity_type),
          serde_json::to_string(&c.fields)?,
          c.confidence,
        ))
      })
      .collect::<Result<_>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM candidates WHERE version_id = ?1",
          rusqlite::params![version_str],
        )?;
        for (pid, entity_type, fields_json, confidence) in &rows {
          tx.execute(
            "INSERT INTO candidates (
               version_id, parsed_entity_id, owner_id, entity_type,
               fields_json, confidence, ingested_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
              version_str,
              pid,
              owner_str,
              entity_type,
              fields_json,
              confidence,
              now_str,
            ],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_candidates(
    &self,
    version_id: Uuid,
  ) -> Result<Option<(Uuid, Vec<CandidateEntity>)>> {
    let version_str = encode_uuid(version_id);

    let raws: Vec<RawCandidate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT parsed_entity_id, owner_id, entity_type, fields_json,
                  confidence
           FROM candidates
           WHERE version_id = ?1
           ORDER BY ingested_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str], |r| {
            Ok(RawCandidate {
              parsed_entity_id: r.get(0)?,
              owner_id:         r.get(1)?,
              entity_type:      r.get(2)?,
              fields_json:      r.get(3)?,
              confidence:       r.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut owner = None;
    let mut candidates = Vec::with_capacity(raws.len());
    for raw in raws {
      let (row_owner, candidate) = raw.into_candidate()?;
      owner.get_or_insert(row_owner);
      candidates.push(candidate);
    }
    Ok(owner.map(|o| (o, candidates)))
  }

  // ── Merge decision ledger ─────────────────────────────────────────────────

  async fn record_decision(
    &self,
    input: NewDecision,
  ) -> Result<MergeDecision> {
    input.validate()?;

    let recorded_at = Utc::now();
    let confirmed_value = input.confirmed_value();

    let version_str = encode_uuid(input.version_id);
    let parsed_str = encode_uuid(input.parsed_entity_id);
    let field = input.field_name.clone();
    let type_str = encode_entity_type(input.entity_type);
    let profile_str = input.profile_entity_id.map(encode_uuid);
    let decision_str = encode_decision_type(input.decision).to_owned();
    let parsed_value_json = serde_json::to_string(&input.parsed_value)?;
    let confirmed_json = confirmed_value
      .as_ref()
      .map(serde_json::to_string)
      .transpose()?;
    let justification = input.justification.clone();
    let confidence = input.confidence;
    let recorded_str = encode_dt(recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO decisions (
             version_id, parsed_entity_id, field_name, entity_type,
             profile_entity_id, decision, parsed_value_json,
             confirmed_value_json, justification, confidence, applied,
             recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11)
           ON CONFLICT (version_id, parsed_entity_id, field_name)
           DO UPDATE SET
             entity_type          = excluded.entity_type,
             profile_entity_id    = excluded.profile_entity_id,
             decision             = excluded.decision,
             parsed_value_json    = excluded.parsed_value_json,
             confirmed_value_json = excluded.confirmed_value_json,
             justification        = excluded.justification,
             confidence           = excluded.confidence,
             applied              = 0,
             recorded_at          = excluded.recorded_at",
          rusqlite::params![
            version_str,
            parsed_str,
            field,
            type_str,
            profile_str,
            decision_str,
            parsed_value_json,
            confirmed_json,
            justification,
            confidence,
            recorded_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(MergeDecision {
      version_id: input.version_id,
      parsed_entity_id: input.parsed_entity_id,
      field_name: input.field_name,
      entity_type: input.entity_type,
      profile_entity_id: input.profile_entity_id,
      decision: input.decision,
      parsed_value: input.parsed_value,
      confirmed_value,
      justification: input.justification,
      confidence: input.confidence,
      applied: false,
      recorded_at,
    })
  }

  async fn list_decisions(
    &self,
    version_id: Uuid,
  ) -> Result<Vec<MergeDecision>> {
    let version_str = encode_uuid(version_id);

    let raws: Vec<RawDecision> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT version_id, parsed_entity_id, field_name, entity_type,
                  profile_entity_id, decision, parsed_value_json,
                  confirmed_value_json, justification, confidence, applied,
                  recorded_at
           FROM decisions
           WHERE version_id = ?1
           ORDER BY recorded_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str], decision_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDecision::into_decision).collect()
  }

  async fn list_pending_decisions(
    &self,
    version_id: Uuid,
  ) -> Result<Vec<MergeDecision>> {
    let version_str = encode_uuid(version_id);

    let raws: Vec<RawDecision> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT version_id, parsed_entity_id, field_name, entity_type,
                  profile_entity_id, decision, parsed_value_json,
                  confirmed_value_json, justification, confidence, applied,
                  recorded_at
           FROM decisions
           WHERE version_id = ?1 AND applied = 0
           ORDER BY recorded_at, rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str], decision_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDecision::into_decision).collect()
  }

  async fn get_decision(
    &self,
    key: DecisionKey,
  ) -> Result<Option<MergeDecision>> {
    let version_str = encode_uuid(key.version_id);
    let parsed_str = encode_uuid(key.parsed_entity_id);
    let field = key.field_name;

    let raw: Option<RawDecision> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT version_id, parsed_entity_id, field_name, entity_type,
                      profile_entity_id, decision, parsed_value_json,
                      confirmed_value_json, justification, confidence,
                      applied, recorded_at
               FROM decisions
               WHERE version_id = ?1 AND parsed_entity_id = ?2
                 AND field_name = ?3",
              rusqlite::params![version_str, parsed_str, field],
              decision_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDecision::into_decision).transpose()
  }

  async fn mark_decision_applied(&self, key: DecisionKey) -> Result<()> {
    let version_str = encode_uuid(key.version_id);
    let parsed_str = encode_uuid(key.parsed_entity_id);
    let field = key.field_name.clone();

    let n: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE decisions SET applied = 1
           WHERE version_id = ?1 AND parsed_entity_id = ?2
             AND field_name = ?3",
          rusqlite::params![version_str, parsed_str, field],
        )?)
      })
      .await?;

    if n == 0 {
      return Err(Error::DecisionNotFound(key));
    }
    Ok(())
  }
}

// ─── Row mappers ─────────────────────────────────────────────────────────────

fn entity_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntity> {
  Ok(RawEntity {
    logical_id:        r.get(0)?,
    version:           r.get(1)?,
    owner_id:          r.get(2)?,
    entity_type:       r.get(3)?,
    payload_json:      r.get(4)?,
    source:            r.get(5)?,
    source_confidence: r.get(6)?,
    is_active:         r.get(7)?,
    recorded_at:       r.get(8)?,
  })
}

fn decision_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawDecision> {
  Ok(RawDecision {
    version_id:           r.get(0)?,
    parsed_entity_id:     r.get(1)?,
    field_name:           r.get(2)?,
    entity_type:          r.get(3)?,
    profile_entity_id:    r.get(4)?,
    decision:             r.get(5)?,
    parsed_value_json:    r.get(6)?,
    confirmed_value_json: r.get(7)?,
    justification:        r.get(8)?,
    confidence:           r.get(9)?,
    applied:              r.get(10)?,
    recorded_at:          r.get(11)?,
  })
}
