//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Payloads, candidate fields,
//! and decision values are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use vitae_core::{
  entity::{EntityPayload, EntitySource, EntityType, VersionedEntity},
  review::{CandidateEntity, DecisionType, MergeDecision},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

// ─── EntityType ──────────────────────────────────────────────────────────────

pub fn encode_entity_type(t: EntityType) -> String { t.to_string() }

pub fn decode_entity_type(s: &str) -> Result<EntityType> {
  EntityType::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown entity type: {s:?}")))
}

// ─── EntitySource ────────────────────────────────────────────────────────────

pub fn encode_source(s: EntitySource) -> &'static str {
  match s {
    EntitySource::UserManual => "user_manual",
    EntitySource::AiExtraction => "ai_extraction",
  }
}

pub fn decode_source(s: &str) -> Result<EntitySource> {
  match s {
    "user_manual" => Ok(EntitySource::UserManual),
    "ai_extraction" => Ok(EntitySource::AiExtraction),
    other => Err(Error::Decode(format!("unknown entity source: {other:?}"))),
  }
}

// ─── DecisionType ────────────────────────────────────────────────────────────

pub fn encode_decision_type(d: DecisionType) -> &'static str {
  match d {
    DecisionType::Accept => "accept",
    DecisionType::Reject => "reject",
    DecisionType::Override => "override",
  }
}

pub fn decode_decision_type(s: &str) -> Result<DecisionType> {
  match s {
    "accept" => Ok(DecisionType::Accept),
    "reject" => Ok(DecisionType::Reject),
    "override" => Ok(DecisionType::Override),
    other => Err(Error::Decode(format!("unknown decision type: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `entities` row.
pub struct RawEntity {
  pub logical_id:        String,
  pub version:           i64,
  pub owner_id:          String,
  pub entity_type:       String,
  pub payload_json:      String,
  pub source:            String,
  pub source_confidence: Option<f64>,
  pub is_active:         bool,
  pub recorded_at:       String,
}

impl RawEntity {
  pub fn into_entity(self) -> Result<VersionedEntity> {
    let entity_type = decode_entity_type(&self.entity_type)?;
    let payload_value: Value = serde_json::from_str(&self.payload_json)?;
    let payload = EntityPayload::from_parts(entity_type, payload_value)?;

    Ok(VersionedEntity {
      logical_id: decode_uuid(&self.logical_id)?,
      version: self.version,
      is_active: self.is_active,
      owner_id: decode_uuid(&self.owner_id)?,
      source: decode_source(&self.source)?,
      source_confidence: self.source_confidence,
      payload,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `decisions` row.
pub struct RawDecision {
  pub version_id:           String,
  pub parsed_entity_id:     String,
  pub field_name:           String,
  pub entity_type:          String,
  pub profile_entity_id:    Option<String>,
  pub decision:             String,
  pub parsed_value_json:    String,
  pub confirmed_value_json: Option<String>,
  pub justification:        Option<String>,
  pub confidence:           Option<f64>,
  pub applied:              bool,
  pub recorded_at:          String,
}

impl RawDecision {
  pub fn into_decision(self) -> Result<MergeDecision> {
    let profile_entity_id = self
      .profile_entity_id
      .as_deref()
      .map(decode_uuid)
      .transpose()?;

    let confirmed_value = self
      .confirmed_value_json
      .as_deref()
      .map(serde_json::from_str::<Value>)
      .transpose()?;

    Ok(MergeDecision {
      version_id: decode_uuid(&self.version_id)?,
      parsed_entity_id: decode_uuid(&self.parsed_entity_id)?,
      field_name: self.field_name,
      entity_type: decode_entity_type(&self.entity_type)?,
      profile_entity_id,
      decision: decode_decision_type(&self.decision)?,
      parsed_value: serde_json::from_str(&self.parsed_value_json)?,
      confirmed_value,
      justification: self.justification,
      confidence: self.confidence,
      applied: self.applied,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `candidates` row.
pub struct RawCandidate {
  pub parsed_entity_id: String,
  pub owner_id:         String,
  pub entity_type:      String,
  pub fields_json:      String,
  pub confidence:       Option<f64>,
}

impl RawCandidate {
  pub fn into_candidate(self) -> Result<(Uuid, CandidateEntity)> {
    let owner_id = decode_uuid(&self.owner_id)?;
    let candidate = CandidateEntity {
      parsed_entity_id: decode_uuid(&self.parsed_entity_id)?,
      entity_type:      decode_entity_type(&self.entity_type)?,
      fields:           serde_json::from_str(&self.fields_json)?,
      confidence:       self.confidence,
    };
    Ok((owner_id, candidate))
  }
}
