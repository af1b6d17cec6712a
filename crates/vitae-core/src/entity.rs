//! Versioned profile entities — the unit of truth in the Vitae store.
//!
//! An entity is never updated in place. Every revision is a new row with a
//! higher version number; exactly one version per logical entity is active.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Entity type ─────────────────────────────────────────────────────────────

/// The closed set of profile entity types.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
  WorkExperience,
  Education,
  Skill,
  Project,
  Certification,
}

impl EntityType {
  /// The full field set for this entity type. Must match the serde field
  /// names of the corresponding payload struct.
  pub fn field_names(self) -> &'static [&'static str] {
    match self {
      Self::WorkExperience => &[
        "title",
        "company",
        "location",
        "start_date",
        "end_date",
        "description",
      ],
      Self::Education => &[
        "institution",
        "degree",
        "field_of_study",
        "start_date",
        "end_date",
      ],
      Self::Skill => &["name", "level"],
      Self::Project => &["name", "description", "url"],
      Self::Certification => &["name", "issuer", "issued_on", "expires_on"],
    }
  }
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// How a version entered the store. An `ai_extraction` version that is not
/// active is "pending acceptance".
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
  /// Typed in or confirmed by the user directly.
  #[default]
  UserManual,
  /// Produced by the resume extraction pipeline.
  AiExtraction,
}

// ─── Payload sub-types ───────────────────────────────────────────────────────

/// A position held at a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkExperienceValue {
  pub title:       String,
  pub company:     String,
  pub location:    Option<String>,
  pub start_date:  Option<NaiveDate>,
  pub end_date:    Option<NaiveDate>,
  pub description: Option<String>,
}

/// A degree or course of study at an institution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationValue {
  pub institution:    String,
  pub degree:         Option<String>,
  pub field_of_study: Option<String>,
  pub start_date:     Option<NaiveDate>,
  pub end_date:       Option<NaiveDate>,
}

/// A named skill, optionally with a free-text proficiency level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillValue {
  pub name:  String,
  pub level: Option<String>,
}

/// A personal or professional project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectValue {
  pub name:        String,
  pub description: Option<String>,
  pub url:         Option<String>,
}

/// A certification or license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationValue {
  pub name:       String,
  pub issuer:     Option<String>,
  pub issued_on:  Option<NaiveDate>,
  pub expires_on: Option<NaiveDate>,
}

// ─── EntityPayload ───────────────────────────────────────────────────────────

/// The typed payload of an entity version. The variant name serves as the
/// `entity_type` discriminant stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EntityPayload {
  WorkExperience(WorkExperienceValue),
  Education(EducationValue),
  Skill(SkillValue),
  Project(ProjectValue),
  Certification(CertificationValue),
}

impl EntityPayload {
  pub fn entity_type(&self) -> EntityType {
    match self {
      Self::WorkExperience(_) => EntityType::WorkExperience,
      Self::Education(_) => EntityType::Education,
      Self::Skill(_) => EntityType::Skill,
      Self::Project(_) => EntityType::Project,
      Self::Certification(_) => EntityType::Certification,
    }
  }

  /// The discriminant string stored in the `entity_type` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::WorkExperience(_) => "work_experience",
      Self::Education(_) => "education",
      Self::Skill(_) => "skill",
      Self::Project(_) => "project",
      Self::Certification(_) => "certification",
    }
  }

  /// Serialise the inner payload (without the type tag) for the
  /// `payload_json` database column.
  pub fn to_json(&self) -> Result<Value> {
    // The full serialised form is `{"type": "...", "data": <payload>}`.
    // We want only the payload.
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(Value::Null))
  }

  /// Deserialise from the entity type and JSON payload stored in the
  /// database.
  pub fn from_parts(entity_type: EntityType, data: Value) -> Result<Self> {
    let wrapped =
      serde_json::json!({ "type": entity_type.to_string(), "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }

  /// The payload as a field-name → value map. Optional fields that are
  /// unset appear as JSON `null`, so the key set is the full field set for
  /// the entity type.
  pub fn fields(&self) -> Result<Map<String, Value>> {
    match self.to_json()? {
      Value::Object(map) => Ok(map),
      other => Err(Error::Validation(format!(
        "payload did not serialise to an object: {other}"
      ))),
    }
  }

  /// Read a single field by name. `Ok(None)` means the field exists but is
  /// unset; an unknown name is an error.
  pub fn field(&self, name: &str) -> Result<Option<Value>> {
    let fields = self.fields()?;
    match fields.get(name) {
      Some(Value::Null) => Ok(None),
      Some(v) => Ok(Some(v.clone())),
      None => Err(Error::UnknownField {
        entity_type: self.entity_type(),
        field:       name.to_string(),
      }),
    }
  }

  /// Return a copy of this payload with `updates` merged over it. Every
  /// update key must name a field of this entity type; setting a key to
  /// `null` clears an optional field.
  pub fn merged(&self, updates: &Map<String, Value>) -> Result<Self> {
    let mut fields = self.fields()?;
    for (name, value) in updates {
      if !fields.contains_key(name) {
        return Err(Error::UnknownField {
          entity_type: self.entity_type(),
          field:       name.clone(),
        });
      }
      fields.insert(name.clone(), value.clone());
    }
    Self::from_parts(self.entity_type(), Value::Object(fields))
  }

  /// Return a copy of this payload with one field replaced.
  pub fn with_field(&self, name: &str, value: Value) -> Result<Self> {
    let mut updates = Map::new();
    updates.insert(name.to_string(), value);
    self.merged(&updates)
  }
}

// ─── VersionedEntity ─────────────────────────────────────────────────────────

/// One version of a logical profile entity. Once written, no field is ever
/// updated except the `is_active` flag, which moves exactly once — from the
/// prior active version to its successor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedEntity {
  /// Stable identifier for "the same real-world fact" across revisions.
  pub logical_id:        Uuid,
  /// Monotonically increasing, unique per `logical_id`, starts at 1.
  pub version:           i64,
  pub is_active:         bool,
  /// The tenant/caller that owns this entity. Always passed explicitly.
  pub owner_id:          Uuid,
  pub source:            EntitySource,
  /// In [0, 1]; present only for AI-sourced versions.
  pub source_confidence: Option<f64>,
  pub payload:           EntityPayload,
  /// Server-assigned timestamp; never changes after creation.
  pub recorded_at:       DateTime<Utc>,
}

// ─── NewEntity ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::ProfileStore::create_entity`]. The store assigns
/// `logical_id`, `version = 1`, and `recorded_at`.
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub owner_id:          Uuid,
  pub payload:           EntityPayload,
  pub source:            EntitySource,
  pub source_confidence: Option<f64>,
}

impl NewEntity {
  /// A manually entered entity.
  pub fn manual(owner_id: Uuid, payload: EntityPayload) -> Self {
    Self {
      owner_id,
      payload,
      source: EntitySource::UserManual,
      source_confidence: None,
    }
  }

  /// An entity produced by the extraction pipeline.
  pub fn extracted(
    owner_id: Uuid,
    payload: EntityPayload,
    confidence: Option<f64>,
  ) -> Self {
    Self {
      owner_id,
      payload,
      source: EntitySource::AiExtraction,
      source_confidence: confidence,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if let Some(c) = self.source_confidence
      && !(0.0..=1.0).contains(&c)
    {
      return Err(Error::Validation(format!(
        "source_confidence must be in [0, 1], got {c}"
      )));
    }
    if self.source == EntitySource::UserManual
      && self.source_confidence.is_some()
    {
      return Err(Error::Validation(
        "source_confidence is only valid for ai_extraction entities"
          .to_string(),
      ));
    }
    Ok(())
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
