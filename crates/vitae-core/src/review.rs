//! Review-cycle types: classified diffs, merge decisions, and candidates.
//!
//! A [`DiffItem`] is ephemeral — computed on demand, never persisted. A
//! [`MergeDecision`] is its persisted promotion: the user's disposition for
//! one classified field, recorded before (and independently of) application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  entity::EntityType,
};

// ─── Diff classification ─────────────────────────────────────────────────────

/// How a candidate field relates to the confirmed profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
  /// No confirmed counterpart exists.
  New,
  /// Equal to the confirmed value after normalization.
  Equivalent,
  /// Differs from the confirmed value.
  Conflicting,
}

/// One classified candidate field, produced by the diff classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffItem {
  pub field_name:        String,
  /// The candidate's own id, assigned by the extraction pipeline.
  pub parsed_entity_id:  Uuid,
  /// The matched existing logical entity, if any.
  pub profile_entity_id: Option<Uuid>,
  pub entity_type:       EntityType,
  pub diff_type:         DiffType,
  pub parsed_value:      Value,
  pub confidence:        Option<f64>,
  /// Human-readable reason for the classification.
  pub justification:     String,
}

// ─── Candidates ──────────────────────────────────────────────────────────────

/// One entity's worth of extracted field values for a resume version, as
/// handed over by the extraction pipeline. The core consumes this shape; it
/// never produces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEntity {
  pub parsed_entity_id: Uuid,
  pub entity_type:      EntityType,
  /// Raw field-name → value map from extraction.
  pub fields:           Map<String, Value>,
  pub confidence:       Option<f64>,
}

impl CandidateEntity {
  /// Extraction output is untrusted: every field name must belong to the
  /// candidate's entity type, and the confidence must be in range. Checked
  /// at ingest so a misspelled field fails loudly there instead of being
  /// dropped when the payload is built.
  pub fn validate(&self) -> Result<()> {
    let known = self.entity_type.field_names();
    for name in self.fields.keys() {
      if !known.contains(&name.as_str()) {
        return Err(Error::UnknownField {
          entity_type: self.entity_type,
          field:       name.clone(),
        });
      }
    }
    if let Some(c) = self.confidence
      && !(0.0..=1.0).contains(&c)
    {
      return Err(Error::Validation(format!(
        "candidate {} confidence must be in [0, 1], got {c}",
        self.parsed_entity_id
      )));
    }
    Ok(())
  }
}

// ─── Decisions ───────────────────────────────────────────────────────────────

/// A user's (or the system's) disposition for one classified diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
  /// Confirm the parsed value.
  Accept,
  /// Discard the parsed value; the profile is left unchanged.
  Reject,
  /// Confirm a caller-supplied replacement value instead.
  Override,
}

/// The identifying tuple of a decision: one decision per field per candidate
/// per resume review cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionKey {
  pub version_id:       Uuid,
  pub parsed_entity_id: Uuid,
  pub field_name:       String,
}

/// Input to [`crate::store::ProfileStore::record_decision`].
#[derive(Debug, Clone)]
pub struct NewDecision {
  pub version_id:        Uuid,
  pub parsed_entity_id:  Uuid,
  pub field_name:        String,
  pub entity_type:       EntityType,
  pub profile_entity_id: Option<Uuid>,
  pub decision:          DecisionType,
  pub parsed_value:      Value,
  /// Required, non-empty, for `Override`; ignored otherwise.
  pub override_value:    Option<Value>,
  pub justification:     Option<String>,
  pub confidence:        Option<f64>,
}

impl NewDecision {
  /// Promote a classified [`DiffItem`] to a decision.
  pub fn from_item(
    version_id: Uuid,
    item: &DiffItem,
    decision: DecisionType,
    override_value: Option<Value>,
    justification: Option<String>,
  ) -> Self {
    Self {
      version_id,
      parsed_entity_id: item.parsed_entity_id,
      field_name: item.field_name.clone(),
      entity_type: item.entity_type,
      profile_entity_id: item.profile_entity_id,
      decision,
      parsed_value: item.parsed_value.clone(),
      override_value,
      justification,
      confidence: item.confidence,
    }
  }

  pub fn key(&self) -> DecisionKey {
    DecisionKey {
      version_id:       self.version_id,
      parsed_entity_id: self.parsed_entity_id,
      field_name:       self.field_name.clone(),
    }
  }

  /// The value that will be written if this decision is applied. `None` for
  /// rejects.
  pub fn confirmed_value(&self) -> Option<Value> {
    match self.decision {
      DecisionType::Accept => Some(self.parsed_value.clone()),
      DecisionType::Override => self.override_value.clone(),
      DecisionType::Reject => None,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.decision == DecisionType::Override {
      let non_empty = match &self.override_value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
      };
      if !non_empty {
        return Err(Error::Validation(
          "override decisions require a non-empty override_value"
            .to_string(),
        ));
      }
    }
    if let Some(c) = self.confidence
      && !(0.0..=1.0).contains(&c)
    {
      return Err(Error::Validation(format!(
        "confidence must be in [0, 1], got {c}"
      )));
    }
    Ok(())
  }
}

/// A persisted decision row. `applied` flips to true only after the decision
/// applicator has committed the corresponding entity write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeDecision {
  pub version_id:        Uuid,
  pub parsed_entity_id:  Uuid,
  pub field_name:        String,
  pub entity_type:       EntityType,
  pub profile_entity_id: Option<Uuid>,
  pub decision:          DecisionType,
  pub parsed_value:      Value,
  /// Resolved at recording time: the parsed value for accepts, the override
  /// value for overrides, absent for rejects.
  pub confirmed_value:   Option<Value>,
  pub justification:     Option<String>,
  pub confidence:        Option<f64>,
  pub applied:           bool,
  pub recorded_at:       DateTime<Utc>,
}

impl MergeDecision {
  pub fn key(&self) -> DecisionKey {
    DecisionKey {
      version_id:       self.version_id,
      parsed_entity_id: self.parsed_entity_id,
      field_name:       self.field_name.clone(),
    }
  }
}

// ─── Apply outcome ───────────────────────────────────────────────────────────

/// Aggregate counts returned by `apply_all`. Partial success is the normal
/// case: decisions that failed stay pending and are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
  pub applied:    u32,
  pub rejected:   u32,
  pub overridden: u32,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
