//! Identity types: the versioned behavioral configuration record.
//!
//! An identity is created once at version 1. Every later mutation produces a
//! new record with `version = previous + 1` paired with an immutable
//! [`IdentityVersion`] snapshot. Past versions are never modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::entity::Entity;

/// Unique identifier for an identity, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdentityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// How much risk the identity is willing to take when acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskPosture {
    Conservative,
    Moderate,
    Aggressive,
}

impl fmt::Display for RiskPosture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskPosture::Conservative => write!(f, "conservative"),
            RiskPosture::Moderate => write!(f, "moderate"),
            RiskPosture::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for RiskPosture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(RiskPosture::Conservative),
            "moderate" => Ok(RiskPosture::Moderate),
            "aggressive" => Ok(RiskPosture::Aggressive),
            other => Err(format!("invalid risk posture: '{other}'")),
        }
    }
}

/// A named value the identity holds. Higher priority wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityValue {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub priority: u32,
}

/// A rule that must always hold, with the rationale behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invariant {
    pub id: Uuid,
    pub description: String,
    pub rule: String,
    pub rationale: String,
}

/// A constraint on one aspect of style (tone, format, verbosity, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleConstraint {
    pub id: Uuid,
    pub aspect: String,
    pub constraint: String,
}

/// The live identity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    pub description: Option<String>,
    /// Ordered as supplied by the caller.
    pub values: Vec<IdentityValue>,
    pub invariants: Vec<Invariant>,
    pub style_constraints: Vec<StyleConstraint>,
    pub risk_posture: RiskPosture,
    /// Monotonically increasing, starting at 1.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Identity {
    type Id = IdentityId;

    fn id(&self) -> &IdentityId {
        &self.id
    }
}

/// Immutable snapshot of an identity at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityVersion {
    pub identity_id: IdentityId,
    pub version: u32,
    /// Full copy of the identity as it was at this version.
    pub snapshot: Identity,
    /// Human-supplied reason; `"initial"` for version 1.
    pub change_reason: String,
    pub created_at: DateTime<Utc>,
}

/// Change reason recorded on the version-1 snapshot.
pub const INITIAL_CHANGE_REASON: &str = "initial";

/// Caller-supplied value without an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueInput {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantInput {
    pub description: String,
    pub rule: String,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleConstraintInput {
    pub aspect: String,
    pub constraint: String,
}

impl ValueInput {
    /// Assign a fresh identifier. Identifiers are never reused across updates.
    pub fn into_value(self) -> IdentityValue {
        IdentityValue {
            id: Uuid::now_v7(),
            name: self.name,
            description: self.description,
            priority: self.priority,
        }
    }
}

impl InvariantInput {
    pub fn into_invariant(self) -> Invariant {
        Invariant {
            id: Uuid::now_v7(),
            description: self.description,
            rule: self.rule,
            rationale: self.rationale,
        }
    }
}

impl StyleConstraintInput {
    pub fn into_style_constraint(self) -> StyleConstraint {
        StyleConstraint {
            id: Uuid::now_v7(),
            aspect: self.aspect,
            constraint: self.constraint,
        }
    }
}

/// Request to create a new identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIdentityRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub values: Vec<ValueInput>,
    #[serde(default)]
    pub invariants: Vec<InvariantInput>,
    #[serde(default)]
    pub style_constraints: Vec<StyleConstraintInput>,
    pub risk_posture: RiskPosture,
}

/// Request to update an identity.
///
/// Omitted fields carry over from the current version. Present collections
/// replace the current ones wholesale with freshly identified elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateIdentityRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Use `Some(None)` (JSON `null`) to clear the description.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub values: Option<Vec<ValueInput>>,
    #[serde(default)]
    pub invariants: Option<Vec<InvariantInput>>,
    #[serde(default)]
    pub style_constraints: Option<Vec<StyleConstraintInput>>,
    #[serde(default)]
    pub risk_posture: Option<RiskPosture>,
    pub change_reason: String,
}

/// Wrap any present value, `null` included, in `Some` so it differs from an
/// absent field.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_id_display_parse() {
        let id = IdentityId::new();
        let parsed: IdentityId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_risk_posture_roundtrip() {
        for posture in [
            RiskPosture::Conservative,
            RiskPosture::Moderate,
            RiskPosture::Aggressive,
        ] {
            let parsed: RiskPosture = posture.to_string().parse().unwrap();
            assert_eq!(posture, parsed);
        }
        assert!("reckless".parse::<RiskPosture>().is_err());
    }

    #[test]
    fn test_input_conversion_assigns_fresh_ids() {
        let input = ValueInput {
            name: "honesty".to_string(),
            description: "Never mislead".to_string(),
            priority: 5,
        };
        let a = input.clone().into_value();
        let b = input.into_value();
        assert_ne!(a.id, b.id);
        assert_eq!(a.name, b.name);
    }

    #[test]
    fn test_update_request_deserializes_with_only_reason() {
        let req: UpdateIdentityRequest =
            serde_json::from_str(r#"{"change_reason": "tone tweak"}"#).unwrap();
        assert_eq!(req.change_reason, "tone tweak");
        assert!(req.values.is_none());
        assert!(req.risk_posture.is_none());
    }

    #[test]
    fn test_update_request_description_absent_null_and_set() {
        let absent: UpdateIdentityRequest =
            serde_json::from_str(r#"{"change_reason": "x"}"#).unwrap();
        assert_eq!(absent.description, None);

        let cleared: UpdateIdentityRequest =
            serde_json::from_str(r#"{"change_reason": "x", "description": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));

        let set: UpdateIdentityRequest =
            serde_json::from_str(r#"{"change_reason": "x", "description": "new"}"#).unwrap();
        assert_eq!(set.description, Some(Some("new".to_string())));
    }
}
