use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::entity::Metadata;
use crate::error::check_confidence;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationType {
    // Data
    TrainedOn,
    EvaluatedOn,

    // Comparison
    Outperforms,
    ComparedWith,

    // Lineage
    BasedOn,
    FineTunedFrom,
    IsA,
    PartOf,

    // Implementation
    ImplementedIn,
    Uses,

    // Results and provenance
    Achieves,
    DevelopedBy,

    Unknown,
}

impl RelationType {
    pub const ALL: [Self; 13] = [
        Self::TrainedOn,
        Self::EvaluatedOn,
        Self::Outperforms,
        Self::ComparedWith,
        Self::BasedOn,
        Self::FineTunedFrom,
        Self::IsA,
        Self::PartOf,
        Self::ImplementedIn,
        Self::Uses,
        Self::Achieves,
        Self::DevelopedBy,
        Self::Unknown,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TrainedOn => "TRAINED_ON",
            Self::EvaluatedOn => "EVALUATED_ON",
            Self::Outperforms => "OUTPERFORMS",
            Self::ComparedWith => "COMPARED_WITH",
            Self::BasedOn => "BASED_ON",
            Self::FineTunedFrom => "FINE_TUNED_FROM",
            Self::IsA => "IS_A",
            Self::PartOf => "PART_OF",
            Self::ImplementedIn => "IMPLEMENTED_IN",
            Self::Uses => "USES",
            Self::Achieves => "ACHIEVES",
            Self::DevelopedBy => "DEVELOPED_BY",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parses a type tag, mapping anything unrecognised to `Unknown`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "TRAINED_ON" => Self::TrainedOn,
            "EVALUATED_ON" => Self::EvaluatedOn,
            "OUTPERFORMS" => Self::Outperforms,
            "COMPARED_WITH" => Self::ComparedWith,
            "BASED_ON" => Self::BasedOn,
            "FINE_TUNED_FROM" => Self::FineTunedFrom,
            "IS_A" => Self::IsA,
            "PART_OF" => Self::PartOf,
            "IMPLEMENTED_IN" => Self::ImplementedIn,
            "USES" => Self::Uses,
            "ACHIEVES" => Self::Achieves,
            "DEVELOPED_BY" => Self::DevelopedBy,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn is_symmetric(&self) -> bool {
        matches!(self, Self::ComparedWith)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

impl Serialize for RelationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// A typed, directed link between two entities of one document.
///
/// Endpoints are entity ids only; whether they resolve is checked when the graph is
/// assembled, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RelationshipRecord")]
pub struct Relationship {
    id: String,
    source_id: String,
    target_id: String,
    relation_type: RelationType,
    confidence: f64,
    context: String,
    bidirectional: bool,
    #[serde(skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    metadata: Metadata,
}

#[derive(Deserialize)]
struct RelationshipRecord {
    id: String,
    source_id: String,
    target_id: String,
    #[serde(default = "unknown_relation")]
    relation_type: RelationType,
    confidence: f64,
    #[serde(default)]
    context: String,
    #[serde(default)]
    bidirectional: bool,
    #[serde(default)]
    metadata: Metadata,
}

const fn unknown_relation() -> RelationType {
    RelationType::Unknown
}

impl TryFrom<RelationshipRecord> for Relationship {
    type Error = Error;

    fn try_from(record: RelationshipRecord) -> Result<Self> {
        let rel = Self::new(
            record.source_id,
            record.target_id,
            record.relation_type,
            record.confidence,
        )?;
        Ok(Self {
            id: record.id,
            context: record.context,
            bidirectional: record.bidirectional,
            metadata: record.metadata,
            ..rel
        })
    }
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: RelationType,
        confidence: f64,
    ) -> Result<Self> {
        let source_id = source_id.into();
        let target_id = target_id.into();

        if source_id == target_id {
            return Err(Error::SelfReference(source_id));
        }

        Ok(Self {
            id: derived_relationship_id(&source_id, &target_id, relation_type),
            source_id,
            target_id,
            relation_type,
            confidence: check_confidence(confidence)?,
            context: String::new(),
            bidirectional: relation_type.is_symmetric(),
            metadata: Metadata::new(),
        })
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    #[must_use]
    pub const fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Result<Self> {
        self.confidence = check_confidence(confidence)?;
        Ok(self)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    #[must_use]
    pub const fn relation_type(&self) -> RelationType {
        self.relation_type
    }

    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    #[must_use]
    pub const fn bidirectional(&self) -> bool {
        self.bidirectional
    }

    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The `(source, target, type)` triple used for deduplication.
    #[must_use]
    pub fn triple(&self) -> (&str, &str, RelationType) {
        (&self.source_id, &self.target_id, self.relation_type)
    }

    pub fn to_map(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::InvalidConfig(format!(
                "relationship serialized to non-object value: {other}"
            ))),
        }
    }

    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}

#[must_use]
pub fn derived_relationship_id(source_id: &str, target_id: &str, relation_type: RelationType) -> String {
    let name = format!("{source_id}|{target_id}|{relation_type}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
