use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::check_confidence;
use crate::{Error, Result};

/// String-keyed metadata attached to entities, relationships and graph elements.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityType {
    Model,
    Dataset,
    Metric,
    Benchmark,
    Architecture,
    Framework,
    Organization,
    Person,
    Task,
    Method,
    Hardware,
    Unknown,
}

impl EntityType {
    pub const ALL: [Self; 12] = [
        Self::Model,
        Self::Dataset,
        Self::Metric,
        Self::Benchmark,
        Self::Architecture,
        Self::Framework,
        Self::Organization,
        Self::Person,
        Self::Task,
        Self::Method,
        Self::Hardware,
        Self::Unknown,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "MODEL",
            Self::Dataset => "DATASET",
            Self::Metric => "METRIC",
            Self::Benchmark => "BENCHMARK",
            Self::Architecture => "ARCHITECTURE",
            Self::Framework => "FRAMEWORK",
            Self::Organization => "ORGANIZATION",
            Self::Person => "PERSON",
            Self::Task => "TASK",
            Self::Method => "METHOD",
            Self::Hardware => "HARDWARE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parses a type tag, mapping anything unrecognised to `Unknown`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "MODEL" => Self::Model,
            "DATASET" => Self::Dataset,
            "METRIC" => Self::Metric,
            "BENCHMARK" => Self::Benchmark,
            "ARCHITECTURE" => Self::Architecture,
            "FRAMEWORK" => Self::Framework,
            "ORGANIZATION" => Self::Organization,
            "PERSON" => Self::Person,
            "TASK" => Self::Task,
            "METHOD" => Self::Method,
            "HARDWARE" => Self::Hardware,
            _ => Self::Unknown,
        }
    }

    /// Types that name something a relationship can be trained or evaluated on.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Dataset | Self::Benchmark)
    }

    /// Types that name a system whose behaviour can be compared.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::Model | Self::Architecture | Self::Method)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_tag(s))
    }
}

impl Serialize for EntityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// A typed, confidence-scored mention found in a document.
///
/// Entities are immutable: every `with_*` method consumes the value and returns a new,
/// re-validated entity. Offsets count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntityRecord")]
pub struct Entity {
    id: String,
    text: String,
    #[serde(rename = "type")]
    entity_type: EntityType,
    confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: Metadata,
}

#[derive(Deserialize)]
struct EntityRecord {
    id: String,
    text: String,
    #[serde(rename = "type", default = "unknown_type")]
    entity_type: EntityType,
    confidence: f64,
    #[serde(default)]
    start: Option<usize>,
    #[serde(default)]
    end: Option<usize>,
    #[serde(default)]
    metadata: Metadata,
}

const fn unknown_type() -> EntityType {
    EntityType::Unknown
}

impl TryFrom<EntityRecord> for Entity {
    type Error = Error;

    fn try_from(record: EntityRecord) -> Result<Self> {
        let entity = Self::new(record.id, record.text, record.entity_type, record.confidence)?;
        let entity = match (record.start, record.end) {
            (Some(start), Some(end)) => entity.with_span(start, end)?,
            (None, None) => entity,
            _ => return Err(Error::IncompleteSpan),
        };
        Ok(entity.with_metadata_map(record.metadata))
    }
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        entity_type: EntityType,
        confidence: f64,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            text: text.into(),
            entity_type,
            confidence: check_confidence(confidence)?,
            start: None,
            end: None,
            metadata: Metadata::new(),
        })
    }

    /// Builds an entity whose id is derived from its type and span, so re-running a
    /// recognizer over the same text reproduces the same ids.
    pub fn spanned(
        text: impl Into<String>,
        entity_type: EntityType,
        confidence: f64,
        start: usize,
        end: usize,
    ) -> Result<Self> {
        let text = text.into();
        let id = derived_entity_id(entity_type, start, end, &text);
        Self::new(id, text, entity_type, confidence)?.with_span(start, end)
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidSpan { start, end });
        }
        self.start = Some(start);
        self.end = Some(end);
        Ok(self)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Result<Self> {
        self.confidence = check_confidence(confidence)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    #[must_use]
    pub const fn start(&self) -> Option<usize> {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> Option<usize> {
        self.end
    }

    #[must_use]
    pub const fn span(&self) -> Option<(usize, usize)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// Span length in characters, zero when the entity has no offsets.
    #[must_use]
    pub fn span_len(&self) -> usize {
        self.span().map_or(0, |(start, end)| end - start)
    }

    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn to_map(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(Error::InvalidConfig(format!(
                "entity serialized to non-object value: {other}"
            ))),
        }
    }

    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}

#[must_use]
pub fn derived_entity_id(entity_type: EntityType, start: usize, end: usize, text: &str) -> String {
    let name = format!("{entity_type}|{start}|{end}|{text}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
