mod combined;
pub mod contract;
mod heuristic;
mod pattern;

pub use combined::{
    connected_entities, connection_counts, group_by_source, top_connected, CombinedExtractor,
    ConflictResolver, ResolutionConfig,
};
pub use contract::{
    anchor_mention, deduplicate_relationships, filter_relationships, find_entity_pairs,
    get_entity_pair_context, locate_mentions, CharIndex, PairingConfig, ScoreInputs,
    ScoringWeights,
};
pub use heuristic::{resolve_entity_name, HeuristicConfig, HeuristicExtractor};
pub use pattern::{
    validate_template, CompiledTemplate, PatternConfig, PatternExtractor, PatternTable,
};
pub(crate) use pattern::bounded_literal;

use crate::entity::Entity;
use crate::relationship::Relationship;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Pattern,
    Heuristic,
    Combined,
}

impl ExtractionStrategy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Heuristic => "heuristic",
            Self::Combined => "combined",
        }
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces relationships between the given entities from a document's text.
///
/// Implementations are read-only over their inputs and never fail: text they cannot make
/// sense of yields an empty list.
pub trait Extractor: Send + Sync {
    fn strategy(&self) -> ExtractionStrategy;

    fn extract(&self, text: &str, entities: &[Entity]) -> Vec<Relationship>;
}
