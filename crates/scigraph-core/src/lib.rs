#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::option_if_let_else)]

pub mod artifacts;
pub mod config;
pub mod entity;
pub mod error;
pub mod extract;
pub mod graph;
pub mod overlap;
pub mod pipeline;
pub mod recognizer;
pub mod relationship;

pub use config::{ConfigError, ExtractionConfig, FilterConfig};
pub use entity::{Entity, EntityType, Metadata};
pub use error::{Error, Result};
pub use extract::{
    CombinedExtractor, ConflictResolver, ExtractionStrategy, Extractor, HeuristicConfig,
    HeuristicExtractor, PairingConfig, PatternConfig, PatternExtractor, PatternTable,
    ResolutionConfig, ScoringWeights,
};
pub use graph::{
    GraphAssembler, GraphEdge, GraphMetadata, GraphNode, GraphStatistics, KnowledgeGraph,
    StatisticsCache,
};
pub use overlap::{filter_entities, merge_overlapping_entities, spans_overlap};
pub use pipeline::{DocumentOutput, DocumentPipeline, DocumentStats};
pub use recognizer::{EntityRecognizer, GazetteerRecognizer, RecognizerConfig};
pub use relationship::{RelationType, Relationship};
