use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::{ExtractionConfig, FilterConfig};
use crate::entity::{Entity, EntityType};
use crate::extract::{filter_relationships, Extractor};
use crate::graph::{GraphAssembler, KnowledgeGraph};
use crate::overlap::{filter_entities, merge_overlapping_entities};
use crate::recognizer::{EntityRecognizer, GazetteerRecognizer};
use crate::relationship::{RelationType, Relationship};
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Entities handed in or recognized, before overlap merging
    pub input_entities: usize,
    /// Entities removed by overlap merging
    pub merged_away: usize,
    pub entities: usize,
    pub relationships: usize,
    /// Edges the graph refused, e.g. for a missing endpoint
    pub graph_warnings: usize,
    pub entities_by_type: BTreeMap<EntityType, usize>,
    pub relationships_by_type: BTreeMap<RelationType, usize>,
    pub duration_ms: u64,
}

impl DocumentStats {
    /// Counts taken from a finished document's entities, relationships and graph. Stage
    /// counters and timing start at their defaults, with every entity counted as input.
    #[must_use]
    pub fn summarize(entities: &[Entity], relationships: &[Relationship], graph: &KnowledgeGraph) -> Self {
        let mut entities_by_type = BTreeMap::new();
        for entity in entities {
            *entities_by_type.entry(entity.entity_type()).or_insert(0) += 1;
        }
        let mut relationships_by_type = BTreeMap::new();
        for rel in relationships {
            *relationships_by_type.entry(rel.relation_type()).or_insert(0) += 1;
        }
        Self {
            input_entities: entities.len(),
            merged_away: 0,
            entities: entities.len(),
            relationships: relationships.len(),
            graph_warnings: graph.metadata().warnings.len(),
            entities_by_type,
            relationships_by_type,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentOutput {
    pub document_id: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub graph: KnowledgeGraph,
    pub stats: DocumentStats,
}

/// Turns one document's text into entities, relationships and a knowledge graph.
///
/// Stages run in a fixed order: recognize (only when no entities are supplied), merge
/// overlaps, filter entities, extract, filter relationships, assemble.
pub struct DocumentPipeline {
    recognizer: Box<dyn EntityRecognizer>,
    extractor: Box<dyn Extractor>,
    assembler: GraphAssembler,
    filters: FilterConfig,
}

impl DocumentPipeline {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            recognizer: Box::new(GazetteerRecognizer::new(&config.recognizer)?),
            extractor: Box::new(config.combined_extractor()),
            assembler: GraphAssembler::new(),
            filters: config.filters.clone(),
        })
    }

    #[must_use]
    pub fn with_recognizer(mut self, recognizer: Box<dyn EntityRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn with_assembler(mut self, assembler: GraphAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    #[must_use]
    pub fn process(&self, document_id: &str, text: &str, entities: Option<Vec<Entity>>) -> DocumentOutput {
        let started = Instant::now();

        let entities = entities.unwrap_or_else(|| self.recognizer.recognize(text));
        let input_entities = entities.len();
        let merged = merge_overlapping_entities(entities);
        let merged_away = input_entities - merged.len();
        let entities = filter_entities(
            merged,
            self.filters.min_entity_confidence,
            self.filters.entity_types.as_deref(),
        );

        let relationships = filter_relationships(
            self.extractor.extract(text, &entities),
            self.filters.min_relationship_confidence,
            self.filters.relation_types.as_deref(),
        );

        let graph = self.assembler.assemble(document_id, &entities, &relationships);

        let stats = DocumentStats {
            input_entities,
            merged_away,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ..DocumentStats::summarize(&entities, &relationships, &graph)
        };

        tracing::info!(
            document_id,
            entities = stats.entities,
            relationships = stats.relationships,
            "processed document"
        );

        DocumentOutput {
            document_id: document_id.to_string(),
            entities,
            relationships,
            graph,
            stats,
        }
    }
}
