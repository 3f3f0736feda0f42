use scigraph_core::artifacts::{read_graph, write_document_artifacts, GRAPH_FILE};
use scigraph_core::extract::deduplicate_relationships;
use scigraph_core::{
    CombinedExtractor, ConflictResolver, DocumentPipeline, Entity, EntityType,
    ExtractionConfig, Extractor, GraphAssembler, KnowledgeGraph, RelationType, Relationship,
};
use tempfile::TempDir;

const ABSTRACT: &str = "We introduce RoBERTa. RoBERTa is based on BERT. RoBERTa was trained on \
BookCorpus and evaluated on GLUE, where RoBERTa outperforms XLNet. \
Our code was implemented in PyTorch.";

fn entity(id: &str, text: &str, entity_type: EntityType, confidence: f64, span: (usize, usize)) -> Entity {
    Entity::new(id, text, entity_type, confidence)
        .unwrap()
        .with_span(span.0, span.1)
        .unwrap()
}

#[test]
fn gpt4_mmlu_scenario() {
    let text = "GPT-4 was evaluated on MMLU";
    let entities = vec![
        entity("E1", "GPT-4", EntityType::Model, 0.95, (0, 5)),
        entity("E2", "MMLU", EntityType::Benchmark, 0.9, (20, 24)),
    ];

    let found = CombinedExtractor::default().extract(text, &entities);
    let rel = found
        .iter()
        .find(|r| r.triple() == ("E1", "E2", RelationType::EvaluatedOn))
        .expect("EVALUATED_ON between GPT-4 and MMLU");
    assert!(rel.confidence() >= 0.7);
    assert!(!rel.context().is_empty());
}

#[test]
fn same_type_duplicates_keep_highest() {
    let rels = vec![
        Relationship::new("E1", "E2", RelationType::TrainedOn, 0.8).unwrap(),
        Relationship::new("E1", "E2", RelationType::TrainedOn, 0.6).unwrap(),
    ];
    let resolved = ConflictResolver::default().resolve(rels.clone());
    assert_eq!(resolved.len(), 1);
    assert!((resolved[0].confidence() - 0.8).abs() < f64::EPSILON);
    assert_eq!(deduplicate_relationships(rels), resolved);
}

#[test]
fn compatible_types_survive_together() {
    let resolved = ConflictResolver::default().resolve(vec![
        Relationship::new("M", "D", RelationType::TrainedOn, 0.9).unwrap(),
        Relationship::new("M", "D", RelationType::EvaluatedOn, 0.85).unwrap(),
    ]);
    let types: Vec<RelationType> = resolved.iter().map(Relationship::relation_type).collect();
    assert_eq!(types, vec![RelationType::TrainedOn, RelationType::EvaluatedOn]);
}

#[test]
fn abstract_end_to_end() {
    let pipeline = DocumentPipeline::new(&ExtractionConfig::default()).unwrap();
    let output = pipeline.process("roberta", ABSTRACT, None);

    let text_of = |id: &str| {
        output
            .entities
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.text().to_string())
            .unwrap_or_default()
    };
    let triples: Vec<(String, String, RelationType)> = output
        .relationships
        .iter()
        .map(|r| (text_of(r.source_id()), text_of(r.target_id()), r.relation_type()))
        .collect();
    let has = |s: &str, t: &str, ty: RelationType| {
        triples
            .iter()
            .any(|(a, b, c)| a == s && b == t && *c == ty)
    };

    assert!(has("RoBERTa", "BERT", RelationType::BasedOn), "{triples:?}");
    assert!(has("RoBERTa", "BookCorpus", RelationType::TrainedOn), "{triples:?}");
    assert!(has("RoBERTa", "GLUE", RelationType::EvaluatedOn), "{triples:?}");
    assert!(has("RoBERTa", "XLNet", RelationType::Outperforms), "{triples:?}");

    // every edge of the graph connects recognized entities
    assert!(output.graph.metadata().warnings.is_empty());
    assert_eq!(output.graph.edge_count(), output.relationships.len());
}

const REPEATED_NAMES: &str = "RoBERTa is based on BERT. RoBERTa was trained on BookCorpus. \
Later, BERT was evaluated on GLUE.";

#[test]
fn repeated_names_link_their_own_mentions() {
    let pipeline = DocumentPipeline::new(&ExtractionConfig::default()).unwrap();
    let output = pipeline.process("doc", REPEATED_NAMES, None);
    let mention = |id: &str| {
        output
            .entities
            .iter()
            .find(|e| e.id() == id)
            .map(|e| (e.text().to_string(), e.span()))
            .unwrap_or_default()
    };
    assert_eq!(output.entities.len(), 6);

    for rel in &output.relationships {
        let (source, target) = (mention(rel.source_id()), mention(rel.target_id()));
        assert_ne!(source.0, target.0, "{source:?} -> {target:?}");
    }

    let based_on: Vec<_> = output
        .relationships
        .iter()
        .filter(|r| r.relation_type() == RelationType::BasedOn)
        .map(|r| (mention(r.source_id()).1, mention(r.target_id()).1))
        .collect();
    assert_eq!(based_on, vec![(Some((0, 7)), Some((20, 24)))]);
    assert!(!output.graph.has_cycles());
}

#[test]
fn repeated_paragraphs_keep_relationships_local() {
    let text = vec![REPEATED_NAMES; 5].join(" ");
    let pipeline = DocumentPipeline::new(&ExtractionConfig::default()).unwrap();
    let output = pipeline.process("doc", &text, None);
    let span_of = |id: &str| {
        output
            .entities
            .iter()
            .find(|e| e.id() == id)
            .and_then(Entity::span)
            .unwrap_or_default()
    };
    assert_eq!(output.entities.len(), 30);

    let trained_on: Vec<_> = output
        .relationships
        .iter()
        .filter(|r| r.relation_type() == RelationType::TrainedOn)
        .map(|r| (span_of(r.source_id()), span_of(r.target_id())))
        .collect();
    assert!(!trained_on.is_empty());
    for &(source, target) in &trained_on {
        let gap = if source.1 <= target.0 {
            target.0 - source.1
        } else {
            source.0.saturating_sub(target.1)
        };
        assert!(gap <= 100, "{source:?} -> {target:?}");
    }
    // the opening RoBERTa only reaches the BookCorpus of its own paragraph
    assert!(trained_on
        .iter()
        .filter(|(source, _)| *source == (0, 7))
        .all(|(_, target)| *target == (49, 59)));

    let based_on = output
        .relationships
        .iter()
        .filter(|r| r.relation_type() == RelationType::BasedOn)
        .count();
    assert_eq!(based_on, 5);
}

#[test]
fn processing_is_deterministic() {
    let pipeline = DocumentPipeline::new(&ExtractionConfig::default()).unwrap();
    let first = pipeline.process("doc", ABSTRACT, None);
    for _ in 0..5 {
        let again = pipeline.process("doc", ABSTRACT, None);
        assert_eq!(again.entities, first.entities);
        assert_eq!(again.relationships, first.relationships);
        assert_eq!(again.graph.edges(), first.graph.edges());
    }

    let mut config = ExtractionConfig::default();
    config.parallel_extractors = true;
    let parallel = DocumentPipeline::new(&config).unwrap().process("doc", ABSTRACT, None);
    assert_eq!(parallel.relationships, first.relationships);
}

#[test]
fn dangling_relationships_never_reach_the_graph() {
    let entities = vec![entity("a", "BERT", EntityType::Model, 0.9, (0, 4))];
    let rels = vec![Relationship::new("a", "missing", RelationType::TrainedOn, 0.9).unwrap()];
    let graph = GraphAssembler::new().assemble("doc", &entities, &rels);
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.metadata().warnings.len(), 1);
}

#[test]
fn graph_survives_disk_round_trip() {
    let out = TempDir::new().unwrap();
    let pipeline = DocumentPipeline::new(&ExtractionConfig::default()).unwrap();
    let output = pipeline.process("paper", ABSTRACT, None);

    let dir = write_document_artifacts(out.path(), &output).unwrap();
    let restored = read_graph(&dir.join(GRAPH_FILE)).unwrap();
    assert_eq!(restored, output.graph);

    let value = output.graph.to_value().unwrap();
    assert_eq!(KnowledgeGraph::from_value(value).unwrap(), output.graph);
}

#[test]
fn entities_and_relationships_round_trip_through_maps() {
    let e = entity("E1", "GPT-4", EntityType::Model, 0.95, (0, 5)).with_metadata("source", "abstract");
    assert_eq!(Entity::from_map(e.to_map().unwrap()).unwrap(), e);

    let r = Relationship::new("E1", "E2", RelationType::EvaluatedOn, 0.93)
        .unwrap()
        .with_context("GPT-4 was evaluated on MMLU");
    assert_eq!(Relationship::from_map(r.to_map().unwrap()).unwrap(), r);
}
