use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::contract::{
    deduplicate_relationships, entity_distance, find_entity_pairs, locate_mentions, CharIndex,
    PairingConfig, ScoreInputs, ScoringWeights,
};
use super::{ExtractionStrategy, Extractor};
use crate::entity::{Entity, EntityType};
use crate::relationship::{RelationType, Relationship};

/// Minimum `len(shorter) / len(longer)` for a containment match to count.
const CONTAINMENT_RATIO: f64 = 0.5;

/// Resolves an informal name to a known entity.
///
/// Exact case-insensitive equality wins outright. Otherwise an entity matches when one name
/// contains the other and the shorter is more than half the length of the longer; among
/// those the highest ratio wins, then the closest edit distance, then input order.
#[must_use]
pub fn resolve_entity_name<'a>(name: &str, entities: &'a [Entity]) -> Option<&'a Entity> {
    resolve_among(name, entities.iter())
}

fn resolve_among<'a>(name: &str, entities: impl Iterator<Item = &'a Entity> + Clone) -> Option<&'a Entity> {
    exact_match(name, entities.clone()).or_else(|| containment_match(name, entities))
}

fn exact_match<'a>(name: &str, mut entities: impl Iterator<Item = &'a Entity>) -> Option<&'a Entity> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    entities.find(|e| e.text().to_lowercase() == needle)
}

fn containment_match<'a>(name: &str, entities: impl Iterator<Item = &'a Entity>) -> Option<&'a Entity> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    let needle_len = needle.chars().count();
    let mut best: Option<(&Entity, f64, f64)> = None;

    for entity in entities {
        let hay = entity.text().to_lowercase();
        let hay_len = hay.chars().count();
        if hay_len == 0 {
            continue;
        }
        let (shorter, longer, short_len, long_len) = if needle_len <= hay_len {
            (needle.as_str(), hay.as_str(), needle_len, hay_len)
        } else {
            (hay.as_str(), needle.as_str(), hay_len, needle_len)
        };
        if !longer.contains(shorter) {
            continue;
        }
        let ratio = short_len as f64 / long_len as f64;
        if ratio <= CONTAINMENT_RATIO {
            continue;
        }
        let similarity = strsim::normalized_levenshtein(&needle, &hay);
        let better = best.is_none_or(|(_, best_ratio, best_similarity)| {
            ratio > best_ratio || (ratio == best_ratio && similarity > best_similarity)
        });
        if better {
            best = Some((entity, ratio, similarity));
        }
    }

    best.map(|(entity, _, _)| entity)
}

/// Resolves the longest leading run of `words` that names a candidate. Exact names are tried
/// on every prefix before any containment match.
fn resolve_phrase<'a>(
    words: &[(usize, &str)],
    candidates: impl Iterator<Item = &'a Entity> + Clone,
) -> Option<&'a Entity> {
    let prefixes: Vec<String> = (1..=words.len())
        .rev()
        .map(|k| {
            let joined: Vec<&str> = words[..k].iter().map(|&(_, word)| word).collect();
            trim_name(&joined.join(" ")).to_string()
        })
        .collect();
    prefixes
        .iter()
        .find_map(|prefix| exact_match(prefix, candidates.clone()))
        .or_else(|| {
            prefixes
                .iter()
                .find_map(|prefix| containment_match(prefix, candidates.clone()))
        })
}

fn same_name(a: &Entity, b: &Entity) -> bool {
    a.text().to_lowercase() == b.text().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Base score for explicit phrase hits
    pub explicit_confidence: f64,
    /// Base score for sentence-level co-occurrence
    pub cooccurrence_confidence: f64,
    /// Base score for keyword inference inside a pair's context window
    pub inference_confidence: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            explicit_confidence: 0.75,
            cooccurrence_confidence: 0.6,
            inference_confidence: 0.45,
        }
    }
}

type TypeFilter = fn(EntityType) -> bool;

fn any_but_framework(t: EntityType) -> bool {
    t != EntityType::Framework
}

fn is_framework(t: EntityType) -> bool {
    t == EntityType::Framework
}

fn is_system(t: EntityType) -> bool {
    t.is_system()
}

fn is_data(t: EntityType) -> bool {
    t.is_data()
}

fn is_dataset(t: EntityType) -> bool {
    t == EntityType::Dataset
}

/// An explicit connector phrase: `<source entity> <connector> <free-text target>`.
struct PhrasePass {
    name: &'static str,
    relation: RelationType,
    connector: &'static str,
    source: TypeFilter,
    target: TypeFilter,
}

static PHRASE_PASSES: [PhrasePass; 3] = [
    PhrasePass {
        name: "comparison",
        relation: RelationType::Outperforms,
        connector: r"(?:significantly\s+|substantially\s+|consistently\s+|clearly\s+)?(?:outperforms|outperformed|surpasses|surpassed|beats|exceeds|exceeded|improves\s+(?:up)?on|improved\s+(?:up)?on)\s+(?:the\s+|prior\s+|previous\s+|strong\s+)*",
        source: is_system,
        target: is_system,
    },
    PhrasePass {
        name: "lineage",
        relation: RelationType::BasedOn,
        connector: r"(?:is\s+|was\s+|are\s+)?(?:based\s+on|built\s+(?:up)?on|derived\s+from|extends|inspired\s+by|a\s+variant\s+of|an\s+extension\s+of)\s+(?:the\s+)?",
        source: is_system,
        target: is_system,
    },
    PhrasePass {
        name: "implementation",
        relation: RelationType::ImplementedIn,
        connector: r"(?:is\s+|was\s+|were\s+)?(?:implemented|written|built|developed|coded)\s+(?:in|with|using|on\s+top\s+of)\s+",
        source: any_but_framework,
        target: is_framework,
    },
];

/// Free text following a connector, up to four tokens.
const TARGET_PHRASE: &str = r"(?P<target>[\w][\w\-.+]*(?:\s+[\w][\w\-.+]*){0,3})";

/// A target phrase stops after the first word ending in one of these.
const CLAUSE_END: [char; 6] = ['.', '!', '?', ',', ';', ':'];

fn phrase_regexes() -> Vec<(&'static PhrasePass, Regex)> {
    PHRASE_PASSES
        .iter()
        .filter_map(|pass| {
            match Regex::new(&format!(r"(?i)^\s+{}{TARGET_PHRASE}", pass.connector)) {
                Ok(regex) => Some((pass, regex)),
                Err(e) => {
                    tracing::warn!(pass = pass.name, "skipping heuristic phrase: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Words of a captured target phrase with their byte offsets, up to and including the first
/// word that closes a clause.
fn phrase_words(phrase: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (at, c) in phrase.char_indices().chain(std::iter::once((phrase.len(), ' '))) {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(at),
            (true, Some(from)) => {
                let word = &phrase[from..at];
                words.push((from, word));
                start = None;
                if word.ends_with(&CLAUSE_END[..]) {
                    break;
                }
            }
            _ => {}
        }
    }
    words
}

/// Keyword evidence for one relation type, with the entity types it may connect.
struct KeywordCategory {
    name: &'static str,
    relation: RelationType,
    keywords: Regex,
    source: TypeFilter,
    target: TypeFilter,
}

fn keyword_categories() -> Vec<KeywordCategory> {
    let specs: [(&'static str, RelationType, &str, TypeFilter, TypeFilter); 4] = [
        (
            "train",
            RelationType::TrainedOn,
            r"(?i)\b(?:train\w*|pre-?train\w*|fine-?tun\w*|learn\w*\s+from)",
            is_system,
            is_dataset,
        ),
        (
            "evaluate",
            RelationType::EvaluatedOn,
            r"(?i)\b(?:evaluat\w*|test\w*|benchmark\w*|accuracy|scores?\b|results?\s+on)",
            is_system,
            is_data,
        ),
        (
            "outperform",
            RelationType::Outperforms,
            r"(?i)\b(?:outperform\w*|better\s+than|surpass\w*|beats?\b|exceed\w*|improv\w*\s+(?:up)?on)",
            is_system,
            is_system,
        ),
        (
            "implement",
            RelationType::ImplementedIn,
            r"(?i)\b(?:implement\w*|written\s+in|built\s+with|code\s+base|codebase)",
            any_but_framework,
            is_framework,
        ),
    ];

    specs
        .into_iter()
        .filter_map(|(name, relation, pattern, source, target)| match Regex::new(pattern) {
            Ok(keywords) => Some(KeywordCategory {
                name,
                relation,
                keywords,
                source,
                target,
            }),
            Err(e) => {
                tracing::warn!(category = name, "skipping keyword category: {e}");
                None
            }
        })
        .collect()
}

/// Byte ranges of the sentences in `text`. A sentence ends at `.`, `!` or `?` followed by
/// whitespace, at a blank line, or at the end of the text.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        let boundary = match c {
            '.' | '!' | '?' => next.is_none_or(char::is_whitespace),
            '\n' => next == Some('\n'),
            _ => false,
        };
        if boundary {
            let end = idx + c.len_utf8();
            if !text[start..end].trim().is_empty() {
                spans.push((start, end));
            }
            start = end;
        }
    }
    if !text[start..].trim().is_empty() {
        spans.push((start, text.len()));
    }
    spans
}

/// Trims punctuation that tends to trail a captured name.
fn trim_name(candidate: &str) -> &str {
    candidate.trim_matches(|c: char| matches!(c, ',' | '.' | ';' | ':' | '(' | ')' | '"' | '\''))
}

pub struct HeuristicExtractor {
    config: HeuristicConfig,
    pairing: PairingConfig,
    scoring: ScoringWeights,
    phrases: Vec<(&'static PhrasePass, Regex)>,
    categories: Vec<KeywordCategory>,
}

impl HeuristicExtractor {
    #[must_use]
    pub fn new(config: HeuristicConfig) -> Self {
        Self {
            config,
            pairing: PairingConfig::default(),
            scoring: ScoringWeights::default(),
            phrases: phrase_regexes(),
            categories: keyword_categories(),
        }
    }

    #[must_use]
    pub const fn with_pairing(mut self, pairing: PairingConfig) -> Self {
        self.pairing = pairing;
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringWeights) -> Self {
        self.scoring = scoring;
        self
    }

    fn build(
        &self,
        source: &Entity,
        target: &Entity,
        relation: RelationType,
        inputs: ScoreInputs,
        context: &str,
        pass: &'static str,
    ) -> Option<Relationship> {
        let score = self.scoring.score(&inputs);
        match Relationship::new(source.id(), target.id(), relation, score) {
            Ok(rel) => Some(
                rel.with_context(context)
                    .with_metadata("extractor", ExtractionStrategy::Heuristic.as_str())
                    .with_metadata("pass", pass),
            ),
            Err(e) => {
                tracing::debug!(pass, "skipping heuristic match: {e}");
                None
            }
        }
    }

    fn phrase_pass(
        &self,
        pass: &PhrasePass,
        regex: &Regex,
        index: &CharIndex<'_>,
        entities: &[Entity],
        mentions: &[Vec<(usize, usize)>],
    ) -> Vec<Relationship> {
        let text = index.text();
        let mut found = Vec::new();

        for (source, source_mentions) in entities.iter().zip(mentions) {
            if !(pass.source)(source.entity_type()) {
                continue;
            }
            for &(source_start, source_end) in source_mentions {
                let tail = index.byte(source_end);
                let Some(phrase) = regex.captures(&text[tail..]).and_then(|c| c.name("target")) else {
                    continue;
                };
                let words = phrase_words(phrase.as_str());
                let Some(&(last_at, last)) = words.last() else {
                    continue;
                };
                let phrase_start = index.char_at(tail + phrase.start());
                let phrase_end = index.char_at(tail + phrase.start() + last_at + last.len());

                // spanned targets must be mentioned inside the phrase itself
                let targets = entities
                    .iter()
                    .zip(mentions)
                    .filter(|&(target, target_mentions)| {
                        target.id() != source.id()
                            && (pass.target)(target.entity_type())
                            && !same_name(source, target)
                            && (target.span().is_none()
                                || target_mentions
                                    .iter()
                                    .any(|&(at, _)| at >= phrase_start && at < phrase_end))
                    })
                    .map(|(target, _)| target);
                let Some(target) = resolve_phrase(&words, targets) else {
                    continue;
                };

                let window = self.pairing.context_window;
                let context = index.slice(
                    source_start.saturating_sub(window),
                    phrase_end.saturating_add(window),
                );
                let inputs = ScoreInputs {
                    base: self.config.explicit_confidence,
                    match_len: phrase_end - source_start,
                    context_len: context.chars().count(),
                    source_confidence: source.confidence(),
                    target_confidence: target.confidence(),
                    distance: phrase_start.saturating_sub(source_end),
                };
                found.extend(self.build(source, target, pass.relation, inputs, context, pass.name));
            }
        }
        found
    }

    fn cooccurrence_pass(
        &self,
        index: &CharIndex<'_>,
        entities: &[Entity],
        mentions: &[Vec<(usize, usize)>],
    ) -> Vec<Relationship> {
        let sentences: Vec<(usize, usize)> = sentence_spans(index.text())
            .into_iter()
            .map(|(start, end)| (index.char_at(start), index.char_at(end)))
            .collect();

        let mut present: Vec<Vec<(&Entity, usize)>> = vec![Vec::new(); sentences.len()];
        for (entity, entity_mentions) in entities.iter().zip(mentions) {
            for &(at, _) in entity_mentions {
                let Some(slot) = sentences.partition_point(|&(start, _)| start <= at).checked_sub(1)
                else {
                    continue;
                };
                if at >= sentences[slot].1 {
                    continue;
                }
                let members = &mut present[slot];
                if !members.last().is_some_and(|&(last, _)| std::ptr::eq(last, entity)) {
                    members.push((entity, at));
                }
            }
        }

        let sentence_categories: Vec<&KeywordCategory> = self
            .categories
            .iter()
            .filter(|c| matches!(c.relation, RelationType::TrainedOn | RelationType::EvaluatedOn))
            .collect();

        let mut found = Vec::new();
        for (&(start, end), members) in sentences.iter().zip(&present) {
            if members.len() < 2 {
                continue;
            }
            let sentence = index.slice(start, end);

            for category in &sentence_categories {
                if !category.keywords.is_match(sentence) {
                    continue;
                }
                for &(source, source_at) in members {
                    for &(target, target_at) in members {
                        if source.id() == target.id()
                            || same_name(source, target)
                            || !(category.source)(source.entity_type())
                            || !(category.target)(target.entity_type())
                        {
                            continue;
                        }
                        let inputs = ScoreInputs {
                            base: self.config.cooccurrence_confidence,
                            match_len: 0,
                            context_len: sentence.chars().count(),
                            source_confidence: source.confidence(),
                            target_confidence: target.confidence(),
                            distance: source_at.abs_diff(target_at),
                        };
                        found.extend(self.build(
                            source,
                            target,
                            category.relation,
                            inputs,
                            sentence.trim(),
                            "cooccurrence",
                        ));
                    }
                }
            }
        }
        found
    }

    fn inference_pass(
        &self,
        index: &CharIndex<'_>,
        entities: &[Entity],
        covered: &HashSet<(String, String)>,
    ) -> Vec<Relationship> {
        let mut found = Vec::new();

        for (source, target) in find_entity_pairs(entities, self.pairing.max_distance) {
            let key = unordered_key(source.id(), target.id());
            if covered.contains(&key) || same_name(source, target) {
                continue;
            }
            let (Some(source_span), Some(target_span)) = (source.span(), target.span()) else {
                continue;
            };
            let range = index.context_range(source_span, target_span, self.pairing.context_window);
            let context = index.slice(range.0, range.1);
            if context.is_empty() {
                continue;
            }

            for category in &self.categories {
                if !(category.source)(source.entity_type())
                    || !(category.target)(target.entity_type())
                    || !category.keywords.is_match(context)
                {
                    continue;
                }
                let inputs = ScoreInputs {
                    base: self.config.inference_confidence,
                    match_len: 0,
                    context_len: context.chars().count(),
                    source_confidence: source.confidence(),
                    target_confidence: target.confidence(),
                    distance: entity_distance(source, target).unwrap_or_default(),
                };
                found.extend(
                    self.build(source, target, category.relation, inputs, context, "inference")
                        .map(|rel| rel.with_metadata("category", category.name)),
                );
            }
        }
        found
    }
}

fn unordered_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new(HeuristicConfig::default())
    }
}

impl Extractor for HeuristicExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Heuristic
    }

    fn extract(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        if text.trim().is_empty() || entities.len() < 2 {
            return Vec::new();
        }

        let index = CharIndex::new(text);
        let mentions: Vec<Vec<(usize, usize)>> =
            entities.iter().map(|e| locate_mentions(&index, e)).collect();

        let mut found: Vec<Relationship> = self
            .phrases
            .iter()
            .flat_map(|(pass, regex)| self.phrase_pass(pass, regex, &index, entities, &mentions))
            .collect();
        found.extend(self.cooccurrence_pass(&index, entities, &mentions));

        let covered: HashSet<(String, String)> = found
            .iter()
            .map(|r| unordered_key(r.source_id(), r.target_id()))
            .collect();
        found.extend(self.inference_pass(&index, entities, &covered));

        let relationships = deduplicate_relationships(found);
        tracing::debug!(count = relationships.len(), "heuristic extraction finished");
        relationships
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(id: &str, text: &str, entity_type: EntityType) -> Entity {
        Entity::new(id, text, entity_type, 0.9).unwrap()
    }

    fn spanned(id: &str, text: &str, entity_type: EntityType, span: (usize, usize)) -> Entity {
        named(id, text, entity_type).with_span(span.0, span.1).unwrap()
    }

    #[test]
    fn test_resolve_exact_case_insensitive() {
        let entities = vec![
            named("a", "BERT-large", EntityType::Model),
            named("b", "bert", EntityType::Model),
        ];
        assert_eq!(resolve_entity_name("BERT", &entities).map(Entity::id), Some("b"));
    }

    #[test]
    fn test_resolve_containment_ratio() {
        let entities = vec![named("a", "RoBERTa-base", EntityType::Model)];
        assert_eq!(
            resolve_entity_name("RoBERTa", &entities).map(Entity::id),
            Some("a")
        );
        assert!(resolve_entity_name("Ro", &entities).is_none());
        assert!(resolve_entity_name("", &entities).is_none());
    }

    #[test]
    fn test_resolve_prefers_highest_ratio() {
        let entities = vec![
            named("long", "GPT-3 Med", EntityType::Model),
            named("short", "GPT-3 XL", EntityType::Model),
            named("distant", "GPT-3 175B model", EntityType::Model),
        ];
        assert_eq!(
            resolve_entity_name("GPT-3", &entities).map(Entity::id),
            Some("short")
        );
    }

    #[test]
    fn test_comparison_pass_uses_fuzzy_target() {
        let text = "In our runs T5-XL consistently outperforms the GPT-3 baseline on every task.";
        let entities = vec![
            named("t5", "T5-XL", EntityType::Model),
            named("gpt3", "GPT-3 baseline", EntityType::Model),
        ];
        let rels = HeuristicExtractor::default().extract(text, &entities);
        let rel = rels
            .iter()
            .find(|r| r.relation_type() == RelationType::Outperforms)
            .expect("OUTPERFORMS relationship");
        assert_eq!(rel.triple(), ("t5", "gpt3", RelationType::Outperforms));
        assert_eq!(rel.metadata()["pass"], "comparison");
    }

    #[test]
    fn test_lineage_and_implementation_passes() {
        let text = "RoBERTa is based on BERT. RoBERTa was implemented in PyTorch.";
        let entities = vec![
            named("roberta", "RoBERTa", EntityType::Model),
            named("bert", "BERT", EntityType::Model),
            named("torch", "PyTorch", EntityType::Framework),
        ];
        let rels = HeuristicExtractor::default().extract(text, &entities);
        assert!(rels
            .iter()
            .any(|r| r.triple() == ("roberta", "bert", RelationType::BasedOn)));
        assert!(rels
            .iter()
            .any(|r| r.triple() == ("roberta", "torch", RelationType::ImplementedIn)));
    }

    #[test]
    fn test_sentence_cooccurrence() {
        let text = "We pre-train ViT with ImageNet-21k. Unrelated sentence about CIFAR-10.";
        let entities = vec![
            named("vit", "ViT", EntityType::Model),
            named("in21k", "ImageNet-21k", EntityType::Dataset),
            named("cifar", "CIFAR-10", EntityType::Dataset),
        ];
        let rels = HeuristicExtractor::default().extract(text, &entities);
        assert!(rels
            .iter()
            .any(|r| r.triple() == ("vit", "in21k", RelationType::TrainedOn)));
        assert!(!rels.iter().any(|r| r.target_id() == "cifar"));
    }

    #[test]
    fn test_inference_across_sentences() {
        let text = "ResNet was strong. We report SVHN accuracy.";
        let entities = vec![
            spanned("resnet", "ResNet", EntityType::Architecture, (0, 6)),
            spanned("svhn", "SVHN", EntityType::Benchmark, (29, 33)),
        ];
        let config = HeuristicConfig::default();
        let rels = HeuristicExtractor::new(config.clone()).extract(text, &entities);
        let rel = rels
            .iter()
            .find(|r| r.triple() == ("resnet", "svhn", RelationType::EvaluatedOn))
            .expect("inferred EVALUATED_ON");
        assert_eq!(rel.metadata()["pass"], "inference");
        assert_eq!(rel.metadata()["category"], "evaluate");
        assert!(rel.confidence() < config.explicit_confidence);
    }

    /// One spanned entity per bounded occurrence of each name, ids of the form `name@start`.
    fn every_mention(text: &str, names: &[(&str, EntityType)]) -> Vec<Entity> {
        let mut entities: Vec<Entity> = names
            .iter()
            .flat_map(|&(name, entity_type)| {
                crate::extract::contract::bounded_occurrences(text, name)
                    .map(move |at| {
                        spanned(&format!("{name}@{at}"), name, entity_type, (at, at + name.len()))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        entities.sort_by_key(|e| e.start());
        entities
    }

    #[test]
    fn test_repeated_mentions_link_within_their_own_sentences() {
        let paragraph =
            "RoBERTa is based on BERT. RoBERTa was trained on BookCorpus. Later, BERT was evaluated on GLUE.";
        let text = [paragraph; 5].join(" ");
        let entities = every_mention(
            &text,
            &[
                ("RoBERTa", EntityType::Model),
                ("BERT", EntityType::Model),
                ("BookCorpus", EntityType::Dataset),
                ("GLUE", EntityType::Benchmark),
            ],
        );
        assert_eq!(entities.len(), 30);

        let rels = HeuristicExtractor::default().extract(&text, &entities);
        let text_of = |id: &str| entities.iter().find(|e| e.id() == id).map(Entity::text);
        let start_of = |id: &str| {
            entities
                .iter()
                .find(|e| e.id() == id)
                .and_then(Entity::start)
                .unwrap_or_default()
        };

        assert!(rels
            .iter()
            .all(|r| text_of(r.source_id()) != text_of(r.target_id())));

        let lineage: Vec<&Relationship> = rels
            .iter()
            .filter(|r| r.relation_type() == RelationType::BasedOn)
            .collect();
        assert_eq!(lineage.len(), 5);
        for rel in lineage {
            assert_eq!(text_of(rel.source_id()), Some("RoBERTa"));
            assert_eq!(text_of(rel.target_id()), Some("BERT"));
            assert_eq!(start_of(rel.target_id()) - start_of(rel.source_id()), 20);
        }

        let sentence_level: Vec<&Relationship> = rels
            .iter()
            .filter(|r| r.metadata()["pass"] == "cooccurrence")
            .collect();
        let trained = sentence_level
            .iter()
            .filter(|r| r.relation_type() == RelationType::TrainedOn)
            .count();
        assert_eq!(trained, 5);
        for rel in sentence_level {
            assert!(start_of(rel.source_id()).abs_diff(start_of(rel.target_id())) < 40);
        }
    }

    #[test]
    fn test_target_phrase_stops_at_sentence_end() {
        let text = "RoBERTa is based on BERT. RoBERTa was trained on BookCorpus.";
        let entities = vec![
            spanned("roberta1", "RoBERTa", EntityType::Model, (0, 7)),
            spanned("bert", "BERT", EntityType::Model, (20, 24)),
            spanned("roberta2", "RoBERTa", EntityType::Model, (26, 33)),
        ];
        let rels = HeuristicExtractor::default().extract(text, &entities);
        let lineage: Vec<(&str, &str)> = rels
            .iter()
            .filter(|r| r.relation_type() == RelationType::BasedOn)
            .map(|r| (r.source_id(), r.target_id()))
            .collect();
        assert_eq!(lineage, vec![("roberta1", "bert")]);
        assert_eq!(phrase_words("BERT. RoBERTa was").len(), 1);
    }

    #[test]
    fn test_exact_prefix_beats_longer_containment() {
        let entities = vec![
            named("xlarge", "GPT-3 XLarge", EntityType::Model),
            named("gpt3", "GPT-3", EntityType::Model),
        ];
        let words = phrase_words("GPT-3 XL");
        assert_eq!(resolve_phrase(&words, entities.iter()).map(Entity::id), Some("gpt3"));

        let words = phrase_words("GPT-3 XLarge results");
        assert_eq!(resolve_phrase(&words, entities.iter()).map(Entity::id), Some("xlarge"));
    }

    #[test]
    fn test_sentence_spans_keep_decimals() {
        let text = "Accuracy rose to 86.4 on MMLU. Then it fell!\n\nNew paragraph";
        let spans = sentence_spans(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(&text[spans[0].0..spans[0].1], "Accuracy rose to 86.4 on MMLU.");
    }

    #[test]
    fn test_empty_text() {
        let entities = vec![
            named("a", "BERT", EntityType::Model),
            named("b", "SQuAD", EntityType::Dataset),
        ];
        assert!(HeuristicExtractor::default().extract("   ", &entities).is_empty());
    }
}
