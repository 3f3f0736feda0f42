use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::contract::{
    anchor_mention, deduplicate_relationships, entity_distance, find_entity_pairs, is_word_char,
    CharIndex, PairingConfig, ScoreInputs, ScoringWeights,
};
use super::{ExtractionStrategy, Extractor};
use crate::entity::{Entity, EntityType};
use crate::relationship::{RelationType, Relationship};
use crate::{Error, Result};

const SOURCE: &str = "{source}";
const TARGET: &str = "{target}";

// Private-use characters standing in for the pair's own mentions inside a context.
const SOURCE_MARK: char = '\u{E000}';
const TARGET_MARK: char = '\u{E001}';

fn default_templates() -> BTreeMap<RelationType, Vec<&'static str>> {
    BTreeMap::from([
        (
            RelationType::TrainedOn,
            vec![
                r"{source}\s+(?:was\s+|is\s+|were\s+|are\s+|has\s+been\s+)?(?:pre-?trained|trained|learned)\s+(?:\w+\s+){0,3}?on\s+(?:the\s+)?{target}",
                r"(?:train|trained|training)\s+{source}\s+on\s+(?:the\s+)?{target}",
                r"{target}\s+(?:was|is)\s+used\s+(?:to|for)\s+(?:pre-?)?train(?:ing)?\s+{source}",
            ],
        ),
        (
            RelationType::EvaluatedOn,
            vec![
                r"{source}\s+(?:was\s+|is\s+|were\s+|are\s+|has\s+been\s+)?(?:evaluated|tested|benchmarked|assessed|validated)\s+(?:\w+\s+){0,3}?on\s+(?:the\s+)?{target}",
                r"(?:evaluate|evaluating|evaluation\s+of|test|testing)\s+{source}\s+on\s+(?:the\s+)?{target}",
                r"{source}(?:'s)?\s+(?:results|performance|accuracy|score)\s+on\s+(?:the\s+)?{target}",
            ],
        ),
        (
            RelationType::Outperforms,
            vec![
                r"{source}\s+(?:significantly\s+|substantially\s+|consistently\s+|clearly\s+)?(?:outperforms|outperformed|surpasses|surpassed|beats|beat|exceeds|exceeded)\s+(?:the\s+)?{target}",
                r"{source}\s+(?:is|was|performs|performed)\s+(?:\w+\s+)?better\s+than\s+{target}",
            ],
        ),
        (
            RelationType::ComparedWith,
            vec![r"{source}\s+(?:is\s+|was\s+)?(?:compared|comparable)\s+(?:with|to|against)\s+{target}"],
        ),
        (
            RelationType::BasedOn,
            vec![
                r"{source}\s+(?:is|was|are)\s+(?:\w+\s+)?(?:based|built)\s+(?:on|upon)\s+(?:the\s+)?{target}",
                r"{source}\s+(?:extends|builds\s+on|derives\s+from|is\s+derived\s+from|adapts)\s+(?:the\s+)?{target}",
            ],
        ),
        (
            RelationType::FineTunedFrom,
            vec![
                r"{source}\s+(?:is|was)\s+(?:a\s+)?fine-?tuned\s+(?:version\s+of|from)\s+{target}",
                r"fine-?tun(?:e|ed|ing)\s+{target}\s+(?:to\s+(?:obtain|produce|create)|into)\s+{source}",
            ],
        ),
        (
            RelationType::IsA,
            vec![r"{source}\s+(?:is|was)\s+an?\s+(?:\w+\s+){0,2}?{target}"],
        ),
        (
            RelationType::PartOf,
            vec![r"{source}\s+(?:is|was)\s+(?:a\s+)?(?:part|component|subset|module|split)\s+of\s+(?:the\s+)?{target}"],
        ),
        (
            RelationType::ImplementedIn,
            vec![
                r"{source}\s+(?:is\s+|was\s+|were\s+)?(?:implemented|written|built|developed)\s+(?:in|with|using)\s+{target}",
                r"{target}\s+implementation\s+of\s+{source}",
            ],
        ),
        (
            RelationType::Uses,
            vec![r"{source}\s+(?:uses|used|employs|utilizes|leverages|adopts)\s+(?:the\s+|a\s+|an\s+)?{target}"],
        ),
        (
            RelationType::Achieves,
            vec![
                r"{source}\s+(?:achieves|achieved|attains|attained|reaches|reached|obtains|obtained|scores|scored)\s+(?:an?\s+|the\s+)?(?:\w+\s+){0,2}?(?P<value>\d+(?:\.\d+)?)\s*%?\s*(?:\w+\s+){0,2}?{target}",
                r"{source}\s+(?:achieves|achieved|attains|reaches|obtains)\s+(?:an?\s+|the\s+)?(?:\w+\s+){0,2}?{target}\s+(?:of\s+)?(?P<value>\d+(?:\.\d+)?)",
            ],
        ),
        (
            RelationType::DevelopedBy,
            vec![
                r"{source}\s+(?:was|is)\s+(?:developed|created|released|introduced|proposed|built)\s+by\s+{target}",
                r"{target}\s+(?:developed|created|released|introduced|built)\s+{source}",
                r"{target}'s\s+{source}",
            ],
        ),
    ])
}

fn default_type_pairs() -> BTreeMap<(EntityType, EntityType), Vec<RelationType>> {
    use EntityType as E;
    use RelationType as R;

    BTreeMap::from([
        ((E::Model, E::Dataset), vec![R::TrainedOn, R::EvaluatedOn]),
        ((E::Model, E::Benchmark), vec![R::EvaluatedOn]),
        ((E::Model, E::Metric), vec![R::Achieves]),
        (
            (E::Model, E::Model),
            vec![R::Outperforms, R::FineTunedFrom, R::BasedOn, R::ComparedWith],
        ),
        ((E::Model, E::Architecture), vec![R::BasedOn, R::IsA, R::Uses]),
        ((E::Model, E::Method), vec![R::Uses, R::BasedOn]),
        ((E::Model, E::Framework), vec![R::ImplementedIn, R::Uses]),
        ((E::Model, E::Organization), vec![R::DevelopedBy]),
        ((E::Model, E::Hardware), vec![R::TrainedOn, R::Uses]),
        (
            (E::Architecture, E::Architecture),
            vec![R::Outperforms, R::BasedOn, R::IsA, R::PartOf],
        ),
        ((E::Architecture, E::Dataset), vec![R::TrainedOn, R::EvaluatedOn]),
        ((E::Architecture, E::Benchmark), vec![R::EvaluatedOn]),
        ((E::Architecture, E::Framework), vec![R::ImplementedIn]),
        ((E::Architecture, E::Organization), vec![R::DevelopedBy]),
        ((E::Method, E::Method), vec![R::Outperforms, R::BasedOn, R::PartOf]),
        ((E::Method, E::Model), vec![R::Outperforms, R::BasedOn]),
        ((E::Method, E::Dataset), vec![R::TrainedOn, R::EvaluatedOn]),
        ((E::Method, E::Benchmark), vec![R::EvaluatedOn]),
        ((E::Method, E::Metric), vec![R::Achieves]),
        ((E::Method, E::Framework), vec![R::ImplementedIn]),
        ((E::Framework, E::Organization), vec![R::DevelopedBy]),
        ((E::Dataset, E::Organization), vec![R::DevelopedBy]),
        ((E::Benchmark, E::Organization), vec![R::DevelopedBy]),
        ((E::Dataset, E::Dataset), vec![R::PartOf, R::BasedOn]),
        ((E::Benchmark, E::Dataset), vec![R::PartOf, R::BasedOn]),
    ])
}

/// Checks that a template carries both placeholders and compiles.
pub fn validate_template(template: &str) -> Result<()> {
    CompiledTemplate::compile(template).map(|_| ())
}

/// Escapes `text` for use in a regex, anchored on word boundaries where the text itself
/// starts or ends with a word character.
pub(crate) fn bounded_literal(text: &str) -> String {
    let mut pattern = String::new();
    if text.chars().next().is_some_and(is_word_char) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(text));
    if text.chars().next_back().is_some_and(is_word_char) {
        pattern.push_str(r"\b");
    }
    pattern
}

/// A template compiled once, with `{source}` and `{target}` bound to the marks that replace
/// the pair's mentions in a masked context.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    template: String,
    regex: Regex,
}

impl CompiledTemplate {
    fn compile(template: &str) -> Result<Self> {
        if !template.contains(SOURCE) || !template.contains(TARGET) {
            return Err(Error::InvalidConfig(format!(
                "template '{template}' must contain both {SOURCE} and {TARGET}"
            )));
        }
        let filled = template
            .replace(SOURCE, &SOURCE_MARK.to_string())
            .replace(TARGET, &TARGET_MARK.to_string());
        let regex = Regex::new(&format!("(?i){filled}")).map_err(|source| Error::InvalidPattern {
            template: template.to_string(),
            source,
        })?;
        Ok(Self {
            template: template.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }
}

/// The context between `range` with the source and target mentions each replaced by a
/// single mark. Mentions must not overlap and must lie inside `range`.
fn masked_context(
    index: &CharIndex<'_>,
    range: (usize, usize),
    source: (usize, usize),
    target: (usize, usize),
) -> String {
    let mut marks = [(source, SOURCE_MARK), (target, TARGET_MARK)];
    marks.sort_by_key(|&((start, _), _)| start);

    let mut masked = String::new();
    let mut pos = range.0;
    for ((start, end), mark) in marks {
        masked.push_str(index.slice(pos, start));
        masked.push(mark);
        pos = end;
    }
    masked.push_str(index.slice(pos, range.1));
    masked
}

/// Relation templates and the entity-type pairs they apply to. Built once, then shared
/// read-only by every extraction.
#[derive(Debug, Clone)]
pub struct PatternTable {
    templates: BTreeMap<RelationType, Vec<CompiledTemplate>>,
    type_pairs: BTreeMap<(EntityType, EntityType), Vec<RelationType>>,
    fallback_to_all_types: bool,
}

impl Default for PatternTable {
    fn default() -> Self {
        let table = Self {
            templates: BTreeMap::new(),
            type_pairs: default_type_pairs(),
            fallback_to_all_types: true,
        };
        default_templates()
            .into_iter()
            .fold(table, |table, (relation, list)| table.with_templates(relation, list))
    }
}

impl PatternTable {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
            type_pairs: BTreeMap::new(),
            fallback_to_all_types: true,
        }
    }

    #[must_use]
    pub fn from_config(config: &PatternConfig) -> Self {
        let mut table = Self::default();
        table.fallback_to_all_types = config.fallback_to_all_types;
        for (relation, templates) in &config.custom_templates {
            table = table.with_templates(*relation, templates.iter().map(String::as_str));
        }
        for (pair, relations) in &config.extra_type_pairs {
            table = table.with_type_pair(pair.0, pair.1, relations.clone());
        }
        table
    }

    /// Appends templates for `relation`. Malformed templates are logged and skipped.
    #[must_use]
    pub fn with_templates<'a>(
        mut self,
        relation: RelationType,
        templates: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        for template in templates {
            match CompiledTemplate::compile(template) {
                Ok(compiled) => self.templates.entry(relation).or_default().push(compiled),
                Err(e) => tracing::warn!(%relation, "skipping pattern template: {e}"),
            }
        }
        self
    }

    #[must_use]
    pub fn with_type_pair(
        mut self,
        source: EntityType,
        target: EntityType,
        relations: Vec<RelationType>,
    ) -> Self {
        self.type_pairs.insert((source, target), relations);
        self
    }

    #[must_use]
    pub const fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_all_types = enabled;
        self
    }

    #[must_use]
    pub fn templates_for(&self, relation: RelationType) -> &[CompiledTemplate] {
        self.templates.get(&relation).map_or(&[], Vec::as_slice)
    }

    /// Relation types to try for a source/target type pair. Unmapped pairs try every type
    /// with templates unless the fallback is disabled.
    #[must_use]
    pub fn candidates(&self, source: EntityType, target: EntityType) -> Vec<RelationType> {
        match self.type_pairs.get(&(source, target)) {
            Some(relations) => relations.clone(),
            None if self.fallback_to_all_types => self.templates.keys().copied().collect(),
            None => Vec::new(),
        }
    }

    #[must_use]
    pub fn template_count(&self) -> usize {
        self.templates.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Starting score for a template hit, before the shared adjustments
    pub base_confidence: f64,
    /// Try every relation type for entity-type pairs with no mapping
    pub fallback_to_all_types: bool,
    /// Extra templates per relation type, appended after the built-in ones
    pub custom_templates: BTreeMap<RelationType, Vec<String>>,
    /// Extra or replacement (source type, target type) → relation type mappings
    pub extra_type_pairs: Vec<((EntityType, EntityType), Vec<RelationType>)>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            base_confidence: 0.7,
            fallback_to_all_types: true,
            custom_templates: BTreeMap::new(),
            extra_type_pairs: Vec::new(),
        }
    }
}

pub struct PatternExtractor {
    table: PatternTable,
    pairing: PairingConfig,
    scoring: ScoringWeights,
    base_confidence: f64,
}

impl PatternExtractor {
    #[must_use]
    pub fn new(table: PatternTable) -> Self {
        Self {
            table,
            pairing: PairingConfig::default(),
            scoring: ScoringWeights::default(),
            base_confidence: PatternConfig::default().base_confidence,
        }
    }

    #[must_use]
    pub fn from_config(config: &PatternConfig, pairing: PairingConfig, scoring: ScoringWeights) -> Self {
        Self {
            table: PatternTable::from_config(config),
            pairing,
            scoring,
            base_confidence: config.base_confidence,
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

    #[must_use]
    pub const fn table(&self) -> &PatternTable {
        &self.table
    }

    fn match_pair(&self, index: &CharIndex<'_>, source: &Entity, target: &Entity) -> Vec<Relationship> {
        let (Some(source_at), Some(target_at)) =
            (anchor_mention(index, source), anchor_mention(index, target))
        else {
            return Vec::new();
        };
        if source_at.0 < target_at.1 && target_at.0 < source_at.1 {
            return Vec::new();
        }

        let range = index.context_range(source_at, target_at, self.pairing.context_window);
        let context = index.slice(range.0, range.1);
        let masked = masked_context(index, range, source_at, target_at);
        let context_len = context.chars().count();
        let distance = entity_distance(source, target).unwrap_or_default();

        let mut found = Vec::new();
        for relation in self.table.candidates(source.entity_type(), target.entity_type()) {
            for template in self.table.templates_for(relation) {
                let Some(captures) = template.regex.captures(&masked) else {
                    continue;
                };

                // a mark covers a whole mention, so count the mention's own length
                let matched = captures.get(0).map_or(0, |m| {
                    m.as_str()
                        .chars()
                        .map(|c| match c {
                            SOURCE_MARK => source_at.1 - source_at.0,
                            TARGET_MARK => target_at.1 - target_at.0,
                            _ => 1,
                        })
                        .sum::<usize>()
                });
                let score = self.scoring.score(&ScoreInputs {
                    base: self.base_confidence,
                    match_len: matched,
                    context_len,
                    source_confidence: source.confidence(),
                    target_confidence: target.confidence(),
                    distance,
                });

                let rel = match Relationship::new(source.id(), target.id(), relation, score) {
                    Ok(rel) => rel,
                    Err(e) => {
                        tracing::debug!("skipping pattern match: {e}");
                        break;
                    }
                };

                let mut rel = rel
                    .with_context(context)
                    .with_metadata("extractor", ExtractionStrategy::Pattern.as_str())
                    .with_metadata("template", template.as_str());
                for name in template.regex.capture_names().flatten() {
                    let value = captures
                        .name(name)
                        .and_then(|m| m.as_str().parse::<f64>().ok());
                    if let Some(value) = value {
                        rel = rel.with_metadata(name, value);
                    }
                }

                found.push(rel);
                break;
            }
        }
        found
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new(PatternTable::default())
    }
}

impl Extractor for PatternExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Pattern
    }

    fn extract(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        if text.trim().is_empty() || entities.len() < 2 {
            return Vec::new();
        }

        let index = CharIndex::new(text);
        let found: Vec<Relationship> = find_entity_pairs(entities, self.pairing.max_distance)
            .into_iter()
            .flat_map(|(source, target)| self.match_pair(&index, source, target))
            .collect();

        let relationships = deduplicate_relationships(found);
        tracing::debug!(count = relationships.len(), "pattern extraction finished");
        relationships
    }
}
