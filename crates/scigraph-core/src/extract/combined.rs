use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Deserializer, Serialize};

use super::{ExtractionStrategy, Extractor, HeuristicExtractor, PatternExtractor};
use crate::entity::Entity;
use crate::relationship::{RelationType, Relationship};

fn default_priorities() -> BTreeMap<RelationType, i32> {
    use RelationType::{
        Achieves, BasedOn, ComparedWith, DevelopedBy, EvaluatedOn, FineTunedFrom, ImplementedIn,
        IsA, Outperforms, PartOf, TrainedOn, Uses,
    };
    BTreeMap::from([
        (FineTunedFrom, 10),
        (TrainedOn, 9),
        (BasedOn, 8),
        (EvaluatedOn, 8),
        (Outperforms, 7),
        (Achieves, 7),
        (ImplementedIn, 6),
        (Uses, 5),
        (DevelopedBy, 5),
        (IsA, 4),
        (PartOf, 4),
        (ComparedWith, 3),
    ])
}

/// Configured priorities layered over the defaults, so a partial table only changes the
/// types it names.
fn merge_priorities<'de, D>(deserializer: D) -> Result<BTreeMap<RelationType, i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = BTreeMap::<RelationType, i32>::deserialize(deserializer)?;
    let mut priorities = default_priorities();
    priorities.extend(configured);
    Ok(priorities)
}

/// Settings for picking survivors when several relation types connect the same ordered pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Higher wins; types missing from the table rank as 0. Loaded entries override the
    /// default for their type and leave the rest in place.
    #[serde(deserialize_with = "merge_priorities")]
    pub priorities: BTreeMap<RelationType, i32>,
    /// Types that may legitimately hold together for one pair
    pub compatible_pairs: Vec<(RelationType, RelationType)>,
    /// A winner below this confidence lets the runner-up survive too
    pub low_confidence_threshold: f64,
    pub runner_up_min_confidence: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            priorities: default_priorities(),
            compatible_pairs: vec![
                (RelationType::TrainedOn, RelationType::EvaluatedOn),
                (RelationType::Uses, RelationType::ImplementedIn),
                (RelationType::IsA, RelationType::PartOf),
            ],
            low_confidence_threshold: 0.7,
            runner_up_min_confidence: 0.6,
        }
    }
}

impl ResolutionConfig {
    #[must_use]
    pub fn priority(&self, relation_type: RelationType) -> i32 {
        self.priorities.get(&relation_type).copied().unwrap_or(0)
    }

    fn compatible(&self, a: RelationType, b: RelationType) -> bool {
        self.compatible_pairs
            .iter()
            .any(|&(x, y)| (x, y) == (a, b) || (x, y) == (b, a))
    }
}

/// Best relationship of one relation type within a pair group.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    relation_type: RelationType,
    index: usize,
    confidence: f64,
    first_seen: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    config: ResolutionConfig,
}

impl ConflictResolver {
    #[must_use]
    pub const fn new(config: ResolutionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Resolves conflicts independently for every ordered `(source, target)` pair.
    ///
    /// Survivors are returned in input order, so the same input always yields the same
    /// output.
    #[must_use]
    pub fn resolve(&self, relationships: Vec<Relationship>) -> Vec<Relationship> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut group_of: HashMap<(&str, &str), usize> = HashMap::new();

        for (idx, rel) in relationships.iter().enumerate() {
            let key = (rel.source_id(), rel.target_id());
            let slot = *group_of.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(idx);
        }

        let mut keep = vec![false; relationships.len()];
        for group in &groups {
            for idx in self.resolve_group(&relationships, group) {
                keep[idx] = true;
            }
        }

        let before = relationships.len();
        let resolved: Vec<Relationship> = relationships
            .into_iter()
            .zip(keep)
            .filter_map(|(rel, kept)| kept.then_some(rel))
            .collect();

        tracing::debug!(
            before,
            after = resolved.len(),
            pairs = groups.len(),
            "resolved relationship conflicts"
        );
        resolved
    }

    fn resolve_group(&self, relationships: &[Relationship], group: &[usize]) -> Vec<usize> {
        let mut candidates: Vec<Candidate> = Vec::new();
        for (position, &idx) in group.iter().enumerate() {
            let rel = &relationships[idx];
            match candidates
                .iter_mut()
                .find(|c| c.relation_type == rel.relation_type())
            {
                Some(current) => {
                    if rel.confidence() > current.confidence {
                        current.index = idx;
                        current.confidence = rel.confidence();
                    }
                }
                None => candidates.push(Candidate {
                    relation_type: rel.relation_type(),
                    index: idx,
                    confidence: rel.confidence(),
                    first_seen: position,
                }),
            }
        }

        if candidates.len() <= 1 {
            return candidates.iter().map(|c| c.index).collect();
        }

        let mut kept = Vec::new();
        for &(a, b) in &self.config.compatible_pairs {
            let pos_a = candidates.iter().position(|c| c.relation_type == a);
            let pos_b = candidates.iter().position(|c| c.relation_type == b);
            if let (Some(pos_a), Some(pos_b)) = (pos_a, pos_b) {
                if pos_a == pos_b {
                    continue;
                }
                kept.push(candidates[pos_a].index);
                kept.push(candidates[pos_b].index);
                let (hi, lo) = (pos_a.max(pos_b), pos_a.min(pos_b));
                candidates.remove(hi);
                candidates.remove(lo);
            }
        }

        candidates.sort_by(|x, y| {
            self.config
                .priority(y.relation_type)
                .cmp(&self.config.priority(x.relation_type))
                .then_with(|| y.confidence.total_cmp(&x.confidence))
                .then_with(|| x.first_seen.cmp(&y.first_seen))
        });

        if let Some(top) = candidates.first() {
            kept.push(top.index);
            if let Some(runner_up) = candidates.get(1) {
                if top.confidence < self.config.low_confidence_threshold
                    && runner_up.confidence > self.config.runner_up_min_confidence
                {
                    kept.push(runner_up.index);
                }
            }
        }
        kept
    }

    /// Whether two relation types are configured to coexist on one pair.
    #[must_use]
    pub fn are_compatible(&self, a: RelationType, b: RelationType) -> bool {
        self.config.compatible(a, b)
    }
}

/// Runs several extractors over the same input and reconciles what they find.
pub struct CombinedExtractor {
    extractors: Vec<Box<dyn Extractor>>,
    resolver: ConflictResolver,
    parallel: bool,
}

impl CombinedExtractor {
    /// An empty combination; add extractors with [`Self::with_extractor`].
    #[must_use]
    pub fn new(resolver: ConflictResolver) -> Self {
        Self {
            extractors: Vec::new(),
            resolver,
            parallel: false,
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn add_extractor(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// Run sub-extractors on scoped threads. Output order does not change.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn extractor_count(&self) -> usize {
        self.extractors.len()
    }

    #[must_use]
    pub const fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    fn run_all(&self, text: &str, entities: &[Entity]) -> Vec<Vec<Relationship>> {
        if !self.parallel || self.extractors.len() < 2 {
            return self
                .extractors
                .iter()
                .map(|extractor| extractor.extract(text, entities))
                .collect();
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .extractors
                .iter()
                .map(|extractor| scope.spawn(move || extractor.extract(text, entities)))
                .collect();
            handles
                .into_iter()
                .zip(&self.extractors)
                .map(|(handle, extractor)| {
                    handle.join().unwrap_or_else(|_| {
                        tracing::warn!(
                            strategy = %extractor.strategy(),
                            "extractor panicked; its results are discarded"
                        );
                        Vec::new()
                    })
                })
                .collect()
        })
    }
}

impl Default for CombinedExtractor {
    fn default() -> Self {
        Self::new(ConflictResolver::default())
            .with_extractor(Box::new(PatternExtractor::default()))
            .with_extractor(Box::new(HeuristicExtractor::default()))
    }
}

impl Extractor for CombinedExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Combined
    }

    fn extract(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        let runs = self.run_all(text, entities);
        for (extractor, found) in self.extractors.iter().zip(&runs) {
            tracing::debug!(
                strategy = %extractor.strategy(),
                count = found.len(),
                "sub-extractor finished"
            );
        }
        self.resolver.resolve(runs.into_iter().flatten().collect())
    }
}

/// How many relationships touch each entity, as source or target.
#[must_use]
pub fn connection_counts(relationships: &[Relationship]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for rel in relationships {
        *counts.entry(rel.source_id().to_string()).or_insert(0) += 1;
        *counts.entry(rel.target_id().to_string()).or_insert(0) += 1;
    }
    counts
}

/// The `n` most connected entity ids, most connected first; ties by id.
#[must_use]
pub fn top_connected(relationships: &[Relationship], n: usize) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = connection_counts(relationships).into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Entity ids reachable from `start` within `max_depth` hops, ignoring edge direction, in
/// breadth-first order. `start` itself is not included.
#[must_use]
pub fn connected_entities(relationships: &[Relationship], start: &str, max_depth: usize) -> Vec<String> {
    let mut neighbors: HashMap<&str, Vec<&str>> = HashMap::new();
    for rel in relationships {
        neighbors.entry(rel.source_id()).or_default().push(rel.target_id());
        neighbors.entry(rel.target_id()).or_default().push(rel.source_id());
    }

    let mut seen: HashSet<&str> = HashSet::from([start]);
    let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(start, 0)]);
    let mut found = Vec::new();

    while let Some((node, depth)) = queue.pop_front() {
        if depth == max_depth {
            continue;
        }
        for &next in neighbors.get(node).into_iter().flatten() {
            if seen.insert(next) {
                found.push(next.to_string());
                queue.push_back((next, depth + 1));
            }
        }
    }
    found
}

/// Relationships grouped by source entity id, each group in input order.
#[must_use]
pub fn group_by_source(relationships: &[Relationship]) -> BTreeMap<&str, Vec<&Relationship>> {
    let mut groups: BTreeMap<&str, Vec<&Relationship>> = BTreeMap::new();
    for rel in relationships {
        groups.entry(rel.source_id()).or_default().push(rel);
    }
    groups
}
