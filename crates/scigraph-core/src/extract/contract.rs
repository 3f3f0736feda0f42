//! Pairing, context, filtering and scoring rules shared by every extractor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::relationship::{RelationType, Relationship};

/// Slices `text` by character offsets, clipping both ends to the text.
#[must_use]
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let byte_at = |pos: usize| {
        text.char_indices()
            .nth(pos)
            .map_or(text.len(), |(byte, _)| byte)
    };
    let start_byte = byte_at(start);
    let end_byte = byte_at(end.max(start));
    &text[start_byte..end_byte]
}

/// Converts a byte offset inside `text` to a character offset.
#[must_use]
pub fn char_offset(text: &str, byte: usize) -> usize {
    text.char_indices().take_while(|&(at, _)| at < byte).count()
}

/// Character offsets of a text, for constant-time conversion between character and byte
/// offsets.
#[derive(Debug, Clone)]
pub struct CharIndex<'t> {
    text: &'t str,
    bytes: Vec<usize>,
}

impl<'t> CharIndex<'t> {
    #[must_use]
    pub fn new(text: &'t str) -> Self {
        let mut bytes: Vec<usize> = text.char_indices().map(|(at, _)| at).collect();
        bytes.push(text.len());
        Self { text, bytes }
    }

    #[must_use]
    pub const fn text(&self) -> &'t str {
        self.text
    }

    #[must_use]
    pub fn char_len(&self) -> usize {
        self.bytes.len() - 1
    }

    /// Byte offset of character `pos`, clipped to the end of the text.
    #[must_use]
    pub fn byte(&self, pos: usize) -> usize {
        self.bytes[pos.min(self.char_len())]
    }

    /// Character offset of byte `byte`.
    #[must_use]
    pub fn char_at(&self, byte: usize) -> usize {
        self.bytes.partition_point(|&at| at < byte)
    }

    /// Slices by character offsets, clipping both ends to the text.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> &'t str {
        &self.text[self.byte(start)..self.byte(end.max(start))]
    }

    /// Character range from `window` before the earlier span to `window` after the later one.
    #[must_use]
    pub fn context_range(&self, a: (usize, usize), b: (usize, usize), window: usize) -> (usize, usize) {
        let start = a.0.min(b.0).saturating_sub(window).min(self.char_len());
        let end = a.1.max(b.1).saturating_add(window).min(self.char_len());
        (start, end.max(start))
    }
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offsets where `needle` occurs in `text` without running into a neighbouring word.
/// A boundary is only required on a side where the needle itself starts or ends with a word
/// character.
pub(crate) fn bounded_occurrences<'a>(text: &'a str, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
    let leading = needle.chars().next().is_some_and(is_word_char);
    let trailing = needle.chars().next_back().is_some_and(is_word_char);
    text.match_indices(needle)
        .map(|(at, _)| at)
        .filter(move |&at| !needle.is_empty() && is_bounded(text, at, at + needle.len(), leading, trailing))
}

fn is_bounded(text: &str, start: usize, end: usize, leading: bool, trailing: bool) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !(leading && before.is_some_and(is_word_char)) && !(trailing && after.is_some_and(is_word_char))
}

/// Where a spanned entity's text actually sits: its own span when the text there matches on
/// word boundaries, otherwise the bounded occurrence nearest to the recorded start. `None`
/// for entities without offsets or whose text never occurs.
#[must_use]
pub fn anchor_mention(index: &CharIndex<'_>, entity: &Entity) -> Option<(usize, usize)> {
    let (start, end) = entity.span()?;
    let needle = entity.text();
    if needle.is_empty() {
        return None;
    }
    let text = index.text();
    let len = needle.chars().count();
    if end <= index.char_len() && index.slice(start, end) == needle {
        let leading = needle.chars().next().is_some_and(is_word_char);
        let trailing = needle.chars().next_back().is_some_and(is_word_char);
        if is_bounded(text, index.byte(start), index.byte(end), leading, trailing) {
            return Some((start, end));
        }
    }
    bounded_occurrences(text, needle)
        .map(|byte| index.char_at(byte))
        .min_by_key(|&at| (at.abs_diff(start), at))
        .map(|at| (at, at + len))
}

/// Every place an entity is mentioned. A spanned entity has at most one mention (see
/// [`anchor_mention`]); an entity without offsets stands for every bounded occurrence of its
/// text.
#[must_use]
pub fn locate_mentions(index: &CharIndex<'_>, entity: &Entity) -> Vec<(usize, usize)> {
    if entity.span().is_some() {
        return anchor_mention(index, entity).into_iter().collect();
    }
    let len = entity.text().chars().count();
    bounded_occurrences(index.text(), entity.text())
        .map(|byte| {
            let at = index.char_at(byte);
            (at, at + len)
        })
        .collect()
}

/// Gap in characters between the nearest edges of two spanned entities; zero when the spans
/// touch or overlap. `None` if either entity has no offsets.
#[must_use]
pub fn entity_distance(a: &Entity, b: &Entity) -> Option<usize> {
    let (a_start, a_end) = a.span()?;
    let (b_start, b_end) = b.span()?;
    Some(if a_end <= b_start {
        b_start - a_end
    } else if b_end <= a_start {
        a_start - b_end
    } else {
        0
    })
}

/// Every ordered pair of spanned entities lying within `max_distance` characters of each
/// other, in both directions. Entities without offsets are skipped.
#[must_use]
pub fn find_entity_pairs(entities: &[Entity], max_distance: usize) -> Vec<(&Entity, &Entity)> {
    let mut spanned: Vec<&Entity> = entities.iter().filter(|e| e.span().is_some()).collect();
    spanned.sort_by(|a, b| {
        a.start()
            .cmp(&b.start())
            .then_with(|| a.end().cmp(&b.end()))
            .then_with(|| a.id().cmp(b.id()))
    });

    let mut pairs = Vec::new();
    for (i, &a) in spanned.iter().enumerate() {
        let a_end = a.end().unwrap_or_default();
        for &b in &spanned[i + 1..] {
            let b_start = b.start().unwrap_or_default();
            if b_start > a_end.saturating_add(max_distance) {
                break;
            }
            if entity_distance(a, b).is_some_and(|d| d <= max_distance) {
                pairs.push((a, b));
                pairs.push((b, a));
            }
        }
    }
    pairs
}

/// The text around two entities: from `window` characters before the earlier start to
/// `window` characters after the later end. Empty when either entity has no offsets.
#[must_use]
pub fn get_entity_pair_context<'t>(text: &'t str, a: &Entity, b: &Entity, window: usize) -> &'t str {
    let (Some((a_start, a_end)), Some((b_start, b_end))) = (a.span(), b.span()) else {
        return "";
    };
    let start = a_start.min(b_start).saturating_sub(window);
    let end = a_end.max(b_end).saturating_add(window);
    char_slice(text, start, end)
}

/// Keeps relationships at or above `min_confidence` whose type is in `types` (any type when
/// `None`).
#[must_use]
pub fn filter_relationships(
    relationships: Vec<Relationship>,
    min_confidence: f64,
    types: Option<&[RelationType]>,
) -> Vec<Relationship> {
    relationships
        .into_iter()
        .filter(|r| r.confidence() >= min_confidence)
        .filter(|r| types.is_none_or(|allowed| allowed.contains(&r.relation_type())))
        .collect()
}

/// Keeps the highest-confidence relationship per `(source, target, type)` triple. Each
/// survivor sits where its triple was first seen; ties keep the earlier relationship.
#[must_use]
pub fn deduplicate_relationships(relationships: Vec<Relationship>) -> Vec<Relationship> {
    let mut slots: HashMap<(String, String, RelationType), usize> = HashMap::new();
    let mut kept: Vec<Relationship> = Vec::new();

    for rel in relationships {
        let key = (
            rel.source_id().to_string(),
            rel.target_id().to_string(),
            rel.relation_type(),
        );
        match slots.get(&key) {
            Some(&slot) => {
                if rel.confidence() > kept[slot].confidence() {
                    kept[slot] = rel;
                }
            }
            None => {
                slots.insert(key, kept.len());
                kept.push(rel);
            }
        }
    }
    kept
}

/// How far apart two entities may be to be paired, and how much text around them is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    pub max_distance: usize,
    pub context_window: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            max_distance: 100,
            context_window: 50,
        }
    }
}

/// Weights of the shared confidence formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Added in proportion to how much of the context the match covers
    pub span_weight: f64,
    /// Pairs at most this many characters apart get `near_bonus`
    pub near_distance: usize,
    pub near_bonus: f64,
    /// Pairs more than this many characters apart lose `far_penalty`
    pub far_distance: usize,
    pub far_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            span_weight: 0.2,
            near_distance: 20,
            near_bonus: 0.1,
            far_distance: 100,
            far_penalty: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
    pub base: f64,
    pub match_len: usize,
    pub context_len: usize,
    pub source_confidence: f64,
    pub target_confidence: f64,
    pub distance: usize,
}

impl ScoringWeights {
    #[must_use]
    pub fn score(&self, inputs: &ScoreInputs) -> f64 {
        let coverage = if inputs.context_len == 0 {
            0.0
        } else {
            (inputs.match_len as f64 / inputs.context_len as f64).min(1.0)
        };

        let mut score = inputs.base + self.span_weight * coverage;
        score *= (inputs.source_confidence + inputs.target_confidence) / 2.0;

        if inputs.distance <= self.near_distance {
            score += self.near_bonus;
        } else if inputs.distance > self.far_distance {
            score -= self.far_penalty;
        }

        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;

    fn entity(id: &str, start: usize, end: usize) -> Entity {
        Entity::new(id, id, EntityType::Model, 0.9)
            .unwrap()
            .with_span(start, end)
            .unwrap()
    }

    #[test]
    fn test_pairs_include_both_directions() {
        let entities = vec![entity("a", 0, 5), entity("b", 10, 15), entity("c", 200, 210)];
        let pairs = find_entity_pairs(&entities, 20);
        let ids: Vec<(&str, &str)> = pairs.iter().map(|(a, b)| (a.id(), b.id())).collect();
        assert_eq!(ids, vec![("a", "b"), ("b", "a")]);
    }

    #[test]
    fn test_pairs_skip_unspanned() {
        let loose = Entity::new("x", "x", EntityType::Model, 0.9).unwrap();
        let entities = vec![entity("a", 0, 5), loose, entity("b", 6, 8)];
        assert_eq!(find_entity_pairs(&entities, 100).len(), 2);
    }

    #[test]
    fn test_pairs_cover_every_pair_in_range() {
        let entities = vec![
            entity("c", 40, 45),
            entity("a", 0, 5),
            entity("b", 8, 12),
            entity("d", 44, 60),
        ];
        let pairs = find_entity_pairs(&entities, 30);
        for (a, b) in &pairs {
            assert!(pairs.iter().any(|(x, y)| x.id() == b.id() && y.id() == a.id()));
        }
        let mut ids: Vec<(&str, &str)> = pairs.iter().map(|(a, b)| (a.id(), b.id())).collect();
        ids.sort_unstable();
        assert_eq!(
            ids,
            vec![
                ("a", "b"),
                ("b", "a"),
                ("b", "c"),
                ("c", "b"),
                ("c", "d"),
                ("d", "c"),
            ]
        );
    }

    #[test]
    fn test_context_is_symmetric_and_clipped() {
        let text = "GPT-4 was evaluated on MMLU";
        let a = entity("a", 0, 5);
        let b = entity("b", 23, 27);
        assert_eq!(get_entity_pair_context(text, &a, &b, 50), text);
        assert_eq!(
            get_entity_pair_context(text, &a, &b, 2),
            get_entity_pair_context(text, &b, &a, 2)
        );

        let c = entity("c", 10, 12);
        assert_eq!(get_entity_pair_context(text, &c, &b, 1), " evaluated on MMLU");
    }

    #[test]
    fn test_char_slice_handles_multibyte() {
        let text = "naïve Transformer";
        assert_eq!(char_slice(text, 0, 5), "naïve");
        assert_eq!(char_slice(text, 6, 100), "Transformer");
        assert_eq!(char_offset(text, text.find('T').unwrap()), 6);
    }

    #[test]
    fn test_char_index_matches_char_helpers() {
        let text = "naïve Transformer über alles";
        let index = CharIndex::new(text);
        assert_eq!(index.char_len(), text.chars().count());
        assert_eq!(index.slice(6, 17), char_slice(text, 6, 17));
        assert_eq!(index.slice(20, 500), char_slice(text, 20, 500));
        let byte = text.find('ü').unwrap();
        assert_eq!(index.char_at(byte), char_offset(text, byte));
        assert_eq!(index.context_range((6, 17), (0, 5), 2), (0, 19));
    }

    #[test]
    fn test_bounded_occurrences_skip_embedded_text() {
        let text = "RoBERTa extends BERT; BERT-large too";
        let hits: Vec<usize> = bounded_occurrences(text, "BERT").collect();
        assert_eq!(hits, vec![16, 22]);
        assert_eq!(bounded_occurrences(text, "").count(), 0);
    }

    #[test]
    fn test_anchor_prefers_own_span_then_nearest_occurrence() {
        let text = "BERT is small. Later, BERT was evaluated on GLUE.";
        let index = CharIndex::new(text);
        let named = |start, end| {
            Entity::new("b", "BERT", EntityType::Model, 0.9)
                .unwrap()
                .with_span(start, end)
                .unwrap()
        };

        assert_eq!(anchor_mention(&index, &named(22, 26)), Some((22, 26)));
        // a recorded span that is off by a few characters snaps to the closest mention
        assert_eq!(anchor_mention(&index, &named(20, 24)), Some((22, 26)));
        assert_eq!(anchor_mention(&index, &named(1, 5)), Some((0, 4)));

        let loose = Entity::new("l", "BERT", EntityType::Model, 0.9).unwrap();
        assert_eq!(anchor_mention(&index, &loose), None);
        assert_eq!(locate_mentions(&index, &loose), vec![(0, 4), (22, 26)]);
    }

    #[test]
    fn test_dedup_keeps_best_per_triple() {
        let rels = vec![
            Relationship::new("a", "b", RelationType::TrainedOn, 0.6).unwrap(),
            Relationship::new("a", "b", RelationType::EvaluatedOn, 0.5).unwrap(),
            Relationship::new("a", "b", RelationType::TrainedOn, 0.8).unwrap(),
        ];
        let kept = deduplicate_relationships(rels);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].relation_type(), RelationType::TrainedOn);
        assert!((kept[0].confidence() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_filter_relationships_identity() {
        let rels = vec![
            Relationship::new("a", "b", RelationType::TrainedOn, 0.0).unwrap(),
            Relationship::new("b", "c", RelationType::Uses, 0.4).unwrap(),
        ];
        assert_eq!(filter_relationships(rels.clone(), 0.0, None), rels);
        assert_eq!(
            filter_relationships(rels, 0.1, Some(&[RelationType::Uses])).len(),
            1
        );
    }

    #[test]
    fn test_score_is_clamped_and_distance_sensitive() {
        let weights = ScoringWeights::default();
        let near = ScoreInputs {
            base: 0.7,
            match_len: 27,
            context_len: 27,
            source_confidence: 0.95,
            target_confidence: 0.9,
            distance: 15,
        };
        let far = ScoreInputs {
            distance: 150,
            ..near
        };
        let huge = ScoreInputs {
            base: 5.0,
            ..near
        };
        assert!(weights.score(&near) > weights.score(&far));
        assert!(weights.score(&near) >= 0.7);
        assert!((weights.score(&huge) - 1.0).abs() < f64::EPSILON);
    }
}
