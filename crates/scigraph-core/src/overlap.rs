use std::cmp::Ordering;

use crate::entity::{Entity, EntityType};

/// Whether two half-open `[start, end)` spans share at least one character. Empty spans
/// contain no characters and never overlap anything.
#[must_use]
pub const fn spans_overlap(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < a.1 && b.0 < b.1 && a.0 < b.1 && b.0 < a.1
}

/// Ordering used to pick the survivor of an overlap cluster: higher confidence, then the
/// longer span, then the lexicographically smaller id.
fn survivor_order(a: &Entity, b: &Entity) -> Ordering {
    a.confidence()
        .total_cmp(&b.confidence())
        .then_with(|| a.span_len().cmp(&b.span_len()))
        .then_with(|| b.id().cmp(a.id()))
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Collapses every cluster of overlapping entities to its single best member.
///
/// Clusters are the connected components of the overlap relation. Entities without offsets,
/// and entities overlapping nothing, pass through untouched. Survivors keep their input order,
/// and since no two survivors overlap, running this on its own output changes nothing.
#[must_use]
pub fn merge_overlapping_entities(entities: Vec<Entity>) -> Vec<Entity> {
    let mut spanned: Vec<(usize, (usize, usize))> = entities
        .iter()
        .enumerate()
        .filter_map(|(idx, e)| e.span().map(|span| (idx, span)))
        .collect();
    spanned.sort_by_key(|&(idx, (start, end))| (start, end, idx));

    let mut sets = DisjointSet::new(entities.len());
    let mut active: Vec<(usize, (usize, usize))> = Vec::new();

    for &(idx, span) in &spanned {
        active.retain(|&(_, other)| other.1 > span.0);
        for &(other_idx, other) in &active {
            if spans_overlap(span, other) {
                sets.union(idx, other_idx);
            }
        }
        active.push((idx, span));
    }

    let mut best: Vec<Option<usize>> = vec![None; entities.len()];
    for &(idx, _) in &spanned {
        let root = sets.find(idx);
        best[root] = match best[root] {
            Some(current) if survivor_order(&entities[current], &entities[idx]).is_ge() => {
                Some(current)
            }
            _ => Some(idx),
        };
    }

    let mut keep = vec![false; entities.len()];
    for (idx, entity) in entities.iter().enumerate() {
        if entity.span().is_none() {
            keep[idx] = true;
        }
    }
    for winner in best.into_iter().flatten() {
        keep[winner] = true;
    }

    let before = entities.len();
    let merged: Vec<Entity> = entities
        .into_iter()
        .zip(keep)
        .filter_map(|(entity, kept)| kept.then_some(entity))
        .collect();

    if merged.len() < before {
        tracing::debug!(
            before,
            after = merged.len(),
            "merged overlapping entity spans"
        );
    }

    merged
}

/// Keeps entities at or above `min_confidence` whose type is in `types` (any type when `None`).
#[must_use]
pub fn filter_entities(
    entities: Vec<Entity>,
    min_confidence: f64,
    types: Option<&[EntityType]>,
) -> Vec<Entity> {
    entities
        .into_iter()
        .filter(|e| e.confidence() >= min_confidence)
        .filter(|e| types.is_none_or(|allowed| allowed.contains(&e.entity_type())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, confidence: f64, start: usize, end: usize) -> Entity {
        Entity::new(id, id, EntityType::Model, confidence)
            .unwrap()
            .with_span(start, end)
            .unwrap()
    }

    fn ids(entities: &[Entity]) -> Vec<&str> {
        entities.iter().map(Entity::id).collect()
    }

    /// Pairwise reference implementation: flood-fill clusters over all overlapping pairs.
    fn naive_merge(entities: Vec<Entity>) -> Vec<Entity> {
        let n = entities.len();
        let mut cluster: Vec<usize> = (0..n).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..n {
                for j in 0..n {
                    let (Some(a), Some(b)) = (entities[i].span(), entities[j].span()) else {
                        continue;
                    };
                    if spans_overlap(a, b) && cluster[j] > cluster[i] {
                        cluster[j] = cluster[i];
                        changed = true;
                    }
                }
            }
        }
        let keep: Vec<bool> = (0..n)
            .map(|i| {
                entities[i].span().is_none()
                    || (0..n)
                        .filter(|&j| cluster[j] == cluster[i] && entities[j].span().is_some())
                        .all(|j| j == i || survivor_order(&entities[i], &entities[j]).is_gt())
            })
            .collect();
        entities
            .into_iter()
            .zip(keep)
            .filter_map(|(e, k)| k.then_some(e))
            .collect()
    }

    #[test]
    fn test_highest_confidence_wins() {
        let merged = merge_overlapping_entities(vec![
            entity("a", 0.6, 0, 10),
            entity("b", 0.9, 5, 12),
            entity("c", 0.8, 20, 25),
        ]);
        assert_eq!(ids(&merged), vec!["b", "c"]);
    }

    #[test]
    fn test_ties_prefer_longer_span_then_id() {
        let merged = merge_overlapping_entities(vec![entity("a", 0.8, 0, 4), entity("b", 0.8, 0, 9)]);
        assert_eq!(ids(&merged), vec!["b"]);

        let merged = merge_overlapping_entities(vec![entity("z", 0.8, 0, 4), entity("y", 0.8, 2, 6)]);
        assert_eq!(ids(&merged), vec!["y"]);
    }

    #[test]
    fn test_adjacent_spans_do_not_overlap() {
        let merged = merge_overlapping_entities(vec![entity("a", 0.5, 0, 5), entity("b", 0.9, 5, 9)]);
        assert_eq!(ids(&merged), vec!["a", "b"]);
    }

    #[test]
    fn test_chained_overlaps_form_one_cluster() {
        let merged = merge_overlapping_entities(vec![
            entity("a", 0.5, 0, 5),
            entity("b", 0.6, 4, 9),
            entity("c", 0.7, 8, 12),
        ]);
        assert_eq!(ids(&merged), vec!["c"]);
    }

    #[test]
    fn test_unspanned_entities_pass_through() {
        let loose = Entity::new("loose", "ResNet", EntityType::Architecture, 0.3).unwrap();
        let merged = merge_overlapping_entities(vec![
            entity("a", 0.5, 0, 5),
            loose.clone(),
            entity("b", 0.9, 1, 3),
        ]);
        assert_eq!(ids(&merged), vec!["loose", "b"]);
        assert_eq!(merged[0], loose);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let input = vec![
            entity("a", 0.5, 0, 5),
            entity("b", 0.6, 3, 9),
            entity("c", 0.7, 20, 30),
            entity("d", 0.7, 25, 28),
            entity("e", 0.2, 40, 41),
        ];
        let once = merge_overlapping_entities(input);
        let twice = merge_overlapping_entities(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sweep_matches_pairwise_reference() {
        let input = vec![
            entity("a", 0.5, 0, 5),
            entity("b", 0.5, 2, 3),
            entity("c", 0.9, 30, 40),
            entity("d", 0.4, 6, 12),
            entity("e", 0.4, 11, 14),
            entity("f", 0.95, 13, 31),
            entity("g", 0.1, 50, 50),
            entity("h", 0.3, 45, 60),
        ];
        assert_eq!(
            merge_overlapping_entities(input.clone()),
            naive_merge(input)
        );
    }

    #[test]
    fn test_filter_identity() {
        let input = vec![entity("a", 0.1, 0, 1), entity("b", 0.0, 2, 3)];
        assert_eq!(filter_entities(input.clone(), 0.0, None), input);
    }

    #[test]
    fn test_filter_by_confidence_and_type() {
        let dataset = Entity::new("d", "ImageNet", EntityType::Dataset, 0.9).unwrap();
        let input = vec![entity("a", 0.4, 0, 1), entity("b", 0.8, 2, 3), dataset];

        let kept = filter_entities(input.clone(), 0.5, None);
        assert_eq!(ids(&kept), vec!["b", "d"]);

        let kept = filter_entities(input, 0.5, Some(&[EntityType::Dataset]));
        assert_eq!(ids(&kept), vec!["d"]);
    }
}
