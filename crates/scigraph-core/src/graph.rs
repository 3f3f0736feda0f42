//! Knowledge graph assembled from a document's final entities and relationships.
//!
//! The graph keeps nodes and edges in insertion order and builds a `petgraph` view only when
//! a traversal needs one. On disk both are JSON objects keyed by id, in the same order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use petgraph::algo::{astar, is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entity::{Entity, EntityType};
use crate::error::{check_confidence, Error, Result};
use crate::relationship::{RelationType, Relationship};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Serialized as the node's key in the graph
    #[serde(skip)]
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f64,
}

impl From<&Entity> for GraphNode {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id().to_string(),
            text: entity.text().to_string(),
            entity_type: entity.entity_type(),
            confidence: entity.confidence(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(skip)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub confidence: f64,
}

impl From<&Relationship> for GraphEdge {
    fn from(rel: &Relationship) -> Self {
        Self {
            id: rel.id().to_string(),
            source: rel.source_id().to_string(),
            target: rel.target_id().to_string(),
            relation_type: rel.relation_type(),
            confidence: rel.confidence(),
        }
    }
}

/// Graph members whose id is written as a map key rather than inside the attributes.
trait Keyed {
    fn key(&self) -> &str;
    fn set_key(&mut self, id: String);
}

impl Keyed for GraphNode {
    fn key(&self) -> &str {
        &self.id
    }

    fn set_key(&mut self, id: String) {
        self.id = id;
    }
}

impl Keyed for GraphEdge {
    fn key(&self) -> &str {
        &self.id
    }

    fn set_key(&mut self, id: String) {
        self.id = id;
    }
}

mod keyed_map {
    use super::{fmt, Deserialize, Deserializer, Keyed, MapAccess, PhantomData, Serialize, Serializer, Visitor};

    pub fn serialize<S, T>(items: &[T], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Keyed + Serialize,
    {
        serializer.collect_map(items.iter().map(|item| (item.key(), item)))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Keyed + Deserialize<'de>,
    {
        struct KeyedVisitor<T>(PhantomData<T>);

        impl<'de, T: Keyed + Deserialize<'de>> Visitor<'de> for KeyedVisitor<T> {
            type Value = Vec<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from id to attributes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Vec<T>, A::Error> {
                let mut items = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, mut item)) = map.next_entry::<String, T>()? {
                    item.set_key(id);
                    items.push(item);
                }
                Ok(items)
            }
        }

        deserializer.deserialize_map(KeyedVisitor(PhantomData))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub document_id: String,
    pub created_at: DateTime<Utc>,
    /// Problems found while assembling, such as dropped dangling edges
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphRecord")]
pub struct KnowledgeGraph {
    #[serde(serialize_with = "keyed_map::serialize")]
    nodes: Vec<GraphNode>,
    #[serde(serialize_with = "keyed_map::serialize")]
    edges: Vec<GraphEdge>,
    metadata: GraphMetadata,
    #[serde(skip)]
    node_index: HashMap<String, usize>,
    #[serde(skip)]
    edge_ids: HashSet<String>,
}

#[derive(Deserialize)]
struct GraphRecord {
    #[serde(default, deserialize_with = "keyed_map::deserialize")]
    nodes: Vec<GraphNode>,
    #[serde(default, deserialize_with = "keyed_map::deserialize")]
    edges: Vec<GraphEdge>,
    metadata: GraphMetadata,
}

impl TryFrom<GraphRecord> for KnowledgeGraph {
    type Error = Error;

    fn try_from(record: GraphRecord) -> Result<Self> {
        let mut metadata = record.metadata;
        let warnings = std::mem::take(&mut metadata.warnings);
        let mut graph = Self::empty(metadata);

        for node in record.nodes {
            check_confidence(node.confidence)?;
            graph.add_node(node);
        }
        for edge in record.edges {
            check_confidence(edge.confidence)?;
            graph.add_edge(edge);
        }

        // warnings recorded at assembly time come first, then anything found on load
        let found_on_load = std::mem::replace(&mut graph.metadata.warnings, warnings);
        graph.metadata.warnings.extend(found_on_load);
        Ok(graph)
    }
}

impl KnowledgeGraph {
    fn empty(metadata: GraphMetadata) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            metadata,
            node_index: HashMap::new(),
            edge_ids: HashSet::new(),
        }
    }

    /// An empty graph for `document_id`, stamped with the current time.
    #[must_use]
    pub fn new(document_id: impl Into<String>) -> Self {
        Self::empty(GraphMetadata {
            document_id: document_id.into(),
            created_at: Utc::now(),
            warnings: Vec::new(),
        })
    }

    fn warn(&mut self, message: String) {
        tracing::warn!(document_id = %self.metadata.document_id, "{message}");
        self.metadata.warnings.push(message);
    }

    /// Adds a node; a node whose id is already present is dropped with a warning.
    pub fn add_node(&mut self, node: GraphNode) -> bool {
        if self.node_index.contains_key(&node.id) {
            self.warn(format!("duplicate node '{}' ignored", node.id));
            return false;
        }
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Adds an edge. Edges naming a missing endpoint, or repeating an edge id, are dropped
    /// with a warning.
    pub fn add_edge(&mut self, edge: GraphEdge) -> bool {
        let missing: Vec<&str> = [edge.source.as_str(), edge.target.as_str()]
            .into_iter()
            .filter(|id| !self.node_index.contains_key(*id))
            .collect();
        if !missing.is_empty() {
            let message = format!(
                "edge '{}' dropped: missing endpoint {}",
                edge.id,
                missing.join(", ")
            );
            self.warn(message);
            return false;
        }
        if !self.edge_ids.insert(edge.id.clone()) {
            self.warn(format!("duplicate edge '{}' ignored", edge.id));
            return false;
        }
        self.edges.push(edge);
        true
    }

    #[must_use]
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    #[must_use]
    pub const fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.metadata.document_id
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Directed `petgraph` view whose node weights index into `self.nodes`.
    fn digraph(&self) -> DiGraph<usize, usize> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        for idx in 0..self.nodes.len() {
            graph.add_node(idx);
        }
        for (idx, edge) in self.edges.iter().enumerate() {
            if let (Some(&s), Some(&t)) = (self.node_index.get(&edge.source), self.node_index.get(&edge.target)) {
                graph.add_edge(NodeIndex::new(s), NodeIndex::new(t), idx);
            }
        }
        graph
    }

    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.digraph())
    }

    /// Node ids of every directed cycle's strongly connected component, each listed in node
    /// order, components ordered by their first node.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let graph = self.digraph();
        let mut cycles: Vec<Vec<usize>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&n| graph.find_edge(n, n).is_some())
            })
            .map(|component| {
                let mut members: Vec<usize> = component.into_iter().map(NodeIndex::index).collect();
                members.sort_unstable();
                members
            })
            .collect();
        cycles.sort();

        cycles
            .into_iter()
            .map(|members| members.into_iter().map(|idx| self.nodes[idx].id.clone()).collect())
            .collect()
    }

    /// Shortest path by hop count from `from` to `to`, both ends included. Empty when either
    /// node is absent or `to` is unreachable.
    #[must_use]
    pub fn find_path(&self, from: &str, to: &str) -> Vec<String> {
        let (Some(&start), Some(&goal)) = (self.node_index.get(from), self.node_index.get(to)) else {
            return Vec::new();
        };
        let graph = self.digraph();
        let goal = NodeIndex::new(goal);

        astar(&graph, NodeIndex::new(start), |n| n == goal, |_| 1usize, |_| 0)
            .map(|(_, path)| {
                path.into_iter()
                    .map(|n| self.nodes[n.index()].id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Targets of edges leaving `id`, in edge order, without repeats.
    #[must_use]
    pub fn successors(&self, id: &str) -> Vec<&GraphNode> {
        self.neighbors(id, |edge| (&edge.source, &edge.target))
    }

    /// Sources of edges entering `id`, in edge order, without repeats.
    #[must_use]
    pub fn predecessors(&self, id: &str) -> Vec<&GraphNode> {
        self.neighbors(id, |edge| (&edge.target, &edge.source))
    }

    fn neighbors<'g>(
        &'g self,
        id: &str,
        ends: impl Fn(&'g GraphEdge) -> (&'g String, &'g String),
    ) -> Vec<&'g GraphNode> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .map(ends)
            .filter(|(from, _)| from.as_str() == id)
            .filter(|&(_, to)| seen.insert(to.as_str()))
            .filter_map(|(_, to)| self.node(to))
            .collect()
    }

    #[must_use]
    pub fn statistics(&self) -> GraphStatistics {
        GraphStatistics::compute(self)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builds a [`KnowledgeGraph`] from finalized entity and relationship lists.
#[derive(Debug, Clone)]
pub struct GraphAssembler {
    created_at: Option<DateTime<Utc>>,
}

impl Default for GraphAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphAssembler {
    #[must_use]
    pub const fn new() -> Self {
        Self { created_at: None }
    }

    /// Stamp graphs with a fixed time instead of the current one.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    #[must_use]
    pub fn assemble(
        &self,
        document_id: &str,
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new(document_id);
        if let Some(created_at) = self.created_at {
            graph.metadata.created_at = created_at;
        }

        for entity in entities {
            graph.add_node(GraphNode::from(entity));
        }
        for rel in relationships {
            graph.add_edge(GraphEdge::from(rel));
        }

        tracing::debug!(
            document_id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            warnings = graph.metadata.warnings.len(),
            "assembled knowledge graph"
        );
        graph
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub document_id: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_type: BTreeMap<EntityType, usize>,
    pub edges_by_type: BTreeMap<RelationType, usize>,
    pub average_node_confidence: f64,
    pub average_edge_confidence: f64,
    pub has_cycles: bool,
    pub warning_count: usize,
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let len = values.len();
    if len == 0 {
        0.0
    } else {
        values.sum::<f64>() / len as f64
    }
}

impl GraphStatistics {
    #[must_use]
    pub fn compute(graph: &KnowledgeGraph) -> Self {
        let mut nodes_by_type = BTreeMap::new();
        for node in &graph.nodes {
            *nodes_by_type.entry(node.entity_type).or_insert(0) += 1;
        }
        let mut edges_by_type = BTreeMap::new();
        for edge in &graph.edges {
            *edges_by_type.entry(edge.relation_type).or_insert(0) += 1;
        }

        Self {
            document_id: graph.metadata.document_id.clone(),
            node_count: graph.nodes.len(),
            edge_count: graph.edges.len(),
            nodes_by_type,
            edges_by_type,
            average_node_confidence: mean(graph.nodes.iter().map(|n| n.confidence)),
            average_edge_confidence: mean(graph.edges.iter().map(|e| e.confidence)),
            has_cycles: graph.has_cycles(),
            warning_count: graph.metadata.warnings.len(),
        }
    }
}

/// Statistics memoized per document id.
#[derive(Debug, Default)]
pub struct StatisticsCache {
    entries: HashMap<String, GraphStatistics>,
}

impl StatisticsCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&mut self, graph: &KnowledgeGraph) -> &GraphStatistics {
        self.entries
            .entry(graph.document_id().to_string())
            .or_insert_with(|| graph.statistics())
    }

    #[must_use]
    pub fn get(&self, document_id: &str) -> Option<&GraphStatistics> {
        self.entries.get(document_id)
    }

    /// Forgets a document's statistics so the next lookup recomputes them.
    pub fn invalidate(&mut self, document_id: &str) -> bool {
        self.entries.remove(document_id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
