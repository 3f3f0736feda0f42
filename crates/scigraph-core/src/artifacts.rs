//! On-disk outputs of a batch run.
//!
//! Each document gets its own directory holding `entities.json`, `relationships.json` and
//! `knowledge_graph.json`. The output root also holds `extraction_statistics.json` for the
//! whole corpus and `checkpoint.json` listing finished documents. Every file is written to a
//! temporary sibling first and renamed into place, so readers never see a partial file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityType};
use crate::graph::KnowledgeGraph;
use crate::pipeline::{DocumentOutput, DocumentStats};
use crate::relationship::{RelationType, Relationship};
use crate::Result;

pub const ENTITIES_FILE: &str = "entities.json";
pub const RELATIONSHIPS_FILE: &str = "relationships.json";
pub const GRAPH_FILE: &str = "knowledge_graph.json";
pub const STATISTICS_FILE: &str = "extraction_statistics.json";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Directory for a document's artifacts. Characters other than ASCII letters, digits, `-`
/// and `_` become `_`.
#[must_use]
pub fn document_dir(out_dir: &Path, document_id: &str) -> PathBuf {
    let safe: String = document_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    out_dir.join(if safe.is_empty() { "_".to_string() } else { safe })
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Writes a document's three artifacts and returns the directory holding them.
pub fn write_document_artifacts(out_dir: &Path, output: &DocumentOutput) -> Result<PathBuf> {
    let dir = document_dir(out_dir, &output.document_id);
    write_json_atomic(&dir.join(ENTITIES_FILE), &output.entities)?;
    write_json_atomic(&dir.join(RELATIONSHIPS_FILE), &output.relationships)?;
    write_json_atomic(&dir.join(GRAPH_FILE), &output.graph)?;
    tracing::debug!(document_id = %output.document_id, dir = %dir.display(), "wrote artifacts");
    Ok(dir)
}

/// Loads an entity list, re-validating every entity.
pub fn read_entities(path: &Path) -> Result<Vec<Entity>> {
    read_json(path)
}

pub fn read_relationships(path: &Path) -> Result<Vec<Relationship>> {
    read_json(path)
}

pub fn read_graph(path: &Path) -> Result<KnowledgeGraph> {
    read_json(path)
}

/// Rebuilds the stats of a document from the artifacts written for it. Merge counts and
/// timing are not stored on disk and come back as zero.
pub fn read_document_stats(out_dir: &Path, document_id: &str) -> Result<DocumentStats> {
    let dir = document_dir(out_dir, document_id);
    let entities = read_entities(&dir.join(ENTITIES_FILE))?;
    let relationships = read_relationships(&dir.join(RELATIONSHIPS_FILE))?;
    let graph = read_graph(&dir.join(GRAPH_FILE))?;
    Ok(DocumentStats::summarize(&entities, &relationships, &graph))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub error: String,
}

/// Corpus-wide totals, updated as documents finish.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusStatistics {
    pub documents: usize,
    pub total_entities: usize,
    pub total_relationships: usize,
    pub entities_by_type: BTreeMap<EntityType, usize>,
    pub relationships_by_type: BTreeMap<RelationType, usize>,
    pub per_document: BTreeMap<String, DocumentStats>,
    pub failures: Vec<DocumentFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CorpusStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document's stats. Recording the same document again replaces its earlier
    /// contribution.
    pub fn record(&mut self, document_id: &str, stats: &DocumentStats) {
        if let Some(previous) = self.per_document.remove(document_id) {
            self.subtract(&previous);
        }
        self.documents += 1;
        self.total_entities += stats.entities;
        self.total_relationships += stats.relationships;
        for (&entity_type, &count) in &stats.entities_by_type {
            *self.entities_by_type.entry(entity_type).or_insert(0) += count;
        }
        for (&relation_type, &count) in &stats.relationships_by_type {
            *self.relationships_by_type.entry(relation_type).or_insert(0) += count;
        }
        self.failures.retain(|f| f.document_id != document_id);
        self.per_document.insert(document_id.to_string(), stats.clone());
    }

    fn subtract(&mut self, stats: &DocumentStats) {
        self.documents = self.documents.saturating_sub(1);
        self.total_entities = self.total_entities.saturating_sub(stats.entities);
        self.total_relationships = self.total_relationships.saturating_sub(stats.relationships);
        for (entity_type, &count) in &stats.entities_by_type {
            if let Some(total) = self.entities_by_type.get_mut(entity_type) {
                *total = total.saturating_sub(count);
            }
        }
        for (relation_type, &count) in &stats.relationships_by_type {
            if let Some(total) = self.relationships_by_type.get_mut(relation_type) {
                *total = total.saturating_sub(count);
            }
        }
        self.entities_by_type.retain(|_, count| *count > 0);
        self.relationships_by_type.retain(|_, count| *count > 0);
    }

    pub fn record_failure(&mut self, document_id: &str, error: impl std::fmt::Display) {
        self.failures.push(DocumentFailure {
            document_id: document_id.to_string(),
            error: error.to_string(),
        });
    }

    /// Statistics from a previous run in `out_dir`, or empty ones if there are none.
    pub fn load(out_dir: &Path) -> Result<Self> {
        let path = out_dir.join(STATISTICS_FILE);
        if path.exists() {
            read_json(&path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn write(&mut self, out_dir: &Path) -> Result<PathBuf> {
        self.updated_at = Some(Utc::now());
        let path = out_dir.join(STATISTICS_FILE);
        write_json_atomic(&path, self)?;
        Ok(path)
    }
}

impl From<&DocumentOutput> for CorpusStatistics {
    fn from(output: &DocumentOutput) -> Self {
        let mut stats = Self::new();
        stats.record(&output.document_id, &output.stats);
        stats
    }
}

/// Ids of documents whose artifacts are fully written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    completed: BTreeSet<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl Checkpoint {
    /// Loads `checkpoint.json` from `out_dir`; a missing file is an empty checkpoint.
    pub fn load(out_dir: &Path) -> Result<Self> {
        let path = out_dir.join(CHECKPOINT_FILE);
        let mut checkpoint: Self = if path.exists() {
            read_json(&path)?
        } else {
            Self::default()
        };
        checkpoint.path = path;
        Ok(checkpoint)
    }

    #[must_use]
    pub fn is_done(&self, document_id: &str) -> bool {
        self.completed.contains(document_id)
    }

    /// Records a finished document and persists the checkpoint immediately.
    pub fn mark_done(&mut self, document_id: &str) -> Result<()> {
        if self.completed.insert(document_id.to_string()) {
            write_json_atomic(&self.path, self)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.completed.iter().map(String::as_str)
    }
}
