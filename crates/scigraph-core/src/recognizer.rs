use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityType};
use crate::error::{check_confidence, Error, Result};
use crate::extract::bounded_literal;
use crate::extract::contract::char_offset;
use crate::overlap::merge_overlapping_entities;

/// Finds entity mentions in raw text.
pub trait EntityRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Vec<Entity>;
}

fn default_terms() -> BTreeMap<EntityType, Vec<&'static str>> {
    BTreeMap::from([
        (
            EntityType::Model,
            vec![
                "BERT", "RoBERTa", "DistilBERT", "ALBERT", "ELECTRA", "XLNet", "BART", "T5",
                "GPT-2", "GPT-3", "GPT-3.5", "GPT-4", "LLaMA", "Llama 2", "PaLM", "Gemini",
                "Mistral", "CLIP", "ViT", "DALL-E", "Codex", "Chinchilla",
            ],
        ),
        (
            EntityType::Dataset,
            vec![
                "ImageNet", "ImageNet-21k", "CIFAR-10", "CIFAR-100", "MNIST", "COCO", "SQuAD",
                "Wikipedia", "BookCorpus", "Common Crawl", "C4", "The Pile", "WikiText-103",
                "LAION-5B",
            ],
        ),
        (
            EntityType::Benchmark,
            vec![
                "GLUE", "SuperGLUE", "MMLU", "HellaSwag", "BIG-bench", "HumanEval", "GSM8K",
                "TruthfulQA", "WinoGrande", "SVHN",
            ],
        ),
        (
            EntityType::Metric,
            vec![
                "accuracy", "top-1 accuracy", "F1", "F1 score", "BLEU", "ROUGE", "ROUGE-L",
                "perplexity", "exact match",
            ],
        ),
        (
            EntityType::Architecture,
            vec!["Transformer", "ResNet", "LSTM", "CNN", "U-Net", "Mixture of Experts"],
        ),
        (
            EntityType::Framework,
            vec!["PyTorch", "TensorFlow", "JAX", "Keras", "scikit-learn", "Hugging Face Transformers"],
        ),
        (
            EntityType::Organization,
            vec!["OpenAI", "Google", "DeepMind", "Meta AI", "Microsoft", "Hugging Face"],
        ),
        (EntityType::Hardware, vec!["TPU", "TPUv4", "A100", "H100", "V100"]),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Confidence given to every gazetteer hit
    pub confidence: f64,
    pub use_default_terms: bool,
    pub extra_terms: BTreeMap<EntityType, Vec<String>>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            confidence: 0.85,
            use_default_terms: true,
            extra_terms: BTreeMap::new(),
        }
    }
}

/// Dictionary recognizer: case-sensitive, word-bounded matches of known terms.
///
/// Longer terms win where terms overlap, so "GPT-3.5" is never reported as "GPT-3". A term
/// listed under two types keeps the first type in type order.
#[derive(Debug, Clone)]
pub struct GazetteerRecognizer {
    matcher: Option<Regex>,
    types: HashMap<String, EntityType>,
    confidence: f64,
}

impl GazetteerRecognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self> {
        let confidence = check_confidence(config.confidence)?;

        let mut terms: Vec<(String, EntityType)> = Vec::new();
        if config.use_default_terms {
            for (entity_type, list) in default_terms() {
                terms.extend(list.into_iter().map(|t| (t.to_string(), entity_type)));
            }
        }
        for (&entity_type, list) in &config.extra_terms {
            terms.extend(list.iter().map(|t| (t.trim().to_string(), entity_type)));
        }

        let mut types = HashMap::new();
        for (term, entity_type) in &terms {
            if !term.is_empty() {
                types.entry(term.clone()).or_insert(*entity_type);
            }
        }

        let mut ordered: Vec<&String> = types.keys().collect();
        ordered.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));

        let matcher = if ordered.is_empty() {
            None
        } else {
            let alternation = ordered
                .iter()
                .map(|term| bounded_literal(term))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&alternation).map_err(|source| Error::InvalidPattern {
                template: "gazetteer".to_string(),
                source,
            })?;
            Some(regex)
        };

        tracing::debug!(terms = types.len(), "built gazetteer recognizer");
        Ok(Self {
            matcher,
            types,
            confidence,
        })
    }

    #[must_use]
    pub fn term_count(&self) -> usize {
        self.types.len()
    }
}

impl EntityRecognizer for GazetteerRecognizer {
    fn recognize(&self, text: &str) -> Vec<Entity> {
        let Some(matcher) = &self.matcher else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut cursor = (0, 0);
        for hit in matcher.find_iter(text) {
            let Some(&entity_type) = self.types.get(hit.as_str()) else {
                continue;
            };
            // hits arrive in order, so offsets advance incrementally
            let start = cursor.1 + char_offset(&text[cursor.0..], hit.start() - cursor.0);
            let end = start + hit.as_str().chars().count();
            cursor = (hit.end(), end);

            match Entity::spanned(hit.as_str(), entity_type, self.confidence, start, end) {
                Ok(entity) => found.push(entity.with_metadata("recognizer", "gazetteer")),
                Err(e) => tracing::debug!("skipping gazetteer hit: {e}"),
            }
        }

        merge_overlapping_entities(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognizer() -> GazetteerRecognizer {
        GazetteerRecognizer::new(&RecognizerConfig::default()).unwrap()
    }

    #[test]
    fn test_finds_known_terms_with_char_offsets() {
        let text = "naïve GPT-4 was evaluated on MMLU";
        let entities = recognizer().recognize(text);
        let found: Vec<(&str, EntityType, Option<(usize, usize)>)> = entities
            .iter()
            .map(|e| (e.text(), e.entity_type(), e.span()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("GPT-4", EntityType::Model, Some((6, 11))),
                ("MMLU", EntityType::Benchmark, Some((29, 33))),
            ]
        );
    }

    #[test]
    fn test_longest_term_wins() {
        let entities = recognizer().recognize("We compare with GPT-3.5 and ImageNet-21k.");
        let texts: Vec<&str> = entities.iter().map(Entity::text).collect();
        assert_eq!(texts, vec!["GPT-3.5", "ImageNet-21k"]);
    }

    #[test]
    fn test_word_bounded_and_case_sensitive() {
        let entities = recognizer().recognize("RoBERTa differs from bert.");
        let texts: Vec<&str> = entities.iter().map(Entity::text).collect();
        assert_eq!(texts, vec!["RoBERTa"]);
    }

    #[test]
    fn test_ids_are_stable() {
        let text = "BERT uses PyTorch";
        assert_eq!(recognizer().recognize(text), recognizer().recognize(text));
    }

    #[test]
    fn test_extra_terms() {
        let config = RecognizerConfig {
            use_default_terms: false,
            extra_terms: BTreeMap::from([(EntityType::Method, vec!["LoRA".to_string()])]),
            ..RecognizerConfig::default()
        };
        let recognizer = GazetteerRecognizer::new(&config).unwrap();
        assert_eq!(recognizer.term_count(), 1);
        let entities = recognizer.recognize("Fine-tuning with LoRA, not BERT.");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type(), EntityType::Method);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(recognizer().recognize("").is_empty());
        let config = RecognizerConfig {
            use_default_terms: false,
            ..RecognizerConfig::default()
        };
        assert!(GazetteerRecognizer::new(&config).unwrap().recognize("BERT").is_empty());
    }

    #[test]
    fn test_rejects_bad_confidence() {
        let config = RecognizerConfig {
            confidence: 2.0,
            ..RecognizerConfig::default()
        };
        assert!(GazetteerRecognizer::new(&config).is_err());
    }
}
