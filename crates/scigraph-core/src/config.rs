use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::EntityType;
use crate::extract::{
    validate_template, CombinedExtractor, ConflictResolver, HeuristicConfig, HeuristicExtractor,
    PairingConfig, PatternConfig, PatternExtractor, ResolutionConfig, ScoringWeights,
};
use crate::recognizer::RecognizerConfig;
use crate::relationship::RelationType;

/// Environment variable naming a config file, consulted when no path is given explicitly.
pub const CONFIG_ENV: &str = "SCIGRAPH_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize config for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value {field}: {reason}")]
    Invalid { field: String, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_entity_confidence: f64,
    pub min_relationship_confidence: f64,
    /// Keep only these entity types; all types when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<EntityType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_types: Option<Vec<RelationType>>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_entity_confidence: 0.0,
            min_relationship_confidence: 0.0,
            entity_types: None,
            relation_types: None,
        }
    }
}

/// Every tunable of the extraction pipeline. Missing sections and fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub pairing: PairingConfig,
    pub scoring: ScoringWeights,
    pub filters: FilterConfig,
    pub patterns: PatternConfig,
    pub heuristic: HeuristicConfig,
    pub resolution: ResolutionConfig,
    pub recognizer: RecognizerConfig,
    /// Run the pattern and heuristic extractors on separate threads
    pub parallel_extractors: bool,
}

fn check_unit(field: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("{value} is outside [0, 1]"),
        })
    }
}

fn check_weight(field: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("{value} must be a finite, non-negative number"),
        })
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        check_unit("filters.min_entity_confidence", self.filters.min_entity_confidence)?;
        check_unit(
            "filters.min_relationship_confidence",
            self.filters.min_relationship_confidence,
        )?;
        check_unit("patterns.base_confidence", self.patterns.base_confidence)?;
        check_unit("heuristic.explicit_confidence", self.heuristic.explicit_confidence)?;
        check_unit(
            "heuristic.cooccurrence_confidence",
            self.heuristic.cooccurrence_confidence,
        )?;
        check_unit("heuristic.inference_confidence", self.heuristic.inference_confidence)?;
        check_unit(
            "resolution.low_confidence_threshold",
            self.resolution.low_confidence_threshold,
        )?;
        check_unit(
            "resolution.runner_up_min_confidence",
            self.resolution.runner_up_min_confidence,
        )?;
        check_unit("recognizer.confidence", self.recognizer.confidence)?;

        check_weight("scoring.span_weight", self.scoring.span_weight)?;
        check_weight("scoring.near_bonus", self.scoring.near_bonus)?;
        check_weight("scoring.far_penalty", self.scoring.far_penalty)?;
        if self.scoring.near_distance > self.scoring.far_distance {
            return Err(ConfigError::Invalid {
                field: "scoring.near_distance".to_string(),
                reason: format!(
                    "{} exceeds far_distance {}",
                    self.scoring.near_distance, self.scoring.far_distance
                ),
            });
        }

        for (relation, templates) in &self.patterns.custom_templates {
            for template in templates {
                validate_template(template).map_err(|e| ConfigError::Invalid {
                    field: format!("patterns.custom_templates.{relation}"),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(write_err)?;
        Ok(())
    }

    /// `<config dir>/scigraph/config.json` for the current user, if the platform has one.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scigraph").join("config.json"))
    }

    /// Finds the config to use: the explicit path, then `$SCIGRAPH_CONFIG`, then the user
    /// config file when it exists, else defaults. Returns the path it loaded from, if any.
    pub fn discover(explicit: Option<&Path>) -> ConfigResult<(Self, Option<PathBuf>)> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::discover_from(explicit, from_env, Self::default_path())
    }

    fn discover_from(
        explicit: Option<&Path>,
        from_env: Option<PathBuf>,
        user_default: Option<PathBuf>,
    ) -> ConfigResult<(Self, Option<PathBuf>)> {
        let chosen = explicit
            .map(Path::to_path_buf)
            .or(from_env)
            .or_else(|| user_default.filter(|path| path.is_file()));

        match chosen {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading extraction config");
                let config = Self::load(&path)?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    #[must_use]
    pub fn pattern_extractor(&self) -> PatternExtractor {
        PatternExtractor::from_config(&self.patterns, self.pairing, self.scoring.clone())
    }

    #[must_use]
    pub fn heuristic_extractor(&self) -> HeuristicExtractor {
        HeuristicExtractor::new(self.heuristic.clone())
            .with_pairing(self.pairing)
            .with_scoring(self.scoring.clone())
    }

    /// Pattern and heuristic extractors behind the configured conflict resolver.
    #[must_use]
    pub fn combined_extractor(&self) -> CombinedExtractor {
        CombinedExtractor::new(ConflictResolver::new(self.resolution.clone()))
            .with_extractor(Box::new(self.pattern_extractor()))
            .with_extractor(Box::new(self.heuristic_extractor()))
            .with_parallel(self.parallel_extractors)
    }
}
