use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid confidence {value}: must be within [0, 1]")]
    InvalidConfidence { value: f64 },

    #[error("Invalid span: end {end} is before start {start}")]
    InvalidSpan { start: usize, end: usize },

    #[error("Incomplete span: start and end must be given together")]
    IncompleteSpan,

    #[error("Self-referential relationship not allowed: {0}")]
    SelfReference(String),

    #[error("Invalid pattern template '{template}': {source}")]
    InvalidPattern {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn check_confidence(value: f64) -> Result<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidConfidence { value })
    }
}
