use thiserror::Error;

use crate::shape::Violation;

/// All errors produced by the Cassandra connectors.
#[derive(Debug, Error)]
pub enum Error {
    /// A reader/writer property is missing or inconsistent. Raised eagerly, never retried.
    #[error("invalid property `{property}`: {message}")]
    Config { property: String, message: String },

    /// No coercion rule could convert a value between its host and wire forms.
    #[error("conversion: {0}")]
    Conversion(String),

    /// A registered custom codec rejected a value.
    #[error("codec `{codec}`: {message}")]
    Codec { codec: String, message: String },

    /// A materialized record failed its validation pass.
    #[error("validation: {}", describe_violations(.0))]
    Validation(Vec<Violation>),

    /// The store or its client layer reported a failure.
    #[error("store: {0}")]
    Store(String),

    /// Loading a spec from files or environment failed.
    #[error("settings: {0}")]
    Settings(#[from] config::ConfigError),

    /// Lifecycle misuse, e.g. reading before `open`.
    #[error("{0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(property: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            property: property.into(),
            message: message.into(),
        }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Error::Conversion(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Error::Engine(msg.into())
    }

    pub fn codec(codec: &str, err: anyhow::Error) -> Self {
        Error::Codec {
            codec: codec.to_owned(),
            message: format!("{err:#}"),
        }
    }

    /// Configuration errors are fatal to the job; everything else is item- or chunk-level.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::Settings(_))
    }
}

fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
