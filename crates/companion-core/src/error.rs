use thiserror::Error;

/// Top-level error type for the companion engine.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for CompanionError` so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompanionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for CompanionError {
    fn from(err: toml::de::Error) -> Self {
        CompanionError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CompanionError {
    fn from(err: toml::ser::Error) -> Self {
        CompanionError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CompanionError {
    fn from(err: serde_json::Error) -> Self {
        CompanionError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for companion operations.
pub type Result<T> = std::result::Result<T, CompanionError>;
