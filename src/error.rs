//! Error types shared by the context, configuration and event modules.
//!
//! Fetch failures from data sources are not part of [`Error`]. They reach the
//! requesting metric as a [`SourceError`](crate::source::SourceError), are
//! logged there and go no further.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value was rejected by validation.
    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// `set_focus` was called with an index outside `[0, size)`.
    #[error("focus index {index} is outside the visible window of {size} samples")]
    FocusOutOfRange { index: usize, size: usize },

    /// A listener key named an event type that does not exist.
    #[error("unknown event type `{0}`")]
    UnknownEvent(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// `ContextConfig::load` could not infer a format from the file extension.
    #[error("unsupported configuration format `{0}` (expected .json, .yaml or .yml)")]
    UnsupportedFormat(String),
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
