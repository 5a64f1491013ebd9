//! Error types for TabContext.
//!
//! Library crates use [`TabContextError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all TabContext operations.
#[derive(Debug, thiserror::Error)]
pub enum TabContextError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a tab host or remote service.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Session store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Classification service error (HTTP status, empty choices, bad JSON).
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Request validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// No bearer token was supplied with a request that needs one.
    #[error("missing API credential")]
    MissingCredential,

    /// Every open tab was filtered out (or there were none).
    #[error("no valid tabs to analyze")]
    NoEligibleTabs,

    /// Prior pipeline state is missing or does not contain the requested item.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The pipeline service task is gone.
    #[error("pipeline channel closed")]
    ChannelClosed,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TabContextError>;

impl TabContextError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// A short recovery hint for the user, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingCredential => Some("Sign in or pass an API token, then retry."),
            Self::NoEligibleTabs => Some("Open some web pages and try again."),
            Self::NotFound { .. } => Some("Run tab clustering again, then pick a cluster."),
            Self::Config { .. } => Some("Check ~/.tabcontext/tabcontext.toml."),
            _ => None,
        }
    }
}
