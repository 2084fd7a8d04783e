//! Error types for the carbon placement evaluator

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Policy name that does not map to a known placement policy
    #[error("Unsupported policy: {0}")]
    UnsupportedPolicy(String),

    /// HTTP client failure while talking to a carbon intensity provider
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Provider answered, but not with something usable
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Filesystem failure while persisting results
    #[error("I/O error on {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML configuration file
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Simulation engine reported a failure
    #[error("Engine error: {0}")]
    EngineError(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
