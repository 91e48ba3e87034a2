//! Crate-wide error type.
//!
//! Variants follow the error taxonomy of the pipeline design: transient I/O,
//! malformed metadata, index rejection, and fatal startup failures each get
//! their own variant so callers can match on category instead of message text.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("state store error: {0}")]
    StateStore(#[from] redis::RedisError),

    #[error("index request failed: {0}")]
    Index(#[from] reqwest::Error),

    #[error("index rejected document for {path}: {detail}")]
    IndexRejected { path: String, detail: String },

    #[error("filesystem watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn external tool {tool}: {source}")]
    ToolSpawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("external tool {tool} exited with failure: {detail}")]
    ToolFailed { tool: &'static str, detail: String },

    #[error("malformed metadata in {path}: {detail}")]
    MalformedMetadata { path: String, detail: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("startup failed: {0}")]
    Fatal(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors in category 1 of the error-handling design: safe to
    /// log and drop, never fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StateStore(_) | Error::Index(_) | Error::ToolSpawn { .. }
        )
    }
}
