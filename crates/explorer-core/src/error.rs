//! Explorer error types

use crate::tree::NodeId;
use explorer_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

pub type ExplorerResult<T> = Result<T, ExplorerError>;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("Test node not found: {id}")]
    NodeNotFound { id: NodeId },

    #[error("Test node {id} is not a {expected}")]
    UnexpectedNodeKind { id: NodeId, expected: &'static str },

    #[error("Folder URI is not a local path: {0}")]
    InvalidFolderUri(String),

    #[error("Discovery request failed: {0}")]
    Discovery(String),

    #[error("Malformed discovery response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("Workspace scan failed: {0}")]
    Scan(String),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl ExplorerError {
    /// Create a node not found error
    pub fn node_not_found(id: &NodeId) -> Self {
        Self::NodeNotFound { id: id.clone() }
    }

    /// Create an unexpected node kind error
    pub fn unexpected_kind(id: &NodeId, expected: &'static str) -> Self {
        Self::UnexpectedNodeKind {
            id: id.clone(),
            expected,
        }
    }

    /// Create a discovery error
    pub fn discovery(error: impl ToString) -> Self {
        Self::Discovery(error.to_string())
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }
}
