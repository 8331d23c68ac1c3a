//! Error types for catalog construction and reporting.

use crate::types::{ObjectHash, ObjectKind};
use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Catalog database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Failed to encode catalog record: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Corrupt catalog record: {0}")]
    Corrupt(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors surfaced by the walkers, the collaborators and the command layer
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Object not found: {0}")]
    NotFound(ObjectHash),

    #[error("No reachable objects found.")]
    NoReachableObjects,

    #[error("No catalog available ({0}). Run `objstat rebuild` first.")]
    DatabaseMissing(PathBuf),

    #[error("Malformed {kind} object {hash}: {reason}")]
    MalformedContent {
        hash: ObjectHash,
        kind: ObjectKind,
        reason: String,
    },

    #[error("Cannot decode object {hash}: {reason}")]
    CorruptObject { hash: ObjectHash, reason: String },

    #[error("Unknown object kind: {0}")]
    UnknownKind(String),

    #[error("Object {hash} is a {actual}, expected a {expected}")]
    KindMismatch {
        hash: ObjectHash,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("Hash not found in catalog: {0}")]
    HashNotFound(ObjectHash),

    #[error("Invalid hash: {0:?}")]
    InvalidHash(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for StatsError {
    fn from(err: config::ConfigError) -> Self {
        StatsError::ConfigError(err.to_string())
    }
}

impl From<sled::Error> for StatsError {
    fn from(err: sled::Error) -> Self {
        StatsError::Storage(StorageError::Database(err))
    }
}

impl StatsError {
    /// Errors that abort only the branch being walked; siblings and other roots continue.
    pub fn is_branch_local(&self) -> bool {
        matches!(
            self,
            StatsError::NotFound(_)
                | StatsError::MalformedContent { .. }
                | StatsError::CorruptObject { .. }
                | StatsError::UnknownKind(_)
                | StatsError::KindMismatch { .. }
        )
    }
}
