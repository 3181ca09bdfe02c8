//! Error types

use std::io;
use std::path::PathBuf;

use solvanity_pattern::PatternError;
use thiserror::Error;

/// Persistence and encryption failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Encryption failed")]
    Encrypt,
    #[error("Decryption failed (wrong passphrase or tampered record)")]
    Decrypt,
    #[error("Record is encrypted but no passphrase is configured")]
    PassphraseRequired,
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Controller and mining errors
#[derive(Error, Debug)]
pub enum MinerError {
    #[error("Invalid search criteria: {0}")]
    InvalidCriteria(#[from] PatternError),
    #[error("Search already running; stop it before starting a new one")]
    AlreadyRunning,
    #[error("Worker {worker_id} failed: {message}")]
    WorkerFailure { worker_id: usize, message: String },
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StorageError),
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),
}
