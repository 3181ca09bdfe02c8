//! Keypair source trait and types

use thiserror::Error;

use crate::secret::SecretKey;

#[derive(Error, Debug, Clone)]
pub enum GeneratorError {
    #[error("Key generation failed: {0}")]
    KeyGenFailed(String),
    #[error("Key source exhausted")]
    Exhausted,
}

/// One generated keypair with its encoded address
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Canonical address string
    pub address: String,
    /// Secret key in the Solana 64-byte layout
    pub secret_key: SecretKey,
}

/// A source of candidate keypairs.
///
/// Each worker owns its own source, so implementations can hold mutable
/// state such as a private RNG without any locking.
pub trait KeySource: Send {
    /// Produce the next candidate
    fn next_candidate(&mut self) -> Result<Candidate, GeneratorError>;
}
