//! Discovered wallets

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solvanity_crypto::SecretKey;

use crate::worker::Discovery;

/// A keypair whose address matched the search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundWallet {
    pub address: String,
    /// Solana keypair bytes (seed || public key)
    pub secret_key: SecretKey,
    pub matched_prefix: String,
    pub matched_suffix: String,
    pub attempts_at_discovery: u64,
    pub worker_id: usize,
    pub found_at: DateTime<Utc>,
    /// Where the record was written; `None` if persistence failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<PathBuf>,
}

impl FoundWallet {
    pub fn is_saved(&self) -> bool {
        self.saved_path.is_some()
    }
}

impl From<Discovery> for FoundWallet {
    fn from(d: Discovery) -> Self {
        Self {
            address: d.address,
            secret_key: d.secret_key,
            matched_prefix: d.matched_prefix,
            matched_suffix: d.matched_suffix,
            attempts_at_discovery: d.attempts,
            worker_id: d.worker_id,
            found_at: Utc::now(),
            saved_path: None,
        }
    }
}
