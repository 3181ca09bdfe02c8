//! Solana address source

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ed25519::{Ed25519Error, Ed25519Keypair};
use crate::encoding::base58_encode;
use crate::secret::SecretKey;
use crate::source::{Candidate, GeneratorError, KeySource};

/// Address owned by a stored keypair, after checking the keypair is whole
pub fn address_of(secret: &SecretKey) -> Result<String, Ed25519Error> {
    let keypair = Ed25519Keypair::from_secret_key(secret)?;
    Ok(base58_encode(&keypair.public_key_bytes()))
}

/// Generates random Solana keypairs from a private CSPRNG seeded by the OS
pub struct SolanaKeySource {
    rng: StdRng,
}

impl SolanaKeySource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic source, for tests and reproducible benchmarks
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: StdRng::from_seed(seed),
        }
    }

    /// Candidate for a known keypair
    pub fn candidate_for(keypair: &Ed25519Keypair) -> Candidate {
        Candidate {
            address: base58_encode(&keypair.public_key_bytes()),
            secret_key: keypair.secret_key(),
        }
    }
}

impl Default for SolanaKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for SolanaKeySource {
    fn next_candidate(&mut self) -> Result<Candidate, GeneratorError> {
        let keypair = Ed25519Keypair::generate_with(&mut self.rng);
        Ok(Self::candidate_for(&keypair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sol_generation() {
        let mut source = SolanaKeySource::new();
        let candidate = source.next_candidate().unwrap();

        // Solana addresses are 32-44 chars Base58
        assert!(candidate.address.len() >= 32 && candidate.address.len() <= 44);
        let pubkey = bs58::decode(&candidate.address).into_vec().unwrap();
        assert_eq!(&candidate.secret_key.as_bytes()[32..], &pubkey[..]);
        assert_eq!(address_of(&candidate.secret_key).unwrap(), candidate.address);
    }

    #[test]
    fn test_address_of_rejects_spliced_keypair() {
        let a = SolanaKeySource::new().next_candidate().unwrap();
        let b = SolanaKeySource::new().next_candidate().unwrap();
        let mut spliced = *a.secret_key.as_bytes();
        spliced[32..].copy_from_slice(&b.secret_key.as_bytes()[32..]);
        assert_eq!(
            address_of(&SecretKey::from_bytes(spliced)),
            Err(Ed25519Error::MismatchedPublicKey)
        );
    }

    #[test]
    fn test_seeded_sources_repeat() {
        let mut a = SolanaKeySource::from_seed([42u8; 32]);
        let mut b = SolanaKeySource::from_seed([42u8; 32]);
        assert_eq!(
            a.next_candidate().unwrap().address,
            b.next_candidate().unwrap().address
        );
    }

    #[test]
    fn test_independent_sources_differ() {
        let mut a = SolanaKeySource::new();
        let mut b = SolanaKeySource::new();
        assert_ne!(
            a.next_candidate().unwrap().address,
            b.next_candidate().unwrap().address
        );
    }
}
