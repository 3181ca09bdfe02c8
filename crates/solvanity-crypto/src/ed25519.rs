//! Ed25519 keypairs in the Solana layout

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand_core::CryptoRngCore;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::secret::{SecretKey, SECRET_KEY_LEN};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Ed25519Error {
    #[error("Public half of keypair does not match its seed")]
    MismatchedPublicKey,
}

/// An Ed25519 keypair for Solana
#[derive(Clone)]
pub struct Ed25519Keypair {
    signing_key: SigningKey,
}

impl Ed25519Keypair {
    /// Generate a new random keypair from the OS entropy source
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a keypair from a caller-owned CSPRNG
    pub fn generate_with<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Self {
        Self {
            signing_key: SigningKey::generate(rng),
        }
    }

    fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuild from the 64-byte Solana keypair layout, checking that the
    /// trailing public key belongs to the seed
    pub fn from_secret_key(secret: &SecretKey) -> Result<Self, Ed25519Error> {
        let bytes = secret.as_bytes();
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&bytes[..32]);
        let keypair = Self::from_seed(&seed);
        if keypair.public_key_bytes()[..] != bytes[32..] {
            return Err(Ed25519Error::MismatchedPublicKey);
        }
        Ok(keypair)
    }

    /// Get the public key as bytes (32 bytes)
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Full keypair bytes (privkey || pubkey), the layout Solana tools import
    pub fn secret_key(&self) -> SecretKey {
        let mut bytes = [0u8; SECRET_KEY_LEN];
        bytes[..32].copy_from_slice(self.signing_key.as_bytes());
        bytes[32..].copy_from_slice(self.signing_key.verifying_key().as_bytes());
        SecretKey::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp = Ed25519Keypair::generate();
        let secret = kp.secret_key();
        assert_eq!(secret.as_bytes().len(), 64);
        assert_eq!(&secret.as_bytes()[32..], &kp.public_key_bytes()[..]);
    }

    #[test]
    fn test_deterministic() {
        let seed = [1u8; 32];
        let kp1 = Ed25519Keypair::from_seed(&seed);
        let kp2 = Ed25519Keypair::from_seed(&seed);
        assert_eq!(kp1.public_key_bytes(), kp2.public_key_bytes());
    }

    #[test]
    fn test_from_secret_key() {
        let kp = Ed25519Keypair::generate();
        let secret = kp.secret_key();
        let restored = Ed25519Keypair::from_secret_key(&secret).unwrap();
        assert_eq!(restored.public_key_bytes(), kp.public_key_bytes());

        let mut tampered = *secret.as_bytes();
        tampered[40] ^= 0xff;
        assert_eq!(
            Ed25519Keypair::from_secret_key(&SecretKey::from_bytes(tampered)).err(),
            Some(Ed25519Error::MismatchedPublicKey)
        );
    }
}
