//! SolVanity Crypto Primitives
//!
//! Keypair generation and address encoding consumed by the mining engine.
//! Nothing here implements a primitive: Ed25519 comes from `ed25519-dalek`
//! and Base58 from `bs58`.

pub mod ed25519;
pub mod encoding;
pub mod secret;
pub mod solana;
pub mod source;

pub use self::ed25519::{Ed25519Error, Ed25519Keypair};
pub use self::secret::{SecretKey, SECRET_KEY_LEN};
pub use self::solana::{address_of, SolanaKeySource};
pub use self::source::{Candidate, GeneratorError, KeySource};

// Re-export dependencies for use by other crates
pub use bs58;
