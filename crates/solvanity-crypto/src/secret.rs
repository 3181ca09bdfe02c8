//! Secret key material that wipes itself on drop

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a Solana keypair (32-byte seed followed by 32-byte public key)
pub const SECRET_KEY_LEN: usize = 64;

/// Owned secret-key bytes. Zeroized when dropped, redacted in `Debug`.
///
/// Serializes as a plain array of numbers, which is the Solana CLI keyfile
/// format.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut bytes = Vec::<u8>::deserialize(deserializer)?;
        let result = <[u8; SECRET_KEY_LEN]>::try_from(bytes.as_slice())
            .map(SecretKey)
            .map_err(|_| D::Error::invalid_length(bytes.len(), &"64 secret key bytes"));
        bytes.zeroize();
        result
    }
}
