//! Wallet persistence
//!
//! Every discovery produces two files in the wallet directory:
//!
//! * `<timestamp>-<address prefix>.wallet.json`: the full record, sealed
//!   with AES-256-GCM under a scrypt-derived key (or plaintext when the user
//!   opted out of encryption).
//! * `<address prefix>.keypair.json`: the bare 64-byte keypair array that
//!   `solana-keygen` and wallet apps import directly.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use solvanity_crypto::address_of;

use crate::error::StorageError;
use crate::wallet::FoundWallet;

/// scrypt cost (log2 N) used unless configured otherwise
pub const DEFAULT_KDF_LOG_N: u8 = 15;
const KDF_R: u32 = 8;
const KDF_P: u32 = 1;
const KDF_SALT: &[u8] = b"solvanity-wallet-vault/v1";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const RECORD_SUFFIX: &str = ".wallet.json";
const KEYFILE_SUFFIX: &str = ".keypair.json";
const KEYFILE_PREFIX_CHARS: usize = 16;

/// How records are protected at rest
#[derive(Clone, PartialEq, Eq)]
pub enum Encryption {
    /// AES-256-GCM under a key derived from this passphrase
    Passphrase(String),
    /// Store records unencrypted (explicit opt-out)
    Plaintext,
}

impl std::fmt::Debug for Encryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encryption::Passphrase(_) => f.write_str("Passphrase([REDACTED])"),
            Encryption::Plaintext => f.write_str("Plaintext"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub wallet_dir: PathBuf,
    pub encryption: Encryption,
    /// scrypt cost; must match the value the records were written with
    pub kdf_log_n: u8,
}

impl StorageConfig {
    pub fn new(wallet_dir: impl Into<PathBuf>, encryption: Encryption) -> Self {
        Self {
            wallet_dir: wallet_dir.into(),
            encryption,
            kdf_log_n: DEFAULT_KDF_LOG_N,
        }
    }
}

/// Result of reading every record in the wallet directory
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully read wallets, oldest first
    pub wallets: Vec<FoundWallet>,
    /// Records that could not be read, with the reason
    pub failures: Vec<(PathBuf, StorageError)>,
}

/// Durable home for discovered wallets
pub trait WalletVault: Send + Sync {
    /// Write a wallet, returning the path of its record
    fn persist(&self, wallet: &FoundWallet) -> Result<PathBuf, StorageError>;

    /// Read back every stored wallet; one bad record never aborts the rest
    fn load_all(&self) -> Result<LoadReport, StorageError>;
}

/// On-disk record layout
#[derive(Serialize, Deserialize)]
#[serde(tag = "format")]
enum StoredRecord {
    #[serde(rename = "aes-256-gcm")]
    Encrypted {
        iv: String,
        #[serde(rename = "authTag")]
        auth_tag: String,
        ciphertext: String,
    },
    #[serde(rename = "plaintext")]
    Plaintext { wallet: FoundWallet },
}

/// Record cipher with a key derived once per store
#[derive(Clone)]
pub(crate) struct RecordCipher {
    cipher: Aes256Gcm,
}

impl RecordCipher {
    pub fn from_passphrase(passphrase: &str, log_n: u8) -> Result<Self, StorageError> {
        let params = scrypt::Params::new(log_n, KDF_R, KDF_P, 32)
            .map_err(|e| StorageError::KeyDerivation(e.to_string()))?;
        let mut key = Zeroizing::new([0u8; 32]);
        scrypt::scrypt(passphrase.as_bytes(), KDF_SALT, &params, key.as_mut_slice())
            .map_err(|e| StorageError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice())),
        })
    }

    fn seal(&self, plaintext: &[u8]) -> Result<StoredRecord, StorageError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| StorageError::Encrypt)?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(StoredRecord::Encrypted {
            iv: hex::encode(nonce),
            auth_tag: hex::encode(tag),
            ciphertext: hex::encode(sealed),
        })
    }

    fn open(&self, iv: &str, auth_tag: &str, ciphertext: &str) -> Result<Zeroizing<Vec<u8>>, StorageError> {
        let malformed = |what: &str| StorageError::MalformedRecord(format!("bad {what}"));
        let iv = hex::decode(iv).map_err(|_| malformed("iv"))?;
        let tag = hex::decode(auth_tag).map_err(|_| malformed("authTag"))?;
        let mut sealed = hex::decode(ciphertext).map_err(|_| malformed("ciphertext"))?;
        if iv.len() != NONCE_LEN {
            return Err(malformed("iv length"));
        }
        if tag.len() != TAG_LEN {
            return Err(malformed("authTag length"));
        }

        sealed.extend_from_slice(&tag);
        self.cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| StorageError::Decrypt)
    }
}

/// Wallet directory on disk
pub struct WalletStore {
    dir: PathBuf,
    cipher: Option<RecordCipher>,
}

impl WalletStore {
    /// Create the directory if needed and derive the record key
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.wallet_dir)
            .map_err(|e| StorageError::io(&config.wallet_dir, e))?;

        let cipher = match &config.encryption {
            Encryption::Passphrase(passphrase) => {
                Some(RecordCipher::from_passphrase(passphrase, config.kdf_log_n)?)
            }
            Encryption::Plaintext => {
                warn!(dir = %config.wallet_dir.display(), "Wallet records will be stored unencrypted");
                None
            }
        };

        Ok(Self {
            dir: config.wallet_dir.clone(),
            cipher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn encode_record(&self, wallet: &FoundWallet) -> Result<Vec<u8>, StorageError> {
        let record = match &self.cipher {
            Some(cipher) => {
                let plaintext = Zeroizing::new(serde_json::to_vec(wallet)?);
                cipher.seal(&plaintext)?
            }
            None => StoredRecord::Plaintext {
                wallet: wallet.clone(),
            },
        };
        Ok(serde_json::to_vec_pretty(&record)?)
    }

    fn decode_record(&self, bytes: &[u8]) -> Result<FoundWallet, StorageError> {
        let record: StoredRecord = serde_json::from_slice(bytes)
            .map_err(|e| StorageError::MalformedRecord(e.to_string()))?;
        match record {
            StoredRecord::Encrypted {
                iv,
                auth_tag,
                ciphertext,
            } => {
                let cipher = self.cipher.as_ref().ok_or(StorageError::PassphraseRequired)?;
                let plaintext = cipher.open(&iv, &auth_tag, &ciphertext)?;
                serde_json::from_slice(&plaintext)
                    .map_err(|e| StorageError::MalformedRecord(e.to_string()))
            }
            StoredRecord::Plaintext { wallet } => Ok(wallet),
        }
    }

    fn read_record(&self, path: &Path) -> Result<FoundWallet, StorageError> {
        let bytes = Zeroizing::new(fs::read(path).map_err(|e| StorageError::io(path, e))?);
        let mut wallet = self.decode_record(&bytes)?;
        let owner = address_of(&wallet.secret_key)
            .map_err(|e| StorageError::MalformedRecord(e.to_string()))?;
        if owner != wallet.address {
            return Err(StorageError::MalformedRecord(format!(
                "keypair belongs to {}, not {}",
                owner, wallet.address
            )));
        }
        wallet.saved_path = Some(path.to_path_buf());
        Ok(wallet)
    }
}

impl WalletVault for WalletStore {
    fn persist(&self, wallet: &FoundWallet) -> Result<PathBuf, StorageError> {
        let record = self.encode_record(wallet)?;
        let stem = format!(
            "{}-{}",
            wallet.found_at.format("%Y%m%dT%H%M%S%3f"),
            file_safe_prefix(&wallet.address, 8)
        );
        let keyfile = Zeroizing::new(serde_json::to_vec(&wallet.secret_key)?);
        let key_stem = file_safe_prefix(&wallet.address, KEYFILE_PREFIX_CHARS);

        let [record_path, key_path] = create_all(
            &self.dir,
            [
                (stem.as_str(), RECORD_SUFFIX, record.as_slice()),
                (key_stem.as_str(), KEYFILE_SUFFIX, keyfile.as_slice()),
            ],
        )?;

        debug!(record = %record_path.display(), keyfile = %key_path.display(), "Wallet persisted");
        Ok(record_path)
    }

    fn load_all(&self) -> Result<LoadReport, StorageError> {
        let mut report = LoadReport::default();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    report.failures.push((self.dir.clone(), StorageError::io(&self.dir, e)));
                    continue;
                }
            };
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(RECORD_SUFFIX));
            if !is_record {
                continue;
            }

            match self.read_record(&path) {
                Ok(wallet) => report.wallets.push(wallet),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable wallet record");
                    report.failures.push((path, e));
                }
            }
        }

        report.wallets.sort_by_key(|w| w.found_at);
        Ok(report)
    }
}

/// Keeps wallets in memory only; for benchmarks and tests
#[derive(Debug, Default)]
pub struct MemoryVault {
    wallets: Mutex<Vec<FoundWallet>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FoundWallet>> {
        self.wallets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WalletVault for MemoryVault {
    fn persist(&self, wallet: &FoundWallet) -> Result<PathBuf, StorageError> {
        let mut wallets = self.lock();
        wallets.push(wallet.clone());
        Ok(PathBuf::from(format!("memory/{}", wallets.len())))
    }

    fn load_all(&self) -> Result<LoadReport, StorageError> {
        let wallets = self
            .lock()
            .iter()
            .enumerate()
            .map(|(i, w)| FoundWallet {
                saved_path: Some(PathBuf::from(format!("memory/{}", i + 1))),
                ..w.clone()
            })
            .collect();
        Ok(LoadReport {
            wallets,
            failures: Vec::new(),
        })
    }
}

/// First `n` alphanumeric characters of an address, safe in a file name
fn file_safe_prefix(address: &str, n: usize) -> String {
    let prefix: String = address
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(n)
        .collect();
    if prefix.is_empty() {
        "wallet".to_string()
    } else {
        prefix
    }
}

/// Write every file or none of them. Files already written are removed
/// when a later one fails.
fn create_all<const N: usize>(
    dir: &Path,
    files: [(&str, &str, &[u8]); N],
) -> Result<[PathBuf; N], StorageError> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(N);
    for (stem, suffix, bytes) in files {
        match create_unique(dir, stem, suffix, bytes) {
            Ok(path) => written.push(path),
            Err(e) => {
                for path in &written {
                    if let Err(rm) = fs::remove_file(path) {
                        warn!(path = %path.display(), error = %rm, "Failed to remove partial wallet file");
                    }
                }
                return Err(e);
            }
        }
    }
    written
        .try_into()
        .map_err(|_| StorageError::MalformedRecord("wallet file count mismatch".to_string()))
}

/// Write `bytes` to `<stem><suffix>`, or `<stem>-2<suffix>` and so on if taken
fn create_unique(dir: &Path, stem: &str, suffix: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
    for n in 1u32.. {
        let name = if n == 1 {
            format!("{stem}{suffix}")
        } else {
            format!("{stem}-{n}{suffix}")
        };
        let path = dir.join(name);
        match create_private(&path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
                    drop(file);
                    let _ = fs::remove_file(&path);
                    return Err(StorageError::io(&path, e));
                }
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StorageError::io(&path, e)),
        }
    }
    unreachable!("file name space exhausted")
}

fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use solvanity_crypto::{Ed25519Keypair, SolanaKeySource};
    use tempfile::TempDir;

    // Cheap KDF for tests
    const TEST_LOG_N: u8 = 8;

    fn config(dir: &Path, encryption: Encryption) -> StorageConfig {
        StorageConfig {
            wallet_dir: dir.to_path_buf(),
            encryption,
            kdf_log_n: TEST_LOG_N,
        }
    }

    fn wallet() -> FoundWallet {
        let candidate = SolanaKeySource::candidate_for(&Ed25519Keypair::generate());
        FoundWallet {
            address: candidate.address,
            secret_key: candidate.secret_key,
            matched_prefix: "So".to_string(),
            matched_suffix: "L".to_string(),
            attempts_at_discovery: 123_456,
            worker_id: 2,
            found_at: Utc::now(),
            saved_path: None,
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = RecordCipher::from_passphrase("hunter2", TEST_LOG_N).unwrap();
        let original = wallet();
        let plaintext = serde_json::to_vec(&original).unwrap();

        let StoredRecord::Encrypted { iv, auth_tag, ciphertext } = cipher.seal(&plaintext).unwrap() else {
            panic!("expected encrypted record");
        };
        assert_eq!(iv.len(), NONCE_LEN * 2);
        assert_eq!(auth_tag.len(), TAG_LEN * 2);

        let opened = cipher.open(&iv, &auth_tag, &ciphertext).unwrap();
        let restored: FoundWallet = serde_json::from_slice(&opened).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_fresh_nonce_per_record() {
        let cipher = RecordCipher::from_passphrase("hunter2", TEST_LOG_N).unwrap();
        let a = serde_json::to_string(&cipher.seal(b"same").unwrap()).unwrap();
        let b = serde_json::to_string(&cipher.seal(b"same").unwrap()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_passphrase_and_tamper_fail() {
        let cipher = RecordCipher::from_passphrase("hunter2", TEST_LOG_N).unwrap();
        let other = RecordCipher::from_passphrase("hunter3", TEST_LOG_N).unwrap();
        let StoredRecord::Encrypted { iv, auth_tag, ciphertext } = cipher.seal(b"secret").unwrap() else {
            panic!("expected encrypted record");
        };

        assert!(matches!(other.open(&iv, &auth_tag, &ciphertext), Err(StorageError::Decrypt)));

        let mut flipped = hex::decode(&ciphertext).unwrap();
        flipped[0] ^= 1;
        assert!(matches!(
            cipher.open(&iv, &auth_tag, &hex::encode(flipped)),
            Err(StorageError::Decrypt)
        ));
        assert!(matches!(
            cipher.open("abcd", &auth_tag, &ciphertext),
            Err(StorageError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_persist_writes_record_and_keyfile() {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::open(&config(dir.path(), Encryption::Passphrase("pw".into()))).unwrap();
        let original = wallet();

        let record_path = store.persist(&original).unwrap();
        let name = record_path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(RECORD_SUFFIX));
        assert!(name.contains(&original.address[..8]));

        // record does not leak the address or key in the clear
        let raw = fs::read_to_string(&record_path).unwrap();
        assert!(raw.contains("\"format\": \"aes-256-gcm\""));
        assert!(raw.contains("authTag"));
        assert!(!raw.contains(&original.address));

        let key_path = dir
            .path()
            .join(format!("{}{}", &original.address[..KEYFILE_PREFIX_CHARS], KEYFILE_SUFFIX));
        let bytes: Vec<u8> = serde_json::from_str(&fs::read_to_string(&key_path).unwrap()).unwrap();
        assert_eq!(bytes.as_slice(), original.secret_key.as_bytes());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let report = store.load_all().unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.wallets.len(), 1);
        let loaded = &report.wallets[0];
        assert_eq!(loaded.saved_path.as_deref(), Some(record_path.as_path()));
        assert_eq!(
            FoundWallet {
                saved_path: None,
                ..loaded.clone()
            },
            original
        );
    }

    #[test]
    fn test_same_prefix_does_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::open(&config(dir.path(), Encryption::Plaintext)).unwrap();
        let first = wallet();
        let second = FoundWallet {
            found_at: first.found_at,
            ..first.clone()
        };

        let a = store.persist(&first).unwrap();
        let b = store.persist(&second).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.load_all().unwrap().wallets.len(), 2);
    }

    #[test]
    fn test_corrupt_record_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::open(&config(dir.path(), Encryption::Passphrase("pw".into()))).unwrap();
        store.persist(&wallet()).unwrap();
        store.persist(&wallet()).unwrap();
        fs::write(dir.path().join("garbage.wallet.json"), b"{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let report = store.load_all().unwrap();
        assert_eq!(report.wallets.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].0.ends_with("garbage.wallet.json"));
        assert!(report.wallets[0].found_at <= report.wallets[1].found_at);
    }

    #[test]
    fn test_encrypted_records_need_passphrase() {
        let dir = TempDir::new().unwrap();
        let sealed = WalletStore::open(&config(dir.path(), Encryption::Passphrase("pw".into()))).unwrap();
        sealed.persist(&wallet()).unwrap();

        let plain = WalletStore::open(&config(dir.path(), Encryption::Plaintext)).unwrap();
        let report = plain.load_all().unwrap();
        assert!(report.wallets.is_empty());
        assert!(matches!(report.failures[0].1, StorageError::PassphraseRequired));

        let wrong = WalletStore::open(&config(dir.path(), Encryption::Passphrase("nope".into()))).unwrap();
        let report = wrong.load_all().unwrap();
        assert!(matches!(report.failures[0].1, StorageError::Decrypt));
    }

    #[test]
    fn test_plaintext_opt_out() {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::open(&config(dir.path(), Encryption::Plaintext)).unwrap();
        assert!(!store.is_encrypted());
        let original = wallet();
        let path = store.persist(&original).unwrap();
        let raw = fs::read_to_string(path).unwrap();
        assert!(raw.contains("\"format\": \"plaintext\""));
        assert!(raw.contains(&original.address));
    }

    #[test]
    fn test_missing_directory_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::open(&config(&dir.path().join("wallets"), Encryption::Plaintext)).unwrap();
        fs::remove_dir(store.dir()).unwrap();
        let report = store.load_all().unwrap();
        assert!(report.wallets.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_file_safe_prefix() {
        assert_eq!(file_safe_prefix("../../etc/passwd", 8), "etcpassw");
        assert_eq!(file_safe_prefix("///", 8), "wallet");
        assert_eq!(file_safe_prefix("AbC", 8), "AbC");
    }

    #[test]
    fn test_failed_keyfile_write_removes_record() {
        let dir = TempDir::new().unwrap();
        let err = create_all(
            dir.path(),
            [
                ("20240101T000000000-abcdefgh", RECORD_SUFFIX, &b"{}"[..]),
                ("no-such-dir/abcdefgh", KEYFILE_SUFFIX, &b"[]"[..]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        // nothing on disk claims the wallet was saved
        let store = WalletStore::open(&config(dir.path(), Encryption::Plaintext)).unwrap();
        let report = store.load_all().unwrap();
        assert!(report.wallets.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_keypair_must_own_address() {
        let dir = TempDir::new().unwrap();
        let store = WalletStore::open(&config(dir.path(), Encryption::Plaintext)).unwrap();
        let forged = FoundWallet {
            address: wallet().address,
            ..wallet()
        };
        store.persist(&forged).unwrap();
        store.persist(&wallet()).unwrap();

        let report = store.load_all().unwrap();
        assert_eq!(report.wallets.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0].1,
            StorageError::MalformedRecord(msg) if msg.contains(&forged.address)
        ));
    }
}
