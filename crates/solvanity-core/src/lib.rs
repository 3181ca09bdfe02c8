//! SolVanity Core Engine
//!
//! Parallel vanity search: a controller supervising one OS thread per
//! worker, a telemetry aggregator fed by worker messages, and an encrypted
//! wallet store that every discovery passes through before it is reported.

mod criteria;
mod error;
mod search;
mod stats;
mod storage;
mod wallet;
mod worker;

pub use criteria::{effective_workers, SearchCriteria};
pub use error::{MinerError, StorageError};
pub use search::{
    solana_sources, ControllerConfig, ControllerState, NoopObserver, SearchObserver,
    SourceFactory, VanitySearch,
};
pub use stats::{
    format_keys, format_status, SpeedSample, TelemetryAggregator, TelemetrySnapshot,
    HISTORY_CAPACITY,
};
pub use storage::{
    Encryption, LoadReport, MemoryVault, StorageConfig, WalletStore, WalletVault,
    DEFAULT_KDF_LOG_N,
};
pub use wallet::FoundWallet;
pub use worker::{
    Discovery, WorkerEvent, WorkerProgress, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, MAX_SAMPLES,
    PROGRESS_INTERVAL, SAMPLE_INTERVAL,
};

// Re-exports for convenience
pub use solvanity_crypto::{Candidate, GeneratorError, KeySource, SecretKey, SolanaKeySource};
pub use solvanity_pattern::{
    calculate_difficulty, format_difficulty, format_duration, MatchOutcome, PatternError,
    SearchPattern,
};
