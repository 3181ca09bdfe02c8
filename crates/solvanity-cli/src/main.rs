//! SolVanity CLI
//!
//! Solana vanity address miner.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use solvanity_core::{
    calculate_difficulty, format_difficulty, format_duration, format_keys, format_status,
    Encryption, FoundWallet, MemoryVault, NoopObserver, SearchCriteria, SearchObserver,
    StorageConfig, TelemetrySnapshot, VanitySearch, WalletStore, WalletVault,
};
use solvanity_crypto::bs58;
use tokio::sync::watch;

const STATUS_INTERVAL: Duration = Duration::from_millis(250);
const BENCHMARK_PREFIX: &str = "zzzzzzzzzz";

#[derive(Parser)]
#[command(name = "solvanity")]
#[command(author = "SolVanity Team")]
#[command(version = "0.1.0")]
#[command(about = "Parallel Solana vanity address miner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine addresses matching a prefix and/or suffixes
    Mine(MineArgs),

    /// List stored wallets
    Wallets {
        #[command(flatten)]
        storage: StorageArgs,

        /// Print secret keys (Base58)
        #[arg(long)]
        reveal: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Measure raw key generation speed
    Benchmark {
        /// Duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Number of worker threads (0 = auto)
        #[arg(long, default_value = "0")]
        threads: usize,
    },
}

#[derive(Args)]
struct MineArgs {
    /// Required address prefix
    #[arg(short, long, default_value = "")]
    prefix: String,

    /// Accepted address suffix (repeat for alternatives)
    #[arg(short, long)]
    suffix: Vec<String>,

    /// Case-sensitive comparison
    #[arg(short = 'c', long)]
    match_case: bool,

    /// Number of worker threads (0 = auto)
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Attempts between stop checks (0 = default)
    #[arg(long, default_value = "0")]
    batch_size: usize,

    /// Stop after this many seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_time: u64,

    /// Stop after this many wallets (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_found: usize,

    #[command(flatten)]
    storage: StorageArgs,

    /// Print secret keys (Base58) for each discovery
    #[arg(long)]
    reveal: bool,

    /// Output discoveries as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StorageArgs {
    /// Directory wallets are written to
    #[arg(long, env = "SOLVANITY_WALLET_DIR", default_value = "wallets")]
    wallet_dir: PathBuf,

    /// Passphrase used to encrypt wallet records
    #[arg(long, env = "SOLVANITY_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Store wallet records unencrypted, ignoring any passphrase
    #[arg(long)]
    plaintext: bool,
}

impl StorageArgs {
    fn config(&self, require_passphrase: bool) -> Result<StorageConfig> {
        let encryption = match (&self.passphrase, self.plaintext) {
            (_, true) => Encryption::Plaintext,
            (Some(p), false) if !p.is_empty() => Encryption::Passphrase(p.clone()),
            _ if require_passphrase => bail!(
                "A passphrase is required to encrypt wallets: use --passphrase, \
                 set SOLVANITY_PASSPHRASE, or opt out with --plaintext"
            ),
            _ => Encryption::Plaintext,
        };
        Ok(StorageConfig::new(&self.wallet_dir, encryption))
    }
}

/// Display form of a wallet; the secret is only included on request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletView<'a> {
    address: &'a str,
    matched_prefix: &'a str,
    matched_suffix: &'a str,
    attempts_at_discovery: u64,
    worker_id: usize,
    found_at: DateTime<Utc>,
    saved_path: Option<&'a PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key: Option<String>,
}

impl<'a> WalletView<'a> {
    fn new(wallet: &'a FoundWallet, reveal: bool) -> Self {
        Self {
            address: &wallet.address,
            matched_prefix: &wallet.matched_prefix,
            matched_suffix: &wallet.matched_suffix,
            attempts_at_discovery: wallet.attempts_at_discovery,
            worker_id: wallet.worker_id,
            found_at: wallet.found_at,
            saved_path: wallet.saved_path.as_ref(),
            secret_key: reveal
                .then(|| bs58::encode(wallet.secret_key.as_bytes()).into_string()),
        }
    }
}

/// Prints discoveries and errors, and publishes the found count
struct ConsoleObserver {
    json: bool,
    reveal: bool,
    found: watch::Sender<usize>,
}

impl SearchObserver for ConsoleObserver {
    fn on_found(&self, wallet: &FoundWallet, total: usize) {
        let view = WalletView::new(wallet, self.reveal);
        if self.json {
            match serde_json::to_string(&view) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("\nFailed to serialize wallet: {}", e),
            }
        } else {
            eprintln!();
            print_wallet(&view, total);
        }
        let _ = self.found.send(total);
    }

    fn on_error(&self, message: &str) {
        eprintln!("\nError: {}", message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mine(args) => cmd_mine(args).await?,
        Commands::Wallets {
            storage,
            reveal,
            json,
        } => cmd_wallets(&storage, reveal, json)?,
        Commands::Benchmark { duration, threads } => cmd_benchmark(duration, threads).await?,
    }

    Ok(())
}

async fn cmd_mine(args: MineArgs) -> Result<()> {
    let mut criteria = SearchCriteria::prefix(args.prefix.as_str())
        .with_workers(args.threads)
        .with_batch_size(args.batch_size);
    criteria.suffixes = args.suffix.clone();
    criteria.match_case = args.match_case;

    let pattern = criteria.compile()?;
    let difficulty = calculate_difficulty(&pattern);

    let storage = args.storage.config(true)?;
    let store = Arc::new(WalletStore::open(&storage).context("Failed to open wallet directory")?);

    let (found_tx, mut found_rx) = watch::channel(0usize);
    let observer = ConsoleObserver {
        json: args.json,
        reveal: args.reveal,
        found: found_tx,
    };
    let mut search = VanitySearch::new(store.clone(), Arc::new(observer));
    let workers = search.try_start(&criteria)?;

    if !args.json {
        eprintln!("SolVanity v{}", env!("CARGO_PKG_VERSION"));
        eprintln!(
            "Prefix: {:?}  Suffixes: {:?}{}",
            pattern.prefix(),
            pattern.suffixes(),
            if pattern.match_case() { "" } else { " (case-insensitive)" }
        );
        eprintln!("Difficulty: {}", format_difficulty(difficulty));
        eprintln!("Workers: {}", workers);
        eprintln!(
            "Wallets: {} ({})",
            store.dir().display(),
            if store.is_encrypted() { "encrypted" } else { "plaintext" }
        );
        eprintln!();
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let max_time = args.max_time;
    let time_limit = async move {
        if max_time > 0 {
            tokio::time::sleep(Duration::from_secs(max_time)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(time_limit);
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);

    let reason = loop {
        tokio::select! {
            _ = &mut ctrl_c => break "interrupted",
            _ = &mut time_limit => break "time limit reached",
            Ok(()) = found_rx.changed() => {
                let found = *found_rx.borrow();
                if args.max_found > 0 && found >= args.max_found {
                    break "found limit reached";
                }
            }
            _ = ticker.tick() => {
                let snapshot = search.telemetry();
                if snapshot.active_workers == 0 {
                    break "all workers stopped";
                }
                if !args.json {
                    eprint!("\r{}", format_status(&snapshot, difficulty));
                    let _ = std::io::stderr().flush();
                }
            }
        }
    };

    let before_stop = search.telemetry();
    let search = stop_blocking(search).await?;

    if !args.json {
        eprintln!();
        eprintln!("Stopped: {}", reason);
        print_summary(&before_stop, &search.telemetry());
    }

    Ok(())
}

fn cmd_wallets(storage: &StorageArgs, reveal: bool, json: bool) -> Result<()> {
    let config = storage.config(false)?;
    let store = WalletStore::open(&config).context("Failed to open wallet directory")?;
    let report = store.load_all()?;

    if json {
        let views: Vec<_> = report
            .wallets
            .iter()
            .map(|w| WalletView::new(w, reveal))
            .collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        if report.wallets.is_empty() {
            println!("No wallets in {}", store.dir().display());
        }
        for (i, wallet) in report.wallets.iter().enumerate() {
            print_wallet(&WalletView::new(wallet, reveal), i + 1);
        }
    }

    for (path, err) in &report.failures {
        eprintln!("Unreadable record {}: {}", path.display(), err);
    }

    Ok(())
}

async fn cmd_benchmark(duration_secs: u64, threads: usize) -> Result<()> {
    let criteria = SearchCriteria::prefix(BENCHMARK_PREFIX)
        .case_sensitive()
        .with_workers(threads);

    let mut search = VanitySearch::new(Arc::new(MemoryVault::new()), Arc::new(NoopObserver));
    let workers = search.try_start(&criteria)?;

    eprintln!("Benchmarking for {} seconds...", duration_secs);
    eprintln!("Workers: {}", workers);
    eprintln!();

    let started = Instant::now();
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    while started.elapsed() < Duration::from_secs(duration_secs) {
        ticker.tick().await;
        let snapshot = search.telemetry();
        eprint!(
            "\r[{:.2} Mkey/s][Total {}]",
            snapshot.keys_per_second as f64 / 1_000_000.0,
            format_keys(snapshot.total_attempts)
        );
        let _ = std::io::stderr().flush();
    }

    let before_stop = search.telemetry();
    let search = stop_blocking(search).await?;

    eprintln!("\n\nBenchmark complete!");
    print_summary(&before_stop, &search.telemetry());

    Ok(())
}

/// `stop` waits out the grace period, so it runs off the async workers
async fn stop_blocking(mut search: VanitySearch) -> Result<VanitySearch> {
    let search = tokio::task::spawn_blocking(move || {
        search.stop();
        search
    })
    .await?;
    Ok(search)
}

fn print_wallet(view: &WalletView<'_>, index: usize) {
    println!("{:-<60}", "");
    println!("#{} {}", index, view.address);
    println!(
        "Matched:     prefix {:?} suffix {:?}",
        view.matched_prefix, view.matched_suffix
    );
    println!(
        "Found:       {} (worker {}, {} attempts)",
        view.found_at, view.worker_id, view.attempts_at_discovery
    );
    match view.saved_path {
        Some(path) => println!("Saved:       {}", path.display()),
        None => println!("Saved:       NOT SAVED"),
    }
    if let Some(secret) = &view.secret_key {
        println!("Secret Key:  {}", secret);
    }
}

fn print_summary(running: &TelemetrySnapshot, stopped: &TelemetrySnapshot) {
    let elapsed = stopped.elapsed_secs.max(f64::EPSILON);
    println!("{:-<60}", "");
    println!("Keys Tested: {}", format_keys(stopped.total_attempts));
    println!("Time:        {}", format_duration(stopped.elapsed_secs));
    println!(
        "Speed:       {:.2} Mkey/s (last {:.2} Mkey/s)",
        stopped.total_attempts as f64 / elapsed / 1_000_000.0,
        running.keys_per_second as f64 / 1_000_000.0
    );
    println!("Found:       {}", stopped.found_count);
}
