//! Vanity search controller
//!
//! [`VanitySearch`] owns the worker pool for one run at a time. Workers send
//! [`WorkerEvent`]s into a single router thread, which is the only writer of
//! the telemetry and the discovery list and the only caller of the
//! [`SearchObserver`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use solvanity_crypto::{KeySource, SolanaKeySource};

use crate::criteria::{effective_workers, SearchCriteria};
use crate::error::{MinerError, StorageError};
use crate::stats::{TelemetryAggregator, TelemetrySnapshot};
use crate::storage::{LoadReport, WalletVault};
use crate::wallet::FoundWallet;
use crate::worker::{Discovery, Worker, WorkerContext, WorkerEvent};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Builds the key source for a worker id
pub type SourceFactory = Arc<dyn Fn(usize) -> Box<dyn KeySource> + Send + Sync>;

/// Independent Solana key sources, one private RNG per worker
pub fn solana_sources() -> SourceFactory {
    Arc::new(|_: usize| -> Box<dyn KeySource> { Box::new(SolanaKeySource::new()) })
}

/// Receives search notifications, on the controller's router thread
pub trait SearchObserver: Send + Sync {
    fn on_progress(&self, _snapshot: &TelemetrySnapshot) {}

    /// `total` is the number of discoveries in this run so far
    fn on_found(&self, _wallet: &FoundWallet, _total: usize) {}

    fn on_error(&self, _message: &str) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl SearchObserver for NoopObserver {}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long `stop` waits for workers before detaching them
    pub grace_period: Duration,
    /// Minimum spacing between speed history samples
    pub history_interval: Duration,
    /// Parallel units to plan for (None = detect)
    pub parallelism: Option<usize>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            history_interval: Duration::from_secs(1),
            parallelism: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    Idle,
    Running,
    Stopping,
}

struct Shared {
    telemetry: TelemetryAggregator,
    found: Vec<FoundWallet>,
    state: ControllerState,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

struct ActiveRun {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    router: Option<JoinHandle<()>>,
    shutdown: Sender<()>,
}

/// Vanity search controller: Idle -> Running -> Stopping -> Idle
pub struct VanitySearch {
    config: ControllerConfig,
    vault: Arc<dyn WalletVault>,
    sources: SourceFactory,
    observer: Arc<dyn SearchObserver>,
    shared: Arc<Mutex<Shared>>,
    run: Option<ActiveRun>,
}

impl VanitySearch {
    /// Create a controller mining Solana addresses with default settings
    pub fn new(vault: Arc<dyn WalletVault>, observer: Arc<dyn SearchObserver>) -> Self {
        Self::with_config(ControllerConfig::default(), vault, solana_sources(), observer)
    }

    pub fn with_config(
        config: ControllerConfig,
        vault: Arc<dyn WalletVault>,
        sources: SourceFactory,
        observer: Arc<dyn SearchObserver>,
    ) -> Self {
        let shared = Shared {
            telemetry: TelemetryAggregator::new(config.history_interval),
            found: Vec::new(),
            state: ControllerState::Idle,
        };
        Self {
            config,
            vault,
            sources,
            observer,
            shared: Arc::new(Mutex::new(shared)),
            run: None,
        }
    }

    /// Start a run, reporting any error through the observer
    pub fn start(&mut self, criteria: &SearchCriteria) -> bool {
        match self.try_start(criteria) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Search not started");
                self.observer.on_error(&e.to_string());
                false
            }
        }
    }

    /// Start a run and return the number of workers spawned
    pub fn try_start(&mut self, criteria: &SearchCriteria) -> Result<usize, MinerError> {
        if self.run.is_some() {
            return Err(MinerError::AlreadyRunning);
        }

        let pattern = Arc::new(criteria.compile()?);
        let available = self.config.parallelism.unwrap_or_else(num_cpus::get);
        let worker_count = effective_workers(criteria.workers, available);
        let batch_size = criteria.effective_batch_size();

        {
            let mut shared = lock(&self.shared);
            shared.found.clear();
            shared.telemetry.reset(0..worker_count);
            shared.state = ControllerState::Running;
        }

        let (events_tx, events_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let router = Router {
            events: events_rx,
            shutdown: shutdown_rx,
            shared: Arc::clone(&self.shared),
            vault: Arc::clone(&self.vault),
            observer: Arc::clone(&self.observer),
        };
        let router = match thread::Builder::new()
            .name("solvanity-router".to_string())
            .spawn(move || router.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                let mut shared = lock(&self.shared);
                shared.telemetry.deactivate_all();
                shared.state = ControllerState::Idle;
                return Err(MinerError::Spawn(e));
            }
        };

        let mut run = ActiveRun {
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::with_capacity(worker_count),
            router: Some(router),
            shutdown: shutdown_tx,
        };

        for worker_id in 0..worker_count {
            let ctx = WorkerContext {
                worker_id,
                pattern: Arc::clone(&pattern),
                batch_size,
            };
            let worker = Worker::new(
                ctx,
                (self.sources)(worker_id),
                Arc::clone(&run.stop),
                events_tx.clone(),
            );
            let spawned = thread::Builder::new()
                .name(format!("solvanity-worker-{worker_id}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => run.workers.push(handle),
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to spawn worker");
                    drop(events_tx);
                    self.finish_run(run);
                    return Err(MinerError::Spawn(e));
                }
            }
        }

        info!(
            workers = worker_count,
            batch_size,
            prefix = %pattern.prefix(),
            suffixes = ?pattern.suffixes(),
            match_case = pattern.match_case(),
            "Search started"
        );
        self.run = Some(run);
        Ok(worker_count)
    }

    /// Stop the current run. Does nothing when idle.
    pub fn stop(&mut self) {
        match self.run.take() {
            Some(run) => {
                lock(&self.shared).state = ControllerState::Stopping;
                info!("Stopping search");
                self.finish_run(run);
            }
            None => {
                let mut shared = lock(&self.shared);
                shared.telemetry.deactivate_all();
                shared.state = ControllerState::Idle;
            }
        }
    }

    fn finish_run(&self, mut run: ActiveRun) {
        run.stop.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + self.config.grace_period;
        let mut pending = std::mem::take(&mut run.workers);
        loop {
            let (done, alive): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|h| h.is_finished());
            for handle in done {
                if handle.join().is_err() {
                    error!("Worker thread panicked outside its loop");
                }
            }
            pending = alive;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }

        // Threads cannot be killed; a wedged worker is detached and exits on
        // its own once it finds the router gone.
        for handle in pending {
            warn!(
                thread = handle.thread().name().unwrap_or("worker"),
                grace_ms = self.config.grace_period.as_millis() as u64,
                "Worker did not stop in time, detaching"
            );
        }

        let _ = run.shutdown.send(());
        if let Some(router) = run.router.take() {
            if router.join().is_err() {
                error!("Router thread panicked");
            }
        }

        let mut shared = lock(&self.shared);
        shared.telemetry.deactivate_all();
        shared.state = ControllerState::Idle;
        let snapshot = shared.telemetry.snapshot();
        info!(
            attempts = snapshot.total_attempts,
            found = shared.found.len(),
            "Search stopped"
        );
    }

    pub fn state(&self) -> ControllerState {
        lock(&self.shared).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ControllerState::Running
    }

    /// Current telemetry snapshot
    pub fn telemetry(&self) -> TelemetrySnapshot {
        lock(&self.shared).telemetry.snapshot()
    }

    /// Copy of every wallet discovered in the current (or last) run
    pub fn found_wallets(&self) -> Vec<FoundWallet> {
        lock(&self.shared).found.clone()
    }

    /// Forget discoveries held in memory; stored files are untouched
    pub fn clear_found_wallets(&self) {
        let mut shared = lock(&self.shared);
        shared.found.clear();
        shared.telemetry.set_found_count(0);
    }

    /// Read every wallet from the vault, independent of any run
    pub fn load_wallets(&self) -> Result<LoadReport, StorageError> {
        self.vault.load_all()
    }
}

impl Drop for VanitySearch {
    fn drop(&mut self) {
        if self.run.is_some() {
            self.stop();
        }
    }
}

/// Sole consumer of worker events for one run
struct Router {
    events: Receiver<WorkerEvent>,
    shutdown: Receiver<()>,
    shared: Arc<Mutex<Shared>>,
    vault: Arc<dyn WalletVault>,
    observer: Arc<dyn SearchObserver>,
}

impl Router {
    fn run(self) {
        loop {
            select! {
                recv(self.events) -> event => match event {
                    Ok(event) => self.handle(event),
                    // every worker has exited
                    Err(_) => break,
                },
                recv(self.shutdown) -> _ => {
                    for event in self.events.try_iter() {
                        self.handle(event);
                    }
                    break;
                }
            }
        }
        debug!("Router exiting");
    }

    fn handle(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress(progress) => {
                debug!(
                    worker_id = progress.worker_id,
                    attempts = progress.attempts,
                    speed = progress.speed,
                    "Progress"
                );
                let snapshot = {
                    let mut shared = lock(&self.shared);
                    shared.telemetry.record(progress);
                    shared.telemetry.snapshot()
                };
                self.observer.on_progress(&snapshot);
            }
            WorkerEvent::Found(discovery) => self.handle_found(discovery),
            WorkerEvent::Stopped {
                worker_id,
                attempts,
            } => {
                debug!(worker_id, attempts, "Worker acknowledged stop");
                lock(&self.shared).telemetry.mark_stopped(worker_id, attempts);
            }
            WorkerEvent::Failed {
                worker_id,
                attempts,
                message,
            } => {
                lock(&self.shared).telemetry.mark_failed(worker_id, attempts);
                let err = MinerError::WorkerFailure { worker_id, message };
                self.observer.on_error(&err.to_string());
            }
        }
    }

    /// Persist first, then record, then notify
    fn handle_found(&self, discovery: Discovery) {
        let mut wallet = FoundWallet::from(discovery);

        match self.vault.persist(&wallet) {
            Ok(path) => {
                info!(address = %wallet.address, path = %path.display(), "Wallet found and saved");
                wallet.saved_path = Some(path);
            }
            Err(e) => {
                let err = MinerError::Persistence(e);
                warn!(address = %wallet.address, error = %err, "Wallet found but not saved");
                self.observer
                    .on_error(&format!("Wallet {} was not saved: {}", wallet.address, err));
            }
        }

        let total = {
            let mut shared = lock(&self.shared);
            shared.found.push(wallet.clone());
            let total = shared.found.len();
            shared.telemetry.set_found_count(total);
            total
        };
        self.observer.on_found(&wallet, total);
    }
}
