//! Live search telemetry

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solvanity_pattern::{estimate_time_50pct, format_duration, match_probability};

use crate::worker::WorkerProgress;

/// Entries kept in the speed history ring buffer
pub const HISTORY_CAPACITY: usize = 60;

/// Latest counters reported by one worker
#[derive(Debug, Clone)]
struct WorkerStat {
    attempts: u64,
    speed: u64,
    recent_samples: Vec<String>,
    /// Still running (not stopped, not failed)
    active: bool,
}

impl WorkerStat {
    fn new() -> Self {
        Self {
            attempts: 0,
            speed: 0,
            recent_samples: Vec::new(),
            active: true,
        }
    }
}

/// Aggregate speed at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub time: DateTime<Utc>,
    pub speed: u64,
}

/// Point-in-time view over all workers of the current run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub total_attempts: u64,
    pub keys_per_second: u64,
    pub active_workers: usize,
    pub speed_history: Vec<SpeedSample>,
    pub found_count: usize,
    pub elapsed_secs: f64,
    pub recent_samples: Vec<String>,
}

/// Folds worker progress messages into a [`TelemetrySnapshot`].
///
/// Only the controller's router thread writes to it. Totals are eventually
/// consistent: each worker contributes whatever it reported last.
#[derive(Debug)]
pub struct TelemetryAggregator {
    workers: BTreeMap<usize, WorkerStat>,
    history: VecDeque<SpeedSample>,
    history_interval: Duration,
    last_history: Option<Instant>,
    started: Instant,
    found_count: usize,
}

impl TelemetryAggregator {
    pub fn new(history_interval: Duration) -> Self {
        Self {
            workers: BTreeMap::new(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            history_interval,
            last_history: None,
            started: Instant::now(),
            found_count: 0,
        }
    }

    /// Forget the previous run and track a fresh set of workers
    pub fn reset(&mut self, worker_ids: impl IntoIterator<Item = usize>) {
        self.workers = worker_ids
            .into_iter()
            .map(|id| (id, WorkerStat::new()))
            .collect();
        self.history.clear();
        self.last_history = None;
        self.started = Instant::now();
        self.found_count = 0;
    }

    /// Apply one progress message
    pub fn record(&mut self, progress: WorkerProgress) {
        let stat = self
            .workers
            .entry(progress.worker_id)
            .or_insert_with(WorkerStat::new);
        stat.attempts = stat.attempts.max(progress.attempts);
        stat.speed = progress.speed;
        if !progress.samples.is_empty() {
            stat.recent_samples = progress.samples;
        }

        let now = Instant::now();
        let due = self
            .last_history
            .map_or(true, |last| now.duration_since(last) >= self.history_interval);
        if due {
            self.last_history = Some(now);
            let speed = self.keys_per_second();
            if self.history.len() == HISTORY_CAPACITY {
                self.history.pop_front();
            }
            self.history.push_back(SpeedSample {
                time: Utc::now(),
                speed,
            });
        }
    }

    /// A worker acknowledged a stop: keep its attempts, drop its speed
    pub fn mark_stopped(&mut self, worker_id: usize, attempts: u64) {
        if let Some(stat) = self.workers.get_mut(&worker_id) {
            stat.attempts = stat.attempts.max(attempts);
            stat.speed = 0;
            stat.active = false;
        }
    }

    /// A worker died: same bookkeeping as a stop
    pub fn mark_failed(&mut self, worker_id: usize, attempts: u64) {
        self.mark_stopped(worker_id, attempts);
    }

    /// Everything is stopped, whether or not each worker acknowledged
    pub fn deactivate_all(&mut self) {
        for stat in self.workers.values_mut() {
            stat.speed = 0;
            stat.active = false;
        }
    }

    pub fn set_found_count(&mut self, found_count: usize) {
        self.found_count = found_count;
    }

    pub fn total_attempts(&self) -> u64 {
        self.workers.values().map(|s| s.attempts).sum()
    }

    /// Sum of per-worker rates
    pub fn keys_per_second(&self) -> u64 {
        self.workers.values().map(|s| s.speed).sum()
    }

    pub fn active_workers(&self) -> usize {
        self.workers.values().filter(|s| s.active).count()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            total_attempts: self.total_attempts(),
            keys_per_second: self.keys_per_second(),
            active_workers: self.active_workers(),
            speed_history: self.history.iter().copied().collect(),
            found_count: self.found_count,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            recent_samples: self
                .workers
                .values()
                .flat_map(|s| s.recent_samples.iter().cloned())
                .collect(),
        }
    }
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// One-line status: speed, total, found, probability and 50% ETA
pub fn format_status(snapshot: &TelemetrySnapshot, difficulty: f64) -> String {
    let kps = snapshot.keys_per_second as f64;
    let prob = match_probability(difficulty, snapshot.total_attempts);
    let eta = if prob < 0.5 {
        let spent = snapshot.total_attempts as f64 / kps.max(1.0);
        format_duration(estimate_time_50pct(difficulty, kps) - spent)
    } else {
        "now".to_string()
    };

    format!(
        "[{:.2} Mkey/s][Total {}][Found {}][Workers {}][Prob {:.1}%][50% in {}]",
        kps / 1_000_000.0,
        format_keys(snapshot.total_attempts),
        snapshot.found_count,
        snapshot.active_workers,
        prob * 100.0,
        eta
    )
}

pub fn format_keys(keys: u64) -> String {
    if keys >= 1_000_000_000_000 {
        format!("{:.2}T", keys as f64 / 1e12)
    } else if keys >= 1_000_000_000 {
        format!("{:.2}G", keys as f64 / 1e9)
    } else if keys >= 1_000_000 {
        format!("{:.2}M", keys as f64 / 1e6)
    } else if keys >= 1000 {
        format!("{:.2}K", keys as f64 / 1e3)
    } else {
        format!("{}", keys)
    }
}
