//! Worker loop
//!
//! Each worker runs on its own OS thread with its own key source and never
//! touches shared state: everything it has to say goes out as a
//! [`WorkerEvent`] on the controller's channel.
//!
//! The stop flag is only read between micro-batches, so after a stop request
//! a worker keeps going for at most `batch_size / keys-per-second` seconds.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use tracing::{debug, error};

use solvanity_crypto::{Candidate, GeneratorError, KeySource, SecretKey};
use solvanity_pattern::SearchPattern;

/// Attempts per micro-batch when the criteria do not say otherwise
pub const DEFAULT_BATCH_SIZE: usize = 25_000;
/// Upper bound on the micro-batch, keeps stop latency in the seconds range
pub const MAX_BATCH_SIZE: usize = 1_000_000;
/// A progress event is sent every this many attempts
pub const PROGRESS_INTERVAL: u64 = 10_000;
/// An address sample is kept every this many attempts
pub const SAMPLE_INTERVAL: u64 = 2_000;
/// Samples retained between two progress events
pub const MAX_SAMPLES: usize = 5;

/// Periodic counters from one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerProgress {
    pub worker_id: usize,
    /// Cumulative attempts since the worker started
    pub attempts: u64,
    /// Attempts per second since the worker started
    pub speed: u64,
    /// A few recently generated addresses, for display
    pub samples: Vec<String>,
}

/// A matching keypair as reported by a worker
#[derive(Debug, Clone)]
pub struct Discovery {
    pub worker_id: usize,
    pub address: String,
    pub secret_key: SecretKey,
    pub matched_prefix: String,
    pub matched_suffix: String,
    /// Worker's attempt count when the match was generated
    pub attempts: u64,
}

/// Messages from workers to the controller
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Progress(WorkerProgress),
    Found(Discovery),
    /// Acknowledges a stop request; the worker exits right after
    Stopped { worker_id: usize, attempts: u64 },
    /// The loop died; the worker exits and is not replaced
    Failed {
        worker_id: usize,
        attempts: u64,
        message: String,
    },
}

/// Immutable per-worker inputs
#[derive(Debug, Clone)]
pub(crate) struct WorkerContext {
    pub worker_id: usize,
    pub pattern: Arc<SearchPattern>,
    pub batch_size: usize,
}

enum Halt {
    Generator(GeneratorError),
    Disconnected,
}

pub(crate) struct Worker {
    ctx: WorkerContext,
    source: Box<dyn KeySource>,
    stop: Arc<AtomicBool>,
    events: Sender<WorkerEvent>,
    attempts: u64,
    started: Instant,
    samples: Vec<String>,
}

impl Worker {
    pub fn new(
        ctx: WorkerContext,
        source: Box<dyn KeySource>,
        stop: Arc<AtomicBool>,
        events: Sender<WorkerEvent>,
    ) -> Self {
        Self {
            ctx,
            source,
            stop,
            events,
            attempts: 0,
            started: Instant::now(),
            samples: Vec::with_capacity(MAX_SAMPLES),
        }
    }

    /// Run until stopped, the source fails, or the controller goes away
    pub fn run(mut self) {
        let worker_id = self.ctx.worker_id;
        self.started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.mine()));

        let event = match outcome {
            Ok(Ok(())) => {
                debug!(worker_id, attempts = self.attempts, "Worker stopped");
                WorkerEvent::Stopped {
                    worker_id,
                    attempts: self.attempts,
                }
            }
            Ok(Err(Halt::Disconnected)) => {
                debug!(worker_id, "Controller gone, worker exiting");
                return;
            }
            Ok(Err(Halt::Generator(e))) => self.failure(e.to_string()),
            Err(payload) => self.failure(panic_message(payload.as_ref())),
        };

        let _ = self.events.send(event);
    }

    fn failure(&self, message: String) -> WorkerEvent {
        error!(worker_id = self.ctx.worker_id, attempts = self.attempts, %message, "Worker failed");
        WorkerEvent::Failed {
            worker_id: self.ctx.worker_id,
            attempts: self.attempts,
            message,
        }
    }

    fn mine(&mut self) -> Result<(), Halt> {
        let pattern = Arc::clone(&self.ctx.pattern);
        let batch_size = self.ctx.batch_size.max(1);

        while !self.stop.load(Ordering::Relaxed) {
            for _ in 0..batch_size {
                let candidate = self.source.next_candidate().map_err(Halt::Generator)?;
                self.attempts += 1;

                if self.attempts % SAMPLE_INTERVAL == 0 && self.samples.len() < MAX_SAMPLES {
                    self.samples.push(candidate.address.clone());
                }

                let outcome = pattern.matches(&candidate.address);
                if outcome.is_match() {
                    let matched_suffix = outcome.matched_suffix.to_string();
                    self.report_found(candidate, pattern.prefix(), matched_suffix)?;
                }

                if self.attempts % PROGRESS_INTERVAL == 0 {
                    self.report_progress()?;
                }
            }
        }

        Ok(())
    }

    fn report_found(
        &mut self,
        candidate: Candidate,
        prefix: &str,
        matched_suffix: String,
    ) -> Result<(), Halt> {
        debug!(worker_id = self.ctx.worker_id, address = %candidate.address, "Match");
        self.send(WorkerEvent::Found(Discovery {
            worker_id: self.ctx.worker_id,
            address: candidate.address,
            secret_key: candidate.secret_key,
            matched_prefix: prefix.to_string(),
            matched_suffix,
            attempts: self.attempts,
        }))
    }

    fn report_progress(&mut self) -> Result<(), Halt> {
        let elapsed = self.started.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            (self.attempts as f64 / elapsed) as u64
        } else {
            0
        };
        let samples = std::mem::replace(&mut self.samples, Vec::with_capacity(MAX_SAMPLES));
        self.send(WorkerEvent::Progress(WorkerProgress {
            worker_id: self.ctx.worker_id,
            attempts: self.attempts,
            speed,
            samples,
        }))
    }

    fn send(&self, event: WorkerEvent) -> Result<(), Halt> {
        self.events.send(event).map_err(|_| Halt::Disconnected)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver};
    use std::thread;
    use std::time::Duration;

    /// Cycles through fixed addresses forever
    struct Cycle {
        addresses: Vec<&'static str>,
        next: usize,
    }

    impl KeySource for Cycle {
        fn next_candidate(&mut self) -> Result<Candidate, GeneratorError> {
            let address = self.addresses[self.next % self.addresses.len()];
            self.next += 1;
            Ok(Candidate {
                address: address.to_string(),
                secret_key: SecretKey::from_bytes([self.next as u8; 64]),
            })
        }
    }

    /// Yields `limit` candidates, then errors or panics
    struct Limited {
        limit: u64,
        panic: bool,
        produced: u64,
    }

    impl KeySource for Limited {
        fn next_candidate(&mut self) -> Result<Candidate, GeneratorError> {
            if self.produced == self.limit {
                if self.panic {
                    panic!("entropy pool on fire");
                }
                return Err(GeneratorError::KeyGenFailed("rng unavailable".into()));
            }
            self.produced += 1;
            Ok(Candidate {
                address: "1111".to_string(),
                secret_key: SecretKey::from_bytes([0; 64]),
            })
        }
    }

    fn spawn(
        source: Box<dyn KeySource>,
        pattern: SearchPattern,
        batch_size: usize,
    ) -> (Arc<AtomicBool>, Receiver<WorkerEvent>, thread::JoinHandle<()>) {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            worker_id: 7,
            pattern: Arc::new(pattern),
            batch_size,
        };
        let worker = Worker::new(ctx, source, Arc::clone(&stop), tx);
        let handle = thread::spawn(move || worker.run());
        (stop, rx, handle)
    }

    #[test]
    fn test_keeps_mining_after_matches() {
        let source = Box::new(Cycle {
            addresses: vec!["abQQxy", "1111", "1111", "1111"],
            next: 0,
        });
        let pattern = SearchPattern::new("AB", ["XY"], false).unwrap();
        let (stop, rx, handle) = spawn(source, pattern, 1_000);

        let mut found = 0;
        let mut progress_after_matches = false;
        while !progress_after_matches {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                WorkerEvent::Found(d) => {
                    assert_eq!(d.worker_id, 7);
                    assert_eq!(d.matched_prefix, "AB");
                    assert_eq!(d.matched_suffix, "XY");
                    found += 1;
                }
                WorkerEvent::Progress(p) if found >= 100 => {
                    assert!(p.attempts >= 400);
                    progress_after_matches = true;
                }
                WorkerEvent::Progress(_) => {}
                other => panic!("unexpected event {other:?}"),
            }
        }

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        let stopped = rx
            .iter()
            .find(|e| matches!(e, WorkerEvent::Stopped { .. }))
            .expect("stop acknowledgement");
        match stopped {
            WorkerEvent::Stopped { worker_id, attempts } => {
                assert_eq!(worker_id, 7);
                assert_eq!(attempts % 1_000, 0, "stops on a batch boundary");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_progress_cadence_and_samples() {
        let source = Box::new(Cycle {
            addresses: vec!["1111"],
            next: 0,
        });
        let pattern = SearchPattern::new("zzz", Vec::<String>::new(), true).unwrap();
        let (stop, rx, handle) = spawn(source, pattern, 5_000);

        let first = loop {
            if let WorkerEvent::Progress(p) = rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                break p;
            }
        };
        assert_eq!(first.attempts, PROGRESS_INTERVAL);
        assert_eq!(first.samples.len(), MAX_SAMPLES);

        let second = loop {
            if let WorkerEvent::Progress(p) = rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                break p;
            }
        };
        assert_eq!(second.attempts, 2 * PROGRESS_INTERVAL);
        assert_eq!(second.samples.len(), MAX_SAMPLES);

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn test_generator_error_reported() {
        let source = Box::new(Limited {
            limit: 42,
            panic: false,
            produced: 0,
        });
        let pattern = SearchPattern::new("zzz", Vec::<String>::new(), true).unwrap();
        let (_stop, rx, handle) = spawn(source, pattern, 10);
        handle.join().unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        match events.last() {
            Some(WorkerEvent::Failed {
                worker_id,
                attempts,
                message,
            }) => {
                assert_eq!(*worker_id, 7);
                assert_eq!(*attempts, 42);
                assert!(message.contains("rng unavailable"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_panic_reported() {
        let source = Box::new(Limited {
            limit: 3,
            panic: true,
            produced: 0,
        });
        let pattern = SearchPattern::new("zzz", Vec::<String>::new(), true).unwrap();
        let (_stop, rx, handle) = spawn(source, pattern, 10);
        handle.join().unwrap();

        match rx.try_iter().last() {
            Some(WorkerEvent::Failed { message, .. }) => {
                assert!(message.contains("entropy pool on fire"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_exits_when_controller_gone() {
        let source = Box::new(Cycle {
            addresses: vec!["1111"],
            next: 0,
        });
        let pattern = SearchPattern::new("zzz", Vec::<String>::new(), true).unwrap();
        let (_stop, rx, handle) = spawn(source, pattern, 1_000);
        drop(rx);
        handle.join().unwrap();
    }
}
