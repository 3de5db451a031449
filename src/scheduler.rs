//! I/O Scheduler
//!
//! Bounded worker pool for part-level operations (write, read + verify, delete).
//!
//! ## Admission Model
//! ```text
//!  caller thread                      worker threads
//!  ─────────────                      ──────────────
//!  acquire permit ──(blocks at cap)
//!  pull next op from iterator
//!  send job ───────────────────────▶  run op
//!                                     release permit
//!  collect (index, result) ◀────────  send result
//! ```
//! - A permit is taken *before* the next operation is pulled, so a lazy
//!   operation source (e.g. a chunked reader) never has more than
//!   `max_in_flight` parts resident
//! - Permits are shared by every batch on the scheduler
//! - A failing operation never cancels its siblings; results come back in
//!   submission order

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::error::{Result, StoreError};

/// A single part-level operation
pub type PartOp<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How often a cancellable admission wait rechecks its token
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cooperative cancellation flag shared between a caller and a batch
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop admitting further operations; in-flight ones still drain
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Outcome of a (possibly cancelled) batch
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// One result per admitted operation, in submission order
    pub results: Vec<Result<T>>,
    /// True if admission stopped early because of cancellation
    pub cancelled: bool,
}

// =============================================================================
// Admission Control
// =============================================================================

struct AdmissionState {
    in_flight: usize,
    peak: usize,
}

/// Counting gate bounding in-flight operations
struct Admission {
    limit: usize,
    state: Mutex<AdmissionState>,
    released: Condvar,
}

impl Admission {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            state: Mutex::new(AdmissionState {
                in_flight: 0,
                peak: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Block until a slot is free; `None` if `cancel` fires first
    fn acquire(self: &Arc<Self>, cancel: Option<&CancelToken>) -> Option<Permit> {
        let mut state = self.state.lock();
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return None;
            }
            if state.in_flight < self.limit {
                state.in_flight += 1;
                state.peak = state.peak.max(state.in_flight);
                return Some(Permit {
                    admission: Arc::clone(self),
                });
            }

            trace!(in_flight = state.in_flight, limit = self.limit, "admission blocked");
            match cancel {
                Some(_) => {
                    self.released.wait_for(&mut state, CANCEL_POLL_INTERVAL);
                }
                None => self.released.wait(&mut state),
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.in_flight -= 1;
        drop(state);
        self.released.notify_all();
    }
}

/// One admitted slot; released on drop
struct Permit {
    admission: Arc<Admission>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.admission.release();
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Fixed-size worker pool with memory-derived backpressure
///
/// ## Concurrency:
/// - Jobs travel over a crossbeam channel to `worker_count` threads
/// - `Admission` caps queued + running operations at `max_in_flight`
/// - All methods use `&self`; one scheduler serves every concurrent caller
pub struct IoScheduler {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    admission: Arc<Admission>,
}

impl IoScheduler {
    /// Start `worker_count` workers admitting at most `max_in_flight` ops
    pub fn new(worker_count: usize, max_in_flight: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(StoreError::Capacity(
                "scheduler needs at least one worker".to_string(),
            ));
        }
        if max_in_flight == 0 {
            return Err(StoreError::Capacity(
                "memory budget admits no parts in flight".to_string(),
            ));
        }

        let (sender, receiver) = channel::unbounded::<Job>();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("chunkstore-io-{}", worker_id))
                .spawn(move || {
                    trace!(worker_id, "io worker started");
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                    trace!(worker_id, "io worker stopped");
                })?;
            workers.push(handle);
        }

        debug!(worker_count, max_in_flight, "io scheduler started");

        Ok(Self {
            sender: Some(sender),
            workers,
            admission: Arc::new(Admission::new(max_in_flight)),
        })
    }

    /// Run every operation and return their results in submission order
    pub fn submit_batch<T, I>(&self, ops: I) -> Vec<Result<T>>
    where
        T: Send + 'static,
        I: IntoIterator<Item = PartOp<T>>,
    {
        self.submit(ops, None).results
    }

    /// Like [`submit_batch`](Self::submit_batch), but stops admitting new
    /// operations once `cancel` fires
    ///
    /// Operations already dispatched are allowed to finish and their results
    /// are returned; operations never pulled from `ops` have no result.
    pub fn submit<T, I>(&self, ops: I, cancel: Option<&CancelToken>) -> BatchOutcome<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = PartOp<T>>,
    {
        let (result_tx, result_rx) = channel::unbounded::<(usize, Result<T>)>();
        let mut slots: Vec<Option<Result<T>>> = Vec::new();
        let mut dispatched = 0;
        let mut cancelled = false;

        let mut ops = ops.into_iter();
        loop {
            let Some(permit) = self.admission.acquire(cancel) else {
                cancelled = true;
                break;
            };
            let Some(op) = ops.next() else {
                break;
            };

            let index = slots.len();
            slots.push(None);

            let result_tx = result_tx.clone();
            let job: Job = Box::new(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(op))
                    .unwrap_or_else(|payload| Err(StoreError::WorkerPanic(panic_message(payload))));
                drop(permit);
                let _ = result_tx.send((index, outcome));
            });

            match &self.sender {
                Some(sender) if sender.send(job).is_ok() => dispatched += 1,
                _ => {
                    slots[index] = Some(Err(StoreError::Capacity(
                        "io scheduler is shut down".to_string(),
                    )));
                }
            }
        }
        drop(result_tx);

        for _ in 0..dispatched {
            match result_rx.recv() {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(_) => break,
            }
        }

        let results = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(StoreError::WorkerPanic("operation result was lost".to_string()))
                })
            })
            .collect();

        BatchOutcome { results, cancelled }
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Admission cap (`max_memory / part_size`)
    pub fn max_in_flight(&self) -> usize {
        self.admission.limit
    }

    /// Operations currently admitted
    pub fn in_flight(&self) -> usize {
        self.admission.state.lock().in_flight
    }

    /// Highest in-flight count observed since start
    pub fn peak_in_flight(&self) -> usize {
        self.admission.state.lock().peak
    }
}

impl Drop for IoScheduler {
    fn drop(&mut self) {
        // Closing the channel lets workers finish queued jobs and exit
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!("io scheduler stopped");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
