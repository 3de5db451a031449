//! Tests for IoScheduler
//!
//! These tests verify:
//! - Results come back in submission order
//! - In-flight operations never exceed the admission cap
//! - Failures and panics stay per-operation
//! - Cancellation stops admission but drains in-flight work

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chunkstore::scheduler::{CancelToken, IoScheduler, PartOp};
use chunkstore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Tracks how many ops run at the same time
#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

fn sleepy_op(value: usize, delay_ms: u64, tracker: Arc<Concurrency>) -> PartOp<usize> {
    Box::new(move || {
        tracker.enter();
        thread::sleep(Duration::from_millis(delay_ms));
        tracker.exit();
        Ok(value)
    })
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_new_rejects_zero_workers() {
    assert!(matches!(IoScheduler::new(0, 4), Err(StoreError::Capacity(_))));
}

#[test]
fn test_new_rejects_zero_in_flight() {
    assert!(matches!(IoScheduler::new(2, 0), Err(StoreError::Capacity(_))));
}

#[test]
fn test_accessors() {
    let scheduler = IoScheduler::new(3, 5).unwrap();

    assert_eq!(scheduler.worker_count(), 3);
    assert_eq!(scheduler.max_in_flight(), 5);
    assert_eq!(scheduler.in_flight(), 0);
    assert_eq!(scheduler.peak_in_flight(), 0);
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_results_preserve_submission_order() {
    let scheduler = IoScheduler::new(4, 16).unwrap();
    let tracker = Arc::new(Concurrency::default());

    // Earlier ops sleep longer, so they finish last
    let ops: Vec<PartOp<usize>> = (0..12)
        .map(|i| sleepy_op(i, (12 - i as u64) * 3, Arc::clone(&tracker)))
        .collect();

    let results = scheduler.submit_batch(ops);

    let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, (0..12).collect::<Vec<_>>());
}

#[test]
fn test_empty_batch() {
    let scheduler = IoScheduler::new(2, 2).unwrap();

    let results = scheduler.submit_batch(Vec::<PartOp<()>>::new());

    assert!(results.is_empty());
    assert_eq!(scheduler.in_flight(), 0);
}

// =============================================================================
// Backpressure Tests
// =============================================================================

#[test]
fn test_in_flight_never_exceeds_cap() {
    let scheduler = IoScheduler::new(8, 3).unwrap();
    let tracker = Arc::new(Concurrency::default());

    let ops: Vec<PartOp<usize>> = (0..30)
        .map(|i| sleepy_op(i, 5, Arc::clone(&tracker)))
        .collect();
    let results = scheduler.submit_batch(ops);

    assert_eq!(results.len(), 30);
    assert!(tracker.max.load(Ordering::SeqCst) <= 3);
    assert!(scheduler.peak_in_flight() <= 3);
    assert_eq!(scheduler.in_flight(), 0);
}

#[test]
fn test_cap_is_shared_across_concurrent_batches() {
    let scheduler = Arc::new(IoScheduler::new(8, 4).unwrap());
    let tracker = Arc::new(Concurrency::default());
    let mut handles = vec![];

    for _ in 0..4 {
        let scheduler = Arc::clone(&scheduler);
        let tracker = Arc::clone(&tracker);
        handles.push(thread::spawn(move || {
            let ops: Vec<PartOp<usize>> = (0..10)
                .map(|i| sleepy_op(i, 3, Arc::clone(&tracker)))
                .collect();
            scheduler.submit_batch(ops)
        }));
    }

    for handle in handles {
        let results = handle.join().unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
    }
    assert!(tracker.max.load(Ordering::SeqCst) <= 4);
    assert!(scheduler.peak_in_flight() <= 4);
}

#[test]
fn test_lazy_source_is_pulled_only_when_admitted() {
    let scheduler = IoScheduler::new(4, 2).unwrap();
    let tracker = Arc::new(Concurrency::default());
    let pulled = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let ops = (0..10usize).map(|i| {
        let completed = Arc::clone(&completed);
        let tracker = Arc::clone(&tracker);
        // At most `cap` ops may have been pulled but not completed
        let outstanding = pulled.fetch_add(1, Ordering::SeqCst) + 1 - completed.load(Ordering::SeqCst);
        assert!(outstanding <= 2, "pulled {} ahead of completion", outstanding);
        Box::new(move || {
            tracker.enter();
            thread::sleep(Duration::from_millis(2));
            tracker.exit();
            completed.fetch_add(1, Ordering::SeqCst);
            Ok(i)
        }) as PartOp<usize>
    });

    let results = scheduler.submit_batch(ops);
    assert_eq!(results.len(), 10);
}

// =============================================================================
// Failure Isolation Tests
// =============================================================================

#[test]
fn test_failure_does_not_cancel_siblings() {
    let scheduler = IoScheduler::new(2, 4).unwrap();

    let ops: Vec<PartOp<usize>> = (0..6usize)
        .map(|i| {
            Box::new(move || {
                if i == 2 {
                    Err(StoreError::Capacity("boom".to_string()))
                } else {
                    Ok(i)
                }
            }) as PartOp<usize>
        })
        .collect();

    let results = scheduler.submit_batch(ops);

    assert_eq!(results.len(), 6);
    assert!(results[2].is_err());
    for (i, result) in results.iter().enumerate().filter(|(i, _)| *i != 2) {
        assert_eq!(*result.as_ref().unwrap(), i);
    }
}

#[test]
fn test_panic_is_caught_as_result() {
    let scheduler = IoScheduler::new(1, 2).unwrap();

    let ops: Vec<PartOp<u8>> = vec![
        Box::new(|| -> chunkstore::Result<u8> { panic!("worker exploded") }),
        Box::new(|| Ok(7)),
    ];
    let results = scheduler.submit_batch(ops);

    match &results[0] {
        Err(StoreError::WorkerPanic(msg)) => assert!(msg.contains("worker exploded")),
        other => panic!("expected WorkerPanic, got {:?}", other),
    }
    assert_eq!(*results[1].as_ref().unwrap(), 7);

    // The worker survived and the permit was returned
    assert_eq!(scheduler.in_flight(), 0);
    let again = scheduler.submit_batch(vec![Box::new(|| Ok(1u8)) as PartOp<u8>]);
    assert_eq!(*again[0].as_ref().unwrap(), 1);
}

// =============================================================================
// Cancellation Tests
// =============================================================================

#[test]
fn test_cancelled_before_start_admits_nothing() {
    let scheduler = IoScheduler::new(2, 2).unwrap();
    let token = CancelToken::new();
    token.cancel();

    let ops: Vec<PartOp<usize>> = (0..5usize).map(|i| Box::new(move || Ok(i)) as PartOp<usize>).collect();
    let outcome = scheduler.submit(ops, Some(&token));

    assert!(outcome.cancelled);
    assert!(outcome.results.is_empty());
}

#[test]
fn test_cancel_mid_batch_drains_dispatched_ops() {
    let scheduler = IoScheduler::new(2, 2).unwrap();
    let token = CancelToken::new();
    let ran = Arc::new(AtomicUsize::new(0));

    let ops = (0..50usize).map(|i| {
        let ran = Arc::clone(&ran);
        let token = token.clone();
        Box::new(move || {
            if i == 3 {
                token.cancel();
            }
            thread::sleep(Duration::from_millis(2));
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(i)
        }) as PartOp<usize>
    });

    let outcome = scheduler.submit(ops, Some(&token));

    assert!(outcome.cancelled);
    assert!(outcome.results.len() < 50);
    // Every admitted op ran to completion and reported
    assert_eq!(outcome.results.len(), ran.load(Ordering::SeqCst));
    for (i, result) in outcome.results.iter().enumerate() {
        assert_eq!(*result.as_ref().unwrap(), i);
    }
    assert_eq!(scheduler.in_flight(), 0);
}

#[test]
fn test_token_is_shared_between_clones() {
    let token = CancelToken::new();
    let clone = token.clone();

    assert!(!token.is_cancelled());
    clone.cancel();
    assert!(token.is_cancelled());
}
