//! Refresh Coordinator Integration Tests
//!
//! Timing, coalescing and teardown behaviour of widget refreshes, driven
//! with paused tokio time.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use dashboard_sync::domain::refresh::RefreshPhase;
use dashboard_sync::{
    FnSource, RefreshConfig, RefreshError, RefreshSource, RefreshTrigger, activate,
};

/// A source whose fetches block until the test releases a permit.
struct GatedSource {
    gate: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl RefreshSource for GatedSource {
    type Snapshot = usize;

    async fn fetch(&self) -> Result<usize, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.gate
            .acquire()
            .await
            .map_err(|e| RefreshError::message(e.to_string()))?
            .forget();
        Ok(n)
    }
}

fn gated_source(gate: Arc<Semaphore>, calls: Arc<AtomicUsize>) -> GatedSource {
    GatedSource { gate, calls }
}

#[tokio::test(start_paused = true)]
async fn test_interval_and_event_schedule() {
    let start = Instant::now();
    let fetched_at: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&fetched_at);
    let source = FnSource::new(move || {
        log.lock().push(start.elapsed().as_secs());
        async { Ok::<_, RefreshError>(()) }
    });

    let handle = activate(source, RefreshConfig::new("bbo", Duration::from_secs(30)));

    tokio::time::sleep_until(start + Duration::from_secs(35)).await;
    assert!(handle.notify_event());

    tokio::time::sleep_until(start + Duration::from_secs(66)).await;
    assert_eq!(*fetched_at.lock(), vec![0, 30, 35, 65]);

    let state = handle.state();
    assert_eq!(state.completed_fetches, 4);
    assert_eq!(state.last_trigger, Some(RefreshTrigger::IntervalElapsed));
}

#[tokio::test(start_paused = true)]
async fn test_events_during_fetch_coalesce_into_one_trailing_fetch() {
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = activate(
        gated_source(Arc::clone(&gate), Arc::clone(&calls)),
        RefreshConfig::push_only("last_sale"),
    );
    let mut rx = handle.subscribe_state();
    rx.wait_for(|s| s.phase == RefreshPhase::Fetching)
        .await
        .unwrap();

    for _ in 0..5 {
        assert!(handle.notify_event());
    }
    assert!(handle.refresh());

    // Let the worker absorb every trigger before the fetch completes.
    tokio::time::sleep(Duration::from_millis(1)).await;
    gate.add_permits(10);

    rx.wait_for(|s| s.completed_fetches == 2).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3600)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let state = handle.state();
    assert_eq!(state.completed_fetches, 2);
    assert_eq!(state.snapshot.as_deref(), Some(&2));
    assert_eq!(state.last_trigger, Some(RefreshTrigger::UserAction));
}

#[tokio::test(start_paused = true)]
async fn test_triggers_queued_with_the_fetch_result_coalesce() {
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = activate(
        gated_source(Arc::clone(&gate), Arc::clone(&calls)),
        RefreshConfig::push_only("bbo"),
    );
    let mut rx = handle.subscribe_state();
    rx.wait_for(|s| s.phase == RefreshPhase::Fetching)
        .await
        .unwrap();

    // Worker wakes to a finished fetch and a full trigger queue at once.
    for _ in 0..5 {
        assert!(handle.notify_event());
    }
    gate.add_permits(100);

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let state = handle.state();
    assert_eq!(state.completed_fetches, 2);
    assert_eq!(state.phase, RefreshPhase::Idle);
    assert_eq!(state.last_trigger, Some(RefreshTrigger::EventReceived));
}

#[tokio::test(start_paused = true)]
async fn test_unmount_mid_fetch_publishes_nothing() {
    let gate = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let handle = activate(
        gated_source(Arc::clone(&gate), Arc::clone(&calls)),
        RefreshConfig::new("orders", Duration::from_secs(30)),
    );
    let mut rx = handle.subscribe_state();
    rx.wait_for(|s| s.phase == RefreshPhase::Fetching)
        .await
        .unwrap();
    let before = handle.state();

    handle.deactivate();
    gate.add_permits(10);
    tokio::time::sleep(Duration::from_secs(120)).await;

    let after = handle.state();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(after.completed_fetches, 0);
    assert_eq!(after.failed_fetches, 0);
    assert!(after.snapshot.is_none());
    assert!(after.errors.is_empty());
    assert_eq!(after.phase, before.phase);
    assert!(!rx.has_changed().unwrap_or(false));
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_last_data_and_success_clears_errors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let source = FnSource::new(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n == 2 {
                Err(RefreshError::new(vec![
                    "gateway timeout".to_string(),
                    "retry later".to_string(),
                ]))
            } else {
                Ok(n)
            }
        }
    });

    let handle = activate(source, RefreshConfig::push_only("firms"));
    let mut rx = handle.subscribe_state();
    rx.wait_for(|s| s.completed_fetches == 1).await.unwrap();

    handle.refresh();
    rx.wait_for(|s| s.failed_fetches == 1).await.unwrap();
    assert_eq!(handle.snapshot().as_deref(), Some(&1));
    assert_eq!(
        handle.errors(),
        vec!["gateway timeout".to_string(), "retry later".to_string()]
    );

    handle.refresh();
    rx.wait_for(|s| s.completed_fetches == 2).await.unwrap();
    assert_eq!(handle.snapshot().as_deref(), Some(&3));
    assert!(handle.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_never_polls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let source = FnSource::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, RefreshError>(()) }
    });

    let _handle = activate(source, RefreshConfig::push_only("fees"));
    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_polling() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let source = FnSource::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, RefreshError>(()) }
    });

    let handle = activate(source, RefreshConfig::new("symbols", Duration::from_secs(10)));
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    drop(handle);
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
