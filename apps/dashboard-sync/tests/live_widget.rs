//! Live Widget Integration Tests
//!
//! Mounts widgets against a local feed server and checks that pushed events
//! drive refreshes only while mounted.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use dashboard_sync::{EventKind, FeedClient, FnSource, LiveWidget, RefreshError, WidgetSpec};

mod common;

use common::{TestServer, WAIT, settings, subscribe, unsubscribe, wait_connected};

/// Long enough for a pushed frame to reach the widget on loopback.
const SETTLE: Duration = Duration::from_millis(200);

fn counting_source(
    calls: &Arc<AtomicUsize>,
) -> FnSource<impl Fn() -> std::future::Ready<Result<usize, RefreshError>> + Send + Sync + 'static>
{
    let calls = Arc::clone(calls);
    FnSource::new(move || std::future::ready(Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)))
}

fn bbo_event(symbol: &str) -> serde_json::Value {
    json!({
        "event": "bbo_statistics",
        "topic": format!("bbo_statistics:{symbol}"),
        "data": {"symbol": symbol}
    })
}

async fn connected_feed(server: &TestServer) -> FeedClient {
    let feed = FeedClient::new(settings(&server.url));
    feed.connect();
    wait_connected(&feed).await;
    feed
}

#[tokio::test]
async fn test_pushed_event_refreshes_mounted_widget() {
    let mut server = TestServer::start().await;
    let feed = connected_feed(&server).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let widget = LiveWidget::mount(
        &feed,
        WidgetSpec::new("bbo:AAPL", Duration::ZERO).for_symbol(EventKind::BboStatistics, "AAPL"),
        counting_source(&calls),
    );
    assert_eq!(server.recv().await, subscribe("bbo_statistics:AAPL"));

    let mut state = widget.subscribe_state();
    timeout(WAIT, state.wait_for(|s| s.completed_fetches == 1))
        .await
        .unwrap()
        .unwrap();

    server.push(&bbo_event("MSFT"));
    server.push(&bbo_event("AAPL"));
    timeout(WAIT, state.wait_for(|s| s.completed_fetches == 2))
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(SETTLE).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(widget.snapshot().as_deref(), Some(&2));

    feed.shutdown();
}

#[tokio::test]
async fn test_unmounted_widget_ignores_events_and_releases_topic() {
    let mut server = TestServer::start().await;
    let feed = connected_feed(&server).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let widget = LiveWidget::mount(
        &feed,
        WidgetSpec::new("last_sale:AAPL", Duration::from_secs(3600))
            .for_symbol(EventKind::LastSaleStatistics, "AAPL"),
        counting_source(&calls),
    );
    assert_eq!(server.recv().await, subscribe("last_sale_statistics:AAPL"));

    let mut state = widget.subscribe_state();
    timeout(WAIT, state.wait_for(|s| s.completed_fetches == 1))
        .await
        .unwrap()
        .unwrap();

    widget.unmount();
    assert_eq!(
        server.recv().await,
        unsubscribe("last_sale_statistics:AAPL")
    );
    assert!(feed.active_topics().is_empty());

    server.push(&json!({
        "event": "last_sale_statistics",
        "topic": "last_sale_statistics:AAPL",
        "data": {"symbol": "AAPL"}
    }));
    tokio::time::sleep(SETTLE).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    feed.shutdown();
}

#[tokio::test]
async fn test_widgets_sharing_a_topic_register_it_once() {
    let mut server = TestServer::start().await;
    let feed = connected_feed(&server).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let spec = WidgetSpec::new("bbo:AAPL", Duration::ZERO).for_symbol(EventKind::BboStatistics, "AAPL");
    let first = LiveWidget::mount(&feed, spec.clone(), counting_source(&calls));
    let second = LiveWidget::mount(&feed, spec, counting_source(&calls));
    assert_eq!(server.recv().await, subscribe("bbo_statistics:AAPL"));

    let mut first_state = first.subscribe_state();
    let mut second_state = second.subscribe_state();
    server.push(&bbo_event("AAPL"));
    timeout(WAIT, first_state.wait_for(|s| s.completed_fetches == 2))
        .await
        .unwrap()
        .unwrap();
    timeout(WAIT, second_state.wait_for(|s| s.completed_fetches == 2))
        .await
        .unwrap()
        .unwrap();

    first.unmount();
    assert_eq!(feed.registry_stats().consumer_count, 1);
    assert_eq!(feed.active_topics().len(), 1);

    server.push(&bbo_event("AAPL"));
    timeout(WAIT, second_state.wait_for(|s| s.completed_fetches == 3))
        .await
        .unwrap()
        .unwrap();

    second.unmount();
    assert_eq!(server.recv().await, unsubscribe("bbo_statistics:AAPL"));

    feed.shutdown();
}
