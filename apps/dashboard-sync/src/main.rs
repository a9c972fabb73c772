//! Dashboard Sync Binary
//!
//! Connects to the event feed, mounts the dashboard's live widgets and keeps
//! them refreshed until shut down.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dashboard-sync
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DASHBOARD_API_URL`: REST API base URL
//! - `DASHBOARD_FEED_URL`: Websocket event feed URL
//!
//! ## Optional
//! - `DASHBOARD_POLL_INTERVAL_SECS`: Widget poll interval (default: 30)
//! - `DASHBOARD_SYMBOLS`: Comma-separated symbols to watch (default: none)
//! - `DASHBOARD_PRICE_DECIMALS` / `DASHBOARD_QUANTITY_DECIMALS` /
//!   `DASHBOARD_PERCENT_DECIMALS`: Display precision (default: 2 / 0 / 2)
//! - `DASHBOARD_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `DASHBOARD_EXPORT_DIR`: Write table exports here on shutdown
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::path::Path;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use dashboard_sync::infrastructure::export::{self, ExportFormat};
use dashboard_sync::infrastructure::health::{HealthServer, HealthServerState};
use dashboard_sync::infrastructure::telemetry;
use dashboard_sync::{
    ApiClient, BboStatistics, DashboardConfig, EventKind, FeedClient, LiveWidget, Resource,
    ResourceSource, TableConfig, TableKind, Topic, WidgetSpec, init_metrics,
};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

type Rows = Vec<Value>;

/// A mounted widget together with the table it renders into.
struct Panel {
    widget: LiveWidget<Rows>,
    table: TableConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting dashboard sync");

    let _metrics_handle = init_metrics()?;

    let config = DashboardConfig::init_global(DashboardConfig::from_env()?);
    log_config(config);

    let shutdown_token = CancellationToken::new();

    // Event feed
    let feed = FeedClient::new(config.feed.clone());
    feed.connect();

    // REST API
    let api = ApiClient::new(&config.api)?;

    // Widgets
    let poll = config.refresh.poll_interval;
    let mut panels = vec![
        mount_panel(
            &feed,
            &api,
            WidgetSpec::new("symbols", poll),
            TableKind::Symbols,
            None,
            config,
        ),
        mount_panel(
            &feed,
            &api,
            WidgetSpec::new("orders", poll)
                .with_topic(Topic::new(EventKind::OrderStatus.as_str()))
                .on_event(EventKind::OrderStatus),
            TableKind::Orders,
            None,
            config,
        ),
    ];
    for symbol in &config.symbols {
        panels.push(mount_panel(
            &feed,
            &api,
            WidgetSpec::new(format!("bbo:{symbol}"), poll)
                .for_symbol(EventKind::BboStatistics, symbol),
            TableKind::Bbo,
            Some(symbol.as_str()),
            config,
        ));
        panels.push(mount_panel(
            &feed,
            &api,
            WidgetSpec::new(format!("last_sale:{symbol}"), poll)
                .for_symbol(EventKind::LastSaleStatistics, symbol),
            TableKind::LastSale,
            Some(symbol.as_str()),
            config,
        ));
    }

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        feed.clone(),
    ));
    for panel in &panels {
        health_state.register_widget(panel.widget.probe());
    }
    let health_server = HealthServer::new(
        config.server.health_port,
        Arc::clone(&health_state),
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    spawn_connection_logger(&feed, shutdown_token.clone());
    spawn_quote_logger(&feed, shutdown_token.clone());
    for panel in &panels {
        spawn_snapshot_logger(panel, shutdown_token.clone());
    }

    tracing::info!(widgets = panels.len(), "Dashboard sync ready");

    await_shutdown(shutdown_token).await;

    if let Some(dir) = &config.export_dir {
        export_panels(dir, &panels);
    }

    for panel in panels.drain(..) {
        health_state.unregister_widget(panel.widget.name());
        panel.widget.unmount();
    }
    feed.shutdown();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, health_task).await.is_err() {
        tracing::warn!("Health server did not stop in time");
    }

    tracing::info!("Dashboard sync stopped");
    Ok(())
}

fn mount_panel(
    feed: &FeedClient,
    api: &ApiClient,
    spec: WidgetSpec,
    kind: TableKind,
    symbol: Option<&str>,
    config: &DashboardConfig,
) -> Panel {
    let mut source = ResourceSource::new(api.clone(), Resource::from(kind));
    if let Some(symbol) = symbol {
        source = source.with_query("symbol", symbol);
    }

    Panel {
        widget: LiveWidget::mount(feed, spec, source),
        table: TableConfig::for_kind(kind, &config.decimals),
    }
}

/// Log feed connectivity changes.
fn spawn_connection_logger(feed: &FeedClient, shutdown: CancellationToken) {
    let open = feed.connection_open();
    tokio::spawn(async move {
        let mut open = pin!(open.take_until(shutdown.cancelled_owned()));
        while let Some(connected) = open.next().await {
            if connected {
                tracing::info!("Event feed connected");
            } else {
                tracing::warn!("Event feed not connected");
            }
        }
    });
}

/// Log pushed BBO updates at debug level.
fn spawn_quote_logger(feed: &FeedClient, shutdown: CancellationToken) {
    let mut quotes = feed
        .on::<BboStatistics>(EventKind::BboStatistics)
        .until(shutdown);
    tokio::spawn(async move {
        while let Some(quote) = quotes.next().await {
            tracing::debug!(
                symbol = %quote.symbol,
                bid = ?quote.bid_price,
                offer = ?quote.offer_price,
                "BBO update"
            );
        }
    });
}

/// Log each widget refresh with its visible row count and first row.
fn spawn_snapshot_logger(panel: &Panel, shutdown: CancellationToken) {
    let mut state = panel.widget.subscribe_state();
    let table = panel.table.clone();
    let name = panel.widget.name().to_string();

    tokio::spawn(async move {
        let (mut last_completed, mut last_failed) = (0, 0);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let current = state.borrow_and_update().clone();
            if current.failed_fetches != last_failed {
                last_failed = current.failed_fetches;
                tracing::warn!(widget = %name, errors = ?current.errors, "Widget refresh failed");
                continue;
            }
            if current.completed_fetches == last_completed {
                continue;
            }
            last_completed = current.completed_fetches;

            let Some(rows) = current.snapshot else {
                continue;
            };
            let visible = table.visible(rows.as_slice());
            let first = visible.first().map(|row| table.render_row(*row));
            tracing::info!(
                widget = %name,
                rows = rows.len(),
                visible = visible.len(),
                first = ?first,
                "Widget refreshed"
            );
        }
    });
}

/// Write each widget's visible rows to CSV and XLSX.
fn export_panels(dir: &Path, panels: &[Panel]) {
    for panel in panels {
        let Some(rows) = panel.widget.snapshot() else {
            continue;
        };
        let visible: Vec<Value> = panel
            .table
            .visible(rows.as_slice())
            .into_iter()
            .cloned()
            .collect();

        for format in [ExportFormat::Csv, ExportFormat::Xlsx] {
            if let Err(e) = export::write_export(dir, &panel.table, &visible, format) {
                tracing::error!(
                    widget = %panel.widget.name(),
                    format = %format,
                    error = %e,
                    "Export failed"
                );
            }
        }
    }
}

fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &DashboardConfig) {
    tracing::info!(
        api_url = %config.api.base_url,
        feed_url = %config.feed.url,
        poll_interval_secs = config.refresh.poll_interval.as_secs(),
        symbols = ?config.symbols,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        price = config.decimals.price,
        quantity = config.decimals.quantity,
        percent = config.decimals.percent,
        "Display precision"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
