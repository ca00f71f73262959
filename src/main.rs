//! SHARPLINE — sports market edge engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! loads the dataset, grades pending picks, then scans the slate and
//! publishes the ranked feed, rescanning on an interval until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sharpline::config::{self, AppConfig};
use sharpline::dashboard::{self, DashboardState};
use sharpline::data::{InMemoryStore, StaticSignalFeed};
use sharpline::engine::batch::cancel_channel;
use sharpline::engine::{EdgeEngine, FeedReport};
use sharpline::storage;

const BANNER: &str = r#"
 ___ _  _   _   ___ ___ _    ___ _  _ ___
/ __| || | /_\ | _ \ _ \ |  |_ _| \| | __|
\__ \ __ |/ _ \|   /  _/ |__ | || .` | _|
|___/_||_/_/ \_\_|_\_| |____|___|_|\_|___|

  Grading, line-movement and trend edges
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = AppConfig::resolve_path();
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        dataset = %cfg.data.dataset_path,
        scan_interval_secs = cfg.engine.scan_interval_secs,
        "SHARPLINE starting up"
    );

    // -- Load data -------------------------------------------------------

    let dataset = storage::load_dataset(Some(&cfg.data.dataset_path))?
        .with_context(|| format!("Dataset not found: {}", cfg.data.dataset_path))?;
    let slate = dataset
        .slate
        .clone()
        .context("Dataset has no slate to scan")?;
    let slate = Arc::new(slate);

    let store = Arc::new(InMemoryStore::from_dataset(&dataset));

    // -- Initialise components -------------------------------------------

    let mut engine = EdgeEngine::new(
        store,
        cfg.signals.clone(),
        cfg.trends.clone(),
        cfg.feed.clone(),
        cfg.grading.clone(),
        cfg.engine.clone(),
    );
    let feed = StaticSignalFeed::new("external", dataset.external_signals.clone());
    if !feed.is_empty() {
        info!(signals = feed.len(), "External signal feed loaded");
        engine = engine.with_source(Arc::new(feed));
    }
    info!(sources = ?engine.sources(), games = slate.games.len(), "Engine ready");

    let state = Arc::new(DashboardState::new(cfg.feed.clone()));
    let server = if cfg.dashboard.enabled {
        Some(dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port).await?)
    } else {
        None
    };

    // -- Grade -----------------------------------------------------------

    let (cancel_tx, cancel_rx) = cancel_channel();

    let grading = engine.grade_picks(dataset.picks.clone(), cancel_rx.clone()).await;
    for g in &grading.graded {
        info!(pick_id = %g.pick.id, pick = %g.pick, outcome = %g.outcome, "Pick graded");
    }
    state.publish_grades(grading).await;

    // -- Scan loop -------------------------------------------------------

    let first = engine.scan_ranked(slate.clone(), cancel_rx.clone()).await;
    log_feed(&first, &engine);
    state.publish_feed(first).await;

    if cfg.engine.scan_interval_secs == 0 && server.is_none() {
        info!("Single scan complete.");
        return Ok(());
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    if cfg.engine.scan_interval_secs == 0 {
        info!("Serving the last scan. Press Ctrl+C to stop.");
        let _ = (&mut shutdown).await;
        info!("Shutdown signal received.");
    } else {
        let mut interval = tokio::time::interval(Duration::from_secs(cfg.engine.scan_interval_secs));
        interval.tick().await;
        info!(
            interval_secs = cfg.engine.scan_interval_secs,
            "Entering scan loop. Press Ctrl+C to stop."
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Ctrl+C during a scan cancels it; completed units are kept.
                    let scan = engine.scan_ranked(slate.clone(), cancel_rx.clone());
                    tokio::pin!(scan);
                    let report = tokio::select! {
                        report = &mut scan => report,
                        _ = &mut shutdown => {
                            info!("Shutdown signal received mid-scan, cancelling.");
                            let _ = cancel_tx.send(true);
                            let report = scan.await;
                            log_feed(&report, &engine);
                            state.publish_feed(report).await;
                            break;
                        }
                    };
                    log_feed(&report, &engine);
                    state.publish_feed(report).await;
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }
    }

    if let Some(handle) = server {
        handle.abort();
    }
    info!("SHARPLINE shut down cleanly.");
    Ok(())
}

/// Log a summary of the feed and its top entries.
fn log_feed(report: &FeedReport, engine: &EdgeEngine) {
    let high = engine
        .aggregator()
        .filter(&report.signals, &sharpline::engine::aggregator::FeedFilter {
            high_confidence_only: true,
            ..Default::default()
        });
    info!(
        as_of = %report.as_of,
        units = report.units,
        signals = report.signals.len(),
        high_confidence = high.len(),
        failed_units = report.failures.len(),
        skipped_inputs = report.skipped.len(),
        cancelled = report.cancelled,
        "Feed updated"
    );
    for failure in &report.failures {
        warn!(unit = %failure.unit, error = %failure.error, "Unit failed");
    }
    for skipped in &report.skipped {
        warn!(unit = %skipped.unit, error = %skipped.error, "Input skipped");
    }
    for signal in report.signals.iter().take(10) {
        info!("  {signal}");
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sharpline=info"));

    let json_logging = std::env::var("SHARPLINE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
