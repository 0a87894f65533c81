use anyhow::{Context, Result};
use presence_core::{BatchSummary, Outcome};
use presence_store::{AttendanceService, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod provider;

use engine::PollEvent;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("presenced starting");

    let config = config::Config::load().context("loading configuration")?;
    tracing::info!(
        db = %config.db_path.display(),
        threshold = config.match_threshold,
        poll_interval_ms = config.poll_interval_ms,
        "configuration loaded"
    );

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    let service = AttendanceService::open(Arc::new(store))
        .context("loading attendance state")?
        .with_threshold(config.match_threshold);

    let source = provider::JsonLinesProvider::open(&config.detections_path)
        .context("opening detection source")?;
    let (poller, mut events) = engine::spawn_poller(
        service,
        source,
        Duration::from_millis(config.poll_interval_ms.max(1)),
    )?;

    tracing::info!("presenced ready");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("listening for shutdown signal")?;
                break;
            }
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
        }
    }

    tracing::info!("presenced shutting down");
    let service = poller.cancel().await?;
    let recorded = service.attendance_logs(None).map(|l| l.len()).unwrap_or(0);
    tracing::info!(records = recorded, "presenced stopped");

    Ok(())
}

fn log_event(event: &PollEvent) {
    match event {
        PollEvent::Report(report) => {
            for outcome in &report.outcomes {
                match outcome {
                    Outcome::Admitted { .. } | Outcome::Throttled { .. } => {
                        tracing::info!("{outcome}")
                    }
                    Outcome::Unknown => tracing::debug!("{outcome}"),
                }
            }
            match report.summary() {
                BatchSummary::Marked(count) => {
                    tracing::info!(count, "attendance marked")
                }
                BatchSummary::UnknownFace => tracing::info!("unknown face detected"),
                BatchSummary::AllThrottled => {
                    tracing::debug!("no registered faces admitted")
                }
            }
        }
        PollEvent::NothingDetected => tracing::trace!("no faces in frame"),
        PollEvent::NoFacesRegistered => {
            tracing::warn!("no faces registered; register identities before marking attendance")
        }
        PollEvent::Failed(reason) => tracing::warn!(reason = %reason, "attendance pass failed"),
    }
}
