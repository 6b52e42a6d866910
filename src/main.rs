use std::sync::Arc;

use tracing::info;

use clubstay::config::Config;
use clubstay::engine::Engine;
use clubstay::notify::NotifyHub;
use clubstay::observability::transition_label;
use clubstay::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    clubstay::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let collaborators = config.load_collaborators()?;
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(config.wal_path(), notify.clone(), collaborators).await?);

    info!("clubstay started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  reservations: {}", engine.reservation_count().await);
    info!("  sweep_interval: {:?}", config.sweep_interval);
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let sweeper = tokio::spawn(reaper::run_sweeper(
        engine.clone(),
        config.sweep_interval,
        config.reminder_lead,
    ));
    let compactor = tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));

    let mut events = notify.subscribe_all();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    "event {} reservation={} member={}",
                    transition_label(&event),
                    event.reservation_id(),
                    event.member_id()
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("event log lagged, {n} events skipped")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Graceful shutdown: wait for SIGTERM/ctrl-c, stop background tasks, compact
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received");

    sweeper.abort();
    compactor.abort();
    event_log.abort();

    if let Err(e) = engine.compact_wal().await {
        tracing::error!("final compaction failed: {e}");
    }
    info!("clubstay stopped");
    Ok(())
}
