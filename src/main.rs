use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use prospect_engine::config::{Credentials, EngineConfig, RuntimeConfig, ScheduleConfig};
use prospect_engine::engine::{Engine, EngineDeps};
use prospect_engine::notify::{DesktopNotifier, Outbox, spawn_dispatcher};
use prospect_engine::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let runtime = RuntimeConfig::from_env();

    // Keep the guard alive so buffered file logs are flushed on exit.
    let (file_layer, _log_guard) = match &runtime.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "prospect-engine.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    let config = EngineConfig::from_env();
    let credentials = Credentials::from_env();
    let schedule = ScheduleConfig::from_engine(&config);

    eprintln!("Prospect Engine v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", runtime.model);
    eprintln!(
        "   Thresholds: enrich >= {:.2}, notify >= {:.2}",
        config.enrichment_threshold, config.notification_threshold
    );
    eprintln!("   Step delays: {:?} days", config.step_delays);
    eprintln!(
        "   Auto-approve follow-ups: {}",
        if config.auto_approve_followups { "on" } else { "off" }
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&runtime.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", runtime.db_path.display()))?,
    );
    eprintln!("   Database: {}", runtime.db_path.display());

    // ── Notifications ────────────────────────────────────────────────────
    let (outbox, events) = Outbox::channel(256);
    let dispatcher = spawn_dispatcher(events, Arc::new(DesktopNotifier));

    // ── Engine ───────────────────────────────────────────────────────────
    let deps = EngineDeps::from_credentials(Arc::clone(&db), &credentials, &runtime.model)
        .context("failed to initialise AI provider")?;
    let engine = Arc::new(Engine::new(config, deps, outbox));

    let mut scheduler = engine
        .schedule(&schedule)
        .context("invalid job schedule")?;
    scheduler.start();
    eprintln!("   Jobs: {}", scheduler.job_ids().join(", "));
    eprintln!("   Press Ctrl+C to stop.\n");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    tracing::info!("Ctrl+C received, shutting down...");

    scheduler.stop().await;
    // The dispatcher exits once the last outbox handle is gone.
    drop(scheduler);
    drop(engine);
    if tokio::time::timeout(std::time::Duration::from_secs(5), dispatcher)
        .await
        .is_err()
    {
        tracing::warn!("Notification dispatcher did not drain in time");
    }

    Ok(())
}
