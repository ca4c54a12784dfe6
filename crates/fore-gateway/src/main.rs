use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fore_core::ForeConfig;
use fore_events::EventBroadcaster;
use fore_publisher::{build_notifier, AdapterRegistry, PublishPipeline};
use fore_scheduler::{Poller, SlotAllocator};
use fore_store::SqlitePostStore;
use tracing::{error, info, warn};

mod app;
mod auth;
mod http;

#[derive(Debug, Parser)]
#[command(name = "fore-gateway", version, about = "Scheduled publishing engine")]
struct Cli {
    /// Path to fore.toml (default: $FORE_CONFIG, then ~/.fore/fore.toml).
    #[arg(long, short)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fore_gateway=info,fore_scheduler=info,fore_publisher=info,fore_store=info,fore_events=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // load config: --config > FORE_CONFIG env > ~/.fore/fore.toml
    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("FORE_CONFIG").ok());
    let config = ForeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ForeConfig::default()
    });

    let slots = SlotAllocator::from_config(&config.slots).context("invalid [slots] configuration")?;

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let store = Arc::new(SqlitePostStore::open(db_path).context("failed to open post store")?);

    let adapters = AdapterRegistry::from_config(&config.platforms);
    if adapters.is_empty() {
        warn!("no platforms configured; due posts will fail as unsupported");
    }
    let platforms = adapters.names();

    let pipeline = Arc::new(
        PublishPipeline::new(
            store,
            Arc::new(adapters),
            build_notifier(&config),
            EventBroadcaster::from_config(&config.events),
        )
        .configured(&config),
    );

    // spawn the due-job poller in background
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poller = Arc::new(Poller::new(Arc::clone(&pipeline), &config.scheduler));
    let poller_task = tokio::spawn(poller.run(shutdown_rx.clone()));

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, pipeline, slots, platforms, shutdown_rx));
    let router = app::build_router(state);

    info!("Fore gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown requested");
            // stops the poller and closes open event streams
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = poller_task.await {
        error!(error = %e, "poller task ended abnormally");
    }
    info!("Fore gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
