//! TransientDB - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tdb_common::logging::{init_logging, LogConfig, LogLevel};
use tokio::signal;
use tracing::info;

use tdb_server::{
    api,
    config::{Config, DEFAULT_CONFIG_PATH},
    db::{load_schemas, SqlGateway},
    ingest::{self, IngestHandle},
    maintenance::Maintenance,
};

/// The Transient Database
#[derive(Parser, Debug)]
#[command(name = "transientdb", version, about, long_about = None)]
struct Cli {
    /// Configuration file for TransientDB
    #[arg(long = "cfg", env = "TDB_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    cfg: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.cfg)?;

    // Environment variables take precedence over the configured level
    let log_config = LogConfig::default()
        .with_level(LogLevel::from_setting(&config.server.log_level))
        .with_filter_directives("tower_http=info,sqlx=warn")
        .merge_env()?;
    init_logging(&log_config)?;

    info!("Using {} file for configuration.", cli.cfg.display());

    let gateway = Arc::new(
        SqlGateway::open(&config.server.dsn)
            .await
            .context("Cannot start without a database")?,
    );

    let ingestion = match config.server.schemas_folder() {
        Some(schemas) => {
            let executed = load_schemas(&gateway, &schemas).await;
            info!(statements = executed, folder = %schemas.display(), "Schemas loaded");

            match config.server.data_folder() {
                Some(data) => ingest::spawn_folder(gateway.clone(), &data).await,
                None => IngestHandle::default(),
            }
        },
        None => IngestHandle::default(),
    };
    info!(files = ingestion.len(), "Data loading started");

    let maintenance = config
        .server
        .data_folder()
        .map(|data| Maintenance::new(gateway.clone(), data, &config.dump).start());

    let app = api::app(gateway.clone(), &config);

    let addr: SocketAddr = format!("{}:{}", config.server.listen, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.listen, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        "TransientDB [{}] {} (auth enabled={})",
        config.server.tag,
        addr,
        config.auth.required_token().is_some()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down triggered - stopping background tasks");

    if let Some(handle) = maintenance {
        handle.abort();
    }

    let reports = ingestion.shutdown(config.server.shutdown_grace()).await;
    if !reports.is_empty() {
        info!(files = reports.len(), "Data loading finished");
    }

    gateway.close().await;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
