//! qc-rate - image quality-control rating service
//!
//! Configuration resolves command line → environment → config.toml →
//! compiled defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use qc_common::config::{defaults, load_toml_config, resolve_database_path};
use qc_common::db::init_database;
use qc_rate::config::{ServiceSettings, SettingsOverrides};
use qc_rate::{build_router, AppState};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for qc-rate
#[derive(Parser, Debug)]
#[command(name = "qc-rate")]
#[command(about = "Image quality-control rating service")]
#[command(version)]
struct Args {
    /// SQLite database file (also QCAPP_DATABASE)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "QCAPP_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "QCAPP_PORT")]
    port: Option<u16>,

    /// Seconds to wait for the next image before giving up
    #[arg(long, env = "QCAPP_TASK_TIMEOUT_SECS")]
    task_timeout_secs: Option<u64>,

    /// Concurrent selection queries
    #[arg(long, env = "QCAPP_WORKER_COUNT")]
    worker_count: Option<usize>,

    /// per-file or per-image
    #[arg(long, env = "QCAPP_SELECTION_POLICY")]
    selection_policy: Option<String>,

    /// Cookie carrying the rater's user name
    #[arg(long, env = "QCAPP_USER_COOKIE")]
    user_cookie: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = load_toml_config().context("Failed to load config file")?;

    let default_filter = format!(
        "qc_rate={level},qc_common={level},tower_http={level}",
        level = toml_config.logging.level.as_deref().unwrap_or(defaults::LOG_LEVEL)
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting qc-rate v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let settings = ServiceSettings::resolve(
        SettingsOverrides {
            host: args.host,
            port: args.port,
            task_timeout_secs: args.task_timeout_secs,
            worker_count: args.worker_count,
            selection_policy: args.selection_policy,
            user_cookie: args.user_cookie,
        },
        &toml_config.server,
    )
    .context("Invalid service settings")?;

    let db_path = resolve_database_path(args.database.as_deref(), &toml_config);
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    info!(
        "Selection: {} policy, {} workers, {}s timeout",
        settings.selection_policy,
        settings.worker_count,
        settings.task_timeout.as_secs()
    );

    let addr = settings.bind_address();
    let app = build_router(AppState::new(pool, settings));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("qc-rate listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
