//! chunkvault - S3-compatible object storage on an embedded SQLite store

use std::path::PathBuf;
use std::sync::Arc;

use chunkvault::api::handlers::AppState;
use chunkvault::api::router::build_router;
use chunkvault::broadcast::ActivityBroadcaster;
use chunkvault::config::Config;
use chunkvault::store::TenantStore;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Version string including build timestamp for --version output
fn version_long() -> &'static str {
    // e.g. "0.3.2 (built 2026-02-23T21:40:07Z)"
    static V: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    V.get_or_init(|| {
        format!(
            "{} (built {})",
            env!("CARGO_PKG_VERSION"),
            env!("CV_BUILD_TIME"),
        )
    })
}

/// chunkvault: S3-compatible object storage on an embedded SQLite store
#[derive(Parser, Debug)]
#[command(name = "chunkvault")]
#[command(version = version_long())]
#[command(author, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Tenant database path (overrides config)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing.
    // Priority: RUST_LOG > CHUNKVAULT_LOG_LEVEL > --verbose > default
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| std::env::var("CHUNKVAULT_LOG_LEVEL").map(EnvFilter::new))
        .unwrap_or_else(|_| {
            if cli.verbose {
                EnvFilter::new("chunkvault=trace,tower_http=trace")
            } else {
                EnvFilter::new("chunkvault=debug,tower_http=debug")
            }
        });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration from file if specified, otherwise use default loading
    let mut config = if let Some(ref path) = cli.config {
        Config::from_file(path)?
    } else {
        Config::load()
    };

    // CLI overrides
    if let Some(ref addr) = cli.listen {
        config.listen_addr = addr.parse()?;
    }
    if let Some(ref db) = cli.db {
        config.db_path = db.clone();
    }

    info!(
        "Starting chunkvault v{} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("CV_BUILD_TIME"),
    );
    info!("  Listen address: {}", config.listen_addr);
    info!("  Tenant database: {:?}", config.db_path);
    info!(
        "  Max object size: {} MB",
        config.max_object_size / 1024 / 1024
    );

    if config.auth_enabled() {
        info!(
            "  Authentication: ENABLED ({} accepted secret(s))",
            config.auth_secrets.len()
        );
    } else {
        warn!("  Authentication: no secrets configured, set CHUNKVAULT_SECRETS; every real token will be rejected");
    }
    if config.allow_dev_token {
        warn!("  Dev token ENABLED, do not run this in production");
    }

    // Open the tenant store; migrations run before any request is served.
    let store = TenantStore::open(&config.db_path)?;

    let state = Arc::new(AppState {
        store,
        broadcaster: Arc::new(ActivityBroadcaster::new()),
    });
    let auth = Arc::new(config.auth_config());

    let app = build_router(state, auth, config.max_object_size as usize);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("chunkvault listening on http://{}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
