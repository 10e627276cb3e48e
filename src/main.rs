//! confgate - client session engine of a cluster configuration master
//!
//! Serves the line protocol with the built-in command table and
//! configuration-driven leadership.

// Use jemalloc for better multi-threaded performance
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use confgate::command::BuiltinCommands;
use confgate::config::Config;
use confgate::health::HealthServer;
use confgate::leader::{Leadership, StaticLeadership};
use confgate::metrics::Metrics;
use confgate::server::{Server, SessionContext};
use confgate::stats::SlowLog;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting confgate");

    // Load configuration
    let config = if let Some(config_path) = std::env::args().nth(1) {
        info!("Loading configuration from {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Using default configuration (set CONFGATE_* env vars to customize)");
        Config::from_env()?
    };

    info!("Configuration: {:?}", config);

    // Build tokio runtime with configured worker threads
    let mut runtime_builder = Builder::new_multi_thread();
    if config.server.worker_threads > 0 {
        runtime_builder.worker_threads(config.server.worker_threads);
        info!("Using {} worker threads", config.server.worker_threads);
    } else {
        info!("Using default worker threads (auto-detected)");
    }
    let runtime = runtime_builder.enable_all().build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let metrics = Arc::new(Metrics::new());
    let leadership: Arc<dyn Leadership> = Arc::new(StaticLeadership::from_config(&config));
    info!(
        "Starting as {}",
        if leadership.is_leader() { "leader" } else { "follower" }
    );

    let ctx = SessionContext::new(
        &config.session,
        Arc::new(BuiltinCommands::new(Arc::clone(&leadership), Handle::current())),
        Arc::clone(&leadership),
        Arc::new(SlowLog::new(config.session.slowlog_max_len)),
        Arc::clone(&metrics),
    )?;

    // Start health server in separate thread if enabled
    let health_server = if config.metrics.enabled {
        let health = Arc::new(HealthServer::new(
            Arc::clone(&metrics),
            Arc::clone(&leadership),
        ));
        let health_clone = Arc::clone(&health);
        let metrics_config = config.metrics.clone();

        std::thread::spawn(move || {
            if let Err(e) = health_clone.run(&metrics_config) {
                error!("Health server error: {}", e);
            }
        });

        Some(health)
    } else {
        None
    };

    let server = Arc::new(Server::new(
        config.server.clone(),
        Arc::new(ctx),
        cancel_token.clone(),
    ));

    if let Some(ref health) = health_server {
        health.set_ready(true);
        info!("Server is ready");
    }

    // Setup signal handlers
    let cancel_for_signal = cancel_token.clone();
    let health_for_signal = health_server.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
            }
            () = terminate() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
        cancel_for_signal.cancel();
        if let Some(health) = health_for_signal {
            health.stop();
        }
    });

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
    }

    info!("confgate stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
