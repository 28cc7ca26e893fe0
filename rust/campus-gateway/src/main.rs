//! Campus Gateway - Main Entry Point

use clap::Parser;
use mimalloc::MiMalloc;

use campus_gateway::config::AppConfig;
use campus_gateway::logging::init_tracing;
use campus_gateway::server::create_app;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Command-line arguments. Anything not given here comes from the config
/// file and `CAMPUS__*` environment variables.
#[derive(Parser, Debug)]
#[command(name = "campus-gateway")]
#[command(about = "Session-holding gateway for the campus incident-reporting backend")]
#[command(version)]
struct Args {
    /// Host to bind to.
    #[arg(long, env = "CAMPUS_GATEWAY_HOST")]
    host: Option<String>,

    /// Port to listen on.
    #[arg(short, long, env = "CAMPUS_GATEWAY_PORT")]
    port: Option<u16>,

    /// Log level, overriding `logging.level`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json |= args.json_logs;

    init_tracing(&config.logging);

    tracing::info!(
        "Starting Campus Gateway v{} ({})",
        env!("CARGO_PKG_VERSION"),
        config.environment
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_app(config).await?;
    tracing::info!("Application initialized");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
