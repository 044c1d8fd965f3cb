use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use credgate::cli::Cli;
use credgate::config;
use credgate::logging::{self, audit::AuditLog, redact};
use credgate::plugins::{PluginRegistry, ProxyContext};
use credgate::server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Config first: the secret set must exist before any logging happens.
    let config = match config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("credgate: {e}");
            std::process::exit(1);
        }
    };

    redact::install_masker(redact::Masker::new(config.secret_values()));
    logging::init_logging(logging::LogConfig::from_env())?;

    if let Some(path) = &config.audit_log {
        AuditLog::init(path.clone()).await;
    }

    let config = Arc::new(config);
    let registry = match PluginRegistry::build(&config) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            eprintln!("credgate: {e}");
            std::process::exit(1);
        }
    };
    if registry.is_empty() {
        warn!("no plugins configured; only /health will respond usefully");
    }

    let state = AppState {
        ctx: ProxyContext::new(config.clone()),
        registry: registry.clone(),
    };
    let app = create_router(state);

    let port = cli.port.unwrap_or(config.port);
    let addr = format!("{}:{}", cli.host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("credgate v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "listening on {addr} ({} plugin(s): {})",
        registry.len(),
        config.plugin_names().collect::<Vec<_>>().join(", ")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("credgate shut down");
    Ok(())
}

/// Resolve once the process is asked to stop: Ctrl+C anywhere, SIGTERM on
/// unix (what service managers send).
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term_stream = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("no SIGTERM handler available ({e}); stopping on Ctrl+C only");
            None
        }
    };
    let sigterm = async {
        match term_stream.as_mut() {
            Some(stream) => {
                stream.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("stop requested (ctrl-c)"),
        _ = sigterm => info!("stop requested (SIGTERM)"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // Only Ctrl+C is available off unix.
    let _ = tokio::signal::ctrl_c().await;
}
