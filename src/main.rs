use std::process::ExitCode;
use token_sidecar::event_loop::{self, ExitReason};
use token_sidecar::signer::Signer;
use token_sidecar::{config, errors::ConfigError};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(ConfigError::MissingRequired(name)) => {
            error!(%name, "required configuration missing");
            return ExitCode::FAILURE;
        }
        Err(ConfigError::InvalidSecretKey) => {
            error!("SECRET_KEY must be a 64-character hex string");
            return ExitCode::FAILURE;
        }
    };

    // `cfg` is still needed below (by reference) for the event loop, so
    // the signer gets its own explicit clone of the key rather than
    // consuming `cfg.secret_key` out of the struct.
    let signer = Signer::new(cfg.secret_key.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(watch_for_shutdown(shutdown_tx));

    info!("starting event loop");
    let reason = event_loop::run(&cfg, &signer, shutdown_rx).await;

    match reason {
        ExitReason::Shutdown => {
            info!("shut down gracefully");
            ExitCode::SUCCESS
        }
        ExitReason::Fatal => {
            error!("exiting due to a fatal condition");
            ExitCode::FAILURE
        }
    }
}

/// Waits for SIGINT or SIGTERM and flips the shared shutdown flag,
/// signaling a watch channel instead of driving a web framework's
/// built-in graceful shutdown.
async fn watch_for_shutdown(tx: watch::Sender<bool>) {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); }
        _ = terminate => { info!("received SIGTERM, shutting down"); }
    }

    let _ = tx.send(true);
}
