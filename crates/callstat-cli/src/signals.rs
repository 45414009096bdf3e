use callstat_core::app::Shutdown;
use tracing::{error, info};

/// Trigger `shutdown` on the first SIGTERM or SIGINT.
pub async fn shutdown_on_signal(shutdown: Shutdown) {
    match wait_for_signal().await {
        Ok(signal) => {
            info!(signal, "Received shutdown signal");
            shutdown.trigger();
        }
        Err(e) => error!(error = %e, "Failed to install signal handlers"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    info!("Listening for SIGTERM and SIGINT");

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
