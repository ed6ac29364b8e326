//! Restarts the focus agent when it stops answering heartbeats.

use focus_agent::config::Config;
use focus_agent::ipc::IpcClient;
use focus_agent::launchd;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("focus_watchdog=info".parse()?)
                .add_directive("focus_agent=info".parse()?),
        )
        .init();

    info!("focus watchdog starting");

    let config = Config::load().unwrap_or_default();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let client = IpcClient::new(&config.daemon.socket_path);

    loop {
        // Give the daemon a moment to come up
        tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

        tokio::select! {
            err = client.run_heartbeat_loop() => {
                error!("Heartbeat loop exited: {}", err);
                restart_if_wanted(&config);
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
                break;
            }
        }
    }

    info!("Watchdog shutting down normally");
    Ok(())
}

/// Ask launchd to restart the agent unless it was stopped on purpose.
fn restart_if_wanted(config: &Config) {
    if !config.daemon.keepalive_path().exists() {
        info!("Enforcement was stopped explicitly, not restarting");
        return;
    }

    // The agent may still be alive but wedged, so kill it before restarting.
    info!(label = %config.daemon.launchd_label, "requesting agent restart");
    if let Err(e) = launchd::restart(&config.daemon.launchd_label) {
        warn!("Failed to request restart: {}", e);
    }
}
