mod browser;
mod core;
mod http;

use likelater_core::config::Config;
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = likelater_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,likelater_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // Event channel; all external inputs funnel into DaemonCore
    let (event_tx, event_rx) = mpsc::channel::<core::DaemonEvent>(256);

    let daemon_core = core::DaemonCore::new(config.clone());

    // Mirror committed queue changes into the log so operators can tail
    // the daemon without a client attached.
    let mut queue_updates = daemon_core.queue().subscribe();
    tokio::spawn(async move {
        loop {
            match queue_updates.recv().await {
                Ok(_) => tracing::debug!("queue state committed"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("missed {} queue updates", n);
                }
                Err(_) => break,
            }
        }
    });

    // Start HTTP API if enabled
    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            daemon_core.queue(),
            daemon_core.auth(),
            event_tx.clone(),
        );
    }

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}
