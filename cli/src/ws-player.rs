use anyhow::Result;
use lib_player::{PlayerOptions, PlayerState, WebSocketPlayer, WsConnector};
use std::sync::Arc;
use tokio::signal;

mod ws_player_logic;
use ws_player_logic::{config, logger, monitor, report};

async fn wait_for_shutdown_signal() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Explicitly install the default crypto provider for rustls (wss:// servers)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir(), config.log_level())?;

    let url = config.url()?;
    let topics = config.topics();
    let options = PlayerOptions::new(url).with_reconnect_delay(config.reconnect_delay());

    let metrics = Arc::new(monitor::ThroughputMetrics::default());
    let player = WebSocketPlayer::with_connector(options, metrics.clone(), Arc::new(WsConnector::new()));
    log::info!("Player {} subscribing to {:?}", player.player_id(), topics);

    player.set_listener(|state: PlayerState| async move {
        report::log_state(&state);
    });
    player.set_subscriptions(topics);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let monitor_handle = tokio::spawn(monitor::run(
        metrics,
        config.stats_interval(),
        shutdown_tx.subscribe(),
    ));

    wait_for_shutdown_signal().await;

    player.close();
    let _ = shutdown_tx.send(());
    let _ = monitor_handle.await;

    log::info!("Shutdown complete.");
    Ok(())
}
