use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use huddle_bridge::{BridgePoller, PollerConfig, TelegramBridge};
use huddle_core::{BridgeApi, Config};
use huddle_server::{AppState, ServerConfig, ServerHandle};

const PUSH_DISABLE_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("reading configuration from environment")?;
    tracing::info!(bridge_room = %config.bridge_room, "starting huddle relay");

    let bridge: Arc<dyn BridgeApi> = Arc::new(TelegramBridge::new(&config.bridge));
    let server_config = ServerConfig {
        port: config.port,
        ..Default::default()
    };
    let state = AppState::new(Arc::clone(&bridge), server_config.max_send_queue);

    // One-shot push disable so the first poll cycle starts clean; the poller
    // retries this every cycle anyway.
    match tokio::time::timeout(PUSH_DISABLE_TIMEOUT, bridge.disable_push()).await {
        Ok(Ok(())) => tracing::info!("push delivery disabled, polling takes over"),
        Ok(Err(e)) => tracing::warn!(error = %e, "could not disable push delivery"),
        Err(_) => tracing::warn!("push disable timed out, poller will retry"),
    }

    let cancel = CancellationToken::new();
    let poller = BridgePoller::new(
        Arc::clone(&bridge),
        state.broadcaster.clone(),
        config.bridge_room.clone(),
        PollerConfig::default(),
    );
    let poller_handle = poller.spawn(cancel.clone());

    let handle: ServerHandle = huddle_server::start(server_config, state)
        .await
        .context("binding server port")?;

    tracing::info!(port = handle.port, "huddle relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("shutting down");
    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, poller_handle).await.is_err() {
        tracing::warn!("bridge poller did not stop within the grace period");
    }
    tracing::info!("shutdown complete");
    Ok(())
}
