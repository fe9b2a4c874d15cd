use clap::Parser;
use color_eyre::Result;
use playback_engine::DeviceOutput;
use playback_server::{CliArgs, Config, Listener};
use queue_player::{Coordinator, Router};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "playback_server=info,queue_player=info,playback_engine=info".into()
            }),
        )
        .init();

    let config = Config::from_args(CliArgs::parse());

    let listener = Listener::bind(config.clone()).await?;
    let shutdown = listener.shutdown_handle();

    let (router, inbox) = Router::channel();
    let coordinator = Coordinator::new(config.player, inbox, Arc::new(DeviceOutput::new()));
    let player = tokio::spawn(coordinator.run(shutdown.clone()));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, shutting down");
                    shutdown.cancel();
                }
                Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
            }
        }
    });

    listener.run(router).await;
    player.await?;

    info!("Playback server stopped");
    Ok(())
}
