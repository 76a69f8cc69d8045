use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;

use crate::{
    audio::{player::RadioPlayer, voice::SongbirdConnector},
    bot::RadioBot,
    config::Config,
    sources::{DirectFetchClient, StationCatalog, StationStreamOpener, TranscodeSupervisor},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("radio_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎙️ Starting Malaysian Radio Bot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    let catalog = Arc::new(StationCatalog::load(config.stations_file.as_deref()).await?);
    if catalog.is_empty() {
        anyhow::bail!("The station catalog is empty");
    }

    let opener = StationStreamOpener::new(
        TranscodeSupervisor::new(config.transcode_settings()),
        DirectFetchClient::new(config.fetch_settings())?,
    );

    let songbird = Songbird::serenity();
    let player = RadioPlayer::new(
        Arc::new(SongbirdConnector::new(songbird.clone())),
        Arc::new(opener),
        config.player_settings(),
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let config = Arc::new(config);
    let handler = RadioBot::new(config.clone(), catalog, player.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();

    info!("🚀 Bot started");
    tokio::select! {
        result = client.start() => {
            if let Err(why) = result {
                error!("Client error: {:?}", why);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Could not listen for Ctrl+C: {:?}", e);
            }
            info!("⚠️ Shutdown signal received, closing {} sessions...", player.active_sessions());
            player.shutdown_all().await;
            shard_manager.shutdown_all().await;
        }
    }

    Ok(())
}

/// Exits non-zero when no decoder binary can be found.
async fn health_check(config: &Config) -> Result<()> {
    let supervisor = TranscodeSupervisor::new(config.transcode_settings());

    match supervisor.resolve_decoder().await {
        Ok(path) => {
            println!("OK ({})", path.display());
            Ok(())
        }
        Err(e) => anyhow::bail!("Missing dependencies: {}", e),
    }
}
