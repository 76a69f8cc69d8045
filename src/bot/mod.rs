//! # Bot Module
//!
//! Serenity event handler for the radio bot.
//!
//! [`RadioBot`] owns the station catalog and the [`RadioPlayer`]; slash
//! commands and message components are routed to [`handlers`], which only
//! talk to the player through its public operations.

use anyhow::Result;
use serenity::{
    all::{ActivityData, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::player::RadioPlayer, config::Config, sources::StationCatalog};

pub struct RadioBot {
    config: Arc<Config>,
    pub catalog: Arc<StationCatalog>,
    pub player: RadioPlayer,
}

impl RadioBot {
    pub fn new(config: Arc<Config>, catalog: Arc<StationCatalog>, player: RadioPlayer) -> Self {
        Self {
            config,
            catalog,
            player,
        }
    }

    /// Registers slash commands, per guild when `GUILD_ID` is configured.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id, &self.catalog)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registering guild commands: {:?}", e);
                        anyhow::anyhow!(
                            "Could not register guild commands. Check that the bot has the 'applications.commands' permission in the guild."
                        )
                    })?;
                info!("✅ Guild commands registered for: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx, &self.catalog)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registering global commands: {:?}", e);
                        anyhow::anyhow!("Could not register global commands.")
                    })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RadioBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());
        info!("📻 {} stations available", self.catalog.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }

        ctx.set_activity(Some(ActivityData::listening("Malaysian Radio Stations")));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("Error handling command: {:?}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                    error!("Error handling component: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Stops the guild's session when someone disconnects the bot from voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot disconnected from voice in guild {}", guild_id);
                let announce = self.player.announce_channel(guild_id);

                if self.player.stop(guild_id).await {
                    if let Some(channel) = announce {
                        if let Err(e) = channel
                            .say(&ctx.http, "📻 Disconnected from the voice channel, radio stopped.")
                            .await
                        {
                            warn!("Could not post to {}: {:?}", channel, e);
                        }
                    }
                }
            }
        }
    }
}
