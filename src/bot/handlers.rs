use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    audio::now_playing::NowPlayingCard,
    bot::RadioBot,
    sources::{catalog::ALL_REGIONS, MediaSource},
    ui::{buttons, embeds},
};

const NOTHING_PLAYING: &str = "❌ Nothing is currently playing!";
const NOT_IN_VOICE: &str = "❌ You need to be in a voice channel to play radio!";
const STATION_NOT_FOUND: &str = "❌ Station not found!";
const PLAY_FAILED: &str = "❌ Failed to play the radio station. Please try again.";
const STOPPED: &str = "⏹️ Stopped playing and left the voice channel.";

/// Handles slash commands.
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &RadioBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside of a server"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "stations" => handle_stations(ctx, &command, bot).await?,
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, guild_id, bot).await?,
        "pause" => {
            let message = if bot.player.pause(guild_id) {
                "⏸️ Paused"
            } else {
                NOTHING_PLAYING
            };
            reply_ephemeral(ctx, &command, message).await?;
        }
        "resume" => {
            let message = if bot.player.resume(guild_id) {
                "▶️ Resumed"
            } else {
                "❌ The radio is not paused!"
            };
            reply_ephemeral(ctx, &command, message).await?;
        }
        "stop" => {
            let message = if bot.player.stop(guild_id).await {
                STOPPED
            } else {
                NOTHING_PLAYING
            };
            reply_ephemeral(ctx, &command, message).await?;
        }
        _ => reply_ephemeral(ctx, &command, "❌ Unknown command").await?,
    }

    Ok(())
}

/// Handles buttons and select menus.
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &RadioBot) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Component used outside of a server"))?;

    info!(
        "🔘 {} pressed by {} in guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let custom_id = component.data.custom_id.as_str();

    if custom_id == buttons::button_ids::STATION_SELECT {
        return handle_station_select(ctx, &component, bot).await;
    }

    if custom_id == buttons::button_ids::PAUSE {
        return handle_pause_toggle(ctx, &component, guild_id, bot).await;
    }

    if custom_id == buttons::button_ids::STOP {
        if bot.player.stop(guild_id).await {
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .content(STOPPED)
                            .embeds(vec![])
                            .components(vec![]),
                    ),
                )
                .await?;
        } else {
            component
                .create_response(&ctx.http, ephemeral_message(NOTHING_PLAYING))
                .await?;
        }
        return Ok(());
    }

    if let Some(station_id) = buttons::parse_play_button(custom_id) {
        return handle_play_button(ctx, &component, guild_id, station_id, bot).await;
    }

    component
        .create_response(&ctx.http, ephemeral_message("❌ Unknown action"))
        .await?;
    Ok(())
}

async fn handle_stations(ctx: &Context, command: &CommandInteraction, bot: &RadioBot) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let region = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "region")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or(ALL_REGIONS);

    let stations = bot.catalog.by_region(region);
    if stations.is_empty() {
        command
            .edit_response(
                &ctx.http,
                EditInteractionResponse::new().content("❌ No stations found for that state."),
            )
            .await?;
        return Ok(());
    }

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embeds::stations_embed(region, &stations))
                .components(vec![buttons::station_select_menu(&stations)]),
        )
        .await?;

    Ok(())
}

async fn handle_play(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, bot: &RadioBot) -> Result<()> {
    let station_id = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "station")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing station option"))?;

    let Some(station) = bot.catalog.get(station_id) else {
        return reply_ephemeral(ctx, command, STATION_NOT_FOUND).await;
    };

    let Some((voice_channel, voice_name)) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply_ephemeral(ctx, command, NOT_IN_VOICE).await;
    };

    // Joining and opening the stream can take a while.
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let response = start_station(bot, guild_id, voice_channel, &voice_name, station, command.channel_id).await;
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

async fn handle_play_button(
    ctx: &Context,
    component: &ComponentInteraction,
    guild_id: GuildId,
    station_id: &str,
    bot: &RadioBot,
) -> Result<()> {
    let Some(station) = bot.catalog.get(station_id) else {
        component
            .create_response(&ctx.http, ephemeral_message(STATION_NOT_FOUND))
            .await?;
        return Ok(());
    };

    let Some((voice_channel, voice_name)) = user_voice_channel(ctx, guild_id, component.user.id) else {
        component
            .create_response(&ctx.http, ephemeral_message(NOT_IN_VOICE))
            .await?;
        return Ok(());
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let response = start_station(bot, guild_id, voice_channel, &voice_name, station, component.channel_id).await;
    component.edit_response(&ctx.http, response).await?;

    Ok(())
}

/// Plays `station` and builds the reply; failures become a generic message.
async fn start_station(
    bot: &RadioBot,
    guild_id: GuildId,
    voice_channel: ChannelId,
    voice_name: &str,
    station: Arc<MediaSource>,
    text_channel: ChannelId,
) -> EditInteractionResponse {
    match bot
        .player
        .play(guild_id, voice_channel, station.clone(), Some(text_channel))
        .await
    {
        Ok(()) => EditInteractionResponse::new()
            .content(format!("✅ Joined **{}**", voice_name))
            .embed(embeds::now_playing_embed(&NowPlayingCard::new(&station, true)))
            .components(buttons::player_controls(false)),
        Err(e) => {
            error!("❌ Could not play {} in guild {}: {}", station.name(), guild_id, e);
            EditInteractionResponse::new()
                .content(PLAY_FAILED)
                .embed(embeds::create_error_embed(station.name(), &e.to_string()))
        }
    }
}

async fn handle_station_select(ctx: &Context, component: &ComponentInteraction, bot: &RadioBot) -> Result<()> {
    let ComponentInteractionDataKind::StringSelect { values } = &component.data.kind else {
        return Ok(());
    };

    let Some(station) = values.first().and_then(|id| bot.catalog.get(id)) else {
        component
            .create_response(&ctx.http, ephemeral_message(STATION_NOT_FOUND))
            .await?;
        return Ok(());
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::station_embed(&station))
                    .components(vec![buttons::play_button(&station)])
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_pause_toggle(
    ctx: &Context,
    component: &ComponentInteraction,
    guild_id: GuildId,
    bot: &RadioBot,
) -> Result<()> {
    let playing = if bot.player.is_paused(guild_id) {
        bot.player.resume(guild_id);
        true
    } else {
        bot.player.pause(guild_id);
        false
    };

    let Some(station) = bot.player.current_source(guild_id) else {
        component
            .create_response(&ctx.http, ephemeral_message(NOTHING_PLAYING))
            .await?;
        return Ok(());
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::now_playing_embed(&NowPlayingCard::new(&station, playing)))
                    .components(buttons::player_controls(!playing)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RadioBot,
) -> Result<()> {
    let Some(station) = bot.player.current_source(guild_id) else {
        return reply_ephemeral(ctx, command, NOTHING_PLAYING).await;
    };

    let card = NowPlayingCard::new(&station, bot.player.is_playing(guild_id));
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::now_playing_embed(&card))
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

// Helpers

fn ephemeral_message(content: &str) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command.create_response(&ctx.http, ephemeral_message(content)).await?;
    Ok(())
}

/// Voice channel the user is in, with its name.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<(ChannelId, String)> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)?;

    let name = guild
        .channels
        .get(&channel_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| channel_id.to_string());

    Some((channel_id, name))
}
