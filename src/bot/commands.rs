use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::sources::StationCatalog;

/// Discord's limit on fixed choices per option.
const MAX_CHOICES: usize = 25;

pub fn all_commands(catalog: &StationCatalog) -> Vec<CreateCommand> {
    vec![
        stations_command(catalog),
        play_command(catalog),
        nowplaying_command(),
        pause_command(),
        resume_command(),
        stop_command(),
    ]
}

/// Registers the commands globally (propagation can take up to an hour).
pub async fn register_global_commands(ctx: &Context, catalog: &StationCatalog) -> Result<()> {
    for command in all_commands(catalog) {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers the commands for one guild; updates are immediate.
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId, catalog: &StationCatalog) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands(catalog)).await?;

    Ok(())
}

fn stations_command(catalog: &StationCatalog) -> CreateCommand {
    let mut region = CreateCommandOption::new(CommandOptionType::String, "region", "Filter by state (optional)");
    for name in catalog.regions().into_iter().take(MAX_CHOICES) {
        region = region.add_string_choice(name.clone(), name);
    }

    CreateCommand::new("stations")
        .description("List all Malaysian radio stations")
        .add_option(region)
}

fn play_command(catalog: &StationCatalog) -> CreateCommand {
    let mut station = CreateCommandOption::new(CommandOptionType::String, "station", "Station to play").required(true);

    // Larger catalogs fall back to typing the station id.
    if catalog.len() <= MAX_CHOICES {
        for s in catalog.all() {
            station = station.add_string_choice(s.name(), s.id());
        }
    }

    CreateCommand::new("play")
        .description("Play a radio station in your voice channel")
        .add_option(station)
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show what radio station is currently playing")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the radio")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the radio")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playing radio and leave voice channel")
}
