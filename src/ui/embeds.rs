use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::sync::Arc;

use crate::{audio::now_playing::NowPlayingCard, sources::MediaSource};

/// Embed colours.
pub mod colors {
    use serenity::all::Colour;

    pub const CATALOG_BLUE: Colour = Colour::new(0x0099ff);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
}

/// Stations listed in one embed before the rest is summarised.
const MAX_LISTED_STATIONS: usize = 25;

/// Renders the display record built by the audio core.
pub fn now_playing_embed(card: &NowPlayingCard) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(&card.title)
        .description(&card.description)
        .color(card.colour)
        .thumbnail(&card.thumbnail)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(&card.footer));

    for (name, value) in &card.fields {
        embed = embed.field(name, field_value(value), true);
    }

    embed
}

/// Listing for `/stations`.
pub fn stations_embed(region: &str, stations: &[Arc<MediaSource>]) -> CreateEmbed {
    let mut description = stations
        .iter()
        .take(MAX_LISTED_STATIONS)
        .enumerate()
        .map(|(i, s)| {
            format!(
                "**{}. {}** ({})\n📍 {} • 📻 {}",
                i + 1,
                s.name(),
                s.frequency(),
                s.region(),
                s.category()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    if stations.len() > MAX_LISTED_STATIONS {
        description.push_str(&format!("\n\n…and {} more", stations.len() - MAX_LISTED_STATIONS));
    }

    CreateEmbed::default()
        .title(format!("🎙️ Malaysian Radio Stations - {}", region))
        .description(description)
        .color(colors::CATALOG_BLUE)
        .footer(CreateEmbedFooter::new(format!("Total: {} stations", stations.len())))
        .timestamp(Timestamp::now())
}

/// Card shown after picking a station from the menu.
pub fn station_embed(station: &MediaSource) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("🎙️ {}", station.name()))
        .description(field_value(station.category()))
        .color(colors::CATALOG_BLUE)
        .field("Frequency", field_value(station.frequency()), true)
        .field("State", field_value(station.region()), true)
        .field("Category", field_value(station.category()), true)
        .footer(CreateEmbedFooter::new(
            "Click Play to start streaming in your voice channel!",
        ));

    if let Some(logo) = station.logo() {
        embed = embed.thumbnail(logo);
    }

    embed
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

// Discord rejects empty field values.
fn field_value(value: &str) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StationCatalog;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stations_embed_lists_and_counts() {
        let catalog = StationCatalog::builtin().unwrap();
        let stations = catalog.by_region("Sarawak");
        let json = serde_json::to_value(stations_embed("Sarawak", &stations)).unwrap();

        assert_eq!(json["title"], "🎙️ Malaysian Radio Stations - Sarawak");
        assert_eq!(json["footer"]["text"], "Total: 2 stations");
        assert!(json["description"].as_str().unwrap().starts_with("**1. "));
    }

    #[test]
    fn test_now_playing_embed_renders_card() {
        let station = MediaSource::new("x", "X FM", "http://x").with_frequency("1.0 FM");
        let json = serde_json::to_value(now_playing_embed(&NowPlayingCard::new(&station, false))).unwrap();

        assert_eq!(json["title"], "⏸️ Now Paused");
        assert_eq!(json["color"], 0xff0000);
        assert_eq!(json["fields"][0]["value"], "1.0 FM");
        assert_eq!(json["fields"][1]["value"], "-");
    }
}
