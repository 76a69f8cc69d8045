use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption},
};
use std::sync::Arc;

use crate::sources::MediaSource;

/// Custom ids of the message components.
pub mod button_ids {
    pub const PAUSE: &str = "pause";
    pub const STOP: &str = "stop";
    pub const STATION_SELECT: &str = "station_select";
    pub const PLAY_PREFIX: &str = "play_";
}

/// Discord caps select menus at 25 options.
pub const MAX_MENU_OPTIONS: usize = 25;

/// Pause/resume toggle plus stop.
pub fn player_controls(paused: bool) -> Vec<CreateActionRow> {
    let toggle = if paused {
        CreateButton::new(button_ids::PAUSE)
            .label("▶️ Resume")
            .style(ButtonStyle::Success)
    } else {
        CreateButton::new(button_ids::PAUSE)
            .label("⏸️ Pause")
            .style(ButtonStyle::Primary)
    };

    let stop = CreateButton::new(button_ids::STOP)
        .label("⏹️ Stop")
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![toggle, stop])]
}

pub fn play_button(station: &MediaSource) -> CreateActionRow {
    CreateActionRow::Buttons(vec![CreateButton::new(play_button_id(station.id()))
        .label("▶️ Play")
        .style(ButtonStyle::Success)])
}

pub fn play_button_id(station_id: &str) -> String {
    format!("{}{}", button_ids::PLAY_PREFIX, station_id)
}

/// Station id carried by a `play_<id>` button.
pub fn parse_play_button(custom_id: &str) -> Option<&str> {
    custom_id
        .strip_prefix(button_ids::PLAY_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Menu for picking a station; only the first [`MAX_MENU_OPTIONS`] fit.
pub fn station_select_menu(stations: &[Arc<MediaSource>]) -> CreateActionRow {
    let options = stations
        .iter()
        .take(MAX_MENU_OPTIONS)
        .map(|s| {
            CreateSelectMenuOption::new(s.name(), s.id())
                .description(format!("{} • {}", s.frequency(), s.region()))
                .emoji('🎙')
        })
        .collect();

    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(button_ids::STATION_SELECT, CreateSelectMenuKind::String { options })
            .placeholder("Select a station to get more info"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_play_button_ids_round_trip() {
        assert_eq!(play_button_id("bfm-899"), "play_bfm-899");
        assert_eq!(parse_play_button("play_bfm-899"), Some("bfm-899"));
        assert_eq!(parse_play_button("play_"), None);
        assert_eq!(parse_play_button("pause"), None);
    }
}
