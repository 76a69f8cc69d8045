use crate::sources::MediaSource;

pub const PLAYING_COLOUR: u32 = 0x00ff00;
pub const PAUSED_COLOUR: u32 = 0xff0000;
pub const DEFAULT_THUMBNAIL: &str = "https://cdn.discordapp.com/embed/avatars/0.png";
pub const FOOTER: &str = "Malaysian Radio Bot 🎙️";

/// What the UI shows for the station a guild is tuned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingCard {
    pub title: String,
    pub description: String,
    pub colour: u32,
    /// `(name, value)`, rendered inline.
    pub fields: Vec<(String, String)>,
    pub thumbnail: String,
    pub footer: String,
}

impl NowPlayingCard {
    pub fn new(source: &MediaSource, playing: bool) -> Self {
        let (title, colour) = if playing {
            ("🎵 Now Playing", PLAYING_COLOUR)
        } else {
            ("⏸️ Now Paused", PAUSED_COLOUR)
        };

        Self {
            title: title.to_string(),
            description: format!("**{}**", source.name()),
            colour,
            fields: vec![
                ("Frequency".to_string(), source.frequency().to_string()),
                ("State".to_string(), source.region().to_string()),
                ("Category".to_string(), source.category().to_string()),
            ],
            thumbnail: source.logo().unwrap_or(DEFAULT_THUMBNAIL).to_string(),
            footer: FOOTER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hitz() -> MediaSource {
        MediaSource::new("hitz-fm", "Hitz FM", "https://example.com/playlist.m3u8")
            .with_frequency("92.9 FM")
            .with_region("Kuala Lumpur")
            .with_category("Music")
    }

    #[test]
    fn test_playing_card() {
        let card = NowPlayingCard::new(&hitz(), true);

        assert_eq!(card.title, "🎵 Now Playing");
        assert_eq!(card.description, "**Hitz FM**");
        assert_eq!(card.colour, PLAYING_COLOUR);
        assert_eq!(
            card.fields,
            vec![
                ("Frequency".to_string(), "92.9 FM".to_string()),
                ("State".to_string(), "Kuala Lumpur".to_string()),
                ("Category".to_string(), "Music".to_string()),
            ]
        );
        assert_eq!(card.thumbnail, DEFAULT_THUMBNAIL);
    }

    #[test]
    fn test_paused_card_uses_logo() {
        let card = NowPlayingCard::new(&hitz().with_logo("https://example.com/hitz.png"), false);

        assert_eq!(card.title, "⏸️ Now Paused");
        assert_eq!(card.colour, PAUSED_COLOUR);
        assert_eq!(card.thumbnail, "https://example.com/hitz.png");
        assert_eq!(card.footer, FOOTER);
    }
}
