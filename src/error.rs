//! Error types for the voice session and stream pipeline.

use std::time::Duration;

/// Result alias used across the audio core.
pub type PlayerResult<T> = std::result::Result<T, PlayerError>;

/// Everything that can go wrong while opening or keeping a station alive.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("decoder binary not found (tried {tried} location(s))")]
    DecoderNotFound { tried: usize },

    #[error("failed to spawn decoder: {0}")]
    DecoderSpawn(#[source] std::io::Error),

    #[error("decoder exited before producing audio ({reason})")]
    DecoderExited { reason: String },

    #[error("decoder produced no audio within {0:?}")]
    DecoderTimeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("station answered with HTTP {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("invalid stream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("connection to station timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("could not join voice channel: {0}")]
    VoiceJoin(String),

    #[error("voice connection not ready after {0:?}")]
    VoiceReadyTimeout(Duration),

    #[error("playback engine error: {0}")]
    Engine(String),

    #[error("playback start superseded by a newer request")]
    Superseded,

    #[error("voice session already closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    /// True when the failure only means another request took over.
    pub fn is_superseded(&self) -> bool {
        matches!(self, PlayerError::Superseded | PlayerError::SessionClosed)
    }
}
