//! Seams between the voice session and the platform's voice stack.
//!
//! The session only talks to these traits; [`super::voice`] implements them on
//! top of songbird and the tests implement them with in-memory fakes.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

use crate::{error::PlayerResult, sources::ByteStream};

/// Every station plays at half volume to avoid clipping.
pub const PLAYBACK_VOLUME: f32 = 0.5;

const KNOWN_EXTENSIONS: [&str; 8] = ["mp3", "aac", "m4a", "ogg", "opus", "flac", "wav", "webm"];

/// How the engine must decode a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFormat {
    /// Container/codec stream detected by the decoder, with whatever hints we have.
    Encoded {
        extension: Option<String>,
        mime_type: Option<String>,
    },
    /// Interleaved f32 little-endian PCM straight from ffmpeg.
    RawPcm { sample_rate: u32, channels: u32 },
}

impl StreamFormat {
    /// Builds the hint for a direct stream from its final URL and `Content-Type`.
    pub fn encoded_for(url: &str, content_type: Option<&str>) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| KNOWN_EXTENSIONS.contains(&ext.as_str()));

        let mime_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_lowercase())
            .filter(|ct| !ct.is_empty());

        StreamFormat::Encoded { extension, mime_type }
    }
}

/// Byte stream plus everything the engine needs to play it.
pub struct PlayableResource {
    pub stream: ByteStream,
    pub format: StreamFormat,
    pub volume: f32,
}

/// Engine state as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineStatus {
    #[default]
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Lifecycle events emitted for the resource currently playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Buffering,
    Playing,
    Paused,
    /// The stream ended without anyone asking it to.
    Idle,
    Error(String),
}

/// Transport-level connection events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Ready,
    /// The driver is re-establishing the connection on its own.
    Connecting,
    Disconnected,
}

pub type EngineEvents = mpsc::UnboundedSender<EngineEvent>;

/// Audio output state machine. One per session.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Replaces whatever is playing. Events for this resource go to `events` only.
    async fn play(&self, resource: PlayableResource, events: EngineEvents) -> PlayerResult<()>;

    /// `false` when there is nothing to pause.
    fn pause(&self) -> bool;

    /// `false` when not paused.
    fn unpause(&self) -> bool;

    async fn stop(&self) -> PlayerResult<()>;

    fn status(&self) -> EngineStatus;
}

/// Voice connection owned by a session.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Leaves the channel and releases the connection. Safe to call twice.
    async fn destroy(&self) -> PlayerResult<()>;
}

/// Result of joining a voice channel.
pub struct VoiceLink {
    pub transport: Arc<dyn VoiceTransport>,
    pub engine: Arc<dyn PlaybackEngine>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Joins voice channels.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Joins `channel_id` and waits (at most `ready_timeout`) until audio can flow.
    /// Nothing is left behind on failure.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        ready_timeout: Duration,
    ) -> PlayerResult<VoiceLink>;
}
