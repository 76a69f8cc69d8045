//! # Sources Module
//!
//! Everything needed to turn a station descriptor into a live byte stream:
//!
//! - [`catalog`] - the static list of stations the bot can play
//! - [`classifier`] - decides between direct pass-through and transcoding
//! - [`direct_url`] - HTTP client for continuous MP3/AAC streams
//! - [`transcoder`] - ffmpeg supervisor for HLS/m3u8 stations
//!
//! The [`StreamOpener`] trait is the single entry point the voice session uses.

pub mod catalog;
pub mod classifier;
pub mod direct_url;
pub mod transcoder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tracing::info;

use crate::{
    audio::engine::{PlayableResource, StreamFormat, PLAYBACK_VOLUME},
    error::PlayerResult,
};

pub use catalog::StationCatalog;
pub use classifier::{classify, StreamKind};
pub use direct_url::DirectFetchClient;
pub use transcoder::{ProcessHandle, TranscodeSupervisor};

/// Boxed, unbounded audio byte stream (radio streams never end on their own).
pub type ByteStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Describes a radio station
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSource {
    id: String,
    name: String,
    frequency: String,
    #[serde(alias = "state")]
    region: String,
    category: String,
    stream_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logo: Option<String>,
}

impl MediaSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            frequency: String::new(),
            region: String::new(),
            category: String::new(),
            stream_url: stream_url.into(),
            logo: None,
        }
    }

    // Getters
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn frequency(&self) -> &str {
        &self.frequency
    }
    pub fn region(&self) -> &str {
        &self.region
    }
    pub fn category(&self) -> &str {
        &self.category
    }
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn logo(&self) -> Option<&str> {
        self.logo.as_deref()
    }

    // Builders
    pub fn with_frequency(mut self, frequency: impl Into<String>) -> Self {
        self.frequency = frequency.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_logo(mut self, logo: impl Into<String>) -> Self {
        self.logo = Some(logo.into());
        self
    }
}

/// A playable resource plus the decoder process backing it, if any.
pub struct OpenedStream {
    pub resource: PlayableResource,
    pub process: Option<Box<dyn ProcessHandle>>,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("format", &self.resource.format)
            .field("pid", &self.process.as_ref().and_then(|p| p.id()))
            .finish()
    }
}

/// Opens a station endpoint into something the playback engine can consume.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    async fn open(&self, endpoint: &str) -> PlayerResult<OpenedStream>;
}

/// Default opener: classifier first, then ffmpeg or plain HTTP.
pub struct StationStreamOpener {
    transcoder: TranscodeSupervisor,
    fetcher: DirectFetchClient,
}

impl StationStreamOpener {
    pub fn new(transcoder: TranscodeSupervisor, fetcher: DirectFetchClient) -> Self {
        Self { transcoder, fetcher }
    }
}

#[async_trait]
impl StreamOpener for StationStreamOpener {
    async fn open(&self, endpoint: &str) -> PlayerResult<OpenedStream> {
        match classify(endpoint) {
            StreamKind::Segmented => {
                info!("🎛️ Segmented stream, transcoding with ffmpeg");
                let (stream, process) = self.transcoder.start(endpoint).await?;
                Ok(OpenedStream {
                    resource: PlayableResource {
                        stream,
                        format: StreamFormat::RawPcm {
                            sample_rate: transcoder::OUTPUT_SAMPLE_RATE,
                            channels: transcoder::OUTPUT_CHANNELS,
                        },
                        volume: PLAYBACK_VOLUME,
                    },
                    process: Some(Box::new(process)),
                })
            }
            StreamKind::Direct => {
                info!("📡 Direct stream, piping through untouched");
                let direct = self.fetcher.fetch(endpoint).await?;
                let format = StreamFormat::encoded_for(direct.final_url.as_str(), direct.content_type.as_deref());
                Ok(OpenedStream {
                    resource: PlayableResource {
                        stream: direct.body,
                        format,
                        volume: PLAYBACK_VOLUME,
                    },
                    process: None,
                })
            }
        }
    }
}
