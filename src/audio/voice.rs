//! songbird-backed implementations of the voice seams.

use parking_lot::{Mutex, RwLock};
use serenity::{
    async_trait,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    error::JoinError,
    input::{AsyncAdapterStream, AsyncReadOnlySource, AudioStream, Input, LiveInput, RawAdapter},
    tracks::{PlayMode, ReadyState, Track, TrackHandle},
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::engine::{
    EngineEvent, EngineEvents, EngineStatus, PlayableResource, PlaybackEngine, StreamFormat, TransportEvent,
    VoiceConnector, VoiceLink, VoiceTransport,
};
use crate::error::{PlayerError, PlayerResult};

/// Read-ahead between the network/ffmpeg and the mixer.
const STREAM_BUFFER: usize = 64 * 1024;

/// Joins voice channels through songbird.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        ready_timeout: Duration,
    ) -> PlayerResult<VoiceLink> {
        let call = match tokio::time::timeout(ready_timeout, self.manager.join(guild_id, channel_id)).await {
            Ok(Ok(call)) => call,
            Ok(Err(e)) => {
                let _ = self.manager.remove(guild_id).await;
                return Err(PlayerError::VoiceJoin(e.to_string()));
            }
            Err(_) => {
                let _ = self.manager.remove(guild_id).await;
                return Err(PlayerError::VoiceReadyTimeout(ready_timeout));
            }
        };

        info!("✅ Voice connection ready in guild {}", guild_id);

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut handler = call.lock().await;
            // A reused Call may still carry handlers from an older session.
            handler.remove_all_global_events();

            for (core_event, event) in [
                (CoreEvent::DriverDisconnect, TransportEvent::Disconnected),
                (CoreEvent::DriverReconnect, TransportEvent::Connecting),
                (CoreEvent::DriverConnect, TransportEvent::Ready),
            ] {
                handler.add_global_event(
                    Event::Core(core_event),
                    TransportForwarder {
                        guild_id,
                        event,
                        events: tx.clone(),
                    },
                );
            }
        }

        Ok(VoiceLink {
            transport: Arc::new(SongbirdTransport {
                manager: self.manager.clone(),
                guild_id,
                destroyed: AtomicBool::new(false),
            }),
            engine: Arc::new(SongbirdEngine::new(call)),
            events: rx,
        })
    }
}

struct TransportForwarder {
    guild_id: GuildId,
    event: TransportEvent,
    events: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait]
impl VoiceEventHandler for TransportForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            debug!("Driver disconnect in guild {}: {:?}", self.guild_id, data.reason);
        }

        let _ = self.events.send(self.event);
        None
    }
}

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    destroyed: AtomicBool,
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn destroy(&self) -> PlayerResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => {
                info!("👋 Left voice channel in guild {}", self.guild_id);
                Ok(())
            }
            Err(e) => Err(PlayerError::VoiceJoin(e.to_string())),
        }
    }
}

/// Plays one resource at a time on a songbird [`Call`].
pub struct SongbirdEngine {
    call: Arc<tokio::sync::Mutex<Call>>,
    current: Mutex<Option<ActiveTrack>>,
}

/// Each track reports into its own status cell, so a replaced track that
/// ends late cannot overwrite the state of its successor.
struct ActiveTrack {
    handle: TrackHandle,
    status: Arc<RwLock<EngineStatus>>,
}

impl SongbirdEngine {
    pub fn new(call: Arc<tokio::sync::Mutex<Call>>) -> Self {
        Self {
            call,
            current: Mutex::new(None),
        }
    }
}

fn into_input(resource: PlayableResource) -> Input {
    let source = AsyncReadOnlySource::new(resource.stream);
    let stream = AsyncAdapterStream::new(Box::new(source), STREAM_BUFFER);

    match resource.format {
        StreamFormat::RawPcm { sample_rate, channels } => RawAdapter::new(stream, sample_rate, channels).into(),
        StreamFormat::Encoded { extension, mime_type } => {
            let mut hint = Hint::new();
            if let Some(extension) = &extension {
                hint.with_extension(extension);
            }
            if let Some(mime_type) = &mime_type {
                hint.mime_type(mime_type);
            }

            Input::Live(
                LiveInput::Raw(AudioStream {
                    input: Box::new(stream),
                    hint: Some(hint),
                }),
                None,
            )
        }
    }
}

#[async_trait]
impl PlaybackEngine for SongbirdEngine {
    async fn play(&self, resource: PlayableResource, events: EngineEvents) -> PlayerResult<()> {
        let volume = resource.volume;
        let input = into_input(resource);

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only(Track::new(input).volume(volume))
        };

        let status = Arc::new(RwLock::new(EngineStatus::Buffering));
        *self.current.lock() = Some(ActiveTrack {
            handle: handle.clone(),
            status: status.clone(),
        });
        let _ = events.send(EngineEvent::Buffering);

        for track_event in [
            TrackEvent::Playable,
            TrackEvent::Play,
            TrackEvent::Pause,
            TrackEvent::End,
            TrackEvent::Error,
        ] {
            let forwarder = TrackForwarder {
                status: status.clone(),
                events: events.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(track_event), forwarder) {
                // The track died before we could watch it.
                *status.write() = EngineStatus::Idle;
                return Err(PlayerError::Engine(format!("{e:?}")));
            }
        }

        Ok(())
    }

    fn pause(&self) -> bool {
        let current = self.current.lock();
        let Some(track) = current.as_ref() else { return false };

        let mut status = track.status.write();
        if !matches!(*status, EngineStatus::Playing | EngineStatus::Buffering) || track.handle.pause().is_err() {
            return false;
        }
        *status = EngineStatus::Paused;
        true
    }

    fn unpause(&self) -> bool {
        let current = self.current.lock();
        let Some(track) = current.as_ref() else { return false };

        let mut status = track.status.write();
        if *status != EngineStatus::Paused || track.handle.play().is_err() {
            return false;
        }
        *status = EngineStatus::Playing;
        true
    }

    async fn stop(&self) -> PlayerResult<()> {
        if let Some(track) = self.current.lock().take() {
            *track.status.write() = EngineStatus::Idle;
            if let Err(e) = track.handle.stop() {
                debug!("Track already finished: {:?}", e);
            }
        }

        self.call.lock().await.stop();
        Ok(())
    }

    fn status(&self) -> EngineStatus {
        self.current
            .lock()
            .as_ref()
            .map(|track| *track.status.read())
            .unwrap_or_default()
    }
}

/// Mirrors songbird track events into the engine status and the session.
struct TrackForwarder {
    status: Arc<RwLock<EngineStatus>>,
    events: EngineEvents,
}

#[async_trait]
impl VoiceEventHandler for TrackForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else { return None };

        for (state, _handle) in *tracks {
            let (status, event) = match &state.playing {
                PlayMode::Play if matches!(state.ready, ReadyState::Playable) => {
                    (EngineStatus::Playing, EngineEvent::Playing)
                }
                PlayMode::Play => (EngineStatus::Buffering, EngineEvent::Buffering),
                PlayMode::Pause => (EngineStatus::Paused, EngineEvent::Paused),
                PlayMode::Errored(e) => {
                    warn!("❌ Track error: {:?}", e);
                    (EngineStatus::Idle, EngineEvent::Error(format!("{e:?}")))
                }
                PlayMode::Stop | PlayMode::End => (EngineStatus::Idle, EngineEvent::Idle),
                _ => continue,
            };

            *self.status.write() = status;
            let _ = self.events.send(event);
        }

        None
    }
}
