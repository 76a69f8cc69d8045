//! In-memory stand-ins for the voice stack, shared by the audio tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

use super::engine::{
    EngineEvent, EngineEvents, EngineStatus, PlayableResource, PlaybackEngine, StreamFormat, TransportEvent,
    VoiceConnector, VoiceLink, VoiceTransport, PLAYBACK_VOLUME,
};
use crate::{
    error::{PlayerError, PlayerResult},
    sources::{MediaSource, OpenedStream, ProcessHandle, StreamOpener},
};

pub fn station(id: &str) -> Arc<MediaSource> {
    Arc::new(
        MediaSource::new(id, id.to_uppercase(), format!("https://radio.example/{id}/playlist.m3u8"))
            .with_frequency("99.9 FM")
            .with_region("Selangor")
            .with_category("Music"),
    )
}

#[derive(Default)]
pub struct FakeEngine {
    status: Mutex<EngineStatus>,
    listener: Mutex<Option<EngineEvents>>,
    plays: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_stop: AtomicBool,
}

impl FakeEngine {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn last_listener(&self) -> Option<EngineEvents> {
        self.listener.lock().clone()
    }

    /// Simulates the engine reporting `event` for the current resource.
    pub fn emit(&self, event: EngineEvent) {
        if matches!(event, EngineEvent::Idle | EngineEvent::Error(_)) {
            *self.status.lock() = EngineStatus::Idle;
        }
        if let Some(listener) = self.listener.lock().as_ref() {
            let _ = listener.send(event);
        }
    }
}

#[async_trait]
impl PlaybackEngine for FakeEngine {
    async fn play(&self, _resource: PlayableResource, events: EngineEvents) -> PlayerResult<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        *self.status.lock() = EngineStatus::Playing;
        *self.listener.lock() = Some(events);
        Ok(())
    }

    fn pause(&self) -> bool {
        let mut status = self.status.lock();
        match *status {
            EngineStatus::Playing | EngineStatus::Buffering => {
                *status = EngineStatus::Paused;
                true
            }
            _ => false,
        }
    }

    fn unpause(&self) -> bool {
        let mut status = self.status.lock();
        if *status == EngineStatus::Paused {
            *status = EngineStatus::Playing;
            true
        } else {
            false
        }
    }

    async fn stop(&self) -> PlayerResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.status.lock() = EngineStatus::Idle;
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(PlayerError::Engine("player already destroyed".into()));
        }
        Ok(())
    }

    fn status(&self) -> EngineStatus {
        *self.status.lock()
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub destroyed: AtomicUsize,
    /// How long leaving the channel takes.
    pub destroy_delay: Mutex<Duration>,
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn destroy(&self) -> PlayerResult<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        let delay = *self.destroy_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// Decoder stand-in that keeps the opener's live count honest.
struct FakeProcess {
    live: Arc<AtomicUsize>,
    alive: bool,
}

impl FakeProcess {
    fn release(&mut self) {
        if std::mem::take(&mut self.alive) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    async fn terminate(&mut self) {
        self.release();
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Default)]
pub struct FakeOpener {
    delay: Duration,
    opens: AtomicUsize,
    failures_left: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
}

impl FakeOpener {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn live_processes(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live_processes(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamOpener for FakeOpener {
    async fn open(&self, _endpoint: &str) -> PlayerResult<OpenedStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PlayerError::DecoderExited {
                reason: "exit code 1".into(),
            });
        }

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(OpenedStream {
            resource: PlayableResource {
                stream: Box::new(tokio::io::empty()),
                format: StreamFormat::RawPcm {
                    sample_rate: 48_000,
                    channels: 2,
                },
                volume: PLAYBACK_VOLUME,
            },
            process: Some(Box::new(FakeProcess {
                live: self.live.clone(),
                alive: true,
            })),
        })
    }
}

/// One voice link handed out by [`FakeConnector`].
#[derive(Clone)]
pub struct FakeLink {
    pub engine: Arc<FakeEngine>,
    pub transport: Arc<FakeTransport>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

#[derive(Default)]
pub struct FakeConnector {
    links: Mutex<Vec<FakeLink>>,
}

impl FakeConnector {
    pub fn connects(&self) -> usize {
        self.links.lock().len()
    }

    pub fn link(&self, index: usize) -> FakeLink {
        self.links.lock()[index].clone()
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn connect(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
        _ready_timeout: Duration,
    ) -> PlayerResult<VoiceLink> {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = FakeLink {
            engine: Arc::new(FakeEngine::default()),
            transport: Arc::new(FakeTransport::default()),
            events: tx,
        };
        self.links.lock().push(link.clone());

        Ok(VoiceLink {
            transport: link.transport,
            engine: link.engine,
            events: rx,
        })
    }
}
