//! Per-guild voice session.
//!
//! A session owns one voice transport, one playback engine and at most one
//! decoder process. It keeps the station playing: whenever the engine reports
//! that the stream ended or failed while a station is still selected, it
//! reopens the same station after a short backoff, until someone calls
//! [`VoiceSession::shutdown`].
//!
//! Each playback start bumps a generation counter. Work that was started for
//! an older generation notices it on completion and cleans up after itself
//! instead of installing a stale stream.

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::engine::{EngineEvent, EngineEvents, EngineStatus, PlaybackEngine, VoiceTransport};
use crate::{
    error::{PlayerError, PlayerResult},
    sources::{MediaSource, ProcessHandle, StreamOpener},
};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Wait before reopening a stream that ended on its own.
    pub idle_backoff: Duration,
    /// Wait before reopening a stream the engine reported as failed.
    pub error_backoff: Duration,
    /// Wait between failed reconnect attempts.
    pub retry_backoff: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(5),
        }
    }
}

/// Coarse view of where a session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected, nothing selected.
    Ready,
    Playing,
    Paused,
    Reconnecting,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum LossCause {
    StreamEnded,
    EngineError,
}

#[derive(Default)]
struct SessionState {
    /// The station the user asked for. `None` means "do not reconnect".
    current_source: Option<Arc<MediaSource>>,
    process: Option<Box<dyn ProcessHandle>>,
    listeners: Option<ListenerSet>,
    announce_channel: Option<ChannelId>,
    generation: u64,
    reconnecting: bool,
    /// Loss reported while a reconnect was already running, by generation.
    pending_loss: Option<u64>,
    closed: bool,
}

pub struct VoiceSession {
    guild_id: GuildId,
    transport: Arc<dyn VoiceTransport>,
    engine: Arc<dyn PlaybackEngine>,
    opener: Arc<dyn StreamOpener>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    /// Serializes playback starts so two decoders never coexist.
    start_lock: tokio::sync::Mutex<()>,
}

impl VoiceSession {
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        engine: Arc<dyn PlaybackEngine>,
        opener: Arc<dyn StreamOpener>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            guild_id,
            transport,
            engine,
            opener,
            settings,
            state: Mutex::new(SessionState::default()),
            start_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn current_source(&self) -> Option<Arc<MediaSource>> {
        self.state.lock().current_source.clone()
    }

    pub fn announce_channel(&self) -> Option<ChannelId> {
        self.state.lock().announce_channel
    }

    pub fn set_announce_channel(&self, channel: Option<ChannelId>) {
        if channel.is_some() {
            self.state.lock().announce_channel = channel;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_playing(&self) -> bool {
        self.engine.status() == EngineStatus::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.engine.status() == EngineStatus::Paused
    }

    pub fn phase(&self) -> SessionPhase {
        let (closed, reconnecting, has_source) = {
            let state = self.state.lock();
            (state.closed, state.reconnecting, state.current_source.is_some())
        };

        if closed {
            return SessionPhase::Stopped;
        }
        if reconnecting {
            return SessionPhase::Reconnecting;
        }
        match self.engine.status() {
            EngineStatus::Paused => SessionPhase::Paused,
            EngineStatus::Playing | EngineStatus::Buffering => SessionPhase::Playing,
            EngineStatus::Idle if has_source => SessionPhase::Reconnecting,
            EngineStatus::Idle => SessionPhase::Ready,
        }
    }

    /// Opens `source` and hands it to the engine, replacing whatever was playing.
    ///
    /// The previous decoder is killed before the new one is spawned. Fails with
    /// [`PlayerError::Superseded`] when a shutdown happened while the stream was
    /// opening; the freshly opened stream is discarded. When the new stream
    /// cannot be opened after the old decoder is gone, the selected station is
    /// reconnected as if its stream had ended.
    pub async fn start_stream(self: &Arc<Self>, source: Arc<MediaSource>) -> PlayerResult<()> {
        self.start(source, None).await
    }

    /// `expected_generation` makes the start a no-op ([`PlayerError::Superseded`])
    /// if another stream was installed since the caller looked.
    async fn start(self: &Arc<Self>, source: Arc<MediaSource>, expected_generation: Option<u64>) -> PlayerResult<()> {
        let _start = self.start_lock.lock().await;

        let (generation, previous) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PlayerError::SessionClosed);
            }
            if expected_generation.is_some_and(|expected| expected != state.generation) {
                return Err(PlayerError::Superseded);
            }
            (state.generation, state.process.take())
        };

        let killed_previous = previous.is_some();
        if let Some(mut previous) = previous {
            debug!("Killing previous decoder {:?} for guild {}", previous.id(), self.guild_id);
            previous.terminate().await;
        }

        info!("📻 Opening {} for guild {}", source.name(), self.guild_id);
        let opened = match self.opener.open(source.stream_url()).await {
            Ok(opened) => opened,
            Err(e) => {
                if killed_previous {
                    // The selected station lost its decoder above.
                    self.schedule_reconnect(LossCause::StreamEnded, generation);
                }
                return Err(e);
            }
        };
        let mut process = opened.process;

        let installed = {
            let mut state = self.state.lock();
            if state.closed {
                None
            } else {
                state.generation += 1;
                let generation = state.generation;
                let (listeners, events) = ListenerSet::spawn(Arc::downgrade(self), generation);
                // Dropping the old set stops it from reacting to the old stream.
                state.listeners = Some(listeners);
                state.process = process.take();
                state.current_source = Some(source.clone());
                Some((generation, events))
            }
        };

        let Some((generation, events)) = installed else {
            debug!("Discarding stream for {}: session closed", source.name());
            if let Some(mut process) = process.take() {
                process.terminate().await;
            }
            return Err(PlayerError::Superseded);
        };

        if let Err(e) = self.engine.play(opened.resource, events).await {
            self.schedule_reconnect(LossCause::EngineError, generation);
            return Err(e);
        }

        // A shutdown that slipped in while the engine was starting wins.
        let superseded = {
            let state = self.state.lock();
            state.closed || state.generation != generation
        };
        if superseded {
            if let Err(e) = self.engine.stop().await {
                debug!("Engine stop after superseded start failed: {}", e);
            }
            return Err(PlayerError::Superseded);
        }

        info!("▶️ Now streaming {} in guild {}", source.name(), self.guild_id);
        Ok(())
    }

    pub fn pause(&self) -> bool {
        let paused = self.engine.pause();
        if paused {
            info!("⏸️ Playback paused in guild {}", self.guild_id);
        }
        paused
    }

    pub fn resume(&self) -> bool {
        let resumed = self.engine.unpause();
        if resumed {
            info!("▶️ Playback resumed in guild {}", self.guild_id);
        }
        resumed
    }

    /// Tears the session down. Idempotent.
    ///
    /// The selected station is cleared first so nothing triggered by the
    /// teardown itself can schedule a reconnect. Every step runs even when an
    /// earlier one fails.
    pub async fn shutdown(&self) {
        let (process, listeners) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.current_source = None;
            state.generation += 1;
            state.pending_loss = None;
            (state.process.take(), state.listeners.take())
        };

        if let Some(mut process) = process {
            process.terminate().await;
        }

        drop(listeners);

        if let Err(e) = self.engine.stop().await {
            warn!("⚠️ Failed to stop engine for guild {}: {}", self.guild_id, e);
        }

        if let Err(e) = self.transport.destroy().await {
            error!("❌ Failed to release voice connection for guild {}: {}", self.guild_id, e);
        }

        info!("⏹️ Voice session for guild {} closed", self.guild_id);
    }

    fn on_engine_event(self: &Arc<Self>, event: EngineEvent, generation: u64) {
        match event {
            EngineEvent::Buffering => debug!("Buffering in guild {}", self.guild_id),
            EngineEvent::Playing => debug!("Engine playing in guild {}", self.guild_id),
            EngineEvent::Paused => debug!("Engine paused in guild {}", self.guild_id),
            EngineEvent::Idle => {
                info!("📴 Stream ended in guild {}", self.guild_id);
                self.schedule_reconnect(LossCause::StreamEnded, generation);
            }
            EngineEvent::Error(message) => {
                warn!("⚠️ Playback error in guild {}: {}", self.guild_id, message);
                self.schedule_reconnect(LossCause::EngineError, generation);
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, cause: LossCause, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.closed || state.current_source.is_none() {
                debug!("No station selected in guild {}, not reconnecting", self.guild_id);
                return;
            }
            if state.generation != generation {
                debug!("Ignoring {:?} from an old stream in guild {}", cause, self.guild_id);
                return;
            }
            if state.reconnecting {
                debug!("Reconnect already running in guild {}", self.guild_id);
                state.pending_loss = Some(generation);
                return;
            }
            state.reconnecting = true;
        }

        let session = self.clone();
        tokio::spawn(async move { session.reconnect_loop(cause, generation).await });
    }

    async fn reconnect_loop(self: Arc<Self>, cause: LossCause, lost_generation: u64) {
        let _guard = ReconnectGuard { session: self.clone() };

        let mut delay = match cause {
            LossCause::StreamEnded => self.settings.idle_backoff,
            LossCause::EngineError => self.settings.error_backoff,
        };
        let mut expected_generation = lost_generation;
        let mut attempt = 0u32;

        loop {
            tokio::time::sleep(delay).await;
            attempt += 1;

            let source = {
                let state = self.state.lock();
                if state.generation != expected_generation {
                    // Someone else already started a new stream.
                    debug!("Guild {} restarted elsewhere, reconnect not needed", self.guild_id);
                    return;
                }
                match &state.current_source {
                    Some(source) if !state.closed => source.clone(),
                    _ => {
                        debug!("Station cleared in guild {}, abandoning reconnect", self.guild_id);
                        return;
                    }
                }
            };

            info!("🔄 Reconnecting {} in guild {} (attempt {})", source.name(), self.guild_id, attempt);

            match self.start(source.clone(), Some(expected_generation)).await {
                Ok(()) => {
                    info!("✅ Reconnected to {} in guild {}", source.name(), self.guild_id);
                    return;
                }
                Err(e) if e.is_superseded() => {
                    debug!("Reconnect in guild {} superseded: {}", self.guild_id, e);
                    return;
                }
                Err(e) => {
                    warn!(
                        "❌ Reconnect to {} failed in guild {}: {}. Retrying in {:?}",
                        source.name(),
                        self.guild_id,
                        e,
                        self.settings.retry_backoff
                    );
                    expected_generation = self.state.lock().generation;
                    delay = self.settings.retry_backoff;
                }
            }
        }
    }
}

/// Clears the reconnect flag however the loop exits, and starts a new loop
/// for a loss of the current stream that was reported while this one ran.
struct ReconnectGuard {
    session: Arc<VoiceSession>,
}

impl Drop for ReconnectGuard {
    fn drop(&mut self) {
        let lost_generation = {
            let mut state = self.session.state.lock();
            state.reconnecting = false;
            let pending = state.pending_loss.take();
            let armed = !state.closed && state.current_source.is_some();
            pending.filter(|generation| armed && *generation == state.generation)
        };

        if let Some(generation) = lost_generation {
            if tokio::runtime::Handle::try_current().is_ok() {
                debug!("Stream in guild {} dropped during reconnect, going again", self.session.guild_id);
                self.session.schedule_reconnect(LossCause::StreamEnded, generation);
            }
        }
    }
}

/// Engine listener bound to one playback generation. Aborted on drop.
struct ListenerSet {
    task: JoinHandle<()>,
}

impl ListenerSet {
    fn spawn(session: Weak<VoiceSession>, generation: u64) -> (Self, EngineEvents) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(session) = session.upgrade() else { break };
                session.on_engine_event(event, generation);
            }
        });
        (Self { task }, tx)
    }
}

impl Drop for ListenerSet {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{station, FakeEngine, FakeOpener, FakeTransport};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn session_with(opener: Arc<FakeOpener>) -> (Arc<VoiceSession>, Arc<FakeEngine>, Arc<FakeTransport>) {
        let engine = Arc::new(FakeEngine::default());
        let transport = Arc::new(FakeTransport::default());
        let session = VoiceSession::new(
            GuildId::new(1),
            transport.clone(),
            engine.clone(),
            opener,
            SessionSettings::default(),
        );
        (session, engine, transport)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stream_plays_and_records_source() {
        let opener = Arc::new(FakeOpener::default());
        let (session, engine, _) = session_with(opener.clone());

        session.start_stream(station("hitz")).await.unwrap();

        assert_eq!(session.current_source().unwrap().id(), "hitz");
        assert_eq!(engine.plays(), 1);
        assert!(session.is_playing());
        assert_eq!(session.phase(), SessionPhase::Playing);
        assert_eq!(opener.live_processes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_kills_previous_decoder_first() {
        let opener = Arc::new(FakeOpener::default());
        let (session, _, _) = session_with(opener.clone());

        session.start_stream(station("hitz")).await.unwrap();
        session.start_stream(station("era")).await.unwrap();

        assert_eq!(session.current_source().unwrap().id(), "era");
        assert_eq!(opener.live_processes(), 1);
        assert_eq!(opener.max_live_processes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_reconnects_same_station_once() {
        let opener = Arc::new(FakeOpener::default());
        let (session, engine, _) = session_with(opener.clone());
        session.start_stream(station("hitz")).await.unwrap();

        // Error followed by idle for the same stream: one reconnect only.
        engine.emit(EngineEvent::Error("decode failure".into()));
        engine.emit(EngineEvent::Idle);
        settle().await;
        assert_eq!(session.phase(), SessionPhase::Reconnecting);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        settle().await;

        assert_eq!(opener.opens(), 2);
        assert_eq!(engine.plays(), 2);
        assert_eq!(session.current_source().unwrap().id(), "hitz");
        assert_eq!(session.phase(), SessionPhase::Playing);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(opener.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_retries_until_stream_opens() {
        let opener = Arc::new(FakeOpener::default());
        let (session, engine, _) = session_with(opener.clone());
        session.start_stream(station("hitz")).await.unwrap();

        opener.fail_next(2);
        engine.emit(EngineEvent::Idle);
        settle().await;

        // 1s backoff, fail, 5s, fail, 5s, success.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle().await;
        assert_eq!(opener.opens(), 2);
        assert_eq!(engine.plays(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(opener.opens(), 4);
        assert_eq!(engine.plays(), 2);
        assert_eq!(session.phase(), SessionPhase::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_switch_reconnects_selected_station() {
        let opener = Arc::new(FakeOpener::default());
        let (session, engine, _) = session_with(opener.clone());
        session.start_stream(station("hitz")).await.unwrap();

        opener.fail_next(1);
        assert!(session.start_stream(station("era")).await.is_err());
        assert_eq!(session.current_source().unwrap().id(), "hitz");
        assert_eq!(opener.live_processes(), 0);

        engine.emit(EngineEvent::Idle);
        settle().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(opener.opens(), 3);
        assert_eq!(opener.live_processes(), 1);
        assert_eq!(engine.plays(), 2);
        assert_eq!(session.current_source().unwrap().id(), "hitz");
        assert_eq!(session.phase(), SessionPhase::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_of_new_stream_during_stale_reconnect_is_retried() {
        let opener = Arc::new(FakeOpener::default());
        let (session, engine, _) = session_with(opener.clone());
        session.start_stream(station("hitz")).await.unwrap();

        engine.emit(EngineEvent::Idle);
        settle().await;
        assert_eq!(session.phase(), SessionPhase::Reconnecting);

        // A new station lands while the reconnect for the old one waits, and
        // its stream drops before that reconnect wakes up.
        session.start_stream(station("era")).await.unwrap();
        engine.emit(EngineEvent::Idle);
        settle().await;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle().await;

        assert_eq!(opener.opens(), 3);
        assert_eq!(engine.plays(), 3);
        assert_eq!(session.current_source().unwrap().id(), "era");
        assert_eq!(session.phase(), SessionPhase::Playing);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(opener.opens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff_cancels_reconnect() {
        let opener = Arc::new(FakeOpener::default());
        let (session, engine, transport) = session_with(opener.clone());
        session.start_stream(station("hitz")).await.unwrap();

        engine.emit(EngineEvent::Idle);
        settle().await;
        session.shutdown().await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(opener.opens(), 1);
        assert_eq!(opener.live_processes(), 0);
        assert_eq!(transport.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(session.phase(), SessionPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_after_shutdown_spawns_nothing() {
        let opener = Arc::new(FakeOpener::default());
        let (session, engine, _) = session_with(opener.clone());
        session.start_stream(station("hitz")).await.unwrap();
        let late = engine.last_listener();

        session.shutdown().await;
        // The engine reports idle after the stop; nobody may listen anymore.
        if let Some(late) = late {
            let _ = late.send(EngineEvent::Idle);
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(opener.opens(), 1);
        assert_eq!(opener.live_processes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent_and_runs_every_step() {
        let opener = Arc::new(FakeOpener::default());
        let (session, engine, transport) = session_with(opener.clone());
        session.start_stream(station("hitz")).await.unwrap();

        engine.fail_stop.store(true, Ordering::SeqCst);
        session.shutdown().await;
        session.shutdown().await;

        assert!(session.current_source().is_none());
        assert_eq!(opener.live_processes(), 0);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
        assert_eq!(transport.destroyed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            session.start_stream(station("era")).await,
            Err(PlayerError::SessionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_opening_discards_new_decoder() {
        let opener = Arc::new(FakeOpener::with_delay(Duration::from_secs(3)));
        let (session, engine, _) = session_with(opener.clone());

        let starting = {
            let session = session.clone();
            tokio::spawn(async move { session.start_stream(station("hitz")).await })
        };
        settle().await;
        session.shutdown().await;
        tokio::time::sleep(Duration::from_secs(4)).await;

        let result = starting.await.unwrap();
        assert!(matches!(result, Err(PlayerError::Superseded)));
        assert_eq!(engine.plays(), 0);
        assert_eq!(opener.live_processes(), 0);
        assert!(session.current_source().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let opener = Arc::new(FakeOpener::default());
        let (session, _, _) = session_with(opener);

        assert!(!session.pause());
        session.start_stream(station("hitz")).await.unwrap();

        assert!(session.pause());
        assert!(session.is_paused());
        assert!(!session.pause());
        assert!(session.resume());
        assert!(session.is_playing());
        assert!(!session.resume());
    }
}
