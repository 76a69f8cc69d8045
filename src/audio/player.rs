use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    engine::{TransportEvent, VoiceConnector},
    registry::SessionRegistry,
    session::{SessionSettings, VoiceSession},
};
use crate::{
    error::{PlayerError, PlayerResult},
    sources::{MediaSource, StreamOpener},
};

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    /// Bound on joining a voice channel and reaching ready.
    pub ready_timeout: Duration,
    /// How long a dropped voice connection gets to start recovering on its own.
    pub disconnect_grace: Duration,
    pub session: SessionSettings,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(20),
            disconnect_grace: Duration::from_secs(5),
            session: SessionSettings::default(),
        }
    }
}

/// Entry point for everything the bot asks of the audio core.
///
/// Owns the session registry; every operation is keyed by guild and is safe to
/// call for a guild with no session.
#[derive(Clone)]
pub struct RadioPlayer {
    registry: Arc<SessionRegistry>,
    connector: Arc<dyn VoiceConnector>,
    opener: Arc<dyn StreamOpener>,
    settings: PlayerSettings,
}

impl RadioPlayer {
    pub fn new(connector: Arc<dyn VoiceConnector>, opener: Arc<dyn StreamOpener>, settings: PlayerSettings) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            connector,
            opener,
            settings,
        }
    }

    /// Plays `source` in `channel_id`, joining it first if the guild has no session.
    ///
    /// An existing session keeps its voice connection and just switches station.
    /// When the first play for a guild fails, nothing is left behind.
    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        source: Arc<MediaSource>,
        announce_channel: Option<ChannelId>,
    ) -> PlayerResult<()> {
        let lock = self.registry.guild_lock(guild_id);
        let result = {
            let _guard = lock.lock().await;
            self.play_locked(guild_id, channel_id, source, announce_channel).await
        };
        drop(lock);

        self.registry.prune_guild_lock(guild_id);
        result
    }

    async fn play_locked(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        source: Arc<MediaSource>,
        announce_channel: Option<ChannelId>,
    ) -> PlayerResult<()> {
        if let Some(session) = self.registry.get(guild_id) {
            session.set_announce_channel(announce_channel);
            match session.start_stream(source.clone()).await {
                Err(PlayerError::SessionClosed) => {
                    debug!("Session for guild {} closed underneath us, starting over", guild_id);
                    self.registry.remove_if_same(guild_id, &session);
                }
                result => return result,
            }
        }

        info!("🔊 Joining voice channel {} in guild {}", channel_id, guild_id);
        let link = self
            .connector
            .connect(guild_id, channel_id, self.settings.ready_timeout)
            .await?;

        let session = VoiceSession::new(
            guild_id,
            link.transport,
            link.engine,
            self.opener.clone(),
            self.settings.session.clone(),
        );
        session.set_announce_channel(announce_channel);

        if let Err(e) = session.start_stream(source).await {
            warn!("❌ First play failed in guild {}: {}", guild_id, e);
            session.shutdown().await;
            return Err(e);
        }

        self.registry.insert(guild_id, session.clone());
        self.watch_transport(guild_id, &session, link.events);
        Ok(())
    }

    /// Stops playback and leaves the channel. `false` when nothing was playing.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let Some(session) = self.registry.get(guild_id) else {
            return false;
        };

        let phase = session.phase();
        // A concurrent stop that got here first owns the teardown.
        if !self.registry.teardown(guild_id, &session).await {
            return false;
        }
        info!("⏹️ Stopped radio in guild {} (was {:?})", guild_id, phase);
        true
    }

    pub fn pause(&self, guild_id: GuildId) -> bool {
        self.registry.get(guild_id).is_some_and(|s| s.pause())
    }

    pub fn resume(&self, guild_id: GuildId) -> bool {
        self.registry.get(guild_id).is_some_and(|s| s.resume())
    }

    pub fn current_source(&self, guild_id: GuildId) -> Option<Arc<MediaSource>> {
        self.registry.get(guild_id)?.current_source()
    }

    pub fn is_playing(&self, guild_id: GuildId) -> bool {
        self.registry.get(guild_id).is_some_and(|s| s.is_playing())
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.registry.get(guild_id).is_some_and(|s| s.is_paused())
    }

    /// Text channel the last play request came from.
    pub fn announce_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.registry.get(guild_id)?.announce_channel()
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Tears every session down. Used on process shutdown.
    pub async fn shutdown_all(&self) {
        if self.registry.is_empty() {
            return;
        }

        let guilds = self.registry.guild_ids();
        info!("🛑 Closing {} voice session(s)", guilds.len());

        for guild_id in guilds {
            if let Some(session) = self.registry.get(guild_id) {
                self.registry.teardown(guild_id, &session).await;
            }
        }
    }

    fn watch_transport(
        &self,
        guild_id: GuildId,
        session: &Arc<VoiceSession>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let registry = Arc::downgrade(&self.registry);
        let session = Arc::downgrade(session);
        let grace = self.settings.disconnect_grace;

        tokio::spawn(supervise_transport(guild_id, registry, session, events, grace));
    }
}

/// Tears the session down when the voice connection drops and does not start
/// recovering within `grace`.
async fn supervise_transport(
    guild_id: GuildId,
    registry: Weak<SessionRegistry>,
    session: Weak<VoiceSession>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    grace: Duration,
) {
    while let Some(event) = events.recv().await {
        if event != TransportEvent::Disconnected {
            debug!("Voice transport in guild {}: {:?}", guild_id, event);
            continue;
        }

        warn!("🔌 Voice connection lost in guild {}, waiting {:?} for recovery", guild_id, grace);

        let recovering = tokio::time::timeout(grace, async {
            while let Some(event) = events.recv().await {
                if matches!(event, TransportEvent::Connecting | TransportEvent::Ready) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        if recovering {
            info!("🔁 Voice connection in guild {} is recovering", guild_id);
            continue;
        }

        let (Some(registry), Some(session)) = (registry.upgrade(), session.upgrade()) else {
            return;
        };
        if session.is_closed() {
            return;
        }

        warn!("💥 Voice connection in guild {} did not recover, closing session", guild_id);
        registry.teardown(guild_id, &session).await;
        break;
    }
}
