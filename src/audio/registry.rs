use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::session::VoiceSession;

/// Guild id → live session. At most one session per guild is ever visible.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<VoiceSession>>,
    guild_locks: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<VoiceSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn insert(&self, guild_id: GuildId, session: Arc<VoiceSession>) -> Option<Arc<VoiceSession>> {
        self.sessions.insert(guild_id, session)
    }

    /// Removes the entry only if it still points at `session`.
    pub fn remove_if_same(&self, guild_id: GuildId, session: &Arc<VoiceSession>) -> bool {
        self.sessions
            .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Lock serializing session creation for one guild.
    pub fn guild_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.guild_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the guild's lock when nobody holds it and no session is left.
    pub fn prune_guild_lock(&self, guild_id: GuildId) {
        if self.sessions.contains_key(&guild_id) {
            return;
        }
        self.guild_locks
            .remove_if(&guild_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub fn guild_lock_count(&self) -> usize {
        self.guild_locks.len()
    }

    /// Forgets `session`, then shuts it down. `false` when the session was
    /// no longer registered.
    pub async fn teardown(&self, guild_id: GuildId, session: &Arc<VoiceSession>) -> bool {
        let removed = self.remove_if_same(guild_id, session);
        session.shutdown().await;
        self.prune_guild_lock(guild_id);
        removed
    }
}
