//! Per-channel session registry.
//!
//! Maps a Discord channel id to the last session id the claude CLI returned
//! for it, so the next prompt in that channel resumes the same conversation.
//! Entries live in memory only; nothing survives a restart.

use dashmap::DashMap;

/// Default bound on tracked channels. Long-lived deployments in busy guilds
/// would otherwise grow the map without limit.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Registry of channel id -> claude session id.
pub struct SessionRegistry {
    sessions: DashMap<u64, String>,
    max_entries: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }

    /// Create a registry that holds at most `max_entries` channels.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Session id to resume for this channel, if any.
    pub fn get(&self, channel_id: u64) -> Option<String> {
        self.sessions.get(&channel_id).map(|e| e.value().clone())
    }

    /// Record the session id returned by a finished invocation.
    ///
    /// An absent id clears the entry: resuming a session the CLI no longer
    /// reports would fail every following prompt in the channel.
    pub fn record(&self, channel_id: u64, session_id: Option<String>) {
        match session_id {
            Some(id) => {
                if !self.sessions.contains_key(&channel_id)
                    && self.sessions.len() >= self.max_entries
                {
                    self.evict_one(channel_id);
                }
                self.sessions.insert(channel_id, id);
            }
            None => {
                self.sessions.remove(&channel_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop one existing entry to make room. Which channel loses its session
    /// does not matter for correctness; the next prompt there simply starts
    /// a fresh conversation.
    fn evict_one(&self, incoming: u64) {
        let victim = self
            .sessions
            .iter()
            .map(|e| *e.key())
            .find(|key| *key != incoming);
        if let Some(key) = victim {
            self.sessions.remove(&key);
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_unknown_channel_returns_none() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.get(1), None);
    }

    #[test]
    fn record_then_get() {
        let registry = SessionRegistry::new();
        registry.record(1, Some("S1".to_string()));
        assert_eq!(registry.get(1), Some("S1".to_string()));
    }

    #[test]
    fn record_overwrites_existing_entry() {
        let registry = SessionRegistry::new();
        registry.record(1, Some("S1".to_string()));
        registry.record(1, Some("S2".to_string()));
        assert_eq!(registry.get(1), Some("S2".to_string()));
    }

    #[test]
    fn absent_id_clears_existing_entry() {
        let registry = SessionRegistry::new();
        registry.record(1, Some("S1".to_string()));
        registry.record(1, None);
        assert_eq!(registry.get(1), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn channels_are_independent() {
        let registry = SessionRegistry::new();
        registry.record(1, Some("S1".to_string()));
        registry.record(2, Some("S2".to_string()));
        assert_eq!(registry.get(1), Some("S1".to_string()));
        assert_eq!(registry.get(2), Some("S2".to_string()));
    }

    #[test]
    fn capacity_bound_is_enforced() {
        let registry = SessionRegistry::with_capacity(2);
        registry.record(1, Some("S1".to_string()));
        registry.record(2, Some("S2".to_string()));
        registry.record(3, Some("S3".to_string()));
        assert_eq!(registry.len(), 2);
        // The newest entry always survives eviction.
        assert_eq!(registry.get(3), Some("S3".to_string()));
    }

    #[test]
    fn rewriting_an_existing_channel_does_not_evict() {
        let registry = SessionRegistry::with_capacity(2);
        registry.record(1, Some("S1".to_string()));
        registry.record(2, Some("S2".to_string()));
        registry.record(1, Some("S1b".to_string()));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1), Some("S1b".to_string()));
        assert_eq!(registry.get(2), Some("S2".to_string()));
    }
}
