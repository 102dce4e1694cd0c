use std::time::Duration;

/// Polling cadence for the live views, and how long unwatched reads stay
/// cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub reels_poll: Duration,
    pub stories_poll: Duration,
    /// Open chat threads poll much faster than feeds.
    pub messages_poll: Duration,
    /// Reads nobody watches are dropped after sitting unused this long.
    pub cache_idle_ttl: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            reels_poll: Duration::from_secs(30),
            stories_poll: Duration::from_secs(30),
            messages_poll: Duration::from_secs(5),
            cache_idle_ttl: connect_sync::cache::DEFAULT_IDLE_TTL,
        }
    }
}
