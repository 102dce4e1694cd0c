/// Structured logging for cache and mutation activity.
///
/// The cache, watches and mutator report every state change through a
/// [`SyncLogger`], so front-ends can route them to `tracing`, a debug pane,
/// or nowhere.

use std::fmt;

/// Structured log entry for one key or mutation.
#[derive(Debug, Clone)]
pub struct SyncLog {
    pub component: &'static str,
    pub key: String,
    pub event: SyncEvent,
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Cache: served a fresh value without a network call
    CacheHit,
    /// Cache: started the single fetch for a key
    FetchStarted,
    /// Cache: attached to a fetch already in flight
    FetchCoalesced,
    /// Cache: fetch result stored
    FetchSucceeded { duration_ms: u64 },
    /// Cache: fetch failed, previous value kept
    FetchFailed { message: String },
    /// Cache: result arrived after its entry was torn down or superseded
    FetchAbandoned,
    /// Cache: entry marked stale
    Invalidated,
    /// Cache: last subscriber left, entry dropped
    Evicted,
    /// Watch: query disabled until the actor becomes ready
    Suspended,
    /// Watch: polling interval elapsed
    PollTick,
    /// Mutator: remote write issued
    MutationStarted { name: &'static str },
    /// Mutator: same lock key already pending, nothing sent
    MutationSkipped { name: &'static str },
    /// Mutator: write succeeded and its prefixes were invalidated
    MutationSucceeded { name: &'static str, invalidated: usize },
    /// Mutator: write failed, cache untouched
    MutationFailed { name: &'static str, message: String },
}

impl SyncEvent {
    fn is_failure(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::MutationFailed { .. })
    }

    fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Invalidated
                | Self::Evicted
                | Self::MutationSkipped { .. }
                | Self::MutationSucceeded { .. }
        )
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheHit => write!(f, "cache_hit"),
            Self::FetchStarted => write!(f, "fetch_started"),
            Self::FetchCoalesced => write!(f, "fetch_coalesced"),
            Self::FetchSucceeded { duration_ms } => {
                write!(f, "fetch_succeeded duration_ms={}", duration_ms)
            }
            Self::FetchFailed { message } => write!(f, "fetch_failed: {}", message),
            Self::FetchAbandoned => write!(f, "fetch_abandoned"),
            Self::Invalidated => write!(f, "invalidated"),
            Self::Evicted => write!(f, "evicted"),
            Self::Suspended => write!(f, "suspended"),
            Self::PollTick => write!(f, "poll_tick"),
            Self::MutationStarted { name } => write!(f, "mutation_started name={}", name),
            Self::MutationSkipped { name } => write!(f, "mutation_skipped name={} (pending)", name),
            Self::MutationSucceeded { name, invalidated } => {
                write!(f, "mutation_succeeded name={} invalidated={}", name, invalidated)
            }
            Self::MutationFailed { name, message } => {
                write!(f, "mutation_failed name={}: {}", name, message)
            }
        }
    }
}

pub trait SyncLogger: Send + Sync {
    fn log(&self, entry: SyncLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl SyncLogger for TracingLogger {
    fn log(&self, entry: SyncLog) {
        // warn for failures, info for invalidation/mutation lifecycle, debug for per-fetch chatter
        if entry.event.is_failure() {
            tracing::warn!(component = entry.component, key = %entry.key, "{}", entry.event);
        } else if entry.event.is_lifecycle() {
            tracing::info!(component = entry.component, key = %entry.key, "{}", entry.event);
        } else {
            tracing::debug!(component = entry.component, key = %entry.key, "{}", entry.event);
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl SyncLogger for NullLogger {
    fn log(&self, _entry: SyncLog) {}
}
