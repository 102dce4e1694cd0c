use std::time::Duration;

/// Per-query behaviour.
///
/// Reads are never retried on their own; a query with a `poll_interval`
/// simply tries again on its next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// False while the actor is not ready. Disabled queries never fetch.
    pub enabled: bool,
    /// Re-fetch cadence for live views.
    pub poll_interval: Option<Duration>,
    /// Age after which a successful result counts as stale. `None` keeps it
    /// fresh until invalidated.
    pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: None,
            stale_time: None,
        }
    }
}

impl QueryOptions {
    pub fn polling(every: Duration) -> Self {
        Self {
            poll_interval: Some(every),
            ..Self::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn stale_after(mut self, age: Duration) -> Self {
        self.stale_time = Some(age);
        self
    }
}
