use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::QueryCache;
use crate::error::SyncError;
use crate::key::QueryKey;
use crate::logging::{SyncEvent, SyncLog};

/// What a write is called and which cached reads it makes stale.
#[derive(Debug, Clone)]
pub struct MutationSpec {
    pub name: &'static str,
    pub invalidates: Vec<QueryKey>,
}

impl MutationSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            invalidates: Vec::new(),
        }
    }

    pub fn invalidating(mut self, prefix: QueryKey) -> Self {
        self.invalidates.push(prefix);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome<T> {
    Completed(T),
    /// Another write with the same lock key was still running; nothing was
    /// sent.
    AlreadyPending,
}

impl<T> MutationOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(v) => Some(v),
            Self::AlreadyPending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::AlreadyPending)
    }
}

/// Runs writes against the backend and keeps the cache honest afterwards.
///
/// At most one write per lock key is outstanding. Only a successful write
/// invalidates; a failed one leaves every entry as it was.
#[derive(Clone)]
pub struct Mutator {
    cache: QueryCache,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl Mutator {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn is_pending(&self, lock: &str) -> bool {
        self.pending.lock().contains(lock)
    }

    /// Run `call` unless a write holding `lock` is already in flight.
    ///
    /// `call` is not polled at all when the lock is taken.
    pub async fn run<T, E, Fut>(
        &self,
        spec: &MutationSpec,
        lock: impl Into<String>,
        call: Fut,
    ) -> Result<MutationOutcome<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let lock = lock.into();
        let Some(_guard) = PendingGuard::acquire(&self.pending, &lock) else {
            self.log(&lock, SyncEvent::MutationSkipped { name: spec.name });
            return Ok(MutationOutcome::AlreadyPending);
        };

        self.log(&lock, SyncEvent::MutationStarted { name: spec.name });
        match call.await {
            Ok(value) => {
                let invalidated: usize = spec
                    .invalidates
                    .iter()
                    .map(|prefix| self.cache.invalidate(prefix).len())
                    .sum();
                self.log(
                    &lock,
                    SyncEvent::MutationSucceeded {
                        name: spec.name,
                        invalidated,
                    },
                );
                Ok(MutationOutcome::Completed(value))
            }
            Err(err) => {
                self.log(
                    &lock,
                    SyncEvent::MutationFailed {
                        name: spec.name,
                        message: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    fn log(&self, lock: &str, event: SyncEvent) {
        self.cache.logger().log(SyncLog {
            component: "mutation",
            key: lock.to_string(),
            event,
        });
    }
}

/// Releases the lock key when the write finishes or its future is dropped.
struct PendingGuard {
    pending: Arc<Mutex<HashSet<String>>>,
    lock: String,
}

impl PendingGuard {
    fn acquire(pending: &Arc<Mutex<HashSet<String>>>, lock: &str) -> Option<Self> {
        if !pending.lock().insert(lock.to_string()) {
            return None;
        }
        Some(Self {
            pending: pending.clone(),
            lock: lock.to_string(),
        })
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.lock);
    }
}

/// Shorthand for writes whose error is already a [`SyncError`].
pub type MutationResult<T> = Result<MutationOutcome<T>, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::QueryOptions;
    use connect_actor::ActorError;
    use std::time::Duration;

    async fn seeded(cache: &QueryCache, key: &QueryKey) {
        cache
            .fetch(key, &QueryOptions::default(), || async { Ok::<_, SyncError>(1u32) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn success_invalidates_listed_prefixes() {
        let cache = QueryCache::new();
        let followers = QueryKey::new("followers").with("bob");
        let reels = QueryKey::new("reels");
        seeded(&cache, &followers).await;
        seeded(&cache, &reels).await;

        let mutator = Mutator::new(cache.clone());
        let spec = MutationSpec::new("followUser").invalidating(QueryKey::new("followers"));
        let out: MutationResult<()> = mutator.run(&spec, "follow/bob", async { Ok(()) }).await;

        assert_eq!(out.unwrap(), MutationOutcome::Completed(()));
        assert!(cache.snapshot::<u32>(&followers).is_stale);
        assert!(!cache.snapshot::<u32>(&reels).is_stale);
    }

    #[tokio::test]
    async fn failure_leaves_cache_untouched() {
        let cache = QueryCache::new();
        let key = QueryKey::new("reels");
        seeded(&cache, &key).await;

        let mutator = Mutator::new(cache.clone());
        let spec = MutationSpec::new("addReel").invalidating(QueryKey::new("reels"));
        let out: MutationResult<()> = mutator
            .run(&spec, "reel/add", async {
                Err(SyncError::Actor(ActorError::Rejected("too large".into())))
            })
            .await;

        assert!(out.is_err());
        assert!(!cache.snapshot::<u32>(&key).is_stale);
        assert!(!mutator.is_pending("reel/add"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_call_with_same_lock_is_skipped() {
        let mutator = Mutator::new(QueryCache::new());
        let spec = MutationSpec::new("unfollowUser");
        let polled = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let slow = {
            let polled = polled.clone();
            async move {
                polled.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, SyncError>(())
            }
        };
        let fast = {
            let polled = polled.clone();
            async move {
                polled.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, SyncError>(())
            }
        };

        let (first, second) = tokio::join!(
            mutator.run(&spec, "follow/bob", slow),
            mutator.run(&spec, "follow/bob", fast),
        );

        assert_eq!(first.unwrap(), MutationOutcome::Completed(()));
        assert!(second.unwrap().is_pending());
        assert_eq!(polled.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!mutator.is_pending("follow/bob"));
    }

    #[tokio::test]
    async fn different_locks_run_independently() {
        let mutator = Mutator::new(QueryCache::new());
        let spec = MutationSpec::new("followUser");

        let (a, b) = tokio::join!(
            mutator.run(&spec, "follow/a", async { Ok::<_, SyncError>(1) }),
            mutator.run(&spec, "follow/b", async { Ok::<_, SyncError>(2) }),
        );

        assert_eq!(a.unwrap().completed(), Some(1));
        assert_eq!(b.unwrap().completed(), Some(2));
    }
}
