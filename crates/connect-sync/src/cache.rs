use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::SyncError;
use crate::key::QueryKey;
use crate::logging::{NullLogger, SyncEvent, SyncLog, SyncLogger};
use crate::options::QueryOptions;

type AnyValue = Arc<dyn Any + Send + Sync>;
type FetchResult = Result<AnyValue, SyncError>;
type InFlight = Shared<BoxFuture<'static, FetchResult>>;

const EVENT_CAPACITY: usize = 64;

/// How long an entry nobody subscribes to survives after its last use.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEventKind {
    Loading,
    Updated,
    Invalidated,
    Failed(SyncError),
}

/// Transition notice delivered to a key's subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub kind: CacheEventKind,
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
    pub status: QueryStatus,
    /// Last good value; survives failed re-fetches.
    pub data: Option<Arc<T>>,
    pub error: Option<SyncError>,
    pub is_stale: bool,
    pub is_fetching: bool,
    pub last_fetched: Option<Instant>,
    pub subscribers: usize,
}

impl<T> QuerySnapshot<T> {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_stale: false,
            is_fetching: false,
            last_fetched: None,
            subscribers: 0,
        }
    }
}

struct Fetch {
    id: u64,
    started: Instant,
    future: InFlight,
}

struct Entry {
    status: QueryStatus,
    value: Option<AnyValue>,
    error: Option<SyncError>,
    stale: bool,
    last_fetched: Option<Instant>,
    subscribers: usize,
    /// Last read or completed fetch; drives the idle sweep
    last_used: Instant,
    in_flight: Option<Fetch>,
    /// Set when an invalidation lands while a fetch is outstanding; that
    /// fetch may predate the write, so its result is stored as stale.
    invalidated_in_flight: bool,
    tx: broadcast::Sender<CacheEvent>,
}

impl Entry {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            status: QueryStatus::Idle,
            value: None,
            error: None,
            stale: false,
            last_fetched: None,
            subscribers: 0,
            last_used: Instant::now(),
            in_flight: None,
            invalidated_in_flight: false,
            tx,
        }
    }

    fn is_fresh(&self, opts: &QueryOptions, now: Instant) -> bool {
        if self.status != QueryStatus::Success || self.stale {
            return false;
        }
        match (opts.stale_time, self.last_fetched) {
            (Some(max_age), Some(at)) => now.duration_since(at) < max_age,
            _ => true,
        }
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        self.subscribers == 0 && self.in_flight.is_none() && now.duration_since(self.last_used) >= ttl
    }

    /// Join the outstanding fetch or serve a fresh value. `None` means a
    /// new fetch has to start.
    fn reuse(&self, opts: &QueryOptions, force: bool, now: Instant) -> Option<Plan> {
        if let Some(fetch) = &self.in_flight {
            return Some(Plan::Attach(fetch.future.clone()));
        }
        if force || !self.is_fresh(opts, now) {
            return None;
        }
        self.value.clone().map(Plan::Hit)
    }

    fn emit(&self, key: &QueryKey, kind: CacheEventKind) {
        // No receivers is fine: nobody is watching this key.
        let _ = self.tx.send(CacheEvent { key: key.clone(), kind });
    }
}

/// Shared query cache.
///
/// Cheap to clone; every clone sees the same entries. The lock is never
/// held across an `.await`.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    next_fetch: AtomicU64,
    idle_ttl: Duration,
    logger: Arc<dyn SyncLogger>,
}

enum Plan {
    Hit(AnyValue),
    Attach(InFlight),
    Start(InFlight),
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_logger(Arc::new(NullLogger))
    }

    pub fn with_logger(logger: Arc<dyn SyncLogger>) -> Self {
        Self::with_idle_ttl(logger, DEFAULT_IDLE_TTL)
    }

    /// Entries without subscribers are dropped once unused for `idle_ttl`.
    pub fn with_idle_ttl(logger: Arc<dyn SyncLogger>, idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                next_fetch: AtomicU64::new(1),
                idle_ttl,
                logger,
            }),
        }
    }

    pub(crate) fn log(&self, component: &'static str, key: &QueryKey, event: SyncEvent) {
        self.inner.logger.log(SyncLog {
            component,
            key: key.to_string(),
            event,
        });
    }

    pub(crate) fn logger(&self) -> &Arc<dyn SyncLogger> {
        &self.inner.logger
    }

    /// Cache-or-fetch read.
    ///
    /// Returns the cached value when it is fresh, joins the outstanding
    /// fetch for `key` when there is one, and otherwise calls `fetcher`
    /// exactly once.
    ///
    /// `fetcher` runs outside the cache lock, so it may use the cache. If
    /// another caller registers a fetch for `key` first, the future it
    /// returned is dropped without being polled.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        opts: &QueryOptions,
        fetcher: F,
    ) -> Result<Arc<T>, SyncError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        self.run(key, opts, fetcher, false).await
    }

    /// Like [`fetch`](Self::fetch) but ignores freshness. Still joins an
    /// outstanding fetch instead of issuing a second one.
    pub async fn refetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        opts: &QueryOptions,
        fetcher: F,
    ) -> Result<Arc<T>, SyncError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        self.run(key, opts, fetcher, true).await
    }

    async fn run<T, F, Fut>(
        &self,
        key: &QueryKey,
        opts: &QueryOptions,
        fetcher: F,
        force: bool,
    ) -> Result<Arc<T>, SyncError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        if !opts.enabled {
            return Err(SyncError::NotReady);
        }

        self.sweep();
        let now = Instant::now();

        let plan = {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
            entry.last_used = now;
            entry.reuse(opts, force, now)
        };

        let plan = match plan {
            Some(plan) => plan,
            None => {
                let fut = fetcher();
                // Re-check and register under one lock so two callers can
                // never both start a fetch for the same key.
                let mut entries = self.inner.entries.lock();
                let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
                match entry.reuse(opts, force, now) {
                    Some(plan) => plan,
                    None => {
                        let id = self.inner.next_fetch.fetch_add(1, Ordering::Relaxed);
                        let shared = self.start(key, id, fut);
                        entry.in_flight = Some(Fetch {
                            id,
                            started: now,
                            future: shared.clone(),
                        });
                        entry.status = QueryStatus::Loading;
                        entry.emit(key, CacheEventKind::Loading);
                        Plan::Start(shared)
                    }
                }
            }
        };

        let shared = match plan {
            Plan::Hit(value) => {
                self.log("cache", key, SyncEvent::CacheHit);
                return downcast(key, value);
            }
            Plan::Attach(shared) => {
                self.log("cache", key, SyncEvent::FetchCoalesced);
                shared
            }
            Plan::Start(shared) => {
                self.log("cache", key, SyncEvent::FetchStarted);
                shared
            }
        };

        let value = shared.await?;
        downcast(key, value)
    }

    /// Wrap a fetch so its result lands in the cache exactly once, no
    /// matter how many callers await it.
    fn start<T, Fut>(&self, key: &QueryKey, id: u64, fut: Fut) -> InFlight
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        let cache = self.clone();
        let key = key.clone();
        async move {
            let result = fut.await.map(|v| Arc::new(v) as AnyValue);
            cache.complete(&key, id, &result);
            result
        }
        .boxed()
        .shared()
    }

    fn complete(&self, key: &QueryKey, id: u64, result: &FetchResult) {
        let mut entries = self.inner.entries.lock();
        let current = entries
            .get_mut(key)
            .filter(|e| e.in_flight.as_ref().is_some_and(|f| f.id == id));
        let Some(entry) = current else {
            drop(entries);
            self.log("cache", key, SyncEvent::FetchAbandoned);
            return;
        };

        let Some(fetch) = entry.in_flight.take() else {
            return;
        };
        let now = Instant::now();
        entry.last_used = now;
        let restale = std::mem::take(&mut entry.invalidated_in_flight);

        let event = match result {
            Ok(value) => {
                entry.value = Some(value.clone());
                entry.error = None;
                entry.status = QueryStatus::Success;
                entry.last_fetched = Some(now);
                entry.stale = restale;
                entry.emit(key, CacheEventKind::Updated);
                if restale {
                    entry.emit(key, CacheEventKind::Invalidated);
                }
                SyncEvent::FetchSucceeded {
                    duration_ms: now.duration_since(fetch.started).as_millis() as u64,
                }
            }
            Err(err) => {
                entry.error = Some(err.clone());
                entry.status = QueryStatus::Error;
                entry.emit(key, CacheEventKind::Failed(err.clone()));
                SyncEvent::FetchFailed {
                    message: err.to_string(),
                }
            }
        };
        drop(entries);

        self.log("cache", key, event);
    }

    /// Mark every entry under `prefix` stale and notify its subscribers.
    /// Returns the keys that matched.
    pub fn invalidate(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut entries = self.inner.entries.lock();
        let mut hit = Vec::new();
        for (key, entry) in entries.iter_mut().filter(|(k, _)| k.starts_with(prefix)) {
            entry.stale = true;
            if entry.in_flight.is_some() {
                entry.invalidated_in_flight = true;
            }
            entry.emit(key, CacheEventKind::Invalidated);
            hit.push(key.clone());
        }
        drop(entries);

        for key in &hit {
            self.log("cache", key, SyncEvent::Invalidated);
        }
        hit
    }

    /// Register interest in `key`. The entry lives until the last
    /// subscription is dropped.
    pub fn subscribe(&self, key: &QueryKey) -> Subscription {
        let mut entries = self.inner.entries.lock();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.subscribers += 1;
        let rx = entry.tx.subscribe();
        Subscription {
            cache: self.clone(),
            key: key.clone(),
            rx,
        }
    }

    fn unsubscribe(&self, key: &QueryKey) {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers > 0 {
            return;
        }
        // Teardown: back to idle, any outstanding result is discarded.
        entries.remove(key);
        drop(entries);
        self.log("cache", key, SyncEvent::Evicted);
    }

    pub fn snapshot<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QuerySnapshot<T> {
        let entries = self.inner.entries.lock();
        let Some(entry) = entries.get(key) else {
            return QuerySnapshot::idle();
        };
        QuerySnapshot {
            status: entry.status,
            data: entry.value.clone().and_then(|v| v.downcast::<T>().ok()),
            error: entry.error.clone(),
            is_stale: entry.stale,
            is_fetching: entry.in_flight.is_some(),
            last_fetched: entry.last_fetched,
            subscribers: entry.subscribers,
        }
    }

    /// Drop entries nobody subscribes to that have sat unused for the idle
    /// TTL. Runs on every read; returns the evicted keys.
    pub fn sweep(&self) -> Vec<QueryKey> {
        let now = Instant::now();
        let ttl = self.inner.idle_ttl;
        let mut entries = self.inner.entries.lock();
        let idle: Vec<QueryKey> = entries
            .iter()
            .filter(|(_, e)| e.is_idle(now, ttl))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &idle {
            entries.remove(key);
        }
        drop(entries);

        for key in &idle {
            self.log("cache", key, SyncEvent::Evicted);
        }
        idle
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.inner.entries.lock().get(key).is_some_and(|e| e.stale)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner
            .entries
            .lock()
            .get(key)
            .is_some_and(|e| e.in_flight.is_some())
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<_> = self.inner.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, value: AnyValue) -> Result<Arc<T>, SyncError> {
    value
        .downcast::<T>()
        .map_err(|_| SyncError::TypeMismatch(key.to_string()))
}

/// Keeps a key alive and receives its transition events.
pub struct Subscription {
    cache: QueryCache,
    key: QueryKey,
    rx: broadcast::Receiver<CacheEvent>,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Next event for this key. Lagged receivers skip ahead; `None` only
    /// if the entry's channel is gone.
    pub async fn recv(&mut self) -> Option<CacheEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// A second receiver on the same key, not counted as a subscriber.
    pub(crate) fn resubscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.rx.resubscribe()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connect_actor::ActorError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counted(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        value: u32,
    ) -> impl Future<Output = Result<u32, SyncError>> + Send + 'static {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_share_one_call() {
        let cache = QueryCache::new();
        let key = QueryKey::new("reels");
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = QueryOptions::default();

        let (a, b) = tokio::join!(
            cache.fetch(&key, &opts, || counted(&calls, Duration::from_millis(100), 7)),
            cache.fetch(&key, &opts, || counted(&calls, Duration::from_millis(100), 8)),
        );

        assert_eq!(*a.unwrap(), 7);
        assert_eq!(*b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_value_is_served_from_cache() {
        let cache = QueryCache::new();
        let key = QueryKey::new("profile").with("alice");
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = QueryOptions::default();

        cache.fetch(&key, &opts, || counted(&calls, Duration::ZERO, 1)).await.unwrap();
        let again = cache.fetch(&key, &opts, || counted(&calls, Duration::ZERO, 2)).await.unwrap();

        assert_eq!(*again, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_query_does_not_fetch() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let res = cache
            .fetch(&QueryKey::new("reels"), &QueryOptions::default().enabled(false), || {
                counted(&calls, Duration::ZERO, 1)
            })
            .await;

        assert_eq!(res.unwrap_err(), SyncError::NotReady);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cache.keys().is_empty());
    }

    #[tokio::test]
    async fn failure_keeps_last_good_value() {
        let cache = QueryCache::new();
        let key = QueryKey::new("stories");
        let opts = QueryOptions::default();

        cache.fetch(&key, &opts, || async { Ok::<_, SyncError>(3u32) }).await.unwrap();
        let err = cache
            .refetch::<u32, _, _>(&key, &opts, || async {
                Err(SyncError::Actor(ActorError::Transport("offline".into())))
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let snap = cache.snapshot::<u32>(&key);
        assert_eq!(snap.status, QueryStatus::Error);
        assert_eq!(snap.data.as_deref(), Some(&3));
        assert!(snap.error.is_some());
    }

    #[tokio::test]
    async fn invalidate_by_prefix_marks_only_matching_keys() {
        let cache = QueryCache::new();
        let opts = QueryOptions::default();
        for key in [
            QueryKey::new("followers").with("a"),
            QueryKey::new("followers").with("b"),
            QueryKey::new("reels"),
        ] {
            cache.fetch(&key, &opts, || async { Ok::<_, SyncError>(0u8) }).await.unwrap();
        }

        let hit = cache.invalidate(&QueryKey::new("followers"));

        assert_eq!(hit.len(), 2);
        assert!(cache.snapshot::<u8>(&QueryKey::new("followers").with("a")).is_stale);
        assert!(!cache.snapshot::<u8>(&QueryKey::new("reels")).is_stale);
    }

    #[tokio::test]
    async fn stale_entry_refetches_on_next_read() {
        let cache = QueryCache::new();
        let key = QueryKey::new("reels");
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = QueryOptions::default();

        cache.fetch(&key, &opts, || counted(&calls, Duration::ZERO, 1)).await.unwrap();
        cache.invalidate(&key);
        let v = cache.fetch(&key, &opts, || counted(&calls, Duration::ZERO, 2)).await.unwrap();

        assert_eq!(*v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.snapshot::<u32>(&key).is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_during_fetch_leaves_result_stale() {
        let cache = QueryCache::new();
        let key = QueryKey::new("following").with("a");
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = QueryOptions::default();

        let c = cache.clone();
        let k = key.clone();
        let calls2 = calls.clone();
        let pending = tokio::spawn(async move {
            c.fetch(&k, &QueryOptions::default(), || counted(&calls2, Duration::from_millis(50), 1))
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&QueryKey::new("following"));
        pending.await.unwrap().unwrap();

        assert!(cache.snapshot::<u32>(&key).is_stale);
        let v = cache.fetch(&key, &opts, || counted(&calls, Duration::ZERO, 2)).await.unwrap();
        assert_eq!(*v, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_discards_outstanding_fetch() {
        let cache = QueryCache::new();
        let key = QueryKey::new("messages").with("bob");
        let sub = cache.subscribe(&key);

        let c = cache.clone();
        let k = key.clone();
        let pending = tokio::spawn(async move {
            c.fetch(&k, &QueryOptions::default(), || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, SyncError>(vec!["late".to_string()])
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(sub);
        pending.await.unwrap().unwrap();

        let snap = cache.snapshot::<Vec<String>>(&key);
        assert_eq!(snap.status, QueryStatus::Idle);
        assert!(snap.data.is_none());
    }

    #[tokio::test]
    async fn type_mismatch_is_reported() {
        let cache = QueryCache::new();
        let key = QueryKey::new("isAdmin");
        let opts = QueryOptions::default();
        cache.fetch(&key, &opts, || async { Ok::<_, SyncError>(true) }).await.unwrap();

        let res = cache.fetch(&key, &opts, || async { Ok::<_, SyncError>(1u32) }).await;
        assert!(matches!(res, Err(SyncError::TypeMismatch(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_time_expires_fresh_values() {
        let cache = QueryCache::new();
        let key = QueryKey::new("callerRole");
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = QueryOptions::default().stale_after(Duration::from_secs(60));

        cache.fetch(&key, &opts, || counted(&calls, Duration::ZERO, 1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.fetch(&key, &opts, || counted(&calls, Duration::ZERO, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        cache.fetch(&key, &opts, || counted(&calls, Duration::ZERO, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetcher_may_consult_the_cache() {
        let cache = QueryCache::new();
        let key = QueryKey::new("userProfile").with("bob");

        let c = cache.clone();
        let k = key.clone();
        let busy = cache
            .fetch(&key, &QueryOptions::default(), move || {
                let busy = c.is_fetching(&k);
                async move { Ok::<_, SyncError>(busy) }
            })
            .await
            .unwrap();

        assert!(!*busy);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_entries_are_swept() {
        let cache = QueryCache::with_idle_ttl(Arc::new(NullLogger), Duration::from_secs(60));
        let opts = QueryOptions::default();
        let watched = QueryKey::new("messages").with("bob");
        let _sub = cache.subscribe(&watched);
        cache.fetch(&watched, &opts, || async { Ok::<_, SyncError>(1u8) }).await.unwrap();
        for user in ["a", "b"] {
            let key = QueryKey::new("followers").with(user);
            cache.fetch(&key, &opts, || async { Ok::<_, SyncError>(0u8) }).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.fetch(&QueryKey::new("followers").with("a"), &opts, || async { Ok::<_, SyncError>(0u8) })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(cache.sweep(), vec![QueryKey::new("followers").with("b")]);
        assert_eq!(
            cache.keys(),
            vec![QueryKey::new("followers").with("a"), watched.clone()]
        );
    }
}
