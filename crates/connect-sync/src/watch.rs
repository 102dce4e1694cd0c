use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::cache::{CacheEvent, CacheEventKind, QueryCache, QuerySnapshot, Subscription};
use crate::error::SyncError;
use crate::key::QueryKey;
use crate::logging::SyncEvent;
use crate::options::QueryOptions;

/// A live view of one query.
///
/// Holds a subscription on the key and drives a background task that
/// fetches on start, re-fetches when the entry is invalidated, and polls
/// when the options ask for it. Dropping the watch stops the task and
/// releases the subscription.
pub struct Watch<T> {
    cache: QueryCache,
    key: QueryKey,
    events: broadcast::Receiver<CacheEvent>,
    task: JoinHandle<()>,
    _subscription: Subscription,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Watch<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.cache.snapshot(&self.key)
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.snapshot().data
    }

    /// Wait for the next transition on this key.
    pub async fn changed(&mut self) -> Option<CacheEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait until the entry holds a value or an error.
    pub async fn settled(&mut self) -> QuerySnapshot<T> {
        loop {
            let snap = self.snapshot();
            if snap.data.is_some() || snap.error.is_some() {
                return snap;
            }
            if self.changed().await.is_none() {
                return self.snapshot();
            }
        }
    }
}

impl<T> Drop for Watch<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl QueryCache {
    /// Start a live view on `key`.
    ///
    /// Nothing is fetched while `ready` reads `false` or `opts.enabled` is
    /// off. Fetch failures are recorded on the entry and never end the view.
    pub fn watch<T, F, Fut>(
        &self,
        key: QueryKey,
        opts: QueryOptions,
        ready: watch::Receiver<bool>,
        fetcher: F,
    ) -> Watch<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        let subscription = self.subscribe(&key);
        let events = subscription.resubscribe();
        let task_events = subscription.resubscribe();

        let task = tokio::spawn(drive::<T, F, Fut>(
            self.clone(),
            key.clone(),
            opts,
            ready,
            task_events,
            fetcher,
        ));

        Watch {
            cache: self.clone(),
            key,
            events,
            task,
            _subscription: subscription,
            _marker: PhantomData,
        }
    }
}

async fn drive<T, F, Fut>(
    cache: QueryCache,
    key: QueryKey,
    opts: QueryOptions,
    mut ready: watch::Receiver<bool>,
    mut events: broadcast::Receiver<CacheEvent>,
    fetcher: F,
) where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
{
    if !opts.enabled {
        cache.log("watch", &key, SyncEvent::Suspended);
        return;
    }

    loop {
        while !*ready.borrow_and_update() {
            cache.log("watch", &key, SyncEvent::Suspended);
            if ready.changed().await.is_err() {
                return;
            }
        }

        // Failures are kept on the entry and logged by the cache.
        let _ = cache.fetch::<T, _, _>(&key, &opts, &fetcher).await;
        let mut ticker = opts.poll_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = next_tick(&mut ticker) => {
                    cache.log("watch", &key, SyncEvent::PollTick);
                    let _ = cache.refetch::<T, _, _>(&key, &opts, &fetcher).await;
                    reset(&mut ticker);
                }
                event = events.recv() => {
                    let recheck = match event {
                        Ok(CacheEvent { kind: CacheEventKind::Invalidated, .. }) => true,
                        // The skipped events may have held an invalidation.
                        Err(broadcast::error::RecvError::Lagged(_)) => cache.is_stale(&key),
                        Ok(_) => false,
                        Err(broadcast::error::RecvError::Closed) => return,
                    };
                    // A fetch already in flight re-announces the invalidation
                    // when it lands. While not ready the entry just stays
                    // stale; the outer loop fetches once the actor is back.
                    if !recheck || !*ready.borrow() || cache.is_fetching(&key) {
                        continue;
                    }
                    let _ = cache.fetch::<T, _, _>(&key, &opts, &fetcher).await;
                    reset(&mut ticker);
                }
                changed = ready.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !*ready.borrow_and_update() {
                        break;
                    }
                }
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn reset(ticker: &mut Option<Interval>) {
    if let Some(interval) = ticker {
        interval.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn() -> std::future::Ready<Result<usize, SyncError>> + Send + Sync + 'static {
        let calls = calls.clone();
        move || std::future::ready(Ok(calls.fetch_add(1, Ordering::SeqCst) + 1))
    }

    #[tokio::test(start_paused = true)]
    async fn polls_at_the_configured_cadence() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, ready) = watch::channel(true);

        let w = cache.watch(
            QueryKey::new("messages").with("bob"),
            QueryOptions::polling(Duration::from_secs(5)),
            ready,
            counter(&calls),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(w.data().as_deref(), Some(&1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_watch_stops_polling() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, ready) = watch::channel(true);
        let key = QueryKey::new("reels");

        let w = cache.watch(key.clone(), QueryOptions::polling(Duration::from_secs(30)), ready, counter(&calls));
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(w);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_readiness() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, ready) = watch::channel(false);

        let mut w = cache.watch(QueryKey::new("callerProfile"), QueryOptions::default(), ready, counter(&calls));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tx.send(true).unwrap();
        let snap = w.settled().await;
        assert_eq!(snap.data.as_deref(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_triggers_refetch() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, ready) = watch::channel(true);
        let key = QueryKey::new("followers").with("alice");

        let w = cache.watch(key.clone(), QueryOptions::default(), ready, counter(&calls));
        tokio::time::sleep(Duration::from_millis(10)).await;

        cache.invalidate(&QueryKey::new("followers"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(w.data().as_deref(), Some(&2));
        assert!(!w.snapshot().is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_previous_value() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, ready) = watch::channel(true);
        let seen = calls.clone();

        let w = cache.watch(
            QueryKey::new("stories"),
            QueryOptions::polling(Duration::from_secs(30)),
            ready,
            move || {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(vec!["first".to_string()])
                    } else {
                        Err(SyncError::Actor(connect_actor::ActorError::Transport("down".into())))
                    }
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(31)).await;
        let snap = w.snapshot();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(snap.data.as_deref(), Some(&vec!["first".to_string()]));
        assert!(snap.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_while_not_ready_waits_for_the_actor() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, ready) = watch::channel(true);
        let key = QueryKey::new("following").with("alice");

        let w = cache.watch(key.clone(), QueryOptions::default(), ready, counter(&calls));
        tokio::time::sleep(Duration::from_millis(10)).await;

        tx.send(false).unwrap();
        cache.invalidate(&key);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(w.snapshot().is_stale);

        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!w.snapshot().is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn lagged_view_still_picks_up_invalidation() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (_tx, ready) = watch::channel(true);
        let key = QueryKey::new("followers").with("bob");

        let w = cache.watch(key.clone(), QueryOptions::default(), ready, counter(&calls));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Bury the invalidation under more events than the channel holds.
        cache.invalidate(&key);
        for _ in 0..40 {
            let _ = cache
                .refetch::<usize, _, _>(&key, &QueryOptions::default(), || async {
                    Err(SyncError::Actor(connect_actor::ActorError::Transport("down".into())))
                })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!w.snapshot().is_stale);
    }
}
