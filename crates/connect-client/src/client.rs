use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use connect_actor::{BlobStore, SocialActor};
use connect_sync::{
    MutationOutcome, MutationSpec, Mutator, NullLogger, QueryCache, QueryKey, QueryOptions,
    SyncError, SyncLogger, Watch,
};
use connect_types::Principal;
use connect_types::events::Notice;

use crate::clock::{Clock, SystemClock};
use crate::config::SyncSettings;
use crate::error::{ClientError, ClientResult};
use crate::session::{Identity, Session};
use crate::validation::ValidationError;

const NOTICE_CAPACITY: usize = 256;

/// Boxed fetch future handed to the cache.
pub(crate) type Fetch<T> = BoxFuture<'static, Result<T, SyncError>>;

/// Programmatic front door to the social backend.
///
/// Reads go through the shared [`QueryCache`], writes through the
/// [`Mutator`] and the invalidation table in [`keys`](crate::keys). Cheap to
/// clone.
#[derive(Clone)]
pub struct SocialClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) session: Session,
    pub(crate) cache: QueryCache,
    pub(crate) mutator: Mutator,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: SyncSettings,
    pub(crate) notices: broadcast::Sender<Notice>,
    /// Peers opened or messaged this session, most recent first
    conversations: Mutex<Vec<Principal>>,
}

pub struct ClientBuilder {
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    logger: Arc<dyn SyncLogger>,
}

impl ClientBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn SyncLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> SocialClient {
        let cache = QueryCache::with_idle_ttl(self.logger, self.settings.cache_idle_ttl);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        SocialClient {
            inner: Arc::new(ClientInner {
                session: Session::new(),
                mutator: Mutator::new(cache.clone()),
                cache,
                blobs: self.blobs,
                clock: self.clock,
                settings: self.settings,
                notices,
                conversations: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl SocialClient {
    pub fn builder(blobs: Arc<dyn BlobStore>) -> ClientBuilder {
        ClientBuilder {
            blobs,
            clock: Arc::new(SystemClock),
            settings: SyncSettings::default(),
            logger: Arc::new(NullLogger),
        }
    }

    /// Bind to an identity. Everything cached so far is marked stale, so
    /// open views refresh as the new caller.
    pub fn connect(&self, actor: Arc<dyn SocialActor>, principal: Principal) {
        self.inner.session.connect(actor, principal);
        self.inner.cache.invalidate(&QueryKey::root());
    }

    /// Drop the identity. Queries go back to disabled, whatever is cached
    /// is marked stale and the conversation list is forgotten.
    pub fn disconnect(&self) {
        self.inner.session.disconnect();
        self.inner.cache.invalidate(&QueryKey::root());
        self.inner.conversations.lock().clear();
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn me(&self) -> Option<Principal> {
        self.inner.session.principal()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// True while a write holding `lock` (see [`keys::lock`](crate::keys::lock))
    /// is outstanding.
    pub fn is_pending(&self, lock: &str) -> bool {
        self.inner.mutator.is_pending(lock)
    }

    pub fn conversations(&self) -> Vec<Principal> {
        self.inner.conversations.lock().clone()
    }

    /// Move `peer` to the top of the conversation list.
    pub fn open_conversation(&self, peer: &Principal) {
        let mut list = self.inner.conversations.lock();
        list.retain(|p| p != peer);
        list.insert(0, peer.clone());
    }

    pub(crate) fn identity(&self) -> ClientResult<Identity> {
        Ok(self.inner.session.identity()?)
    }

    /// Identity for a write. Without one the write fails like any other,
    /// notice included.
    pub(crate) fn writer(&self, operation: &'static str) -> ClientResult<Identity> {
        self.identity().map_err(|e| self.fail(operation, e))
    }

    pub(crate) fn opts(&self) -> QueryOptions {
        QueryOptions::default().enabled(self.inner.session.is_ready())
    }

    /// Wrap an actor call into a fetcher that resolves the identity each
    /// time it runs, so a long-lived watch follows reconnects.
    pub(crate) fn fetcher<T, F, Fut>(&self, call: F) -> impl Fn() -> Fetch<T> + Send + Sync + 'static
    where
        T: Send + 'static,
        F: Fn(Identity) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
    {
        let session = self.inner.session.clone();
        move || match session.identity() {
            Ok(id) => call(id).boxed(),
            Err(e) => futures_util::future::ready(Err(e)).boxed(),
        }
    }

    pub(crate) async fn read<T, F>(&self, key: QueryKey, fetcher: F) -> ClientResult<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fetch<T>,
    {
        match self.inner.cache.fetch(&key, &self.opts(), fetcher).await {
            Ok(value) => Ok(value),
            Err(SyncError::NotReady) => Err(SyncError::NotReady.into()),
            Err(e) => {
                self.notify(Notice::QueryFailed {
                    key: key.to_string(),
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    pub(crate) fn live<T, F>(&self, key: QueryKey, poll: Option<Duration>, fetcher: F) -> Watch<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fetch<T> + Send + Sync + 'static,
    {
        let opts = QueryOptions {
            poll_interval: poll,
            ..QueryOptions::default()
        };
        self.inner
            .cache
            .watch(key, opts, self.inner.session.readiness(), fetcher)
    }

    /// Run a write through the mutator and report the result as a notice.
    pub(crate) async fn mutate<T, Fut>(
        &self,
        spec: MutationSpec,
        lock: String,
        call: Fut,
    ) -> ClientResult<MutationOutcome<T>>
    where
        Fut: Future<Output = ClientResult<T>>,
    {
        match self.inner.mutator.run(&spec, lock, call).await {
            Ok(MutationOutcome::AlreadyPending) => {
                debug!(operation = spec.name, "write already pending");
                Ok(MutationOutcome::AlreadyPending)
            }
            Ok(done) => {
                self.notify(Notice::MutationSucceeded {
                    operation: spec.name.to_string(),
                });
                Ok(done)
            }
            Err(e) => {
                self.notify(Notice::MutationFailed {
                    operation: spec.name.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Local rejection: reported like any failed write, nothing is sent.
    pub(crate) fn reject(&self, operation: &'static str, err: ValidationError) -> ClientError {
        self.fail(operation, err.into())
    }

    /// Report a write that failed before reaching the mutator.
    pub(crate) fn fail(&self, operation: &'static str, err: ClientError) -> ClientError {
        self.notify(Notice::MutationFailed {
            operation: operation.to_string(),
            message: err.to_string(),
        });
        err
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine.
        let _ = self.inner.notices.send(notice);
    }
}
