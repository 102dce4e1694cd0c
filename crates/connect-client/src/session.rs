use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::info;

use connect_actor::SocialActor;
use connect_sync::SyncError;
use connect_types::Principal;

/// The resolved caller and the actor handle bound to it.
#[derive(Clone)]
pub struct Identity {
    pub principal: Principal,
    pub actor: Arc<dyn SocialActor>,
}

/// Identity provider adapter.
///
/// Queries stay disabled until [`connect`](Self::connect) is called; every
/// watch observes readiness through [`readiness`](Self::readiness).
#[derive(Clone)]
pub struct Session {
    current: Arc<RwLock<Option<Identity>>>,
    ready: Arc<watch::Sender<bool>>,
}

impl Session {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            current: Arc::new(RwLock::new(None)),
            ready: Arc::new(tx),
        }
    }

    pub fn connect(&self, actor: Arc<dyn SocialActor>, principal: Principal) {
        info!(principal = %principal, "session connected");
        *self.current.write() = Some(Identity { principal, actor });
        self.ready.send_replace(true);
    }

    pub fn disconnect(&self) {
        if self.current.write().take().is_some() {
            info!("session disconnected");
        }
        self.ready.send_replace(false);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    pub fn identity(&self) -> Result<Identity, SyncError> {
        self.current.read().clone().ok_or(SyncError::NotReady)
    }

    pub fn principal(&self) -> Option<Principal> {
        self.current.read().as_ref().map(|id| id.principal.clone())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
