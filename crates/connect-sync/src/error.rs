use connect_actor::ActorError;

/// Errors surfaced by queries and mutations.
///
/// `Clone` because a single fetch result is shared by every caller that
/// attached to it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The actor has no resolved identity or connection yet
    #[error("actor is not ready")]
    NotReady,

    #[error(transparent)]
    Actor(#[from] ActorError),

    /// A key was read back as a different type than it was stored with
    #[error("cached value for {0} has a different type")]
    TypeMismatch(String),
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Actor(e) => e.is_transient(),
            Self::NotReady => true,
            Self::TypeMismatch(_) => false,
        }
    }
}
