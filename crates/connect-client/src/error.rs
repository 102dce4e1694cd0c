use connect_actor::ActorError;
use connect_sync::SyncError;

use crate::validation::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Rejected locally; the backend was never called
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Media could not be stored, so the write that needed it was not sent
    #[error("upload failed: {0}")]
    Upload(ActorError),
}

impl From<ActorError> for ClientError {
    fn from(err: ActorError) -> Self {
        Self::Sync(SyncError::Actor(err))
    }
}

impl ClientError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::Sync(SyncError::NotReady))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
