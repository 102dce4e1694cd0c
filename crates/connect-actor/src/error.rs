use connect_types::api::{FaultKind, RpcFault};

pub type ActorResult<T> = Result<T, ActorError>;

/// Failures of a remote call. `Clone` so one failed fetch can be handed to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    /// Connectivity problems and backend-internal failures
    #[error("transport error: {0}")]
    Transport(String),

    /// Caller is not permitted to perform the operation
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// Backend refused the input
    #[error("rejected: {0}")]
    Rejected(String),

    /// Reply did not match the expected shape
    #[error("malformed reply: {0}")]
    Decode(String),
}

impl ActorError {
    /// Only transport failures may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<RpcFault> for ActorError {
    fn from(fault: RpcFault) -> Self {
        match fault.kind {
            FaultKind::Unauthorized => Self::Unauthorized(fault.message),
            FaultKind::Rejected => Self::Rejected(fault.message),
            FaultKind::Internal => Self::Transport(format!("backend: {}", fault.message)),
        }
    }
}

impl From<reqwest::Error> for ActorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}
