use serde::{Deserialize, Serialize};

/// User-facing notices emitted by the client.
///
/// Front-ends render these as transient, non-fatal toasts. Every failed
/// mutation produces exactly one `MutationFailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Notice {
    /// A write went through and its dependent queries were invalidated
    MutationSucceeded { operation: String },

    /// A write was rejected locally or by the backend
    MutationFailed { operation: String, message: String },

    /// A read failed; any previously cached value stays visible
    QueryFailed { key: String, message: String },

    /// Blob upload progress, 0..=100
    UploadProgress { operation: String, percent: u8 },
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::MutationFailed { .. } | Self::QueryFailed { .. })
    }
}
