use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use connect_actor::{BlobStore, UploadProgress};
use connect_types::BlobHandle;
use connect_types::events::Notice;

use crate::error::ClientError;
use crate::validation::Media;

/// Caller-supplied progress sink, called with 0..=100.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Push `media` to the blob store, reporting progress both to `on_progress`
/// and as [`Notice::UploadProgress`].
pub(crate) async fn upload(
    blobs: &dyn BlobStore,
    notices: &broadcast::Sender<Notice>,
    operation: &'static str,
    media: Media,
    on_progress: Option<ProgressFn>,
) -> Result<BlobHandle, ClientError> {
    let notices = notices.clone();
    let progress = Arc::new(UploadProgress::with_callback(move |percent| {
        if let Some(cb) = &on_progress {
            cb(percent);
        }
        let _ = notices.send(Notice::UploadProgress {
            operation: operation.to_string(),
            percent,
        });
    }));

    let size = media.bytes.len();
    match blobs.put(&media.content_type, media.bytes, progress).await {
        Ok(handle) => {
            info!(operation, size, "upload complete");
            Ok(handle)
        }
        Err(e) => {
            warn!(operation, size, error = %e, "upload failed");
            Err(ClientError::Upload(e))
        }
    }
}
