use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::StatusCode;

use connect_types::BlobHandle;
use connect_types::api::BlobUploadResponse;

use crate::error::{ActorError, ActorResult};

/// Upload body slice size.
pub const UPLOAD_CHUNK: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UploadState {
    Idle = 0,
    Uploading = 1,
    Complete = 2,
    Error = 3,
}

impl UploadState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Uploading,
            2 => Self::Complete,
            3 => Self::Error,
            _ => Self::Idle,
        }
    }
}

type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Shared upload progress.
///
/// Readers poll [`percent`](Self::percent); an optional callback fires each
/// time the whole-number percentage changes.
pub struct UploadProgress {
    bytes_done: AtomicU64,
    bytes_total: AtomicU64,
    last_percent: AtomicU8,
    state: AtomicU8,
    on_progress: Option<ProgressCallback>,
}

impl UploadProgress {
    pub fn new() -> Self {
        Self {
            bytes_done: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            last_percent: AtomicU8::new(0),
            state: AtomicU8::new(UploadState::Idle as u8),
            on_progress: None,
        }
    }

    pub fn with_callback(f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            on_progress: Some(Box::new(f)),
            ..Self::new()
        }
    }

    pub fn percent(&self) -> u8 {
        let total = self.bytes_total.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }
        let done = self.bytes_done.load(Ordering::Relaxed).min(total);
        ((done * 100) / total) as u8
    }

    pub fn state(&self) -> UploadState {
        UploadState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn begin(&self, total: u64) {
        self.bytes_total.store(total, Ordering::Relaxed);
        self.bytes_done.store(0, Ordering::Relaxed);
        self.last_percent.store(0, Ordering::Relaxed);
        self.state.store(UploadState::Uploading as u8, Ordering::Relaxed);
    }

    pub fn advance(&self, n: u64) {
        self.bytes_done.fetch_add(n, Ordering::Relaxed);
        let pct = self.percent();
        let prev = self.last_percent.swap(pct, Ordering::Relaxed);
        if pct != prev {
            if let Some(cb) = &self.on_progress {
                cb(pct);
            }
        }
    }

    pub fn finish(&self, ok: bool) {
        let state = if ok { UploadState::Complete } else { UploadState::Error };
        self.state.store(state as u8, Ordering::Relaxed);
    }
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage for media referenced by reels, stories and profile pictures.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        content_type: &str,
        bytes: Bytes,
        progress: Arc<UploadProgress>,
    ) -> ActorResult<BlobHandle>;
}

/// Splits a payload into zero-copy upload slices.
pub(crate) fn slices(bytes: &Bytes, size: usize) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(size)
        .map(|start| bytes.slice(start..(start + size).min(bytes.len())))
        .collect()
}

/// Streams media to `PUT {base}/blobs`.
#[derive(Clone)]
pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        content_type: &str,
        bytes: Bytes,
        progress: Arc<UploadProgress>,
    ) -> ActorResult<BlobHandle> {
        let total = bytes.len() as u64;
        progress.begin(total);

        let parts = slices(&bytes, UPLOAD_CHUNK);
        let prog = progress.clone();
        let stream = async_stream::stream! {
            for part in parts {
                prog.advance(part.len() as u64);
                yield Ok::<_, std::io::Error>(part);
            }
        };

        let mut req = self
            .client
            .put(format!("{}/blobs", self.base_url))
            .header("Content-Type", content_type)
            .header("Content-Length", total.to_string())
            .body(reqwest::Body::wrap_stream(stream));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let result = send_upload(req).await;

        progress.finish(result.is_ok());
        result
    }
}

async fn send_upload(req: reqwest::RequestBuilder) -> ActorResult<BlobHandle> {
    let resp = req.send().await?;
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ActorError::Unauthorized(format!("blob upload ({})", status)));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ActorError::Transport(format!("blob upload failed ({}): {}", status, body)));
    }
    let uploaded: BlobUploadResponse = resp.json().await?;
    Ok(BlobHandle::from_url(uploaded.url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn slices_cover_payload() {
        let data = Bytes::from(vec![7u8; 10]);
        let parts = slices(&data, 4);
        assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert!(slices(&Bytes::new(), 4).is_empty());
    }

    #[test]
    fn callback_fires_on_percent_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = UploadProgress::with_callback(move |pct| sink.lock().unwrap().push(pct));

        progress.begin(200);
        progress.advance(50);
        progress.advance(0);
        progress.advance(150);
        progress.finish(true);

        assert_eq!(*seen.lock().unwrap(), vec![25, 100]);
        assert_eq!(progress.state(), UploadState::Complete);
    }
}
