//! Recording artifact store for engine tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::transport::{ArtifactStore, DownloadSource, TransportError};
use crate::worker::WorkerId;

/// An [`ArtifactStore`] that records `begin` calls and mints sequential
/// artifact ids without moving any bytes.
#[derive(Debug, Default)]
pub struct MockArtifactStore {
    next_id: AtomicU64,
    begun: RwLock<Vec<(DownloadSource, WorkerId)>>,
    fail_next: RwLock<Option<String>>,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `begin` call fail with an interrupted-transfer error.
    pub fn fail_next_begin(&self, message: impl Into<String>) {
        *self.fail_next.write().unwrap() = Some(message.into());
    }

    /// All transfers started so far, in order.
    pub fn begun(&self) -> Vec<(DownloadSource, WorkerId)> {
        self.begun.read().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn begin(
        &self,
        source: DownloadSource,
        origin: WorkerId,
    ) -> Result<String, TransportError> {
        if let Some(message) = self.fail_next.write().unwrap().take() {
            return Err(TransportError::InvalidDataUrl(message));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.begun.write().unwrap().push((source, origin));
        Ok(format!("artifact-{id}"))
    }
}
