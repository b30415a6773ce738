//! Transport seams.

use async_trait::async_trait;

use crate::worker::WorkerId;

use super::types::{DownloadSource, DownloadState, NameDecision, TransportError};

/// Moves artifact bytes to disk.
///
/// `begin` registers the transfer and returns its opaque artifact id; the
/// transfer itself runs detached and reports progress through the
/// caller's [`TransportEvents`] sink. The returned id is the only key the
/// engine ever sees for the artifact.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn begin(
        &self,
        source: DownloadSource,
        origin: WorkerId,
    ) -> Result<String, TransportError>;
}

/// Callbacks a transport reports into the engine.
///
/// `determine_final_name` is the synchronous naming hook: the transport
/// must not write the artifact before the answer arrives, and the
/// implementation must answer without blocking on anything slower than
/// the engine's own queue.
#[async_trait]
pub trait TransportEvents: Send + Sync {
    /// An artifact came into existence, originated by `origin`.
    async fn artifact_created(&self, artifact_id: &str, origin: WorkerId);

    /// Decide the artifact's final name before it is written.
    async fn determine_final_name(
        &self,
        artifact_id: &str,
        suggested_name: &str,
        mime: Option<&str>,
    ) -> NameDecision;

    /// The transfer reached a terminal state.
    async fn state_changed(&self, artifact_id: &str, state: DownloadState);
}
