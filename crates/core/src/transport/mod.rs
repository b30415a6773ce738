//! Artifact transport: moving rendered bytes from a source to disk.
//!
//! The engine never touches bytes itself. It hands a [`DownloadSource`]
//! to an [`ArtifactStore`], receives an opaque artifact id back and then
//! follows the transfer through the [`TransportEvents`] callbacks,
//! answering the naming question before the file is written.

mod fs_store;
mod traits;
mod types;

pub use fs_store::FsArtifactStore;
pub use traits::{ArtifactStore, TransportEvents};
pub use types::{DownloadSource, DownloadState, NameDecision, TransportError};
