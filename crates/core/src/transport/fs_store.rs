//! Filesystem-backed artifact store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::fs;
use uuid::Uuid;

use crate::worker::WorkerId;

use super::traits::{ArtifactStore, TransportEvents};
use super::types::{DownloadSource, DownloadState, NameDecision, TransportError};

/// Writes artifacts under a fixed output root.
///
/// Each `begin` call registers the transfer, spawns a detached task that
/// runs it to completion and returns immediately with the artifact id.
/// The naming callback is answered before any bytes reach disk.
pub struct FsArtifactStore {
    root: PathBuf,
    events: Arc<dyn TransportEvents>,
    client: reqwest::Client,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, events: Arc<dyn TransportEvents>) -> Self {
        Self {
            root: root.into(),
            events,
            client: reqwest::Client::new(),
        }
    }

    async fn run_transfer(
        root: PathBuf,
        events: Arc<dyn TransportEvents>,
        client: reqwest::Client,
        artifact_id: String,
        source: DownloadSource,
        origin: WorkerId,
    ) {
        events.artifact_created(&artifact_id, origin).await;

        let outcome = Self::fetch_and_write(&root, &events, &client, &artifact_id, source).await;

        let state = match outcome {
            Ok(path) => {
                tracing::debug!(artifact_id = %artifact_id, path = %path.display(), "artifact written");
                DownloadState::Complete
            }
            Err(e) => {
                tracing::warn!(artifact_id = %artifact_id, error = %e, "artifact transfer failed");
                DownloadState::Interrupted
            }
        };

        events.state_changed(&artifact_id, state).await;
    }

    async fn fetch_and_write(
        root: &PathBuf,
        events: &Arc<dyn TransportEvents>,
        client: &reqwest::Client,
        artifact_id: &str,
        source: DownloadSource,
    ) -> Result<PathBuf, TransportError> {
        let (bytes, suggested, mime) = match source {
            DownloadSource::Url { url } => {
                let suggested = suggested_name(&url);
                let response = client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(TransportError::HttpStatus(response.status().as_u16()));
                }
                let mime = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
                let bytes = response.bytes().await?.to_vec();
                (bytes, suggested, mime)
            }
            DownloadSource::DataUrl { data } => {
                let (mime, bytes) = parse_data_url(&data)?;
                (bytes, "artifact".to_string(), mime)
            }
        };

        let decision = events
            .determine_final_name(artifact_id, &suggested, mime.as_deref())
            .await;

        let relative = match decision {
            NameDecision::Override { name } => name,
            NameDecision::LeaveAsIs => suggested,
        };
        let path = root.join(relative.trim_start_matches('/'));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &bytes).await?;

        Ok(path)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn begin(
        &self,
        source: DownloadSource,
        origin: WorkerId,
    ) -> Result<String, TransportError> {
        let artifact_id = Uuid::new_v4().to_string();

        tokio::spawn(Self::run_transfer(
            self.root.clone(),
            Arc::clone(&self.events),
            self.client.clone(),
            artifact_id.clone(),
            source,
            origin,
        ));

        Ok(artifact_id)
    }
}

/// Last path segment of the URL, without query or fragment. URLs with no
/// path fall back to a generic name.
fn suggested_name(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    match without_scheme.trim_end_matches('/').split_once('/') {
        Some((_, path)) => {
            let segment = path.rsplit('/').next().unwrap_or("");
            if segment.is_empty() {
                "artifact".to_string()
            } else {
                segment.to_string()
            }
        }
        None => "artifact".to_string(),
    }
}

/// Splits an RFC 2397 data URL into its media type and decoded payload.
fn parse_data_url(data: &str) -> Result<(Option<String>, Vec<u8>), TransportError> {
    let rest = data
        .strip_prefix("data:")
        .ok_or_else(|| TransportError::InvalidDataUrl("missing data: prefix".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| TransportError::InvalidDataUrl("missing comma separator".to_string()))?;

    let base64_encoded = header.ends_with(";base64");
    let media = header.trim_end_matches(";base64");
    let mime = if media.is_empty() {
        None
    } else {
        Some(media.to_string())
    };

    let bytes = if base64_encoded {
        BASE64
            .decode(payload.trim())
            .map_err(|e| TransportError::InvalidDataUrl(e.to_string()))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    Ok((mime, bytes))
}
