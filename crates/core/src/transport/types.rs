//! Artifact transport types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an artifact's bytes come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadSource {
    /// Plain http(s) URL.
    Url { url: String },
    /// RFC 2397 data URL, base64 or percent-encoded.
    DataUrl { data: String },
}

/// Terminal transport states reported per artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Complete,
    Interrupted,
}

/// Answer to the synchronous final-name callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NameDecision {
    /// Write the artifact under this path, relative to the output root.
    Override { name: String },
    /// Keep the transport's suggested name.
    LeaveAsIs,
}

/// Errors raised while moving artifact bytes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("Malformed data URL: {0}")]
    InvalidDataUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serialization() {
        let source = DownloadSource::Url {
            url: "https://example.com/img.png".to_string(),
        };
        let json = serde_json::to_string(&source).unwrap();
        assert!(json.contains("\"type\":\"url\""));

        let back: DownloadSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&DownloadState::Complete).unwrap(),
            "\"complete\""
        );
        assert_eq!(
            serde_json::to_string(&DownloadState::Interrupted).unwrap(),
            "\"interrupted\""
        );
    }

    #[test]
    fn test_name_decision_serialization() {
        let decision = NameDecision::Override {
            name: "assets/images/03.png".to_string(),
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"type\":\"override\""));

        let back: NameDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decision);
    }
}
