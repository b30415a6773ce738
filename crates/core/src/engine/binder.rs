//! Identity binder: resolves opaque artifact ids to work-item indices.

use std::collections::{HashMap, HashSet, VecDeque};

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::worker::WorkerId;

use super::config::RunConfig;

/// Reconciles the two producer paths into one index-to-artifact mapping.
///
/// An artifact-creation event carries only an opaque id and its
/// originating worker. The index is found either from the worker's FIFO
/// hint queue (pushed right before the driver triggers production) or,
/// with no hint, from the worker's currently-assigned index. First
/// writer wins: once an id or an index is bound, later bind attempts
/// are rejected until the binding is consumed by a terminal transport
/// event.
#[derive(Debug, Default)]
pub struct IdentityBinder {
    hints: HashMap<WorkerId, VecDeque<usize>>,
    bindings: HashMap<String, usize>,
    bound_indices: HashSet<usize>,
}

impl IdentityBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register the next artifact from `worker` as belonging to `index`.
    pub fn push_hint(&mut self, worker: WorkerId, index: usize) {
        self.hints.entry(worker).or_default().push_back(index);
    }

    /// Resolve the index for a fresh artifact from `worker`: pop the hint
    /// queue if non-empty, otherwise fall back to the worker's assigned
    /// index.
    pub fn resolve(&mut self, worker: WorkerId, assigned: Option<usize>) -> Option<usize> {
        if let Some(queue) = self.hints.get_mut(&worker) {
            if let Some(index) = queue.pop_front() {
                return Some(index);
            }
        }
        assigned
    }

    /// Record `artifact_id → index`. Returns false if the id or the index
    /// is already bound.
    pub fn bind(&mut self, artifact_id: &str, index: usize) -> bool {
        if self.bindings.contains_key(artifact_id) || self.bound_indices.contains(&index) {
            return false;
        }
        self.bindings.insert(artifact_id.to_string(), index);
        self.bound_indices.insert(index);
        true
    }

    pub fn index_for(&self, artifact_id: &str) -> Option<usize> {
        self.bindings.get(artifact_id).copied()
    }

    /// Remove and return the binding. Terminal transport events call this
    /// so a duplicate terminal event finds nothing and becomes a no-op.
    pub fn consume(&mut self, artifact_id: &str) -> Option<usize> {
        let index = self.bindings.remove(artifact_id)?;
        self.bound_indices.remove(&index);
        Some(index)
    }

    /// Drop the hint queue for a worker being torn down.
    pub fn forget_worker(&mut self, worker: WorkerId) {
        self.hints.remove(&worker);
    }

    /// Drop any live binding for an item being torn down.
    pub fn forget_index(&mut self, index: usize) {
        if self.bound_indices.remove(&index) {
            self.bindings.retain(|_, bound| *bound != index);
        }
    }

    pub fn reset(&mut self) {
        self.hints.clear();
        self.bindings.clear();
        self.bound_indices.clear();
    }
}

/// 1-based, zero-padded item label (`index 2, width 2` → `"03"`).
pub fn item_label(index: usize, padding: usize) -> String {
    format!("{:0width$}", index + 1, width = padding)
}

/// Deterministic output path for a bound artifact.
pub fn output_name(
    config: &RunConfig,
    index: usize,
    suggested_name: &str,
    mime: Option<&str>,
) -> String {
    let ext = infer_ext(suggested_name, mime);
    let label = item_label(index, config.padding);
    if config.output_folder.is_empty() {
        format!("{label}.{ext}")
    } else {
        format!("{}/{label}.{ext}", config.output_folder)
    }
}

static EXT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(png|jpe?g|webp)(\?|$)").unwrap());

/// Extension from the filename or URL first, then the mime type, with
/// png as the default.
pub fn infer_ext(filename_or_url: &str, mime: Option<&str>) -> &'static str {
    if let Some(captures) = EXT_PATTERN.captures(filename_or_url) {
        let matched = captures.get(1).map(|m| m.as_str().to_lowercase());
        match matched.as_deref() {
            Some("png") => return "png",
            Some("jpg") | Some("jpeg") => return "jpg",
            Some("webp") => return "webp",
            _ => {}
        }
    }
    if let Some(mime) = mime {
        let mime = mime.to_lowercase();
        if mime.contains("png") {
            return "png";
        }
        if mime.contains("jpeg") {
            return "jpg";
        }
        if mime.contains("webp") {
            return "webp";
        }
    }
    "png"
}
