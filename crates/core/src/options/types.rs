//! Prompt composition options.

use serde::{Deserialize, Serialize};

/// User-tunable text fragments wrapped around every submitted prompt.
///
/// Composition order is fixed: global id, style module, the scene line,
/// then the output suffix. Empty fragments are skipped and whitespace
/// runs collapse to single spaces so stored fragments can be formatted
/// freely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptOptions {
    #[serde(default)]
    pub global_id: String,
    #[serde(default)]
    pub style_module: String,
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            global_id: String::new(),
            style_module: String::new(),
            output_suffix: default_output_suffix(),
        }
    }
}

fn default_output_suffix() -> String {
    " [OUTPUT] High resolution, aspect ratio 3:2, single-frame composition, no collage.".to_string()
}

impl PromptOptions {
    /// Builds the full payload for one scene prompt.
    pub fn compose(&self, prompt: &str) -> String {
        let scene = if prompt.trim().is_empty() {
            String::new()
        } else {
            format!("[SCENE] {prompt}")
        };

        let parts = [
            self.global_id.as_str(),
            self.style_module.as_str(),
            scene.as_str(),
            self.output_suffix.as_str(),
        ];

        parts
            .iter()
            .filter(|p| !p.trim().is_empty())
            .flat_map(|p| p.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
