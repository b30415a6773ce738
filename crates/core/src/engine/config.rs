//! Engine configuration and per-run settings.

use serde::{Deserialize, Serialize};

use super::types::ConcurrencyMode;

/// Tunable engine timers and bounds.
///
/// All values have working defaults; tests shrink the timers to keep the
/// suites fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long an item may sit in `assigned` before it is failed and its
    /// context closed (seconds).
    #[serde(default = "default_assign_timeout")]
    pub assign_timeout_secs: u64,

    /// Rotator tick interval (milliseconds).
    #[serde(default = "default_rotate_interval")]
    pub rotate_interval_ms: u64,

    /// Delay between focusing a context and sending its foreground tick
    /// (milliseconds).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Minimum interval between retriggered automation attempts for one
    /// worker (milliseconds).
    #[serde(default = "default_tick_min_interval")]
    pub tick_min_interval_ms: u64,

    /// Maximum retriggered attempts per item step.
    #[serde(default = "default_tick_max_attempts")]
    pub tick_max_attempts: u32,

    /// Ring bound of the recent-activity log.
    #[serde(default = "default_recent_log_cap")]
    pub recent_log_cap: usize,

    /// How many log entries a snapshot returns.
    #[serde(default = "default_snapshot_recent")]
    pub snapshot_recent: usize,

    /// Concurrency cap applied when a start request leaves it unset.
    #[serde(default = "default_cap")]
    pub default_cap: usize,

    /// Output folder applied when a start request leaves it unset.
    #[serde(default = "default_output_folder")]
    pub default_output_folder: String,
}

fn default_assign_timeout() -> u64 {
    60
}

fn default_rotate_interval() -> u64 {
    2000
}

fn default_settle_delay() -> u64 {
    350
}

fn default_tick_min_interval() -> u64 {
    1800
}

fn default_tick_max_attempts() -> u32 {
    3
}

fn default_recent_log_cap() -> usize {
    300
}

fn default_snapshot_recent() -> usize {
    12
}

fn default_cap() -> usize {
    8
}

fn default_output_folder() -> String {
    "assets/images".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assign_timeout_secs: default_assign_timeout(),
            rotate_interval_ms: default_rotate_interval(),
            settle_delay_ms: default_settle_delay(),
            tick_min_interval_ms: default_tick_min_interval(),
            tick_max_attempts: default_tick_max_attempts(),
            recent_log_cap: default_recent_log_cap(),
            snapshot_recent: default_snapshot_recent(),
            default_cap: default_cap(),
            default_output_folder: default_output_folder(),
        }
    }
}

/// A fully resolved start request: prompts plus run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub prompts: Vec<String>,
    pub mode: ConcurrencyMode,
    pub cap: usize,
    pub output_folder: String,
}

/// Immutable settings of one run, recomputed at each start.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub item_count: usize,
    pub mode: ConcurrencyMode,
    pub cap: usize,
    /// Zero-pad width of output names, `max(2, digits(item_count))`.
    pub padding: usize,
    pub output_folder: String,
}

impl RunConfig {
    pub fn from_request(req: &StartRequest) -> Self {
        let item_count = req.prompts.len();
        Self {
            item_count,
            mode: req.mode,
            cap: req.cap,
            padding: pad_width(item_count),
            output_folder: req.output_folder.clone(),
        }
    }

    /// Effective admission cap: `cap` when capped, `item_count` otherwise.
    pub fn active_cap(&self) -> usize {
        match self.mode {
            ConcurrencyMode::Capped => self.cap,
            ConcurrencyMode::All => self.item_count,
        }
    }
}

/// Zero-pad width so filenames sort lexicographically: at least two
/// digits, more for runs of 100+ items.
pub fn pad_width(item_count: usize) -> usize {
    let digits = item_count.max(1).to_string().len();
    digits.max(2)
}
