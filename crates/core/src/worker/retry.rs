//! Tick-driven retry gating for worker automation steps.

use std::time::{Duration, Instant};

/// Bounds how often a worker's current automation step may be
/// retriggered by foreground ticks.
///
/// A step is retried only if the minimum interval has elapsed since the
/// last attempt and the attempt cap is not exhausted. Once the item's
/// artifact is in flight the gate is suppressed for good; a new step
/// resets the counter.
#[derive(Debug)]
pub struct RetryGate {
    min_interval: Duration,
    max_attempts: u32,
    last_attempt: Option<Instant>,
    attempts: u32,
    suppressed: bool,
}

impl RetryGate {
    pub fn new(min_interval: Duration, max_attempts: u32) -> Self {
        Self {
            min_interval,
            max_attempts,
            last_attempt: None,
            attempts: 0,
            suppressed: false,
        }
    }

    /// Try to claim a retry slot now.
    pub fn try_arm(&mut self) -> bool {
        self.try_arm_at(Instant::now())
    }

    /// Try to claim a retry slot at `now`. Returns true and records the
    /// attempt if the gate allows it.
    pub fn try_arm_at(&mut self, now: Instant) -> bool {
        if self.suppressed {
            return false;
        }
        if self.attempts >= self.max_attempts {
            return false;
        }
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_attempt = Some(now);
        self.attempts += 1;
        true
    }

    /// The item advanced to a new step; earlier attempts no longer count.
    pub fn new_step(&mut self) {
        self.attempts = 0;
        self.last_attempt = None;
    }

    /// The artifact is in flight; no further retriggering.
    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_allowed() {
        let mut gate = RetryGate::new(Duration::from_millis(1800), 3);
        assert!(gate.try_arm_at(Instant::now()));
    }

    #[test]
    fn test_min_interval_enforced() {
        let mut gate = RetryGate::new(Duration::from_millis(1800), 3);
        let t0 = Instant::now();
        assert!(gate.try_arm_at(t0));
        assert!(!gate.try_arm_at(t0 + Duration::from_millis(100)));
        assert!(gate.try_arm_at(t0 + Duration::from_millis(1800)));
    }

    #[test]
    fn test_attempt_cap() {
        let mut gate = RetryGate::new(Duration::from_millis(10), 3);
        let t0 = Instant::now();
        assert!(gate.try_arm_at(t0));
        assert!(gate.try_arm_at(t0 + Duration::from_millis(10)));
        assert!(gate.try_arm_at(t0 + Duration::from_millis(20)));
        assert!(!gate.try_arm_at(t0 + Duration::from_millis(30)));
    }

    #[test]
    fn test_new_step_resets_attempts() {
        let mut gate = RetryGate::new(Duration::from_millis(10), 1);
        let t0 = Instant::now();
        assert!(gate.try_arm_at(t0));
        assert!(!gate.try_arm_at(t0 + Duration::from_millis(10)));
        gate.new_step();
        assert!(gate.try_arm_at(t0 + Duration::from_millis(20)));
    }

    #[test]
    fn test_suppression_is_permanent() {
        let mut gate = RetryGate::new(Duration::from_millis(10), 3);
        gate.suppress();
        assert!(gate.is_suppressed());
        assert!(!gate.try_arm_at(Instant::now()));
        gate.new_step();
        assert!(!gate.try_arm_at(Instant::now()));
    }
}
