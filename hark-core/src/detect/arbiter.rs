//! Detection arbitration.
//!
//! A detection fires only when all four gates agree: the keyword is in the
//! active set, its score clears the threshold, the speech gate is open, and
//! the engine is outside its cooldown window. The cooldown is engine-wide —
//! while it runs, no keyword (including a different one) can trigger.

use std::time::{Duration, Instant};

/// Decides whether a keyword score update becomes a detection event.
#[derive(Debug, Clone)]
pub struct DetectionArbiter {
    threshold: f32,
    cooldown: Duration,
    /// Deadline check, not a timer: set on emission, consulted on the next
    /// candidate.
    cooldown_until: Option<Instant>,
}

impl DetectionArbiter {
    pub fn new(threshold: f32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            cooldown_until: None,
        }
    }

    /// Evaluate one score update. Returns `true` exactly when a detection
    /// should be emitted, and enters cooldown as a side effect.
    pub fn consider(
        &mut self,
        score: f32,
        keyword_active: bool,
        speech_active: bool,
        now: Instant,
    ) -> bool {
        if !keyword_active || score <= self.threshold || !speech_active {
            return false;
        }
        if let Some(deadline) = self.cooldown_until {
            if now < deadline {
                return false;
            }
        }
        self.cooldown_until = Some(now + self.cooldown);
        true
    }

    /// Clear any pending cooldown.
    pub fn reset(&mut self) {
        self.cooldown_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> DetectionArbiter {
        DetectionArbiter::new(0.5, Duration::from_millis(2_000))
    }

    #[test]
    fn requires_all_four_gates() {
        let now = Instant::now();
        assert!(!arbiter().consider(0.9, false, true, now), "inactive keyword");
        assert!(!arbiter().consider(0.4, true, true, now), "below threshold");
        assert!(!arbiter().consider(0.5, true, true, now), "threshold is strict");
        assert!(!arbiter().consider(0.9, true, false, now), "speech gate closed");
        assert!(arbiter().consider(0.9, true, true, now));
    }

    #[test]
    fn cooldown_is_shared_across_keywords() {
        let mut arb = arbiter();
        let t0 = Instant::now();
        assert!(arb.consider(0.9, true, true, t0));
        // A different keyword's score inside the window is still blocked:
        // the arbiter has no per-keyword state at all.
        assert!(!arb.consider(0.95, true, true, t0 + Duration::from_millis(1)));
        assert!(!arb.consider(0.95, true, true, t0 + Duration::from_millis(1_999)));
        assert!(arb.consider(0.95, true, true, t0 + Duration::from_millis(2_000)));
    }

    #[test]
    fn rejected_candidates_do_not_extend_cooldown() {
        let mut arb = arbiter();
        let t0 = Instant::now();
        assert!(arb.consider(0.9, true, true, t0));
        assert!(!arb.consider(0.9, true, true, t0 + Duration::from_millis(1_000)));
        // Deadline still anchored at t0 + 2000.
        assert!(arb.consider(0.9, true, true, t0 + Duration::from_millis(2_001)));
    }

    #[test]
    fn reset_clears_cooldown() {
        let mut arb = arbiter();
        let t0 = Instant::now();
        assert!(arb.consider(0.9, true, true, t0));
        arb.reset();
        assert!(arb.consider(0.9, true, true, t0 + Duration::from_millis(1)));
    }
}
