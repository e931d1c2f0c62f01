//! Speech gate with hangover hysteresis.
//!
//! ## Algorithm
//!
//! 1. On a speech frame: gate active, hangover counter reloaded.
//! 2. On a non-speech frame while active: counter decrements; the gate
//!    flips inactive only once it reaches zero (absorbs short dropouts
//!    mid-utterance).
//! 3. Transition edges are reported to the caller, which emits the
//!    `speech-start` / `speech-end` events.

/// A gate transition produced by [`VadGate::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEdge {
    /// Inactive → active.
    Start,
    /// Active → inactive (hangover exhausted).
    End,
}

/// Hysteresis gate over per-frame speech decisions.
#[derive(Debug, Clone)]
pub struct VadGate {
    hangover_frames: u32,
    hangover: u32,
    active: bool,
}

impl VadGate {
    pub fn new(hangover_frames: u32) -> Self {
        Self {
            hangover_frames,
            hangover: 0,
            active: false,
        }
    }

    /// Feed one frame's binary decision; returns the edge if the gate
    /// flipped.
    pub fn update(&mut self, speech_frame: bool) -> Option<SpeechEdge> {
        if speech_frame {
            self.hangover = self.hangover_frames;
            if !self.active {
                self.active = true;
                return Some(SpeechEdge::Start);
            }
            None
        } else if self.active {
            self.hangover = self.hangover.saturating_sub(1);
            if self.hangover == 0 {
                self.active = false;
                return Some(SpeechEdge::End);
            }
            None
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Force the gate closed and clear the counter.
    pub fn reset(&mut self) {
        self.active = false;
        self.hangover = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_on_first_speech_frame() {
        let mut gate = VadGate::new(12);
        assert_eq!(gate.update(true), Some(SpeechEdge::Start));
        assert!(gate.is_active());
        // Staying in speech produces no further edges.
        assert_eq!(gate.update(true), None);
    }

    #[test]
    fn closes_exactly_on_the_nth_silent_frame() {
        let hangover = 12u32;
        let mut gate = VadGate::new(hangover);
        gate.update(true);

        // One speech frame then N silent frames: the gate stays open for
        // the first N-1 and flips on the N-th (frame hangover+1 overall).
        for i in 1..hangover {
            assert_eq!(gate.update(false), None, "closed early at silent frame {i}");
            assert!(gate.is_active());
        }
        assert_eq!(gate.update(false), Some(SpeechEdge::End));
        assert!(!gate.is_active());
    }

    #[test]
    fn speech_mid_hangover_reloads_the_counter() {
        let mut gate = VadGate::new(3);
        gate.update(true);
        gate.update(false);
        gate.update(false);
        // Speech again: full hangover available once more.
        assert_eq!(gate.update(true), None);
        assert_eq!(gate.update(false), None);
        assert_eq!(gate.update(false), None);
        assert_eq!(gate.update(false), Some(SpeechEdge::End));
    }

    #[test]
    fn zero_hangover_closes_on_first_silent_frame() {
        let mut gate = VadGate::new(0);
        gate.update(true);
        assert_eq!(gate.update(false), Some(SpeechEdge::End));
    }

    #[test]
    fn reset_closes_without_an_edge() {
        let mut gate = VadGate::new(5);
        gate.update(true);
        gate.reset();
        assert!(!gate.is_active());
        assert_eq!(gate.update(false), None);
    }
}
