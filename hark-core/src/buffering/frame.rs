//! Fixed-size frame assembly.
//!
//! Capture callbacks and the resampler hand over arbitrarily sized sample
//! runs; the cascade consumes exact `frame_size` frames in strict temporal
//! order. `FrameAssembler` bridges the two.

/// Accumulates samples and yields complete fixed-size frames.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Append samples in arrival order.
    pub fn push(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
    }

    /// Remove and return the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.frame_size {
            return None;
        }
        let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
        Some(frame)
    }

    /// Drop any partially accumulated samples.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_frames_in_order_across_partial_pushes() {
        let mut asm = FrameAssembler::new(4);
        asm.push(&[0.0, 1.0, 2.0]);
        assert!(asm.next_frame().is_none());
        asm.push(&[3.0, 4.0, 5.0, 6.0, 7.0]);

        assert_eq!(asm.next_frame(), Some(vec![0.0, 1.0, 2.0, 3.0]));
        assert_eq!(asm.next_frame(), Some(vec![4.0, 5.0, 6.0, 7.0]));
        assert!(asm.next_frame().is_none());
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut asm = FrameAssembler::new(4);
        asm.push(&[1.0, 2.0, 3.0]);
        asm.reset();
        asm.push(&[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(asm.next_frame(), Some(vec![4.0, 5.0, 6.0, 7.0]));
    }
}
