//! Sliding mel-row window buffer.
//!
//! Mel rows arrive 5 per frame; embedding windows cover 76 rows and advance
//! by 8, so consecutive windows share 68 rows. The buffer is drained in a
//! loop as soon as a window is available, which bounds its length: after
//! draining it always holds fewer than 76 rows, so it can never reach
//! 76 + 5 rows once the next frame's rows are pushed and drained.

use std::collections::VecDeque;

use crate::{EMBEDDING_WINDOW_ROWS, EMBEDDING_WINDOW_STRIDE, MEL_BANDS};

/// One row of mel-band energies.
pub type MelRow = [f32; MEL_BANDS];

/// Append-at-tail, window-from-head buffer of mel rows.
#[derive(Debug, Default)]
pub struct MelWindowBuffer {
    rows: VecDeque<MelRow>,
}

impl MelWindowBuffer {
    pub fn new() -> Self {
        Self {
            rows: VecDeque::with_capacity(EMBEDDING_WINDOW_ROWS + crate::MEL_ROWS_PER_FRAME),
        }
    }

    /// Append rows at the tail.
    pub fn push_rows(&mut self, rows: impl IntoIterator<Item = MelRow>) {
        self.rows.extend(rows);
    }

    /// If at least one full window is buffered, flatten its 76 rows in
    /// temporal order and advance the head by the 8-row stride.
    pub fn next_window(&mut self) -> Option<Vec<f32>> {
        if self.rows.len() < EMBEDDING_WINDOW_ROWS {
            return None;
        }
        let mut window = Vec::with_capacity(EMBEDDING_WINDOW_ROWS * MEL_BANDS);
        for row in self.rows.iter().take(EMBEDDING_WINDOW_ROWS) {
            window.extend_from_slice(row);
        }
        self.rows.drain(..EMBEDDING_WINDOW_STRIDE);
        Some(window)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Clear all buffered rows.
    pub fn reset(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MEL_ROWS_PER_FRAME;

    fn row(value: f32) -> MelRow {
        [value; MEL_BANDS]
    }

    #[test]
    fn no_window_before_76_rows() {
        let mut buf = MelWindowBuffer::new();
        buf.push_rows((0..75).map(|i| row(i as f32)));
        assert!(buf.next_window().is_none());
        assert_eq!(buf.len(), 75);
    }

    #[test]
    fn window_covers_first_76_rows_and_advances_by_8() {
        let mut buf = MelWindowBuffer::new();
        buf.push_rows((0..80).map(|i| row(i as f32)));

        let first = buf.next_window().expect("window available at 80 rows");
        assert_eq!(first.len(), EMBEDDING_WINDOW_ROWS * MEL_BANDS);
        assert_eq!(first[0], 0.0);
        assert_eq!(first[75 * MEL_BANDS], 75.0);
        assert_eq!(buf.len(), 72);

        // Not enough rows for a second window yet.
        assert!(buf.next_window().is_none());

        // After 8 more rows the next window starts at row 8 — 68 rows of
        // overlap with the previous window.
        buf.push_rows((80..88).map(|i| row(i as f32)));
        let second = buf.next_window().expect("second window");
        assert_eq!(second[0], 8.0);
        assert_eq!(second[75 * MEL_BANDS], 83.0);
    }

    #[test]
    fn drain_loop_bounds_buffer_length() {
        let mut buf = MelWindowBuffer::new();
        // Feed many frames' worth of rows, draining after each frame the
        // way the cascade does.
        let mut next = 0usize;
        for _ in 0..200 {
            buf.push_rows((0..MEL_ROWS_PER_FRAME).map(|_| {
                next += 1;
                row(next as f32)
            }));
            while buf.next_window().is_some() {}
            assert!(
                buf.len() < EMBEDDING_WINDOW_ROWS + MEL_ROWS_PER_FRAME,
                "buffer grew to {} rows",
                buf.len()
            );
        }
    }

    #[test]
    fn reset_clears_rows() {
        let mut buf = MelWindowBuffer::new();
        buf.push_rows((0..80).map(|i| row(i as f32)));
        buf.reset();
        assert!(buf.is_empty());
        assert!(buf.next_window().is_none());
    }
}
