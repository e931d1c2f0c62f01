//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! cpal captures at the device's native rate (commonly 44.1 or 48 kHz); the
//! cascade models expect 16 kHz mono f32. `RateConverter` bridges that gap
//! on the pipeline thread, where allocation is allowed. When the rates
//! already match it is a passthrough and no rubato session exists at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{HarkError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when input rate == output rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input between calls; rubato consumes fixed blocks.
    input_buf: Vec<f32>,
    /// Input samples rubato expects per process call.
    block_size: usize,
    /// Pre-allocated rubato output: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `HarkError::AudioStream` if rubato fails to initialise.
    pub fn new(input_rate: u32, output_rate: u32, block_size: usize) -> Result<Self> {
        if input_rate == output_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                block_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio
            PolynomialDegree::Cubic,
            block_size,
            1, // mono
        )
        .map_err(|e| HarkError::AudioStream(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        tracing::info!(input_rate, output_rate, block_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            block_size,
            output_buf: vec![vec![0f32; max_out]],
        })
    }

    /// Process incoming samples, returning converted output (may be empty
    /// while a partial block accumulates). Passthrough mode copies input
    /// straight through.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= self.block_size {
            let block = &self.input_buf[..self.block_size];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("resampler process error: {e}"),
            }
            self.input_buf.drain(..self.block_size);
        }
        result
    }

    /// `true` when no rate conversion occurs.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(16_000, 16_000, 960).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
    }

    #[test]
    fn converts_48k_to_16k_with_expected_length() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(!rc.is_passthrough());
        // 960 samples at 48 kHz → ~320 at 16 kHz
        let out = rc.process(&vec![0.0f32; 960]);
        assert!(!out.is_empty());
        assert!(
            (out.len() as isize - 320).unsigned_abs() <= 10,
            "output len={}",
            out.len()
        );
    }

    #[test]
    fn partial_block_accumulates_across_calls() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(rc.process(&vec![0.0f32; 500]).is_empty());
        // 500 + 500 ≥ 960 → second call produces output
        assert!(!rc.process(&vec![0.0f32; 500]).is_empty());
    }
}
