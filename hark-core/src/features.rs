//! Acoustic feature frontends: raw frame → mel rows → embedding vector.
//!
//! Both stages are pure functions of their input plus model weights; all
//! cross-frame state lives in [`crate::buffering::mel::MelWindowBuffer`].

use crate::buffering::mel::MelRow;
use crate::error::{HarkError, Result};
use crate::inference::{ModelHandle, Tensor, TensorMap};
use crate::{EMBEDDING_DIM, EMBEDDING_WINDOW_ROWS, MEL_BANDS};

/// Affine rescale applied to every mel value at extraction time, matching
/// the range the embedding model was trained on.
fn rescale(value: f32) -> f32 {
    value / 10.0 + 2.0
}

/// Runs the mel-spectrogram model on one raw frame.
pub struct MelFrontend {
    model: ModelHandle,
    input_name: String,
    output_name: String,
}

impl MelFrontend {
    pub fn new(model: ModelHandle) -> Self {
        let input_name = first_port_name(model.input_info(), "input");
        let output_name = first_port_name(model.output_info(), "output");
        Self {
            model,
            input_name,
            output_name,
        }
    }

    /// One frame of `frame_size` samples → a batch of 32-band mel rows
    /// (5 per frame at the reference cadence). Model failures propagate;
    /// they are not retried.
    pub fn extract(&self, frame: &[f32]) -> Result<Vec<MelRow>> {
        let mut inputs = TensorMap::new();
        inputs.insert(
            self.input_name.clone(),
            Tensor::f32(vec![1, frame.len()], frame.to_vec()),
        );
        let output = self.model.run_for(inputs, &self.output_name)?;
        let data = output
            .as_f32()
            .ok_or_else(|| HarkError::Inference("mel output is not f32".into()))?;
        if data.is_empty() || data.len() % MEL_BANDS != 0 {
            return Err(HarkError::Inference(format!(
                "mel output length {} is not a multiple of {MEL_BANDS}",
                data.len()
            )));
        }

        Ok(data
            .chunks_exact(MEL_BANDS)
            .map(|bands| {
                let mut row = [0f32; MEL_BANDS];
                for (dst, &src) in row.iter_mut().zip(bands) {
                    *dst = rescale(src);
                }
                row
            })
            .collect())
    }
}

/// Runs the embedding model on one flattened 76×32 mel window.
pub struct EmbeddingFrontend {
    model: ModelHandle,
    input_name: String,
    output_name: String,
}

impl EmbeddingFrontend {
    pub fn new(model: ModelHandle) -> Self {
        let input_name = first_port_name(model.input_info(), "input");
        let output_name = first_port_name(model.output_info(), "output");
        Self {
            model,
            input_name,
            output_name,
        }
    }

    /// One mel window (row-major, 76 × 32 values) → a 96-dim embedding.
    /// The window is presented as a single-channel image-like tensor.
    pub fn embed(&self, window: &[f32]) -> Result<Vec<f32>> {
        debug_assert_eq!(window.len(), EMBEDDING_WINDOW_ROWS * MEL_BANDS);
        let mut inputs = TensorMap::new();
        inputs.insert(
            self.input_name.clone(),
            Tensor::f32(
                vec![1, EMBEDDING_WINDOW_ROWS, MEL_BANDS, 1],
                window.to_vec(),
            ),
        );
        let output = self.model.run_for(inputs, &self.output_name)?;
        let data = output
            .as_f32()
            .ok_or_else(|| HarkError::Inference("embedding output is not f32".into()))?;
        if data.len() < EMBEDDING_DIM {
            return Err(HarkError::Inference(format!(
                "embedding output has {} values, expected {EMBEDDING_DIM}",
                data.len()
            )));
        }
        Ok(data[..EMBEDDING_DIM].to_vec())
    }
}

fn first_port_name(ports: Vec<crate::inference::TensorInfo>, fallback: &str) -> String {
    ports
        .into_iter()
        .next()
        .map(|p| p.name)
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stub::ScriptedModel;
    use crate::MEL_ROWS_PER_FRAME;

    #[test]
    fn mel_rows_are_rescaled_at_extraction() {
        let raw = vec![10.0f32; MEL_ROWS_PER_FRAME * MEL_BANDS];
        let model = ScriptedModel::constant(
            "melspectrogram",
            vec![1, MEL_ROWS_PER_FRAME, MEL_BANDS],
            raw,
        );
        let frontend = MelFrontend::new(ModelHandle::new(model));

        let rows = frontend.extract(&vec![0.0; 1280]).expect("extract");
        assert_eq!(rows.len(), MEL_ROWS_PER_FRAME);
        // 10 / 10 + 2 = 3
        assert!(rows.iter().all(|row| row.iter().all(|&v| v == 3.0)));
    }

    #[test]
    fn ragged_mel_output_is_an_error() {
        let model = ScriptedModel::constant("melspectrogram", vec![1, 33], vec![0.0; 33]);
        let frontend = MelFrontend::new(ModelHandle::new(model));
        assert!(frontend.extract(&vec![0.0; 1280]).is_err());
    }

    #[test]
    fn embedding_truncates_to_declared_dim() {
        let model = ScriptedModel::constant("embedding", vec![1, 96], (0..96).map(|i| i as f32).collect());
        let frontend = EmbeddingFrontend::new(ModelHandle::new(model));
        let out = frontend
            .embed(&vec![0.0; EMBEDDING_WINDOW_ROWS * MEL_BANDS])
            .expect("embed");
        assert_eq!(out.len(), EMBEDDING_DIM);
        assert_eq!(out[95], 95.0);
    }
}
