//! Voice activity detection.
//!
//! [`NeuralVad`] wraps a Silero-style recurrent VAD model: one raw frame in,
//! a speech probability out, with paired hidden/cell state tensors threaded
//! through every call. The binary decision (probability > 0.5) feeds the
//! [`gate::VadGate`] hysteresis, which owns the `speech-start`/`speech-end`
//! edges.
//!
//! ## Model I/O
//!
//! | Name     | Shape        | DType | Direction |
//! |----------|--------------|-------|-----------|
//! | `input`  | `[1, frame]` | f32   | in        |
//! | `sr`     | `[1]`        | i64   | in        |
//! | `h`      | `[2, 1, 64]` | f32   | in        |
//! | `c`      | `[2, 1, 64]` | f32   | in        |
//! | `output` | `[1, 1]`     | f32   | out       |
//! | `hn`     | `[2, 1, 64]` | f32   | out       |
//! | `cn`     | `[2, 1, 64]` | f32   | out       |

pub mod gate;

use tracing::warn;

use crate::error::{HarkError, Result};
use crate::inference::{ModelHandle, Tensor, TensorMap};
use crate::VAD_STATE_DIM;

/// Fixed decision threshold on the VAD probability. Deliberately not
/// configurable, unlike the keyword detection threshold.
pub const SPEECH_PROB_THRESHOLD: f32 = 0.5;

/// Flat length of each recurrent state tensor: 2 × 1 × 64.
const STATE_LEN: usize = 2 * VAD_STATE_DIM;

/// Recurrent neural VAD with carried hidden/cell state.
pub struct NeuralVad {
    model: ModelHandle,
    input_name: String,
    sr_name: Option<String>,
    h_name: Option<String>,
    c_name: Option<String>,
    output_name: String,
    hn_name: Option<String>,
    cn_name: Option<String>,
    h: Vec<f32>,
    c: Vec<f32>,
    sample_rate: u32,
}

impl NeuralVad {
    pub fn new(model: ModelHandle, sample_rate: u32) -> Result<Self> {
        let input_names: Vec<String> = model.input_info().into_iter().map(|p| p.name).collect();
        let output_names: Vec<String> = model.output_info().into_iter().map(|p| p.name).collect();

        let input_name = resolve_name(&input_names, &["input", "audio", "x"])
            .or_else(|| input_names.first().cloned())
            .ok_or_else(|| HarkError::Session("VAD model has no inputs".into()))?;
        let sr_name = resolve_name(&input_names, &["sr", "sample_rate"]);
        let h_name = resolve_name(&input_names, &["h", "state_h"]);
        let c_name = resolve_name(&input_names, &["c", "state_c"]);

        let output_name = resolve_name(&output_names, &["output", "speech_prob", "prob"])
            .or_else(|| output_names.first().cloned())
            .ok_or_else(|| HarkError::Session("VAD model has no outputs".into()))?;
        let hn_name = resolve_name(&output_names, &["hn", "state_hn"]);
        let cn_name = resolve_name(&output_names, &["cn", "state_cn"]);

        Ok(Self {
            model,
            input_name,
            sr_name,
            h_name,
            c_name,
            output_name,
            hn_name,
            cn_name,
            h: vec![0.0; STATE_LEN],
            c: vec![0.0; STATE_LEN],
            sample_rate,
        })
    }

    /// Speech probability for one frame.
    ///
    /// Execution errors are logged and reported as 0.0 — a failing VAD
    /// silences the gate for that frame rather than aborting the pipeline.
    pub fn probability(&mut self, frame: &[f32]) -> f32 {
        match self.run_frame(frame) {
            Ok(prob) => prob,
            Err(e) => {
                warn!(error = %e, "VAD inference failed; treating frame as silence");
                0.0
            }
        }
    }

    fn run_frame(&mut self, frame: &[f32]) -> Result<f32> {
        let mut inputs = TensorMap::new();
        inputs.insert(
            self.input_name.clone(),
            Tensor::f32(vec![1, frame.len()], frame.to_vec()),
        );
        if let Some(sr_name) = &self.sr_name {
            inputs.insert(sr_name.clone(), Tensor::i64_scalar(self.sample_rate as i64));
        }
        if let Some(h_name) = &self.h_name {
            inputs.insert(
                h_name.clone(),
                Tensor::f32(vec![2, 1, VAD_STATE_DIM], self.h.clone()),
            );
        }
        if let Some(c_name) = &self.c_name {
            inputs.insert(
                c_name.clone(),
                Tensor::f32(vec![2, 1, VAD_STATE_DIM], self.c.clone()),
            );
        }

        let mut outputs = self.model.0.lock().run(inputs)?;

        // Carry the recurrent state into the next call.
        if let Some(hn) = self.hn_name.as_ref().and_then(|n| outputs.remove(n)) {
            if let Some(data) = hn.as_f32().filter(|d| d.len() == STATE_LEN) {
                self.h.copy_from_slice(data);
            }
        }
        if let Some(cn) = self.cn_name.as_ref().and_then(|n| outputs.remove(n)) {
            if let Some(data) = cn.as_f32().filter(|d| d.len() == STATE_LEN) {
                self.c.copy_from_slice(data);
            }
        }

        let prob = outputs
            .remove(&self.output_name)
            .or_else(|| outputs.into_values().next())
            .and_then(|t| t.as_f32().and_then(|d| d.first().copied()))
            .ok_or_else(|| HarkError::Inference("VAD produced no probability output".into()))?;
        Ok(prob)
    }

    /// Zero the hidden/cell state.
    pub fn reset(&mut self) {
        self.h.iter_mut().for_each(|v| *v = 0.0);
        self.c.iter_mut().for_each(|v| *v = 0.0);
    }
}

fn resolve_name(candidates: &[String], preferred: &[&str]) -> Option<String> {
    preferred.iter().find_map(|needle| {
        candidates
            .iter()
            .find(|name| name.eq_ignore_ascii_case(needle))
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::stub::ScriptedModel;
    use crate::inference::TensorInfo;

    /// A recurrent double: echoes an incrementing state and a scripted
    /// probability so state threading is observable.
    fn recurrent_stub(probs: Vec<f32>) -> ModelHandle {
        let mut step = 0usize;
        let model = ScriptedModel::new(
            vec![
                TensorInfo::new("input", vec![Some(1), None]),
                TensorInfo::new("sr", vec![Some(1)]),
                TensorInfo::new("h", vec![Some(2), Some(1), Some(64)]),
                TensorInfo::new("c", vec![Some(2), Some(1), Some(64)]),
            ],
            vec![
                TensorInfo::new("output", vec![Some(1), Some(1)]),
                TensorInfo::new("hn", vec![Some(2), Some(1), Some(64)]),
                TensorInfo::new("cn", vec![Some(2), Some(1), Some(64)]),
            ],
            move |inputs| {
                // The state passed in must be the state passed out last call.
                let h_in = inputs["h"].as_f32().unwrap();
                assert!(h_in.iter().all(|&v| v == step as f32));
                step += 1;
                let prob = probs.get(step - 1).copied().unwrap_or(0.0);
                let mut out = TensorMap::new();
                out.insert("output".into(), Tensor::f32(vec![1, 1], vec![prob]));
                out.insert(
                    "hn".into(),
                    Tensor::f32(vec![2, 1, 64], vec![step as f32; STATE_LEN]),
                );
                out.insert(
                    "cn".into(),
                    Tensor::f32(vec![2, 1, 64], vec![step as f32; STATE_LEN]),
                );
                Ok(out)
            },
        );
        ModelHandle::new(model)
    }

    #[test]
    fn threads_state_through_consecutive_calls() {
        let mut vad = NeuralVad::new(recurrent_stub(vec![0.9, 0.2, 0.7]), 16_000).unwrap();
        assert_eq!(vad.probability(&[0.0; 1280]), 0.9);
        assert_eq!(vad.probability(&[0.0; 1280]), 0.2);
        assert_eq!(vad.probability(&[0.0; 1280]), 0.7);
    }

    #[test]
    fn reset_zeroes_state() {
        let mut vad = NeuralVad::new(recurrent_stub(vec![0.9]), 16_000).unwrap();
        let _ = vad.probability(&[0.0; 1280]);
        assert!(vad.h.iter().any(|&v| v != 0.0));
        vad.reset();
        assert!(vad.h.iter().all(|&v| v == 0.0));
        assert!(vad.c.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn failing_model_reads_as_silence() {
        let handle = ModelHandle::new(ScriptedModel::failing("boom"));
        let mut vad = NeuralVad::new(handle, 16_000).unwrap();
        assert_eq!(vad.probability(&[0.0; 1280]), 0.0);
    }
}
