//! Scripted model backend for tests and offline development.
//!
//! Mirrors the cascade's tensor contract without any real inference, so the
//! full engine — buffering, gating, arbitration, events — can be exercised
//! deterministically. Ships in the library (not behind `cfg(test)`) because
//! the integration tests and downstream consumers both use it.

use std::collections::VecDeque;

use crate::error::Result;
use crate::inference::{Model, Tensor, TensorInfo, TensorMap};

type ScriptFn = Box<dyn FnMut(&TensorMap) -> Result<TensorMap> + Send>;

/// A model whose outputs come from a caller-supplied closure.
pub struct ScriptedModel {
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    script: ScriptFn,
}

impl ScriptedModel {
    pub fn new(
        inputs: Vec<TensorInfo>,
        outputs: Vec<TensorInfo>,
        script: impl FnMut(&TensorMap) -> Result<TensorMap> + Send + 'static,
    ) -> Self {
        Self {
            inputs,
            outputs,
            script: Box::new(script),
        }
    }

    /// A model that always returns one fixed f32 output.
    pub fn constant(output_name: &str, shape: Vec<usize>, data: Vec<f32>) -> Self {
        let name = output_name.to_string();
        let tensor = Tensor::f32(shape.clone(), data);
        Self::new(
            vec![TensorInfo::new("input", vec![])],
            vec![TensorInfo::new(
                output_name,
                shape.iter().map(|&d| Some(d)).collect(),
            )],
            move |_inputs| {
                let mut out = TensorMap::new();
                out.insert(name.clone(), tensor.clone());
                Ok(out)
            },
        )
    }

    /// A model that replays `values` as `[1, 1]` scalars, one per call.
    /// After the script runs dry the final value repeats.
    pub fn scalar_sequence(output_name: &str, values: Vec<f32>) -> Self {
        let name = output_name.to_string();
        let mut queue: VecDeque<f32> = values.into_iter().collect();
        let mut last = queue.back().copied().unwrap_or(0.0);
        Self::new(
            vec![TensorInfo::new("input", vec![])],
            vec![TensorInfo::new(output_name, vec![Some(1), Some(1)])],
            move |_inputs| {
                let value = match queue.pop_front() {
                    Some(v) => {
                        last = v;
                        v
                    }
                    None => last,
                };
                let mut out = TensorMap::new();
                out.insert(name.clone(), Tensor::f32(vec![1, 1], vec![value]));
                Ok(out)
            },
        )
    }

    /// A model that fails every call with the given message.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::new(
            vec![TensorInfo::new("input", vec![])],
            vec![TensorInfo::new("output", vec![Some(1), Some(1)])],
            move |_inputs| Err(crate::error::HarkError::Inference(message.clone())),
        )
    }

    /// Override the declared input ports (e.g. to test classifier
    /// window-size resolution from the input shape).
    pub fn with_inputs(mut self, inputs: Vec<TensorInfo>) -> Self {
        self.inputs = inputs;
        self
    }
}

impl Model for ScriptedModel {
    fn run(&mut self, inputs: TensorMap) -> Result<TensorMap> {
        (self.script)(&inputs)
    }

    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sequence_replays_then_repeats_last() {
        let mut model = ScriptedModel::scalar_sequence("output", vec![0.1, 0.9]);
        let first = model.run(TensorMap::new()).unwrap();
        let second = model.run(TensorMap::new()).unwrap();
        let third = model.run(TensorMap::new()).unwrap();
        assert_eq!(first["output"].as_f32(), Some(&[0.1][..]));
        assert_eq!(second["output"].as_f32(), Some(&[0.9][..]));
        assert_eq!(third["output"].as_f32(), Some(&[0.9][..]));
    }

    #[test]
    fn with_inputs_overrides_declared_shape() {
        let model = ScriptedModel::scalar_sequence("output", vec![0.0])
            .with_inputs(vec![TensorInfo::new("x", vec![Some(1), Some(24), Some(96)])]);
        assert_eq!(model.inputs()[0].dim(1), Some(24));
    }
}
