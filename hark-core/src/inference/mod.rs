//! Model abstraction.
//!
//! Every model in the cascade — mel frontend, embedding extractor, VAD, and
//! each keyword classifier — is consumed through the same [`Model`] trait:
//! a named-tensor map in, a named-tensor map out. The engine never depends
//! on a concrete inference backend, so tests drive the full cascade with
//! scripted doubles (see [`stub`]).
//!
//! `&mut self` on `run` intentionally expresses that sessions are stateful
//! (arena allocators, IO bindings). All mutation is serialised through
//! [`ModelHandle`]'s `parking_lot::Mutex`.

pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{HarkError, Result};

/// Numeric payload of one tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

/// A dense tensor: shape plus row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl Tensor {
    pub fn f32(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            shape,
            data: TensorData::F32(data),
        }
    }

    /// A one-element i64 tensor (e.g. a sample-rate input).
    pub fn i64_scalar(value: i64) -> Self {
        Self {
            shape: vec![1],
            data: TensorData::I64(vec![value]),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            TensorData::I64(_) => None,
        }
    }

    pub fn element_count(&self) -> usize {
        match &self.data {
            TensorData::F32(v) => v.len(),
            TensorData::I64(v) => v.len(),
        }
    }
}

/// Named tensors passed into and out of a model call.
pub type TensorMap = HashMap<String, Tensor>;

/// Declared I/O port of a model. Dynamic dimensions are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
    pub name: String,
    pub shape: Vec<Option<usize>>,
}

impl TensorInfo {
    pub fn new(name: impl Into<String>, shape: Vec<Option<usize>>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Dimension `index` if declared and fixed.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.shape.get(index).copied().flatten()
    }
}

/// Contract for inference backends.
pub trait Model: Send + 'static {
    /// Execute the model on `inputs` and return all outputs by name.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the inputs or the session
    /// fails. Callers decide whether the failure is recoverable (see the
    /// VAD's fail-to-silence policy) or propagates out of the frame.
    fn run(&mut self, inputs: TensorMap) -> Result<TensorMap>;

    /// Declared input ports, in model order.
    fn inputs(&self) -> &[TensorInfo];

    /// Declared output ports, in model order.
    fn outputs(&self) -> &[TensorInfo];
}

/// Thread-safe reference-counted handle to any [`Model`] implementor.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn Model>>);

impl ModelHandle {
    /// Wrap any [`Model`] in a `ModelHandle`.
    pub fn new<M: Model>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }

    /// Snapshot of the declared input ports.
    pub fn input_info(&self) -> Vec<TensorInfo> {
        self.0.lock().inputs().to_vec()
    }

    /// Snapshot of the declared output ports.
    pub fn output_info(&self) -> Vec<TensorInfo> {
        self.0.lock().outputs().to_vec()
    }

    /// Run the model and return the output named `name`, or the sole output
    /// when the model has exactly one. Most cascade stages consume a single
    /// tensor; this keeps their call sites flat.
    pub fn run_for(&self, inputs: TensorMap, name: &str) -> Result<Tensor> {
        let mut model = self.0.lock();
        let mut outputs = model.run(inputs)?;
        if let Some(tensor) = outputs.remove(name) {
            return Ok(tensor);
        }
        if outputs.len() == 1 {
            if let Some(tensor) = outputs.into_values().next() {
                return Ok(tensor);
            }
        }
        Err(HarkError::Inference(format!(
            "model produced no output named \"{name}\""
        )))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_info_reports_fixed_dims_only() {
        let info = TensorInfo::new("input", vec![Some(1), None, Some(96)]);
        assert_eq!(info.dim(0), Some(1));
        assert_eq!(info.dim(1), None);
        assert_eq!(info.dim(2), Some(96));
        assert_eq!(info.dim(3), None);
    }

    #[test]
    fn run_for_falls_back_to_sole_output() {
        let model = stub::ScriptedModel::constant("probability", vec![1, 1], vec![0.4]);
        let handle = ModelHandle::new(model);
        let out = handle
            .run_for(TensorMap::new(), "something_else")
            .expect("single output should satisfy any requested name");
        assert_eq!(out.as_f32(), Some(&[0.4][..]));
    }
}
