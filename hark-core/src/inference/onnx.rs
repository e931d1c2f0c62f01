//! ONNX Runtime backend via the `ort` crate.
//!
//! Wraps one `ort::session::Session` behind the [`Model`] trait. Sessions
//! are built single-threaded (intra/inter = 1): the cascade models are tiny
//! and latency-bound, and the pipeline is already one dedicated thread.
//!
//! Tensor shapes are bridged through `ndarray` by rank; the cascade only
//! uses ranks 1–4 ([1, samples], [2, 1, 64] VAD state, [1, 76, 32, 1] mel
//! windows, [1, n, 96] embedding windows).

use std::path::Path;

use ndarray::{Array1, Array2, Array3, Array4};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use tracing::{debug, info, warn};

use crate::error::{HarkError, Result};
use crate::inference::{Model, Tensor, TensorData, TensorInfo, TensorMap};

/// A single ONNX model session.
pub struct OnnxModel {
    session: Session,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl OnnxModel {
    /// Load a model from `path`.
    ///
    /// `execution_providers` lists preferred providers in order; only
    /// `"cpu"` is currently wired up, other entries are skipped with a
    /// warning so a config written for another host still loads.
    pub fn load(path: impl AsRef<Path>, execution_providers: &[String]) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HarkError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        for provider in execution_providers {
            if !provider.eq_ignore_ascii_case("cpu") {
                warn!(provider, "execution provider not available; skipping");
            }
        }

        let session = SessionBuilder::new()
            .map_err(|e| HarkError::Session(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::All)
            .map_err(|e| HarkError::Session(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| HarkError::Session(e.to_string()))?
            .with_inter_threads(1)
            .map_err(|e| HarkError::Session(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| HarkError::Session(e.to_string()))?;

        // ort reports symbolic/dynamic dims as non-positive values.
        let declared = |dims: Option<Vec<i64>>| -> Vec<Option<usize>> {
            dims.map(|dims| {
                dims.into_iter()
                    .map(|d| if d > 0 { Some(d as usize) } else { None })
                    .collect()
            })
            .unwrap_or_default()
        };
        let inputs: Vec<TensorInfo> = session
            .inputs()
            .iter()
            .map(|port| {
                let dims = port.dtype().tensor_shape().map(|s| s.iter().copied().collect());
                TensorInfo::new(port.name(), declared(dims))
            })
            .collect();
        let outputs: Vec<TensorInfo> = session
            .outputs()
            .iter()
            .map(|port| {
                let dims = port.dtype().tensor_shape().map(|s| s.iter().copied().collect());
                TensorInfo::new(port.name(), declared(dims))
            })
            .collect();

        info!(
            path = %path.display(),
            inputs = ?inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            outputs = ?outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            "model session ready"
        );

        Ok(Self {
            session,
            inputs,
            outputs,
        })
    }
}

fn push_input(
    values: &mut Vec<(String, SessionInputValue<'static>)>,
    name: String,
    tensor: Tensor,
) -> Result<()> {
    let shape = tensor.shape.clone();
    let shape_err = |e: ndarray::ShapeError| {
        HarkError::Inference(format!("tensor \"{name}\" shape {shape:?}: {e}"))
    };
    let ort_err = |e: ort::Error| HarkError::Inference(e.to_string());

    match tensor.data {
        TensorData::F32(data) => {
            let value = match tensor.shape.len() {
                1 => Value::from_array(
                    Array1::from_shape_vec(tensor.shape[0], data).map_err(shape_err)?,
                ),
                2 => Value::from_array(
                    Array2::from_shape_vec((tensor.shape[0], tensor.shape[1]), data)
                        .map_err(shape_err)?,
                ),
                3 => Value::from_array(
                    Array3::from_shape_vec(
                        (tensor.shape[0], tensor.shape[1], tensor.shape[2]),
                        data,
                    )
                    .map_err(shape_err)?,
                ),
                4 => Value::from_array(
                    Array4::from_shape_vec(
                        (
                            tensor.shape[0],
                            tensor.shape[1],
                            tensor.shape[2],
                            tensor.shape[3],
                        ),
                        data,
                    )
                    .map_err(shape_err)?,
                ),
                rank => {
                    return Err(HarkError::Inference(format!(
                        "unsupported f32 tensor rank {rank} for input \"{name}\""
                    )))
                }
            }
            .map_err(ort_err)?;
            values.push((name, value.into()));
        }
        TensorData::I64(data) => {
            if tensor.shape.len() != 1 {
                return Err(HarkError::Inference(format!(
                    "unsupported i64 tensor rank {} for input \"{name}\"",
                    tensor.shape.len()
                )));
            }
            let value = Value::from_array(Array1::from_shape_vec(tensor.shape[0], data).map_err(shape_err)?)
                .map_err(ort_err)?;
            values.push((name, value.into()));
        }
    }
    Ok(())
}

impl Model for OnnxModel {
    fn run(&mut self, inputs: TensorMap) -> Result<TensorMap> {
        let mut values: Vec<(String, SessionInputValue<'static>)> =
            Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            push_input(&mut values, name, tensor)?;
        }

        let outputs = self
            .session
            .run(values)
            .map_err(|e| HarkError::Inference(e.to_string()))?;

        let names: Vec<String> = outputs.keys().map(|n| n.to_string()).collect();
        let mut map = TensorMap::new();
        for name in names {
            let Some(value) = outputs.get(name.as_str()) else {
                continue;
            };
            match value.try_extract_tensor::<f32>() {
                Ok((shape, data)) => {
                    let shape = shape.iter().map(|&d| d.max(0) as usize).collect();
                    map.insert(name, Tensor::f32(shape, data.to_vec()));
                }
                Err(e) => {
                    // Non-f32 outputs are not part of the cascade contract.
                    debug!(output = %name, error = %e, "skipping non-f32 model output");
                }
            }
        }
        Ok(map)
    }

    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }
}
