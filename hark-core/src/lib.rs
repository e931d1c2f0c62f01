//! # hark-core
//!
//! Streaming wake-word detection engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → Pipeline(spawn_blocking)
//!                                                     │
//!                                      per 1280-sample frame:
//!                                      VAD (recurrent) → speech gate
//!                                      mel frontend → MelWindowBuffer
//!                                      embedding → KeywordDetector ring(s)
//!                                      DetectionArbiter
//!                                                     │
//!                                       broadcast::Sender<WakeEvent>
//! ```
//!
//! The audio callback is zero-alloc. All model execution and heap work
//! happens on the pipeline thread, so frame *k+1* never begins its state
//! mutations before frame *k* has fully completed.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod events;
pub mod features;
pub mod inference;
pub mod vad;

// Critical cascade constants — must match the openWakeWord model family.
pub const SAMPLE_RATE: u32 = 16_000;
pub const FRAME_SIZE: usize = 1280; // 80 ms at 16 kHz
pub const MEL_BANDS: usize = 32;
pub const MEL_ROWS_PER_FRAME: usize = 5;
pub const EMBEDDING_WINDOW_ROWS: usize = 76;
pub const EMBEDDING_WINDOW_STRIDE: usize = 8;
pub const EMBEDDING_DIM: usize = 96;
pub const SCORE_HISTORY: usize = 50;
pub const VAD_STATE_DIM: usize = 64;

// Convenience re-exports for downstream crates
pub use config::{default_model_files, EngineConfig};
pub use engine::{HarkEngine, ModelBank, StartOptions};
pub use error::HarkError;
pub use events::{EngineState, WakeEvent};
pub use inference::{Model, ModelHandle, Tensor, TensorData, TensorInfo, TensorMap};

#[cfg(feature = "onnx")]
pub use inference::OnnxModel;
