//! Engine configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::{FRAME_SIZE, SAMPLE_RATE};

/// Configuration for [`crate::HarkEngine`]. Immutable after construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Trigger phrases to load classifiers for. Every entry must have a
    /// matching entry in `model_files` or `load()` fails.
    pub keywords: Vec<String>,
    /// Keyword → model asset file name, resolved under `asset_dir`.
    pub model_files: HashMap<String, String>,
    /// Directory holding the shared frontend models
    /// (`melspectrogram.onnx`, `embedding_model.onnx`, `silero_vad.onnx`)
    /// and the per-keyword classifiers.
    pub asset_dir: PathBuf,
    /// Samples per processing frame. Default: 1280 (80 ms at 16 kHz).
    pub frame_size: usize,
    /// Working sample rate (Hz). Audio captured at other rates is resampled.
    /// Default: 16000.
    pub sample_rate: u32,
    /// How many non-speech frames keep the speech gate open after the last
    /// speech frame. Default: 12.
    pub vad_hangover_frames: u32,
    /// Keyword score threshold in [0, 1] above which a detection may fire.
    /// Default: 0.5.
    pub detection_threshold: f32,
    /// Engine-wide cooldown after a detection (ms). While it runs, no
    /// keyword can trigger again. Default: 2000.
    pub cooldown_ms: u64,
    /// Fallback classifier window size (embedding vectors) for models that
    /// do not declare a fixed input length. Default: 16.
    pub embedding_window_size: usize,
    /// Preferred execution providers for model sessions, in order
    /// (e.g. `["cpu"]`). Unknown entries are skipped with a warning.
    pub execution_providers: Vec<String>,
    /// Emit per-frame diagnostics (RMS, VAD confidence, keyword scores).
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["hey_jarvis".to_string()],
            model_files: default_model_files(),
            asset_dir: PathBuf::from("models"),
            frame_size: FRAME_SIZE,
            sample_rate: SAMPLE_RATE,
            vad_hangover_frames: 12,
            detection_threshold: 0.5,
            cooldown_ms: 2_000,
            embedding_window_size: 16,
            execution_providers: vec!["cpu".to_string()],
            debug: false,
        }
    }
}

/// Asset file names for the stock openWakeWord keyword models.
pub fn default_model_files() -> HashMap<String, String> {
    [
        ("alexa", "alexa_v0.1.onnx"),
        ("hey_mycroft", "hey_mycroft_v0.1.onnx"),
        ("hey_jarvis", "hey_jarvis_v0.1.onnx"),
        ("hey_rhasspy", "hey_rhasspy_v0.1.onnx"),
        ("timer", "timer_v0.1.onnx"),
        ("weather", "weather_v0.1.onnx"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keywords_have_model_files() {
        let cfg = EngineConfig::default();
        for kw in &cfg.keywords {
            assert!(cfg.model_files.contains_key(kw), "missing mapping for {kw}");
        }
    }
}
