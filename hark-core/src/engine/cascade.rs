//! The per-frame processing cascade.
//!
//! One `Cascade` holds every piece of cross-frame state the detector needs:
//! the VAD's recurrent tensors, the speech gate, the mel window buffer, the
//! per-keyword embedding rings, and the arbiter's cooldown deadline. The
//! engine keeps it behind a single `Mutex` and feeds it frames from exactly
//! one place at a time, so frame *k+1* can never interleave its mutations
//! with frame *k*'s — the ordering guarantee everything else relies on.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::debug;

use crate::buffering::mel::MelWindowBuffer;
use crate::config::EngineConfig;
use crate::detect::{arbiter::DetectionArbiter, KeywordDetector};
use crate::engine::ModelBank;
use crate::error::{HarkError, Result};
use crate::features::{EmbeddingFrontend, MelFrontend};
use crate::vad::{
    gate::{SpeechEdge, VadGate},
    NeuralVad, SPEECH_PROB_THRESHOLD,
};

/// Whether a frame's score updates may produce detection events.
/// Offline evaluation replays frames with emission suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPolicy {
    Emit,
    Suppress,
}

/// A detection produced by the arbiter for one keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub keyword: String,
    pub score: f32,
}

/// Everything one frame produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Speech gate transition, if the gate flipped on this frame.
    pub speech_edge: Option<SpeechEdge>,
    /// Detections to emit, in keyword registration order.
    pub detections: Vec<Detection>,
    /// Highest keyword score observed across this frame's windows.
    pub peak_score: f32,
}

/// The full detection cascade for one engine instance.
pub struct Cascade {
    frame_size: usize,
    mel: MelFrontend,
    embedding: EmbeddingFrontend,
    vad: NeuralVad,
    gate: VadGate,
    mel_buffer: MelWindowBuffer,
    detectors: Vec<KeywordDetector>,
    arbiter: DetectionArbiter,
    active_keywords: Arc<RwLock<HashSet<String>>>,
    embedding_window_size: usize,
    debug: bool,
}

impl Cascade {
    /// Build the cascade from a model bank.
    ///
    /// Every configured keyword must be present in `bank.keywords`.
    /// Classifier window sizes are resolved here; the cascade-wide
    /// `embedding_window_size` becomes the maximum across keywords (so
    /// offline evaluation synthesizes enough input for the largest model).
    pub fn new(
        config: &EngineConfig,
        bank: &ModelBank,
        active_keywords: Arc<RwLock<HashSet<String>>>,
    ) -> Result<Self> {
        let mut detectors = Vec::with_capacity(config.keywords.len());
        let mut embedding_window_size = config.embedding_window_size;
        for keyword in &config.keywords {
            let classifier = bank
                .keywords
                .get(keyword)
                .cloned()
                .ok_or_else(|| HarkError::MissingKeywordModel {
                    keyword: keyword.clone(),
                })?;
            let detector =
                KeywordDetector::new(keyword.clone(), classifier, config.embedding_window_size)?;
            embedding_window_size = embedding_window_size.max(detector.window_size());
            debug!(
                keyword = %keyword,
                window_size = detector.window_size(),
                "keyword detector ready"
            );
            detectors.push(detector);
        }

        Ok(Self {
            frame_size: config.frame_size,
            mel: MelFrontend::new(bank.melspec.clone()),
            embedding: EmbeddingFrontend::new(bank.embedding.clone()),
            vad: NeuralVad::new(bank.vad.clone(), config.sample_rate)?,
            gate: VadGate::new(config.vad_hangover_frames),
            mel_buffer: MelWindowBuffer::new(),
            detectors,
            arbiter: DetectionArbiter::new(
                config.detection_threshold,
                std::time::Duration::from_millis(config.cooldown_ms),
            ),
            active_keywords,
            embedding_window_size,
            debug: config.debug,
        })
    }

    /// Process one frame through the identical path live capture and
    /// offline evaluation share.
    ///
    /// VAD failures degrade to silence inside [`NeuralVad::probability`];
    /// mel/embedding/classifier failures propagate to the caller, which
    /// surfaces them without halting the frame queue.
    pub fn process_frame(&mut self, frame: &[f32], policy: EventPolicy) -> Result<FrameReport> {
        if frame.len() != self.frame_size {
            return Err(HarkError::Inference(format!(
                "expected a {}-sample frame, got {}",
                self.frame_size,
                frame.len()
            )));
        }

        if self.debug {
            let (rms, peak) = level_of(frame);
            debug!(rms, peak, "frame received");
        }

        // 1. VAD + hysteresis. The gate must settle before any of this
        //    frame's windows reach arbitration.
        let prob = self.vad.probability(frame);
        let speech_edge = self.gate.update(prob > SPEECH_PROB_THRESHOLD);
        if self.debug {
            debug!(confidence = prob, "vad result");
        }

        // 2. Features. 5 mel rows per frame at the reference cadence.
        let rows = self.mel.extract(frame)?;
        self.mel_buffer.push_rows(rows);

        // 3. Drain every available window before the next frame arrives.
        let mut report = FrameReport {
            speech_edge,
            ..FrameReport::default()
        };
        while let Some(window) = self.mel_buffer.next_window() {
            let embedding = self.embedding.embed(&window)?;
            let speech_active = self.gate.is_active();
            let now = Instant::now();
            let active = self.active_keywords.read().clone();
            for detector in &mut self.detectors {
                let score = detector.observe(&embedding)?;
                report.peak_score = report.peak_score.max(score);
                if policy == EventPolicy::Suppress {
                    continue;
                }
                let keyword_active = active.contains(detector.keyword());
                if self
                    .arbiter
                    .consider(score, keyword_active, speech_active, now)
                {
                    report.detections.push(Detection {
                        keyword: detector.keyword().to_string(),
                        score,
                    });
                } else if self.debug && !keyword_active {
                    debug!(keyword = %detector.keyword(), score, "detection suppressed (inactive keyword)");
                }
            }
        }

        Ok(report)
    }

    /// Reset all per-run state: mel buffer, VAD tensors, speech gate,
    /// keyword rings, cooldown. Model weights are untouched.
    pub fn reset(&mut self) {
        self.mel_buffer.reset();
        self.vad.reset();
        self.gate.reset();
        for detector in &mut self.detectors {
            detector.reset();
        }
        self.arbiter.reset();
        debug!("cascade state reset");
    }

    /// Resolved engine-wide embedding window size (max across keywords).
    pub fn embedding_window_size(&self) -> usize {
        self.embedding_window_size
    }

    /// Latest score per keyword, in registration order.
    pub fn latest_scores(&self) -> Vec<(String, f32)> {
        self.detectors
            .iter()
            .map(|d| (d.keyword().to_string(), d.latest_score()))
            .collect()
    }
}

fn level_of(frame: &[f32]) -> (f32, f32) {
    let mut sum_sq = 0f32;
    let mut peak = 0f32;
    for &s in frame {
        sum_sq += s * s;
        peak = peak.max(s.abs());
    }
    ((sum_sq / frame.len().max(1) as f32).sqrt(), peak)
}
