//! Blocking pipeline loop for live capture.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → scratch chunk at the capture sample rate
//! 2. Apply capture gain
//! 3. Resample to the working rate
//! 4. Assemble fixed 1280-sample frames
//! 5. Cascade::process_frame per frame (strictly in order)
//! 6. Broadcast speech edges / detections / frame errors as WakeEvents
//! ```
//!
//! The loop runs inside `spawn_blocking`; frames are processed one at a
//! time off a single consumer, which is what makes the cascade's shared
//! state safe without further locking discipline.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    audio::resample::RateConverter,
    buffering::{frame::FrameAssembler, AudioConsumer, Consumer},
    config::EngineConfig,
    engine::cascade::{Cascade, EventPolicy, FrameReport},
    events::{epoch_millis, WakeEvent},
    vad::gate::SpeechEdge,
};

/// Counters for observability. Shared with the engine handle; reset on
/// every `start()`.
#[derive(Default)]
pub struct PipelineDiagnostics {
    pub samples_in: AtomicUsize,
    pub frames_processed: AtomicUsize,
    pub frame_errors: AtomicUsize,
    pub speech_segments: AtomicUsize,
    pub detections_emitted: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.samples_in.store(0, Ordering::Relaxed);
        self.frames_processed.store(0, Ordering::Relaxed);
        self.frame_errors.store(0, Ordering::Relaxed);
        self.speech_segments.store(0, Ordering::Relaxed);
        self.detections_emitted.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            samples_in: self.samples_in.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            speech_segments: self.speech_segments.load(Ordering::Relaxed),
            detections_emitted: self.detections_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub samples_in: usize,
    pub frames_processed: usize,
    pub frame_errors: usize,
    pub speech_segments: usize,
    pub detections_emitted: usize,
}

/// All context the pipeline needs, passed as one struct so the
/// spawn_blocking closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub cascade: Arc<Mutex<Cascade>>,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub events_tx: broadcast::Sender<WakeEvent>,
    /// Capture gain as f32 bits; adjustable live via `set_gain`.
    pub gain: Arc<AtomicU32>,
    pub capture_sample_rate: u32,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Chunk size drained from the ring buffer per iteration (20 ms at 48 kHz).
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// Run the blocking pipeline until `ctx.running` becomes false.
pub fn run(mut ctx: PipelineContext) {
    info!("pipeline started");

    let mut resampler = match RateConverter::new(
        ctx.capture_sample_rate,
        ctx.config.sample_rate,
        DRAIN_CHUNK,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create resampler: {e}");
            let _ = ctx.events_tx.send(WakeEvent::Error {
                message: e.to_string(),
            });
            return;
        }
    };

    // Scratch buffer reused each iteration.
    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut assembler = FrameAssembler::new(ctx.config.frame_size);

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(std::time::Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }
        ctx.diagnostics.samples_in.fetch_add(n, Ordering::Relaxed);

        let gain = f32::from_bits(ctx.gain.load(Ordering::Relaxed));
        let mut chunk = resampler.process(&raw[..n]);
        if chunk.is_empty() {
            // Partial chunk — the resampler is waiting for a full block.
            continue;
        }
        if (gain - 1.0).abs() > f32::EPSILON {
            apply_gain(&mut chunk, gain);
        }

        assembler.push(&chunk);
        while let Some(frame) = assembler.next_frame() {
            // Chunk k+1 cannot enter the cascade until chunk k's mutations
            // are complete: one consumer, one lock, one frame at a time.
            let outcome = ctx.cascade.lock().process_frame(&frame, EventPolicy::Emit);
            ctx.diagnostics
                .frames_processed
                .fetch_add(1, Ordering::Relaxed);
            match outcome {
                Ok(report) => {
                    // Periodic cadence log for diagnostics.
                    let frames = ctx.diagnostics.frames_processed.load(Ordering::Relaxed);
                    if frames % 50 == 0 {
                        debug!(frames, peak_score = report.peak_score, "frame cadence check");
                    }
                    emit_report(&ctx, report);
                }
                Err(e) => {
                    ctx.diagnostics.frame_errors.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "frame processing failed");
                    let _ = ctx.events_tx.send(WakeEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        samples_in = snap.samples_in,
        frames_processed = snap.frames_processed,
        frame_errors = snap.frame_errors,
        speech_segments = snap.speech_segments,
        detections_emitted = snap.detections_emitted,
        "pipeline stopped — diagnostics"
    );
}

fn emit_report(ctx: &PipelineContext, report: FrameReport) {
    match report.speech_edge {
        Some(SpeechEdge::Start) => {
            ctx.diagnostics
                .speech_segments
                .fetch_add(1, Ordering::Relaxed);
            debug!("speech started");
            let _ = ctx.events_tx.send(WakeEvent::SpeechStart);
        }
        Some(SpeechEdge::End) => {
            debug!("speech ended");
            let _ = ctx.events_tx.send(WakeEvent::SpeechEnd);
        }
        None => {}
    }

    for detection in report.detections {
        ctx.diagnostics
            .detections_emitted
            .fetch_add(1, Ordering::Relaxed);
        info!(keyword = %detection.keyword, score = detection.score, "wake word detected");
        let _ = ctx.events_tx.send(WakeEvent::Detect {
            keyword: detection.keyword,
            score: detection.score,
            timestamp: epoch_millis(),
        });
    }
}

fn apply_gain(samples: &mut [f32], gain: f32) {
    for sample in samples.iter_mut() {
        *sample = (*sample * gain).clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_scales_and_clamps() {
        let mut samples = vec![0.25, -0.25, 0.9];
        apply_gain(&mut samples, 2.0);
        assert_eq!(samples, vec![0.5, -0.5, 1.0]);
    }
}
