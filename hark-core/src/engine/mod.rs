//! `HarkEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! HarkEngine::new()            state = Unloaded
//!     └─► load()               models loaded, state = Ready, `ready` event
//!         └─► start()          capture open, pipeline spawned, state = Listening
//!             └─► stop()       running = false, stream dropped, state = Ready
//! ```
//!
//! `load()` and `stop()` are idempotent; `start()` while Listening is a
//! no-op. There is no terminal state — the engine may be stopped and
//! restarted indefinitely.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so `AudioCapture` is created
//! *inside* the `spawn_blocking` closure and never crosses a thread
//! boundary. A sync oneshot channel propagates open-device errors back to
//! the `start()` caller; on failure the engine stays Ready.

pub mod cascade;
pub mod pipeline;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    audio::{resample::RateConverter, AudioCapture},
    buffering::create_audio_ring,
    config::EngineConfig,
    engine::cascade::{Cascade, EventPolicy},
    error::{HarkError, Result},
    events::{EngineState, WakeEvent},
    inference::ModelHandle,
};

/// Broadcast channel capacity: events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// The models an engine runs on: the shared frontends plus one classifier
/// per keyword. Built from disk assets by `load()` (with the `onnx`
/// feature) or injected directly for tests and custom backends.
#[derive(Debug, Clone)]
pub struct ModelBank {
    pub melspec: ModelHandle,
    pub embedding: ModelHandle,
    pub vad: ModelHandle,
    pub keywords: HashMap<String, ModelHandle>,
}

/// Options for [`HarkEngine::start`].
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Preferred input device name; `None` uses the system default.
    pub preferred_device: Option<String>,
    /// Initial capture gain. Adjustable later via `set_gain`.
    pub gain: f32,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            preferred_device: None,
            gain: 1.0,
        }
    }
}

enum ModelSource {
    /// Load sessions from files under `config.asset_dir`.
    Assets,
    /// Use caller-provided models.
    Injected(ModelBank),
}

/// The top-level engine handle.
///
/// `HarkEngine` is `Send + Sync` — all fields use interior mutability.
/// Wrap in `Arc<HarkEngine>` to share between app state and
/// event-forwarding tasks.
pub struct HarkEngine {
    config: EngineConfig,
    source: ModelSource,
    state: Mutex<EngineState>,
    /// Set by `load()`; the single serialisation point for all per-frame
    /// state (live pipeline and offline evaluation both lock it).
    cascade: Mutex<Option<Arc<Mutex<Cascade>>>>,
    /// Runtime-adjustable subset of configured keywords that may trigger.
    active_keywords: Arc<RwLock<HashSet<String>>>,
    /// Capture gain as f32 bits.
    gain: Arc<AtomicU32>,
    /// `true` while capture + pipeline are active.
    running: Arc<AtomicBool>,
    events_tx: broadcast::Sender<WakeEvent>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl HarkEngine {
    /// Create an engine that loads its models from `config.asset_dir`.
    /// Does not touch the filesystem — call `load()`.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_source(config, ModelSource::Assets)
    }

    /// Create an engine over caller-provided models. `load()` still
    /// performs keyword validation, window-size resolution, and the
    /// `ready` event, but no file I/O.
    pub fn with_model_bank(config: EngineConfig, bank: ModelBank) -> Self {
        Self::with_source(config, ModelSource::Injected(bank))
    }

    fn with_source(config: EngineConfig, source: ModelSource) -> Self {
        let (events_tx, _) = broadcast::channel(BROADCAST_CAP);
        let active_keywords = config.keywords.iter().cloned().collect::<HashSet<_>>();
        Self {
            config,
            source,
            state: Mutex::new(EngineState::Unloaded),
            cascade: Mutex::new(None),
            active_keywords: Arc::new(RwLock::new(active_keywords)),
            gain: Arc::new(AtomicU32::new(1f32.to_bits())),
            running: Arc::new(AtomicBool::new(false)),
            events_tx,
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<WakeEvent> {
        self.events_tx.subscribe()
    }

    /// Current lifecycle state (snapshot).
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Load all models and build the cascade. Idempotent: a second call is
    /// a no-op.
    ///
    /// # Errors
    /// `HarkError::MissingKeywordModel` if a configured keyword has no
    /// model-file mapping — a fatal configuration error, surfaced before
    /// any model is touched. Model load failures propagate as-is.
    pub fn load(&self) -> Result<()> {
        let mut slot = self.cascade.lock();
        if slot.is_some() {
            debug!("load() called on a loaded engine — no-op");
            return Ok(());
        }

        for keyword in &self.config.keywords {
            if !self.config.model_files.contains_key(keyword) {
                return Err(HarkError::MissingKeywordModel {
                    keyword: keyword.clone(),
                });
            }
        }

        let bank = self.resolve_models()?;
        let cascade = Cascade::new(&self.config, &bank, Arc::clone(&self.active_keywords))?;
        info!(
            keywords = self.config.keywords.len(),
            embedding_window_size = cascade.embedding_window_size(),
            "engine loaded"
        );
        *slot = Some(Arc::new(Mutex::new(cascade)));
        *self.state.lock() = EngineState::Ready;
        let _ = self.events_tx.send(WakeEvent::Ready);
        Ok(())
    }

    #[cfg(feature = "onnx")]
    fn resolve_models(&self) -> Result<ModelBank> {
        match &self.source {
            ModelSource::Injected(bank) => Ok(bank.clone()),
            ModelSource::Assets => {
                let dir = &self.config.asset_dir;
                let eps = &self.config.execution_providers;
                let load = |file: &str| -> Result<ModelHandle> {
                    let model = crate::inference::OnnxModel::load(dir.join(file), eps)?;
                    Ok(ModelHandle::new(model))
                };
                let mut keywords = HashMap::new();
                for keyword in &self.config.keywords {
                    // Mapping presence was validated in load().
                    let Some(file) = self.config.model_files.get(keyword) else {
                        return Err(HarkError::MissingKeywordModel {
                            keyword: keyword.clone(),
                        });
                    };
                    keywords.insert(keyword.clone(), load(file)?);
                }
                Ok(ModelBank {
                    melspec: load("melspectrogram.onnx")?,
                    embedding: load("embedding_model.onnx")?,
                    vad: load("silero_vad.onnx")?,
                    keywords,
                })
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    fn resolve_models(&self) -> Result<ModelBank> {
        match &self.source {
            ModelSource::Injected(bank) => Ok(bank.clone()),
            ModelSource::Assets => Err(HarkError::Session(
                "compiled without onnx feature; inject a ModelBank".into(),
            )),
        }
    }

    /// Start audio capture and the live pipeline.
    ///
    /// Resets all per-run state (mel buffer, VAD tensors, keyword rings,
    /// cooldown), then blocks until the audio device is confirmed open (or
    /// fails). The pipeline continues on a background blocking thread.
    /// Calling `start()` while Listening is a no-op.
    ///
    /// # Errors
    /// `HarkError::NotLoaded` before `load()`. Device errors
    /// (`NoDefaultInputDevice`, `AudioDevice`, `AudioStream`) are surfaced
    /// synchronously and leave the engine Ready, not Listening.
    pub fn start(&self, options: StartOptions) -> Result<()> {
        let cascade = self
            .cascade
            .lock()
            .as_ref()
            .cloned()
            .ok_or(HarkError::NotLoaded)?;

        if self.running.swap(true, Ordering::SeqCst) {
            debug!("start() called while listening — no-op");
            return Ok(());
        }

        self.diagnostics.reset();
        cascade.lock().reset();
        self.gain.store(options.gain.to_bits(), Ordering::Relaxed);

        let (producer, consumer) = create_audio_ring();

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let events_tx = self.events_tx.clone();
        let gain = Arc::clone(&self.gain);
        let diagnostics = Arc::clone(&self.diagnostics);
        let preferred_device = options.preferred_device.clone();

        // Sync oneshot: the pipeline thread signals open success/failure.
        // Carries the actual capture sample rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // Audio device must open on THIS thread — cpal::Stream is !Send.
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                preferred_device.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };
            let capture_sample_rate = capture.sample_rate;

            pipeline::run(pipeline::PipelineContext {
                config,
                cascade,
                consumer,
                running,
                events_tx,
                gain,
                capture_sample_rate,
                diagnostics,
            });

            // Stream drops here, releasing the audio device on this thread —
            // on every exit path, including frame errors.
            drop(capture);
        });

        match open_rx.recv() {
            Ok(Ok(_rate)) => {
                *self.state.lock() = EngineState::Listening;
                info!("engine started — listening");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message arrived — the blocking
                // task died before opening the device.
                self.running.store(false, Ordering::SeqCst);
                Err(HarkError::Other(anyhow::anyhow!(
                    "pipeline task died unexpectedly"
                )))
            }
        }
    }

    /// Stop audio capture and the pipeline. Idempotent and safe to call
    /// from any state, including after an error; model weights persist
    /// until the engine itself is dropped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut state = self.state.lock();
        if *state == EngineState::Listening {
            *state = EngineState::Ready;
            info!("engine stop requested");
        }
    }

    /// Adjust the capture gain. Safe to call while a frame is in flight.
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
        debug!(gain, "capture gain updated");
    }

    /// Replace the set of keywords eligible to trigger. An empty slice
    /// restores all configured keywords. Takes effect from the next
    /// arbitration; an in-flight window may still be scored under the old
    /// set. No model reload occurs.
    pub fn set_active_keywords(&self, keywords: &[String]) {
        let next: HashSet<String> = if keywords.is_empty() {
            self.config.keywords.iter().cloned().collect()
        } else {
            keywords.iter().cloned().collect()
        };
        debug!(active = ?next, "active keywords updated");
        *self.active_keywords.write() = next;
    }

    /// One-shot offline evaluation: replay `samples` (mono f32 at the
    /// configured sample rate) through the identical per-frame path with
    /// event emission suppressed, and return the highest score observed
    /// across all keywords and frames.
    ///
    /// Input shorter than `embedding_window_size × frame_size` samples is
    /// zero-padded with trailing silence. Resets per-run state first;
    /// independent of the live lifecycle.
    pub fn evaluate(&self, samples: &[f32]) -> Result<f32> {
        let cascade = self
            .cascade
            .lock()
            .as_ref()
            .cloned()
            .ok_or(HarkError::NotLoaded)?;
        let mut cascade = cascade.lock();
        cascade.reset();

        let frame_size = self.config.frame_size;
        let min_samples = cascade.embedding_window_size() * frame_size;
        let mut padded = samples.to_vec();
        if padded.len() < min_samples {
            padded.resize(min_samples, 0.0);
        }

        let mut peak = 0f32;
        for frame in padded.chunks_exact(frame_size) {
            let report = cascade.process_frame(frame, EventPolicy::Suppress)?;
            peak = peak.max(report.peak_score);
        }
        Ok(peak)
    }

    /// Read a WAV clip, downmix to mono, resample to the working rate, and
    /// run [`Self::evaluate`] on it.
    pub fn evaluate_wav(&self, path: &Path) -> Result<f32> {
        let samples = read_wav_mono(path, self.config.sample_rate)?;
        self.evaluate(&samples)
    }

    /// Snapshot of the live pipeline counters.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Resolved embedding window size: the max across loaded keyword
    /// models, or the configured default before `load()`.
    pub fn embedding_window_size(&self) -> usize {
        self.cascade
            .lock()
            .as_ref()
            .map(|c| c.lock().embedding_window_size())
            .unwrap_or(self.config.embedding_window_size)
    }
}

/// Decode a WAV file to mono f32 at `target_rate`.
fn read_wav_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| HarkError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| HarkError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| HarkError::Decode(e.to_string()))?
        }
    };

    let mut mono = Vec::with_capacity(interleaved.len() / channels);
    for frame in interleaved.chunks_exact(channels) {
        mono.push(frame.iter().sum::<f32>() / channels as f32);
    }

    if spec.sample_rate == target_rate {
        return Ok(mono);
    }

    let mut converter = RateConverter::new(spec.sample_rate, target_rate, 960)?;
    let mut out = converter.process(&mono);
    // Flush the converter's final partial block with silence.
    out.extend(converter.process(&vec![0.0; 960]));
    Ok(out)
}
