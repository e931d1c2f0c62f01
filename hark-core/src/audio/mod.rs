//! Audio capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not allocate after warm-up, block on a mutex, or perform I/O.
//! The callback therefore only downmixes into a pre-grown scratch buffer and
//! writes into the lock-free SPSC ring producer.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread;
//! the engine does both inside one `spawn_blocking` closure.

pub mod device;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::{
    buffering::AudioProducer,
    error::{HarkError, Result},
};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — bound to its creation thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

/// Downmix an interleaved block to mono f32 into `mono`, converting samples
/// with `to_f32`.
#[cfg(feature = "audio-cpal")]
fn downmix_into<T: Copy>(data: &[T], channels: usize, mono: &mut Vec<f32>, to_f32: impl Fn(T) -> f32) {
    let frames = data.len() / channels;
    mono.resize(frames, 0.0);
    if channels == 1 {
        for (dst, &src) in mono.iter_mut().zip(data) {
            *dst = to_f32(src);
        }
        return;
    }
    for (f, dst) in mono.iter_mut().enumerate() {
        let base = f * channels;
        let mut sum = 0f32;
        for c in 0..channels {
            sum += to_f32(data[base + c]);
        }
        *dst = sum / channels as f32;
    }
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    ///
    /// # Errors
    /// `HarkError::NoDefaultInputDevice` when no microphone is available,
    /// `HarkError::AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = device::select_input_device(&host, preferred_device_name)?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| HarkError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels: channels as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let callback_running = Arc::clone(&running);
        let mut mono: Vec<f32> = Vec::new();
        let err_fn = |err| error!("audio stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _info| {
                    if !callback_running.load(Ordering::Relaxed) {
                        return;
                    }
                    downmix_into(data, channels, &mut mono, |s| s);
                    let written = producer.push_slice(&mono);
                    if written < mono.len() {
                        warn!("ring buffer full: dropped {} samples", mono.len() - written);
                    }
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _info| {
                    if !callback_running.load(Ordering::Relaxed) {
                        return;
                    }
                    downmix_into(data, channels, &mut mono, |s| s as f32 / 32768.0);
                    let written = producer.push_slice(&mono);
                    if written < mono.len() {
                        warn!("ring buffer full: dropped {} samples", mono.len() - written);
                    }
                },
                err_fn,
                None,
            ),
            fmt => {
                return Err(HarkError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| HarkError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| HarkError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(HarkError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}
