//! Lock-free SPSC ring buffer for audio samples, plus the fixed-cadence
//! buffers the cascade is built on.
//!
//! The ring uses `ringbuf::HeapRb<f32>`, whose wait-free `push_slice` is
//! safe to call from the real-time audio callback.

pub mod frame;
pub mod mel;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Type alias for the producer half — held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half — held by the pipeline thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^20 = 1 048 576 f32 samples ≈ 21.8 s at 48 kHz.
/// Far more than the pipeline ever falls behind by; protects against
/// callback drops while a burst of model calls completes.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
