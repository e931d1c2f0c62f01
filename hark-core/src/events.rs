//! Events emitted by the engine to collaborators.
//!
//! Consumers (a page UI, a WebSocket relay to the home-automation backend)
//! subscribe via `HarkEngine::subscribe()` and receive these as a tagged
//! enum; the serialized form uses the kebab-case tags `ready`,
//! `speech-start`, `speech-end`, `detect`, `error`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One outbound engine event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WakeEvent {
    /// All models loaded; the engine is ready to start.
    Ready,
    /// The speech gate flipped inactive → active.
    SpeechStart,
    /// The speech gate flipped active → inactive (hangover exhausted).
    SpeechEnd,
    /// A keyword crossed the detection threshold with all gates open.
    Detect {
        keyword: String,
        score: f32,
        /// Milliseconds since the Unix epoch at emission time.
        timestamp: u64,
    },
    /// A frame failed inside the processing cascade. The pipeline keeps
    /// running; subsequent frames are unaffected.
    Error { message: String },
}

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Constructed, models not loaded.
    Unloaded,
    /// Models loaded; capture not running.
    Ready,
    /// Actively capturing audio and scoring keywords.
    Listening,
}

/// Wall-clock timestamp for detection events.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_event_serializes_with_kebab_case_tag() {
        let event = WakeEvent::Detect {
            keyword: "hey_jarvis".into(),
            score: 0.91,
            timestamp: 1234,
        };

        let json = serde_json::to_value(&event).expect("serialize detect event");
        assert_eq!(json["type"], "detect");
        assert_eq!(json["keyword"], "hey_jarvis");
        let score = json["score"].as_f64().expect("score should be a number");
        assert!((score - 0.91).abs() < 1e-5);
        assert_eq!(json["timestamp"], 1234);

        let round_trip: WakeEvent = serde_json::from_value(json).expect("deserialize detect event");
        assert_eq!(round_trip, event);
    }

    #[test]
    fn speech_edges_serialize_as_hyphenated_tags() {
        let start = serde_json::to_value(&WakeEvent::SpeechStart).unwrap();
        let end = serde_json::to_value(&WakeEvent::SpeechEnd).unwrap();
        assert_eq!(start["type"], "speech-start");
        assert_eq!(end["type"], "speech-end");
    }

    #[test]
    fn engine_state_serializes_lowercase() {
        let json = serde_json::to_value(EngineState::Listening).unwrap();
        assert_eq!(json, "listening");
    }
}
