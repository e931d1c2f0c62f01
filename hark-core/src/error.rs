use thiserror::Error;

/// All errors produced by hark-core.
#[derive(Debug, Error)]
pub enum HarkError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("audio decode error: {0}")]
    Decode(String),

    #[error("no model file configured for keyword \"{keyword}\"")]
    MissingKeywordModel { keyword: String },

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("model session error: {0}")]
    Session(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("engine is not loaded — call load() first")]
    NotLoaded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HarkError>;
