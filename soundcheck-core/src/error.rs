use thiserror::Error;

/// All errors produced by soundcheck-core.
#[derive(Debug, Error)]
pub enum MeterError {
    /// The capture device could not be opened, configured or started.
    #[error("audio device error: {0}")]
    Device(String),

    #[error("no input device available")]
    NoInputDevice,

    #[error("device does not support {sample_rate} Hz input in any usable sample format")]
    UnsupportedConfig { sample_rate: u32 },

    /// A window could not satisfy the analysis preconditions. The analysis
    /// loop treats this as "skip this tick".
    #[error("insufficient data: {available} of {required} samples queued")]
    InsufficientData { available: usize, required: usize },

    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no recording session is active")]
    NotRecording,

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The analysis thread has exited and no longer answers commands.
    #[error("analysis thread is not running")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MeterError>;
