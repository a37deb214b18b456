//! Engine error types

use thiserror::Error;

/// Errors surfaced by the engine and the remote link.
///
/// Quiet frames and frames without a confident lag are not errors; the
/// detector simply emits nothing for them.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Tempo outside the supported BPM range
    #[error("Invalid tempo: {0} BPM (supported range is 40-240)")]
    InvalidTempo(u32),

    /// No microphone or the host refused access to it
    #[error("No audio input device available")]
    NoInputDevice,

    /// No speaker output available for the click track
    #[error("No audio output device available")]
    NoOutputDevice,

    /// The device offers no stream format the engine can use
    #[error("Unsupported device configuration: {0}")]
    UnsupportedConfig(String),

    /// Failed to build, start or query an audio stream
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// Failed to spawn a loop thread
    #[error("Failed to start worker thread: {0}")]
    WorkerSpawn(String),

    /// Transport failure on the remote link
    #[error("Remote link error: {0}")]
    Link(#[from] std::io::Error),

    /// The remote device hung up
    #[error("Remote link is closed")]
    LinkClosed,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
