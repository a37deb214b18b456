// metrotune-core/src/lib.rs

//! The core logic for the metronome and chromatic tuner.
//! This crate is responsible for click scheduling, pitch detection,
//! note mapping, and the remote device link. It is completely headless
//! and contains no GUI code.

pub mod audio;
pub mod click;
pub mod config;
pub mod context;
pub mod detector;
pub mod engine;
pub mod error;
pub mod link;
pub mod metronome;
pub mod note;
pub mod pitch;
pub mod protocol;
pub mod source;
mod worker;

pub use config::{DetectorConfig, EngineConfig, MetronomeConfig};
pub use engine::{AudioEngine, MetronomeControl, TunerControl};
pub use error::{EngineError, EngineResult};
pub use link::RemoteLink;
pub use metronome::{BeatNumber, Tempo};
pub use note::NoteName;
pub use source::{Source, SourceKind};
pub use worker::LoopState;

/// Represents one reliable pitch reading from a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// The detected fundamental in Hz.
    pub frequency_hz: f32,
    /// The nearest equal-tempered pitch class.
    pub note: NoteName,
    /// Deviation from `note` in cents, within [-50, 50].
    pub cents: i32,
}

/// Listener for audible metronome beats, called on the scheduler thread.
pub type BeatCallback = Box<dyn FnMut(BeatNumber) + Send + 'static>;

/// Listener for pitch estimates, called on the detector or link thread.
pub type PitchCallback = Box<dyn FnMut(PitchEstimate) + Send + 'static>;
