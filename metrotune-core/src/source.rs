//! # Sources
//!
//! The local engine and the remote device are alternate providers of the same
//! metronome and tuner capabilities. [`Source`] holds exactly one of them, so
//! both can never be active for the same concern at once.

use serde::{Deserialize, Serialize};

use crate::engine::{AudioEngine, MetronomeControl, TunerControl};
use crate::error::EngineResult;
use crate::link::RemoteLink;
use crate::metronome::Tempo;
use crate::{BeatCallback, PitchCallback};

/// Which kind of source is selected, for settings and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceKind {
    #[default]
    Local,
    Remote,
}

pub enum Source {
    Local(AudioEngine),
    Remote(RemoteLink),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Local(_) => SourceKind::Local,
            Source::Remote(_) => SourceKind::Remote,
        }
    }

    /// Stops everything the current source is running and releases it.
    pub fn shutdown(&mut self) {
        match self {
            Source::Local(engine) => engine.shutdown(),
            Source::Remote(link) => {
                if let Err(e) = link.stop_metronome().and_then(|_| link.stop_tuner()) {
                    log::debug!("[SOURCE] Remote stop failed during shutdown: {}", e);
                }
                link.close();
            }
        }
    }

    /// Replaces the current source, shutting the old one down first.
    pub fn switch_to(&mut self, next: Source) {
        log::info!("[SOURCE] Switching {:?} -> {:?}", self.kind(), next.kind());
        self.shutdown();
        *self = next;
    }
}

impl MetronomeControl for Source {
    fn start_metronome(&mut self, tempo: Tempo, on_beat: BeatCallback) -> EngineResult<()> {
        match self {
            Source::Local(engine) => engine.start_metronome(tempo, on_beat),
            Source::Remote(link) => link.start_metronome(tempo, on_beat),
        }
    }

    fn stop_metronome(&mut self) -> EngineResult<()> {
        match self {
            Source::Local(engine) => engine.stop_metronome(),
            Source::Remote(link) => link.stop_metronome(),
        }
    }

    fn update_tempo(&mut self, tempo: Tempo) -> EngineResult<()> {
        match self {
            Source::Local(engine) => engine.update_tempo(tempo),
            Source::Remote(link) => link.update_tempo(tempo),
        }
    }
}

impl TunerControl for Source {
    fn start_tuner(&mut self, on_pitch: PitchCallback) -> EngineResult<()> {
        match self {
            Source::Local(engine) => engine.start_tuner(on_pitch),
            Source::Remote(link) => link.start_tuner(on_pitch),
        }
    }

    fn stop_tuner(&mut self) -> EngineResult<()> {
        match self {
            Source::Local(engine) => engine.stop_tuner(),
            Source::Remote(link) => link.stop_tuner(),
        }
    }
}
