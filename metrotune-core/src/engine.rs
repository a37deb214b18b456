//! # Audio Engine
//!
//! Composition root of the local engine. Owns the shared audio context, the
//! metronome scheduler and the pitch detector, and exposes the start/stop
//! operations the application drives.
//!
//! ## Lifecycle
//! - The audio context opens lazily on the first metronome start
//! - It stays open across metronome stop/start cycles
//! - `shutdown` (or dropping the engine) stops both loops, then closes it
//!
//! The metronome and the detector touch disjoint state and may run at the
//! same time; stopping one never affects the other.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::config::{EngineConfig, MetronomeConfig};
use crate::context::{AudioContext, ClickOutput};
use crate::detector::{CpalFrameSource, FrameSource, PitchDetector};
use crate::error::EngineResult;
use crate::metronome::{Metronome, Tempo};
use crate::worker::LoopState;
use crate::{BeatCallback, PitchCallback};

/// Start/stop/update operations of a metronome, local or remote.
pub trait MetronomeControl {
    fn start_metronome(&mut self, tempo: Tempo, on_beat: BeatCallback) -> EngineResult<()>;
    fn stop_metronome(&mut self) -> EngineResult<()>;
    fn update_tempo(&mut self, tempo: Tempo) -> EngineResult<()>;
}

/// Start/stop operations of a tuner, local or remote.
pub trait TunerControl {
    fn start_tuner(&mut self, on_pitch: PitchCallback) -> EngineResult<()>;
    fn stop_tuner(&mut self) -> EngineResult<()>;
}

/// Provider of the hardware the engine runs on.
pub trait AudioBackend: Send + Sync {
    /// Opens the click output and its clock. Called at most once per engine
    /// lifetime, on first use.
    fn open_output(&self, config: &MetronomeConfig) -> EngineResult<Arc<dyn ClickOutput>>;

    /// Source of microphone frames for the detector.
    fn frame_source(&self) -> Arc<dyn FrameSource>;
}

/// Default speakers and microphone through CPAL.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open_output(&self, config: &MetronomeConfig) -> EngineResult<Arc<dyn ClickOutput>> {
        let context = AudioContext::open(config)?;
        log::info!("[ENGINE] Audio context open at {} Hz", context.sample_rate());
        Ok(Arc::new(context))
    }

    fn frame_source(&self) -> Arc<dyn FrameSource> {
        Arc::new(CpalFrameSource)
    }
}

pub struct AudioEngine {
    backend: Box<dyn AudioBackend>,
    metronome_config: MetronomeConfig,
    context: OnceCell<Arc<dyn ClickOutput>>,
    metronome: Metronome,
    detector: PitchDetector,
}

impl AudioEngine {
    /// Engine on the default CPAL devices. Touches no hardware until started.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backend(config, Box::new(CpalBackend))
    }

    pub fn with_backend(config: EngineConfig, backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            metronome: Metronome::new(config.metronome.clone()),
            metronome_config: config.metronome,
            context: OnceCell::new(),
            detector: PitchDetector::new(config.detector),
        }
    }

    /// Shared audio context, opened on first call.
    fn context(&self) -> EngineResult<Arc<dyn ClickOutput>> {
        self.context
            .get_or_try_init(|| {
                log::info!("[ENGINE] Opening audio context...");
                self.backend.open_output(&self.metronome_config)
            })
            .map(Arc::clone)
    }

    pub fn has_context(&self) -> bool {
        self.context.get().is_some()
    }

    pub fn tempo(&self) -> Tempo {
        self.metronome.tempo()
    }

    pub fn metronome_state(&self) -> LoopState {
        self.metronome.state()
    }

    pub fn tuner_state(&self) -> LoopState {
        self.detector.state()
    }

    /// Stops both loops and closes the audio context.
    pub fn shutdown(&mut self) {
        self.metronome.stop();
        self.detector.stop();
        if self.context.take().is_some() {
            log::info!("[ENGINE] Audio context released");
        }
    }
}

impl MetronomeControl for AudioEngine {
    fn start_metronome(&mut self, tempo: Tempo, on_beat: BeatCallback) -> EngineResult<()> {
        let output = self.context()?;
        self.metronome.start(output, tempo, on_beat)
    }

    fn stop_metronome(&mut self) -> EngineResult<()> {
        self.metronome.stop();
        Ok(())
    }

    fn update_tempo(&mut self, tempo: Tempo) -> EngineResult<()> {
        self.metronome.update_tempo(tempo);
        Ok(())
    }
}

impl TunerControl for AudioEngine {
    fn start_tuner(&mut self, on_pitch: PitchCallback) -> EngineResult<()> {
        let source = self.backend.frame_source();
        self.detector.start(source, on_pitch)
    }

    fn stop_tuner(&mut self) -> EngineResult<()> {
        self.detector.stop();
        Ok(())
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
