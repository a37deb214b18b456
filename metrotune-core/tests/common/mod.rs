//! Test doubles for the engine: a wall-clock audio output that records clicks
//! and frame sources that feed synthetic audio.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use metrotune_core::click::ClickKind;
use metrotune_core::config::{DetectorConfig, MetronomeConfig};
use metrotune_core::context::ClickOutput;
use metrotune_core::detector::{FrameSource, OpenInput};
use metrotune_core::engine::AudioBackend;
use metrotune_core::{EngineError, EngineResult};

pub const SAMPLE_RATE: u32 = 44100;

/// Audio clock backed by `Instant`, recording every scheduled click.
pub struct RecordingOutput {
    started: Instant,
    pub clicks: Mutex<Vec<(f64, ClickKind)>>,
    pub cancellations: AtomicUsize,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            clicks: Mutex::new(Vec::new()),
            cancellations: AtomicUsize::new(0),
        }
    }

    pub fn clicks(&self) -> Vec<(f64, ClickKind)> {
        self.clicks.lock().unwrap().clone()
    }
}

impl ClickOutput for RecordingOutput {
    fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn schedule_click(&self, time: f64, kind: ClickKind) {
        self.clicks.lock().unwrap().push((time, kind));
    }

    fn cancel_pending(&self) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Plays a fixed list of frames, then idles until the detector lets go.
pub struct SyntheticSource {
    frames: Vec<Vec<f32>>,
    pub opened: AtomicUsize,
    pub released: Arc<AtomicBool>,
}

impl SyntheticSource {
    pub fn new(frames: Vec<Vec<f32>>) -> Self {
        Self {
            frames,
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FrameSource for SyntheticSource {
    fn open(&self, _config: &DetectorConfig, frames: Sender<Vec<f32>>) -> EngineResult<OpenInput> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);
        let to_send = self.frames.clone();
        thread::spawn(move || {
            for frame in to_send {
                if frames.send(frame).is_err() {
                    return;
                }
                thread::sleep(Duration::from_millis(2));
            }
            // Keep the queue open so the detector only stops when asked.
            while frames.send(Vec::new()).is_ok() {
                thread::sleep(Duration::from_millis(20));
            }
        });
        let released = Arc::clone(&self.released);
        Ok(OpenInput::new(SAMPLE_RATE, move || {
            released.store(true, Ordering::SeqCst);
        }))
    }
}

/// Input that is never available, like a denied microphone permission.
pub struct MissingInput;

impl FrameSource for MissingInput {
    fn open(&self, _config: &DetectorConfig, _frames: Sender<Vec<f32>>) -> EngineResult<OpenInput> {
        Err(EngineError::NoInputDevice)
    }
}

pub struct FakeBackend {
    pub output: Arc<RecordingOutput>,
    pub source: Arc<dyn FrameSource>,
    pub outputs_opened: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            output: Arc::new(RecordingOutput::new()),
            source,
            outputs_opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl AudioBackend for FakeBackend {
    fn open_output(&self, _config: &MetronomeConfig) -> EngineResult<Arc<dyn ClickOutput>> {
        self.outputs_opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }

    fn frame_source(&self) -> Arc<dyn FrameSource> {
        Arc::clone(&self.source)
    }
}

pub fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
        })
        .collect()
}
