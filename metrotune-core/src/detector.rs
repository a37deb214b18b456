//! # Pitch Detector Loop
//!
//! Continuous sampling from an input source, one pitch estimate per frame.
//!
//! ## Architecture
//! - **Input**: a [`FrameSource`] pushes fixed-size frames into a bounded queue
//! - **Detector thread**: pulls frames in order, runs [`estimate_pitch`], and
//!   hands reliable estimates to the registered callback
//! - **Shutdown**: the input stream is released on the detector thread when
//!   the loop exits

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender};

use crate::audio;
use crate::config::DetectorConfig;
use crate::error::{EngineError, EngineResult};
use crate::pitch::estimate_pitch;
use crate::worker::{LoopState, LoopWorker};
use crate::PitchCallback;

/// Frames buffered between the input callback and the analysis loop.
const FRAME_QUEUE_DEPTH: usize = 4;

/// An opened input: its sample rate and how to release it.
pub struct OpenInput {
    pub sample_rate: u32,
    release: Box<dyn FnOnce()>,
}

impl OpenInput {
    pub fn new(sample_rate: u32, release: impl FnOnce() + 'static) -> Self {
        Self {
            sample_rate,
            release: Box::new(release),
        }
    }

    /// Stops the underlying stream.
    pub fn release(self) {
        (self.release)();
    }
}

/// Anything that can deliver fixed-size sample frames.
///
/// `open` is called on the detector thread, and the returned [`OpenInput`] is
/// released on that same thread.
pub trait FrameSource: Send + Sync {
    fn open(&self, config: &DetectorConfig, frames: Sender<Vec<f32>>) -> EngineResult<OpenInput>;
}

/// Default microphone through CPAL.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalFrameSource;

impl FrameSource for CpalFrameSource {
    fn open(&self, config: &DetectorConfig, frames: Sender<Vec<f32>>) -> EngineResult<OpenInput> {
        let (stream, sample_rate) =
            audio::start_audio_capture(config.frame_size, config.preferred_sample_rate, frames)?;
        Ok(OpenInput::new(sample_rate, move || {
            // Properly stop the stream before dropping it
            if let Err(e) = stream.pause() {
                log::warn!("[TUNER] Error pausing input stream: {}", e);
            }
            drop(stream);
        }))
    }
}

/// Start/stop control of the detection loop.
#[derive(Debug)]
pub struct PitchDetector {
    config: DetectorConfig,
    worker: Option<LoopWorker>,
}

impl PitchDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config, worker: None }
    }

    /// Opens `source` and starts analysing. Fails, without retrying, if the
    /// input cannot be acquired. A running loop is stopped first.
    pub fn start(&mut self, source: Arc<dyn FrameSource>, on_pitch: PitchCallback) -> EngineResult<()> {
        if self.worker.is_some() {
            log::info!("[TUNER] Restarting running detector");
            self.stop();
        }

        self.config.validate()?;

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<EngineResult<u32>>(1);
        let config = self.config.clone();
        let worker = LoopWorker::spawn("tuner", move |shutdown_rx| {
            run_detector(source, config, on_pitch, ready_tx, shutdown_rx)
        })?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                log::info!("[TUNER] Started at {} Hz", sample_rate);
                self.worker = Some(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                worker.stop();
                Err(e)
            }
            Err(_) => {
                worker.stop();
                Err(EngineError::Stream("detector exited during startup".to_string()))
            }
        }
    }

    /// Stops sampling and releases the input. No-op when idle.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            log::info!("[TUNER] Stopped");
        }
    }

    pub fn state(&self) -> LoopState {
        self.worker.as_ref().map_or(LoopState::Idle, LoopWorker::state)
    }
}

/// Body of the detection thread.
fn run_detector(
    source: Arc<dyn FrameSource>,
    config: DetectorConfig,
    mut on_pitch: PitchCallback,
    ready_tx: Sender<EngineResult<u32>>,
    shutdown_rx: Receiver<()>,
) {
    let (frames_tx, frames_rx) = crossbeam_channel::bounded::<Vec<f32>>(FRAME_QUEUE_DEPTH);

    let input = match source.open(&config, frames_tx) {
        Ok(input) => input,
        Err(e) => {
            log::error!("[TUNER] Failed to open input: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let sample_rate = input.sample_rate;
    let _ = ready_tx.send(Ok(sample_rate));

    loop {
        crossbeam_channel::select! {
            recv(frames_rx) -> msg => match msg {
                Ok(frame) => {
                    let estimate = panic::catch_unwind(AssertUnwindSafe(|| {
                        estimate_pitch(&frame, sample_rate, &config)
                    }))
                    .unwrap_or_else(|_| {
                        log::warn!("[TUNER] Analysis panicked, skipping frame");
                        None
                    });
                    if let Some(estimate) = estimate {
                        on_pitch(estimate);
                    }
                }
                Err(_) => {
                    log::info!("[TUNER] Input closed");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => break,
        }
    }

    input.release();
}
