//! # Audio Context
//!
//! The shared output resource of the engine: one click output stream plus the
//! audio clock derived from it. Created once on first use by
//! [`AudioEngine`](crate::engine::AudioEngine) and kept alive until the engine
//! shuts down, so repeated metronome starts never reopen the device.
//!
//! CPAL streams cannot move between threads, so the stream lives on a
//! dedicated context thread; this handle only holds the clock, the command
//! queue and the thread's shutdown channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use cpal::traits::StreamTrait;
use crossbeam_channel::Sender;

use crate::audio::{self, RenderCommand};
use crate::click::{ClickKind, ScheduledClick};
use crate::config::MetronomeConfig;
use crate::error::{EngineError, EngineResult};

/// Clock plus sink for sample-accurate clicks.
///
/// Implemented by [`AudioContext`] for real hardware; tests substitute their
/// own clock and recorder.
pub trait ClickOutput: Send + Sync {
    /// Current audio-clock time in seconds.
    fn current_time(&self) -> f64;

    /// Plays a click of the given kind at audio-clock time `time`.
    fn schedule_click(&self, time: f64, kind: ClickKind);

    /// Discards clicks that have been scheduled but not yet played.
    fn cancel_pending(&self);
}

/// Handle to the running click output stream.
#[derive(Debug)]
pub struct AudioContext {
    frames_rendered: Arc<AtomicU64>,
    sample_rate: u32,
    commands: Sender<RenderCommand>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioContext {
    /// Opens the default output device and starts the click stream.
    ///
    /// Blocks until the stream is playing or has failed to open.
    pub fn open(config: &MetronomeConfig) -> EngineResult<Self> {
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<EngineResult<u32>>(1);

        let click_duration = config.click_duration_secs();
        let thread_frames = Arc::clone(&frames_rendered);
        let thread_handle = thread::Builder::new()
            .name("metrotune-context".to_string())
            .spawn(move || {
                log::info!("[CONTEXT] Opening click output stream...");
                let stream = match audio::start_click_output(click_duration, thread_frames, commands_rx) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(e) => {
                        log::error!("[CONTEXT] Failed to open output: {}", e);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until the engine releases the context.
                let _ = shutdown_rx.recv();

                log::info!("[CONTEXT] Closing click output stream");
                if let Err(e) = stream.pause() {
                    log::warn!("[CONTEXT] Error pausing stream: {}", e);
                }
                drop(stream);
            })
            .map_err(|e| EngineError::WorkerSpawn(e.to_string()))?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(EngineError::Stream("context thread exited during startup".to_string()));
            }
        };

        Ok(Self {
            frames_rendered,
            sample_rate,
            commands: commands_tx,
            shutdown_tx,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total frames written to the device since the context opened.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.shutdown_tx.send(());
            if handle.join().is_err() {
                log::error!("[CONTEXT] Context thread panicked");
            }
        }
    }
}

impl ClickOutput for AudioContext {
    fn current_time(&self) -> f64 {
        self.frames_rendered() as f64 / self.sample_rate as f64
    }

    fn schedule_click(&self, time: f64, kind: ClickKind) {
        let start_frame = (time.max(0.0) * self.sample_rate as f64).round() as u64;
        let _ = self
            .commands
            .send(RenderCommand::Click(ScheduledClick { start_frame, kind }));
    }

    fn cancel_pending(&self) {
        let _ = self.commands.send(RenderCommand::Clear);
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.close();
    }
}
