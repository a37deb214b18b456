//! Loop thread lifecycle shared by the metronome and the detector.
//!
//! Each loop checks its shutdown channel at iteration boundaries, so a stop
//! request takes effect after at most one in-flight iteration. `stop` joins
//! the thread; once it returns the loop is idle and will not call back again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::error::{EngineError, EngineResult};

/// Lifecycle of a scheduling or detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    /// Stop requested, current iteration still finishing
    Stopping,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            _ => LoopState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoopState::Idle => 0,
            LoopState::Running => 1,
            LoopState::Stopping => 2,
        }
    }
}

/// Owns one loop thread and its shutdown channel.
#[derive(Debug)]
pub(crate) struct LoopWorker {
    name: &'static str,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
    state: Arc<AtomicU8>,
}

impl LoopWorker {
    /// Spawns `body` on a named thread. The body receives the shutdown channel
    /// and must return promptly once a message (or disconnect) arrives on it.
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> EngineResult<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let state = Arc::new(AtomicU8::new(LoopState::Running.as_u8()));
        let thread_state = Arc::clone(&state);

        let thread_handle = thread::Builder::new()
            .name(format!("metrotune-{}", name))
            .spawn(move || {
                log::debug!("[{}] Loop started", name);
                body(shutdown_rx);
                thread_state.store(LoopState::Idle.as_u8(), Ordering::Release);
                log::debug!("[{}] Loop exited", name);
            })
            .map_err(|e| EngineError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            name,
            shutdown_tx,
            thread_handle: Some(thread_handle),
            state,
        })
    }

    pub(crate) fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Requests shutdown and waits for the loop to finish its iteration.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        if self.state() == LoopState::Running {
            self.state.store(LoopState::Stopping.as_u8(), Ordering::Release);
        }
        let _ = self.shutdown_tx.try_send(());
        if handle.join().is_err() {
            log::error!("[{}] Loop thread panicked", self.name);
        }
        self.state.store(LoopState::Idle.as_u8(), Ordering::Release);
    }
}

impl Drop for LoopWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
