//! # Remote Link
//!
//! Drives an external metronome/tuner device over a TCP byte stream using the
//! text protocol in [`crate::protocol`]. Commands are written from the
//! caller's thread; a reader thread parses telemetry lines and forwards them
//! to the registered listeners.
//!
//! A link failure is reported to the caller and never touches the local
//! engine.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::{MetronomeControl, TunerControl};
use crate::error::{EngineError, EngineResult};
use crate::metronome::Tempo;
use crate::protocol::{Command, Telemetry, parse_telemetry};
use crate::{BeatCallback, PitchCallback};

/// Longest telemetry line kept in memory; longer lines are discarded.
const MAX_LINE_BYTES: u64 = 1024;

/// One listener per concern; registering again replaces the previous one.
#[derive(Default)]
struct Listeners {
    on_beat: Option<BeatCallback>,
    on_pitch: Option<PitchCallback>,
}

pub struct RemoteLink {
    peer: String,
    stream: TcpStream,
    listeners: Arc<Mutex<Listeners>>,
    connected: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl RemoteLink {
    /// Connects to the device at `addr` (e.g. `"192.168.4.1:3333"`).
    pub fn connect(addr: &str, timeout: Duration) -> EngineResult<Self> {
        let socket_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("no address for {}", addr),
                )
            })?;
        let stream = TcpStream::connect_timeout(&socket_addr, timeout)?;
        log::info!("[LINK] Connected to {}", socket_addr);
        Self::from_tcp(stream)
    }

    /// Wraps an already connected stream and starts the telemetry reader.
    pub fn from_tcp(stream: TcpStream) -> EngineResult<Self> {
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let read_half = stream.try_clone()?;
        let listeners = Arc::new(Mutex::new(Listeners::default()));
        let connected = Arc::new(AtomicBool::new(true));

        let thread_listeners = Arc::clone(&listeners);
        let thread_connected = Arc::clone(&connected);
        let reader = thread::Builder::new()
            .name("metrotune-link".to_string())
            .spawn(move || run_reader(read_half, thread_listeners, thread_connected))
            .map_err(|e| EngineError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            peer,
            stream,
            listeners,
            connected,
            reader: Some(reader),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// False once the device hung up or the stream failed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Writes one command line.
    pub fn send(&mut self, command: Command) -> EngineResult<()> {
        if !self.is_connected() {
            return Err(EngineError::LinkClosed);
        }
        log::debug!("[LINK] -> {}", command);
        let result = self
            .stream
            .write_all(command.encode().as_bytes())
            .and_then(|_| self.stream.flush());
        if let Err(e) = result {
            self.connected.store(false, Ordering::Release);
            return Err(e.into());
        }
        Ok(())
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        lock_listeners(&self.listeners)
    }

    /// Closes the stream and waits for the reader to exit.
    pub fn close(&mut self) {
        if let Some(handle) = self.reader.take() {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.connected.store(false, Ordering::Release);
            if handle.join().is_err() {
                log::error!("[LINK] Reader thread panicked");
            }
            log::info!("[LINK] Disconnected from {}", self.peer);
        }
        let mut listeners = self.listeners();
        listeners.on_beat = None;
        listeners.on_pitch = None;
    }
}

impl MetronomeControl for RemoteLink {
    fn start_metronome(&mut self, tempo: Tempo, on_beat: BeatCallback) -> EngineResult<()> {
        self.listeners().on_beat = Some(on_beat);
        let result = self
            .send(Command::SetBpm(tempo.bpm()))
            .and_then(|_| self.send(Command::StartMetro));
        if result.is_err() {
            self.listeners().on_beat = None;
        }
        result
    }

    fn stop_metronome(&mut self) -> EngineResult<()> {
        if self.listeners().on_beat.take().is_none() {
            return Ok(());
        }
        self.send(Command::StopMetro)
    }

    fn update_tempo(&mut self, tempo: Tempo) -> EngineResult<()> {
        self.send(Command::SetBpm(tempo.bpm()))
    }
}

impl TunerControl for RemoteLink {
    fn start_tuner(&mut self, on_pitch: PitchCallback) -> EngineResult<()> {
        self.listeners().on_pitch = Some(on_pitch);
        let result = self.send(Command::StartTuner);
        if result.is_err() {
            self.listeners().on_pitch = None;
        }
        result
    }

    fn stop_tuner(&mut self) -> EngineResult<()> {
        if self.listeners().on_pitch.take().is_none() {
            return Ok(());
        }
        self.send(Command::StopTuner)
    }
}

impl Drop for RemoteLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock_listeners(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    // A panicking listener must not take the link down with it.
    listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Body of the telemetry reader thread.
///
/// Only end of stream or an IO error ends the loop. Lines that are not valid
/// UTF-8, do not parse, or run past `MAX_LINE_BYTES` are skipped.
fn run_reader(stream: TcpStream, listeners: Arc<Mutex<Listeners>>, connected: Arc<AtomicBool>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(128);
    loop {
        buf.clear();
        match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("[LINK] Read failed: {}", e);
                break;
            }
        }

        if buf.last() != Some(&b'\n') && buf.len() as u64 == MAX_LINE_BYTES {
            log::debug!("[LINK] Dropping line longer than {} bytes", MAX_LINE_BYTES);
            match reader.skip_until(b'\n') {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("[LINK] Read failed: {}", e);
                    break;
                }
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let Some(telemetry) = parse_telemetry(&line) else {
            log::debug!("[LINK] Ignoring line {:?}", line);
            continue;
        };

        let mut listeners = lock_listeners(&listeners);
        match telemetry {
            Telemetry::Beat(beat) => {
                if let Some(on_beat) = listeners.on_beat.as_mut() {
                    on_beat(beat);
                }
            }
            Telemetry::Tuner(reading) => {
                if let (Some(on_pitch), Some(estimate)) =
                    (listeners.on_pitch.as_mut(), reading.to_estimate())
                {
                    on_pitch(estimate);
                }
            }
        }
    }
    connected.store(false, Ordering::Release);
    log::info!("[LINK] Telemetry stream ended");
}
