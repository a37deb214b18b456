//! # Metrotune - Metronome and Chromatic Tuner GUI
//!
//! Desktop front end for the metrotune engine. It drives either the local
//! audio engine or a networked device and renders beats and pitch readings.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Engine Threads**: Scheduler, detector and link reader live in metrotune-core
//! - **Communication**: Engine callbacks push `EngineEvent`s into a crossbeam channel
//! - **Updates**: 60 FPS tick drains the channel into the display state

mod settings;
mod ui;

use crossbeam_channel::{Receiver, Sender};
use iced::futures::channel::oneshot;
use iced::{self, Element, Subscription, Task, Theme};
use metrotune_core::{
    AudioEngine, BeatNumber, EngineError, EngineResult, MetronomeControl, PitchEstimate,
    RemoteLink, Source, SourceKind, Tempo, TunerControl,
};
use settings::Settings;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use ui::main_display::create_main_view;

const SMOOTHING_FACTOR: usize = 5; // Number of readings averaged by the cent meter
const PITCH_HOLD: Duration = Duration::from_millis(750); // Reading expires after this much silence
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Main entry point for the Metrotune application.
pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("[MAIN] Starting Metrotune...");
    let result = iced::application("Metrotune", MetrotuneApp::update, MetrotuneApp::view)
        .subscription(MetrotuneApp::subscription)
        .theme(MetrotuneApp::theme)
        .run_with(MetrotuneApp::new);
    log::info!("[MAIN] Application finished with result: {:?}", result);
    result
}

/// Application messages exchanged between the widgets and `update`.
#[derive(Debug, Clone)]
pub enum Message {
    TabSelected(Tab),
    SourceSelected(SourceKind),
    RemoteAddressChanged(String),
    ConnectRemote,
    RemoteConnected(PendingLink),

    ToggleMetronome,
    TempoChanged(u32),
    TempoStep(i32),

    ToggleTuner,

    DismissError,
    Tick, // Timer tick for draining engine events
}

/// Top-level screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Metronome,
    Tuner,
}

/// What the engine callbacks report back to the GUI thread.
#[derive(Debug, Clone, Copy)]
pub enum EngineEvent {
    Beat(BeatNumber),
    Pitch(PitchEstimate),
}

/// Result of a connection attempt made off the GUI thread.
///
/// Messages must be `Clone`, so the link is parked in a shared slot and taken
/// out exactly once by `update`.
#[derive(Clone)]
pub struct PendingLink {
    address: String,
    result: Arc<Mutex<Option<EngineResult<RemoteLink>>>>,
}

impl PendingLink {
    fn new(address: String, result: EngineResult<RemoteLink>) -> Self {
        Self {
            address,
            result: Arc::new(Mutex::new(Some(result))),
        }
    }

    fn take(&self) -> Option<EngineResult<RemoteLink>> {
        self.result
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl fmt::Debug for PendingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLink")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// UI-specific data needed for rendering the interface.
#[derive(Debug, Clone)]
pub struct AppDisplayData {
    pub tab: Tab,

    // Source selection
    pub source_kind: SourceKind,
    pub remote_address: String,
    pub remote_peer: Option<String>,
    pub connecting: bool,

    // Metronome
    pub tempo: Tempo,
    pub metronome_running: bool,
    pub current_beat: Option<BeatNumber>,

    // Tuner
    pub tuner_running: bool,
    pub last_pitch: Option<PitchEstimate>,
    pub smoothing_buffer: Vec<f32>,

    pub error: Option<String>,
}

impl AppDisplayData {
    /// Mean of the buffered cent readings, if any.
    pub fn smoothed_cents(&self) -> Option<f32> {
        if self.smoothing_buffer.is_empty() {
            return self.last_pitch.map(|p| p.cents as f32);
        }
        let sum: f32 = self.smoothing_buffer.iter().sum();
        Some(sum / self.smoothing_buffer.len() as f32)
    }
}

struct MetrotuneApp {
    source: Source,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    last_pitch_at: Option<Instant>,

    settings: Settings,
    settings_path: PathBuf,

    // Single source of truth for all display data
    display_data: AppDisplayData,
}

impl MetrotuneApp {
    /// Loads settings and, if the last session used a device, starts
    /// reconnecting to it in the background.
    fn new() -> (Self, Task<Message>) {
        let settings_path = settings::default_settings_path();
        let settings = settings::load_settings(&settings_path);
        let mut app = Self::with_settings(settings, settings_path);

        let task = if app.settings.source == SourceKind::Remote {
            log::info!("[MAIN] Reconnecting to remote device from last session");
            app.begin_connect()
        } else {
            Task::none()
        };
        (app, task)
    }

    fn with_settings(settings: Settings, settings_path: PathBuf) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            source: Source::Local(AudioEngine::new(settings.engine.clone())),
            events_tx,
            events_rx,
            last_pitch_at: None,
            display_data: AppDisplayData {
                tab: Tab::Metronome,
                source_kind: SourceKind::Local,
                remote_address: settings.remote_address.clone(),
                remote_peer: None,
                connecting: false,
                tempo: settings.tempo,
                metronome_running: false,
                current_beat: None,
                tuner_running: false,
                last_pitch: None,
                smoothing_buffer: Vec::new(),
                error: None,
            },
            settings,
            settings_path,
        }
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::TabSelected(tab) => self.select_tab(tab),
            Message::SourceSelected(SourceKind::Local) => self.use_local(),
            Message::SourceSelected(SourceKind::Remote) | Message::ConnectRemote => {
                return self.begin_connect();
            }
            Message::RemoteConnected(pending) => self.finish_connect(pending),
            Message::RemoteAddressChanged(address) => {
                self.display_data.remote_address = address;
            }
            Message::ToggleMetronome => {
                if self.display_data.metronome_running {
                    self.stop_metronome();
                } else {
                    self.start_metronome();
                }
            }
            Message::TempoChanged(bpm) => self.set_tempo(Tempo::clamped(i64::from(bpm))),
            Message::TempoStep(delta) => {
                let bpm = i64::from(self.display_data.tempo.bpm()) + i64::from(delta);
                self.set_tempo(Tempo::clamped(bpm));
            }
            Message::ToggleTuner => {
                if self.display_data.tuner_running {
                    self.stop_tuner();
                } else {
                    self.start_tuner();
                }
            }
            Message::DismissError => self.display_data.error = None,
            Message::Tick => self.tick(),
        }
        Task::none()
    }

    fn tick(&mut self) {
        let events: Vec<EngineEvent> = self.events_rx.try_iter().collect();
        for event in events {
            match event {
                EngineEvent::Beat(beat) => {
                    if self.display_data.metronome_running {
                        self.display_data.current_beat = Some(beat);
                    }
                }
                EngineEvent::Pitch(estimate) => {
                    if self.display_data.tuner_running {
                        self.process_pitch(estimate);
                    }
                }
            }
        }

        if let Some(at) = self.last_pitch_at {
            if at.elapsed() > PITCH_HOLD {
                self.last_pitch_at = None;
                self.display_data.last_pitch = None;
                self.display_data.smoothing_buffer.clear();
            }
        }

        if let Source::Remote(link) = &self.source {
            if !link.is_connected() {
                log::warn!("[MAIN] Remote device {} went away", link.peer());
                self.fall_back_to_local("Remote device disconnected");
            }
        }
    }

    fn process_pitch(&mut self, estimate: PitchEstimate) {
        self.display_data.smoothing_buffer.push(estimate.cents as f32);
        if self.display_data.smoothing_buffer.len() > SMOOTHING_FACTOR {
            self.display_data.smoothing_buffer.remove(0);
        }
        self.display_data.last_pitch = Some(estimate);
        self.last_pitch_at = Some(Instant::now());
    }

    fn select_tab(&mut self, tab: Tab) {
        if self.display_data.tab == tab {
            return;
        }
        match tab {
            Tab::Metronome => self.stop_tuner(),
            Tab::Tuner => self.stop_metronome(),
        }
        self.display_data.tab = tab;
    }

    fn start_metronome(&mut self) {
        let tx = self.events_tx.clone();
        let result = self.source.start_metronome(
            self.display_data.tempo,
            Box::new(move |beat| {
                let _ = tx.send(EngineEvent::Beat(beat));
            }),
        );
        if self.report("Could not start metronome", result) {
            self.display_data.metronome_running = true;
            self.display_data.current_beat = None;
        }
    }

    fn stop_metronome(&mut self) {
        if !self.display_data.metronome_running {
            return;
        }
        let result = self.source.stop_metronome();
        self.report("Could not stop metronome", result);
        self.display_data.metronome_running = false;
        self.display_data.current_beat = None;
    }

    fn set_tempo(&mut self, tempo: Tempo) {
        if tempo == self.display_data.tempo {
            return;
        }
        self.display_data.tempo = tempo;
        if self.display_data.metronome_running {
            let result = self.source.update_tempo(tempo);
            self.report("Could not change tempo", result);
        }
        self.settings.tempo = tempo;
        self.persist();
    }

    fn start_tuner(&mut self) {
        let tx = self.events_tx.clone();
        let result = self.source.start_tuner(Box::new(move |estimate| {
            let _ = tx.send(EngineEvent::Pitch(estimate));
        }));
        if self.report("Could not start tuner", result) {
            self.display_data.tuner_running = true;
        }
    }

    fn stop_tuner(&mut self) {
        if !self.display_data.tuner_running {
            return;
        }
        let result = self.source.stop_tuner();
        self.report("Could not stop tuner", result);
        self.display_data.tuner_running = false;
        self.clear_pitch();
    }

    /// Starts a connection attempt on its own thread so the window stays
    /// responsive for the length of the connect timeout.
    fn begin_connect(&mut self) -> Task<Message> {
        if self.display_data.connecting {
            return Task::none();
        }
        let address = self.display_data.remote_address.trim().to_string();
        log::info!("[MAIN] Connecting to remote device at {}", address);
        self.display_data.connecting = true;
        self.display_data.error = None;

        let (result_tx, result_rx) = oneshot::channel();
        let thread_address = address.clone();
        let spawned = thread::Builder::new()
            .name("metrotune-connect".to_string())
            .spawn(move || {
                let _ = result_tx.send(RemoteLink::connect(&thread_address, CONNECT_TIMEOUT));
            });
        if let Err(e) = spawned {
            let result = Err(EngineError::WorkerSpawn(e.to_string()));
            return Task::done(Message::RemoteConnected(PendingLink::new(address, result)));
        }

        Task::perform(
            async move {
                let result = result_rx.await.unwrap_or(Err(EngineError::LinkClosed));
                PendingLink::new(address, result)
            },
            Message::RemoteConnected,
        )
    }

    fn finish_connect(&mut self, pending: PendingLink) {
        self.display_data.connecting = false;
        let Some(result) = pending.take() else {
            return;
        };
        let address = pending.address;
        match result {
            Ok(link) => {
                self.display_data.remote_peer = Some(link.peer().to_string());
                self.replace_source(Source::Remote(link));
                self.display_data.error = None;
                self.settings.remote_address = address;
                self.settings.source = SourceKind::Remote;
                self.persist();
            }
            Err(e) => {
                log::error!("[MAIN] Remote connection failed: {}", e);
                self.display_data.error = Some(format!("Could not connect to {}: {}", address, e));
            }
        }
    }

    fn use_local(&mut self) {
        if self.source.kind() == SourceKind::Local {
            return;
        }
        self.replace_source(Source::Local(AudioEngine::new(self.settings.engine.clone())));
        self.display_data.remote_peer = None;
        self.settings.source = SourceKind::Local;
        self.persist();
    }

    fn fall_back_to_local(&mut self, reason: &str) {
        self.use_local();
        self.display_data.error = Some(reason.to_string());
    }

    fn replace_source(&mut self, next: Source) {
        self.source.switch_to(next);
        self.display_data.source_kind = self.source.kind();
        self.display_data.metronome_running = false;
        self.display_data.current_beat = None;
        self.display_data.tuner_running = false;
        self.clear_pitch();
        // Drop events queued by the previous source
        while self.events_rx.try_recv().is_ok() {}
    }

    fn clear_pitch(&mut self) {
        self.display_data.last_pitch = None;
        self.display_data.smoothing_buffer.clear();
        self.last_pitch_at = None;
    }

    /// Shows a failed engine call in the error banner. Returns true on success.
    fn report(&mut self, context: &str, result: EngineResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("[MAIN] {}: {}", context, e);
                self.display_data.error = Some(format!("{}: {}", context, e));
                false
            }
        }
    }

    fn persist(&self) {
        if let Err(e) = settings::save_settings(&self.settings, &self.settings_path) {
            log::warn!("[MAIN] Failed to save settings: {:#}", e);
        }
    }

    fn view(&self) -> Element<'_, Message> {
        create_main_view(&self.display_data)
    }

    fn subscription(&self) -> Subscription<Message> {
        iced::time::every(Duration::from_millis(16)).map(|_| Message::Tick)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}
