//! # Metronome Scheduler
//!
//! Lookahead scheduling of metronome clicks against the audio clock.
//!
//! A coarse wall-clock loop wakes every poll interval and schedules every
//! click whose time falls inside the lookahead window. The click itself is
//! placed at an exact audio-clock time by the output, so rhythm does not
//! depend on how precisely the loop wakes up. Beat notifications are held
//! back until the audio clock reaches the click, keeping the UI in step with
//! what is heard.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};

use crate::click::ClickKind;
use crate::config::MetronomeConfig;
use crate::context::ClickOutput;
use crate::error::{EngineError, EngineResult};
use crate::worker::{LoopState, LoopWorker};
use crate::BeatCallback;

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 240;
pub const DEFAULT_BPM: u32 = 120;

/// The bar is fixed at four beats.
pub const BEATS_PER_BAR: u8 = 4;

/// Delay between `start` and the first click, in audio-clock seconds.
const START_OFFSET_SECS: f64 = 0.05;

/// Validated tempo in beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Tempo(u32);

impl Tempo {
    /// Rejects tempos outside [`MIN_BPM`, `MAX_BPM`].
    pub fn new(bpm: u32) -> EngineResult<Self> {
        if (MIN_BPM..=MAX_BPM).contains(&bpm) {
            Ok(Self(bpm))
        } else {
            Err(EngineError::InvalidTempo(bpm))
        }
    }

    /// Clamps into the supported range. Meant for controls such as sliders
    /// whose caller displays the returned value.
    pub fn clamped(bpm: i64) -> Self {
        Self(bpm.clamp(MIN_BPM as i64, MAX_BPM as i64) as u32)
    }

    pub fn bpm(&self) -> u32 {
        self.0
    }

    /// Seconds between consecutive beats.
    pub fn interval(&self) -> f64 {
        60.0 / self.0 as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(DEFAULT_BPM)
    }
}

impl TryFrom<u32> for Tempo {
    type Error = EngineError;

    fn try_from(bpm: u32) -> Result<Self, Self::Error> {
        Tempo::new(bpm)
    }
}

impl From<Tempo> for u32 {
    fn from(tempo: Tempo) -> Self {
        tempo.0
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.0)
    }
}

/// Position within the bar, always 1..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeatNumber(u8);

impl BeatNumber {
    pub const FIRST: BeatNumber = BeatNumber(1);

    pub fn new(beat: u8) -> Option<Self> {
        (1..=BEATS_PER_BAR).contains(&beat).then_some(Self(beat))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// The following beat, wrapping 4 back to 1.
    pub fn next(&self) -> Self {
        Self(self.0 % BEATS_PER_BAR + 1)
    }

    pub fn is_downbeat(&self) -> bool {
        self.0 == 1
    }

    pub fn click_kind(&self) -> ClickKind {
        if self.is_downbeat() {
            ClickKind::Accent
        } else {
            ClickKind::Normal
        }
    }
}

impl Default for BeatNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for BeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One future click: which beat, and when on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub beat: BeatNumber,
    pub time: f64,
}

/// Pure lookahead arithmetic, independent of threads and devices.
#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    next_event_time: f64,
    current_beat: BeatNumber,
    last_event_time: Option<f64>,
    lookahead: f64,
}

impl LookaheadScheduler {
    /// Starts a bar on beat 1 at audio-clock time `start_time`.
    pub fn new(start_time: f64, lookahead: f64) -> Self {
        Self {
            next_event_time: start_time,
            current_beat: BeatNumber::FIRST,
            last_event_time: None,
            lookahead,
        }
    }

    /// Beat number of the next click to be scheduled.
    pub fn current_beat(&self) -> BeatNumber {
        self.current_beat
    }

    /// Time of the next click if the tempo does not change before it is scheduled.
    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    /// Schedules every click due before `now + lookahead`.
    ///
    /// The gap before each newly scheduled click uses `tempo` as read now, so
    /// a tempo change moves only clicks that have not been handed out yet.
    pub fn poll(&mut self, now: f64, tempo: Tempo) -> Vec<ScheduledEvent> {
        if let Some(last) = self.last_event_time {
            self.next_event_time = last + tempo.interval();
        }

        let mut events = Vec::new();
        while self.next_event_time < now + self.lookahead {
            events.push(ScheduledEvent {
                beat: self.current_beat,
                time: self.next_event_time,
            });
            self.last_event_time = Some(self.next_event_time);
            self.next_event_time += tempo.interval();
            self.current_beat = self.current_beat.next();
        }
        events
    }
}

/// Start/stop control of the scheduling loop plus the shared tempo.
#[derive(Debug)]
pub struct Metronome {
    config: MetronomeConfig,
    tempo: Arc<AtomicU32>,
    worker: Option<LoopWorker>,
}

impl Metronome {
    pub fn new(config: MetronomeConfig) -> Self {
        Self {
            config,
            tempo: Arc::new(AtomicU32::new(DEFAULT_BPM)),
            worker: None,
        }
    }

    /// Starts clicking at `tempo`. A running loop is stopped first, so there is
    /// never more than one.
    pub fn start(
        &mut self,
        output: Arc<dyn ClickOutput>,
        tempo: Tempo,
        on_beat: BeatCallback,
    ) -> EngineResult<()> {
        if self.worker.is_some() {
            log::info!("[METRONOME] Restarting running scheduler");
            self.stop();
        }
        self.tempo.store(tempo.bpm(), Ordering::Release);

        let shared_tempo = Arc::clone(&self.tempo);
        let config = self.config.clone();
        let worker = LoopWorker::spawn("metronome", move |shutdown_rx| {
            run_scheduler(output, shared_tempo, config, on_beat, shutdown_rx)
        })?;
        self.worker = Some(worker);
        log::info!("[METRONOME] Started at {}", tempo);
        Ok(())
    }

    /// Stops the loop and discards unplayed clicks. No-op when idle.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            log::info!("[METRONOME] Stopped");
        }
    }

    /// Applies to clicks scheduled from now on.
    pub fn update_tempo(&self, tempo: Tempo) {
        self.tempo.store(tempo.bpm(), Ordering::Release);
        log::debug!("[METRONOME] Tempo set to {}", tempo);
    }

    pub fn tempo(&self) -> Tempo {
        Tempo::clamped(self.tempo.load(Ordering::Acquire) as i64)
    }

    pub fn state(&self) -> LoopState {
        self.worker.as_ref().map_or(LoopState::Idle, LoopWorker::state)
    }
}

/// Body of the scheduling thread.
///
/// Wakes for whichever comes first: the next poll, the next due beat
/// notification, or a shutdown request.
fn run_scheduler(
    output: Arc<dyn ClickOutput>,
    tempo: Arc<AtomicU32>,
    config: MetronomeConfig,
    mut on_beat: BeatCallback,
    shutdown_rx: Receiver<()>,
) {
    let poll_interval = config.poll_interval();
    let mut scheduler =
        LookaheadScheduler::new(output.current_time() + START_OFFSET_SECS, config.lookahead_secs());
    let mut notifications: VecDeque<(Instant, BeatNumber)> = VecDeque::new();
    let mut next_poll = Instant::now();

    loop {
        let now = Instant::now();

        while let Some(&(due, beat)) = notifications.front() {
            if due > now {
                break;
            }
            notifications.pop_front();
            on_beat(beat);
        }

        if now >= next_poll {
            let audio_now = output.current_time();
            let bpm = Tempo::clamped(tempo.load(Ordering::Acquire) as i64);
            for event in scheduler.poll(audio_now, bpm) {
                output.schedule_click(event.time, event.beat.click_kind());
                let delay = Duration::from_secs_f64((event.time - audio_now).max(0.0));
                notifications.push_back((now + delay, event.beat));
            }
            next_poll = now + poll_interval;
        }

        let wake_at = notifications
            .front()
            .map_or(next_poll, |&(due, _)| due.min(next_poll));
        match shutdown_rx.recv_timeout(wake_at.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    output.cancel_pending();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_validation() {
        assert!(Tempo::new(40).is_ok());
        assert!(Tempo::new(240).is_ok());
        assert!(matches!(Tempo::new(0), Err(EngineError::InvalidTempo(0))));
        assert!(Tempo::new(39).is_err());
        assert!(Tempo::new(241).is_err());
        assert_eq!(Tempo::default().bpm(), 120);
        assert_eq!(Tempo::clamped(-5).bpm(), MIN_BPM);
        assert_eq!(Tempo::clamped(1000).bpm(), MAX_BPM);
        assert!((Tempo::new(120).unwrap().interval() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_beat_cursor_wraps() {
        let mut beat = BeatNumber::FIRST;
        let mut seen = Vec::new();
        for _ in 0..9 {
            seen.push(beat.get());
            beat = beat.next();
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 1, 2, 3, 4, 1]);
        assert!(BeatNumber::new(0).is_none());
        assert!(BeatNumber::new(5).is_none());
        assert_eq!(BeatNumber::new(1).unwrap().click_kind(), ClickKind::Accent);
        assert_eq!(BeatNumber::new(3).unwrap().click_kind(), ClickKind::Normal);
    }

    #[test]
    fn test_poll_schedules_only_within_lookahead() {
        let tempo = Tempo::new(120).unwrap();
        let mut scheduler = LookaheadScheduler::new(0.0, 0.1);

        let events = scheduler.poll(0.0, tempo);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].beat, BeatNumber::FIRST);
        assert_eq!(events[0].time, 0.0);

        // Still inside the same beat: nothing new.
        assert!(scheduler.poll(0.2, tempo).is_empty());

        // 0.5 s falls inside [0.41, 0.51).
        let events = scheduler.poll(0.41, tempo);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].beat.get(), 2);
        assert!((events[0].time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_delayed_poll_catches_up_in_order() {
        let tempo = Tempo::new(240).unwrap();
        let mut scheduler = LookaheadScheduler::new(0.0, 0.1);
        let events = scheduler.poll(1.0, tempo);
        let beats: Vec<u8> = events.iter().map(|e| e.beat.get()).collect();
        assert_eq!(beats, vec![1, 2, 3, 4, 1]);
        assert!(events.windows(2).all(|w| w[1].time > w[0].time));
    }

    #[test]
    fn test_downbeats_converge_to_bar_length() {
        for bpm in [40, 60, 97, 120, 181, 240] {
            let tempo = Tempo::new(bpm).unwrap();
            let mut scheduler = LookaheadScheduler::new(0.0, 0.1);
            let mut downbeats = Vec::new();
            let mut beats = Vec::new();
            // Simulated 25 ms polls over 16 bars.
            let mut now = 0.0;
            while downbeats.len() < 17 {
                for event in scheduler.poll(now, tempo) {
                    beats.push(event.beat.get());
                    if event.beat.is_downbeat() {
                        downbeats.push(event.time);
                    }
                }
                now += 0.025;
            }
            let expected = 4.0 * 60.0 / bpm as f64;
            let average = (downbeats[16] - downbeats[0]) / 16.0;
            assert!((average - expected).abs() < 1e-9, "{} BPM", bpm);
            for (i, beat) in beats.iter().enumerate() {
                assert_eq!(*beat as usize, i % 4 + 1);
            }
        }
    }

    #[test]
    fn test_tempo_change_keeps_scheduled_clicks() {
        let slow = Tempo::new(60).unwrap();
        let fast = Tempo::new(120).unwrap();
        let mut scheduler = LookaheadScheduler::new(0.0, 0.1);

        let first = scheduler.poll(0.0, slow);
        let second = scheduler.poll(0.95, slow);
        assert_eq!(second.len(), 1);
        assert!((second[0].time - 1.0).abs() < 1e-9);

        // Change tempo after beat 2 was handed out; its time is untouched and
        // the next gap uses the new interval.
        let third = scheduler.poll(1.45, fast);
        assert_eq!(first[0].time, 0.0);
        assert_eq!(third.len(), 1);
        assert!((third[0].time - 1.5).abs() < 1e-9);
        assert_eq!(third[0].beat.get(), 3);
    }

    #[test]
    fn test_tempo_serde_rejects_out_of_range() {
        let tempo: Tempo = serde_json::from_str("96").unwrap();
        assert_eq!(tempo.bpm(), 96);
        assert!(serde_json::from_str::<Tempo>("0").is_err());
        assert_eq!(serde_json::to_string(&tempo).unwrap(), "96");
    }
}
