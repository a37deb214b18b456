//! # Click Synthesis Module
//!
//! Renders metronome clicks as short, exponentially decaying sine bursts at
//! exact sample positions of the output stream. Beat 1 gets a higher, louder
//! accent so the downbeat is audible.

use std::f32::consts::TAU;

/// Decay rate of the click envelope (1/s).
const DECAY_RATE: f32 = 60.0;

/// Upper bound on simultaneously sounding clicks kept without reallocation.
const MAX_QUEUED_CLICKS: usize = 16;

/// Sound used for a scheduled beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// Downbeat (beat 1)
    Accent,
    /// Beats 2-4
    Normal,
}

impl ClickKind {
    pub fn frequency(&self) -> f32 {
        match self {
            ClickKind::Accent => 1000.0,
            ClickKind::Normal => 800.0,
        }
    }

    pub fn gain(&self) -> f32 {
        match self {
            ClickKind::Accent => 0.9,
            ClickKind::Normal => 0.5,
        }
    }
}

/// A click pinned to an absolute frame of the output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledClick {
    pub start_frame: u64,
    pub kind: ClickKind,
}

/// Mixes scheduled clicks into interleaved output buffers.
#[derive(Debug)]
pub struct ClickRenderer {
    sample_rate: u32,
    duration_frames: u64,
    queued: Vec<ScheduledClick>,
}

impl ClickRenderer {
    pub fn new(sample_rate: u32, click_duration_secs: f32) -> Self {
        let duration_frames = (sample_rate as f32 * click_duration_secs).round().max(1.0) as u64;
        Self {
            sample_rate,
            duration_frames,
            queued: Vec::with_capacity(MAX_QUEUED_CLICKS),
        }
    }

    /// Queues a click. A click whose start already passed plays from `now_frame`.
    pub fn schedule(&mut self, click: ScheduledClick, now_frame: u64) {
        self.queued.push(ScheduledClick {
            start_frame: click.start_frame.max(now_frame),
            kind: click.kind,
        });
    }

    /// Drops every queued click, including one that is currently sounding.
    pub fn clear(&mut self) {
        self.queued.clear();
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Fills `out` (interleaved, `channels` wide) starting at absolute frame `first_frame`.
    pub fn render(&mut self, out: &mut [f32], channels: usize, first_frame: u64) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let sample_rate = self.sample_rate as f32;

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let position = first_frame + i as u64;
            let mut value = 0.0f32;
            for click in &self.queued {
                if position < click.start_frame || position >= click.start_frame + self.duration_frames {
                    continue;
                }
                let t = (position - click.start_frame) as f32 / sample_rate;
                let envelope = (-t * DECAY_RATE).exp();
                value += (TAU * click.kind.frequency() * t).sin() * envelope * click.kind.gain();
            }
            let value = value.clamp(-1.0, 1.0);
            for sample in frame.iter_mut() {
                *sample = value;
            }
        }

        let end = first_frame + frames as u64;
        let duration = self.duration_frames;
        self.queued.retain(|click| click.start_frame + duration > end);
    }
}
