//! # Remote Link Protocol
//!
//! Line-oriented text protocol spoken with the external device.
//!
//! Outbound commands are `"<COMMAND>:<VALUE>\n"`:
//! `START_METRO`, `STOP_METRO`, `SET_BPM:<bpm>`, `START_TUNER`, `STOP_TUNER`.
//!
//! Inbound telemetry is either `BEAT:<n>` or a pipe-delimited tuner reading
//! such as `FREQ:440.00|NOTE:A|CENTS:0`. Tuner fields are parsed one by one,
//! may come in any order, and default to zero or empty when missing.

use std::fmt;

use crate::metronome::BeatNumber;
use crate::note::NoteName;
use crate::PitchEstimate;

/// Command sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartMetro,
    StopMetro,
    SetBpm(u32),
    StartTuner,
    StopTuner,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartMetro => "START_METRO",
            Command::StopMetro => "STOP_METRO",
            Command::SetBpm(_) => "SET_BPM",
            Command::StartTuner => "START_TUNER",
            Command::StopTuner => "STOP_TUNER",
        }
    }

    /// Wire form including the terminating newline.
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetBpm(bpm) => write!(f, "{}:{}", self.name(), bpm),
            _ => write!(f, "{}:", self.name()),
        }
    }
}

/// Tuner reading as reported by the device, before validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TunerReading {
    pub frequency_hz: f32,
    pub note: String,
    pub cents: i32,
}

impl TunerReading {
    /// Converts to an estimate, or `None` when the device reported no pitch
    /// or a note name we do not know.
    pub fn to_estimate(&self) -> Option<PitchEstimate> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return None;
        }
        let note = self.note.parse::<NoteName>().ok()?;
        Some(PitchEstimate {
            frequency_hz: self.frequency_hz,
            note,
            cents: self.cents.clamp(-50, 50),
        })
    }
}

/// One parsed inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Beat(BeatNumber),
    Tuner(TunerReading),
}

/// Parses one telemetry line. Returns `None` for blank or unrecognised lines.
pub fn parse_telemetry(line: &str) -> Option<Telemetry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(value) = line.strip_prefix("BEAT:") {
        let beat = value.trim().parse::<u8>().ok()?;
        return BeatNumber::new(beat).map(Telemetry::Beat);
    }

    let mut reading = TunerReading::default();
    let mut recognised = false;
    for field in line.split('|') {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "FREQ" => {
                reading.frequency_hz = value.parse().unwrap_or(0.0);
                recognised = true;
            }
            "NOTE" => {
                reading.note = value.to_string();
                recognised = true;
            }
            "CENTS" => {
                reading.cents = parse_cents(value);
                recognised = true;
            }
            _ => {}
        }
    }

    recognised.then_some(Telemetry::Tuner(reading))
}

/// Integer cents, tolerating devices that send a fractional value.
fn parse_cents(value: &str) -> i32 {
    value
        .parse::<i32>()
        .or_else(|_| value.parse::<f32>().map(|c| c.round() as i32))
        .unwrap_or(0)
}
