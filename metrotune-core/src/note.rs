//! # Note Mapping Module
//!
//! Maps a frequency to the nearest equal-tempered semitone and the signed
//! deviation from it in cents.
//!
//! ## Reference
//! - A4 = 440 Hz, MIDI note 69
//! - Continuous pitch number: `12 * log2(f / 440) + 69`
//! - Pitch classes are named with sharps, starting at C

use std::fmt;
use std::str::FromStr;

/// Reference frequency for A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI note number of A4.
pub const A4_MIDI: i32 = 69;

/// One of the twelve pitch classes of the chromatic scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteName {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl NoteName {
    /// All pitch classes in ascending order starting at C.
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    /// Returns the pitch class of a MIDI note number (any integer, negatives wrap).
    pub fn from_midi(midi: i32) -> Self {
        Self::ALL[midi.rem_euclid(12) as usize]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a note name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNoteError(pub String);

impl fmt::Display for ParseNoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown note name: {:?}", self.0)
    }
}

impl std::error::Error for ParseNoteError {}

impl FromStr for NoteName {
    type Err = ParseNoteError;

    /// Accepts sharp spellings ("C#") and flat spellings ("Db").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let natural = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(ParseNoteError(trimmed.to_string())),
        };
        let offset = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            _ => return Err(ParseNoteError(trimmed.to_string())),
        };
        Ok(NoteName::from_midi(natural + offset))
    }
}

/// Nearest semitone to a frequency plus the deviation from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteReading {
    pub note: NoteName,
    /// Deviation from `note` in cents, always in [-50, 50)
    pub cents: i32,
    /// MIDI number of the nearest semitone
    pub midi: i32,
}

impl NoteReading {
    /// Scientific pitch octave, A4 = octave 4.
    pub fn octave(&self) -> i32 {
        octave_of(self.midi)
    }
}

/// Converts a frequency to the nearest note and its cents deviation.
///
/// Returns `None` for zero, negative or non-finite frequencies.
pub fn frequency_to_note(freq: f32) -> Option<NoteReading> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    Some(pitch_to_note(pitch_number(freq)))
}

/// Continuous MIDI-style pitch number of a frequency.
pub fn pitch_number(freq: f32) -> f64 {
    12.0 * (freq as f64 / A4_FREQUENCY).log2() + A4_MIDI as f64
}

/// Rounds a continuous pitch number to the nearest semitone.
///
/// Ties (exactly half a semitone) round away from zero, so they land on the
/// upper semitone with a deviation of -50 cents. Cents are floored, so the
/// deviation never reaches +50.
pub fn pitch_to_note(pitch: f64) -> NoteReading {
    let rounded = pitch.round();
    let cents = ((pitch - rounded) * 100.0).floor() as i32;
    let midi = rounded as i32;
    NoteReading {
        note: NoteName::from_midi(midi),
        cents,
        midi,
    }
}

/// Equal-tempered frequency of a MIDI note.
pub fn note_frequency(midi: i32) -> f32 {
    (A4_FREQUENCY * 2f64.powf((midi - A4_MIDI) as f64 / 12.0)) as f32
}

/// Scientific pitch octave of a MIDI note (middle C = C4 = 60).
pub fn octave_of(midi: i32) -> i32 {
    midi.div_euclid(12) - 1
}
