//! # Engine Configuration
//!
//! Tunables for the metronome scheduler and the pitch detector. Every field
//! has a default, so partial configuration files deserialize cleanly.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Smallest frame the detector accepts. The lag search covers half a frame,
/// so anything shorter cannot hold a period in the guitar and voice range.
pub const MIN_FRAME_SIZE: usize = 64;

/// Root engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub metronome: MetronomeConfig,
    pub detector: DetectorConfig,
}

/// Lookahead scheduler timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Wall-clock cadence of the scheduling pass
    pub poll_interval_ms: u64,
    /// How far ahead of the audio clock clicks are scheduled
    pub lookahead_ms: u64,
    /// Length of each synthesized click
    pub click_duration_ms: u64,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 25,
            lookahead_ms: 100,
            click_duration_ms: 50,
        }
    }
}

impl MetronomeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Lookahead window in audio-clock seconds.
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }

    pub fn click_duration_secs(&self) -> f32 {
        self.click_duration_ms as f32 / 1000.0
    }
}

/// Autocorrelation detector parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Samples per analysed frame
    pub frame_size: usize,
    /// Frames with a lower RMS are treated as silence
    pub rms_threshold: f32,
    /// Similarity a lag must reach to count as a period candidate
    pub correlation_threshold: f32,
    /// Floor below which the best lag is discarded
    pub min_correlation: f32,
    /// Sample rate requested from the input device
    pub preferred_sample_rate: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            rms_threshold: 0.01,
            correlation_threshold: 0.9,
            min_correlation: 0.01,
            preferred_sample_rate: 44100,
        }
    }
}

impl DetectorConfig {
    /// Rejects settings the input callback or the analysis cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.frame_size < MIN_FRAME_SIZE {
            return Err(EngineError::UnsupportedConfig(format!(
                "frame size {} is below the minimum of {}",
                self.frame_size, MIN_FRAME_SIZE
            )));
        }
        if self.preferred_sample_rate == 0 {
            return Err(EngineError::UnsupportedConfig(
                "preferred sample rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
