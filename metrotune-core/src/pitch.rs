//! # Pitch Detection Module
//!
//! Monophonic pitch estimation by time-domain autocorrelation, tuned for
//! single voices and guitar strings.
//!
//! ## Features
//! - RMS noise gate to reject silence and background hiss
//! - Mean-absolute-difference similarity over all candidate lags
//! - Peak tracking above a confidence threshold
//! - Parabolic interpolation for sub-sample period accuracy

use crate::config::DetectorConfig;
use crate::note::frequency_to_note;
use crate::PitchEstimate;

/// Root-mean-square amplitude of a frame.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Estimates the fundamental frequency of a frame by autocorrelation.
///
/// # Arguments
/// * `signal` - Normalized samples in [-1.0, 1.0]
/// * `sample_rate` - Sample rate in Hz
/// * `config` - Gate and threshold settings
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - Silence, noise, or no periodicity above the thresholds
pub fn autocorrelate(signal: &[f32], sample_rate: u32, config: &DetectorConfig) -> Option<f32> {
    // --- Noise Gate ---
    if rms(signal) < config.rms_threshold {
        return None;
    }

    // Compare the first half of the frame against every shift that still fits.
    let max_lag = signal.len() / 2;
    if max_lag < 3 {
        return None;
    }
    let window = &signal[..max_lag];
    let mut correlations = vec![0.0f32; max_lag];

    let mut best_offset = 0usize;
    let mut best_correlation = 0.0f32;
    let mut last_correlation = 1.0f32;
    let mut found_good_correlation = false;

    for offset in 0..max_lag {
        // --- Similarity: 1 - mean absolute difference ---
        let difference: f32 = window
            .iter()
            .zip(&signal[offset..offset + max_lag])
            .map(|(a, b)| (a - b).abs())
            .sum();
        let correlation = 1.0 - difference / max_lag as f32;
        correlations[offset] = correlation;

        // A candidate must clear the threshold while still climbing, which
        // skips the trivially high similarity around lag zero.
        if correlation > config.correlation_threshold && correlation > last_correlation {
            found_good_correlation = true;
            if correlation > best_correlation {
                best_correlation = correlation;
                best_offset = offset;
            }
        } else if found_good_correlation {
            // Past the first clean peak: refine and stop scanning.
            let period = refine_lag(&correlations, best_offset);
            return lag_to_frequency(sample_rate, period);
        }
        last_correlation = correlation;
    }

    if best_correlation > config.min_correlation && best_offset > 0 {
        return lag_to_frequency(sample_rate, best_offset as f32);
    }
    None
}

/// Parabolic interpolation over the correlation values around `peak`.
///
/// Falls back to the integer lag when the neighbours are missing or flat.
fn refine_lag(correlations: &[f32], peak: usize) -> f32 {
    if peak == 0 || peak + 1 >= correlations.len() {
        return peak as f32;
    }
    let y1 = correlations[peak - 1];
    let y2 = correlations[peak];
    let y3 = correlations[peak + 1];

    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < 1e-9 {
        return peak as f32;
    }
    let shift = ((y1 - y3) / (2.0 * denominator)).clamp(-1.0, 1.0);
    peak as f32 + shift
}

fn lag_to_frequency(sample_rate: u32, lag: f32) -> Option<f32> {
    if lag <= 0.0 {
        return None;
    }
    let frequency = sample_rate as f32 / lag;
    if frequency.is_finite() && frequency > 0.0 {
        Some(frequency)
    } else {
        None
    }
}

/// Runs the full pipeline on one frame: gate, autocorrelation, note mapping.
///
/// Returns `None` whenever there is no reliable pitch in the frame.
pub fn estimate_pitch(
    signal: &[f32],
    sample_rate: u32,
    config: &DetectorConfig,
) -> Option<PitchEstimate> {
    let frequency_hz = autocorrelate(signal, sample_rate, config)?;
    let reading = frequency_to_note(frequency_hz)?;
    Some(PitchEstimate {
        frequency_hz,
        note: reading.note,
        cents: reading.cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::NoteName;

    const SAMPLE_RATE: u32 = 44100;

    fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        let error = (actual - expected).abs() / expected;
        assert!(
            error <= tolerance,
            "expected {} Hz within {:.1}%, got {} Hz",
            expected,
            tolerance * 100.0,
            actual
        );
    }

    #[test]
    fn test_rms_of_known_signals() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0; 64]), 0.0);
        assert!((rms(&[0.5; 64]) - 0.5).abs() < 1e-6);
        let wave = sine(100.0, 1.0, SAMPLE_RATE, 4410);
        assert!((rms(&wave) - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_silent_frame_has_no_pitch() {
        let config = DetectorConfig::default();
        let frame = vec![0.0; config.frame_size];
        assert!(autocorrelate(&frame, SAMPLE_RATE, &config).is_none());
        assert!(estimate_pitch(&frame, SAMPLE_RATE, &config).is_none());
    }

    #[test]
    fn test_quiet_signal_is_gated() {
        let config = DetectorConfig::default();
        let frame = sine(220.0, 0.005, SAMPLE_RATE, config.frame_size);
        assert!(rms(&frame) < config.rms_threshold);
        assert!(estimate_pitch(&frame, SAMPLE_RATE, &config).is_none());
    }

    #[test]
    fn test_a3_sine_is_detected() {
        let config = DetectorConfig::default();
        let frame = sine(220.0, 0.5, SAMPLE_RATE, config.frame_size);
        let estimate = estimate_pitch(&frame, SAMPLE_RATE, &config).unwrap();
        assert_close(estimate.frequency_hz, 220.0, 0.01);
        assert_eq!(estimate.note, NoteName::A);
        assert!(estimate.cents.abs() <= 10, "cents = {}", estimate.cents);
    }

    #[test]
    fn test_guitar_and_voice_range() {
        let config = DetectorConfig::default();
        for (freq, note) in [
            (82.41, NoteName::E),
            (110.0, NoteName::A),
            (196.0, NoteName::G),
            (329.63, NoteName::E),
            (440.0, NoteName::A),
            (659.25, NoteName::E),
        ] {
            let frame = sine(freq, 0.4, SAMPLE_RATE, config.frame_size);
            let estimate = estimate_pitch(&frame, SAMPLE_RATE, &config)
                .unwrap_or_else(|| panic!("no estimate for {} Hz", freq));
            assert_close(estimate.frequency_hz, freq, 0.01);
            assert_eq!(estimate.note, note, "{} Hz", freq);
        }
    }

    #[test]
    fn test_other_sample_rate() {
        let config = DetectorConfig::default();
        let frame = sine(261.63, 0.6, 48000, config.frame_size);
        let estimate = estimate_pitch(&frame, 48000, &config).unwrap();
        assert_close(estimate.frequency_hz, 261.63, 0.01);
        assert_eq!(estimate.note, NoteName::C);
    }

    #[test]
    fn test_interpolation_beats_integer_resolution() {
        // 441.7 Hz has a period of ~99.84 samples at 44.1 kHz; the integer lag
        // alone would read 441.0 or 445.5 Hz.
        let config = DetectorConfig::default();
        let frame = sine(441.7, 0.5, SAMPLE_RATE, config.frame_size);
        let frequency = autocorrelate(&frame, SAMPLE_RATE, &config).unwrap();
        assert!((frequency - 441.7).abs() < 0.7, "got {}", frequency);
    }

    #[test]
    fn test_refine_lag_handles_edges() {
        let correlations = [1.0, 0.5, 0.9, 0.95, 0.9];
        assert_eq!(refine_lag(&correlations, 0), 0.0);
        assert_eq!(refine_lag(&correlations, 4), 4.0);
        assert!((refine_lag(&correlations, 3) - 3.0).abs() < 1e-6);
        let flat = [0.5, 0.5, 0.5];
        assert_eq!(refine_lag(&flat, 1), 1.0);
    }

    #[test]
    fn test_tiny_frames_are_rejected() {
        let config = DetectorConfig::default();
        assert!(autocorrelate(&[0.5, -0.5, 0.5, -0.5], SAMPLE_RATE, &config).is_none());
    }
}
