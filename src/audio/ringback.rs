//! Generated ringback filler played while a session initializes
//!
//! North American dual-frequency ringback (440 Hz + 480 Hz) in the standard
//! cadence: 2 s ring, 4 s silence, 2 s ring, at telephony sample rate.

use super::SAMPLE_RATE;

const FREQ_LOW: f32 = 440.0;
const FREQ_HIGH: f32 = 480.0;
const AMPLITUDE: f32 = 0.3;

const RING_SECS: f32 = 2.0;
const SILENCE_SECS: f32 = 4.0;

/// Generate the full 8-second ringback pattern as linear PCM
#[must_use]
pub fn ringback_pattern() -> Vec<i16> {
    let mut pcm = ring_tone(RING_SECS);
    pcm.extend(silence(SILENCE_SECS));
    pcm.extend(ring_tone(RING_SECS));
    pcm
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ring_tone(secs: f32) -> Vec<i16> {
    let samples = (SAMPLE_RATE as f32 * secs) as usize;
    (0..samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let low = (2.0 * std::f32::consts::PI * FREQ_LOW * t).sin();
            let high = (2.0 * std::f32::consts::PI * FREQ_HIGH * t).sin();
            // Average the two tones to keep the sum inside full scale
            let combined = (low + high) / 2.0;
            (combined * AMPLITUDE * f32::from(i16::MAX)) as i16
        })
        .collect()
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn silence(secs: f32) -> Vec<i16> {
    vec![0i16; (SAMPLE_RATE as f32 * secs) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_is_eight_seconds() {
        let pcm = ringback_pattern();
        assert_eq!(pcm.len(), SAMPLE_RATE as usize * 8);
    }

    #[test]
    fn middle_segment_is_silent() {
        let pcm = ringback_pattern();
        let mid = &pcm[SAMPLE_RATE as usize * 3..SAMPLE_RATE as usize * 5];
        assert!(mid.iter().all(|&s| s == 0));
    }

    #[test]
    fn ring_segment_has_energy_within_amplitude() {
        let pcm = ringback_pattern();
        let ring = &pcm[..SAMPLE_RATE as usize * 2];
        let peak = ring.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 0);
        assert!(f32::from(u16::try_from(peak).unwrap()) <= AMPLITUDE * f32::from(i16::MAX) + 1.0);
    }
}
