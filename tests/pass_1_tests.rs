//! Validation tests for Pass 1: Onset Detection

use stem2chart::analysis::InstrumentCategory;
use stem2chart::audio::{StemState, Waveform};
use stem2chart::config::{Config, OnsetConfig};
use stem2chart::passes::pass_1::{detect_onsets, onset_envelope, PeakPickParams};
use stem2chart::passes::{pass_0, pass_1};

/// Decaying tone bursts starting at the given times
fn generate_click_track(sr: u32, duration_sec: f64, times: &[f64], amplitude: f32) -> Vec<f32> {
    let mut samples = vec![0.0f32; (duration_sec * sr as f64) as usize];
    for &t in times {
        let start = (t * sr as f64) as usize;
        let end = (start + 3000).min(samples.len());
        for (i, s) in samples[start..end].iter_mut().enumerate() {
            *s += amplitude * (i as f32 * 0.4).sin() * (-(i as f32) / 800.0).exp();
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_is_normalized() {
        let samples = generate_click_track(22050, 2.0, &[0.5, 1.2], 0.8);
        let env = onset_envelope(&samples, 22050, &OnsetConfig::default());

        assert_eq!(env.len(), 1 + samples.len() / 512);
        let max = env.iter().cloned().fold(f32::MIN, f32::max);
        let min = env.iter().cloned().fold(f32::MAX, f32::min);
        assert!((max - 1.0).abs() < 1e-6);
        assert_eq!(min, 0.0);
    }

    #[test]
    fn test_onsets_near_click_times() {
        let times = [0.25, 0.75, 1.25, 1.75];
        let samples = generate_click_track(22050, 2.2, &times, 0.8);
        let onsets: Vec<f64> = detect_onsets(&samples, 22050, &OnsetConfig::default()).collect();

        for want in times {
            assert!(
                onsets.iter().any(|t| (t - want).abs() < 0.07),
                "missing onset near {}: {:?}",
                want,
                onsets
            );
        }
        assert!(onsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_onsets_are_lazy_and_fused() {
        let samples = generate_click_track(22050, 1.5, &[0.3, 0.9], 0.8);
        let mut onsets = detect_onsets(&samples, 22050, &OnsetConfig::default());

        let first = onsets.next();
        assert!(first.is_some());
        let rest: Vec<f64> = onsets.by_ref().collect();
        assert!(!rest.is_empty());
        assert_eq!(onsets.next(), None);
        assert_eq!(onsets.next(), None);
    }

    #[test]
    fn test_window_frames_scale_with_rate() {
        let cfg = OnsetConfig::default();
        let at_44k = PeakPickParams::from_config(&cfg, 44100);
        assert_eq!(at_44k.pre_max, 2);
        assert_eq!(at_44k.pre_avg, 8);
        assert_eq!(at_44k.post_avg, 9);
        assert_eq!(at_44k.wait, 2);
    }

    #[test]
    fn test_gated_silence_yields_no_onsets() {
        // Too quiet for the kick gate: everything is zeroed before onset detection
        let samples = generate_click_track(22050, 1.0, &[0.4], 0.02);
        let waveform = Waveform::new(samples, 22050).unwrap();
        let mut state = StemState::new(InstrumentCategory::Kick, waveform);
        let config = Config::default();

        pass_0::run(&mut state, &config).unwrap();
        pass_1::run(&mut state, &config).unwrap();

        assert_eq!(state.onsets.take().unwrap().count(), 0);
    }
}
