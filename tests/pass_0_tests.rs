//! Validation tests for Pass 0: Energy Gate

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stem2chart::analysis::InstrumentCategory;
use stem2chart::audio::{StemState, Waveform};
use stem2chart::config::Config;
use stem2chart::passes::pass_0::{apply_gate, compute_energy_mask, frame_rms, run};

/// Low-level noise with one loud burst
fn generate_noisy_burst(sr: usize, burst_at: usize, burst_len: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut samples: Vec<f32> = (0..sr).map(|_| rng.gen_range(-0.01..0.01)).collect();
    for (i, s) in samples[burst_at..burst_at + burst_len].iter_mut().enumerate() {
        *s = 0.7 * (i as f32 * 0.2).sin();
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_length_for_awkward_sizes() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let len = rng.gen_range(0..20_000);
            let frame = rng.gen_range(1..4096);
            let hop = rng.gen_range(1..2048);
            let samples = vec![0.3f32; len];

            let mask = compute_energy_mask(&samples, frame, hop, 0.1);
            assert_eq!(mask.expand(len).len(), len);
            assert_eq!(apply_gate(&samples, &mask).len(), len);
        }
    }

    #[test]
    fn test_noise_floor_is_removed() {
        let samples = generate_noisy_burst(22050, 11025, 4096);
        let mask = compute_energy_mask(&samples, 2048, 512, 0.10);
        let gated = apply_gate(&samples, &mask);

        assert!(gated[..8000].iter().all(|&s| s == 0.0));
        assert!(gated[19000..].iter().all(|&s| s == 0.0));
        assert!(gated[12000..14000].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_category_thresholds_differ() {
        // RMS around 0.02: above the other-drums gate, below snare and kick
        let samples: Vec<f32> = (0..22050).map(|i| 0.028 * (i as f32 * 0.1).sin()).collect();
        let rms = frame_rms(&samples, 2048, 512);
        assert!(rms[10] > 0.005 && rms[10] < 0.05);

        let config = Config::default();
        let mut passed = Vec::new();
        for category in InstrumentCategory::ALL {
            let waveform = Waveform::new(samples.clone(), 22050).unwrap();
            let mut state = StemState::new(category, waveform);
            run(&mut state, &config).unwrap();
            let gated = state.gated.unwrap();
            passed.push(gated.iter().any(|&s| s != 0.0));
            assert_eq!(gated.len(), samples.len());
        }

        // Order of InstrumentCategory::ALL: kick, snare, other drums
        assert_eq!(passed, vec![false, false, true]);
    }

    #[test]
    fn test_run_fills_state() {
        let samples = generate_noisy_burst(22050, 5000, 2048);
        let waveform = Waveform::new(samples, 22050).unwrap();
        let mut state = StemState::new(InstrumentCategory::Kick, waveform);

        run(&mut state, &Config::default()).unwrap();

        let mask = state.energy_mask.as_ref().unwrap();
        assert_eq!(mask.n_frames(), 1 + 22050 / 512);
        assert!(mask.active_ratio() > 0.0);
    }
}
