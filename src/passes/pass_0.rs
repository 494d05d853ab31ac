//! Pass 0: Energy Gate

use crate::audio::StemState;
use crate::config::Config;
use crate::error::Result as ChartResult;
use tracing::debug;

/// Frame-level RMS gate decision
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyMask {
    active: Vec<bool>,
    hop_length: usize,
}

impl EnergyMask {
    pub fn new(active: Vec<bool>, hop_length: usize) -> Self {
        Self {
            active,
            hop_length: hop_length.max(1),
        }
    }

    pub fn frames(&self) -> &[bool] {
        &self.active
    }

    pub fn n_frames(&self) -> usize {
        self.active.len()
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Fraction of frames that pass the gate
    pub fn active_ratio(&self) -> f32 {
        if self.active.is_empty() {
            return 0.0;
        }
        self.active.iter().filter(|&&a| a).count() as f32 / self.active.len() as f32
    }

    /// Sample-resolution mask of exactly `n_samples` entries.
    ///
    /// Each frame value is repeated `ceil(n_samples / n_frames)` times and the
    /// result is cut to `n_samples`; with no frames at all, nothing passes.
    pub fn expand(&self, n_samples: usize) -> Vec<bool> {
        let n_frames = self.active.len();
        if n_frames == 0 || n_samples == 0 {
            return vec![false; n_samples];
        }

        let repeat = n_samples.div_ceil(n_frames);
        (0..n_samples)
            .map(|i| self.active.get(i / repeat).copied().unwrap_or(false))
            .collect()
    }
}

/// Centered, zero-padded frame RMS: `1 + len / hop` frames for even frame lengths
pub fn frame_rms(samples: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    let pad = frame_length / 2;
    let padded_len = samples.len() + 2 * pad;
    if frame_length == 0 || hop_length == 0 || padded_len < frame_length {
        return Vec::new();
    }
    let n_frames = 1 + (padded_len - frame_length) / hop_length;

    // Prefix sums of squares over the unpadded signal
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &s in samples {
        acc += s as f64 * s as f64;
        prefix.push(acc);
    }

    (0..n_frames)
        .map(|t| {
            // Padded window [t*hop, t*hop + frame_length) shifted back to unpadded indices
            let start = (t * hop_length).saturating_sub(pad).min(samples.len());
            let end = (t * hop_length + frame_length)
                .saturating_sub(pad)
                .min(samples.len());
            let energy = prefix[end] - prefix[start];
            (energy / frame_length as f64).max(0.0).sqrt() as f32
        })
        .collect()
}

/// Mark frames whose RMS reaches `threshold`
pub fn compute_energy_mask(
    samples: &[f32],
    frame_length: usize,
    hop_length: usize,
    threshold: f32,
) -> EnergyMask {
    let active = frame_rms(samples, frame_length, hop_length)
        .into_iter()
        .map(|rms| rms >= threshold)
        .collect();
    EnergyMask::new(active, hop_length)
}

/// Zero every sample the mask rejects
pub fn apply_gate(samples: &[f32], mask: &EnergyMask) -> Vec<f32> {
    samples
        .iter()
        .zip(mask.expand(samples.len()))
        .map(|(&s, keep)| if keep { s } else { 0.0 })
        .collect()
}

pub fn run(state: &mut StemState, config: &Config) -> ChartResult<()> {
    let threshold = config.categories.params(state.category).energy_threshold;

    let mask = compute_energy_mask(
        state.waveform.samples(),
        config.gate.frame_length,
        config.gate.hop_length,
        threshold,
    );
    let gated = apply_gate(state.waveform.samples(), &mask);

    debug!(
        "Pass 0 ({}): {}/{} frames (hop {}) above RMS {:.3} ({:.1}%)",
        state.category,
        mask.frames().iter().filter(|&&a| a).count(),
        mask.n_frames(),
        mask.hop_length(),
        threshold,
        mask.active_ratio() * 100.0
    );

    state.energy_mask = Some(mask);
    state.gated = Some(gated);

    Ok(())
}
