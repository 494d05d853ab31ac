//! Pass 1: Onset Detection

use crate::audio::StemState;
use crate::config::{Config, OnsetConfig};
use crate::error::{ChartError, Result as ChartResult};
use crate::spectral::{mel_spectrogram, onset_strength, power_to_db, SpectrogramParams};
use std::iter::FusedIterator;
use tracing::debug;

/// Peak picking windows, in frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakPickParams {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub wait: usize,
    pub delta: f32,
}

impl PeakPickParams {
    /// Convert second-based windows to frames at the onset hop
    pub fn from_config(cfg: &OnsetConfig, sample_rate: u32) -> Self {
        let frames = |sec: f32| -> usize {
            let f = sec as f64 * sample_rate as f64 / cfg.hop_length as f64;
            if f.is_finite() && f > 0.0 {
                f.floor() as usize
            } else {
                0
            }
        };

        Self {
            pre_max: frames(cfg.pre_max_sec),
            post_max: frames(cfg.post_max_sec) + 1,
            pre_avg: frames(cfg.pre_avg_sec),
            post_avg: frames(cfg.post_avg_sec) + 1,
            wait: frames(cfg.wait_sec),
            delta: cfg.delta,
        }
    }
}

/// Normalized onset strength envelope of a waveform
pub fn onset_envelope(samples: &[f32], sample_rate: u32, cfg: &OnsetConfig) -> Vec<f32> {
    let params = SpectrogramParams {
        n_fft: cfg.n_fft,
        hop_length: cfg.hop_length,
        window: cfg.window.clone(),
        n_mels: cfg.n_mels,
    };

    let mut mel = mel_spectrogram(samples, sample_rate, &params);
    power_to_db(&mut mel, cfg.top_db);

    let delay = cfg.n_fft / (2 * cfg.hop_length);
    let mut envelope = onset_strength(&mel, cfg.lag, delay);
    normalize_envelope(&mut envelope);
    envelope
}

/// Shift to a zero minimum and scale to a unit maximum.
///
/// A flat envelope becomes all zeros.
pub fn normalize_envelope(envelope: &mut [f32]) {
    let min = envelope.iter().cloned().fold(f32::INFINITY, f32::min);
    if !min.is_finite() {
        envelope.iter_mut().for_each(|v| *v = 0.0);
        return;
    }

    envelope.iter_mut().for_each(|v| *v -= min);
    let max = envelope.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        envelope.iter_mut().for_each(|v| *v /= max);
    }
}

/// Onset times in seconds, picked lazily from an onset strength envelope.
///
/// A frame `n` is an onset when it is the maximum of
/// `[n - pre_max, n + post_max)`, reaches the mean of
/// `[n - pre_avg, n + post_avg)` plus `delta`, and lies more than `wait`
/// frames after the previous onset. Times come out strictly increasing.
#[derive(Debug, Clone)]
pub struct Onsets {
    envelope: Vec<f32>,
    prefix: Vec<f64>,
    params: PeakPickParams,
    seconds_per_frame: f64,
    next_frame: usize,
    last_onset: Option<usize>,
}

impl Onsets {
    pub fn new(envelope: Vec<f32>, params: PeakPickParams, sample_rate: u32, hop_length: usize) -> Self {
        let mut prefix = Vec::with_capacity(envelope.len() + 1);
        prefix.push(0.0f64);
        let mut acc = 0.0f64;
        for &v in &envelope {
            acc += v as f64;
            prefix.push(acc);
        }

        // An envelope with no energy has nothing to pick
        let next_frame = if envelope.iter().any(|&v| v != 0.0) {
            0
        } else {
            envelope.len()
        };

        Self {
            envelope,
            prefix,
            params,
            seconds_per_frame: hop_length as f64 / sample_rate.max(1) as f64,
            next_frame,
            last_onset: None,
        }
    }

    pub fn envelope(&self) -> &[f32] {
        &self.envelope
    }

    fn window(&self, n: usize, before: usize, after: usize) -> (usize, usize) {
        let start = n.saturating_sub(before);
        let end = (n + after).min(self.envelope.len());
        (start, end.max(start))
    }

    fn is_peak(&self, n: usize) -> bool {
        let x = self.envelope[n];
        let p = &self.params;

        let (start, end) = self.window(n, p.pre_max, p.post_max);
        let local_max = self.envelope[start..end]
            .iter()
            .cloned()
            .fold(f32::NEG_INFINITY, f32::max);
        if x != local_max {
            return false;
        }

        let (start, end) = self.window(n, p.pre_avg, p.post_avg);
        if end == start {
            return false;
        }
        let mean = (self.prefix[end] - self.prefix[start]) / (end - start) as f64;
        x as f64 >= mean + p.delta as f64
    }
}

impl Iterator for Onsets {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        while self.next_frame < self.envelope.len() {
            let n = self.next_frame;
            self.next_frame += 1;

            if let Some(last) = self.last_onset {
                if n <= last + self.params.wait {
                    continue;
                }
            }

            if self.is_peak(n) {
                self.last_onset = Some(n);
                return Some(n as f64 * self.seconds_per_frame);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.envelope.len() - self.next_frame))
    }
}

impl FusedIterator for Onsets {}

/// Detect onsets in a (gated) waveform
pub fn detect_onsets(samples: &[f32], sample_rate: u32, cfg: &OnsetConfig) -> Onsets {
    let envelope = onset_envelope(samples, sample_rate, cfg);
    let params = PeakPickParams::from_config(cfg, sample_rate);
    Onsets::new(envelope, params, sample_rate, cfg.hop_length)
}

pub fn run(state: &mut StemState, config: &Config) -> ChartResult<()> {
    let gated = state.gated.as_ref().ok_or_else(|| {
        ChartError::ProcessingPipelineError(format!(
            "onset detection for {} needs the gated waveform from pass 0",
            state.category
        ))
    })?;

    let onsets = detect_onsets(gated, state.waveform.sample_rate(), &config.onset);

    debug!(
        "Pass 1 ({}): onset envelope over {} frames",
        state.category,
        onsets.envelope().len()
    );

    state.onsets = Some(onsets);

    Ok(())
}
