//! Spectral processing utilities (framing, mel spectrogram, onset strength)

use ndarray::{Array2, Axis};
use rustfft::{num_complex::Complex32, FftPlanner};

/// Smallest power value fed to the log
const POWER_FLOOR: f32 = 1e-10;

/// Short-time analysis geometry
#[derive(Debug, Clone)]
pub struct SpectrogramParams {
    pub n_fft: usize,
    pub hop_length: usize,
    pub window: String,
    pub n_mels: usize,
}

impl SpectrogramParams {
    /// Number of frames a centered analysis of `n_samples` produces
    pub fn n_frames(&self, n_samples: usize) -> usize {
        let padded = n_samples + 2 * (self.n_fft / 2);
        if padded < self.n_fft {
            0
        } else {
            1 + (padded - self.n_fft) / self.hop_length
        }
    }
}

/// Centered mel power spectrogram, shape `(n_mels, n_frames)`.
///
/// Frames are computed one at a time and folded into mel bands right away, so
/// the full complex STFT is never held in memory.
pub fn mel_spectrogram(y: &[f32], sample_rate: u32, params: &SpectrogramParams) -> Array2<f32> {
    let n_fft = params.n_fft;
    let n_bins = n_fft / 2 + 1;
    let n_frames = params.n_frames(y.len());

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window_fn = generate_window(&params.window, n_fft);
    let filters = mel_filterbank(sample_rate, n_fft, params.n_mels);

    let pad = n_fft / 2;
    let mut mel = Array2::<f32>::zeros((params.n_mels, n_frames));
    let mut frame = vec![Complex32::new(0.0, 0.0); n_fft];
    let mut power = vec![0.0f32; n_bins];

    for frame_idx in 0..n_frames {
        let start = frame_idx * params.hop_length;

        // Zero padding on both ends
        for (i, slot) in frame.iter_mut().enumerate() {
            let sample = (start + i)
                .checked_sub(pad)
                .and_then(|idx| y.get(idx))
                .copied()
                .unwrap_or(0.0);
            *slot = Complex32::new(sample * window_fn[i], 0.0);
        }

        fft.process(&mut frame);

        for (p, c) in power.iter_mut().zip(&frame[..n_bins]) {
            *p = c.norm_sqr();
        }

        for (band, weights) in filters.axis_iter(Axis(0)).enumerate() {
            mel[[band, frame_idx]] = weights.iter().zip(&power).map(|(&w, &p)| w * p).sum();
        }
    }

    mel
}

/// Convert power to dB in place, flooring at `max_db - top_db`
pub fn power_to_db(spec: &mut Array2<f32>, top_db: f32) {
    spec.mapv_inplace(|p| 10.0 * p.max(POWER_FLOOR).log10());

    let max_db = spec.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if max_db.is_finite() {
        let floor = max_db - top_db;
        spec.mapv_inplace(|db| db.max(floor));
    }
}

/// Spectral-flux onset strength envelope, one value per frame.
///
/// Each value is the mean over bands of the positive difference between a
/// frame and the one `lag` frames earlier. The result is shifted right by
/// `lag + delay` frames (zero-filled) and cut to the input frame count, so a
/// centered analysis lines up with the sample where the energy rises.
pub fn onset_strength(spec_db: &Array2<f32>, lag: usize, delay: usize) -> Vec<f32> {
    let (n_bands, n_frames) = spec_db.dim();
    let mut envelope = vec![0.0f32; n_frames];

    if lag == 0 || n_frames <= lag || n_bands == 0 {
        return envelope;
    }

    let shift = lag + delay;
    for j in 0..(n_frames - lag) {
        let target = j + shift;
        if target >= n_frames {
            break;
        }

        let flux: f32 = (0..n_bands)
            .map(|b| (spec_db[[b, j + lag]] - spec_db[[b, j]]).max(0.0))
            .sum();
        envelope[target] = flux / n_bands as f32;
    }

    envelope
}

/// Generate window function
fn generate_window(window_type: &str, size: usize) -> Vec<f32> {
    match window_type {
        // Periodic Hann, as used for spectral analysis
        "hann" => (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
            .collect(),
        _ => vec![1.0; size], // Rectangular window as fallback
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    // Slaney scale: linear to 1 kHz, logarithmic above
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f32.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        min_log_mel + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f32.ln() / 27.0;

    if mel >= min_log_mel {
        MIN_LOG_HZ * (logstep * (mel - min_log_mel)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular, area-normalized mel filters over `0..=sr/2`, shape `(n_mels, n_fft/2 + 1)`
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let mut weights = Array2::<f32>::zeros((n_mels, n_bins));
    if n_mels == 0 {
        return weights;
    }

    let fft_freqs: Vec<f32> = (0..n_bins)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);
    let mel_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f32 / (n_mels + 1) as f32))
        .collect();

    for m in 0..n_mels {
        let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let norm = 2.0 / (hi - lo);

        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - lo) / (center - lo);
            let upper = (hi - f) / (hi - center);
            weights[[m, k]] = lower.min(upper).max(0.0) * norm;
        }
    }

    weights
}
