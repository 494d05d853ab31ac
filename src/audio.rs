//! Audio I/O and per-stem analysis state

use crate::analysis::InstrumentCategory;
use crate::error::{ChartError, Result};
use crate::passes::pass_0::EnergyMask;
use crate::passes::pass_1::Onsets;
use hound::WavReader;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Mono audio samples with their sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ChartError::InvalidConfigParameter(
                "sample rate must be > 0".to_string(),
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Analysis state for one stem, filled in pass by pass
#[derive(Debug)]
pub struct StemState {
    pub category: InstrumentCategory,
    pub waveform: Waveform,

    // Pass 0: Energy gate
    /// Frame-level RMS mask
    pub energy_mask: Option<EnergyMask>,
    /// Waveform with low-energy regions zeroed
    pub gated: Option<Vec<f32>>,

    // Pass 1: Onset detection
    /// Pending onsets; taken (and exhausted) by pass 2
    pub onsets: Option<Onsets>,

    // Pass 2: Hit deduplication
    /// Kept hit times in seconds, non-decreasing
    pub hits: Vec<f64>,
}

impl StemState {
    pub fn new(category: InstrumentCategory, waveform: Waveform) -> Self {
        Self {
            category,
            waveform,
            energy_mask: None,
            gated: None,
            onsets: None,
            hits: Vec::new(),
        }
    }

    /// Load a stem file and create initial state
    pub fn load<P: AsRef<Path>>(category: InstrumentCategory, path: P) -> Result<Self> {
        Ok(Self::new(category, load_audio_file(path)?))
    }
}

/// Load audio file as a mono waveform at its native sample rate
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> Result<Waveform> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    let (samples, sr) = match extension.as_str() {
        "wav" => load_wav_file(path)?,
        _ => load_compressed_file(path)?,
    };

    debug!(
        "Loaded {} ({} samples at {} Hz)",
        path.display(),
        samples.len(),
        sr
    );

    Waveform::new(samples, sr).map_err(|e| ChartError::stem_load(path, e))
}

/// Load WAV file
fn load_wav_file(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path).map_err(|e| ChartError::stem_load(path, e))?;
    let spec = reader.spec();

    if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
        return Err(ChartError::stem_load(
            path,
            format!("unsupported bit depth: {}", spec.bits_per_sample),
        ));
    }

    let mut interleaved: Vec<f32> = Vec::with_capacity(reader.len() as usize);
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                let sample = sample.map_err(|e| ChartError::stem_load(path, e))?;
                interleaved.push(sample as f32 / max_value);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                interleaved.push(sample.map_err(|e| ChartError::stem_load(path, e))?);
            }
        }
    }

    Ok((
        downmix(&interleaved, spec.channels as usize),
        spec.sample_rate,
    ))
}

/// Load MP3/OGG/FLAC through symphonia
fn load_compressed_file(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = File::open(path).map_err(|e| ChartError::stem_load(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ChartError::stem_load(path, e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ChartError::stem_load(path, "no audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ChartError::stem_load(path, e))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(ChartError::stem_load(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                // Corrupt frame: skip it, keep the rest of the stream
                debug!("Skipping undecodable packet in {}: {}", path.display(), msg);
                continue;
            }
            Err(e) => return Err(ChartError::stem_load(path, e)),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend(downmix(buffer.samples(), spec.channels.count()));
    }

    let sample_rate =
        sample_rate.ok_or_else(|| ChartError::stem_load(path, "unknown sample rate"))?;

    Ok((samples, sample_rate))
}

/// Average interleaved channels into mono
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
