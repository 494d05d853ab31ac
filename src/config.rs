//! Configuration system for the stem-to-chart converter

use crate::analysis::InstrumentCategory;
use crate::tempo::Resolution;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub resolution: ResolutionConfig,
    pub gate: GateConfig,
    pub onset: OnsetConfig,
    pub categories: CategoriesConfig,
    pub mapper: MapperConfig,
    pub stems: StemsConfig,
    pub export: ExportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            resolution: ResolutionConfig::default(),
            gate: GateConfig::default(),
            onset: OnsetConfig::default(),
            categories: CategoriesConfig::default(),
            mapper: MapperConfig::default(),
            stems: StemsConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

/// Tick grid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Ticks per beat used when the chart does not declare one
    pub ticks_per_beat: u32,
    /// Prefer the `Resolution` declared in the chart's `[Song]` section
    pub prefer_chart_resolution: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: 192,
            prefer_chart_resolution: true,
        }
    }
}

impl ResolutionConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.ticks_per_beat)
    }
}

/// RMS energy gate framing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub frame_length: usize,
    pub hop_length: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
        }
    }
}

/// Onset strength and peak picking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub window: String,
    pub n_mels: usize,
    /// Frame distance of the spectral difference
    pub lag: usize,
    /// Dynamic range floor below the loudest bin, in dB
    pub top_db: f32,
    pub pre_max_sec: f32,
    pub post_max_sec: f32,
    pub pre_avg_sec: f32,
    pub post_avg_sec: f32,
    pub wait_sec: f32,
    /// Margin above the local mean a peak must clear (normalized envelope)
    pub delta: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            window: "hann".to_string(),
            n_mels: 128,
            lag: 1,
            top_db: 80.0,
            pre_max_sec: 0.03,
            post_max_sec: 0.0,
            pre_avg_sec: 0.10,
            post_avg_sec: 0.10,
            wait_sec: 0.03,
            delta: 0.07,
        }
    }
}

/// Per-category gate threshold and dedup gap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryParams {
    pub energy_threshold: f32,
    pub min_gap_sec: Option<f64>,
}

impl CategoryParams {
    pub fn defaults_for(category: InstrumentCategory) -> Self {
        Self {
            energy_threshold: category.energy_threshold(),
            min_gap_sec: category.min_hit_gap_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoriesConfig {
    pub kick: CategoryParams,
    pub snare: CategoryParams,
    pub other_drums: CategoryParams,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            kick: CategoryParams::defaults_for(InstrumentCategory::Kick),
            snare: CategoryParams::defaults_for(InstrumentCategory::Snare),
            other_drums: CategoryParams::defaults_for(InstrumentCategory::OtherDrums),
        }
    }
}

impl CategoriesConfig {
    pub fn params(&self, category: InstrumentCategory) -> &CategoryParams {
        match category {
            InstrumentCategory::Kick => &self.kick,
            InstrumentCategory::Snare => &self.snare,
            InstrumentCategory::OtherDrums => &self.other_drums,
        }
    }
}

/// Time-to-tick search guard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Longest song the mapper is expected to seek into
    pub max_song_seconds: f64,
    /// Fastest tempo the guard budgets steps for
    pub max_bpm: f64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            max_song_seconds: 3600.0,
            max_bpm: 1000.0,
        }
    }
}

/// Stem discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StemsConfig {
    pub extensions: Vec<String>,
}

impl Default for StemsConfig {
    fn default() -> Self {
        Self {
            extensions: vec![
                "mp3".to_string(),
                "wav".to_string(),
                "ogg".to_string(),
                "flac".to_string(),
            ],
        }
    }
}

/// Chart export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_file: String,
    pub section_name: String,
    pub write_report: bool,
    pub report_file: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_file: "output.chart".to_string(),
            section_name: "ExpertDrums".to_string(),
            write_report: false,
            report_file: "analysis.json".to_string(),
        }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.resolution.ticks_per_beat < 2 {
        anyhow::bail!("resolution.ticks_per_beat must be >= 2");
    }

    if config.gate.frame_length == 0 || config.gate.hop_length == 0 {
        anyhow::bail!("gate frame_length and hop_length must be > 0");
    }

    if config.onset.n_fft < 2 || config.onset.hop_length == 0 {
        anyhow::bail!("onset n_fft must be >= 2 and hop_length > 0");
    }

    if config.onset.n_mels == 0 || config.onset.lag == 0 {
        anyhow::bail!("onset n_mels and lag must be > 0");
    }

    if config.onset.top_db <= 0.0 {
        anyhow::bail!("onset.top_db must be > 0");
    }

    for category in InstrumentCategory::ALL {
        let params = config.categories.params(category);
        if !(params.energy_threshold >= 0.0) {
            anyhow::bail!("{} energy_threshold must be >= 0", category.name());
        }
        if let Some(gap) = params.min_gap_sec {
            if !(gap >= 0.0) {
                anyhow::bail!("{} min_gap_sec must be >= 0", category.name());
            }
        }
    }

    if !(config.mapper.max_song_seconds > 0.0) || !(config.mapper.max_bpm > 0.0) {
        anyhow::bail!("mapper max_song_seconds and max_bpm must be > 0");
    }

    if config.stems.extensions.is_empty() {
        anyhow::bail!("stems.extensions must list at least one extension");
    }

    if config.export.section_name.trim().is_empty() {
        anyhow::bail!("export.section_name must not be empty");
    }

    Ok(())
}

/// [`validate_config`] as a library error
pub fn check_config(config: &Config) -> crate::Result<()> {
    validate_config(config)
        .map_err(|e| crate::error::ChartError::InvalidConfigParameter(e.to_string()))
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
