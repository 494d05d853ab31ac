//! Instrument categories, hit/note records and the JSON analysis report

use crate::tempo::{Resolution, TempoChangePoint, TempoMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Percussion stem category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentCategory {
    Kick,
    Snare,
    OtherDrums,
}

impl InstrumentCategory {
    /// Every category, in processing order
    pub const ALL: [InstrumentCategory; 3] = [
        InstrumentCategory::Kick,
        InstrumentCategory::Snare,
        InstrumentCategory::OtherDrums,
    ];

    /// Note id written to the chart's drum section
    pub fn note_id(&self) -> u8 {
        match self {
            InstrumentCategory::Kick => 0,
            InstrumentCategory::Snare => 1,
            InstrumentCategory::OtherDrums => 2,
        }
    }

    /// Stem filename prefix
    pub fn file_prefix(&self) -> &'static str {
        match self {
            InstrumentCategory::Kick => "kick-",
            InstrumentCategory::Snare => "snare-",
            InstrumentCategory::OtherDrums => "drums-other-",
        }
    }

    /// Minimum frame RMS for the energy gate to let a frame through
    pub fn energy_threshold(&self) -> f32 {
        match self {
            InstrumentCategory::Kick => 0.10,
            InstrumentCategory::Snare => 0.05,
            InstrumentCategory::OtherDrums => 0.005,
        }
    }

    /// Minimum spacing between kept hits, if the category enforces one
    pub fn min_hit_gap_sec(&self) -> Option<f64> {
        match self {
            InstrumentCategory::Kick => Some(0.10),
            InstrumentCategory::Snare | InstrumentCategory::OtherDrums => None,
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            InstrumentCategory::Kick => "kick",
            InstrumentCategory::Snare => "snare",
            InstrumentCategory::OtherDrums => "drums-other",
        }
    }

    /// Classify a stem by filename prefix.
    ///
    /// `drums-other-` is tested before `snare-` and `kick-`.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        [
            InstrumentCategory::OtherDrums,
            InstrumentCategory::Snare,
            InstrumentCategory::Kick,
        ]
        .into_iter()
        .find(|category| file_name.starts_with(category.file_prefix()))
    }
}

impl std::fmt::Display for InstrumentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A detected hit in wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    pub instrument: InstrumentCategory,
    pub time_seconds: f64,
}

impl HitEvent {
    pub fn new(instrument: InstrumentCategory, time_seconds: f64) -> Self {
        Self {
            instrument,
            time_seconds,
        }
    }
}

/// A hit placed on the chart's tick grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub instrument: InstrumentCategory,
    pub tick: u64,
}

/// Per-stem summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StemReport {
    pub category: InstrumentCategory,
    pub path: Option<PathBuf>,
    pub hits: usize,
}

/// Analysis results structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub version: String,
    pub ticks_per_beat: u32,
    pub step_ticks: u32,
    pub tempo_map: Vec<TempoChangePoint>,
    pub stems: Vec<StemReport>,
    pub total_hits: usize,
    pub total_notes: usize,
    pub notes_per_category: BTreeMap<InstrumentCategory, usize>,
    pub first_tick: Option<u64>,
    pub last_tick: Option<u64>,
}

impl AnalysisReport {
    pub fn build(
        stems: Vec<StemReport>,
        tempo_map: &TempoMap,
        resolution: Resolution,
        notes: &[Note],
    ) -> Self {
        let mut notes_per_category = BTreeMap::new();
        for note in notes {
            *notes_per_category.entry(note.instrument).or_insert(0) += 1;
        }

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            ticks_per_beat: resolution.ticks_per_beat(),
            step_ticks: resolution.step_ticks(),
            tempo_map: tempo_map.change_points().collect(),
            total_hits: stems.iter().map(|s| s.hits).sum(),
            stems,
            total_notes: notes.len(),
            notes_per_category,
            first_tick: notes.iter().map(|n| n.tick).min(),
            last_tick: notes.iter().map(|n| n.tick).max(),
        }
    }
}

/// Export analysis results to JSON
pub fn export_analysis(report: &AnalysisReport, path: &Path) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;

    tracing::info!("Exported analysis report to {}", path.display());
    Ok(())
}
