//! Stem-to-Chart Conversion System
//!
//! Turns isolated drum stems (kick, snare, other drums) into a tempo-quantized
//! `.chart` note section: each stem is energy-gated, onsets are picked from
//! its spectral flux, close kicks are merged, and every hit is snapped to the
//! tick grid of the song's tempo map.

pub mod analysis;
pub mod audio;
pub mod chart;
pub mod config;
pub mod error;
pub mod mapper;
pub mod passes;
pub mod spectral;
pub mod stems;
pub mod tempo;

pub use analysis::{AnalysisReport, HitEvent, InstrumentCategory, Note, StemReport};
pub use audio::{StemState, Waveform};
pub use chart::ChartDocument;
pub use config::Config;
pub use error::{ChartError, Result};
pub use mapper::SearchGuard;
pub use stems::StemSet;
pub use tempo::{Resolution, TempoMap};

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Hit times in seconds for one waveform of the given category
pub fn extract_hits(
    waveform: Waveform,
    category: InstrumentCategory,
    config: &Config,
) -> Result<Vec<f64>> {
    config::check_config(config)?;
    let mut state = StemState::new(category, waveform);
    run_pipeline(&mut state, config)?;
    Ok(state.hits)
}

/// Execute the per-stem passes in order
fn run_pipeline(state: &mut StemState, config: &Config) -> Result<()> {
    // Pass 0: Energy Gate
    passes::pass_0::run(state, config)?;

    // Pass 1: Onset Detection
    passes::pass_1::run(state, config)?;

    // Pass 2: Hit Deduplication
    passes::pass_2::run(state, config)?;

    Ok(())
}

/// Result of converting one song
#[derive(Debug, Clone)]
pub struct Conversion {
    pub tempo_map: TempoMap,
    pub resolution: Resolution,
    pub stems: Vec<StemReport>,
    pub notes: Vec<Note>,
}

impl Conversion {
    pub fn report(&self) -> AnalysisReport {
        AnalysisReport::build(
            self.stems.clone(),
            &self.tempo_map,
            self.resolution,
            &self.notes,
        )
    }
}

/// Main processing pipeline for stem-to-chart conversion
pub struct StemToChart {
    config: Config,
}

impl StemToChart {
    /// Create a new processor, rejecting configurations the passes cannot run with
    pub fn new(config: Config) -> Result<Self> {
        config::check_config(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load one stem file and extract its hits
    pub fn extract_stem<P: AsRef<Path>>(
        &self,
        category: InstrumentCategory,
        path: P,
    ) -> Result<Vec<f64>> {
        let mut state = StemState::load(category, path)?;
        run_pipeline(&mut state, &self.config)?;
        Ok(state.hits)
    }

    /// Extract hits from every categorized stem.
    ///
    /// A stem that fails to load contributes zero hits; the others still run.
    pub fn extract_all(&self, stems: &StemSet) -> Result<(Vec<HitEvent>, Vec<StemReport>)> {
        let mut hits = Vec::new();
        let mut reports = Vec::with_capacity(InstrumentCategory::ALL.len());

        for category in InstrumentCategory::ALL {
            let Some(path) = stems.get(category) else {
                debug!("No stem for '{}'", category);
                reports.push(StemReport {
                    category,
                    path: None,
                    hits: 0,
                });
                continue;
            };

            info!("Detecting hits in {}", path.display());
            let times = match self.extract_stem(category, path) {
                Ok(times) => times,
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping '{}' stem: {}", category, e);
                    Vec::new()
                }
                Err(e) => return Err(e),
            };

            info!("Detected {} '{}' hits", times.len(), category);
            reports.push(StemReport {
                category,
                path: Some(path.to_path_buf()),
                hits: times.len(),
            });
            hits.extend(times.into_iter().map(|t| HitEvent::new(category, t)));
        }

        Ok((hits, reports))
    }

    /// Chart resolution if declared and preferred, else the configured one
    pub fn resolve_resolution(&self, chart: &ChartDocument) -> Result<Resolution> {
        if self.config.resolution.prefer_chart_resolution {
            if let Some(resolution) = chart.resolution()? {
                return Ok(resolution);
            }
        }
        Ok(self.config.resolution.resolution())
    }

    /// Convert categorized stems against a chart's tempo map
    pub fn convert(&self, stems: &StemSet, chart: &ChartDocument) -> Result<Conversion> {
        // Tempo map problems are fatal, so check before any audio work
        let tempo_map = chart.sync_track()?;
        let resolution = self.resolve_resolution(chart)?;
        info!(
            "Using {} ticks per beat, {} tempo events",
            resolution.ticks_per_beat(),
            tempo_map.len()
        );

        let (hits, stems) = self.extract_all(stems)?;

        let guard = SearchGuard::from_config(&self.config.mapper, resolution);
        let notes = mapper::map_hits_to_ticks(&hits, &tempo_map, resolution, guard)?;
        info!("Mapped {} hits to {} notes", hits.len(), notes.len());

        Ok(Conversion {
            tempo_map,
            resolution,
            stems,
            notes,
        })
    }

    /// Where the exported chart for `song_dir` goes
    pub fn output_path<P: AsRef<Path>>(&self, song_dir: P) -> PathBuf {
        song_dir.as_ref().join(&self.config.export.output_file)
    }

    /// Convert a song directory and write the chart (and report, if enabled)
    pub fn process<P: AsRef<Path>>(&self, song_dir: P) -> Result<Conversion> {
        let song_dir = song_dir.as_ref();

        let files = stems::list_audio_files(song_dir, &self.config.stems.extensions)?;
        let stem_set = stems::categorize_files(&files);
        if stem_set.is_empty() {
            warn!("No drum stems found in {}", song_dir.display());
        }

        let chart_path = chart::find_chart_file(song_dir)?;
        let document = ChartDocument::load(&chart_path)?;

        let conversion = self.convert(&stem_set, &document)?;

        chart::export_chart(
            &document,
            &conversion.notes,
            self.output_path(song_dir),
            &self.config.export.section_name,
        )?;

        if self.config.export.write_report {
            let report_path = song_dir.join(&self.config.export.report_file);
            analysis::export_analysis(&conversion.report(), &report_path)?;
        }

        Ok(conversion)
    }
}
