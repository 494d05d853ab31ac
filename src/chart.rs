//! `.chart` document reading and note section export

use crate::analysis::Note;
use crate::error::{ChartError, Result};
use crate::tempo::{Resolution, TempoMap};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SYNC_TRACK: &str = "SyncTrack";
const SONG: &str = "Song";

/// One `[Name] { ... }` block
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSection {
    pub name: String,
    /// Body lines with their 1-based line numbers, trimmed
    pub lines: Vec<(usize, String)>,
}

/// A parsed chart file that still carries its original text
#[derive(Debug, Clone)]
pub struct ChartDocument {
    text: String,
    sections: Vec<ChartSection>,
}

impl ChartDocument {
    /// Parse chart text into sections
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let mut sections = Vec::new();
        let mut pending: Option<(usize, String)> = None;
        let mut open: Option<ChartSection> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_start_matches('\u{feff}').trim();
            if line.is_empty() {
                continue;
            }

            if open.is_some() {
                if line == "}" {
                    sections.extend(open.take());
                } else if let Some(section) = open.as_mut() {
                    section.lines.push((line_no, line.to_string()));
                }
                continue;
            }

            if let Some((header_line, name)) = pending.take() {
                if line != "{" {
                    return Err(ChartError::ChartFormatError(format!(
                        "expected '{{' after [{}] on line {}, found '{}' on line {}",
                        name, header_line, line, line_no
                    )));
                }
                open = Some(ChartSection {
                    name,
                    lines: Vec::new(),
                });
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                pending = Some((line_no, name.trim().to_string()));
            } else {
                debug!("Ignoring chart line {} outside any section", line_no);
            }
        }

        if let Some(section) = open {
            return Err(ChartError::ChartFormatError(format!(
                "section [{}] is not terminated",
                section.name
            )));
        }
        if let Some((line_no, name)) = pending {
            return Err(ChartError::ChartFormatError(format!(
                "section [{}] on line {} has no body",
                name, line_no
            )));
        }

        Ok(Self { text, sections })
    }

    /// Read and parse a chart file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading chart from {}", path.display());
        Self::parse(std::fs::read_to_string(path)?)
    }

    /// The document text exactly as read
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sections(&self) -> &[ChartSection] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&ChartSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Tempo map from the `[SyncTrack]` BPM events (`tick = B bpm*1000`)
    pub fn sync_track(&self) -> Result<TempoMap> {
        let section = self
            .section(SYNC_TRACK)
            .ok_or_else(|| ChartError::ChartFormatError("missing [SyncTrack] section".to_string()))?;

        let mut bpm_by_tick = BTreeMap::new();
        for (line_no, line) in &section.lines {
            let (tick, event) = split_event(*line_no, line)?;
            let mut fields = event.split_whitespace();
            if fields.next() != Some("B") {
                continue;
            }

            let value = fields
                .last()
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or_else(|| {
                    ChartError::ChartFormatError(format!(
                        "line {}: bad tempo event '{}'",
                        line_no, line
                    ))
                })?;
            bpm_by_tick.insert(tick, value as f64 / 1000.0);
        }

        let map = TempoMap::new(bpm_by_tick)?;
        info!("Found sync track with {} tempo events", map.len());
        Ok(map)
    }

    /// `Resolution` declared in `[Song]`, if any
    pub fn resolution(&self) -> Result<Option<Resolution>> {
        let Some(song) = self.section(SONG) else {
            return Ok(None);
        };

        for (line_no, line) in &song.lines {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.trim() != "Resolution" {
                continue;
            }

            let ticks = value
                .trim()
                .trim_matches('"')
                .parse::<u32>()
                .ok()
                .filter(|&t| t >= 2)
                .ok_or_else(|| {
                    ChartError::ChartFormatError(format!(
                        "line {}: invalid resolution '{}'",
                        line_no,
                        value.trim()
                    ))
                })?;
            return Ok(Some(Resolution::new(ticks)));
        }

        Ok(None)
    }
}

fn split_event<'a>(line_no: usize, line: &'a str) -> Result<(u64, &'a str)> {
    let (tick, event) = line.split_once('=').ok_or_else(|| {
        ChartError::ChartFormatError(format!("line {}: expected 'tick = event'", line_no))
    })?;
    let tick = tick.trim().parse::<u64>().map_err(|_| {
        ChartError::ChartFormatError(format!("line {}: bad tick '{}'", line_no, tick.trim()))
    })?;
    Ok((tick, event.trim()))
}

/// First file in `dir` whose name ends with `notes.chart` (by name order)
pub fn find_chart_file<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("notes.chart"))
        })
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChartError::ChartFileNotFound(dir.to_path_buf()))
}

/// Render a note section: `[name]`, `{`, one `tick = N id 0` line per note, `}`
pub fn render_notes_section(name: &str, notes: &[Note]) -> String {
    let mut out = format!("\n[{}]\n{{", name);
    for note in notes {
        // Writing to a String cannot fail
        let _ = write!(out, "\n{} = N {} 0", note.tick, note.instrument.note_id());
    }
    out.push_str("\n}");
    out
}

/// Write the original chart text followed by a new note section
pub fn export_chart<P: AsRef<Path>>(
    doc: &ChartDocument,
    notes: &[Note],
    path: P,
    section_name: &str,
) -> Result<()> {
    let path = path.as_ref();
    if doc.section(section_name).is_some() {
        warn!(
            "Chart already has a [{}] section; appending another one",
            section_name
        );
    }

    let mut content = String::with_capacity(doc.text().len() + notes.len() * 16 + 32);
    content.push_str(doc.text());
    content.push_str(&render_notes_section(section_name, notes));
    std::fs::write(path, content)?;

    info!(
        "Wrote {} notes to [{}] in {}",
        notes.len(),
        section_name,
        path.display()
    );
    Ok(())
}
