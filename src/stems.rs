//! Stem discovery and classification

use crate::analysis::InstrumentCategory;
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// At most one stem file per instrument category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StemSet {
    stems: BTreeMap<InstrumentCategory, PathBuf>,
}

impl StemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `path` to `category` unless the category is already taken.
    /// Returns whether the assignment happened.
    pub fn assign(&mut self, category: InstrumentCategory, path: PathBuf) -> bool {
        if self.stems.contains_key(&category) {
            return false;
        }
        self.stems.insert(category, path);
        true
    }

    pub fn get(&self, category: InstrumentCategory) -> Option<&Path> {
        self.stems.get(&category).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstrumentCategory, &Path)> {
        self.stems.iter().map(|(&c, p)| (c, p.as_path()))
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

/// Regular files in `dir` whose extension is listed, sorted by file name
pub fn list_audio_files<P: AsRef<Path>>(dir: P, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    info!("Found {} audio files in {}", files.len(), dir.display());
    Ok(files)
}

/// Classify files by name prefix, keeping the first file per category
pub fn categorize_files(files: &[PathBuf]) -> StemSet {
    let mut set = StemSet::new();

    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        match InstrumentCategory::from_file_name(name) {
            Some(category) => {
                if set.assign(category, path.clone()) {
                    info!("Assigned {} to '{}' category", name, category);
                } else {
                    debug!("Ignoring {}: '{}' already has a stem", name, category);
                }
            }
            None => debug!("Ignoring {}: no instrument prefix", name),
        }
    }

    set
}
