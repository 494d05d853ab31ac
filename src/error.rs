//! Error types for the stem-to-chart system

use std::path::PathBuf;
use thiserror::Error;

/// Error type for stem analysis, tempo mapping and chart I/O
#[derive(Debug, Error)]
pub enum ChartError {
    /// E001: A stem could not be opened or decoded
    #[error("E001: Stem load error ({path}) - {message}")]
    StemLoadError { path: PathBuf, message: String },

    /// E002: Tempo map has no tick-0 entry or a non-positive BPM
    #[error("E002: Malformed tempo map - {0}")]
    MalformedTempoMap(String),

    /// E003: Time query the mapper cannot answer (negative or non-finite)
    #[error("E003: Invalid tempo query for {0} s")]
    InvalidTempoQuery(f64),

    /// E004: Mapper iteration guard tripped
    #[error("E004: Tempo map diverged after {iterations} steps while seeking {target_seconds} s")]
    TempoMapDivergence {
        iterations: u64,
        target_seconds: f64,
    },

    /// E005: Chart document could not be interpreted
    #[error("E005: Chart format error - {0}")]
    ChartFormatError(String),

    /// E006: No chart document found in the song directory
    #[error("E006: No notes.chart file found in {0}")]
    ChartFileNotFound(PathBuf),

    /// E007: Invalid configuration parameter
    #[error("E007: Invalid configuration parameter - {0}")]
    InvalidConfigParameter(String),

    /// E008: File I/O error
    #[error("E008: File I/O error - {0}")]
    Io(#[from] std::io::Error),

    /// E009: Report serialization error
    #[error("E009: Report serialization error - {0}")]
    ReportError(#[from] serde_json::Error),

    /// E010: Analysis passes run out of order
    #[error("E010: Processing pipeline error - {0}")]
    ProcessingPipelineError(String),
}

impl ChartError {
    /// Shorthand for building a stem load error from any displayable cause
    pub fn stem_load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ChartError::StemLoadError {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Whether the run can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChartError::StemLoadError { .. } | ChartError::InvalidTempoQuery(_)
        )
    }
}

/// Result type alias for stem-to-chart operations
pub type Result<T> = std::result::Result<T, ChartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        let err = ChartError::MalformedTempoMap("no entry at tick 0".to_string());
        assert!(err.to_string().starts_with("E002"));

        let err = ChartError::stem_load("kick-1.mp3", "decode failed");
        assert!(err.to_string().contains("kick-1.mp3"));
        assert!(err.to_string().starts_with("E001"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(ChartError::InvalidTempoQuery(-1.0).is_recoverable());
        assert!(ChartError::stem_load("x", "y").is_recoverable());
        assert!(!ChartError::MalformedTempoMap(String::new()).is_recoverable());
        assert!(!ChartError::TempoMapDivergence {
            iterations: 10,
            target_seconds: 1.0
        }
        .is_recoverable());
    }
}
