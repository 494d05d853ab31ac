//! Pass 2: Hit Deduplication

use crate::audio::StemState;
use crate::config::Config;
use crate::error::{ChartError, Result as ChartResult};
use std::iter::FusedIterator;
use tracing::debug;

/// Drops hits closer than `min_gap` seconds to the last hit it kept.
///
/// The comparison is against the last *kept* hit, so a roll of hits each
/// 60 ms apart under a 100 ms gap keeps every other one.
#[derive(Debug, Clone)]
pub struct MinGapFilter<I> {
    inner: I,
    min_gap: f64,
    last_kept: Option<f64>,
    dropped: usize,
}

impl<I> MinGapFilter<I> {
    pub fn new(inner: I, min_gap: f64) -> Self {
        Self {
            inner,
            min_gap,
            last_kept: None,
            dropped: 0,
        }
    }

    /// Hits rejected so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl<I: Iterator<Item = f64>> Iterator for MinGapFilter<I> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        for hit in self.inner.by_ref() {
            if let Some(last) = self.last_kept {
                if hit - last < self.min_gap {
                    self.dropped += 1;
                    continue;
                }
            }
            self.last_kept = Some(hit);
            return Some(hit);
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (_, upper) = self.inner.size_hint();
        (0, upper)
    }
}

impl<I: FusedIterator<Item = f64>> FusedIterator for MinGapFilter<I> {}

/// Apply the category's minimum gap, if it has one
pub fn dedup_min_gap<I>(onsets: I, min_gap: Option<f64>) -> Vec<f64>
where
    I: Iterator<Item = f64>,
{
    match min_gap {
        Some(gap) => MinGapFilter::new(onsets, gap).collect(),
        None => onsets.collect(),
    }
}

pub fn run(state: &mut StemState, config: &Config) -> ChartResult<()> {
    let onsets = state.onsets.take().ok_or_else(|| {
        ChartError::ProcessingPipelineError(format!(
            "deduplication for {} needs onsets from pass 1",
            state.category
        ))
    })?;

    let min_gap = config.categories.params(state.category).min_gap_sec;
    let mut dropped = 0;
    state.hits = match min_gap {
        Some(gap) => {
            let mut filter = MinGapFilter::new(onsets, gap);
            let hits: Vec<f64> = filter.by_ref().collect();
            dropped = filter.dropped();
            hits
        }
        None => onsets.collect(),
    };

    debug!(
        "Pass 2 ({}): kept {} hits, dropped {} closer than {:?} s",
        state.category,
        state.hits.len(),
        dropped,
        min_gap
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_kick_dropped() {
        let hits = dedup_min_gap([0.50, 0.55, 0.70].into_iter(), Some(0.10));
        assert_eq!(hits, vec![0.50, 0.70]);
    }

    #[test]
    fn test_compares_against_last_kept() {
        let hits = dedup_min_gap([0.0, 0.06, 0.12, 0.18, 0.24].into_iter(), Some(0.10));
        assert_eq!(hits, vec![0.0, 0.12, 0.24]);
    }

    #[test]
    fn test_first_hit_at_zero_is_a_real_predecessor() {
        let hits = dedup_min_gap([0.0, 0.05].into_iter(), Some(0.10));
        assert_eq!(hits, vec![0.0]);
    }

    #[test]
    fn test_exact_gap_is_kept() {
        let hits = dedup_min_gap([0.5, 1.0].into_iter(), Some(0.5));
        assert_eq!(hits, vec![0.5, 1.0]);
    }

    #[test]
    fn test_no_gap_passes_everything() {
        let hits = dedup_min_gap([0.50, 0.51, 0.52].into_iter(), None);
        assert_eq!(hits, vec![0.50, 0.51, 0.52]);
    }

    #[test]
    fn test_dropped_count() {
        let mut filter = MinGapFilter::new([1.0, 1.01, 1.02, 2.0].into_iter(), 0.1);
        assert_eq!(filter.by_ref().count(), 2);
        assert_eq!(filter.dropped(), 2);
    }

    #[test]
    fn test_run_requires_onsets() {
        let waveform = crate::audio::Waveform::new(vec![0.0; 100], 22050).unwrap();
        let mut state = StemState::new(crate::analysis::InstrumentCategory::Kick, waveform);
        let err = run(&mut state, &Config::default()).unwrap_err();
        assert!(matches!(err, ChartError::ProcessingPipelineError(_)));
    }
}
