//! Tick grid resolution and piecewise-constant tempo maps

use crate::error::{ChartError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tick grid resolution for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    ticks_per_beat: u32,
}

impl Resolution {
    pub fn new(ticks_per_beat: u32) -> Self {
        Self { ticks_per_beat }
    }

    pub fn ticks_per_beat(&self) -> u32 {
        self.ticks_per_beat
    }

    /// Mapper search step: an eighth note
    pub fn step_ticks(&self) -> u32 {
        self.ticks_per_beat / 2
    }

    /// Seconds covered by `ticks` at a constant `bpm`
    pub fn ticks_to_seconds(&self, ticks: u64, bpm: f64) -> f64 {
        (ticks as f64 / self.ticks_per_beat as f64) * (60.0 / bpm)
    }

    /// Seconds covered by one search step at `bpm`
    pub fn step_seconds(&self, bpm: f64) -> f64 {
        self.ticks_to_seconds(self.step_ticks() as u64, bpm)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(192)
    }
}

/// Tempo change event: `bpm` holds from `tick` until the next change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChangePoint {
    pub tick: u64,
    pub bpm: f64,
}

/// Tick-ordered BPM table with a mandatory entry at tick 0
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    bpm_by_tick: BTreeMap<u64, f64>,
}

impl TempoMap {
    /// Build from a tick → BPM table
    pub fn new(bpm_by_tick: BTreeMap<u64, f64>) -> Result<Self> {
        if !bpm_by_tick.contains_key(&0) {
            return Err(ChartError::MalformedTempoMap(
                "no tempo defined at tick 0".to_string(),
            ));
        }

        if let Some((tick, bpm)) = bpm_by_tick
            .iter()
            .find(|&(_, &bpm)| !(bpm.is_finite() && bpm > 0.0))
        {
            return Err(ChartError::MalformedTempoMap(format!(
                "invalid BPM {} at tick {}",
                bpm, tick
            )));
        }

        Ok(Self { bpm_by_tick })
    }

    /// Build from change points; a repeated tick keeps the last BPM given
    pub fn from_points<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = TempoChangePoint>,
    {
        Self::new(points.into_iter().map(|p| (p.tick, p.bpm)).collect())
    }

    /// Single-tempo map
    pub fn constant(bpm: f64) -> Result<Self> {
        Self::new(BTreeMap::from([(0, bpm)]))
    }

    pub fn initial_bpm(&self) -> f64 {
        // Presence of tick 0 is checked in `new`
        self.bpm_by_tick[&0]
    }

    /// BPM that takes effect exactly at `tick`, if a change lands there
    pub fn change_at(&self, tick: u64) -> Option<f64> {
        self.bpm_by_tick.get(&tick).copied()
    }

    /// Active BPM at `tick`
    pub fn bpm_at(&self, tick: u64) -> f64 {
        self.bpm_by_tick
            .range(..=tick)
            .next_back()
            .map(|(_, &bpm)| bpm)
            .unwrap_or_else(|| self.initial_bpm())
    }

    pub fn change_points(&self) -> impl Iterator<Item = TempoChangePoint> + '_ {
        self.bpm_by_tick
            .iter()
            .map(|(&tick, &bpm)| TempoChangePoint { tick, bpm })
    }

    pub fn len(&self) -> usize {
        self.bpm_by_tick.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bpm_by_tick.is_empty()
    }

    /// Elapsed seconds from tick 0 to `tick`, integrating every tempo segment
    pub fn seconds_at(&self, tick: u64, resolution: Resolution) -> f64 {
        let mut seconds = 0.0;
        let mut points = self.bpm_by_tick.iter().peekable();

        while let Some((&start, &bpm)) = points.next() {
            if start >= tick {
                break;
            }
            let end = points
                .peek()
                .map(|&(&next, _)| next.min(tick))
                .unwrap_or(tick);
            seconds += resolution.ticks_to_seconds(end - start, bpm);
        }

        seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_steps() {
        let res = Resolution::new(192);
        assert_eq!(res.step_ticks(), 96);
        assert!((res.step_seconds(120.0) - 0.25).abs() < 1e-12);
        assert!((res.ticks_to_seconds(192, 60.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_tick_zero_rejected() {
        let err = TempoMap::new(BTreeMap::from([(192, 120.0)])).unwrap_err();
        assert!(matches!(err, ChartError::MalformedTempoMap(_)));

        let err = TempoMap::new(BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ChartError::MalformedTempoMap(_)));
    }

    #[test]
    fn test_non_positive_bpm_rejected() {
        for bpm in [0.0, -120.0, f64::NAN, f64::INFINITY] {
            let result = TempoMap::new(BTreeMap::from([(0, 120.0), (960, bpm)]));
            assert!(matches!(result, Err(ChartError::MalformedTempoMap(_))));
        }
    }

    #[test]
    fn test_bpm_lookup() {
        let map = TempoMap::new(BTreeMap::from([(0, 120.0), (960, 240.0)])).unwrap();
        assert_eq!(map.initial_bpm(), 120.0);
        assert_eq!(map.bpm_at(0), 120.0);
        assert_eq!(map.bpm_at(959), 120.0);
        assert_eq!(map.bpm_at(960), 240.0);
        assert_eq!(map.bpm_at(10_000), 240.0);
        assert_eq!(map.change_at(960), Some(240.0));
        assert_eq!(map.change_at(961), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_seconds_at_integrates_segments() {
        let res = Resolution::new(192);
        let map = TempoMap::new(BTreeMap::from([(0, 120.0), (960, 240.0)])).unwrap();

        // 5 beats at 120 BPM
        assert!((map.seconds_at(960, res) - 2.5).abs() < 1e-12);
        // plus 1 beat at 240 BPM
        assert!((map.seconds_at(1152, res) - 2.75).abs() < 1e-12);
        assert_eq!(map.seconds_at(0, res), 0.0);
    }

    #[test]
    fn test_from_points_last_duplicate_wins() {
        let map = TempoMap::from_points([
            TempoChangePoint { tick: 0, bpm: 100.0 },
            TempoChangePoint { tick: 0, bpm: 150.0 },
        ])
        .unwrap();
        assert_eq!(map.initial_bpm(), 150.0);
        assert_eq!(map.len(), 1);
    }
}
