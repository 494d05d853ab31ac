//! Time-to-tick mapping over a piecewise-constant tempo map
//!
//! There is no closed form for "which tick is at `t` seconds" once the tempo
//! changes an arbitrary number of times, so the mapper walks the grid forward
//! in fixed eighth-note steps, integrating elapsed time at the active BPM,
//! until it passes the target. The answer is the closest of the last few
//! simulated grid points. Results are always multiples of
//! [`Resolution::step_ticks`].

use crate::analysis::{HitEvent, Note};
use crate::config::MapperConfig;
use crate::error::{ChartError, Result};
use crate::tempo::{Resolution, TempoMap};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Number of trailing grid points considered when picking the nearest tick
pub const CANDIDATE_WINDOW: usize = 4;

/// Upper bound on simulation steps for a single query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchGuard {
    max_iterations: u64,
}

impl SearchGuard {
    pub fn new(max_iterations: u64) -> Self {
        Self { max_iterations }
    }

    /// Budget enough steps to cover `max_song_seconds` at `max_bpm`
    pub fn from_limits(max_song_seconds: f64, max_bpm: f64, resolution: Resolution) -> Self {
        let steps_per_beat =
            resolution.ticks_per_beat() as f64 / resolution.step_ticks().max(1) as f64;
        let beats = max_song_seconds * max_bpm / 60.0;
        Self::new((beats * steps_per_beat).ceil() as u64 + 1)
    }

    pub fn from_config(config: &MapperConfig, resolution: Resolution) -> Self {
        Self::from_limits(config.max_song_seconds, config.max_bpm, resolution)
    }

    pub fn max_iterations(&self) -> u64 {
        self.max_iterations
    }
}

impl Default for SearchGuard {
    fn default() -> Self {
        let config = MapperConfig::default();
        Self::from_config(&config, Resolution::default())
    }
}

/// Simulated grid point
#[derive(Debug, Clone, Copy)]
struct Candidate {
    tick: u64,
    elapsed: f64,
}

/// Map a time in seconds to the nearest step-aligned tick
pub fn map_time_to_tick(
    tempo_map: &TempoMap,
    target_seconds: f64,
    resolution: Resolution,
    guard: SearchGuard,
) -> Result<u64> {
    if !(target_seconds.is_finite() && target_seconds >= 0.0) {
        return Err(ChartError::InvalidTempoQuery(target_seconds));
    }

    let step = resolution.step_ticks() as u64;
    if step == 0 {
        return Err(ChartError::InvalidConfigParameter(format!(
            "ticks_per_beat {} leaves no search step",
            resolution.ticks_per_beat()
        )));
    }

    let mut bpm = tempo_map.initial_bpm();
    let mut elapsed = 0.0;
    let mut window: VecDeque<Candidate> = VecDeque::with_capacity(CANDIDATE_WINDOW + 1);

    for iteration in 0u64.. {
        if iteration > guard.max_iterations() {
            return Err(ChartError::TempoMapDivergence {
                iterations: iteration,
                target_seconds,
            });
        }

        let tick = iteration * step;

        // The step ending at `tick` runs at the tempo active before it
        if tick > 0 {
            elapsed += resolution.step_seconds(bpm);
        }

        if let Some(next_bpm) = tempo_map.change_at(tick) {
            bpm = next_bpm;
        }

        window.push_back(Candidate { tick, elapsed });
        if window.len() > CANDIDATE_WINDOW {
            window.pop_front();
        }

        if elapsed > target_seconds {
            break;
        }
    }

    // Strict comparison: the earliest of equally close candidates wins
    let mut closest: Option<Candidate> = None;
    for candidate in &window {
        let distance = (candidate.elapsed - target_seconds).abs();
        match closest {
            Some(best) if (best.elapsed - target_seconds).abs() <= distance => {}
            _ => closest = Some(*candidate),
        }
    }

    closest
        .map(|c| c.tick)
        .ok_or(ChartError::InvalidTempoQuery(target_seconds))
}

/// Map every hit onto the tick grid, ordered by hit time.
///
/// Hits the mapper rejects as invalid queries are skipped with a warning;
/// tempo-map divergence aborts the whole mapping.
pub fn map_hits_to_ticks(
    hits: &[HitEvent],
    tempo_map: &TempoMap,
    resolution: Resolution,
    guard: SearchGuard,
) -> Result<Vec<Note>> {
    let mut sorted = hits.to_vec();
    sorted.sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));

    let mut notes = Vec::with_capacity(sorted.len());
    for hit in &sorted {
        match map_time_to_tick(tempo_map, hit.time_seconds, resolution, guard) {
            Ok(tick) => {
                debug!(
                    "Hit: {} at {:.3}s, tick: {}",
                    hit.instrument, hit.time_seconds, tick
                );
                notes.push(Note {
                    instrument: hit.instrument,
                    tick,
                });
            }
            Err(ChartError::InvalidTempoQuery(t)) => {
                warn!("Skipping {} hit with unmappable time {}", hit.instrument, t);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::InstrumentCategory;
    use std::collections::BTreeMap;

    fn res() -> Resolution {
        Resolution::new(192)
    }

    #[test]
    fn test_zero_maps_to_tick_zero() {
        let map = TempoMap::constant(120.0).unwrap();
        assert_eq!(
            map_time_to_tick(&map, 0.0, res(), SearchGuard::default()).unwrap(),
            0
        );
    }

    #[test]
    fn test_exact_grid_points_round_trip() {
        for bpm in [60.0, 100.0, 120.0, 173.0] {
            let map = TempoMap::constant(bpm).unwrap();
            let step_sec = res().step_seconds(bpm);
            for k in 0..200u64 {
                let tick =
                    map_time_to_tick(&map, k as f64 * step_sec, res(), SearchGuard::default())
                        .unwrap();
                assert_eq!(tick, k * 96, "bpm {} k {}", bpm, k);
            }
        }
    }

    #[test]
    fn test_constant_tempo_is_monotonic_and_step_aligned() {
        let map = TempoMap::constant(137.5).unwrap();
        let mut previous = 0;
        for i in 0..2000 {
            let t = i as f64 * 0.0137;
            let tick = map_time_to_tick(&map, t, res(), SearchGuard::default()).unwrap();
            assert!(tick >= previous);
            assert_eq!(tick % 96, 0);
            previous = tick;
        }
    }

    #[test]
    fn test_rounds_to_nearest_step() {
        let map = TempoMap::constant(120.0).unwrap();
        // Steps are 0.25 s apart at 120 BPM
        assert_eq!(map_time_to_tick(&map, 0.26, res(), SearchGuard::default()).unwrap(), 96);
        assert_eq!(map_time_to_tick(&map, 0.37, res(), SearchGuard::default()).unwrap(), 96);
        assert_eq!(map_time_to_tick(&map, 0.38, res(), SearchGuard::default()).unwrap(), 192);
    }

    #[test]
    fn test_tie_prefers_earlier_candidate() {
        let map = TempoMap::constant(120.0).unwrap();
        assert_eq!(map_time_to_tick(&map, 0.125, res(), SearchGuard::default()).unwrap(), 0);
        assert_eq!(map_time_to_tick(&map, 0.375, res(), SearchGuard::default()).unwrap(), 96);
    }

    #[test]
    fn test_tempo_change_applies_after_change_tick() {
        let map = TempoMap::new(BTreeMap::from([(0, 120.0), (960, 240.0)])).unwrap();
        let guard = SearchGuard::default();

        for tick in [960u64, 1056, 1152, 1920] {
            let target = map.seconds_at(tick, res());
            let mapped = map_time_to_tick(&map, target, res(), guard).unwrap();
            assert!(mapped.abs_diff(tick) <= 96, "tick {} mapped {}", tick, mapped);
        }

        // 2.5 s to reach tick 960, then 0.125 s per step at 240 BPM
        assert_eq!(map_time_to_tick(&map, 2.75, res(), guard).unwrap(), 1152);
    }

    #[test]
    fn test_negative_and_nan_targets_rejected() {
        let map = TempoMap::constant(120.0).unwrap();
        for t in [-0.001, f64::NAN, f64::INFINITY] {
            let err = map_time_to_tick(&map, t, res(), SearchGuard::default()).unwrap_err();
            assert!(matches!(err, ChartError::InvalidTempoQuery(_)));
        }
    }

    #[test]
    fn test_guard_trips_on_runaway_search() {
        let map = TempoMap::constant(120.0).unwrap();
        let err = map_time_to_tick(&map, 100.0, res(), SearchGuard::new(10)).unwrap_err();
        assert!(matches!(
            err,
            ChartError::TempoMapDivergence { iterations: 11, .. }
        ));
    }

    #[test]
    fn test_default_guard_covers_long_song() {
        let map = TempoMap::constant(300.0).unwrap();
        let tick = map_time_to_tick(&map, 3000.0, res(), SearchGuard::default()).unwrap();
        assert_eq!(tick, 3000 * 5 * 192);
    }

    #[test]
    fn test_orchestration_sorts_by_time() {
        let map = TempoMap::constant(120.0).unwrap();
        let hits = vec![
            HitEvent::new(InstrumentCategory::Snare, 1.0),
            HitEvent::new(InstrumentCategory::Kick, 0.0),
            HitEvent::new(InstrumentCategory::OtherDrums, 0.5),
        ];

        let notes = map_hits_to_ticks(&hits, &map, res(), SearchGuard::default()).unwrap();
        let order: Vec<_> = notes.iter().map(|n| (n.instrument, n.tick)).collect();
        assert_eq!(
            order,
            vec![
                (InstrumentCategory::Kick, 0),
                (InstrumentCategory::OtherDrums, 192),
                (InstrumentCategory::Snare, 384),
            ]
        );
    }

    #[test]
    fn test_orchestration_is_stable_for_equal_times() {
        let map = TempoMap::constant(120.0).unwrap();
        let hits = vec![
            HitEvent::new(InstrumentCategory::Snare, 0.5),
            HitEvent::new(InstrumentCategory::Kick, 0.5),
        ];
        let notes = map_hits_to_ticks(&hits, &map, res(), SearchGuard::default()).unwrap();
        assert_eq!(notes[0].instrument, InstrumentCategory::Snare);
        assert_eq!(notes[1].instrument, InstrumentCategory::Kick);
        assert_eq!(notes[0].tick, notes[1].tick);
    }

    #[test]
    fn test_orchestration_skips_invalid_hits() {
        let map = TempoMap::constant(120.0).unwrap();
        let hits = vec![
            HitEvent::new(InstrumentCategory::Kick, -1.0),
            HitEvent::new(InstrumentCategory::Snare, 0.25),
        ];
        let notes = map_hits_to_ticks(&hits, &map, res(), SearchGuard::default()).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].tick, 96);
    }

    #[test]
    fn test_orchestration_propagates_divergence() {
        let map = TempoMap::constant(120.0).unwrap();
        let hits = vec![HitEvent::new(InstrumentCategory::Kick, 1000.0)];
        let result = map_hits_to_ticks(&hits, &map, res(), SearchGuard::new(5));
        assert!(matches!(result, Err(ChartError::TempoMapDivergence { .. })));
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let map = TempoMap::constant(120.0).unwrap();
        let notes = map_hits_to_ticks(&[], &map, res(), SearchGuard::default()).unwrap();
        assert!(notes.is_empty());
    }
}
