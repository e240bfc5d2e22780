// Grid Quantization - Snaps onsets and durations to a two-resolution grid
// Removes sub-threshold artifacts left behind by pitch-detection noise

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::grid::{Grid, MeterError, TimeSignature};
use crate::events::types::{ql, ql_abs, ql_zero, sort_by_onset, Event, QuarterLength};

/// Why the grid could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantizeError {
    #[error("unsupported meter: {0}")]
    UnsupportedMeter(#[from] MeterError),

    #[error("no grid divisors configured")]
    NoDivisors,

    #[error("grid divisor must be positive")]
    ZeroDivisor,
}

/// Settings for quantization behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizeSettings {
    /// Candidate grids (subdivisions of a quarter note)
    pub grid: Grid,

    /// Notes and chords shorter than this are dropped after snapping
    pub min_duration: QuarterLength,
}

impl Default for QuantizeSettings {
    fn default() -> Self {
        QuantizeSettings {
            grid: Grid::default(),
            min_duration: ql(1, 10),
        }
    }
}

/// Result of the quantization stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizeOutcome {
    pub events: Vec<Event>,

    /// Set when snapping failed and the original timing was kept
    pub degraded: Option<QuantizeError>,
}

/// Snap every event to the grid.
///
/// Snapping is all-or-nothing: if the meter or grid is unusable the original
/// sequence is returned untouched and the error is reported in `degraded`.
pub fn quantize_events(
    events: &[Event],
    meter: &TimeSignature,
    settings: &QuantizeSettings,
) -> QuantizeOutcome {
    match snap_all(events, meter, &settings.grid) {
        Ok(events) => QuantizeOutcome {
            events,
            degraded: None,
        },
        Err(e) => {
            log::warn!("Quantization skipped, keeping original timing: {}", e);
            QuantizeOutcome {
                events: events.to_vec(),
                degraded: Some(e),
            }
        }
    }
}

fn snap_all(
    events: &[Event],
    meter: &TimeSignature,
    grid: &Grid,
) -> Result<Vec<Event>, QuantizeError> {
    meter.validate()?;
    if grid.divisors.is_empty() {
        return Err(QuantizeError::NoDivisors);
    }
    if grid.divisors.contains(&0) {
        return Err(QuantizeError::ZeroDivisor);
    }

    let mut snapped: Vec<Event> = events
        .iter()
        .map(|event| snap_event(event, grid))
        .collect();
    sort_by_onset(&mut snapped);

    Ok(snapped)
}

/// Snap one event, choosing the divisor with the least joint displacement
fn snap_event(event: &Event, grid: &Grid) -> Event {
    let onset = event.onset();
    let duration = event.duration();

    let mut best: Option<(QuarterLength, QuarterLength, QuarterLength)> = None;

    for &divisor in &grid.divisors {
        let snapped_onset = Grid::snap(onset, divisor);
        let snapped_duration = Grid::snap(duration, divisor);
        let error = ql_abs(snapped_onset - onset) + ql_abs(snapped_duration - duration);

        // Strict comparison keeps the earlier divisor on ties
        let better = match best {
            Some((_, _, best_error)) => error < best_error,
            None => true,
        };
        if better {
            best = Some((snapped_onset, snapped_duration, error));
        }
    }

    match best {
        Some((snapped_onset, snapped_duration, _)) => {
            let snapped_onset = if snapped_onset < ql_zero() {
                ql_zero()
            } else {
                snapped_onset
            };
            event.with_timing(snapped_onset, snapped_duration)
        }
        None => event.clone(),
    }
}

/// Drop notes and chords shorter than `min_duration`.
/// Rests are kept unless their duration is no longer positive.
pub fn prune_artifacts(events: Vec<Event>, min_duration: QuarterLength) -> (Vec<Event>, usize) {
    let before = events.len();

    let kept: Vec<Event> = events
        .into_iter()
        .filter(|event| match event {
            Event::Note { duration, .. } | Event::Chord { duration, .. } => {
                *duration >= min_duration && *duration > ql_zero()
            }
            Event::Rest { duration, .. } => *duration > ql_zero(),
        })
        .collect();

    let removed = before - kept.len();
    if removed > 0 {
        log::debug!("Pruned {} events shorter than {}", removed, min_duration);
    }

    (kept, removed)
}
