// Playable range - folds pitches into an instrument's range by octaves

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::types::{normalize_pitches, Event};

/// Lowest pitch of the default range (E2, open low E)
pub const DEFAULT_LOW: u8 = 40;

/// Highest pitch of the default range (E6, 24th fret on the high E string)
pub const DEFAULT_HIGH: u8 = 88;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("playable range {low}..={high} must span at least an octave")]
    TooNarrow { low: u8, high: u8 },

    #[error("playable range {low}..={high} exceeds the MIDI pitch range")]
    OutsideMidi { low: u8, high: u8 },
}

/// Closed interval of playable MIDI pitches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableRange {
    pub low: u8,
    pub high: u8,
}

impl Default for PlayableRange {
    fn default() -> Self {
        PlayableRange {
            low: DEFAULT_LOW,
            high: DEFAULT_HIGH,
        }
    }
}

impl PlayableRange {
    pub fn new(low: u8, high: u8) -> Result<Self, RangeError> {
        let range = PlayableRange { low, high };
        range.validate()?;
        Ok(range)
    }

    /// Every pitch class needs a representative inside the range
    pub fn validate(&self) -> Result<(), RangeError> {
        if self.high > 127 {
            return Err(RangeError::OutsideMidi {
                low: self.low,
                high: self.high,
            });
        }
        if self.high < self.low || self.high - self.low < 11 {
            return Err(RangeError::TooNarrow {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }

    pub fn contains(&self, pitch: i32) -> bool {
        pitch >= self.low as i32 && pitch <= self.high as i32
    }

    /// Fold any integer pitch into the range, preserving pitch class.
    /// Equivalent to adding 12 while below and subtracting 12 while above.
    pub fn clamp(&self, pitch: i32) -> i32 {
        let low = self.low as i32;
        let high = self.high as i32;
        let pitch = pitch as i64;

        let folded = if pitch < low as i64 {
            pitch + 12 * div_ceil(low as i64 - pitch, 12)
        } else if pitch > high as i64 {
            pitch - 12 * div_ceil(pitch - high as i64, 12)
        } else {
            pitch
        };

        folded as i32
    }

    /// Clamp a MIDI pitch
    pub fn clamp_note(&self, pitch: u8) -> u8 {
        // In-range results always fit in u8 for a validated range
        self.clamp(pitch as i32) as u8
    }

    /// Clamp every pitch of an event; chord pitches are re-normalized
    pub fn clamp_event(&self, event: &Event) -> Event {
        match event {
            Event::Note {
                pitch,
                onset,
                duration,
                tab,
            } => Event::Note {
                pitch: self.clamp_note(*pitch),
                onset: *onset,
                duration: *duration,
                tab: *tab,
            },
            Event::Chord {
                pitches,
                onset,
                duration,
                tab,
            } => {
                let clamped = normalize_pitches(pitches.iter().map(|p| self.clamp_note(*p)).collect());
                if clamped.len() == 1 {
                    Event::Note {
                        pitch: clamped[0],
                        onset: *onset,
                        duration: *duration,
                        tab: *tab,
                    }
                } else {
                    Event::Chord {
                        pitches: clamped,
                        onset: *onset,
                        duration: *duration,
                        tab: *tab,
                    }
                }
            }
            Event::Rest { onset, duration } => Event::Rest {
                onset: *onset,
                duration: *duration,
            },
        }
    }

    pub fn clamp_events(&self, events: &[Event]) -> Vec<Event> {
        events.iter().map(|e| self.clamp_event(e)).collect()
    }
}

fn div_ceil(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator - 1) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::ql;

    /// Reference implementation: the literal loop
    fn clamp_by_loop(mut pitch: i32) -> i32 {
        while pitch < 40 {
            pitch += 12;
        }
        while pitch > 88 {
            pitch -= 12;
        }
        pitch
    }

    #[test]
    fn test_clamp_matches_loop() {
        let range = PlayableRange::default();
        for p in -500..=500 {
            assert_eq!(range.clamp(p), clamp_by_loop(p), "pitch {}", p);
        }
    }

    #[test]
    fn test_clamp_idempotent() {
        let range = PlayableRange::default();
        for p in -500..=500 {
            let once = range.clamp(p);
            assert_eq!(range.clamp(once), once);
        }
    }

    #[test]
    fn test_clamp_range_and_pitch_class() {
        let range = PlayableRange::default();
        for p in -500..=500 {
            let c = range.clamp(p);
            assert!((40..=88).contains(&c), "pitch {} -> {}", p, c);
            assert_eq!(c.rem_euclid(12), p.rem_euclid(12));
        }
    }

    #[test]
    fn test_clamp_extremes() {
        let range = PlayableRange::default();
        assert!(range.contains(range.clamp(i32::MIN)));
        assert!(range.contains(range.clamp(i32::MAX)));
    }

    #[test]
    fn test_clamp_examples() {
        let range = PlayableRange::default();
        assert_eq!(range.clamp_note(28), 40);
        assert_eq!(range.clamp_note(39), 51);
        assert_eq!(range.clamp_note(89), 77);
        assert_eq!(range.clamp_note(127), 79);
        assert_eq!(range.clamp_note(64), 64);
    }

    #[test]
    fn test_clamp_chord_merges_octaves() {
        let range = PlayableRange::default();
        // 28 folds onto 40, which is already present
        let chord = Event::chord(vec![28, 40, 47], ql(0, 1), ql(1, 1));
        let clamped = range.clamp_event(&chord);
        assert_eq!(clamped.pitches(), vec![40, 47]);
    }

    #[test]
    fn test_clamp_chord_collapses_to_note() {
        let range = PlayableRange::default();
        let chord = Event::chord(vec![28, 40], ql(0, 1), ql(1, 1));
        assert!(matches!(range.clamp_event(&chord), Event::Note { pitch: 40, .. }));
    }

    #[test]
    fn test_validate() {
        assert!(PlayableRange::new(40, 88).is_ok());
        assert!(PlayableRange::new(40, 50).is_err());
        assert!(PlayableRange::new(60, 40).is_err());
        assert!(PlayableRange::new(100, 130).is_err());
    }
}
