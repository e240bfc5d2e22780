// Score event types
// Note/Chord/Rest union, tab positions, and quarter-length time

use num_rational::Rational64;
use serde::{Deserialize, Serialize};

/// Musical time in quarter-lengths (1 = one quarter note)
/// Exact rational so that snapping and re-derivation are deterministic
pub type QuarterLength = Rational64;

/// Build a quarter-length from a numerator and denominator
pub fn ql(numer: i64, denom: i64) -> QuarterLength {
    QuarterLength::new(numer, denom)
}

/// Zero quarter-length
pub fn ql_zero() -> QuarterLength {
    QuarterLength::from_integer(0)
}

/// Absolute value of a quarter-length
pub fn ql_abs(value: QuarterLength) -> QuarterLength {
    if value < ql_zero() {
        -value
    } else {
        value
    }
}

/// Position of a note on the fretboard
/// Only built by the fretboard mapper, from an in-range pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabPosition {
    /// String number, 1 = highest string
    pub string: u8,

    /// Fret number, 0 = open string
    pub fret: u8,
}

/// A single score event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Single pitched note
    Note {
        pitch: u8,
        onset: QuarterLength,
        duration: QuarterLength,
        tab: Option<TabPosition>,
    },

    /// Simultaneous pitches sharing one onset and duration
    /// `tab` applies to the lowest pitch only
    Chord {
        pitches: Vec<u8>,
        onset: QuarterLength,
        duration: QuarterLength,
        tab: Option<TabPosition>,
    },

    /// Silence
    Rest {
        onset: QuarterLength,
        duration: QuarterLength,
    },
}

impl Event {
    pub fn note(pitch: u8, onset: QuarterLength, duration: QuarterLength) -> Self {
        Event::Note {
            pitch,
            onset,
            duration,
            tab: None,
        }
    }

    /// Create a chord; pitches are sorted and de-duplicated.
    /// A single distinct pitch collapses to a note.
    pub fn chord(pitches: Vec<u8>, onset: QuarterLength, duration: QuarterLength) -> Self {
        let pitches = normalize_pitches(pitches);
        if pitches.len() == 1 {
            return Event::note(pitches[0], onset, duration);
        }
        Event::Chord {
            pitches,
            onset,
            duration,
            tab: None,
        }
    }

    pub fn rest(onset: QuarterLength, duration: QuarterLength) -> Self {
        Event::Rest { onset, duration }
    }

    pub fn onset(&self) -> QuarterLength {
        match self {
            Event::Note { onset, .. } | Event::Chord { onset, .. } | Event::Rest { onset, .. } => {
                *onset
            }
        }
    }

    pub fn duration(&self) -> QuarterLength {
        match self {
            Event::Note { duration, .. }
            | Event::Chord { duration, .. }
            | Event::Rest { duration, .. } => *duration,
        }
    }

    /// End time (onset + duration)
    pub fn end(&self) -> QuarterLength {
        self.onset() + self.duration()
    }

    /// True for notes and chords
    pub fn is_sounding(&self) -> bool {
        !matches!(self, Event::Rest { .. })
    }

    /// All pitches of the event, ascending (empty for rests)
    pub fn pitches(&self) -> Vec<u8> {
        match self {
            Event::Note { pitch, .. } => vec![*pitch],
            Event::Chord { pitches, .. } => pitches.clone(),
            Event::Rest { .. } => Vec::new(),
        }
    }

    pub fn tab(&self) -> Option<TabPosition> {
        match self {
            Event::Note { tab, .. } | Event::Chord { tab, .. } => *tab,
            Event::Rest { .. } => None,
        }
    }

    /// Copy of this event with new timing
    pub fn with_timing(&self, onset: QuarterLength, duration: QuarterLength) -> Self {
        match self {
            Event::Note { pitch, tab, .. } => Event::Note {
                pitch: *pitch,
                onset,
                duration,
                tab: *tab,
            },
            Event::Chord { pitches, tab, .. } => Event::Chord {
                pitches: pitches.clone(),
                onset,
                duration,
                tab: *tab,
            },
            Event::Rest { .. } => Event::Rest { onset, duration },
        }
    }

    /// Replace the tab position. Rests ignore it.
    pub fn with_tab(self, position: Option<TabPosition>) -> Self {
        match self {
            Event::Note {
                pitch,
                onset,
                duration,
                ..
            } => Event::Note {
                pitch,
                onset,
                duration,
                tab: position,
            },
            Event::Chord {
                pitches,
                onset,
                duration,
                ..
            } => Event::Chord {
                pitches,
                onset,
                duration,
                tab: position,
            },
            rest @ Event::Rest { .. } => rest,
        }
    }
}

/// Sort ascending and drop duplicate pitches
pub fn normalize_pitches(mut pitches: Vec<u8>) -> Vec<u8> {
    pitches.sort_unstable();
    pitches.dedup();
    pitches
}

/// Sort events by onset, keeping the input order for equal onsets
pub fn sort_by_onset(events: &mut [Event]) {
    events.sort_by_key(|e| e.onset());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_normalizes_pitches() {
        let chord = Event::chord(vec![64, 52, 64, 59], ql(0, 1), ql(1, 1));
        assert_eq!(chord.pitches(), vec![52, 59, 64]);
    }

    #[test]
    fn test_single_pitch_chord_collapses_to_note() {
        let chord = Event::chord(vec![60, 60], ql(1, 2), ql(1, 1));
        assert!(matches!(chord, Event::Note { pitch: 60, .. }));
    }

    #[test]
    fn test_event_end() {
        let note = Event::note(60, ql(3, 2), ql(1, 4));
        assert_eq!(note.end(), ql(7, 4));
    }

    #[test]
    fn test_rest_has_no_pitches_or_tab() {
        let rest = Event::rest(ql(0, 1), ql(1, 1));
        assert!(rest.pitches().is_empty());
        assert!(rest.tab().is_none());
        assert!(!rest.is_sounding());
    }

    #[test]
    fn test_with_timing_keeps_tab() {
        let note = Event::Note {
            pitch: 64,
            onset: ql(0, 1),
            duration: ql(1, 1),
            tab: Some(TabPosition { string: 1, fret: 0 }),
        };
        let moved = note.with_timing(ql(2, 1), ql(1, 2));
        assert_eq!(moved.onset(), ql(2, 1));
        assert_eq!(moved.tab(), Some(TabPosition { string: 1, fret: 0 }));
    }

    #[test]
    fn test_sort_by_onset_is_stable() {
        let mut events = vec![
            Event::note(62, ql(1, 1), ql(1, 1)),
            Event::note(60, ql(0, 1), ql(1, 1)),
            Event::rest(ql(1, 1), ql(1, 1)),
        ];
        sort_by_onset(&mut events);
        assert_eq!(events[0].pitches(), vec![60]);
        assert_eq!(events[1].pitches(), vec![62]);
        assert!(!events[2].is_sounding());
    }

    #[test]
    fn test_ql_abs() {
        assert_eq!(ql_abs(ql(-3, 4)), ql(3, 4));
        assert_eq!(ql_abs(ql(3, 4)), ql(3, 4));
    }
}
