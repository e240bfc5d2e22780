// Fretboard mapping - assigns a (string, fret) position to each pitch
// Open strings win outright, otherwise the lowest fret, lower string index on ties

use crate::events::types::{Event, TabPosition};

use super::tuning::Tuning;

/// Highest fret on the default instrument
pub const DEFAULT_MAX_FRET: u8 = 24;

/// Outcome of a fretboard lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabLookup {
    /// A string reaches the pitch within the fret bound
    Found(TabPosition),

    /// No string reaches it; placed on the lowest string instead
    Fallback(TabPosition),
}

impl TabLookup {
    pub fn position(&self) -> TabPosition {
        match self {
            TabLookup::Found(pos) | TabLookup::Fallback(pos) => *pos,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, TabLookup::Fallback(_))
    }
}

/// Find the tab position for a single pitch
pub fn map_pitch(pitch: u8, tuning: &Tuning, max_fret: u8) -> TabLookup {
    let mut best: Option<TabPosition> = None;

    for (string, open_pitch) in tuning.strings() {
        let fret = pitch as i32 - open_pitch as i32;

        if fret == 0 {
            return TabLookup::Found(TabPosition { string, fret: 0 });
        }

        if fret > 0 && fret <= max_fret as i32 {
            let better = match best {
                Some(current) => (fret as u8) < current.fret,
                None => true,
            };
            if better {
                best = Some(TabPosition {
                    string,
                    fret: fret as u8,
                });
            }
        }
    }

    match best {
        Some(pos) => TabLookup::Found(pos),
        None => {
            let string = tuning.lowest_string();
            let open = tuning.open_pitch(string).unwrap_or(0);
            let fret = (pitch as i32 - open as i32).clamp(0, u8::MAX as i32) as u8;
            log::debug!(
                "No fret position for pitch {} within {} frets, using string {} fret {}",
                pitch,
                max_fret,
                string,
                fret
            );
            TabLookup::Fallback(TabPosition { string, fret })
        }
    }
}

/// Attach tab positions: notes by their pitch, chords by their lowest pitch.
/// Rests are returned unchanged.
pub fn annotate_events(events: &[Event], tuning: &Tuning, max_fret: u8) -> Vec<Event> {
    let mut fallbacks = 0usize;

    let annotated = events
        .iter()
        .map(|event| match event {
            Event::Note {
                pitch,
                onset,
                duration,
                ..
            } => {
                let lookup = map_pitch(*pitch, tuning, max_fret);
                if lookup.is_fallback() {
                    fallbacks += 1;
                }
                Event::Note {
                    pitch: *pitch,
                    onset: *onset,
                    duration: *duration,
                    tab: Some(lookup.position()),
                }
            }
            Event::Chord {
                pitches,
                onset,
                duration,
                ..
            } => {
                // Only the lowest chord tone is fingered
                let tab = pitches.first().map(|root| {
                    let lookup = map_pitch(*root, tuning, max_fret);
                    if lookup.is_fallback() {
                        fallbacks += 1;
                    }
                    lookup.position()
                });
                Event::Chord {
                    pitches: pitches.clone(),
                    onset: *onset,
                    duration: *duration,
                    tab,
                }
            }
            Event::Rest { onset, duration } => Event::Rest {
                onset: *onset,
                duration: *duration,
            },
        })
        .collect();

    if fallbacks > 0 {
        log::debug!("{} events placed with the lowest-string fallback", fallbacks);
    }

    annotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::ql;

    fn lookup(pitch: u8) -> TabLookup {
        map_pitch(pitch, &Tuning::standard(), DEFAULT_MAX_FRET)
    }

    #[test]
    fn test_open_string_priority() {
        assert_eq!(lookup(64), TabLookup::Found(TabPosition { string: 1, fret: 0 }));
        assert_eq!(lookup(45), TabLookup::Found(TabPosition { string: 5, fret: 0 }));
        assert_eq!(lookup(40), TabLookup::Found(TabPosition { string: 6, fret: 0 }));
    }

    #[test]
    fn test_open_string_beats_earlier_fretted_string() {
        // Reversed tuning: strings 1-5 all reach 64 on a fret before string 6 is scanned
        let tuning = Tuning::new([40, 45, 50, 55, 59, 64]).unwrap();
        assert_eq!(
            map_pitch(64, &tuning, DEFAULT_MAX_FRET),
            TabLookup::Found(TabPosition { string: 6, fret: 0 })
        );
        assert_eq!(lookup(50), TabLookup::Found(TabPosition { string: 4, fret: 0 }));
    }

    #[test]
    fn test_minimal_fret_tie_break() {
        // String 4 fret 2, string 5 fret 7, string 6 fret 12
        assert_eq!(lookup(52), TabLookup::Found(TabPosition { string: 4, fret: 2 }));
    }

    #[test]
    fn test_lower_string_index_wins_equal_frets() {
        // Standard tuning never ties, so use a unison pair
        let tuning = Tuning::new([60, 60, 55, 50, 45, 40]).unwrap();
        assert_eq!(
            map_pitch(62, &tuning, DEFAULT_MAX_FRET),
            TabLookup::Found(TabPosition { string: 1, fret: 2 })
        );
    }

    #[test]
    fn test_fret_bounds_over_playable_range() {
        for pitch in 40..=88u8 {
            let result = lookup(pitch);
            let pos = result.position();
            assert!(!result.is_fallback(), "pitch {} fell back", pitch);
            assert!((1..=6).contains(&pos.string), "pitch {}", pitch);
            assert!(pos.fret <= 24, "pitch {}", pitch);
            let open = Tuning::standard().open_pitch(pos.string).unwrap();
            assert_eq!(open + pos.fret, pitch);
        }
    }

    #[test]
    fn test_highest_pitch_uses_high_string() {
        assert_eq!(lookup(88), TabLookup::Found(TabPosition { string: 1, fret: 24 }));
    }

    #[test]
    fn test_fallback_below_range() {
        let result = lookup(30);
        assert_eq!(result, TabLookup::Fallback(TabPosition { string: 6, fret: 0 }));
    }

    #[test]
    fn test_fallback_above_range() {
        let result = lookup(100);
        assert_eq!(result, TabLookup::Fallback(TabPosition { string: 6, fret: 60 }));
    }

    #[test]
    fn test_annotate_events() {
        let events = vec![
            Event::note(52, ql(0, 1), ql(1, 1)),
            Event::chord(vec![57, 45, 52], ql(1, 1), ql(1, 1)),
            Event::rest(ql(2, 1), ql(1, 1)),
        ];
        let annotated = annotate_events(&events, &Tuning::standard(), DEFAULT_MAX_FRET);

        assert_eq!(annotated[0].tab(), Some(TabPosition { string: 4, fret: 2 }));
        // Lowest chord tone (45) is open A
        assert_eq!(annotated[1].tab(), Some(TabPosition { string: 5, fret: 0 }));
        assert_eq!(annotated[1].pitches(), vec![45, 52, 57]);
        assert_eq!(annotated[2].tab(), None);
    }
}
