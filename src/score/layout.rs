// Measure Layout - Flattens an event stream to one voice and splits it into bars
// Produces the measures of a single part under one time signature

use crate::events::raw::TempoMark;
use crate::events::types::{ql_zero, Event, QuarterLength};
use crate::groove::grid::{MeterError, TimeSignature};

use super::types::{Clef, Measure, MeasureEntry, MetronomeMark, Part, StaffKind, Tie};

/// Part name used when the source track has none
pub const DEFAULT_PART_NAME: &str = "Guitar";

/// Meter to lay out with. Unusable meters are replaced by 4/4 and the
/// reason is returned alongside.
pub fn resolve_meter(meter: &TimeSignature) -> (TimeSignature, Option<MeterError>) {
    match meter.validate() {
        Ok(()) => (*meter, None),
        Err(e) => {
            log::warn!("Laying out in 4/4 instead of {}/{}: {}", meter.numerator, meter.denominator, e);
            (TimeSignature::common(), Some(e))
        }
    }
}

/// Display name for a track, falling back to "Guitar"
pub fn part_name(track_name: Option<&str>) -> String {
    match track_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_PART_NAME.to_string(),
    }
}

/// Short form of a part name ("Guitar" -> "Gui.")
pub fn abbreviate(name: &str) -> String {
    let short: String = name.chars().take(3).collect();
    format!("{}.", short)
}

/// Reduce an event stream to a single voice.
///
/// Sounding events that share an onset merge into one chord. An event still
/// sounding when the next one starts is cut short at that onset. Every gap from
/// zero to the last release is filled with a rest, so incoming rests are
/// re-derived rather than kept.
pub fn flatten_voice(events: &[Event]) -> Vec<Event> {
    let mut sounding: Vec<&Event> = events
        .iter()
        .filter(|e| e.is_sounding() && e.duration() > ql_zero())
        .collect();
    sounding.sort_by_key(|e| e.onset());

    let mut merged: Vec<Event> = Vec::with_capacity(sounding.len());
    for event in sounding {
        match merged.last_mut() {
            Some(last) if last.onset() == event.onset() => {
                *last = merge_simultaneous(last, event);
            }
            _ => merged.push(event.clone()),
        }
    }

    for i in 1..merged.len() {
        let next_onset = merged[i].onset();
        let previous = &merged[i - 1];
        if previous.end() > next_onset {
            let trimmed = previous.with_timing(previous.onset(), next_onset - previous.onset());
            merged[i - 1] = trimmed;
        }
    }

    let mut voice = Vec::with_capacity(merged.len() * 2);
    let mut cursor = ql_zero();
    for event in merged {
        if event.onset() > cursor {
            voice.push(Event::rest(cursor, event.onset() - cursor));
        }
        cursor = event.end();
        voice.push(event);
    }

    voice
}

/// Union two events that start together. The merged chord keeps the tab of
/// whichever side holds the lowest pitch.
fn merge_simultaneous(a: &Event, b: &Event) -> Event {
    let a_low = a.pitches().first().copied();
    let b_low = b.pitches().first().copied();
    let tab = if b_low < a_low { b.tab() } else { a.tab() };

    let mut pitches = a.pitches();
    pitches.extend(b.pitches());
    let duration = a.duration().max(b.duration());

    Event::chord(pitches, a.onset(), duration).with_tab(tab)
}

/// Lay out an event stream as the measures of one part.
///
/// The meter must already be valid (see `resolve_meter`). Events crossing a
/// barline are split into tied pieces and the last bar is padded with a rest.
pub fn build_measures(events: &[Event], meter: &TimeSignature, tempos: &[TempoMark]) -> Vec<Measure> {
    let voice = flatten_voice(events);
    let bar_length = meter.bar_length();

    let total = voice.last().map(|e| e.end()).unwrap_or_else(ql_zero);
    let bar_count = ((total / bar_length).ceil().to_integer().max(1)) as u32;

    let mut measures: Vec<Measure> = (1..=bar_count).map(Measure::new).collect();
    if let Some(first) = measures.first_mut() {
        first.clef = Some(Clef::Treble8vb);
        first.time_signature = Some(*meter);
    }

    let song_end = meter.bar_start(bar_count);
    let mut padded = voice;
    if total < song_end {
        padded.push(Event::rest(total, song_end - total));
    }

    for event in &padded {
        for (bar, entry) in split_at_barlines(event, meter) {
            measures[bar as usize].entries.push(entry);
        }
    }

    for tempo in tempos {
        let position = meter.position_of(tempo.onset);
        match measures.get_mut(position.bar as usize) {
            Some(measure) => measure.tempos.push(MetronomeMark {
                offset: position.offset,
                bpm: tempo.bpm(),
            }),
            None => log::debug!("Dropping tempo change past the last bar at {}", tempo.onset),
        }
    }

    measures
}

/// Pieces of one event, one per bar it touches, with tie flags for sounding events
fn split_at_barlines(event: &Event, meter: &TimeSignature) -> Vec<(u32, MeasureEntry)> {
    let end = event.end();
    let mut pieces: Vec<(u32, QuarterLength, QuarterLength, QuarterLength)> = Vec::new();
    let mut start = event.onset();

    while start < end {
        let position = meter.position_of(start);
        let bar_end = meter.bar_start(position.bar + 1);
        let piece_end = if end < bar_end { end } else { bar_end };
        pieces.push((position.bar, position.offset, start, piece_end - start));
        start = piece_end;
    }

    let count = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, (bar, offset, onset, duration))| {
            let tie = if !event.is_sounding() || count == 1 {
                Tie::None
            } else if i == 0 {
                Tie::Start
            } else if i + 1 == count {
                Tie::Stop
            } else {
                Tie::Continue
            };
            (
                bar,
                MeasureEntry {
                    offset,
                    event: event.with_timing(onset, duration),
                    tie,
                },
            )
        })
        .collect()
}

/// Build a standard-notation part from one track's events
pub fn build_part(
    id: &str,
    track_name: Option<&str>,
    events: &[Event],
    meter: &TimeSignature,
    tempos: &[TempoMark],
) -> Part {
    let name = part_name(track_name);
    Part {
        id: id.to_string(),
        abbreviation: Some(abbreviate(&name)),
        best_name: Some(name.clone()),
        name,
        staff: StaffKind::Standard,
        measures: build_measures(events, meter, tempos),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{ql, TabPosition};

    fn measure_length(measure: &Measure) -> QuarterLength {
        measure
            .entries
            .iter()
            .fold(ql_zero(), |acc, e| acc + e.event.duration())
    }

    #[test]
    fn test_flatten_merges_simultaneous_events() {
        let low = Event::note(40, ql(0, 1), ql(1, 1)).with_tab(Some(TabPosition { string: 6, fret: 0 }));
        let high = Event::note(64, ql(0, 1), ql(2, 1)).with_tab(Some(TabPosition { string: 1, fret: 0 }));
        let voice = flatten_voice(&[high, low]);

        assert_eq!(voice.len(), 1);
        assert_eq!(voice[0].pitches(), vec![40, 64]);
        assert_eq!(voice[0].duration(), ql(2, 1));
        assert_eq!(voice[0].tab(), Some(TabPosition { string: 6, fret: 0 }));
    }

    #[test]
    fn test_flatten_truncates_overlaps_and_fills_gaps() {
        let events = vec![
            Event::note(60, ql(1, 1), ql(2, 1)),
            Event::note(62, ql(2, 1), ql(1, 1)),
            Event::note(64, ql(4, 1), ql(1, 1)),
        ];
        let voice = flatten_voice(&events);

        assert_eq!(voice.len(), 5);
        assert_eq!(voice[0], Event::rest(ql(0, 1), ql(1, 1)));
        assert_eq!(voice[1].duration(), ql(1, 1));
        assert_eq!(voice[3], Event::rest(ql(3, 1), ql(1, 1)));
    }

    #[test]
    fn test_flatten_rederives_rests() {
        let events = vec![
            Event::rest(ql(0, 1), ql(2, 1)),
            Event::note(60, ql(2, 1), ql(1, 1)),
        ];
        let voice = flatten_voice(&events);
        assert_eq!(voice, vec![Event::rest(ql(0, 1), ql(2, 1)), Event::note(60, ql(2, 1), ql(1, 1))]);
    }

    #[test]
    fn test_measures_are_full_and_first_carries_clef() {
        let events = vec![
            Event::note(60, ql(0, 1), ql(1, 1)),
            Event::note(62, ql(5, 1), ql(1, 2)),
        ];
        let measures = build_measures(&events, &TimeSignature::common(), &[]);

        assert_eq!(measures.len(), 2);
        assert_eq!(measures[0].clef, Some(Clef::Treble8vb));
        assert_eq!(measures[0].time_signature, Some(TimeSignature::common()));
        assert!(measures[1].clef.is_none());
        for measure in &measures {
            assert_eq!(measure_length(measure), ql(4, 1));
        }
    }

    #[test]
    fn test_barline_split_ties() {
        let events = vec![Event::note(60, ql(3, 1), ql(6, 1))];
        let measures = build_measures(&events, &TimeSignature::common(), &[]);

        assert_eq!(measures.len(), 3);
        let pieces: Vec<&MeasureEntry> = measures
            .iter()
            .flat_map(|m| m.entries.iter())
            .filter(|e| e.event.is_sounding())
            .collect();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].tie, Tie::Start);
        assert_eq!(pieces[0].offset, ql(3, 1));
        assert_eq!(pieces[1].tie, Tie::Continue);
        assert_eq!(pieces[1].event.duration(), ql(4, 1));
        assert_eq!(pieces[2].tie, Tie::Stop);
        assert_eq!(pieces[2].event.onset(), ql(8, 1));
    }

    #[test]
    fn test_tempos_at_measure_offsets() {
        let events = vec![Event::note(60, ql(0, 1), ql(8, 1))];
        let tempos = vec![
            TempoMark::from_bpm(ql(0, 1), 120),
            TempoMark::from_bpm(ql(9, 2), 90),
            TempoMark::from_bpm(ql(40, 1), 60),
        ];
        let measures = build_measures(&events, &TimeSignature::common(), &tempos);

        assert_eq!(measures[0].tempos.len(), 1);
        assert_eq!(measures[1].tempos[0].offset, ql(1, 2));
        assert_eq!(measures[1].tempos[0].bpm, 90.0);
        assert_eq!(measures.iter().map(|m| m.tempos.len()).sum::<usize>(), 2);
    }

    #[test]
    fn test_empty_stream_gives_one_rest_bar() {
        let measures = build_measures(&[], &TimeSignature::new(3, 4), &[]);
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0].entries.len(), 1);
        assert_eq!(measures[0].entries[0].event, Event::rest(ql(0, 1), ql(3, 1)));
    }

    #[test]
    fn test_resolve_meter_falls_back() {
        let (meter, reason) = resolve_meter(&TimeSignature::new(7, 12));
        assert_eq!(meter, TimeSignature::common());
        assert_eq!(reason, Some(MeterError::IrregularDenominator(12)));

        let (meter, reason) = resolve_meter(&TimeSignature::new(6, 8));
        assert_eq!(meter, TimeSignature::new(6, 8));
        assert!(reason.is_none());
    }

    #[test]
    fn test_build_part_names() {
        let part = build_part("P1", None, &[], &TimeSignature::common(), &[]);
        assert_eq!(part.name, "Guitar");
        assert_eq!(part.abbreviation.as_deref(), Some("Gui."));
        assert_eq!(part.best_name.as_deref(), Some("Guitar"));

        let part = build_part("P1", Some("  Lead "), &[], &TimeSignature::common(), &[]);
        assert_eq!(part.name, "Lead");
    }
}
