// Raw transcription events
// Unprocessed pitch/onset/duration stream as produced by the inference collaborator

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{ql_zero, Event, QuarterLength};
use crate::groove::grid::TimeSignature;

/// Default MIDI resolution for raw streams built outside a MIDI file
pub const DEFAULT_TICKS_PER_QUARTER: u16 = 480;

/// A single transcribed note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNote {
    /// MIDI pitch (0-127)
    pub pitch: u8,

    /// Start time in quarter-lengths
    pub onset: QuarterLength,

    /// Length in quarter-lengths (> 0)
    pub duration: QuarterLength,

    /// Source track index
    pub track: usize,
}

/// Tempo change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoMark {
    pub onset: QuarterLength,

    /// MIDI tempo: microseconds per quarter note
    pub micros_per_quarter: u32,
}

impl TempoMark {
    pub fn from_bpm(onset: QuarterLength, bpm: u32) -> Self {
        TempoMark {
            onset,
            micros_per_quarter: 60_000_000 / bpm.max(1),
        }
    }

    /// Beats per minute, rounded to two decimals
    pub fn bpm(&self) -> f64 {
        if self.micros_per_quarter == 0 {
            return 0.0;
        }
        let bpm = 60_000_000.0 / self.micros_per_quarter as f64;
        (bpm * 100.0).round() / 100.0
    }
}

/// Complete raw event stream for one recording.
/// Produced once and never mutated; every stage derives a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvents {
    /// Resolution the timeline was recorded at
    pub ticks_per_quarter: u16,

    /// First time signature in the stream (4/4 when absent)
    pub time_signature: TimeSignature,

    pub tempos: Vec<TempoMark>,

    /// Notes ordered by onset, then track, then pitch
    pub notes: Vec<RawNote>,

    /// Track index -> track name
    pub track_names: BTreeMap<usize, String>,

    /// Free text carried by the source (copyright, text events)
    pub annotations: Vec<String>,
}

impl Default for RawEvents {
    fn default() -> Self {
        RawEvents {
            ticks_per_quarter: DEFAULT_TICKS_PER_QUARTER,
            time_signature: TimeSignature::common(),
            tempos: Vec::new(),
            notes: Vec::new(),
            track_names: BTreeMap::new(),
            annotations: Vec::new(),
        }
    }
}

impl RawEvents {
    /// Build a single-track stream from (pitch, onset, duration) triples
    pub fn from_triples(triples: &[(u8, QuarterLength, QuarterLength)]) -> Self {
        let mut raw = RawEvents {
            notes: triples
                .iter()
                .map(|&(pitch, onset, duration)| RawNote {
                    pitch,
                    onset,
                    duration,
                    track: 0,
                })
                .collect(),
            ..Default::default()
        };
        raw.sort_notes();
        raw
    }

    pub fn sort_notes(&mut self) {
        self.notes
            .sort_by(|a, b| (a.onset, a.track, a.pitch).cmp(&(b.onset, b.track, b.pitch)));
    }

    /// Track indices that carry at least one note, ascending
    pub fn note_tracks(&self) -> Vec<usize> {
        let mut tracks: Vec<usize> = self.notes.iter().map(|n| n.track).collect();
        tracks.sort_unstable();
        tracks.dedup();
        tracks
    }

    pub fn track_name(&self, track: usize) -> Option<&str> {
        self.track_names.get(&track).map(|s| s.as_str())
    }

    /// Build the flat event stream for one track.
    ///
    /// Notes sharing an onset become a chord lasting as long as its longest
    /// member. Gaps between sounding spans become rests.
    pub fn events_for_track(&self, track: usize) -> Vec<Event> {
        let mut groups: BTreeMap<QuarterLength, (Vec<u8>, QuarterLength)> = BTreeMap::new();

        for note in self.notes.iter().filter(|n| n.track == track) {
            let entry = groups.entry(note.onset).or_insert_with(|| (Vec::new(), ql_zero()));
            entry.0.push(note.pitch);
            if note.duration > entry.1 {
                entry.1 = note.duration;
            }
        }

        let mut events = Vec::with_capacity(groups.len() * 2);
        let mut cursor = ql_zero();

        for (onset, (pitches, duration)) in groups {
            if onset > cursor {
                events.push(Event::rest(cursor, onset - cursor));
            }
            events.push(Event::chord(pitches, onset, duration));

            let end = onset + duration;
            if end > cursor {
                cursor = end;
            }
        }

        events
    }
}
