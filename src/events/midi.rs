// MIDI ingestion - Standard MIDI File <-> RawEvents using the midly crate
// The stored raw MIDI is the source every transposition is re-derived from

use std::collections::{BTreeMap, HashMap, VecDeque};

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use thiserror::Error;

use super::raw::{RawEvents, RawNote, TempoMark};
use super::types::{ql, QuarterLength};
use crate::groove::grid::TimeSignature;

/// Errors raised when raw input cannot be read as an event stream
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid MIDI data: {0}")]
    InvalidMidi(#[from] midly::Error),

    #[error("SMPTE timecode timing is not supported")]
    UnsupportedTiming,

    #[error("MIDI resolution must be positive")]
    ZeroResolution,

    #[error("MIDI file contains no notes")]
    NoNotes,
}

/// Event streams that a Standard MIDI File cannot represent
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("pitch {pitch} is outside the MIDI range 0-127")]
    PitchOutOfRange { pitch: u8 },

    #[error("resolution {0} is outside 1..=32767 ticks per quarter")]
    Resolution(u16),

    #[error("note {index} has a negative onset or a non-positive duration")]
    BadTiming { index: usize },

    #[error("tempo of {0} microseconds per quarter does not fit in 24 bits")]
    TempoOutOfRange(u32),

    #[error("failed to encode MIDI: {0}")]
    Io(#[from] std::io::Error),
}

const MAX_PITCH: u8 = 0x7F;
const MAX_TICKS_PER_QUARTER: u16 = 0x7FFF;
const MAX_MICROS_PER_QUARTER: u32 = 0xFF_FFFF;

/// Reject values the midly conversions would silently mask
fn check_writable(raw: &RawEvents) -> Result<(), WriteError> {
    if raw.ticks_per_quarter == 0 || raw.ticks_per_quarter > MAX_TICKS_PER_QUARTER {
        return Err(WriteError::Resolution(raw.ticks_per_quarter));
    }
    for (index, note) in raw.notes.iter().enumerate() {
        if note.pitch > MAX_PITCH {
            return Err(WriteError::PitchOutOfRange { pitch: note.pitch });
        }
        if note.onset < ql(0, 1) || note.duration <= ql(0, 1) {
            return Err(WriteError::BadTiming { index });
        }
    }
    if let Some(tempo) = raw
        .tempos
        .iter()
        .find(|t| t.micros_per_quarter > MAX_MICROS_PER_QUARTER)
    {
        return Err(WriteError::TempoOutOfRange(tempo.micros_per_quarter));
    }
    Ok(())
}

/// Parse Standard MIDI File bytes into a raw event stream
pub fn parse_midi(bytes: &[u8]) -> Result<RawEvents, ParseError> {
    let smf = Smf::parse(bytes)?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(ppq) => ppq.as_int(),
        Timing::Timecode(..) => return Err(ParseError::UnsupportedTiming),
    };
    if ticks_per_quarter == 0 {
        return Err(ParseError::ZeroResolution);
    }

    let to_ql = |tick: u64| -> QuarterLength { ql(tick as i64, ticks_per_quarter as i64) };

    let mut notes = Vec::new();
    let mut tempos = Vec::new();
    let mut time_signature: Option<(u64, TimeSignature)> = None;
    let mut track_names = BTreeMap::new();
    let mut annotations = Vec::new();

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        // (channel, key) -> start ticks, first in first out
        let mut open: HashMap<(u8, u8), VecDeque<u64>> = HashMap::new();

        for event in track {
            tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open.entry((channel, key.as_int())).or_default().push_back(tick);
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let pitch = key.as_int();
                            if let Some(start) =
                                open.get_mut(&(channel, pitch)).and_then(|q| q.pop_front())
                            {
                                push_note(&mut notes, pitch, start, tick, track_index, &to_ql);
                            }
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempos.push(TempoMark {
                        onset: to_ql(tick),
                        micros_per_quarter: u32::from(tempo),
                    });
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, exponent, _, _)) => {
                    let earlier = time_signature.map(|(t, _)| tick < t).unwrap_or(true);
                    if earlier {
                        time_signature = Some((tick, TimeSignature::from_midi(numerator, exponent)));
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    let name = String::from_utf8_lossy(name).trim().to_string();
                    if !name.is_empty() {
                        track_names.entry(track_index).or_insert(name);
                    }
                }
                TrackEventKind::Meta(MetaMessage::Copyright(text))
                | TrackEventKind::Meta(MetaMessage::Text(text)) => {
                    let text = String::from_utf8_lossy(text).trim().to_string();
                    if !text.is_empty() {
                        annotations.push(text);
                    }
                }
                _ => {}
            }
        }

        // Close anything still sounding at the end of the track
        let mut dangling: Vec<((u8, u8), u64)> = open
            .into_iter()
            .flat_map(|(key, starts)| starts.into_iter().map(move |s| (key, s)))
            .collect();
        dangling.sort_unstable();
        for ((_, pitch), start) in dangling {
            push_note(&mut notes, pitch, start, tick, track_index, &to_ql);
        }
    }

    if notes.is_empty() {
        return Err(ParseError::NoNotes);
    }

    tempos.sort_by_key(|t| t.onset);

    let mut raw = RawEvents {
        ticks_per_quarter,
        time_signature: time_signature.map(|(_, ts)| ts).unwrap_or_default(),
        tempos,
        notes,
        track_names,
        annotations,
    };
    raw.sort_notes();

    log::debug!(
        "Parsed MIDI: {} notes, {} tracks, {} tempo marks, {}/{}",
        raw.notes.len(),
        raw.note_tracks().len(),
        raw.tempos.len(),
        raw.time_signature.numerator,
        raw.time_signature.denominator
    );

    Ok(raw)
}

fn push_note(
    notes: &mut Vec<RawNote>,
    pitch: u8,
    start: u64,
    end: u64,
    track: usize,
    to_ql: &impl Fn(u64) -> QuarterLength,
) {
    if end <= start {
        log::debug!("Skipping zero-length note {} at tick {}", pitch, start);
        return;
    }
    notes.push(RawNote {
        pitch,
        onset: to_ql(start),
        duration: to_ql(end - start),
        track,
    });
}

/// Write a raw event stream as a format-1 MIDI file.
/// Track 0 carries tempo, meter, and text; each note track follows in order.
/// Streams with values outside the MIDI ranges are rejected, not truncated.
pub fn write_midi(raw: &RawEvents) -> Result<Vec<u8>, WriteError> {
    check_writable(raw)?;
    let ppq = raw.ticks_per_quarter;
    let to_tick = |value: QuarterLength| -> u32 {
        let ticks = (value * QuarterLength::from_integer(ppq as i64)).round().to_integer();
        ticks.clamp(0, u32::MAX as i64) as u32
    };

    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical(ppq.into()),
    };

    let mut tracks = Vec::new();

    // Conductor track
    let mut meta: Vec<(u32, u8, TrackEventKind)> = Vec::new();
    let ts = raw.time_signature;
    meta.push((
        0,
        0,
        TrackEventKind::Meta(MetaMessage::TimeSignature(
            ts.numerator,
            ts.denominator_exponent(),
            24,
            8,
        )),
    ));
    for tempo in &raw.tempos {
        meta.push((
            to_tick(tempo.onset),
            0,
            TrackEventKind::Meta(MetaMessage::Tempo(tempo.micros_per_quarter.into())),
        ));
    }
    for text in &raw.annotations {
        meta.push((0, 0, TrackEventKind::Meta(MetaMessage::Text(text.as_bytes()))));
    }
    tracks.push(to_track(meta));

    for track_index in raw.note_tracks() {
        let mut events: Vec<(u32, u8, TrackEventKind)> = Vec::new();

        if let Some(name) = raw.track_name(track_index) {
            events.push((0, 0, TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes()))));
        }

        for note in raw.notes.iter().filter(|n| n.track == track_index) {
            let on = to_tick(note.onset);
            let off = to_tick(note.onset + note.duration).max(on + 1);

            // Note-offs sort before note-ons on the same tick
            events.push((
                on,
                2,
                TrackEventKind::Midi {
                    channel: 0.into(),
                    message: MidiMessage::NoteOn {
                        key: note.pitch.into(),
                        vel: 80.into(),
                    },
                },
            ));
            events.push((
                off,
                1,
                TrackEventKind::Midi {
                    channel: 0.into(),
                    message: MidiMessage::NoteOff {
                        key: note.pitch.into(),
                        vel: 0.into(),
                    },
                },
            ));
        }

        tracks.push(to_track(events));
    }

    let smf = Smf { header, tracks };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)?;

    Ok(bytes)
}

/// Sort absolute-time events and convert to a delta-timed track
fn to_track<'a>(mut events: Vec<(u32, u8, TrackEventKind<'a>)>) -> Track<'a> {
    events.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut track = Track::new();
    let mut last_tick = 0;
    for (tick, _, kind) in events {
        track.push(TrackEvent {
            delta: tick.saturating_sub(last_tick).into(),
            kind,
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: 0u32.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    track
}
