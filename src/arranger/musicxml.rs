// MusicXML Export - Serialize a score to MusicXML 4.0 partwise using quick-xml
// Produces the notation document returned to callers and written to disk

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer;
use thiserror::Error;

use super::durations::decompose;
use crate::events::types::{ql_zero, Event, QuarterLength, TabPosition};
use crate::fretboard::tuning::Tuning;
use crate::groove::grid::TimeSignature;
use crate::score::types::{Clef, Credit, GroupSymbol, Measure, MeasureEntry, Part, Score, StaffKind};

const DOCTYPE: &str = r#"score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd""#;

const STEPS: [(&str, i8); 12] = [
    ("C", 0),
    ("C", 1),
    ("D", 0),
    ("D", 1),
    ("E", 0),
    ("F", 0),
    ("F", 1),
    ("G", 0),
    ("G", 1),
    ("A", 0),
    ("A", 1),
    ("B", 0),
];

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("credit position ({x}, {y}) does not fit a 32-bit coordinate")]
    CreditOutOfRange { x: i64, y: i64 },

    #[error("divisions per quarter overflowed")]
    DivisionsOverflow,

    #[error("XML write failed: {0}")]
    Xml(String),

    #[error("output is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Serialize a score to a MusicXML document string
pub fn write_score(score: &Score) -> Result<String, SerializeError> {
    for credit in &score.credits {
        credit_coordinates(credit)?;
    }

    let divisions = divisions_for(score)?;
    let mut out = MusicXmlWriter::new(divisions);

    out.emit(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))?;
    out.emit(XmlEvent::DocType(BytesText::from_escaped(DOCTYPE)))?;
    out.start_with("score-partwise", &[("version", "4.0")])?;

    out.write_header(score)?;
    out.write_part_list(score)?;
    for part in &score.parts {
        out.write_part(part)?;
    }

    out.end("score-partwise")?;
    out.finish()
}

/// Credit position as 32-bit tenths
fn credit_coordinates(credit: &Credit) -> Result<(i32, i32), SerializeError> {
    let out_of_range = || SerializeError::CreditOutOfRange {
        x: credit.default_x,
        y: credit.default_y,
    };
    let x = i32::try_from(credit.default_x).map_err(|_| out_of_range())?;
    let y = i32::try_from(credit.default_y).map_err(|_| out_of_range())?;
    Ok((x, y))
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.abs()
}

fn lcm(a: i64, b: i64) -> Result<i64, SerializeError> {
    (a / gcd(a, b))
        .checked_mul(b)
        .ok_or(SerializeError::DivisionsOverflow)
}

/// Smallest divisions-per-quarter that expresses every written offset and length
fn divisions_for(score: &Score) -> Result<i64, SerializeError> {
    let mut divisions = 1i64;
    for measure in score.parts.iter().flat_map(|p| p.measures.iter()) {
        for entry in &measure.entries {
            divisions = lcm(divisions, *entry.offset.denom())?;
            for length in written_lengths(entry.event.duration()) {
                divisions = lcm(divisions, *length.denom())?;
            }
        }
        for tempo in &measure.tempos {
            divisions = lcm(divisions, *tempo.offset.denom())?;
        }
    }
    Ok(divisions)
}

/// Lengths of the notes actually written for one entry
fn written_lengths(duration: QuarterLength) -> Vec<QuarterLength> {
    match decompose(duration) {
        Some(pieces) => pieces.into_iter().map(|p| p.length).collect(),
        None => vec![duration],
    }
}

/// Step, alter, and octave for a MIDI pitch (sharps only)
fn spell(pitch: u8) -> (&'static str, i8, i8) {
    let (step, alter) = STEPS[(pitch % 12) as usize];
    (step, alter, (pitch / 12) as i8 - 1)
}

struct MusicXmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
    divisions: i64,
}

impl MusicXmlWriter {
    fn new(divisions: i64) -> Self {
        MusicXmlWriter {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
            divisions,
        }
    }

    fn finish(self) -> Result<String, SerializeError> {
        let bytes = self.writer.into_inner().into_inner();
        Ok(String::from_utf8(bytes)?)
    }

    fn emit(&mut self, event: XmlEvent<'_>) -> Result<(), SerializeError> {
        self.writer
            .write_event(event)
            .map_err(|e| SerializeError::Xml(e.to_string()))
    }

    fn start(&mut self, name: &str) -> Result<(), SerializeError> {
        self.emit(XmlEvent::Start(BytesStart::new(name)))
    }

    fn start_with(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), SerializeError> {
        self.emit(XmlEvent::Start(
            BytesStart::new(name).with_attributes(attrs.iter().copied()),
        ))
    }

    fn end(&mut self, name: &str) -> Result<(), SerializeError> {
        self.emit(XmlEvent::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), SerializeError> {
        self.emit(XmlEvent::Empty(
            BytesStart::new(name).with_attributes(attrs.iter().copied()),
        ))
    }

    fn text(&mut self, name: &str, value: &str) -> Result<(), SerializeError> {
        self.start(name)?;
        self.emit(XmlEvent::Text(BytesText::new(value)))?;
        self.end(name)
    }

    /// A quarter-length expressed in divisions
    fn ticks(&self, value: QuarterLength) -> Result<i64, SerializeError> {
        (*value.numer())
            .checked_mul(self.divisions / *value.denom())
            .ok_or(SerializeError::DivisionsOverflow)
    }

    fn write_header(&mut self, score: &Score) -> Result<(), SerializeError> {
        if let Some(title) = &score.metadata.title {
            self.start("work")?;
            self.text("work-title", title)?;
            self.end("work")?;
            self.text("movement-title", title)?;
        }

        self.start("identification")?;
        if let Some(composer) = &score.metadata.composer {
            self.start_with("creator", &[("type", "composer")])?;
            self.emit(XmlEvent::Text(BytesText::new(composer)))?;
            self.end("creator")?;
        }
        self.start("encoding")?;
        self.text("software", concat!("fretscribe ", env!("CARGO_PKG_VERSION")))?;
        self.end("encoding")?;
        self.end("identification")?;

        for credit in &score.credits {
            let (x, y) = credit_coordinates(credit)?;
            let page = credit.page.to_string();
            let (x, y) = (x.to_string(), y.to_string());
            self.start_with("credit", &[("page", page.as_str())])?;
            self.start_with(
                "credit-words",
                &[
                    ("default-x", x.as_str()),
                    ("default-y", y.as_str()),
                    ("justify", "center"),
                    ("valign", "top"),
                ],
            )?;
            self.emit(XmlEvent::Text(BytesText::new(&credit.words)))?;
            self.end("credit-words")?;
            self.end("credit")?;
        }

        Ok(())
    }

    fn write_part_list(&mut self, score: &Score) -> Result<(), SerializeError> {
        self.start("part-list")?;

        for part in &score.parts {
            for (index, group) in score.staff_groups.iter().enumerate() {
                if group.part_ids.first() == Some(&part.id) {
                    let number = (index + 1).to_string();
                    self.start_with("part-group", &[("type", "start"), ("number", number.as_str())])?;
                    if let Some(label) = &group.label {
                        self.text("group-name", label)?;
                    }
                    let symbol = match group.symbol {
                        GroupSymbol::Bracket => "bracket",
                        GroupSymbol::Brace => "brace",
                        GroupSymbol::Line => "line",
                    };
                    self.text("group-symbol", symbol)?;
                    self.text("group-barline", if group.shared_barlines { "yes" } else { "no" })?;
                    self.end("part-group")?;
                }
            }

            self.start_with("score-part", &[("id", part.id.as_str())])?;
            self.text("part-name", &part.name)?;
            if let Some(abbreviation) = &part.abbreviation {
                self.text("part-abbreviation", abbreviation)?;
            }
            self.end("score-part")?;

            for (index, group) in score.staff_groups.iter().enumerate() {
                if group.part_ids.last() == Some(&part.id) {
                    let number = (index + 1).to_string();
                    self.empty("part-group", &[("type", "stop"), ("number", number.as_str())])?;
                }
            }
        }

        self.end("part-list")
    }

    fn write_part(&mut self, part: &Part) -> Result<(), SerializeError> {
        self.start_with("part", &[("id", part.id.as_str())])?;
        for measure in &part.measures {
            self.write_measure(measure, &part.staff)?;
        }
        self.end("part")
    }

    fn write_measure(&mut self, measure: &Measure, staff: &StaffKind) -> Result<(), SerializeError> {
        let number = measure.number.to_string();
        self.start_with("measure", &[("number", number.as_str())])?;

        if measure.number == 1 || measure.clef.is_some() || measure.time_signature.is_some() {
            self.write_attributes(measure, staff)?;
        }

        // Each metronome mark goes just before the entry sounding at its offset
        let mut pending: Vec<_> = measure.tempos.iter().collect();
        pending.sort_by_key(|t| t.offset);

        let mut cursor = ql_zero();
        for entry in &measure.entries {
            let entry_end = entry.offset + entry.event.duration();
            while let Some(tempo) = pending.first() {
                if tempo.offset >= entry_end {
                    break;
                }
                let shift = tempo.offset - entry.offset;
                self.write_tempo(tempo.bpm, shift)?;
                pending.remove(0);
            }
            self.write_entry(entry)?;
            cursor = entry_end;
        }
        for tempo in pending {
            self.write_tempo(tempo.bpm, tempo.offset - cursor)?;
        }

        self.end("measure")
    }

    fn write_attributes(&mut self, measure: &Measure, staff: &StaffKind) -> Result<(), SerializeError> {
        self.start("attributes")?;

        if measure.number == 1 {
            self.text("divisions", &self.divisions.to_string())?;
            self.start("key")?;
            self.text("fifths", "0")?;
            self.end("key")?;
        }
        if let Some(meter) = &measure.time_signature {
            self.write_time(meter)?;
        }
        if let Some(clef) = measure.clef {
            self.write_clef(clef)?;
        }
        if let (1, StaffKind::Tablature(tuning)) = (measure.number, staff) {
            self.write_staff_details(tuning)?;
        }

        self.end("attributes")
    }

    fn write_time(&mut self, meter: &TimeSignature) -> Result<(), SerializeError> {
        self.start("time")?;
        self.text("beats", &meter.numerator.to_string())?;
        self.text("beat-type", &meter.denominator.to_string())?;
        self.end("time")
    }

    fn write_clef(&mut self, clef: Clef) -> Result<(), SerializeError> {
        self.start("clef")?;
        match clef {
            Clef::Treble8vb => {
                self.text("sign", "G")?;
                self.text("line", "2")?;
                self.text("clef-octave-change", "-1")?;
            }
            Clef::Treble => {
                self.text("sign", "G")?;
                self.text("line", "2")?;
            }
            Clef::Bass => {
                self.text("sign", "F")?;
                self.text("line", "4")?;
            }
            Clef::Tab => {
                self.text("sign", "TAB")?;
                self.text("line", "5")?;
            }
        }
        self.end("clef")
    }

    /// Six-line staff; line 1 is the lowest string
    fn write_staff_details(&mut self, tuning: &Tuning) -> Result<(), SerializeError> {
        self.start("staff-details")?;
        self.text("staff-lines", &tuning.open_pitches.len().to_string())?;

        for (line, open) in tuning.open_pitches.iter().rev().enumerate() {
            let (step, alter, octave) = spell(*open);
            let line = (line + 1).to_string();
            self.start_with("staff-tuning", &[("line", line.as_str())])?;
            self.text("tuning-step", step)?;
            if alter != 0 {
                self.text("tuning-alter", &alter.to_string())?;
            }
            self.text("tuning-octave", &octave.to_string())?;
            self.end("staff-tuning")?;
        }

        self.end("staff-details")
    }

    fn write_tempo(&mut self, bpm: f64, shift: QuarterLength) -> Result<(), SerializeError> {
        let per_minute = format_bpm(bpm);

        self.start_with("direction", &[("placement", "above")])?;
        self.start("direction-type")?;
        self.start("metronome")?;
        self.text("beat-unit", "quarter")?;
        self.text("per-minute", &per_minute)?;
        self.end("metronome")?;
        self.end("direction-type")?;
        if *shift.numer() != 0 {
            let offset = self.ticks(shift)?;
            self.text("offset", &offset.to_string())?;
        }
        self.empty("sound", &[("tempo", per_minute.as_str())])?;
        self.end("direction")
    }

    fn write_entry(&mut self, entry: &MeasureEntry) -> Result<(), SerializeError> {
        let duration = entry.event.duration();

        let pieces: Vec<(QuarterLength, Option<(&'static str, u8)>)> = match decompose(duration) {
            Some(values) => values
                .into_iter()
                .map(|v| (v.length, Some((v.type_name, v.dots))))
                .collect(),
            None => vec![(duration, None)],
        };

        let count = pieces.len();
        for (index, (length, note_type)) in pieces.into_iter().enumerate() {
            let tie_stop = index > 0 || entry.tie.stops();
            let tie_start = index + 1 < count || entry.tie.starts();
            let written = WrittenNote {
                length,
                note_type,
                tie_start: tie_start && entry.event.is_sounding(),
                tie_stop: tie_stop && entry.event.is_sounding(),
            };

            match &entry.event {
                Event::Rest { .. } => self.write_note(None, &written, false, None)?,
                Event::Note { pitch, tab, .. } => self.write_note(Some(*pitch), &written, false, *tab)?,
                Event::Chord { pitches, tab, .. } => {
                    for (i, pitch) in pitches.iter().enumerate() {
                        let tab = if i == 0 { *tab } else { None };
                        self.write_note(Some(*pitch), &written, i > 0, tab)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn write_note(
        &mut self,
        pitch: Option<u8>,
        written: &WrittenNote,
        chord_member: bool,
        tab: Option<TabPosition>,
    ) -> Result<(), SerializeError> {
        self.start("note")?;

        if chord_member {
            self.empty("chord", &[])?;
        }
        match pitch {
            Some(pitch) => {
                let (step, alter, octave) = spell(pitch);
                self.start("pitch")?;
                self.text("step", step)?;
                if alter != 0 {
                    self.text("alter", &alter.to_string())?;
                }
                self.text("octave", &octave.to_string())?;
                self.end("pitch")?;
            }
            None => self.empty("rest", &[])?,
        }

        let ticks = self.ticks(written.length)?;
        self.text("duration", &ticks.to_string())?;
        if written.tie_stop {
            self.empty("tie", &[("type", "stop")])?;
        }
        if written.tie_start {
            self.empty("tie", &[("type", "start")])?;
        }
        self.text("voice", "1")?;
        if let Some((type_name, dots)) = written.note_type {
            self.text("type", type_name)?;
            for _ in 0..dots {
                self.empty("dot", &[])?;
            }
        }

        if written.tie_start || written.tie_stop || tab.is_some() {
            self.start("notations")?;
            if written.tie_stop {
                self.empty("tied", &[("type", "stop")])?;
            }
            if written.tie_start {
                self.empty("tied", &[("type", "start")])?;
            }
            if let Some(position) = tab {
                self.start("technical")?;
                self.text("string", &position.string.to_string())?;
                self.text("fret", &position.fret.to_string())?;
                self.end("technical")?;
            }
            self.end("notations")?;
        }

        self.end("note")
    }
}

/// One written note: a piece of an entry
struct WrittenNote {
    length: QuarterLength,
    note_type: Option<(&'static str, u8)>,
    tie_start: bool,
    tie_stop: bool,
}

/// Tempo text without a trailing ".0" for whole numbers
fn format_bpm(bpm: f64) -> String {
    if bpm.fract() == 0.0 {
        format!("{}", bpm as i64)
    } else {
        format!("{}", bpm)
    }
}
