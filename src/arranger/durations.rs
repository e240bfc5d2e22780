// Duration helpers for MusicXML export
// Maps exact quarter-lengths onto note types, dots, and tied pieces

use crate::events::types::{ql, ql_zero, QuarterLength};

/// Number of 64th notes in a quarter note
const SIXTY_FOURTHS_PER_QUARTER: i64 = 16;

/// Undotted note types with their length in 64th notes, longest first
const NOTE_TYPES: [(&str, i64); 7] = [
    ("whole", 64),
    ("half", 32),
    ("quarter", 16),
    ("eighth", 8),
    ("16th", 4),
    ("32nd", 2),
    ("64th", 1),
];

/// A single written note value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteValue {
    pub type_name: &'static str,
    pub dots: u8,
    pub length: QuarterLength,
}

/// Length in 64ths of a type with the given dots, if it is a whole number
fn dotted_units(base: i64, dots: u8) -> Option<i64> {
    match dots {
        0 => Some(base),
        1 if base % 2 == 0 => Some(base * 3 / 2),
        2 if base % 4 == 0 => Some(base * 7 / 4),
        _ => None,
    }
}

/// Every writable value (up to two dots), longest first
fn candidates() -> Vec<(&'static str, u8, i64)> {
    let mut values: Vec<(&'static str, u8, i64)> = NOTE_TYPES
        .iter()
        .flat_map(|&(name, base)| {
            (0..=2u8).filter_map(move |dots| dotted_units(base, dots).map(|units| (name, dots, units)))
        })
        .collect();
    values.sort_by(|a, b| b.2.cmp(&a.2));
    values
}

/// Exact note type for a duration, if a single typed note can express it
///
/// # Examples
/// ```
/// use fretscribe_lib::arranger::durations::note_type;
/// use fretscribe_lib::events::ql;
///
/// assert_eq!(note_type(ql(1, 1)), Some(("quarter", 0)));
/// assert_eq!(note_type(ql(3, 4)), Some(("eighth", 1)));
/// assert_eq!(note_type(ql(1, 3)), None);
/// ```
pub fn note_type(duration: QuarterLength) -> Option<(&'static str, u8)> {
    let units = sixty_fourths(duration)?;
    candidates()
        .into_iter()
        .find(|&(_, _, length)| length == units)
        .map(|(name, dots, _)| (name, dots))
}

/// Split a duration into typed pieces to be tied together.
/// Returns `None` when the duration is not a whole number of 64th notes.
pub fn decompose(duration: QuarterLength) -> Option<Vec<NoteValue>> {
    let mut remaining = sixty_fourths(duration)?;
    let values = candidates();
    let mut pieces = Vec::new();

    while remaining > 0 {
        let &(type_name, dots, units) = values.iter().find(|&&(_, _, units)| units <= remaining)?;
        pieces.push(NoteValue {
            type_name,
            dots,
            length: ql(units, SIXTY_FOURTHS_PER_QUARTER),
        });
        remaining -= units;
    }

    Some(pieces)
}

/// Duration in 64th notes, when positive and whole
fn sixty_fourths(duration: QuarterLength) -> Option<i64> {
    if duration <= ql_zero() {
        return None;
    }
    let units = duration * QuarterLength::from_integer(SIXTY_FOURTHS_PER_QUARTER);
    if units.is_integer() {
        Some(units.to_integer())
    } else {
        None
    }
}
