// Fretboard - Range folding, tuning, and tab position lookup
// Constrains cleaned events to what a six-string guitar can play

pub mod mapper;
pub mod range;
pub mod tuning;

pub use mapper::{annotate_events, map_pitch, TabLookup, DEFAULT_MAX_FRET};
pub use range::{PlayableRange, RangeError};
pub use tuning::{Tuning, TuningError, STANDARD_TUNING};
