// Event model module
// Raw transcription stream, score events, MIDI ingestion, and the inference oracle

pub mod midi;
pub mod oracle;
pub mod raw;
pub mod types;

pub use midi::{parse_midi, write_midi, ParseError, WriteError};
pub use oracle::{OracleError, OracleGate, PitchOracle, UnavailableOracle};
pub use raw::{RawEvents, RawNote, TempoMark};
pub use types::{ql, Event, QuarterLength, TabPosition};
