// Arranger - Dual-staff assembly and MusicXML export
// Turns a cleaned score into the notation document handed back to callers

pub mod dual_staff;
pub mod durations;
pub mod musicxml;

pub use dual_staff::{assemble_dual_staff, DEFAULT_TITLE};
pub use musicxml::{write_score, SerializeError};
