// Instrument tuning - open pitch per string

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of strings on the instrument
pub const STRING_COUNT: usize = 6;

/// Standard guitar tuning, string 1 (high E) to string 6 (low E)
pub const STANDARD_TUNING: [u8; STRING_COUNT] = [64, 59, 55, 50, 45, 40];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TuningError {
    #[error("open pitch {0} is outside the MIDI range")]
    PitchOutOfRange(u8),
}

/// Fixed mapping from string number (1..=6) to open pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuning {
    /// Open pitches, index 0 = string 1
    pub open_pitches: [u8; STRING_COUNT],
}

impl Default for Tuning {
    fn default() -> Self {
        Tuning::standard()
    }
}

impl Tuning {
    pub fn standard() -> Self {
        Tuning {
            open_pitches: STANDARD_TUNING,
        }
    }

    pub fn new(open_pitches: [u8; STRING_COUNT]) -> Result<Self, TuningError> {
        let tuning = Tuning { open_pitches };
        tuning.validate()?;
        Ok(tuning)
    }

    pub fn validate(&self) -> Result<(), TuningError> {
        match self.open_pitches.iter().find(|p| **p > 127) {
            Some(p) => Err(TuningError::PitchOutOfRange(*p)),
            None => Ok(()),
        }
    }

    /// Open pitch of a string (1-based)
    pub fn open_pitch(&self, string: u8) -> Option<u8> {
        if string == 0 {
            return None;
        }
        self.open_pitches.get(string as usize - 1).copied()
    }

    /// Lowest-sounding string number (the last one)
    pub fn lowest_string(&self) -> u8 {
        STRING_COUNT as u8
    }

    /// (string number, open pitch) in scan order, string 1 first
    pub fn strings(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.open_pitches
            .iter()
            .enumerate()
            .map(|(i, p)| (i as u8 + 1, *p))
    }
}
