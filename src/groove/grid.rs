// Musical Grid - Time signature, grid divisors, and bar positions
// Provides structure for quantization and measure layout

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::types::{ql, QuarterLength};

/// Largest numerator or denominator accepted for a meter
pub const MAX_METER_FIELD: u8 = 64;

/// Reasons a meter cannot be used for snapping or layout
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeterError {
    #[error("time signature numerator must be positive")]
    ZeroNumerator,

    #[error("time signature denominator {0} is not a power of two")]
    IrregularDenominator(u8),

    #[error("time signature {0}/{1} is outside the supported range")]
    OutOfRange(u8, u8),
}

/// Musical time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats per bar
    pub numerator: u8,

    /// Note value that gets one beat (4 = quarter note)
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::common()
    }
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        TimeSignature {
            numerator,
            denominator,
        }
    }

    /// 4/4
    pub fn common() -> Self {
        TimeSignature::new(4, 4)
    }

    /// Check the meter can be snapped and laid out
    pub fn validate(&self) -> Result<(), MeterError> {
        if self.numerator == 0 {
            return Err(MeterError::ZeroNumerator);
        }
        if self.numerator > MAX_METER_FIELD || self.denominator > MAX_METER_FIELD {
            return Err(MeterError::OutOfRange(self.numerator, self.denominator));
        }
        if self.denominator == 0 || !self.denominator.is_power_of_two() {
            return Err(MeterError::IrregularDenominator(self.denominator));
        }
        Ok(())
    }

    /// Length of one bar in quarter-lengths
    /// Only meaningful for a valid meter
    pub fn bar_length(&self) -> QuarterLength {
        ql(4 * self.numerator as i64, self.denominator.max(1) as i64)
    }

    /// Denominator as a MIDI power-of-two exponent (4 -> 2)
    pub fn denominator_exponent(&self) -> u8 {
        self.denominator.max(1).trailing_zeros() as u8
    }

    /// Build from a MIDI time signature meta event (denominator as exponent)
    pub fn from_midi(numerator: u8, denominator_exponent: u8) -> Self {
        let denominator = 1u16
            .checked_shl(denominator_exponent as u32)
            .filter(|d| *d <= u8::MAX as u16)
            .map(|d| d as u8)
            // Unrepresentable exponents fall through to validation as an irregular meter
            .unwrap_or(0);
        TimeSignature::new(numerator, denominator)
    }

    /// Position of an onset within its bar
    pub fn position_of(&self, onset: QuarterLength) -> GridPosition {
        let bar_length = self.bar_length();
        let bar = (onset / bar_length).floor();
        let offset = onset - bar * bar_length;

        GridPosition {
            bar: bar.to_integer().max(0) as u32,
            offset,
        }
    }

    /// Onset of the start of a bar (0-indexed)
    pub fn bar_start(&self, bar: u32) -> QuarterLength {
        self.bar_length() * QuarterLength::from_integer(bar as i64)
    }
}

/// Grid position - describes location in musical time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPosition {
    /// Bar number (0-indexed)
    pub bar: u32,

    /// Offset from the start of the bar
    pub offset: QuarterLength,
}

/// Quantization grid: candidate subdivisions of the quarter note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    /// Subdivisions per quarter note, in order of preference on ties
    pub divisors: Vec<u32>,
}

impl Default for Grid {
    fn default() -> Self {
        Grid {
            divisors: vec![4, 16],
        }
    }
}

impl Grid {
    pub fn new(divisors: Vec<u32>) -> Self {
        Grid { divisors }
    }

    /// Snap a value to the nearest multiple of 1/divisor
    /// Exact halves round away from zero
    pub fn snap(value: QuarterLength, divisor: u32) -> QuarterLength {
        let divisor = QuarterLength::from_integer(divisor as i64);
        (value * divisor).round() / divisor
    }
}
