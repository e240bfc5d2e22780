// Groove Engine - Grid and Quantization
// Musical timing: meters, snapping grids, and artifact pruning

pub mod grid;
pub mod quantize;

pub use grid::{Grid, GridPosition, MeterError, TimeSignature};
pub use quantize::{prune_artifacts, quantize_events, QuantizeError, QuantizeOutcome, QuantizeSettings};
