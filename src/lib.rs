// Fretscribe - Transcribed MIDI to Guitar Notation and Tablature
// Module declarations

pub mod arranger;
pub mod audio;
pub mod config;
pub mod events;
pub mod fretboard;
pub mod groove;
pub mod pipeline;
pub mod score;
pub mod service;
pub mod state;

pub use config::FretscribeConfig;
pub use pipeline::{process_midi, run_pipeline, PipelineError, PipelineOutput, PipelineSettings};
pub use service::{ServiceError, Transcriber};
