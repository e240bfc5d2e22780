// Notation pipeline
// Raw events -> quantized, clamped, tabbed score -> dual-staff MusicXML

pub mod trace;
pub mod transpose;

use serde::Serialize;
use thiserror::Error;

use crate::arranger::dual_staff::{assemble_dual_staff, DEFAULT_TITLE};
use crate::arranger::musicxml::{write_score, SerializeError};
use crate::events::midi::{parse_midi, ParseError};
use crate::events::raw::RawEvents;
use crate::fretboard::mapper::{annotate_events, DEFAULT_MAX_FRET};
use crate::fretboard::range::PlayableRange;
use crate::fretboard::tuning::Tuning;
use crate::groove::quantize::{prune_artifacts, quantize_events, QuantizeSettings};
use crate::score::layout::{build_part, resolve_meter};
use crate::score::types::{Credit, Metadata, Score};

pub use trace::{read_trace_file, Stage, TraceEntry, TraceError, TraceLog, TraceWriter};
pub use transpose::{shift_pitch, transpose_raw};

/// Everything the pure stages need
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub quantize: QuantizeSettings,
    pub range: PlayableRange,
    pub tuning: Tuning,
    pub max_fret: u8,
    pub title: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            quantize: QuantizeSettings::default(),
            range: PlayableRange::default(),
            tuning: Tuning::standard(),
            max_fret: DEFAULT_MAX_FRET,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

/// Non-fatal conditions reported alongside a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Snapping was skipped and original timing kept
    QuantizationDegraded { reason: String },

    /// The source meter could not be laid out; 4/4 was used
    MeterReplaced { reason: String },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::QuantizationDegraded { reason } => {
                write!(f, "quantization skipped: {}", reason)
            }
            PipelineWarning::MeterReplaced { reason } => {
                write!(f, "meter replaced by 4/4: {}", reason)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not read MIDI input: {0}")]
    Parse(#[from] ParseError),

    #[error("could not write MusicXML: {0}")]
    Serialization(#[from] SerializeError),
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub xml: String,
    pub cleaned: Score,
    pub dual: Score,
    pub warnings: Vec<PipelineWarning>,
    pub trace: Vec<TraceEntry>,
}

/// Parse MIDI bytes and run the pipeline on them
pub fn process_midi(
    bytes: &[u8],
    semitones: i32,
    settings: &PipelineSettings,
) -> Result<PipelineOutput, PipelineError> {
    let raw = parse_midi(bytes)?;
    let mut output = run_pipeline(&raw, semitones, settings)?;
    output.trace.insert(
        0,
        TraceEntry::with_data(
            Stage::Parse,
            "Parsed MIDI input",
            serde_json::json!({ "notes": raw.notes.len(), "tracks": raw.note_tracks().len() }),
        ),
    );
    Ok(output)
}

/// Run every stage on a raw event stream.
///
/// The input is only read; transposition, cleaning and layout each produce
/// new values. Quantization and meter problems degrade to warnings.
pub fn run_pipeline(
    raw: &RawEvents,
    semitones: i32,
    settings: &PipelineSettings,
) -> Result<PipelineOutput, PipelineError> {
    let mut trace = TraceLog::default();
    let mut warnings = Vec::new();

    let source = transpose_raw(raw, semitones);
    if semitones != 0 {
        trace.record(Stage::Transpose, format!("Shifted by {} semitones", semitones));
    }

    let (meter, meter_problem) = resolve_meter(&source.time_signature);
    if let Some(problem) = meter_problem {
        warnings.push(PipelineWarning::MeterReplaced {
            reason: problem.to_string(),
        });
    }

    let mut tracks = source.note_tracks();
    if tracks.is_empty() {
        tracks.push(0);
    }

    let mut parts = Vec::with_capacity(tracks.len());
    for (index, track) in tracks.iter().enumerate() {
        let events = source.events_for_track(*track);

        let outcome = quantize_events(&events, &source.time_signature, &settings.quantize);
        if let Some(reason) = &outcome.degraded {
            let warning = PipelineWarning::QuantizationDegraded {
                reason: reason.to_string(),
            };
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
        trace.record_data(
            Stage::Quantize,
            format!("Track {}: snapped {} events", track, outcome.events.len()),
            serde_json::json!({ "track": track, "degraded": outcome.degraded.is_some() }),
        );

        let (kept, removed) = prune_artifacts(outcome.events, settings.quantize.min_duration);
        trace.record_data(
            Stage::Prune,
            format!("Track {}: removed {} short notes", track, removed),
            serde_json::json!({ "track": track, "removed": removed }),
        );

        let clamped = settings.range.clamp_events(&kept);
        trace.record(
            Stage::Clamp,
            format!("Track {}: folded into {}..={}", track, settings.range.low, settings.range.high),
        );

        let tabbed = annotate_events(&clamped, &settings.tuning, settings.max_fret);
        trace.record(Stage::Tab, format!("Track {}: assigned tab positions", track));

        let part = build_part(
            &format!("P{}", index + 1),
            source.track_name(*track),
            &tabbed,
            &meter,
            &source.tempos,
        );
        trace.record_data(
            Stage::Layout,
            format!("Track {}: {} measures", track, part.measures.len()),
            serde_json::json!({ "track": track, "measures": part.measures.len() }),
        );
        parts.push(part);
    }

    let cleaned = Score {
        metadata: Metadata::default(),
        credits: source
            .annotations
            .iter()
            .enumerate()
            .map(|(i, words)| Credit::stacked(words.clone(), i))
            .collect(),
        parts,
        staff_groups: Vec::new(),
    };

    let dual = assemble_dual_staff(&cleaned, &settings.title, &settings.tuning);
    trace.record(Stage::Assemble, "Built standard and tab staves");

    let xml = write_score(&dual)?;
    trace.record_data(
        Stage::Serialize,
        "Wrote MusicXML",
        serde_json::json!({ "bytes": xml.len() }),
    );

    for warning in &warnings {
        log::warn!("Pipeline warning: {}", warning);
    }
    log::info!(
        "Pipeline finished: {} parts, {} warnings, transpose {}",
        cleaned.parts.len(),
        warnings.len(),
        semitones
    );

    Ok(PipelineOutput {
        xml,
        cleaned,
        dual,
        warnings,
        trace: trace.into_entries(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::midi::tests::fixture_midi;
    use crate::events::raw::RawNote;
    use crate::events::types::{ql, Event};
    use crate::groove::grid::TimeSignature;
    use crate::score::types::Clef;

    fn riff() -> RawEvents {
        RawEvents::from_triples(&[
            (64, ql(0, 1), ql(49, 100)),
            (67, ql(51, 100), ql(1, 2)),
            (30, ql(1, 1), ql(1, 1)),
            (100, ql(2, 1), ql(1, 20)),
            (52, ql(2, 1), ql(2, 1)),
        ])
    }

    #[test]
    fn test_pipeline_cleans_events() {
        let output = run_pipeline(&riff(), 0, &PipelineSettings::default()).unwrap();
        assert!(output.warnings.is_empty());

        let sounding: Vec<&Event> = output.cleaned.parts[0]
            .entries()
            .map(|e| &e.event)
            .filter(|e| e.is_sounding())
            .collect();

        // Snapped to the grid
        assert_eq!(sounding[0].onset(), ql(0, 1));
        assert_eq!(sounding[0].duration(), ql(1, 2));
        assert_eq!(sounding[1].onset(), ql(1, 2));

        // Low pitch folded into range
        assert_eq!(sounding[2].pitches(), vec![42]);

        // Everything in range and tabbed
        for event in &sounding {
            assert!(event.pitches().iter().all(|p| (40..=88).contains(p)));
            assert!(event.tab().is_some());
        }
    }

    #[test]
    fn test_short_chord_member_becomes_chord() {
        // 100 and 52 share an onset, so the short 100 survives as a chord tone
        let output = run_pipeline(&riff(), 0, &PipelineSettings::default()).unwrap();
        let chord = output.cleaned.parts[0]
            .entries()
            .find(|e| e.event.onset() == ql(2, 1))
            .map(|e| e.event.clone())
            .unwrap();
        assert_eq!(chord.pitches(), vec![52, 88]);
        assert_eq!(chord.duration(), ql(2, 1));
    }

    #[test]
    fn test_dual_staff_invariant() {
        let output = run_pipeline(&riff(), 0, &PipelineSettings::default()).unwrap();
        assert_eq!(output.dual.parts.len(), 2);
        assert_eq!(output.dual.parts[1].tempo_count(), 0);
        assert_eq!(output.dual.parts[1].measures_with_clef(Clef::Tab), vec![1]);
        assert_eq!(output.dual.metadata.title.as_deref(), Some(DEFAULT_TITLE));
    }

    #[test]
    fn test_unsupported_meter_degrades() {
        let mut raw = riff();
        raw.time_signature = TimeSignature::new(5, 6);
        let output = run_pipeline(&raw, 0, &PipelineSettings::default()).unwrap();

        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, PipelineWarning::QuantizationDegraded { .. })));
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, PipelineWarning::MeterReplaced { .. })));

        // Unsnapped timing survives
        let first = output.cleaned.parts[0]
            .entries()
            .find(|e| e.event.is_sounding())
            .unwrap();
        assert_eq!(first.event.duration(), ql(49, 100));
        assert!(output.xml.contains("<beats>4</beats>"));
    }

    #[test]
    fn test_unwritable_timing_is_a_serialization_error() {
        // Unsnapped onsets on large coprime denominators leave no common division
        let mut raw = RawEvents::from_triples(&[
            (64, ql(1, 1_000_003), ql(1, 2)),
            (62, ql(1_000_033 + 1, 1_000_033), ql(1, 2)),
            (60, ql(2 * 1_000_037 + 1, 1_000_037), ql(1, 2)),
            (59, ql(3 * 1_000_039 + 1, 1_000_039), ql(1, 2)),
        ]);
        raw.time_signature = TimeSignature::new(5, 6);

        let result = run_pipeline(&raw, 0, &PipelineSettings::default());
        assert!(matches!(
            result,
            Err(PipelineError::Serialization(SerializeError::DivisionsOverflow))
        ));
    }

    #[test]
    fn test_transposition_is_deterministic() {
        let settings = PipelineSettings::default();
        let first = run_pipeline(&riff(), 3, &settings).unwrap();
        let second = run_pipeline(&riff(), 3, &settings).unwrap();
        assert_eq!(first.xml, second.xml);

        let untransposed = run_pipeline(&riff(), 0, &settings).unwrap();
        let zero = run_pipeline(&transpose_raw(&riff(), 0), 0, &settings).unwrap();
        assert_eq!(untransposed.xml, zero.xml);
        assert_ne!(first.xml, untransposed.xml);
    }

    #[test]
    fn test_process_midi_bytes() {
        let bytes = fixture_midi(&[(64, 0, 480), (59, 480, 480), (55, 960, 960)], 480);
        let output = process_midi(&bytes, 0, &PipelineSettings::default()).unwrap();

        assert_eq!(output.trace[0].stage, Stage::Parse);
        assert!(output.trace.iter().any(|t| t.stage == Stage::Serialize));
        assert!(output.xml.contains("<per-minute>120</per-minute>"));
        assert!(output.xml.contains("<fret>0</fret>"));
    }

    #[test]
    fn test_process_midi_rejects_garbage() {
        let result = process_midi(b"not midi", 0, &PipelineSettings::default());
        assert!(matches!(result, Err(PipelineError::Parse(_))));
    }

    #[test]
    fn test_annotations_become_credits_then_cleared() {
        let mut raw = riff();
        raw.annotations.push("(c) 2024".to_string());
        raw.notes.push(RawNote {
            pitch: 45,
            onset: ql(0, 1),
            duration: ql(4, 1),
            track: 2,
        });
        raw.track_names.insert(2, "Rhythm".to_string());

        let output = run_pipeline(&raw, 0, &PipelineSettings::default()).unwrap();
        assert_eq!(output.cleaned.credits.len(), 1);
        assert_eq!(output.cleaned.parts.len(), 2);
        assert_eq!(output.cleaned.parts[1].name, "Rhythm");
        assert!(output.dual.credits.is_empty());
        assert!(!output.xml.contains("(c) 2024"));
    }

    #[test]
    fn test_empty_stream_still_serializes() {
        let output = run_pipeline(&RawEvents::default(), 0, &PipelineSettings::default()).unwrap();
        assert_eq!(output.dual.parts.len(), 2);
        assert_eq!(output.dual.parts[0].measures.len(), 1);
    }
}
