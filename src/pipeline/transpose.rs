// Transposition - Shift every pitch of a raw stream by a number of semitones
// Always applied to the original stream so repeated requests agree

use crate::events::raw::RawEvents;

/// Highest MIDI pitch
const MIDI_MAX: i64 = 127;

/// Shift a MIDI pitch, folding results outside 0..=127 back by octaves
pub fn shift_pitch(pitch: u8, semitones: i32) -> u8 {
    let shifted = pitch as i64 + semitones as i64;
    let folded = if shifted < 0 {
        shifted + 12 * ((-shifted + 11) / 12)
    } else if shifted > MIDI_MAX {
        shifted - 12 * ((shifted - MIDI_MAX + 11) / 12)
    } else {
        shifted
    };
    folded as u8
}

/// Copy of `raw` with every note moved by `semitones`
pub fn transpose_raw(raw: &RawEvents, semitones: i32) -> RawEvents {
    let mut transposed = raw.clone();
    if semitones == 0 {
        return transposed;
    }

    for note in &mut transposed.notes {
        note.pitch = shift_pitch(note.pitch, semitones);
    }
    transposed.sort_notes();

    log::debug!("Transposed {} notes by {} semitones", transposed.notes.len(), semitones);
    transposed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::ql;

    #[test]
    fn test_zero_is_identity() {
        let raw = RawEvents::from_triples(&[(64, ql(0, 1), ql(1, 1)), (40, ql(1, 1), ql(1, 2))]);
        assert_eq!(transpose_raw(&raw, 0), raw);
    }

    #[test]
    fn test_shift_within_range() {
        let raw = RawEvents::from_triples(&[(60, ql(0, 1), ql(1, 1))]);
        let up = transpose_raw(&raw, 5);
        assert_eq!(up.notes[0].pitch, 65);
        let down = transpose_raw(&raw, -12);
        assert_eq!(down.notes[0].pitch, 48);
        // Original untouched
        assert_eq!(raw.notes[0].pitch, 60);
    }

    #[test]
    fn test_out_of_midi_range_folds_by_octaves() {
        assert_eq!(shift_pitch(120, 10), 118);
        assert_eq!(shift_pitch(3, -5), 10);
        assert_eq!(shift_pitch(127, 0), 127);
        for semitones in -300..=300 {
            for pitch in [0u8, 40, 64, 127] {
                let shifted = shift_pitch(pitch, semitones) as i64;
                assert!((0..=127).contains(&shifted));
                assert_eq!(
                    (shifted - (pitch as i64 + semitones as i64)).rem_euclid(12),
                    0
                );
            }
        }
    }

    #[test]
    fn test_repeated_transposition_is_stable() {
        let raw = RawEvents::from_triples(&[(52, ql(0, 1), ql(1, 1)), (59, ql(1, 1), ql(1, 1))]);
        assert_eq!(transpose_raw(&raw, 7), transpose_raw(&raw, 7));
    }
}
