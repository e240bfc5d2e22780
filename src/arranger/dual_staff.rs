// Dual Staff - Pairs a standard-notation staff with a tablature staff
// Both staves come from independent copies of the cleaned score's primary part

use crate::fretboard::tuning::Tuning;
use crate::score::types::{Clef, GroupSymbol, Metadata, Part, Score, StaffGroup, StaffKind};

/// Default document title
pub const DEFAULT_TITLE: &str = "Guitar Transcription";

pub const STANDARD_PART_ID: &str = "P1";
pub const TAB_PART_ID: &str = "P2";

pub const STANDARD_PART_NAME: &str = "Sheet";
pub const TAB_PART_NAME: &str = "Tab";

/// Build the two-staff score from a cleaned score.
///
/// The cleaned score is only read. With no parts at all an empty pair of
/// staves is produced so the output shape stays fixed.
pub fn assemble_dual_staff(cleaned: &Score, title: &str, tuning: &Tuning) -> Score {
    let primary = cleaned.parts.first().cloned().unwrap_or_else(|| Part {
        id: STANDARD_PART_ID.to_string(),
        name: STANDARD_PART_NAME.to_string(),
        abbreviation: None,
        best_name: None,
        staff: StaffKind::Standard,
        measures: Vec::new(),
    });

    if cleaned.parts.len() > 1 {
        log::info!(
            "Using the first of {} parts for the guitar staves",
            cleaned.parts.len()
        );
    }

    let standard = standard_copy(primary.clone());
    let tab = tab_copy(primary, tuning);

    let group = StaffGroup {
        part_ids: vec![standard.id.clone(), tab.id.clone()],
        symbol: GroupSymbol::Bracket,
        label: None,
        shared_barlines: true,
    };

    Score {
        metadata: Metadata {
            title: Some(title.to_string()),
            composer: None,
        },
        credits: Vec::new(),
        parts: vec![standard, tab],
        staff_groups: vec![group],
    }
}

fn standard_copy(mut part: Part) -> Part {
    part.id = STANDARD_PART_ID.to_string();
    part.name = STANDARD_PART_NAME.to_string();
    part.abbreviation = None;
    part.best_name = None;
    part.staff = StaffKind::Standard;
    part
}

fn tab_copy(mut part: Part, tuning: &Tuning) -> Part {
    part.id = TAB_PART_ID.to_string();
    part.name = TAB_PART_NAME.to_string();
    part.abbreviation = None;
    part.best_name = None;
    part.staff = StaffKind::Tablature(*tuning);

    for measure in &mut part.measures {
        measure.tempos.clear();
        measure.clef = None;
    }
    if let Some(first) = part.measures.first_mut() {
        first.clef = Some(Clef::Tab);
    }

    part
}
