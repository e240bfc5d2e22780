// Score model - parts, measures, staff groups, and document metadata

use serde::{Deserialize, Serialize};

use crate::events::types::{Event, QuarterLength};
use crate::fretboard::tuning::Tuning;
use crate::groove::grid::TimeSignature;

/// Page height in tenths used to stack credit lines
pub const CREDIT_TOP_Y: i64 = 1500;

/// Vertical distance between stacked credit lines, in tenths
pub const CREDIT_LINE_SPACING: i64 = 60;

/// Horizontal page centre in tenths
pub const CREDIT_CENTER_X: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clef {
    /// G clef sounding an octave lower (guitar)
    Treble8vb,
    Treble,
    Bass,
    /// Tablature clef
    Tab,
}

/// Tempo marking placed inside a measure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetronomeMark {
    /// Offset from the start of the measure
    pub offset: QuarterLength,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tie {
    None,
    Start,
    Continue,
    Stop,
}

impl Tie {
    pub fn starts(&self) -> bool {
        matches!(self, Tie::Start | Tie::Continue)
    }

    pub fn stops(&self) -> bool {
        matches!(self, Tie::Stop | Tie::Continue)
    }
}

/// An event (or a barline-split piece of one) placed in a measure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureEntry {
    /// Offset from the start of the measure
    pub offset: QuarterLength,

    /// Event with absolute timing for this piece
    pub event: Event,

    pub tie: Tie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// 1-based measure number
    pub number: u32,

    pub clef: Option<Clef>,

    pub time_signature: Option<TimeSignature>,

    pub tempos: Vec<MetronomeMark>,

    pub entries: Vec<MeasureEntry>,
}

impl Measure {
    pub fn new(number: u32) -> Self {
        Measure {
            number,
            clef: None,
            time_signature: None,
            tempos: Vec::new(),
            entries: Vec::new(),
        }
    }
}

/// How a part's staff is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffKind {
    Standard,
    Tablature(Tuning),
}

/// One staff's worth of measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    pub name: String,
    pub abbreviation: Option<String>,
    pub best_name: Option<String>,
    pub staff: StaffKind,
    pub measures: Vec<Measure>,
}

impl Part {
    /// Total number of metronome marks across all measures
    pub fn tempo_count(&self) -> usize {
        self.measures.iter().map(|m| m.tempos.len()).sum()
    }

    /// Measure numbers that carry the given clef
    pub fn measures_with_clef(&self, clef: Clef) -> Vec<u32> {
        self.measures
            .iter()
            .filter(|m| m.clef == Some(clef))
            .map(|m| m.number)
            .collect()
    }

    /// All entries in order
    pub fn entries(&self) -> impl Iterator<Item = &MeasureEntry> {
        self.measures.iter().flat_map(|m| m.entries.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSymbol {
    Bracket,
    Brace,
    Line,
}

/// Parts rendered together with a shared bracket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffGroup {
    pub part_ids: Vec<String>,
    pub symbol: GroupSymbol,
    pub label: Option<String>,
    pub shared_barlines: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub composer: Option<String>,
}

/// Free text printed on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub page: u32,
    pub words: String,

    /// Position in tenths
    pub default_x: i64,
    pub default_y: i64,
}

impl Credit {
    /// Credit line `index` stacked down from the top of page 1
    pub fn stacked(words: impl Into<String>, index: usize) -> Self {
        Credit {
            page: 1,
            words: words.into(),
            default_x: CREDIT_CENTER_X,
            default_y: CREDIT_TOP_Y - CREDIT_LINE_SPACING * index as i64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub metadata: Metadata,
    pub credits: Vec<Credit>,
    pub parts: Vec<Part>,
    pub staff_groups: Vec<StaffGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_stacking() {
        let first = Credit::stacked("a", 0);
        let second = Credit::stacked("b", 1);
        assert_eq!(first.default_y, CREDIT_TOP_Y);
        assert_eq!(second.default_y, CREDIT_TOP_Y - CREDIT_LINE_SPACING);
        assert_eq!(first.page, 1);
    }

    #[test]
    fn test_tie_flags() {
        assert!(Tie::Start.starts() && !Tie::Start.stops());
        assert!(Tie::Continue.starts() && Tie::Continue.stops());
        assert!(!Tie::Stop.starts() && Tie::Stop.stops());
        assert!(!Tie::None.starts() && !Tie::None.stops());
    }

    #[test]
    fn test_part_queries() {
        let mut first = Measure::new(1);
        first.clef = Some(Clef::Tab);
        first.tempos.push(MetronomeMark {
            offset: crate::events::types::ql(0, 1),
            bpm: 120.0,
        });
        let part = Part {
            id: "P1".to_string(),
            name: "Guitar".to_string(),
            abbreviation: None,
            best_name: None,
            staff: StaffKind::Standard,
            measures: vec![first, Measure::new(2)],
        };

        assert_eq!(part.tempo_count(), 1);
        assert_eq!(part.measures_with_clef(Clef::Tab), vec![1]);
        assert!(part.measures_with_clef(Clef::Bass).is_empty());
    }
}
