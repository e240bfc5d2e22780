// Score model module
// Parts, measures, and staff groups plus the layout that fills them

pub mod layout;
pub mod types;

pub use layout::{build_measures, build_part, flatten_voice, resolve_meter, DEFAULT_PART_NAME};
pub use types::{
    Clef, Credit, GroupSymbol, Measure, MeasureEntry, Metadata, MetronomeMark, Part, Score,
    StaffGroup, StaffKind, Tie,
};
