//! # Structural Locations
//!
//! The structural nesting contexts of a score document, and the relation
//! deciding which settings are assignable where.
//!
//! A setting is declared for one location (its defined location). It may be
//! assigned there, or in any inner context that inherits from it -- a
//! note may locally override a measure, part or score setting, a clef a
//! staff or instrument setting, and so on. The init file may set anything,
//! since it supplies process-wide defaults. It may never be assigned in a
//! context outside its chain: a note-scoped setting has no meaning at score
//! level and is rejected there.

use serde::Serialize;
use std::fmt;

/// A structural context in a score document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Location {
    InitFile,
    Score,
    Import,
    Export,
    Instrument,
    PercInstrument,
    PartMap,
    Part,
    MeasureDef,
    Staff,
    Clef,
    Note,
}

impl Location {
    /// All locations, in nesting-definition order.
    pub const ALL: [Location; 12] = [
        Location::InitFile,
        Location::Score,
        Location::Import,
        Location::Export,
        Location::Instrument,
        Location::PercInstrument,
        Location::PartMap,
        Location::Part,
        Location::MeasureDef,
        Location::Staff,
        Location::Clef,
        Location::Note,
    ];

    /// The context this one nests inside, if any.
    fn parent(self) -> Option<Location> {
        match self {
            Location::InitFile => None,
            Location::Score => Some(Location::InitFile),
            Location::Import => Some(Location::Score),
            Location::Export => Some(Location::Score),
            Location::Instrument => Some(Location::Score),
            Location::PercInstrument => Some(Location::Instrument),
            Location::PartMap => Some(Location::Score),
            Location::Part => Some(Location::Score),
            Location::MeasureDef => Some(Location::Part),
            Location::Staff => Some(Location::Instrument),
            Location::Clef => Some(Location::Staff),
            Location::Note => Some(Location::MeasureDef),
        }
    }

    /// Whether a setting defined for `defined` may be assigned while the
    /// parser is inside `current`.
    pub fn allows(current: Location, defined: Location) -> bool {
        if current == Location::InitFile {
            return true;
        }
        let mut walk = Some(current);
        while let Some(loc) = walk {
            if loc == defined {
                return true;
            }
            walk = loc.parent();
        }
        false
    }

    /// Every context in which a setting defined here is assignable.
    /// Listed in each setting's help text.
    pub fn assignable_contexts(self) -> Vec<Location> {
        Location::ALL
            .iter()
            .copied()
            .filter(|&loc| Location::allows(loc, self))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Location::InitFile => "init file",
            Location::Score => "score",
            Location::Import => "import block",
            Location::Export => "export block",
            Location::Instrument => "instrument structure",
            Location::PercInstrument => "percussion instrument structure",
            Location::PartMap => "part map",
            Location::Part => "part",
            Location::MeasureDef => "measure definition",
            Location::Staff => "staff structure",
            Location::Clef => "clef structure",
            Location::Note => "note event",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_setting_rejected_at_score() {
        assert!(!Location::allows(Location::Score, Location::Note));
        assert!(Location::allows(Location::Note, Location::Note));
    }

    #[test]
    fn test_inner_scope_overrides_outer_setting() {
        assert!(Location::allows(Location::Note, Location::Score));
        assert!(Location::allows(Location::MeasureDef, Location::Part));
        assert!(Location::allows(Location::Clef, Location::Instrument));
    }

    #[test]
    fn test_unrelated_chains_rejected() {
        assert!(!Location::allows(Location::Staff, Location::Part));
        assert!(!Location::allows(Location::Note, Location::Instrument));
        assert!(!Location::allows(Location::Import, Location::Export));
    }

    #[test]
    fn test_init_file_sets_anything() {
        for loc in Location::ALL {
            assert!(Location::allows(Location::InitFile, loc));
        }
    }

    #[test]
    fn test_assignable_contexts_for_score_setting() {
        let contexts = Location::Score.assignable_contexts();
        assert!(contexts.contains(&Location::Score));
        assert!(contexts.contains(&Location::Note));
        assert!(contexts.contains(&Location::Clef));
        assert!(contexts.contains(&Location::InitFile));
    }
}
