//! # Processing Module Registry
//!
//! The fixed table of named processing modules that settings may refer to:
//! document readers and writers plus the analysis passes run between them.
//! Settings like `file-extensions` validate their targets against this
//! table; actual scheduling of the passes happens downstream and is not a
//! concern here.

/// What stage of processing a module belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleCategory {
    Input,
    Output,
    Voices,
    Staves,
    Beams,
    Marks,
    Quantize,
}

impl ModuleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleCategory::Input => "input",
            ModuleCategory::Output => "output",
            ModuleCategory::Voices => "voice assignment",
            ModuleCategory::Staves => "staff assignment",
            ModuleCategory::Beams => "beaming",
            ModuleCategory::Marks => "marks",
            ModuleCategory::Quantize => "quantization",
        }
    }
}

/// One entry in the module table.
#[derive(Debug, Clone, Copy)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub category: ModuleCategory,
    pub doc: &'static str,
    /// Filename extensions dispatched to this module, lowercase, no dot.
    pub extensions: &'static [&'static str],
}

pub const MODULES: [ModuleInfo; 10] = [
    ModuleInfo {
        name: "fmsin",
        category: ModuleCategory::Input,
        doc: "reads native score documents",
        extensions: &["fms"],
    },
    ModuleInfo {
        name: "midiin",
        category: ModuleCategory::Input,
        doc: "reads standard MIDI files",
        extensions: &["mid", "midi"],
    },
    ModuleInfo {
        name: "fmsout",
        category: ModuleCategory::Output,
        doc: "writes native score documents",
        extensions: &[],
    },
    ModuleInfo {
        name: "lyout",
        category: ModuleCategory::Output,
        doc: "writes LilyPond source",
        extensions: &["ly"],
    },
    ModuleInfo {
        name: "xmlout",
        category: ModuleCategory::Output,
        doc: "writes MusicXML documents",
        extensions: &["xml"],
    },
    ModuleInfo {
        name: "voices",
        category: ModuleCategory::Voices,
        doc: "distributes note events among voices",
        extensions: &[],
    },
    ModuleInfo {
        name: "staves",
        category: ModuleCategory::Staves,
        doc: "assigns voices to staves and chooses clefs",
        extensions: &[],
    },
    ModuleInfo {
        name: "beams",
        category: ModuleCategory::Beams,
        doc: "groups notes under beams by metrical division",
        extensions: &[],
    },
    ModuleInfo {
        name: "marks",
        category: ModuleCategory::Marks,
        doc: "places articulation and expression marks",
        extensions: &[],
    },
    ModuleInfo {
        name: "quantize",
        category: ModuleCategory::Quantize,
        doc: "quantizes attack and release times to notatable divisions",
        extensions: &[],
    },
];

pub fn by_name(name: &str) -> Option<&'static ModuleInfo> {
    MODULES.iter().find(|m| m.name == name)
}

/// Lookup by filename extension, case-insensitive, with or without the dot.
pub fn by_extension(ext: &str) -> Option<&'static ModuleInfo> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    MODULES
        .iter()
        .find(|m| m.extensions.iter().any(|e| *e == ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        assert!(by_name("lyout").is_some());
        assert!(by_name("nonesuch").is_none());
    }

    #[test]
    fn test_lookup_by_extension() {
        assert_eq!(by_extension("mid").map(|m| m.name), Some("midiin"));
        assert_eq!(by_extension(".MIDI").map(|m| m.name), Some("midiin"));
        assert_eq!(by_extension("ly").map(|m| m.name), Some("lyout"));
        assert!(by_extension("pdf").is_none());
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(ModuleCategory::Quantize.as_str(), "quantization");
    }
}
