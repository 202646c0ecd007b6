//! # Score Structures
//!
//! Instruments, staves, clefs, percussion instruments and the import and
//! export blocks. A structure body is a comma-separated list of field
//! assignments delimited by `(...)` or `<...>`, with nested structures
//! recursing (clefs inside staves inside instruments).
//!
//! A `template` field starts the record from a shallow copy of a
//! previously completed structure of the same kind; fields given after it
//! patch the copy. Completed top-level structures register into a
//! [`StructMap`] keyed case-insensitively by id, where a redefinition
//! replaces the old record but keeps its position in the order of first
//! appearance.

use crate::error::{FilePos, PrepError};
use crate::numb::Numb;
use crate::scan::Cursor;
use crate::symbols::{parse_pitch, GrammarContext, NearestPitch};
use crate::value::VALUE_DELIMS;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// The structure kinds that appear as top-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructKind {
    Instrument,
    PercInstrument,
    Import,
    Export,
}

impl StructKind {
    pub fn type_doc(self) -> &'static str {
        match self {
            StructKind::Instrument => "instrument structure",
            StructKind::PercInstrument => "percussion instrument structure",
            StructKind::Import => "import structure",
            StructKind::Export => "export structure",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StructKind::Instrument => "instrument",
            StructKind::PercInstrument => "percussion instrument",
            StructKind::Import => "import",
            StructKind::Export => "export",
        }
    }
}

pub(crate) const CLEF_NAMES: [&str; 12] = [
    "treble",
    "bass",
    "alto",
    "tenor",
    "soprano",
    "mezzosoprano",
    "baritone",
    "percussion",
    "treble-8",
    "treble+8",
    "bass-8",
    "bass+8",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clef {
    pub name: String,
    /// Octave transposition applied to notes under this clef, in octaves.
    pub octave: i64,
}

impl Default for Clef {
    fn default() -> Self {
        Self {
            name: String::new(),
            octave: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Staff {
    pub clefs: Vec<Clef>,
    pub lines: i64,
}

impl Default for Staff {
    fn default() -> Self {
        Self {
            clefs: Vec::new(),
            lines: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PercInst {
    pub id: String,
    pub name: String,
    /// Notated output pitch for this percussion sound.
    pub note: Option<Numb>,
    pub voice: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Instrument {
    pub id: String,
    pub name: String,
    pub abbr: String,
    pub staves: Vec<Staff>,
    pub percinsts: Vec<PercInst>,
    pub min_pitch: Option<Numb>,
    pub max_pitch: Option<Numb>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Import {
    pub file: String,
    pub module: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Export {
    pub file: String,
    pub module: Option<String>,
}

/// Insertion-ordered map keyed case-insensitively by structure id.
/// Redefining an id replaces the record in place.
#[derive(Debug, Clone, Default)]
pub struct StructMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> StructMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, id: String, record: T) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&id))
        {
            slot.1 = record;
        } else {
            self.entries.push((id, record));
        }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(id))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Serialize> Serialize for StructMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Consume the opening delimiter of a structure body and return the
/// matching closer.
fn open_body(cur: &mut Cursor) -> Result<char, PrepError> {
    cur.skip_trivia()?;
    if cur.eat_char('(') {
        Ok(')')
    } else if cur.eat_char('<') {
        Ok('>')
    } else {
        Err(cur.syntax_error("expected `(' or `<' to open a structure"))
    }
}

/// Consume an optional `=` or `:` between a field name and its value.
fn eat_field_sep(cur: &mut Cursor) -> Result<(), PrepError> {
    cur.skip_trivia()?;
    if !cur.eat_char('=') {
        cur.eat_char(':');
    }
    cur.skip_trivia()?;
    Ok(())
}

fn field_string(cur: &mut Cursor, field: &str) -> Result<String, PrepError> {
    eat_field_sep(cur)?;
    cur.string_value(VALUE_DELIMS)?
        .ok_or_else(|| cur.syntax_error(&format!("expected a string for `{}'", field)))
}

fn field_int(cur: &mut Cursor, field: &str) -> Result<i64, PrepError> {
    eat_field_sep(cur)?;
    cur.integer()
        .ok_or_else(|| cur.syntax_error(&format!("expected an integer for `{}'", field)))
}

fn field_pitch(
    cur: &mut Cursor,
    field: &str,
    ctx: &GrammarContext,
    nearest: &mut NearestPitch,
) -> Result<Numb, PrepError> {
    eat_field_sep(cur)?;
    if let Some(p) = parse_pitch(cur, ctx, nearest)? {
        return Ok(p);
    }
    match cur.number()? {
        Some(n) => Ok(n),
        None => Err(cur.syntax_error(&format!("expected a pitch for `{}'", field))),
    }
}

/// After a field, consume an optional comma before the next one.
fn eat_item_sep(cur: &mut Cursor) -> Result<(), PrepError> {
    cur.skip_trivia()?;
    cur.eat_char(',');
    Ok(())
}

pub fn parse_clef(cur: &mut Cursor) -> Result<Clef, PrepError> {
    let open_pos = cur.filepos();
    let close = open_body(cur)?;
    let mut clef = Clef::default();
    loop {
        cur.skip_trivia()?;
        if cur.eat_char(close) {
            break;
        }
        let field_pos = cur.filepos();
        let field = cur
            .identifier()
            .ok_or_else(|| cur.syntax_error("expected a field name in clef"))?;
        match field.as_str() {
            "name" => clef.name = field_string(cur, "name")?,
            "octave" => clef.octave = field_int(cur, "octave")?,
            _ => {
                return Err(PrepError::Syntax {
                    pos: field_pos,
                    message: format!("unknown field `{}' in clef", field),
                })
            }
        }
        eat_item_sep(cur)?;
    }
    if clef.name.is_empty() {
        return Err(PrepError::MissingId {
            kind: "clef".to_string(),
            pos: open_pos,
        });
    }
    if !CLEF_NAMES.contains(&clef.name.as_str()) {
        return Err(PrepError::Validation {
            name: "clef".to_string(),
            message: format!("unknown clef `{}'", clef.name),
            pos: open_pos,
        });
    }
    Ok(clef)
}

pub fn parse_staff(cur: &mut Cursor) -> Result<Staff, PrepError> {
    let close = open_body(cur)?;
    let mut staff = Staff::default();
    loop {
        cur.skip_trivia()?;
        if cur.eat_char(close) {
            break;
        }
        let field_pos = cur.filepos();
        let field = cur
            .identifier()
            .ok_or_else(|| cur.syntax_error("expected a field name in staff"))?;
        match field.as_str() {
            "clef" => {
                eat_field_sep(cur)?;
                staff.clefs.push(parse_clef(cur)?);
            }
            "lines" => staff.lines = field_int(cur, "lines")?,
            _ => {
                return Err(PrepError::Syntax {
                    pos: field_pos,
                    message: format!("unknown field `{}' in staff", field),
                })
            }
        }
        eat_item_sep(cur)?;
    }
    Ok(staff)
}

pub fn parse_percinst(
    cur: &mut Cursor,
    ctx: &GrammarContext,
    nearest: &mut NearestPitch,
    registered: &StructMap<PercInst>,
) -> Result<PercInst, PrepError> {
    let open_pos = cur.filepos();
    let close = open_body(cur)?;
    let mut rec = PercInst::default();
    loop {
        cur.skip_trivia()?;
        if cur.eat_char(close) {
            break;
        }
        let field_pos = cur.filepos();
        let field = cur
            .identifier()
            .ok_or_else(|| cur.syntax_error("expected a field name in percussion instrument"))?;
        match field.as_str() {
            "id" => rec.id = field_string(cur, "id")?,
            "name" => rec.name = field_string(cur, "name")?,
            "note" => rec.note = Some(field_pitch(cur, "note", ctx, nearest)?),
            "voice" => rec.voice = Some(field_int(cur, "voice")?),
            "template" => {
                let source = field_string(cur, "template")?;
                let base = registered.get(&source).ok_or_else(|| PrepError::UnknownId {
                    kind: "percussion instrument".to_string(),
                    id: source.clone(),
                    pos: field_pos,
                })?;
                let id = std::mem::take(&mut rec.id);
                rec = base.clone();
                rec.id = id;
            }
            _ => {
                return Err(PrepError::Syntax {
                    pos: field_pos,
                    message: format!("unknown field `{}' in percussion instrument", field),
                })
            }
        }
        eat_item_sep(cur)?;
    }
    if rec.id.is_empty() {
        return Err(PrepError::MissingId {
            kind: "percussion instrument".to_string(),
            pos: open_pos,
        });
    }
    Ok(rec)
}

pub fn parse_instrument(
    cur: &mut Cursor,
    ctx: &GrammarContext,
    nearest: &mut NearestPitch,
    registered: &StructMap<Instrument>,
    registered_perc: &StructMap<PercInst>,
) -> Result<Instrument, PrepError> {
    let open_pos = cur.filepos();
    let close = open_body(cur)?;
    let mut rec = Instrument::default();
    loop {
        cur.skip_trivia()?;
        if cur.eat_char(close) {
            break;
        }
        let field_pos = cur.filepos();
        let field = cur
            .identifier()
            .ok_or_else(|| cur.syntax_error("expected a field name in instrument"))?;
        match field.as_str() {
            "id" => rec.id = field_string(cur, "id")?,
            "name" => rec.name = field_string(cur, "name")?,
            "abbr" => rec.abbr = field_string(cur, "abbr")?,
            "min-pitch" => rec.min_pitch = Some(field_pitch(cur, "min-pitch", ctx, nearest)?),
            "max-pitch" => rec.max_pitch = Some(field_pitch(cur, "max-pitch", ctx, nearest)?),
            "staff" => {
                eat_field_sep(cur)?;
                rec.staves.push(parse_staff(cur)?);
            }
            "percinst" => {
                eat_field_sep(cur)?;
                rec.percinsts
                    .push(parse_percinst(cur, ctx, nearest, registered_perc)?);
            }
            "template" => {
                let source = field_string(cur, "template")?;
                let base = registered.get(&source).ok_or_else(|| PrepError::UnknownId {
                    kind: "instrument".to_string(),
                    id: source.clone(),
                    pos: field_pos,
                })?;
                let id = std::mem::take(&mut rec.id);
                rec = base.clone();
                rec.id = id;
            }
            _ => {
                return Err(PrepError::Syntax {
                    pos: field_pos,
                    message: format!("unknown field `{}' in instrument", field),
                })
            }
        }
        eat_item_sep(cur)?;
    }
    if rec.id.is_empty() {
        return Err(PrepError::MissingId {
            kind: "instrument".to_string(),
            pos: open_pos,
        });
    }
    Ok(rec)
}

fn check_module(
    name: &Option<String>,
    category: crate::modules::ModuleCategory,
    pos: &FilePos,
    setting: &str,
) -> Result<(), PrepError> {
    if let Some(module) = name {
        match crate::modules::by_name(module) {
            Some(info) if info.category == category => Ok(()),
            Some(_) => Err(PrepError::Validation {
                name: setting.to_string(),
                message: format!("module `{}' is not an {} module", module, category.as_str()),
                pos: pos.clone(),
            }),
            None => Err(PrepError::Validation {
                name: setting.to_string(),
                message: format!("unknown module `{}'", module),
                pos: pos.clone(),
            }),
        }
    } else {
        Ok(())
    }
}

pub fn parse_import(cur: &mut Cursor) -> Result<Import, PrepError> {
    let open_pos = cur.filepos();
    let close = open_body(cur)?;
    let mut rec = Import::default();
    loop {
        cur.skip_trivia()?;
        if cur.eat_char(close) {
            break;
        }
        let field_pos = cur.filepos();
        let field = cur
            .identifier()
            .ok_or_else(|| cur.syntax_error("expected a field name in import"))?;
        match field.as_str() {
            "file" => rec.file = field_string(cur, "file")?,
            "module" => rec.module = Some(field_string(cur, "module")?),
            _ => {
                return Err(PrepError::Syntax {
                    pos: field_pos,
                    message: format!("unknown field `{}' in import", field),
                })
            }
        }
        eat_item_sep(cur)?;
    }
    if rec.file.is_empty() {
        return Err(PrepError::MissingId {
            kind: "import".to_string(),
            pos: open_pos,
        });
    }
    check_module(&rec.module, crate::modules::ModuleCategory::Input, &open_pos, "import")?;
    Ok(rec)
}

pub fn parse_export(cur: &mut Cursor) -> Result<Export, PrepError> {
    let open_pos = cur.filepos();
    let close = open_body(cur)?;
    let mut rec = Export::default();
    loop {
        cur.skip_trivia()?;
        if cur.eat_char(close) {
            break;
        }
        let field_pos = cur.filepos();
        let field = cur
            .identifier()
            .ok_or_else(|| cur.syntax_error("expected a field name in export"))?;
        match field.as_str() {
            "file" => rec.file = field_string(cur, "file")?,
            "module" => rec.module = Some(field_string(cur, "module")?),
            _ => {
                return Err(PrepError::Syntax {
                    pos: field_pos,
                    message: format!("unknown field `{}' in export", field),
                })
            }
        }
        eat_item_sep(cur)?;
    }
    if rec.file.is_empty() {
        return Err(PrepError::MissingId {
            kind: "export".to_string(),
            pos: open_pos,
        });
    }
    check_module(&rec.module, crate::modules::ModuleCategory::Output, &open_pos, "export")?;
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cur(src: &str) -> Cursor<'_> {
        Cursor::new("test.fms", src)
    }

    fn parse_inst(src: &str, registered: &StructMap<Instrument>) -> Result<Instrument, PrepError> {
        let ctx = GrammarContext::default();
        let mut nearest = NearestPitch::default();
        let perc = StructMap::new();
        parse_instrument(&mut cur(src), &ctx, &mut nearest, registered, &perc)
    }

    #[test]
    fn test_instrument_with_nested_staves() {
        let src = "<id: violin, name: 'Violin', abbr: Vln,
                    staff <clef (name treble), lines 5>,
                    staff <clef (name bass, octave -1)>>";
        let inst = parse_inst(src, &StructMap::new()).unwrap();
        assert_eq!(inst.id, "violin");
        assert_eq!(inst.name, "Violin");
        assert_eq!(inst.staves.len(), 2);
        assert_eq!(inst.staves[0].clefs[0].name, "treble");
        assert_eq!(inst.staves[1].clefs[0].octave, -1);
    }

    #[test]
    fn test_paren_and_angle_bodies_equivalent() {
        let a = parse_inst("(id: fl, name: Flute)", &StructMap::new()).unwrap();
        let b = parse_inst("<id: fl, name: Flute>", &StructMap::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_id_rejected() {
        let err = parse_inst("(name: Flute)", &StructMap::new());
        assert!(matches!(err, Err(PrepError::MissingId { .. })));
    }

    #[test]
    fn test_template_copies_then_patches() {
        let mut registered = StructMap::new();
        let base = parse_inst(
            "(id: violin, name: Violin, abbr: Vln, staff (clef (name treble)))",
            &registered,
        )
        .unwrap();
        registered.insert(base.id.clone(), base);
        let derived = parse_inst(
            "(id: viola, template: violin, name: Viola)",
            &registered,
        )
        .unwrap();
        assert_eq!(derived.id, "viola");
        assert_eq!(derived.name, "Viola");
        assert_eq!(derived.abbr, "Vln"); // inherited
        assert_eq!(derived.staves.len(), 1);
    }

    #[test]
    fn test_unknown_template_rejected() {
        let err = parse_inst("(id: x, template: nothere)", &StructMap::new());
        assert!(matches!(err, Err(PrepError::UnknownId { .. })));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse_inst("(id: x, wings: 2)", &StructMap::new());
        assert!(matches!(err, Err(PrepError::Syntax { .. })));
    }

    #[test]
    fn test_unknown_clef_rejected() {
        let err = parse_clef(&mut cur("(name squiggle)"));
        assert!(matches!(err, Err(PrepError::Validation { .. })));
    }

    #[test]
    fn test_percinst_with_pitch() {
        let ctx = GrammarContext::default();
        let mut nearest = NearestPitch::default();
        let rec = parse_percinst(
            &mut cur("(id: snare, name: 'Snare Drum', note: c, voice: 2)"),
            &ctx,
            &mut nearest,
            &StructMap::new(),
        )
        .unwrap();
        assert_eq!(rec.id, "snare");
        assert_eq!(rec.note, Some(Numb::Int(60)));
        assert_eq!(rec.voice, Some(2));
    }

    #[test]
    fn test_import_requires_file() {
        assert!(matches!(
            parse_import(&mut cur("(module: midiin)")),
            Err(PrepError::MissingId { .. })
        ));
        let rec = parse_import(&mut cur("(file: 'in.mid', module: midiin)")).unwrap();
        assert_eq!(rec.file, "in.mid");
    }

    #[test]
    fn test_export_module_category_checked() {
        let err = parse_export(&mut cur("(file: out.ly, module: midiin)"));
        assert!(matches!(err, Err(PrepError::Validation { .. })));
        let rec = parse_export(&mut cur("(file: out.ly, module: lyout)")).unwrap();
        assert_eq!(rec.module.as_deref(), Some("lyout"));
    }

    #[test]
    fn test_structmap_case_insensitive_replace_keeps_order() {
        let mut m = StructMap::new();
        m.insert("Violin".to_string(), 1);
        m.insert("Flute".to_string(), 2);
        m.insert("VIOLIN".to_string(), 3);
        let ids: Vec<_> = m.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(ids, vec!["Violin", "Flute"]);
        assert_eq!(m.get("violin"), Some(&3));
        assert_eq!(m.len(), 2);
    }
}
