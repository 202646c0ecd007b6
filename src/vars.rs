//! # Settings Registry and Store
//!
//! Every tunable aspect of score preparation is a named setting with a
//! declared value kind, a defined structural location, a default, and
//! optionally a semantic validator and an activation hook. The standard
//! table is built once per process; a [`SettingsStore`] holds the values
//! assigned during one session as an arena keyed by setting and scope,
//! with scope-parent chain lookup so inner contexts see outer values until
//! they override them.
//!
//! The assignment pipeline runs in a fixed order: parse the value by the
//! declared kind, compose `+=` with the previous visible value, check
//! element-count bounds, run the semantic validator, run the activation
//! hook, and only then publish. A failure at any step leaves both the
//! store and the grammar context exactly as they were.

use crate::error::{FilePos, PrepError};
use crate::location::Location;
use crate::numb::Numb;
use crate::scan::Cursor;
use crate::structs::StructKind;
use crate::symbols::{parse_pitch, Activation, GrammarContext, NearestPitch};
use crate::value::{self, ListEl, OrdMap, Value, VALUE_DELIMS};
use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub type VarId = usize;
pub type ScopeId = usize;

/// The closed set of value kinds a setting can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Num,
    Bool,
    /// A pitch in note syntax, or a plain number.
    NotePitch,
    Str,
    ListNum,
    ListStr,
    ListListNum,
    ListListStr,
    MapNum,
    MapStr,
    MapListNum,
    MapListStr,
    /// Map of numbers keeping first-insertion order.
    OrdMapNum,
    /// A structure block, routed to the structure parsers.
    Struct(StructKind),
}

impl VarKind {
    pub fn type_doc(self) -> &'static str {
        match self {
            VarKind::Num => "number",
            VarKind::Bool => "yes/no",
            VarKind::NotePitch => "note or number",
            VarKind::Str => "string",
            VarKind::ListNum => "list of numbers",
            VarKind::ListStr => "list of strings",
            VarKind::ListListNum => "list of lists of numbers",
            VarKind::ListListStr => "list of lists of strings",
            VarKind::MapNum => "map of strings to numbers",
            VarKind::MapStr => "map of strings to strings",
            VarKind::MapListNum => "map of strings to lists of numbers",
            VarKind::MapListStr => "map of strings to lists of strings",
            VarKind::OrdMapNum => "ordered map of strings to numbers",
            VarKind::Struct(kind) => kind.type_doc(),
        }
    }

    /// Whether `+=` composition is meaningful for this kind.
    pub fn appendable(self) -> bool {
        !matches!(
            self,
            VarKind::Num | VarKind::Bool | VarKind::NotePitch | VarKind::Str | VarKind::Struct(_)
        )
    }

    pub fn is_struct(self) -> bool {
        matches!(self, VarKind::Struct(_))
    }
}

/// A semantic check run on the fully composed value before publication.
pub type Validator = fn(&Value) -> Result<(), String>;

/// How much experience a setting assumes of the user, for filtering help
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl UseLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            UseLevel::Beginner => "beginner",
            UseLevel::Intermediate => "intermediate",
            UseLevel::Advanced => "advanced",
        }
    }
}

/// The definition of one setting.
pub struct VarDef {
    pub name: &'static str,
    pub kind: VarKind,
    pub location: Location,
    pub doc: &'static str,
    pub default: Option<Value>,
    pub validator: Option<Validator>,
    pub min_elements: usize,
    pub max_elements: Option<usize>,
    pub activation: Option<Activation>,
    pub level: UseLevel,
}

impl VarDef {
    fn new(name: &'static str, kind: VarKind, location: Location, doc: &'static str) -> Self {
        Self {
            name,
            kind,
            location,
            doc,
            default: None,
            validator: None,
            min_elements: 0,
            max_elements: None,
            activation: None,
            level: UseLevel::Beginner,
        }
    }

    fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn with_bounds(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_elements = min;
        self.max_elements = max;
        self
    }

    fn with_level(mut self, level: UseLevel) -> Self {
        self.level = level;
        self
    }

    /// Mark this setting as feeding a symbol table. The table's built-in
    /// contents become the default unless one was given explicitly.
    fn with_activation(mut self, target: Activation) -> Self {
        if self.default.is_none() {
            self.default = Some(GrammarContext::default_setting_value(target));
        }
        self.activation = Some(target);
        self
    }
}

/// The set of known settings, indexed by id and by name.
pub struct Registry {
    defs: Vec<VarDef>,
    by_name: HashMap<&'static str, VarId>,
}

impl Registry {
    fn new() -> Self {
        Self {
            defs: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    fn define(&mut self, def: VarDef) {
        let id = self.defs.len();
        self.by_name.insert(def.name, id);
        self.defs.push(def);
    }

    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn def(&self, id: VarId) -> &VarDef {
        &self.defs[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &VarDef)> {
        self.defs.iter().enumerate()
    }

    /// One-line help text: kind, doc, assumed user level and the contexts
    /// the setting may be assigned in.
    pub fn help(&self, id: VarId) -> String {
        let def = &self.defs[id];
        let contexts = def
            .location
            .assignable_contexts()
            .iter()
            .map(|loc| loc.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} ({}): {}; level: {}; settable in: {}",
            def.name,
            def.kind.type_doc(),
            def.doc,
            def.level.as_str(),
            contexts
        )
    }
}

/// The standard settings table, built once per process.
pub fn standard() -> &'static Registry {
    static STANDARD: Lazy<Registry> = Lazy::new(build_standard);
    &STANDARD
}

fn build_standard() -> Registry {
    use Location::*;
    let mut reg = Registry::new();

    reg.define(
        VarDef::new("title", VarKind::Str, Score, "title of the score")
            .with_default(Value::Str(String::new())),
    );
    reg.define(
        VarDef::new("author", VarKind::Str, Score, "composer or author of the score")
            .with_default(Value::Str(String::new())),
    );
    reg.define(
        VarDef::new(
            "beat",
            VarKind::Num,
            Score,
            "duration of one beat as a fraction of a whole note",
        )
        .with_default(Value::Num(Numb::rational(1, 4).unwrap_or(Numb::Int(1))))
        .with_validator(validate_power_of_two),
    );
    reg.define(
        VarDef::new(
            "timesig",
            VarKind::ListNum,
            Score,
            "time signature as (numerator, denominator)",
        )
        .with_default(Value::ListNum(vec![Numb::Int(4), Numb::Int(4)]))
        .with_bounds(2, Some(2))
        .with_validator(validate_timesig),
    );
    reg.define(
        VarDef::new(
            "tuplet-divs",
            VarKind::ListListNum,
            Score,
            "allowed tuplet divisions at each nesting level",
        )
        .with_default(Value::ListListNum(vec![
            vec![Numb::Int(3)],
            vec![Numb::Int(5)],
            vec![Numb::Int(7)],
        ]))
        .with_validator(validate_tuplet_divs)
        .with_level(UseLevel::Intermediate),
    );
    reg.define(
        VarDef::new(
            "dyn-levels",
            VarKind::ListNum,
            Score,
            "boundaries between dynamic levels, in increasing order",
        )
        .with_default(Value::ListNum(
            (1..=8).map(Numb::Int).collect(),
        ))
        .with_bounds(1, None)
        .with_validator(validate_increasing),
    );
    reg.define(
        VarDef::new(
            "quartertones",
            VarKind::Bool,
            Score,
            "whether quartertone accidentals are notated",
        )
        .with_default(Value::Num(Numb::Int(0))),
    );
    reg.define(
        VarDef::new(
            "transpose",
            VarKind::NotePitch,
            Instrument,
            "written-to-sounding transposition in semitones",
        )
        .with_default(Value::Num(Numb::Int(0))),
    );
    reg.define(
        VarDef::new("notehead", VarKind::Str, Note, "notehead style for a note event")
            .with_default(Value::Str("normal".to_string())),
    );
    reg.define(
        VarDef::new(
            "n-threads",
            VarKind::Num,
            InitFile,
            "number of worker threads downstream passes may use",
        )
        .with_default(Value::Num(Numb::Int(1)))
        .with_validator(validate_nonneg_int)
        .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new("verbosity", VarKind::Num, InitFile, "diagnostic verbosity, 0 to 2")
            .with_default(Value::Num(Numb::Int(1)))
            .with_validator(validate_verbosity)
            .with_level(UseLevel::Intermediate),
    );
    reg.define(
        VarDef::new(
            "file-extensions",
            VarKind::MapStr,
            Score,
            "filename extension to processing module dispatch",
        )
        .with_default(default_file_extensions())
        .with_validator(validate_file_extensions)
        .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new(
            "staff-groups",
            VarKind::ListListStr,
            Score,
            "instrument ids bracketed together in the printed score",
        )
        .with_default(Value::ListListStr(Vec::new()))
        .with_level(UseLevel::Intermediate),
    );
    reg.define(
        VarDef::new(
            "mark-groups",
            VarKind::MapListStr,
            Score,
            "named groups of mutually exclusive marks",
        )
        .with_default(default_mark_groups())
        .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new(
            "clef-ranges",
            VarKind::MapListNum,
            Score,
            "comfortable pitch range per clef, as (low, high)",
        )
        .with_default(default_clef_ranges())
        .with_validator(validate_clef_ranges)
        .with_level(UseLevel::Advanced),
    );

    // symbol-table settings; committing one rebuilds the grammar
    reg.define(
        VarDef::new("note-symbols", VarKind::MapNum, Score, "note name spellings")
            .with_bounds(1, None)
            .with_activation(Activation::NoteNames)
            .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new("acc-symbols", VarKind::MapNum, Score, "accidental spellings")
            .with_activation(Activation::Accidentals)
            .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new("mic-symbols", VarKind::MapNum, Score, "microtone spellings")
            .with_activation(Activation::Microtones)
            .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new("oct-symbols", VarKind::MapNum, Score, "octave mark spellings")
            .with_activation(Activation::Octaves)
            .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new(
            "dur-symbols",
            VarKind::OrdMapNum,
            Score,
            "duration base spellings, in printing precedence order",
        )
        .with_bounds(1, None)
        .with_validator(validate_positive_values)
        .with_activation(Activation::DurBases)
        .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new("dur-dots", VarKind::MapNum, Score, "dot multiplier spellings")
            .with_validator(validate_positive_values)
            .with_activation(Activation::DurDots)
            .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new("dur-ties", VarKind::ListStr, Score, "tie connector spellings")
            .with_activation(Activation::DurTies)
            .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new(
            "tuplet-symbols",
            VarKind::MapNum,
            Score,
            "tuplet multiplier spellings",
        )
        .with_validator(validate_positive_values)
        .with_activation(Activation::Tuplets)
        .with_level(UseLevel::Advanced),
    );
    reg.define(
        VarDef::new(
            "keysig",
            VarKind::ListStr,
            Score,
            "key signature as a list of note/accidental entries",
        )
        .with_activation(Activation::KeySig),
    );

    // structure-valued settings, routed to the structure parsers
    reg.define(VarDef::new(
        "inst",
        VarKind::Struct(StructKind::Instrument),
        Score,
        "defines an instrument",
    ));
    reg.define(VarDef::new(
        "percinst",
        VarKind::Struct(StructKind::PercInstrument),
        Score,
        "defines a percussion instrument",
    ));
    reg.define(VarDef::new(
        "import",
        VarKind::Struct(StructKind::Import),
        Score,
        "defines an input source",
    ));
    reg.define(VarDef::new(
        "export",
        VarKind::Struct(StructKind::Export),
        Score,
        "defines an output target",
    ));

    reg
}

fn default_file_extensions() -> Value {
    let mut map = HashMap::new();
    for module in &crate::modules::MODULES {
        for ext in module.extensions {
            map.insert(ext.to_string(), module.name.to_string());
        }
    }
    Value::MapStr(map)
}

fn default_mark_groups() -> Value {
    let groups = [
        ("articulations", &["staccato", "tenuto", "accent", "marcato"][..]),
        ("ornaments", &["trill", "mordent", "turn"][..]),
        ("breaths", &["breath", "caesura"][..]),
    ];
    Value::MapListStr(
        groups
            .iter()
            .map(|(name, marks)| {
                (
                    name.to_string(),
                    marks.iter().map(|m| m.to_string()).collect(),
                )
            })
            .collect(),
    )
}

fn default_clef_ranges() -> Value {
    let ranges = [
        ("treble", 55, 84),
        ("bass", 36, 64),
        ("alto", 48, 72),
        ("tenor", 45, 69),
    ];
    Value::MapListNum(
        ranges
            .iter()
            .map(|(name, low, high)| {
                (name.to_string(), vec![Numb::Int(*low), Numb::Int(*high)])
            })
            .collect(),
    )
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    pos: FilePos,
    ordinal: u64,
}

/// Arena of assigned values keyed by (setting, scope), with parent-chain
/// lookup. Values are immutable once published; a later assignment to the
/// same key replaces the entry with a higher ordinal.
#[derive(Debug, Default)]
pub struct SettingsStore {
    parents: Vec<Option<ScopeId>>,
    entries: HashMap<(VarId, ScopeId), Entry>,
    next_ordinal: u64,
}

impl SettingsStore {
    pub const ROOT: ScopeId = 0;

    pub fn new() -> Self {
        Self {
            parents: vec![None],
            entries: HashMap::new(),
            next_ordinal: 0,
        }
    }

    /// Open a scope nested inside `parent`.
    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.parents.push(Some(parent));
        self.parents.len() - 1
    }

    /// The value visible at `scope`: the nearest entry on the parent chain.
    pub fn get(&self, var: VarId, scope: ScopeId) -> Option<&Value> {
        let mut walk = Some(scope);
        while let Some(s) = walk {
            if let Some(entry) = self.entries.get(&(var, s)) {
                return Some(&entry.value);
            }
            walk = self.parents.get(s).copied().flatten();
        }
        None
    }

    /// Global modification ordinal of the visible entry.
    pub fn version(&self, var: VarId, scope: ScopeId) -> Option<u64> {
        let mut walk = Some(scope);
        while let Some(s) = walk {
            if let Some(entry) = self.entries.get(&(var, s)) {
                return Some(entry.ordinal);
            }
            walk = self.parents.get(s).copied().flatten();
        }
        None
    }

    /// Source position the visible value was assigned at.
    pub fn origin(&self, var: VarId, scope: ScopeId) -> Option<&FilePos> {
        let mut walk = Some(scope);
        while let Some(s) = walk {
            if let Some(entry) = self.entries.get(&(var, s)) {
                return Some(&entry.pos);
            }
            walk = self.parents.get(s).copied().flatten();
        }
        None
    }

    pub fn publish(&mut self, var: VarId, scope: ScopeId, value: Value, pos: FilePos) {
        self.next_ordinal += 1;
        self.entries.insert(
            (var, scope),
            Entry {
                value,
                pos,
                ordinal: self.next_ordinal,
            },
        );
    }

    /// Every non-structure setting's value visible at `scope`, falling back
    /// to defaults, sorted by name for stable output.
    pub fn resolved(&self, registry: &Registry, scope: ScopeId) -> Vec<(&'static str, Value)> {
        let mut out = Vec::new();
        for (id, def) in registry.iter() {
            if def.kind.is_struct() {
                continue;
            }
            let value = self.get(id, scope).cloned().or_else(|| def.default.clone());
            if let Some(value) = value {
                out.push((def.name, value));
            }
        }
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }
}

fn type_mismatch(name: &str, kind: VarKind, pos: FilePos) -> PrepError {
    PrepError::TypeMismatch {
        name: name.to_string(),
        expected: kind.type_doc().to_string(),
        pos,
    }
}

fn el_as_num_list(el: &ListEl) -> Option<Vec<Numb>> {
    match el {
        ListEl::List(inner) => value::bind_nums(inner),
        ListEl::Num(n) => Some(vec![*n]),
        ListEl::Str(_) => None,
    }
}

fn el_as_str_list(el: &ListEl) -> Option<Vec<String>> {
    match el {
        ListEl::List(inner) => value::bind_strs(inner),
        ListEl::Str(s) => Some(vec![s.clone()]),
        ListEl::Num(_) => None,
    }
}

/// Parse a value literal according to the setting's declared kind.
pub fn parse_value_of_kind(
    cur: &mut Cursor,
    kind: VarKind,
    name: &str,
    ctx: &GrammarContext,
    nearest: &mut NearestPitch,
) -> Result<Value, PrepError> {
    cur.skip_trivia()?;
    let pos = cur.filepos();
    let mismatch = || type_mismatch(name, kind, pos.clone());
    match kind {
        VarKind::Num => Ok(Value::Num(cur.number()?.ok_or_else(mismatch)?)),
        VarKind::Bool => Ok(Value::Num(Numb::Int(i64::from(
            cur.boolean().ok_or_else(mismatch)?,
        )))),
        VarKind::NotePitch => {
            if let Some(pitch) = parse_pitch(cur, ctx, nearest)? {
                Ok(Value::Num(pitch))
            } else {
                Ok(Value::Num(cur.number()?.ok_or_else(mismatch)?))
            }
        }
        VarKind::Str => Ok(Value::Str(
            cur.string_value(VALUE_DELIMS)?.ok_or_else(mismatch)?,
        )),
        VarKind::ListNum => {
            let els = value::parse_list(cur)?.ok_or_else(mismatch)?;
            Ok(Value::ListNum(value::bind_nums(&els).ok_or_else(mismatch)?))
        }
        VarKind::ListStr => {
            let els = value::parse_list(cur)?.ok_or_else(mismatch)?;
            Ok(Value::ListStr(value::bind_strs(&els).ok_or_else(mismatch)?))
        }
        VarKind::ListListNum => {
            let els = value::parse_list(cur)?.ok_or_else(mismatch)?;
            Ok(Value::ListListNum(
                value::bind_num_lists(&els).ok_or_else(mismatch)?,
            ))
        }
        VarKind::ListListStr => {
            let els = value::parse_list(cur)?.ok_or_else(mismatch)?;
            Ok(Value::ListListStr(
                value::bind_str_lists(&els).ok_or_else(mismatch)?,
            ))
        }
        VarKind::MapNum => {
            let pairs = value::parse_map(cur)?.ok_or_else(mismatch)?;
            let map: Option<HashMap<String, Numb>> = pairs
                .into_iter()
                .map(|(k, el)| el.as_num().map(|n| (k, n)))
                .collect();
            Ok(Value::MapNum(map.ok_or_else(mismatch)?))
        }
        VarKind::MapStr => {
            let pairs = value::parse_map(cur)?.ok_or_else(mismatch)?;
            let map: Option<HashMap<String, String>> = pairs
                .into_iter()
                .map(|(k, el)| el.as_str().map(|s| (k, s.to_string())))
                .collect();
            Ok(Value::MapStr(map.ok_or_else(mismatch)?))
        }
        VarKind::MapListNum => {
            let pairs = value::parse_map(cur)?.ok_or_else(mismatch)?;
            let map: Option<HashMap<String, Vec<Numb>>> = pairs
                .into_iter()
                .map(|(k, el)| el_as_num_list(&el).map(|v| (k, v)))
                .collect();
            Ok(Value::MapListNum(map.ok_or_else(mismatch)?))
        }
        VarKind::MapListStr => {
            let pairs = value::parse_map(cur)?.ok_or_else(mismatch)?;
            let map: Option<HashMap<String, Vec<String>>> = pairs
                .into_iter()
                .map(|(k, el)| el_as_str_list(&el).map(|v| (k, v)))
                .collect();
            Ok(Value::MapListStr(map.ok_or_else(mismatch)?))
        }
        VarKind::OrdMapNum => {
            let pairs = value::parse_map(cur)?.ok_or_else(mismatch)?;
            let map: Option<OrdMap<Numb>> = pairs
                .into_iter()
                .map(|(k, el)| el.as_num().map(|n| (k, n)))
                .collect::<Option<Vec<_>>>()
                .map(|v| v.into_iter().collect());
            Ok(Value::OrdMapNum(map.ok_or_else(mismatch)?))
        }
        // structure blocks never reach the value parser
        VarKind::Struct(_) => Err(mismatch()),
    }
}

/// Compose an incoming `+=` value over the previous visible value. Lists
/// concatenate; maps union with incoming entries overriding.
fn compose_append(
    name: &str,
    prior: &Value,
    incoming: Value,
    pos: &FilePos,
) -> Result<Value, PrepError> {
    match (prior.clone(), incoming) {
        (Value::ListNum(mut a), Value::ListNum(b)) => {
            a.extend(b);
            Ok(Value::ListNum(a))
        }
        (Value::ListStr(mut a), Value::ListStr(b)) => {
            a.extend(b);
            Ok(Value::ListStr(a))
        }
        (Value::ListListNum(mut a), Value::ListListNum(b)) => {
            a.extend(b);
            Ok(Value::ListListNum(a))
        }
        (Value::ListListStr(mut a), Value::ListListStr(b)) => {
            a.extend(b);
            Ok(Value::ListListStr(a))
        }
        (Value::MapNum(mut a), Value::MapNum(b)) => {
            a.extend(b);
            Ok(Value::MapNum(a))
        }
        (Value::MapStr(mut a), Value::MapStr(b)) => {
            a.extend(b);
            Ok(Value::MapStr(a))
        }
        (Value::MapListNum(mut a), Value::MapListNum(b)) => {
            a.extend(b);
            Ok(Value::MapListNum(a))
        }
        (Value::MapListStr(mut a), Value::MapListStr(b)) => {
            a.extend(b);
            Ok(Value::MapListStr(a))
        }
        (Value::OrdMapNum(mut a), Value::OrdMapNum(b)) => {
            for (k, v) in b.iter() {
                a.insert(k.to_string(), *v);
            }
            Ok(Value::OrdMapNum(a))
        }
        _ => Err(PrepError::AppendUnsupported {
            name: name.to_string(),
            pos: pos.clone(),
        }),
    }
}

fn element_count(value: &Value) -> usize {
    match value {
        Value::Num(_) | Value::Str(_) => 1,
        Value::ListNum(v) => v.len(),
        Value::ListStr(v) => v.len(),
        Value::ListListNum(v) => v.len(),
        Value::ListListStr(v) => v.len(),
        Value::MapNum(m) => m.len(),
        Value::MapStr(m) => m.len(),
        Value::MapListNum(m) => m.len(),
        Value::MapListStr(m) => m.len(),
        Value::OrdMapNum(m) => m.len(),
    }
}

/// Run one complete setting assignment: lookup, location check, parse,
/// `+=` composition, bounds, validation, activation, publication.
///
/// On `Err` nothing has been published and the grammar context is
/// untouched, so the previous value of the setting stays in force.
#[allow(clippy::too_many_arguments)]
pub fn assign(
    registry: &Registry,
    store: &mut SettingsStore,
    ctx: &mut GrammarContext,
    nearest: &mut NearestPitch,
    scope: ScopeId,
    current: Location,
    name: &str,
    name_pos: FilePos,
    append: bool,
    cur: &mut Cursor,
) -> Result<(), PrepError> {
    let id = registry.lookup(name).ok_or_else(|| PrepError::UnknownSetting {
        name: name.to_string(),
        pos: name_pos.clone(),
    })?;
    let def = registry.def(id);
    if !Location::allows(current, def.location) {
        return Err(PrepError::BadLocation {
            name: name.to_string(),
            location: current.as_str().to_string(),
            pos: name_pos,
        });
    }
    if append && !def.kind.appendable() {
        return Err(PrepError::AppendUnsupported {
            name: name.to_string(),
            pos: name_pos,
        });
    }

    cur.skip_trivia()?;
    let value_pos = cur.filepos();
    let incoming = parse_value_of_kind(cur, def.kind, name, ctx, nearest)?;
    let value = if append {
        match store.get(id, scope).or(def.default.as_ref()) {
            Some(prior) => compose_append(name, prior, incoming, &value_pos)?,
            None => incoming,
        }
    } else {
        incoming
    };

    let count = element_count(&value);
    if count < def.min_elements {
        return Err(PrepError::Validation {
            name: name.to_string(),
            message: format!("expected at least {} elements", def.min_elements),
            pos: value_pos,
        });
    }
    if let Some(max) = def.max_elements {
        if count > max {
            return Err(PrepError::Validation {
                name: name.to_string(),
                message: format!("expected at most {} elements", max),
                pos: value_pos,
            });
        }
    }
    if let Some(validate) = def.validator {
        validate(&value).map_err(|message| PrepError::Validation {
            name: name.to_string(),
            message,
            pos: value_pos.clone(),
        })?;
    }
    if let Some(target) = def.activation {
        ctx.activate(target, &value)
            .map_err(|message| PrepError::Validation {
                name: name.to_string(),
                message,
                pos: value_pos.clone(),
            })?;
    }

    debug!("set `{}' in scope {}", name, scope);
    store.publish(id, scope, value, value_pos);
    Ok(())
}

fn validate_power_of_two(value: &Value) -> Result<(), String> {
    match value {
        Value::Num(n) if n.is_exp_of_2() => Ok(()),
        _ => Err("must be a power of two".to_string()),
    }
}

fn validate_timesig(value: &Value) -> Result<(), String> {
    if let Value::ListNum(v) = value {
        for n in v {
            match n.to_int() {
                Some(i) if i > 0 => {}
                _ => return Err("numerator and denominator must be positive integers".to_string()),
            }
        }
        return Ok(());
    }
    Err("must be a pair of numbers".to_string())
}

fn validate_tuplet_divs(value: &Value) -> Result<(), String> {
    if let Value::ListListNum(levels) = value {
        for level in levels {
            for n in level {
                match n.to_int() {
                    Some(i) if i > 1 => {}
                    _ => return Err("divisions must be integers greater than 1".to_string()),
                }
            }
        }
        return Ok(());
    }
    Err("must be lists of integers".to_string())
}

fn validate_increasing(value: &Value) -> Result<(), String> {
    if let Value::ListNum(v) = value {
        if v.windows(2).all(|w| w[0] < w[1]) {
            return Ok(());
        }
        return Err("values must be strictly increasing".to_string());
    }
    Err("must be a list of numbers".to_string())
}

fn validate_nonneg_int(value: &Value) -> Result<(), String> {
    match value {
        Value::Num(n) if matches!(n.to_int(), Some(i) if i >= 0) => Ok(()),
        _ => Err("must be a non-negative integer".to_string()),
    }
}

fn validate_verbosity(value: &Value) -> Result<(), String> {
    match value {
        Value::Num(n) if matches!(n.to_int(), Some(0..=2)) => Ok(()),
        _ => Err("must be 0, 1 or 2".to_string()),
    }
}

fn validate_positive_values(value: &Value) -> Result<(), String> {
    let all_positive = match value {
        Value::MapNum(m) => m.values().all(|n| *n > Numb::Int(0)),
        Value::OrdMapNum(m) => m.iter().all(|(_, n)| *n > Numb::Int(0)),
        _ => false,
    };
    if all_positive {
        Ok(())
    } else {
        Err("values must be positive".to_string())
    }
}

fn validate_clef_ranges(value: &Value) -> Result<(), String> {
    if let Value::MapListNum(m) = value {
        for (clef, range) in m {
            if !crate::structs::CLEF_NAMES.contains(&clef.as_str()) {
                return Err(format!("unknown clef `{}'", clef));
            }
            match range.as_slice() {
                [low, high] if low < high => {}
                _ => return Err("each range must be (low, high) with low below high".to_string()),
            }
        }
        return Ok(());
    }
    Err("must map clef names to pitch ranges".to_string())
}

fn validate_file_extensions(value: &Value) -> Result<(), String> {
    if let Value::MapStr(m) = value {
        for (ext, module) in m {
            if ext.is_empty() {
                return Err("extension must not be empty".to_string());
            }
            if crate::modules::by_name(module).is_none() {
                return Err(format!("unknown module `{}'", module));
            }
        }
        return Ok(());
    }
    Err("must map extensions to module names".to_string())
}
