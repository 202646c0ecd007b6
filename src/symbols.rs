//! # Note and Duration Micro-Languages
//!
//! Symbol tables for pitch entry (note letters, accidentals, microtones,
//! octave marks) and duration entry (base symbols, dot multipliers, tie
//! connectors, tuplet multipliers), the parsers that compose them, and the
//! key-signature table derived from the `keysig` setting.
//!
//! None of these vocabularies is fixed: each table is the resolved value of
//! a user-settable configuration variable. Committing a new value for one
//! of those settings rebuilds the corresponding table here ("activation"),
//! so later parses in the same session recognize the new spellings. The
//! tables live in a [`GrammarContext`] owned by the session and threaded
//! through every parse call; nothing global is mutated.

use crate::error::PrepError;
use crate::numb::Numb;
use crate::scan::Cursor;
use crate::value::{OrdMap, Value};
use log::debug;

/// Number of slots in the key-signature table: pitches 0 through 74, six
/// octaves and change, enough to cover every notatable staff position.
pub const KEYSIG_SLOTS: usize = 75;

const DEFAULT_NOTE_NAMES: [(&str, i64); 7] = [
    ("c", 0),
    ("d", 2),
    ("e", 4),
    ("f", 5),
    ("g", 7),
    ("a", 9),
    ("b", 11),
];

const DEFAULT_ACCIDENTALS: [(&str, i64); 9] = [
    ("##", 2),
    ("x", 2),
    ("#", 1),
    ("s", 1),
    ("n", 0),
    ("b", -1),
    ("f", -1),
    ("bb", -2),
    ("ff", -2),
];

// (spelling, numerator, denominator)
const DEFAULT_MICROTONES: [(&str, i64, i64); 2] = [("+", 1, 2), ("-", -1, 2)];

const DEFAULT_OCTAVES: [(&str, i64); 2] = [("'", 12), (",", -12)];

// whole note = 1
const DEFAULT_DUR_BASES: [(&str, i64, i64); 6] = [
    ("w", 1, 1),
    ("h", 1, 2),
    ("q", 1, 4),
    ("e", 1, 8),
    ("s", 1, 16),
    ("x", 1, 32),
];

const DEFAULT_DUR_DOTS: [(&str, i64, i64); 2] = [("..", 7, 4), (".", 3, 2)];

const DEFAULT_DUR_TIES: [&str; 1] = ["~"];

const DEFAULT_TUPLETS: [(&str, i64, i64); 3] = [("3", 2, 3), ("5", 4, 5), ("7", 4, 7)];

/// A spelling-to-value table matched longest-spelling-first, so `##` wins
/// over `#` and `..` over `.`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable {
    entries: Vec<(String, Numb)>,
}

impl SymbolTable {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Numb)>) -> Self {
        let mut entries: Vec<(String, Numb)> = pairs.into_iter().collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    /// Build from a committed map-valued setting.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::MapNum(m) => Some(Self::from_pairs(
                m.iter().map(|(k, v)| (k.clone(), *v)),
            )),
            Value::OrdMapNum(m) => Some(Self::from_pairs(
                m.iter().map(|(k, v)| (k.to_string(), *v)),
            )),
            _ => None,
        }
    }

    /// Try each spelling at the cursor; on a match consume it and return
    /// its value.
    pub fn match_at(&self, cur: &mut Cursor) -> Option<Numb> {
        for (spelling, value) in &self.entries {
            if cur.eat_str(spelling) {
                return Some(*value);
            }
        }
        None
    }

    /// First spelling carrying exactly `value`, shortest first.
    pub fn spelling_of(&self, value: Numb) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(_, v)| *v == value)
            .map(|(s, _)| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Numb)> {
        self.entries.iter().map(|(s, v)| (s.as_str(), *v))
    }
}

/// Stateful octave placement for terse successive pitch entry.
///
/// A bare pitch class is placed in the octave nearest the previous pitch:
/// the representative within (-6, +6] semitones of the reference. When the
/// interval is exactly a tritone the previous melodic direction breaks the
/// tie. State persists for the lifetime of one scratch, across
/// comma-delimited sub-lists.
#[derive(Debug, Clone)]
pub struct NearestPitch {
    reference: Numb,
    going_up: bool,
}

impl Default for NearestPitch {
    fn default() -> Self {
        // middle C, rising
        Self {
            reference: Numb::Int(60),
            going_up: true,
        }
    }
}

impl NearestPitch {
    pub fn new(reference: Numb, going_up: bool) -> Self {
        Self {
            reference,
            going_up,
        }
    }

    /// Octave placement of `raw` nearest the reference, without committing.
    pub fn place(&self, raw: Numb) -> Numb {
        let diff = (raw - self.reference).pitch_class();
        let six = Numb::Int(6);
        let twelve = Numb::Int(12);
        let delta = if diff == six {
            if self.going_up {
                six
            } else {
                -six
            }
        } else if diff > six {
            diff - twelve
        } else {
            diff
        };
        self.reference + delta
    }

    /// Commit a placed (and possibly octave-shifted) pitch: it becomes the
    /// reference, and the melodic direction follows the motion.
    pub fn commit(&mut self, pitch: Numb) {
        if pitch > self.reference {
            self.going_up = true;
        } else if pitch < self.reference {
            self.going_up = false;
        }
        self.reference = pitch;
    }

    pub fn reference(&self) -> Numb {
        self.reference
    }
}

/// Accidental adjustments implied by the key signature, one slot per
/// natural pitch 0..75.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySigTable {
    adjust: Vec<Numb>,
}

impl Default for KeySigTable {
    fn default() -> Self {
        Self {
            adjust: vec![Numb::Int(0); KEYSIG_SLOTS],
        }
    }
}

impl KeySigTable {
    /// Build the table from `keysig` entries like `f#` or `bb`. Each entry
    /// is parsed with the current note/accidental/microtone vocabulary and
    /// applied to every octave of its natural pitch.
    pub fn build(entries: &[String], ctx: &GrammarContext) -> Result<Self, String> {
        let mut table = KeySigTable::default();
        for entry in entries {
            let mut cur = Cursor::new("keysig", entry);
            let class = ctx
                .note_names
                .match_at(&mut cur)
                .ok_or_else(|| format!("unknown note in key signature entry `{}'", entry))?;
            let mut acc = match ctx.accidentals.match_at(&mut cur) {
                Some(a) => a,
                None => {
                    return Err(format!(
                        "missing accidental in key signature entry `{}'",
                        entry
                    ))
                }
            };
            if let Some(micro) = ctx.microtones.match_at(&mut cur) {
                acc = acc + micro;
            }
            if !cur.at_end() {
                return Err(format!("malformed key signature entry `{}'", entry));
            }
            let class = class
                .to_int()
                .ok_or_else(|| format!("fractional note in key signature entry `{}'", entry))?;
            let mut slot = class as usize;
            while slot < KEYSIG_SLOTS {
                table.adjust[slot] = acc;
                slot += 12;
            }
        }
        Ok(table)
    }

    /// Accidental adjustment for a natural pitch. Pitches beyond the table
    /// fall back to their pitch class.
    pub fn adjustment(&self, natural: i64) -> Numb {
        let idx = if (0..KEYSIG_SLOTS as i64).contains(&natural) {
            natural as usize
        } else {
            natural.rem_euclid(12) as usize
        };
        self.adjust[idx]
    }

    /// Serialize back to a note/accidental string list. The result is
    /// semantically equal to the defining list after re-parsing, though
    /// spellings may be normalized.
    pub fn to_entries(&self, ctx: &GrammarContext) -> Vec<String> {
        let mut out = Vec::new();
        for class in 0..12 {
            let adj = self.adjust[class as usize];
            if adj == Numb::Int(0) {
                continue;
            }
            let letter = ctx
                .note_names
                .iter()
                .find(|(_, v)| *v == Numb::Int(class))
                .map(|(s, _)| s.to_string());
            let acc = ctx.accidentals.spelling_of(adj);
            if let (Some(letter), Some(acc)) = (letter, acc) {
                out.push(format!("{}{}", letter, acc));
            }
        }
        out
    }
}

/// Which symbol table a committed setting feeds back into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    NoteNames,
    Accidentals,
    Microtones,
    Octaves,
    DurBases,
    DurDots,
    DurTies,
    Tuplets,
    KeySig,
}

/// The symbol tables currently in force for one parse session.
#[derive(Debug, Clone)]
pub struct GrammarContext {
    pub note_names: SymbolTable,
    pub accidentals: SymbolTable,
    pub microtones: SymbolTable,
    pub octaves: SymbolTable,
    pub dur_bases: SymbolTable,
    pub dur_dots: SymbolTable,
    pub dur_ties: Vec<String>,
    pub tuplets: SymbolTable,
    pub keysig: KeySigTable,
}

impl Default for GrammarContext {
    fn default() -> Self {
        let int_pairs = |pairs: &[(&str, i64)]| {
            SymbolTable::from_pairs(
                pairs
                    .iter()
                    .map(|(s, v)| (s.to_string(), Numb::Int(*v))),
            )
        };
        let rat_pairs = |pairs: &[(&str, i64, i64)]| {
            SymbolTable::from_pairs(pairs.iter().map(|(s, n, d)| {
                // default tables never carry a zero denominator
                (s.to_string(), Numb::rational(*n, *d).unwrap_or(Numb::Int(0)))
            }))
        };
        Self {
            note_names: int_pairs(&DEFAULT_NOTE_NAMES),
            accidentals: int_pairs(&DEFAULT_ACCIDENTALS),
            microtones: rat_pairs(&DEFAULT_MICROTONES),
            octaves: int_pairs(&DEFAULT_OCTAVES),
            dur_bases: rat_pairs(&DEFAULT_DUR_BASES),
            dur_dots: rat_pairs(&DEFAULT_DUR_DOTS),
            dur_ties: DEFAULT_DUR_TIES.iter().map(|s| s.to_string()).collect(),
            tuplets: rat_pairs(&DEFAULT_TUPLETS),
            keysig: KeySigTable::default(),
        }
    }
}

impl GrammarContext {
    /// Rebuild one symbol table from a freshly committed setting value.
    /// Runs strictly after the value has passed validation.
    pub fn activate(&mut self, target: Activation, value: &Value) -> Result<(), String> {
        match target {
            Activation::DurTies => match value {
                Value::ListStr(ties) => {
                    self.dur_ties = ties.clone();
                }
                _ => return Err("tie connectors must be a list of strings".to_string()),
            },
            Activation::KeySig => match value {
                Value::ListStr(entries) => {
                    self.keysig = KeySigTable::build(entries, self)?;
                }
                _ => return Err("key signature must be a list of strings".to_string()),
            },
            _ => {
                let table = SymbolTable::from_value(value)
                    .ok_or_else(|| "symbol table must be a map of numbers".to_string())?;
                match target {
                    Activation::NoteNames => self.note_names = table,
                    Activation::Accidentals => self.accidentals = table,
                    Activation::Microtones => self.microtones = table,
                    Activation::Octaves => self.octaves = table,
                    Activation::DurBases => self.dur_bases = table,
                    Activation::DurDots => self.dur_dots = table,
                    Activation::Tuplets => self.tuplets = table,
                    Activation::DurTies | Activation::KeySig => unreachable!(),
                }
            }
        }
        debug!("rebuilt symbol table for {:?}", target);
        Ok(())
    }

    /// The default value of the setting feeding each table, used when
    /// registering the standard settings.
    pub fn default_setting_value(target: Activation) -> Value {
        let int_map = |pairs: &[(&str, i64)]| {
            Value::MapNum(
                pairs
                    .iter()
                    .map(|(s, v)| (s.to_string(), Numb::Int(*v)))
                    .collect(),
            )
        };
        let rat_map = |pairs: &[(&str, i64, i64)]| {
            Value::MapNum(
                pairs
                    .iter()
                    .map(|(s, n, d)| {
                        (s.to_string(), Numb::rational(*n, *d).unwrap_or(Numb::Int(0)))
                    })
                    .collect(),
            )
        };
        match target {
            Activation::NoteNames => int_map(&DEFAULT_NOTE_NAMES),
            Activation::Accidentals => int_map(&DEFAULT_ACCIDENTALS),
            Activation::Microtones => Value::MapNum(
                DEFAULT_MICROTONES
                    .iter()
                    .map(|(s, n, d)| {
                        (s.to_string(), Numb::rational(*n, *d).unwrap_or(Numb::Int(0)))
                    })
                    .collect(),
            ),
            Activation::Octaves => int_map(&DEFAULT_OCTAVES),
            // duration bases keep insertion order: it is the printing
            // precedence when durations are serialized back out
            Activation::DurBases => Value::OrdMapNum(
                DEFAULT_DUR_BASES
                    .iter()
                    .map(|(s, n, d)| {
                        (s.to_string(), Numb::rational(*n, *d).unwrap_or(Numb::Int(0)))
                    })
                    .collect::<OrdMap<Numb>>(),
            ),
            Activation::DurDots => rat_map(&DEFAULT_DUR_DOTS),
            Activation::DurTies => {
                Value::ListStr(DEFAULT_DUR_TIES.iter().map(|s| s.to_string()).collect())
            }
            Activation::Tuplets => rat_map(&DEFAULT_TUPLETS),
            Activation::KeySig => Value::ListStr(Vec::new()),
        }
    }
}

/// A pitch: note symbol, then optional accidental, microtone and octave
/// mark, each matched only if the previous term matched. The bare pitch
/// class is placed in the octave nearest the scratch reference, octave
/// marks shift from there, and the result becomes the new reference.
pub fn parse_pitch(
    cur: &mut Cursor,
    ctx: &GrammarContext,
    nearest: &mut NearestPitch,
) -> Result<Option<Numb>, PrepError> {
    cur.skip_trivia()?;
    let mut raw = match ctx.note_names.match_at(cur) {
        Some(n) => n,
        None => return Ok(None),
    };
    if let Some(acc) = ctx.accidentals.match_at(cur) {
        raw = raw + acc;
        if let Some(micro) = ctx.microtones.match_at(cur) {
            raw = raw + micro;
        }
    } else if let Some(micro) = ctx.microtones.match_at(cur) {
        raw = raw + micro;
    }
    let mut pitch = nearest.place(raw);
    if let Some(shift) = ctx.octaves.match_at(cur) {
        pitch = pitch + shift;
    }
    nearest.commit(pitch);
    Ok(Some(pitch))
}

/// A duration: base symbol, dot multipliers, optional tie to a following
/// duration (added), and tuplet multipliers.
pub fn parse_duration(cur: &mut Cursor, ctx: &GrammarContext) -> Result<Option<Numb>, PrepError> {
    cur.skip_trivia()?;
    let base = match ctx.dur_bases.match_at(cur) {
        Some(b) => b,
        None => return Ok(None),
    };
    let mut dur = base;
    while let Some(dot) = ctx.dur_dots.match_at(cur) {
        dur = dur * dot;
    }
    let tie_mark = cur.mark();
    let tied = ctx.dur_ties.iter().any(|tie| cur.eat_str(tie));
    if tied {
        match parse_duration(cur, ctx)? {
            Some(rest) => dur = dur + rest,
            None => cur.reset(tie_mark),
        }
    }
    while let Some(mult) = ctx.tuplets.match_at(cur) {
        dur = dur * mult;
    }
    Ok(Some(dur))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cur(src: &str) -> Cursor<'_> {
        Cursor::new("test.fms", src)
    }

    fn rat(n: i64, d: i64) -> Numb {
        Numb::rational(n, d).unwrap()
    }

    #[test]
    fn test_stepwise_continuation() {
        let ctx = GrammarContext::default();
        let mut nearest = NearestPitch::default();
        let mut c = cur("c d e");
        let mut pitches = Vec::new();
        for _ in 0..3 {
            pitches.push(parse_pitch(&mut c, &ctx, &mut nearest).unwrap().unwrap());
        }
        assert_eq!(pitches, vec![Numb::Int(60), Numb::Int(62), Numb::Int(64)]);
    }

    #[test]
    fn test_nearest_wraps_down() {
        let ctx = GrammarContext::default();
        // from b below middle c, c goes up a semitone, not down an octave
        let mut nearest = NearestPitch::new(Numb::Int(59), true);
        let pitch = parse_pitch(&mut cur("c"), &ctx, &mut nearest)
            .unwrap()
            .unwrap();
        assert_eq!(pitch, Numb::Int(60));
    }

    #[test]
    fn test_tritone_tie_break_follows_direction() {
        let up = NearestPitch::new(Numb::Int(60), true);
        assert_eq!(up.place(Numb::Int(6)), Numb::Int(66));
        let down = NearestPitch::new(Numb::Int(60), false);
        assert_eq!(down.place(Numb::Int(6)), Numb::Int(54));
    }

    #[test]
    fn test_direction_tracks_motion() {
        let ctx = GrammarContext::default();
        let mut nearest = NearestPitch::default();
        let mut c = cur("c b f#");
        let first = parse_pitch(&mut c, &ctx, &mut nearest).unwrap().unwrap();
        assert_eq!(first, Numb::Int(60));
        let second = parse_pitch(&mut c, &ctx, &mut nearest).unwrap().unwrap();
        assert_eq!(second, Numb::Int(59)); // nearest b is below
        let third = parse_pitch(&mut c, &ctx, &mut nearest).unwrap().unwrap();
        assert_eq!(third, Numb::Int(54)); // f# below b, not above
    }

    #[test]
    fn test_pitch_accidentals_and_octaves() {
        let ctx = GrammarContext::default();
        let mut nearest = NearestPitch::default();
        let pitch = parse_pitch(&mut cur("c#'"), &ctx, &mut nearest)
            .unwrap()
            .unwrap();
        assert_eq!(pitch, Numb::Int(73));
        assert_eq!(nearest.reference(), Numb::Int(73));
    }

    #[test]
    fn test_quartertone_pitch() {
        let ctx = GrammarContext::default();
        let mut nearest = NearestPitch::default();
        let pitch = parse_pitch(&mut cur("c#+"), &ctx, &mut nearest)
            .unwrap()
            .unwrap();
        assert_eq!(pitch, rat(123, 2)); // 61.5
    }

    #[test]
    fn test_duration_dots_and_ties() {
        let ctx = GrammarContext::default();
        assert_eq!(
            parse_duration(&mut cur("q."), &ctx).unwrap().unwrap(),
            rat(3, 8)
        );
        assert_eq!(
            parse_duration(&mut cur("q~q"), &ctx).unwrap().unwrap(),
            rat(1, 2)
        );
        assert_eq!(
            parse_duration(&mut cur("h.."), &ctx).unwrap().unwrap(),
            rat(7, 8)
        );
    }

    #[test]
    fn test_duration_tuplet() {
        let ctx = GrammarContext::default();
        assert_eq!(
            parse_duration(&mut cur("q3"), &ctx).unwrap().unwrap(),
            rat(1, 6)
        );
        assert_eq!(
            parse_duration(&mut cur("e5"), &ctx).unwrap().unwrap(),
            rat(1, 10)
        );
    }

    #[test]
    fn test_activation_changes_vocabulary() {
        let mut ctx = GrammarContext::default();
        let mut nearest = NearestPitch::default();
        assert_eq!(
            parse_pitch(&mut cur("do"), &ctx, &mut nearest).unwrap(),
            Some(Numb::Int(62)) // "d" matches, "o" is left over
        );
        let solfege = Value::MapNum(
            [("do", 0i64), ("re", 2), ("mi", 4), ("fa", 5), ("sol", 7), ("la", 9), ("ti", 11)]
                .iter()
                .map(|(s, v)| (s.to_string(), Numb::Int(*v)))
                .collect(),
        );
        ctx.activate(Activation::NoteNames, &solfege).unwrap();
        let mut nearest = NearestPitch::default();
        let mut c = cur("do re mi");
        let mut pitches = Vec::new();
        for _ in 0..3 {
            pitches.push(parse_pitch(&mut c, &ctx, &mut nearest).unwrap().unwrap());
        }
        assert_eq!(pitches, vec![Numb::Int(60), Numb::Int(62), Numb::Int(64)]);
    }

    #[test]
    fn test_longest_match_first() {
        let ctx = GrammarContext::default();
        let mut nearest = NearestPitch::default();
        // "##" must win over "#"
        let pitch = parse_pitch(&mut cur("c##"), &ctx, &mut nearest)
            .unwrap()
            .unwrap();
        assert_eq!(pitch, Numb::Int(62));
    }

    #[test]
    fn test_keysig_build_and_adjust() {
        let ctx = GrammarContext::default();
        let entries = vec!["f#".to_string(), "c#".to_string()];
        let table = KeySigTable::build(&entries, &ctx).unwrap();
        assert_eq!(table.adjustment(5), Numb::Int(1)); // f
        assert_eq!(table.adjustment(0), Numb::Int(1)); // c
        assert_eq!(table.adjustment(7), Numb::Int(0)); // g
        assert_eq!(table.adjustment(17), Numb::Int(1)); // f an octave up
    }

    #[test]
    fn test_keysig_covers_full_range() {
        let ctx = GrammarContext::default();
        let table = KeySigTable::build(&["f#".to_string()], &ctx).unwrap();
        // every octave slot of f inside the table
        assert_eq!(table.adjustment(29), Numb::Int(1));
        assert_eq!(table.adjustment(65), Numb::Int(1));
        assert_eq!(table.adjustment(74), Numb::Int(0));
        // beyond the table and below it, the pitch class decides
        assert_eq!(table.adjustment(77), Numb::Int(1));
        assert_eq!(table.adjustment(-7), Numb::Int(1));
    }

    #[test]
    fn test_keysig_round_trip() {
        let ctx = GrammarContext::default();
        let entries = vec!["bb".to_string(), "eb".to_string(), "ab".to_string()];
        let table = KeySigTable::build(&entries, &ctx).unwrap();
        let serialized = table.to_entries(&ctx);
        let rebuilt = KeySigTable::build(&serialized, &ctx).unwrap();
        assert_eq!(table, rebuilt);
    }

    #[test]
    fn test_keysig_rejects_bad_entry() {
        let ctx = GrammarContext::default();
        assert!(KeySigTable::build(&["z#".to_string()], &ctx).is_err());
        assert!(KeySigTable::build(&["c#junk".to_string()], &ctx).is_err());
    }
}
