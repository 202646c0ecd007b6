//! # Values
//!
//! The universal intermediate representation built by the grammar
//! ([`ListEl`]), the resolved typed value stored in a setting ([`Value`]),
//! and the insertion-ordered map used where symbol precedence matters
//! ([`OrdMap`]).
//!
//! List and map literals are parsed here into `ListEl` trees; the settings
//! registry then binds a tree into the specifically-typed `Value` a setting
//! declares, rejecting shape mismatches. The tree is plain owned data --
//! splicing a nested list into its parent is a `Vec` push, nothing is
//! shared.

use crate::error::PrepError;
use crate::numb::Numb;
use crate::scan::Cursor;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// Characters that terminate a bare (unquoted) string inside a value
/// literal: list/map/structure delimiters and the pair separators.
pub const VALUE_DELIMS: &str = ",()<>:=";

/// One parsed element of a list or map literal, before binding to a
/// setting's declared kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEl {
    Num(Numb),
    Str(String),
    List(Vec<ListEl>),
}

impl ListEl {
    pub fn as_num(&self) -> Option<Numb> {
        match self {
            ListEl::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ListEl::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A string-keyed map that preserves first-insertion order. Re-inserting an
/// existing key replaces the value but keeps the original position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrdMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> OrdMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, key: String, value: V) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for OrdMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = OrdMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrdMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A resolved, validated setting value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Num(Numb),
    Str(String),
    ListNum(Vec<Numb>),
    ListStr(Vec<String>),
    ListListNum(Vec<Vec<Numb>>),
    ListListStr(Vec<Vec<String>>),
    MapNum(HashMap<String, Numb>),
    MapStr(HashMap<String, String>),
    MapListNum(HashMap<String, Vec<Numb>>),
    MapListStr(HashMap<String, Vec<String>>),
    OrdMapNum(OrdMap<Numb>),
}

impl Value {
    /// Serialize back to settings-language source syntax. Reparsing the
    /// result yields a semantically equal value.
    pub fn to_source(&self) -> String {
        match self {
            Value::Num(n) => n.to_string(),
            Value::Str(s) => quote_string(s),
            Value::ListNum(v) => {
                list_source(v.iter().map(|n| n.to_string()))
            }
            Value::ListStr(v) => list_source(v.iter().map(|s| quote_string(s))),
            Value::ListListNum(v) => list_source(
                v.iter()
                    .map(|inner| list_source(inner.iter().map(|n| n.to_string()))),
            ),
            Value::ListListStr(v) => list_source(
                v.iter()
                    .map(|inner| list_source(inner.iter().map(|s| quote_string(s)))),
            ),
            Value::MapNum(m) => map_source(sorted(m).map(|(k, v)| (k, v.to_string()))),
            Value::MapStr(m) => map_source(sorted(m).map(|(k, v)| (k, quote_string(v)))),
            Value::MapListNum(m) => map_source(
                sorted(m).map(|(k, v)| (k, list_source(v.iter().map(|n| n.to_string())))),
            ),
            Value::MapListStr(m) => map_source(
                sorted(m).map(|(k, v)| (k, list_source(v.iter().map(|s| quote_string(s))))),
            ),
            Value::OrdMapNum(m) => map_source(m.iter().map(|(k, v)| (k, v.to_string()))),
        }
    }
}

fn sorted<V>(m: &HashMap<String, V>) -> impl Iterator<Item = (&str, &V)> {
    let mut entries: Vec<_> = m.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries.into_iter()
}

fn list_source(items: impl Iterator<Item = String>) -> String {
    format!("({})", items.collect::<Vec<_>>().join(", "))
}

fn map_source<'a>(items: impl Iterator<Item = (&'a str, String)>) -> String {
    format!(
        "({})",
        items
            .map(|(k, v)| format!("{}: {}", quote_string(k), v))
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Quote a string for source output unless it can stand bare.
pub fn quote_string(s: &str) -> String {
    let bare_ok = !s.is_empty()
        && !s.chars().any(|c| {
            c.is_whitespace() || VALUE_DELIMS.contains(c) || c == '"' || c == '\''
        })
        && !s.contains("//")
        && !s.contains("/-");
    if bare_ok {
        s.to_string()
    } else {
        let mut out = String::from("'");
        for c in s.chars() {
            if c == '\'' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('\'');
        out
    }
}

/// One scalar-or-nested-list element.
///
/// A number only wins when followed by a clean boundary, otherwise the text
/// is a bare string (`8va` is a string, not the number 8).
pub fn parse_element(cur: &mut Cursor) -> Result<Option<ListEl>, PrepError> {
    cur.skip_trivia()?;
    if cur.starts_with("(") {
        return Ok(parse_paren_list(cur)?.map(ListEl::List));
    }
    let mark = cur.mark();
    if let Some(n) = cur.number()? {
        let boundary = match cur.peek() {
            None => true,
            Some(c) if c.is_whitespace() || VALUE_DELIMS.contains(c) => true,
            _ => cur.starts_with("//") || cur.starts_with("/-"),
        };
        if boundary {
            return Ok(Some(ListEl::Num(n)));
        }
        cur.reset(mark);
    }
    Ok(cur.string_value(VALUE_DELIMS)?.map(ListEl::Str))
}

/// `( elem , elem ... )`. The opening paren must already be next.
fn parse_paren_list(cur: &mut Cursor) -> Result<Option<Vec<ListEl>>, PrepError> {
    if !cur.eat_char('(') {
        return Ok(None);
    }
    let mut out = Vec::new();
    loop {
        cur.skip_trivia()?;
        if cur.eat_char(')') {
            break;
        }
        match parse_element(cur)? {
            Some(el) => out.push(el),
            None => return Err(cur.syntax_error("expected list element")),
        }
        cur.skip_trivia()?;
        if cur.eat_char(',') {
            continue;
        }
        if cur.eat_char(')') {
            break;
        }
        return Err(cur.syntax_error("expected `,' or `)' in list"));
    }
    Ok(Some(out))
}

/// A list literal: parenthesized, or a bare singleton when exactly one
/// value is given with no parens.
pub fn parse_list(cur: &mut Cursor) -> Result<Option<Vec<ListEl>>, PrepError> {
    cur.skip_trivia()?;
    if cur.starts_with("(") {
        return parse_paren_list(cur);
    }
    Ok(parse_element(cur)?.map(|el| vec![el]))
}

/// A map literal: `( name (:|=) value , ... )`. Duplicate names overwrite
/// earlier entries within the same literal (last write wins); order of
/// first appearance is kept.
pub fn parse_map(cur: &mut Cursor) -> Result<Option<Vec<(String, ListEl)>>, PrepError> {
    cur.skip_trivia()?;
    if !cur.eat_char('(') {
        return Ok(None);
    }
    let mut out: Vec<(String, ListEl)> = Vec::new();
    loop {
        cur.skip_trivia()?;
        if cur.eat_char(')') {
            break;
        }
        let key = match cur.string_value(VALUE_DELIMS)? {
            Some(k) => k,
            None => return Err(cur.syntax_error("expected map key")),
        };
        cur.skip_trivia()?;
        if !cur.eat_char(':') && !cur.eat_char('=') {
            return Err(cur.syntax_error("expected `:' or `=' after map key"));
        }
        match parse_element(cur)? {
            Some(el) => {
                if let Some(slot) = out.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = el;
                } else {
                    out.push((key, el));
                }
            }
            None => return Err(cur.syntax_error("expected map value")),
        }
        cur.skip_trivia()?;
        if cur.eat_char(',') {
            continue;
        }
        if cur.eat_char(')') {
            break;
        }
        return Err(cur.syntax_error("expected `,' or `)' in map"));
    }
    Ok(Some(out))
}

/// Bind a list of elements as numbers; `None` on any shape mismatch.
pub fn bind_nums(els: &[ListEl]) -> Option<Vec<Numb>> {
    els.iter().map(|el| el.as_num()).collect()
}

/// Bind a list of elements as strings.
pub fn bind_strs(els: &[ListEl]) -> Option<Vec<String>> {
    els.iter()
        .map(|el| el.as_str().map(|s| s.to_string()))
        .collect()
}

/// Bind as a list of number lists. A bare scalar is accepted as a
/// one-element inner list (the singleton rule applies at every level).
pub fn bind_num_lists(els: &[ListEl]) -> Option<Vec<Vec<Numb>>> {
    els.iter()
        .map(|el| match el {
            ListEl::List(inner) => bind_nums(inner),
            ListEl::Num(n) => Some(vec![*n]),
            ListEl::Str(_) => None,
        })
        .collect()
}

/// Bind as a list of string lists.
pub fn bind_str_lists(els: &[ListEl]) -> Option<Vec<Vec<String>>> {
    els.iter()
        .map(|el| match el {
            ListEl::List(inner) => bind_strs(inner),
            ListEl::Str(s) => Some(vec![s.clone()]),
            ListEl::Num(_) => None,
        })
        .collect()
}
