//! # Parse Session
//!
//! One [`Session`] owns everything a document parse touches: the standard
//! settings registry, the store of assigned values, the grammar context
//! with the active symbol tables, the registered structures and the
//! diagnostic sink. Sessions are single-threaded and share nothing, so
//! independent documents can be resolved on independent sessions
//! concurrently.
//!
//! A document is a sequence of setting assignments (`name = value`,
//! `name += value`, or structure blocks). A failed assignment is recorded
//! as a diagnostic and parsing resumes at the next comma or newline
//! outside any open bracket; the previous value of the setting stays in
//! force. Only a hard top-level error (an unterminated block comment or
//! string) aborts the document.

use crate::error::{Diagnostic, DiagnosticLabels, PrepError};
use crate::location::Location;
use crate::scan::Cursor;
use crate::structs::{
    self, Export, Import, Instrument, PercInst, StructKind, StructMap,
};
use crate::symbols::{GrammarContext, NearestPitch};
use crate::value::{OrdMap, Value};
use crate::vars::{self, Registry, SettingsStore, VarKind};
use log::warn;
use serde::Serialize;

/// Outcome of one document parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Assignments that failed and were recovered past.
    pub errors: usize,
}

/// The fully resolved state of a session, ready for serialization.
#[derive(Debug, Serialize)]
pub struct Output {
    pub settings: OrdMap<Value>,
    pub instruments: StructMap<Instrument>,
    pub percussion: StructMap<PercInst>,
    pub imports: Vec<Import>,
    pub exports: Vec<Export>,
}

pub struct Session {
    registry: &'static Registry,
    pub store: SettingsStore,
    pub ctx: GrammarContext,
    pub instruments: StructMap<Instrument>,
    pub percinsts: StructMap<PercInst>,
    pub imports: Vec<Import>,
    pub exports: Vec<Export>,
    pub diagnostics: Vec<Diagnostic>,
    labels: DiagnosticLabels,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            registry: vars::standard(),
            store: SettingsStore::new(),
            ctx: GrammarContext::default(),
            instruments: StructMap::new(),
            percinsts: StructMap::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            diagnostics: Vec::new(),
            labels: DiagnosticLabels::default(),
        }
    }

    /// Replace the position labels used when formatting diagnostics.
    pub fn set_labels(&mut self, labels: DiagnosticLabels) {
        self.labels = labels;
    }

    pub fn registry(&self) -> &'static Registry {
        self.registry
    }

    /// Parse a score document at score level.
    pub fn parse_document(&mut self, file: &str, source: &str) -> Result<Report, PrepError> {
        self.parse_at(file, source, Location::Score)
    }

    /// Parse an init file, which may assign any setting.
    pub fn parse_init(&mut self, file: &str, source: &str) -> Result<Report, PrepError> {
        self.parse_at(file, source, Location::InitFile)
    }

    fn parse_at(
        &mut self,
        file: &str,
        source: &str,
        current: Location,
    ) -> Result<Report, PrepError> {
        let mut cur = Cursor::new(file, source);
        let mut nearest = NearestPitch::default();
        let before = self.diagnostics.len();
        loop {
            cur.skip_trivia()?;
            if cur.at_end() {
                break;
            }
            match self.parse_one(&mut cur, current, &mut nearest) {
                Ok(()) => {
                    cur.skip_trivia()?;
                    cur.eat_char(',');
                }
                Err(err) => {
                    let diagnostic = err.to_diagnostic();
                    warn!("{}", diagnostic.format(&self.labels));
                    self.diagnostics.push(diagnostic);
                    recover(&mut cur);
                }
            }
        }
        Ok(Report {
            errors: self.diagnostics.len() - before,
        })
    }

    fn parse_one(
        &mut self,
        cur: &mut Cursor,
        current: Location,
        nearest: &mut NearestPitch,
    ) -> Result<(), PrepError> {
        let name_pos = cur.filepos();
        let name = cur
            .identifier()
            .ok_or_else(|| cur.syntax_error("expected a setting name"))?;
        cur.skip_trivia()?;
        let append = cur.eat_str("+=");
        let has_op = append || cur.eat_str(":=") || cur.eat_char('=');

        if let Some(id) = self.registry.lookup(&name) {
            if let VarKind::Struct(kind) = self.registry.def(id).kind {
                let defined = self.registry.def(id).location;
                if !Location::allows(current, defined) {
                    return Err(PrepError::BadLocation {
                        name,
                        location: current.as_str().to_string(),
                        pos: name_pos,
                    });
                }
                // structures are not composable, only redefinable
                if append {
                    return Err(PrepError::AppendUnsupported {
                        name,
                        pos: name_pos,
                    });
                }
                // the operator is optional before a structure body
                return self.parse_struct(cur, kind, nearest);
            }
        }

        if !has_op {
            return Err(cur.syntax_error("expected `=', `:=' or `+=' after setting name"));
        }

        vars::assign(
            self.registry,
            &mut self.store,
            &mut self.ctx,
            nearest,
            SettingsStore::ROOT,
            current,
            &name,
            name_pos,
            append,
            cur,
        )
    }

    fn parse_struct(
        &mut self,
        cur: &mut Cursor,
        kind: StructKind,
        nearest: &mut NearestPitch,
    ) -> Result<(), PrepError> {
        match kind {
            StructKind::Instrument => {
                let rec = structs::parse_instrument(
                    cur,
                    &self.ctx,
                    nearest,
                    &self.instruments,
                    &self.percinsts,
                )?;
                self.instruments.insert(rec.id.clone(), rec);
            }
            StructKind::PercInstrument => {
                let rec = structs::parse_percinst(cur, &self.ctx, nearest, &self.percinsts)?;
                self.percinsts.insert(rec.id.clone(), rec);
            }
            StructKind::Import => {
                self.imports.push(structs::parse_import(cur)?);
            }
            StructKind::Export => {
                self.exports.push(structs::parse_export(cur)?);
            }
        }
        Ok(())
    }

    /// Diagnostics formatted with the session's labels, in order.
    pub fn formatted_diagnostics(&self) -> Vec<String> {
        self.diagnostics
            .iter()
            .map(|d| d.format(&self.labels))
            .collect()
    }

    /// The resolved value visible at score level for a named setting.
    pub fn value(&self, name: &str) -> Option<Value> {
        let id = self.registry.lookup(name)?;
        self.store
            .get(id, SettingsStore::ROOT)
            .cloned()
            .or_else(|| self.registry.def(id).default.clone())
    }

    /// Snapshot of everything the session resolved.
    pub fn output(&self) -> Output {
        let settings = self
            .store
            .resolved(self.registry, SettingsStore::ROOT)
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Output {
            settings,
            instruments: self.instruments.clone(),
            percussion: self.percinsts.clone(),
            imports: self.imports.clone(),
            exports: self.exports.clone(),
        }
    }
}

/// Skip to the next comma or newline outside any bracket, consuming it,
/// so parsing can resume at the next assignment.
fn recover(cur: &mut Cursor) {
    let mut depth = 0usize;
    while let Some(c) = cur.peek() {
        match c {
            '(' | '<' => {
                depth += 1;
            }
            ')' | '>' => {
                depth = depth.saturating_sub(1);
            }
            ',' | '\n' if depth == 0 => {
                cur.bump();
                return;
            }
            _ => {}
        }
        cur.bump();
    }
}

/// Resolve one document on a fresh session.
pub fn resolve(file: &str, source: &str) -> Result<Session, PrepError> {
    let mut session = Session::new();
    session.parse_document(file, source)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numb::Numb;

    #[test]
    fn test_basic_document() {
        let session = resolve(
            "score.fms",
            "title = 'My Piece', author := Someone\nbeat = 1/8",
        )
        .unwrap();
        assert!(session.diagnostics.is_empty());
        assert_eq!(session.value("title"), Some(Value::Str("My Piece".to_string())));
        assert_eq!(session.value("author"), Some(Value::Str("Someone".to_string())));
        assert_eq!(
            session.value("beat"),
            Some(Value::Num(Numb::rational(1, 8).unwrap()))
        );
    }

    #[test]
    fn test_recovery_resumes_at_next_assignment() {
        let mut session = Session::new();
        let report = session
            .parse_document("score.fms", "beat = 3, title = Good")
            .unwrap();
        assert_eq!(report.errors, 1);
        // the failed assignment left the default in force
        assert_eq!(
            session.value("beat"),
            Some(Value::Num(Numb::rational(1, 4).unwrap()))
        );
        assert_eq!(session.value("title"), Some(Value::Str("Good".to_string())));
    }

    #[test]
    fn test_recovery_skips_past_bracketed_garbage() {
        let mut session = Session::new();
        let report = session
            .parse_document("score.fms", "timesig = (3, oops), title = Fine")
            .unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(session.value("title"), Some(Value::Str("Fine".to_string())));
    }

    #[test]
    fn test_location_rejection_surfaces_as_diagnostic() {
        let mut session = Session::new();
        let report = session
            .parse_document("score.fms", "notehead = diamond")
            .unwrap();
        assert_eq!(report.errors, 1);
        let formatted = session.formatted_diagnostics();
        assert!(formatted[0].contains("for setting `notehead'"));
        assert!(formatted[0].contains("line 1"));
    }

    #[test]
    fn test_init_file_may_set_anything() {
        let mut session = Session::new();
        let report = session
            .parse_init("init.fms", "notehead = diamond, n-threads = 4")
            .unwrap();
        assert_eq!(report.errors, 0);
        assert_eq!(
            session.value("notehead"),
            Some(Value::Str("diamond".to_string()))
        );
    }

    #[test]
    fn test_structures_register_and_template() {
        let src = "inst <id: violin, name: Violin, abbr: Vln>\n\
                   inst <id: viola, template: violin, name: Viola>";
        let session = resolve("score.fms", src).unwrap();
        assert_eq!(session.instruments.len(), 2);
        let viola = session.instruments.get("viola").unwrap();
        assert_eq!(viola.abbr, "Vln");
        assert_eq!(viola.name, "Viola");
    }

    #[test]
    fn test_append_on_structure_rejected() {
        let mut session = Session::new();
        let report = session
            .parse_document("score.fms", "inst += <id: x, name: X>")
            .unwrap();
        assert_eq!(report.errors, 1);
        assert!(session.instruments.is_empty());
        let formatted = session.formatted_diagnostics();
        assert!(formatted[0].contains("append not supported"));
        assert!(formatted[0].contains("for setting `inst'"));
    }

    #[test]
    fn test_missing_operator_rejected() {
        let mut session = Session::new();
        let report = session
            .parse_document("score.fms", "beat 1/4\ntitle = Kept")
            .unwrap();
        assert_eq!(report.errors, 1);
        // the malformed assignment left the default in force
        assert_eq!(
            session.value("beat"),
            Some(Value::Num(Numb::rational(1, 4).unwrap()))
        );
        assert_eq!(session.value("title"), Some(Value::Str("Kept".to_string())));
    }

    #[test]
    fn test_unterminated_comment_is_hard_error() {
        let mut session = Session::new();
        assert!(session
            .parse_document("score.fms", "beat = 1/4 /- no close")
            .is_err());
    }

    #[test]
    fn test_append_across_assignments() {
        let session = resolve(
            "score.fms",
            "dyn-levels = (1, 2)\ndyn-levels += (3, 4)",
        )
        .unwrap();
        assert_eq!(
            session.value("dyn-levels"),
            Some(Value::ListNum(vec![
                Numb::Int(1),
                Numb::Int(2),
                Numb::Int(3),
                Numb::Int(4)
            ]))
        );
    }

    #[test]
    fn test_output_snapshot() {
        let session = resolve("score.fms", "title = X, import (file: 'a.mid')").unwrap();
        let output = session.output();
        assert_eq!(output.imports.len(), 1);
        assert!(output.settings.get("title").is_some());
        assert!(output.settings.get("inst").is_none());
    }
}
