//! # scoreprep
//!
//! A settings-resolution engine for music notation preparation. Documents
//! in a small settings language assign values to typed, location-scoped
//! settings: numbers with exact rational arithmetic, strings, lists and
//! maps, note and duration spellings, key signatures, instrument and
//! staff structures, and import/export targets. The note and duration
//! vocabularies are themselves settings, so a document can redefine the
//! spellings it is parsed with mid-stream.
//!
//! ## Example
//!
//! ```
//! let session = scoreprep::resolve(
//!     "score.fms",
//!     "title = 'Quartet No. 1', beat = 1/8, keysig = (f#, c#)",
//! )
//! .unwrap();
//! assert!(session.diagnostics.is_empty());
//! ```

pub mod error;
pub mod location;
pub mod modules;
pub mod numb;
pub mod parse;
pub mod scan;
pub mod structs;
pub mod symbols;
pub mod value;
pub mod vars;

pub use error::{Diagnostic, DiagnosticLabels, FilePos, PrepError};
pub use location::Location;
pub use numb::Numb;
pub use parse::{resolve, Output, Report, Session};
pub use symbols::GrammarContext;
pub use value::Value;
pub use vars::{Registry, SettingsStore, UseLevel, VarKind};
