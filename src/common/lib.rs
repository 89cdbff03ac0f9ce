//! Fundamental utilities shared by the shale front-end: arenas and small
//! buffers, the source manager, the name interner, and the diagnostic
//! engine. Everything in here is owned by a compilation instance; there is
//! no process-wide mutable state.

pub mod arenas;
pub mod diag;
pub mod name;
pub mod source;
pub mod util;

pub use self::diag::{DiagCode, DiagEmitter, Diagnostic, DiagnosticEngine, Severity};
pub use self::name::{Name, NameTable, RcStr};
pub use self::source::{Location, SourceManager, Span, Spanned};
