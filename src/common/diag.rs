//! Structured diagnostics and the engine that accumulates them. Every
//! diagnostic carries a stable symbolic code, a severity, a primary span,
//! and ordered notes. The engine deduplicates by (code, location) and
//! supports a per-code suppression policy; rendering is left to consumers.

use crate::source::{Location, Span, INVALID_SPAN};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::fmt;

/// Stable symbolic identifiers for every diagnostic the front-end can
/// produce. Tools filter by these; the numeric discriminant is not stable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum DiagCode {
    // Lexer
    UnknownToken,
    UnterminatedBlockComment,
    UnterminatedString,
    InvalidNumberBase,
    MissingNumberDigits,
    DigitsLeadingLetters,
    ExpectedEscapedIdent,
    UnknownEscapeSequence,

    // Preprocessor
    UnknownDirective,
    MacroRedefinition,
    UndefinedMacro,
    UnterminatedMacroArgs,
    WrongMacroArgCount,
    PastedTokenInvalid,
    UnbalancedConditional,
    IncludeDepth,
    IoError,
    NotFound,
    MalformedDirective,

    // Parser
    ExpectedToken,
    ExpectedIdentifier,
    ExpectedExpression,
    ExpectedType,
    ExpectedMember,
    ExpectedStatement,
    AmbiguousSyntax,

    // Symbols / elaboration
    Redefinition,
    UnresolvedName,
    RecursiveDefinition,
    MismatchedTimeScales,
    PortDeclInANSIModule,
    AutomaticNotAllowed,
    StaticInitializerMustBeExplicit,
    ConstVarRequiresInitializer,
    NetDelayOnUserNettype,
    PackageNetInit,
    ImplicitNetNotAllowed,
    MultipleDefaultInputSkew,
    MultipleDefaultOutputSkew,
    ClockVarTargetNotAssignable,
    ExpectedImportExport,
    InvalidFinishNum,
    StaticAssertFailed,
    StaticAssertNotConstant,
    ElabTaskMessage,
    PrimitiveOutputFirst,
    PrimitiveDupPortDecl,
    PrimitiveMissingPortDecl,
    PrimitiveRegAfterDecl,
    PrimitiveWrongInitial,
    PrimitiveInitialInComb,
    UnsupportedUdpPortList,
    LocalVarDirection,
    LocalVarDefaultValue,
    WrongParamCount,
    UnknownParam,
    UnknownDefinition,
    CaseTypeMismatch,
    NotAValue,
    NotConstant,
}

/// The weight of a diagnostic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
    Bug,
}

impl Severity {
    pub fn to_str(self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Bug => "compiler bug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// An attached note with its own location and message.
#[derive(Clone, Debug)]
pub struct DiagNote {
    pub span: Span,
    pub message: String,
}

/// A structured diagnostic message.
#[must_use]
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<DiagNote>,
}

impl Diagnostic {
    pub fn new<S: Into<String>>(code: DiagCode, severity: Severity, message: S) -> Diagnostic {
        Diagnostic {
            code,
            severity,
            message: message.into(),
            span: INVALID_SPAN,
            notes: Vec::new(),
        }
    }

    pub fn bug<S: Into<String>>(code: DiagCode, message: S) -> Diagnostic {
        Diagnostic::new(code, Severity::Bug, message)
    }

    pub fn error<S: Into<String>>(code: DiagCode, message: S) -> Diagnostic {
        Diagnostic::new(code, Severity::Error, message)
    }

    pub fn warning<S: Into<String>>(code: DiagCode, message: S) -> Diagnostic {
        Diagnostic::new(code, Severity::Warning, message)
    }

    pub fn note<S: Into<String>>(code: DiagCode, message: S) -> Diagnostic {
        Diagnostic::new(code, Severity::Note, message)
    }

    /// Attach the primary span.
    pub fn span<S: Into<Span>>(mut self, span: S) -> Diagnostic {
        self.span = span.into();
        self
    }

    /// Append a note without a location of its own.
    pub fn add_note<S: Into<String>>(self, message: S) -> Diagnostic {
        self.add_note_span(INVALID_SPAN, message)
    }

    /// Append a note pointing at a location.
    pub fn add_note_span<P: Into<Span>, S: Into<String>>(
        mut self,
        span: P,
        message: S,
    ) -> Diagnostic {
        self.notes.push(DiagNote {
            span: span.into(),
            message: message.into(),
        });
        self
    }

    /// The location used for deduplication.
    pub fn location(&self) -> Location {
        self.span.begin()
    }
}

/// Emits diagnostic messages. Implemented by the engine and by anything that
/// forwards to it.
pub trait DiagEmitter {
    fn emit(&self, diag: Diagnostic);
}

impl<'a, T> DiagEmitter for &'a T
where
    T: DiagEmitter + ?Sized,
{
    fn emit(&self, diag: Diagnostic) {
        (*self).emit(diag)
    }
}

/// Accumulates diagnostics for a compilation. Deduplicates by
/// (code, primary location) and honors a per-code suppression policy.
pub struct DiagnosticEngine {
    diags: RefCell<Vec<Diagnostic>>,
    seen: RefCell<FxHashSet<(DiagCode, Location)>>,
    suppressed: RefCell<FxHashSet<DiagCode>>,
    remapped: RefCell<FxHashMap<DiagCode, Severity>>,
    errors: RefCell<usize>,
}

impl DiagnosticEngine {
    pub fn new() -> DiagnosticEngine {
        DiagnosticEngine {
            diags: RefCell::new(Vec::new()),
            seen: RefCell::new(FxHashSet::default()),
            suppressed: RefCell::new(FxHashSet::default()),
            remapped: RefCell::new(FxHashMap::default()),
            errors: RefCell::new(0),
        }
    }

    /// Suppress all future diagnostics with the given code.
    pub fn suppress(&self, code: DiagCode) {
        self.suppressed.borrow_mut().insert(code);
    }

    /// Force a severity for all future diagnostics with the given code.
    pub fn remap_severity(&self, code: DiagCode, severity: Severity) {
        self.remapped.borrow_mut().insert(code, severity);
    }

    /// Number of diagnostics of at least error severity.
    pub fn error_count(&self) -> usize {
        *self.errors.borrow()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Snapshot of all accumulated diagnostics, in emission order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diags.borrow().clone()
    }

    /// All diagnostics with the given code.
    pub fn with_code(&self, code: DiagCode) -> Vec<Diagnostic> {
        self.diags
            .borrow()
            .iter()
            .filter(|d| d.code == code)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.diags.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.borrow().is_empty()
    }
}

impl DiagEmitter for DiagnosticEngine {
    fn emit(&self, mut diag: Diagnostic) {
        if self.suppressed.borrow().contains(&diag.code) {
            return;
        }
        if let Some(&sev) = self.remapped.borrow().get(&diag.code) {
            diag.severity = sev;
        }
        if diag.span.source.is_valid()
            && !self.seen.borrow_mut().insert((diag.code, diag.location()))
        {
            return;
        }
        if diag.severity >= Severity::Error {
            *self.errors.borrow_mut() += 1;
        }
        log::debug!("diag {:?}: {}", diag.code, diag.message);
        self.diags.borrow_mut().push(diag);
    }
}

impl Default for DiagnosticEngine {
    fn default() -> DiagnosticEngine {
        DiagnosticEngine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Source, Span};

    fn probe(offset: usize) -> Diagnostic {
        Diagnostic::error(DiagCode::UnknownToken, "strange byte")
            .span(Span::new(Source(1), offset, offset + 1))
    }

    #[test]
    fn dedup_by_code_and_location() {
        let engine = DiagnosticEngine::new();
        engine.emit(probe(4));
        engine.emit(probe(4));
        engine.emit(probe(9));
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.error_count(), 2);
    }

    #[test]
    fn suppression() {
        let engine = DiagnosticEngine::new();
        engine.suppress(DiagCode::UnknownToken);
        engine.emit(probe(4));
        assert!(engine.is_empty());
        assert!(!engine.has_errors());
    }

    #[test]
    fn severity_remap() {
        let engine = DiagnosticEngine::new();
        engine.remap_severity(DiagCode::UnknownToken, Severity::Warning);
        engine.emit(probe(4));
        assert_eq!(engine.error_count(), 0);
        assert_eq!(engine.diagnostics()[0].severity, Severity::Warning);
    }

    #[test]
    fn notes_are_ordered() {
        let engine = DiagnosticEngine::new();
        engine.emit(
            Diagnostic::error(DiagCode::Redefinition, "redefinition of `x`")
                .span(Span::new(Source(1), 10, 11))
                .add_note_span(Span::new(Source(1), 2, 3), "previously defined here")
                .add_note("rename one of the declarations"),
        );
        let d = &engine.diagnostics()[0];
        assert_eq!(d.notes.len(), 2);
        assert_eq!(d.notes[0].message, "previously defined here");
    }
}
