//! shale is a SystemVerilog front-end: it parses IEEE 1800 source text into
//! lossless concrete syntax trees and elaborates them into a typed symbol
//! hierarchy with diagnostics suitable for interactive tooling.
//!
//! The crate is a thin facade over the three core crates:
//!
//! - [`common`]: arenas, source management, name interning, diagnostics
//! - [`syntax`]: lexer, preprocessor, parser, syntax trees, printing
//! - [`sem`]: scopes, symbols, types, elaboration
//!
//! # Example
//!
//! ```
//! use shale::{Compilation, GlobalArenas};
//!
//! let arenas = GlobalArenas::default();
//! let comp = Compilation::new(&arenas);
//! comp.parse_str("top.sv", "module top; wire w; assign w = 1; endmodule");
//! let root = comp.root();
//! assert!(comp.find("top.w").is_some());
//! assert!(!comp.diag.has_errors());
//! # let _ = root;
//! ```

pub use shale_common as common;
pub use shale_sem as sem;
pub use shale_syntax as syntax;

pub use common::diag::{DiagCode, Diagnostic, DiagnosticEngine, Severity};
pub use common::name::{Name, NameTable};
pub use common::source::{Location, SourceManager, Span};
pub use sem::compilation::{Compilation, CompilationOptions, GlobalArenas};
pub use sem::symbol::{Symbol, SymbolKind};
pub use sem::ty::Type;
pub use syntax::ast::{SyntaxKind, SyntaxNode, Visitor};
pub use syntax::printer;
pub use syntax::rewrite::Rewriter;
pub use syntax::{PreprocOptions, Preprocessor, SyntaxTree};

/// Parse an in-memory string into a syntax tree using caller-provided
/// infrastructure. Most uses go through [`Compilation::parse_str`] instead;
/// this entry exists for tools that only need trees.
pub fn build_tree<'a>(
    name: &str,
    text: &str,
    sm: &SourceManager,
    names: &NameTable,
    diag: &DiagnosticEngine,
    arena: &'a syntax::SyntaxArena<'a>,
    options: PreprocOptions,
) -> SyntaxTree<'a> {
    let source = sm.add(name, text);
    SyntaxTree::parse(source, sm, names, diag, arena, options, &[])
}
