//! Renders a syntax tree (or any subtree) back to source text by depth-first
//! emission of each token's trivia followed by its raw text. Printing is
//! filtered by buffer: macro-expansion and included-file tokens print
//! nothing themselves, while the call-site and directive text they replaced
//! is carried by trivia of the surrounding stream. Printing the root of a
//! parsed buffer therefore reproduces that buffer byte for byte.

use crate::ast::{SyntaxElem, SyntaxNode};
use shale_common::source::{Source, SourceManager};

/// Render a subtree, restricted to the given buffer.
pub fn print_source(node: &SyntaxNode, sm: &SourceManager, source: Source) -> String {
    let mut out = String::new();
    emit(node, sm, source, &mut out);
    out
}

/// Render a subtree. The buffer is inferred from the first token that lives
/// in a real file; subtrees consisting purely of expansion tokens print
/// their expansion text.
pub fn print(node: &SyntaxNode, sm: &SourceManager) -> String {
    let source = infer_source(node, sm)
        .or_else(|| node.first_token().map(|t| t.span.source))
        .unwrap_or(shale_common::source::INVALID_SOURCE);
    print_source(node, sm, source)
}

fn infer_source(node: &SyntaxNode, sm: &SourceManager) -> Option<Source> {
    for child in node.children() {
        match child {
            SyntaxElem::Token(tok) => {
                for t in &tok.trivia {
                    if t.span.source.is_valid() && sm.expansion_of(t.span.source).is_none() {
                        return Some(t.span.source);
                    }
                }
                if tok.span.source.is_valid() && sm.expansion_of(tok.span.source).is_none() {
                    return Some(tok.span.source);
                }
            }
            SyntaxElem::Node(n) => {
                if let Some(s) = infer_source(n, sm) {
                    return Some(s);
                }
            }
        }
    }
    None
}

fn emit(node: &SyntaxNode, sm: &SourceManager, source: Source, out: &mut String) {
    for child in node.children() {
        match child {
            SyntaxElem::Token(tok) => {
                for t in &tok.trivia {
                    if t.span.source == source {
                        out.push_str(&sm.span_text(t.span));
                    }
                }
                if !tok.missing && tok.span.source == source {
                    out.push_str(&sm.span_text(tok.span));
                }
            }
            SyntaxElem::Node(n) => emit(n, sm, source, out),
        }
    }
}
