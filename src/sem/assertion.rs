//! Sequence, property, and let declarations, and the rules of their port
//! lists: untyped defaults, type inheritance from the previous port, local
//! modifiers with directions, and the constraints on default values.

use crate::compilation::Compilation;
use crate::decl::{DeclaredType, DeclaredTypeFlags};
use crate::members;
use crate::scope::Scope;
use crate::symbol::*;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic};
use shale_common::source::Span;
use shale_syntax::ast::{SyntaxKind, SyntaxNode};
use shale_syntax::token::{Kw, Op, TokenKind};

pub fn add_assertion<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    is_sequence: bool,
) {
    let (name, loc) = members::name_of(comp, node);
    let body = node.first_node_of(SyntaxKind::SequenceExpr);
    let data = AssertionData {
        scope: Scope::new(),
        body,
    };
    let kind = if is_sequence {
        SymbolKind::Sequence(data)
    } else {
        SymbolKind::Property(data)
    };
    let sym = comp.alloc(Symbol::new(kind, name, loc));
    sym.syntax.set(Some(node));
    members::add_named(comp, owner, sym);
    add_ports(comp, sym, node, is_sequence);
}

pub fn add_let<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
    let (name, loc) = members::name_of(comp, node);
    let body = node
        .child_nodes()
        .find(|n| n.kind != SyntaxKind::AssertionPortList);
    let sym = comp.alloc(Symbol::new(
        SymbolKind::LetDecl(AssertionData {
            scope: Scope::new(),
            body,
        }),
        name,
        loc,
    ));
    sym.syntax.set(Some(node));
    members::add_named(comp, owner, sym);
    add_ports(comp, sym, node, false);
}

/// Populate the assertion ports of a sequence/property/let declaration.
fn add_ports<'a>(
    comp: &Compilation<'a>,
    decl: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    is_sequence: bool,
) {
    let ports = match node
        .first_node_of(SyntaxKind::AssertionPortList)
        .and_then(|pl| pl.first_node_of(SyntaxKind::SeparatedList))
    {
        Some(list) => list,
        None => return,
    };

    // A port without its own type inherits the previous declared type.
    let mut prev_type: Option<&'a SyntaxNode<'a>> = None;
    for port in ports.nodes_of(SyntaxKind::AssertionPort) {
        let (name, loc) = members::name_of(comp, port);
        let is_local = port.has_keyword(Kw::Local);
        let direction = if is_local {
            port.tokens()
                .find_map(|t| match t.kind {
                    TokenKind::Keyword(kw) => Direction::from_kw(kw),
                    _ => None,
                })
                .unwrap_or(Direction::In)
        } else {
            Direction::In
        };

        // Local out/inout is only meaningful for sequences.
        if is_local
            && !is_sequence
            && matches!(direction, Direction::Out | Direction::InOut)
        {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::LocalVarDirection,
                    "a local property argument may only be an input",
                )
                .span(Span::from(loc)),
            );
        }

        let explicit_untyped = port.has_keyword(Kw::Untyped);
        let type_kw = port.has_keyword(Kw::Sequence) || port.has_keyword(Kw::Property);
        let ty = port.child_nodes().find(|n| {
            matches!(
                n.kind,
                SyntaxKind::DataType | SyntaxKind::NamedType | SyntaxKind::ImplicitType
            )
        });

        let mut flags = DeclaredTypeFlags::empty();
        if is_local {
            flags |= DeclaredTypeFlags::REQUIRE_SEQUENCE_TYPE;
        }
        let dt = if explicit_untyped || type_kw {
            prev_type = None;
            DeclaredType::from_syntax(None, flags)
        } else if let Some(ty) = ty {
            prev_type = Some(ty);
            DeclaredType::from_syntax(Some(ty), flags)
        } else {
            // Only the name was given: inherit, or default to untyped.
            DeclaredType::from_syntax(prev_type, flags)
        };

        // Default value expressions are rejected on out/inout locals.
        let default = port
            .token_of(TokenKind::Operator(Op::Assign))
            .and_then(|_| port.child_nodes().last())
            .filter(|n| {
                !matches!(
                    n.kind,
                    SyntaxKind::DataType | SyntaxKind::NamedType | SyntaxKind::ImplicitType
                        | SyntaxKind::Dimension
                )
            });
        if let Some(default) = default {
            if is_local && matches!(direction, Direction::Out | Direction::InOut) {
                comp.diag.emit(
                    Diagnostic::error(
                        DiagCode::LocalVarDefaultValue,
                        "a local output argument cannot have a default value",
                    )
                    .span(default.span),
                );
            } else {
                dt.set_initializer(default);
            }
        }

        let value = ValueData::new(dt, Lifetime::Automatic);
        value.direction.set(Some(direction));
        let kind = if is_local {
            SymbolKind::LocalAssertionVar(value)
        } else {
            SymbolKind::FormalArg(value)
        };
        let port_sym = comp.alloc(Symbol::new(kind, name, loc));
        port_sym.syntax.set(Some(port));
        members::add_named(comp, decl, port_sym);
    }
}
