//! User-defined primitives (UDPs). The port list may be ANSI or non-ANSI;
//! in non-ANSI form the body's port declarations must cover every listed
//! name. Exactly one output port is required, it must come first, and an
//! `output reg` makes the primitive sequential. An `initial` statement is
//! only allowed for sequential primitives, must target the output, and must
//! assign 0, 1, or a one-bit x.

use crate::compilation::Compilation;
use crate::members;
use crate::symbol::*;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic};
use shale_common::source::Span;
use shale_syntax::ast::{SyntaxKind, SyntaxNode};
use shale_syntax::token::{Kw, Lit, TokenKind};
use std::cell::Cell;

pub fn create_primitive<'a>(
    comp: &Compilation<'a>,
    unit: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
) {
    let (name, loc) = members::name_of(comp, node);

    let port_list = node.first_node_of(SyntaxKind::UdpPortList);
    if let Some(pl) = port_list {
        if pl.token_of(TokenKind::WildcardConnect).is_some() {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::UnsupportedUdpPortList,
                    "wildcard primitive port lists are not supported",
                )
                .span(pl.span),
            );
            let sym = comp.alloc(Symbol::new(
                SymbolKind::Primitive(PrimitiveData {
                    ports: Vec::new(),
                    sequential: Cell::new(false),
                    initial: Cell::new(None),
                    table: Cell::new(None),
                }),
                name,
                loc,
            ));
            sym.syntax.set(Some(node));
            members::add_named(comp, unit, sym);
            if let Some(name) = name {
                comp.register_primitive(name, sym);
            }
            return;
        }
    }

    // Collect the declared ports. Directions given in the header make this
    // an ANSI declaration.
    let mut ports = Vec::new();
    let mut ansi = false;
    if let Some(list) = port_list.and_then(|pl| pl.first_node_of(SyntaxKind::SeparatedList)) {
        for port in list.nodes_of(SyntaxKind::UdpPortDecl) {
            let direction = port.tokens().find_map(|t| match t.kind {
                TokenKind::Keyword(Kw::Output) => Some(Direction::Out),
                TokenKind::Keyword(Kw::Input) => Some(Direction::In),
                _ => None,
            });
            ansi |= direction.is_some();
            let (pname, ploc) = members::name_of(comp, port);
            let pname = match pname {
                Some(n) => n,
                None => continue,
            };
            ports.push(UdpPort {
                name: pname,
                direction: Cell::new(direction),
                is_reg: Cell::new(port.has_keyword(Kw::Reg)),
                loc: ploc,
            });
        }
    }

    let sym = comp.alloc(Symbol::new(
        SymbolKind::Primitive(PrimitiveData {
            ports,
            sequential: Cell::new(false),
            initial: Cell::new(None),
            table: Cell::new(None),
        }),
        name,
        loc,
    ));
    sym.syntax.set(Some(node));
    members::add_named(comp, unit, sym);
    if let Some(name) = name {
        comp.register_primitive(name, sym);
    }
    let data = match &sym.kind {
        SymbolKind::Primitive(d) => d,
        _ => unreachable!(),
    };

    // Walk the body: port declarations, the initial statement, the table.
    let body = node.first_node_of(SyntaxKind::List);
    let mut initial_node = None;
    if let Some(body) = body {
        for item in body.child_nodes() {
            match item.kind {
                SyntaxKind::UdpPortDecl => {
                    apply_body_port_decl(comp, data, item, ansi);
                }
                SyntaxKind::UdpInitial => {
                    initial_node = Some(item);
                }
                SyntaxKind::UdpTable => {
                    data.table.set(Some(item));
                }
                _ => {}
            }
        }
    }

    // In non-ANSI mode every listed port needs a body declaration.
    if !ansi {
        for port in &data.ports {
            if port.direction.get().is_none() {
                comp.diag.emit(
                    Diagnostic::error(
                        DiagCode::PrimitiveMissingPortDecl,
                        format!(
                            "primitive port `{}` has no declaration in the body",
                            comp.names.get(port.name)
                        ),
                    )
                    .span(Span::from(port.loc)),
                );
            }
        }
    }

    // Exactly one output, and it must be the first port.
    let outputs: Vec<_> = data
        .ports
        .iter()
        .filter(|p| p.direction.get() == Some(Direction::Out))
        .collect();
    if outputs.len() != 1 {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::PrimitiveOutputFirst,
                "a primitive requires exactly one output port",
            )
            .span(Span::from(loc)),
        );
    } else if data.ports[0].direction.get() != Some(Direction::Out) {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::PrimitiveOutputFirst,
                "the output port of a primitive must be listed first",
            )
            .span(Span::from(data.ports[0].loc)),
        );
    }

    // `output reg` selects a sequential primitive.
    let sequential = outputs.first().map(|p| p.is_reg.get()).unwrap_or(false);
    data.sequential.set(sequential);

    if let Some(init) = initial_node {
        apply_initial(comp, data, init, sequential, outputs.first().map(|p| p.name));
    }
}

/// A body-level `output`/`input`/`reg` declaration in non-ANSI form.
fn apply_body_port_decl<'a>(
    comp: &Compilation<'a>,
    data: &PrimitiveData<'a>,
    item: &'a SyntaxNode<'a>,
    ansi: bool,
) {
    if ansi {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::PrimitiveDupPortDecl,
                "port declarations are not allowed in an ANSI-style primitive body",
            )
            .span(item.span),
        );
        return;
    }
    let direction = item.tokens().find_map(|t| match t.kind {
        TokenKind::Keyword(Kw::Output) => Some(Direction::Out),
        TokenKind::Keyword(Kw::Input) => Some(Direction::In),
        _ => None,
    });
    let is_reg = item.has_keyword(Kw::Reg);
    let names: Vec<_> = item
        .first_node_of(SyntaxKind::SeparatedList)
        .map(|l| {
            l.nodes_of(SyntaxKind::Declarator)
                .filter_map(|d| d.ident().and_then(|t| t.ident_name()))
                .collect()
        })
        .unwrap_or_default();
    for pname in names {
        let port = data.ports.iter().find(|p| p.name == pname);
        match port {
            Some(port) => match direction {
                Some(dir) => {
                    if port.direction.get().is_some() {
                        comp.diag.emit(
                            Diagnostic::error(
                                DiagCode::PrimitiveDupPortDecl,
                                format!(
                                    "primitive port `{}` is declared more than once",
                                    comp.names.get(pname)
                                ),
                            )
                            .span(item.span),
                        );
                    } else {
                        port.direction.set(Some(dir));
                    }
                    if is_reg {
                        port.is_reg.set(true);
                    }
                }
                None => {
                    // A standalone `reg q;` specifier: only valid for the
                    // output port.
                    if port.direction.get() == Some(Direction::In) {
                        comp.diag.emit(
                            Diagnostic::error(
                                DiagCode::PrimitiveRegAfterDecl,
                                format!(
                                    "`reg` specifier is not allowed on input `{}`",
                                    comp.names.get(pname)
                                ),
                            )
                            .span(item.span),
                        );
                    } else {
                        port.is_reg.set(true);
                    }
                }
            },
            None => {
                comp.diag.emit(
                    Diagnostic::error(
                        DiagCode::UnresolvedName,
                        format!(
                            "`{}` is not a port of this primitive",
                            comp.names.get(pname)
                        ),
                    )
                    .span(item.span),
                );
            }
        }
    }
}

/// Validate the `initial` statement of a sequential primitive and record
/// the initial value.
fn apply_initial<'a>(
    comp: &Compilation<'a>,
    data: &PrimitiveData<'a>,
    init: &'a SyntaxNode<'a>,
    sequential: bool,
    output: Option<shale_common::name::Name>,
) {
    if !sequential {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::PrimitiveInitialInComb,
                "an initial statement is only allowed in a sequential primitive",
            )
            .span(init.span),
        );
        return;
    }
    let target = init.ident().and_then(|t| t.ident_name());
    if target != output {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::PrimitiveWrongInitial,
                "the initial statement must assign to the output port",
            )
            .span(init.span),
        );
        return;
    }
    let value = init
        .first_node_of(SyntaxKind::LiteralExpr)
        .and_then(|e| e.first_token())
        .and_then(|tok| match tok.kind {
            // Plain `0` or `1`.
            TokenKind::Literal(Lit::Number(_, None)) => match &tok.value {
                Some(shale_syntax::token::TokenValue::Int { value, .. }) => {
                    if *value == num_bigint::BigInt::from(0) {
                        Some('0')
                    } else if *value == num_bigint::BigInt::from(1) {
                        Some('1')
                    } else {
                        None
                    }
                }
                _ => None,
            },
            TokenKind::Literal(Lit::BasedInteger(size, false, 'b', digits)) => {
                let width_ok = size
                    .map(|s| &*comp.names.get(s) == "1")
                    .unwrap_or(false);
                if !width_ok {
                    return None;
                }
                match &*comp.names.get(digits) {
                    "0" => Some('0'),
                    "1" => Some('1'),
                    "x" | "X" => Some('x'),
                    _ => None,
                }
            }
            _ => None,
        });
    match value {
        Some(v) => data.initial.set(Some(v)),
        None => {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::PrimitiveWrongInitial,
                    "the initial value of a primitive must be 0, 1, or 1'bx",
                )
                .span(init.span),
            );
        }
    }
}
