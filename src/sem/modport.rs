//! Modports: named directional views over the members of an interface.
//! Each named item in a modport declaration yields a modport symbol whose
//! members are simple named ports, explicit ports, subroutine ports, and
//! clocking ports.

use crate::compilation::Compilation;
use crate::members;
use crate::scope::{LookupFlags, LookupLocation, Scope};
use crate::symbol::*;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic};
use shale_common::source::Span;
use shale_syntax::ast::{SyntaxKind, SyntaxNode};
use shale_syntax::token::TokenKind;
use std::cell::Cell;

pub fn add_modports<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
    let items = match node.first_node_of(SyntaxKind::SeparatedList) {
        Some(list) => list,
        None => return,
    };
    for item in items.nodes_of(SyntaxKind::ModportItem) {
        let (name, loc) = members::name_of(comp, item);
        let sym = comp.alloc(Symbol::new(
            SymbolKind::Modport(ModportData {
                scope: Scope::new(),
            }),
            name,
            loc,
        ));
        sym.syntax.set(Some(item));
        members::add_named(comp, owner, sym);
        populate_modport(comp, owner, sym, item);
    }
}

fn populate_modport<'a>(
    comp: &Compilation<'a>,
    iface: &'a Symbol<'a>,
    modport: &'a Symbol<'a>,
    item: &'a SyntaxNode<'a>,
) {
    let ports = match item.first_node_of(SyntaxKind::SeparatedList) {
        Some(list) => list,
        None => return,
    };
    // The direction keyword distributes over the following simple ports
    // until the next direction appears.
    let mut direction: Option<Direction> = None;
    for port in ports.child_nodes() {
        let own_direction = port.tokens().find_map(|t| match t.kind {
            TokenKind::Keyword(kw) => Direction::from_kw(kw),
            _ => None,
        });
        if own_direction.is_some() {
            direction = own_direction;
        }
        match port.kind {
            SyntaxKind::ModportSimplePort => {
                add_simple_port(comp, iface, modport, port, direction)
            }
            SyntaxKind::ModportExplicitPort => {
                let (name, loc) = members::name_of(comp, port);
                let expr = port.child_nodes().next();
                let data = ModportPortData {
                    direction,
                    kind: ModportPortKind::Explicit { expr },
                };
                let sym = comp.alloc(Symbol::new(SymbolKind::ModportPort(data), name, loc));
                sym.syntax.set(Some(port));
                members::add_named(comp, modport, sym);
            }
            SyntaxKind::ModportSubroutinePort => add_subroutine_port(comp, iface, modport, port),
            SyntaxKind::ModportClockingPort => add_clocking_port(comp, iface, modport, port),
            _ => {}
        }
    }
}

/// A simple named port: the direction is applied to a resolved internal
/// variable or net.
fn add_simple_port<'a>(
    comp: &Compilation<'a>,
    iface: &'a Symbol<'a>,
    modport: &'a Symbol<'a>,
    port: &'a SyntaxNode<'a>,
    direction: Option<Direction>,
) {
    let (name, loc) = members::name_of(comp, port);
    if direction.is_none() {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::ExpectedToken,
                "modport port is missing a direction",
            )
            .span(Span::from(loc)),
        );
    }
    let internal = name.and_then(|n| {
        comp.lookup_unqualified(iface, n, LookupLocation::ANYWHERE, LookupFlags::empty())
    });
    match internal {
        Some(target) => match &target.kind {
            SymbolKind::Subroutine(_) => {
                comp.diag.emit(
                    Diagnostic::error(
                        DiagCode::ExpectedImportExport,
                        "subroutines in a modport require import or export",
                    )
                    .span(Span::from(loc)),
                );
            }
            _ if target.as_value().is_some() => {
                let value = target.as_value().expect("just checked");
                // Outputs and inouts must name something assignable.
                if matches!(direction, Some(Direction::Out) | Some(Direction::InOut))
                    && (value.has_flag(ValueFlags::CONST)
                        || matches!(target.kind, SymbolKind::Parameter(_)))
                {
                    comp.diag.emit(
                        Diagnostic::error(
                            DiagCode::ClockVarTargetNotAssignable,
                            format!(
                                "modport output `{}` must reference an assignable signal",
                                name.map(|n| comp.names.get(n).to_string()).unwrap_or_default()
                            ),
                        )
                        .span(Span::from(loc)),
                    );
                }
            }
            _ => {
                comp.diag.emit(
                    Diagnostic::error(
                        DiagCode::NotAValue,
                        format!(
                            "`{}` is a {}, which cannot appear in a modport",
                            name.map(|n| comp.names.get(n).to_string()).unwrap_or_default(),
                            target.kind.desc()
                        ),
                    )
                    .span(Span::from(loc)),
                );
            }
        },
        None => {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::UnresolvedName,
                    format!(
                        "use of undeclared identifier `{}`",
                        name.map(|n| comp.names.get(n).to_string()).unwrap_or_default()
                    ),
                )
                .span(Span::from(loc)),
            );
        }
    }
    let data = ModportPortData {
        direction,
        kind: ModportPortKind::Simple {
            internal: Cell::new(internal.filter(|t| t.as_value().is_some())),
        },
    };
    let sym = comp.alloc(Symbol::new(SymbolKind::ModportPort(data), name, loc));
    sym.syntax.set(Some(port));
    members::add_named(comp, modport, sym);
}

/// An imported or exported subroutine, either as a bare name or a full
/// method prototype.
fn add_subroutine_port<'a>(
    comp: &Compilation<'a>,
    iface: &'a Symbol<'a>,
    modport: &'a Symbol<'a>,
    port: &'a SyntaxNode<'a>,
) {
    let is_export = port.has_keyword(shale_syntax::token::Kw::Export);
    let (name, loc) = members::name_of(comp, port);
    let is_prototype = port.has_keyword(shale_syntax::token::Kw::Task)
        || port.has_keyword(shale_syntax::token::Kw::Function);
    let target = if is_prototype {
        None
    } else {
        let resolved = name.and_then(|n| {
            comp.lookup_unqualified(iface, n, LookupLocation::ANYWHERE, LookupFlags::empty())
        });
        match resolved {
            Some(t) if matches!(t.kind, SymbolKind::Subroutine(_)) => Some(t),
            Some(_) => {
                comp.diag.emit(
                    Diagnostic::error(
                        DiagCode::ExpectedImportExport,
                        format!(
                            "`{}` is not a task or function",
                            name.map(|n| comp.names.get(n).to_string()).unwrap_or_default()
                        ),
                    )
                    .span(Span::from(loc)),
                );
                None
            }
            None => {
                comp.diag.emit(
                    Diagnostic::error(
                        DiagCode::UnresolvedName,
                        format!(
                            "use of undeclared identifier `{}`",
                            name.map(|n| comp.names.get(n).to_string()).unwrap_or_default()
                        ),
                    )
                    .span(Span::from(loc)),
                );
                None
            }
        }
    };
    let data = ModportPortData {
        direction: None,
        kind: ModportPortKind::Subroutine {
            is_export,
            target: Cell::new(target),
        },
    };
    let sym = comp.alloc(Symbol::new(SymbolKind::ModportPort(data), name, loc));
    sym.syntax.set(Some(port));
    members::add_named(comp, modport, sym);
}

/// A clocking port: links to a clocking block of the interface.
fn add_clocking_port<'a>(
    comp: &Compilation<'a>,
    iface: &'a Symbol<'a>,
    modport: &'a Symbol<'a>,
    port: &'a SyntaxNode<'a>,
) {
    let (name, loc) = members::name_of(comp, port);
    let target = name.and_then(|n| {
        comp.lookup_unqualified(iface, n, LookupLocation::ANYWHERE, LookupFlags::empty())
    });
    let target = match target {
        Some(t) if matches!(t.kind, SymbolKind::ClockingBlock(_)) => Some(t),
        Some(t) => {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::UnresolvedName,
                    format!(
                        "`{}` is a {}, not a clocking block",
                        name.map(|n| comp.names.get(n).to_string()).unwrap_or_default(),
                        t.kind.desc()
                    ),
                )
                .span(Span::from(loc)),
            );
            None
        }
        None => {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::UnresolvedName,
                    format!(
                        "use of undeclared identifier `{}`",
                        name.map(|n| comp.names.get(n).to_string()).unwrap_or_default()
                    ),
                )
                .span(Span::from(loc)),
            );
            None
        }
    };
    let data = ModportPortData {
        direction: None,
        kind: ModportPortKind::Clocking {
            target: Cell::new(target),
        },
    };
    let sym = comp.alloc(Symbol::new(SymbolKind::ModportPort(data), name, loc));
    sym.syntax.set(Some(port));
    members::add_named(comp, modport, sym);
}
