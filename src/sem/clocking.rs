//! Clocking blocks. Each item is either a default-skew item or a member:
//! clocking variables bind a direction, optional skews, and either an
//! initializer expression or a reference to a signal in the parent scope.
//! Outputs and inouts require an assignable target and register as drivers
//! of that signal.

use crate::compilation::Compilation;
use crate::decl::DeclaredType;
use crate::members;
use crate::scope::{LookupFlags, LookupLocation, Scope};
use crate::symbol::*;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic};
use shale_common::source::Span;
use shale_syntax::ast::{SyntaxElem, SyntaxKind, SyntaxNode};
use shale_syntax::token::{Kw, TokenKind};
use std::cell::Cell;

pub fn add_clocking_block<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
) {
    let (name, loc) = members::name_of(comp, node);
    let sym = comp.alloc(Symbol::new(
        SymbolKind::ClockingBlock(ClockingData {
            scope: Scope::new(),
            event: node.first_node_of(SyntaxKind::EventControl),
            is_default: node.has_keyword(Kw::Default),
            is_global: node.has_keyword(Kw::Global),
            default_input_skew: Cell::new(None),
            default_output_skew: Cell::new(None),
        }),
        name,
        loc,
    ));
    sym.syntax.set(Some(node));
    if name.is_some() {
        members::add_named(comp, owner, sym);
    } else {
        owner.add_member(sym);
    }

    let data = match &sym.kind {
        SymbolKind::ClockingBlock(d) => d,
        _ => unreachable!(),
    };
    let mut have_default_input = false;
    let mut have_default_output = false;

    let items = match node.first_node_of(SyntaxKind::List) {
        Some(list) => list,
        None => return,
    };
    for item in items.child_nodes() {
        match item.kind {
            SyntaxKind::DefaultSkewItem => {
                // Walk direction keywords and their optional skews in
                // order.
                let mut pending: Option<Direction> = None;
                for child in item.children() {
                    match child {
                        SyntaxElem::Token(t) => match t.kind {
                            TokenKind::Keyword(Kw::Input) => {
                                note_default(
                                    comp,
                                    item,
                                    &mut have_default_input,
                                    DiagCode::MultipleDefaultInputSkew,
                                    "input",
                                );
                                pending = Some(Direction::In);
                            }
                            TokenKind::Keyword(Kw::Output) => {
                                note_default(
                                    comp,
                                    item,
                                    &mut have_default_output,
                                    DiagCode::MultipleDefaultOutputSkew,
                                    "output",
                                );
                                pending = Some(Direction::Out);
                            }
                            _ => {}
                        },
                        SyntaxElem::Node(n) if n.kind == SyntaxKind::ClockingSkew => {
                            match pending {
                                Some(Direction::In) => data.default_input_skew.set(Some(n)),
                                Some(Direction::Out) => data.default_output_skew.set(Some(n)),
                                _ => {}
                            }
                        }
                        SyntaxElem::Node(_) => {}
                    }
                }
            }
            SyntaxKind::ClockingItem => add_clocking_item(comp, sym, item),
            _ => {}
        }
    }
}

fn note_default<'a>(
    comp: &Compilation<'a>,
    item: &'a SyntaxNode<'a>,
    seen: &mut bool,
    code: DiagCode,
    which: &str,
) {
    if *seen {
        comp.diag.emit(
            Diagnostic::error(
                code,
                format!("multiple default {} skews in clocking block", which),
            )
            .span(item.span),
        );
    }
    *seen = true;
}

fn add_clocking_item<'a>(
    comp: &Compilation<'a>,
    clocking: &'a Symbol<'a>,
    item: &'a SyntaxNode<'a>,
) {
    // Directions: `input`, `output`, `inout`, or `input ... output ...`
    // which makes the variables bidirectional with separate skews.
    let has_input = item.has_keyword(Kw::Input);
    let has_output = item.has_keyword(Kw::Output);
    let has_inout = item.has_keyword(Kw::Inout);
    let direction = match (has_input, has_output, has_inout) {
        (_, _, true) => Direction::InOut,
        (true, true, _) => Direction::InOut,
        (false, true, _) => Direction::Out,
        _ => Direction::In,
    };
    let mut skews = item.nodes_of(SyntaxKind::ClockingSkew);
    let first_skew = skews.next();
    let second_skew = skews.next();
    let (input_skew, output_skew) = match direction {
        Direction::In => (first_skew, None),
        Direction::Out => (None, first_skew),
        _ => (first_skew, second_skew),
    };

    let assigns = match item.first_node_of(SyntaxKind::SeparatedList) {
        Some(list) => list,
        None => return,
    };
    for assign in assigns.nodes_of(SyntaxKind::ClockingAssign) {
        let (name, loc) = members::name_of(comp, assign);
        let init = assign.child_nodes().next();

        let (dt, target) = if let Some(init) = init {
            // An initializer expression defines the variable's type.
            let dt = DeclaredType::from_type(infer_expr_type(comp, clocking, init));
            dt.set_initializer(init);
            (dt, None)
        } else {
            // Otherwise the variable tracks a same-named signal in the
            // parent scope.
            let parent = clocking.parent().expect("clocking block has a parent");
            let target = name.and_then(|n| {
                comp.lookup_unqualified(
                    parent,
                    n,
                    LookupLocation::ANYWHERE,
                    LookupFlags::empty(),
                )
            });
            match target {
                Some(target) => match target.as_value() {
                    Some(value) => (
                        DeclaredType::linked(
                            &value.declared_type,
                            crate::decl::DeclaredTypeFlags::empty(),
                        ),
                        Some(target),
                    ),
                    None => {
                        comp.diag.emit(
                            Diagnostic::error(
                                DiagCode::ClockVarTargetNotAssignable,
                                format!(
                                    "`{}` is a {}, not a signal",
                                    name.map(|n| comp.names.get(n).to_string())
                                        .unwrap_or_default(),
                                    target.kind.desc()
                                ),
                            )
                            .span(Span::from(loc)),
                        );
                        (DeclaredType::from_type(comp.types().error()), None)
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
                    (DeclaredType::from_type(comp.types().error()), None)
                }
            }
        };

        let value = ValueData::new(dt, Lifetime::Static);
        let var = comp.alloc(Symbol::new(
            SymbolKind::ClockVar(ClockVarData {
                value,
                direction,
                input_skew,
                output_skew,
                target: Cell::new(target),
            }),
            name,
            loc,
        ));
        var.syntax.set(Some(assign));
        members::add_named(comp, clocking, var);

        // Outputs and inouts must have an assignable target and count as
        // drivers of that signal.
        if matches!(direction, Direction::Out | Direction::InOut) {
            if let Some(target) = target {
                let value = target.as_value().expect("checked above");
                if value.has_flag(ValueFlags::CONST)
                    || matches!(target.kind, SymbolKind::Parameter(_))
                {
                    comp.diag.emit(
                        Diagnostic::error(
                            DiagCode::ClockVarTargetNotAssignable,
                            format!(
                                "clocking output `{}` must reference an assignable signal",
                                name.map(|n| comp.names.get(n).to_string()).unwrap_or_default()
                            ),
                        )
                        .span(Span::from(loc)),
                    );
                } else {
                    value.add_driver(var);
                }
            }
        }
    }
}

/// A shallow type for an initializer expression: enough to give clocking
/// variables a declared type without a full expression type checker.
fn infer_expr_type<'a>(
    comp: &Compilation<'a>,
    scope: &'a Symbol<'a>,
    expr: &'a SyntaxNode<'a>,
) -> &'a crate::ty::Type<'a> {
    match crate::eval::eval(comp, scope, expr) {
        Some(crate::eval::Value::Int(_)) => comp.types().int(),
        Some(crate::eval::Value::Real(_)) => comp.types().real(),
        Some(crate::eval::Value::Str(_)) => comp.types().string(),
        _ => comp.types().logic(),
    }
}
