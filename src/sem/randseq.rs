//! Rand-sequence productions. Each production has a return type, formal
//! arguments, and an ordered rule list; rules are sequences of production
//! items with optional integral weights. A binding pass resolves item
//! references and unifies case-item values with the case selector.

use crate::compilation::Compilation;
use crate::decl::{DeclaredType, DeclaredTypeFlags};
use crate::eval::{self, Value};
use crate::members;
use crate::scope::{LookupFlags, LookupLocation, Scope};
use crate::symbol::*;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic};
use shale_syntax::ast::{SyntaxKind, SyntaxNode};
use shale_syntax::token::TokenKind;

/// Create production symbols for a `randsequence` statement in the given
/// scope, then run the binding pass over every rule.
pub fn add_productions<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
) {
    let list = match node.first_node_of(SyntaxKind::List) {
        Some(l) => l,
        None => return,
    };
    let mut created = Vec::new();
    for prod in list.nodes_of(SyntaxKind::RsProduction) {
        let (name, loc) = members::name_of(comp, prod);
        let ty = prod.child_nodes().find(|n| {
            matches!(
                n.kind,
                SyntaxKind::DataType | SyntaxKind::NamedType | SyntaxKind::ImplicitType
            )
        });
        let sym = comp.alloc(Symbol::new(
            SymbolKind::RandSeqProduction(RandSeqProductionData {
                scope: Scope::new(),
                return_type: DeclaredType::from_syntax(ty, DeclaredTypeFlags::empty()),
                rules: std::cell::RefCell::new(Vec::new()),
            }),
            name,
            loc,
        ));
        sym.syntax.set(Some(prod));
        members::add_named(comp, owner, sym);
        created.push((sym, prod));

        // Formal arguments use the subroutine port shape.
        if let Some(ports) = prod.first_node_of(SyntaxKind::TfPortList) {
            if let Some(args) = ports.first_node_of(SyntaxKind::SeparatedList) {
                let mut direction = Direction::In;
                for port in args.nodes_of(SyntaxKind::TfPort) {
                    if let Some(dir) = port.tokens().find_map(|t| match t.kind {
                        TokenKind::Keyword(kw) => Direction::from_kw(kw),
                        _ => None,
                    }) {
                        direction = dir;
                    }
                    let (pname, ploc) = members::name_of(comp, port);
                    let pt = port.child_nodes().find(|n| {
                        matches!(
                            n.kind,
                            SyntaxKind::DataType
                                | SyntaxKind::NamedType
                                | SyntaxKind::ImplicitType
                        )
                    });
                    let dt = DeclaredType::from_syntax(pt, DeclaredTypeFlags::empty());
                    let value = ValueData::new(dt, Lifetime::Automatic);
                    value.direction.set(Some(direction));
                    let arg =
                        comp.alloc(Symbol::new(SymbolKind::FormalArg(value), pname, ploc));
                    arg.syntax.set(Some(port));
                    members::add_named(comp, sym, arg);
                }
            }
        }
    }

    // Binding pass: rules, weights, conditions, and case unification. Runs
    // after all productions exist so references resolve forward.
    for (sym, prod) in created {
        let data = match &sym.kind {
            SymbolKind::RandSeqProduction(d) => d,
            _ => unreachable!(),
        };
        let rules = match prod.first_node_of(SyntaxKind::SeparatedList) {
            Some(r) => r,
            None => continue,
        };
        for rule in rules.nodes_of(SyntaxKind::RsRule) {
            let items: Vec<_> = rule
                .first_node_of(SyntaxKind::List)
                .map(|l| l.child_nodes().collect())
                .unwrap_or_default();
            for item in &items {
                bind_prod_item(comp, owner, sym, item);
            }
            let weight = rule
                .first_node_of(SyntaxKind::RsWeightClause)
                .and_then(|w| w.child_nodes().next());
            if let Some(weight_expr) = weight {
                if let Some(v) = eval::eval(comp, sym, weight_expr) {
                    if !v.is_integral() {
                        comp.diag.emit(
                            Diagnostic::error(
                                DiagCode::NotConstant,
                                "a production weight must be an integral expression",
                            )
                            .span(weight_expr.span),
                        );
                    }
                }
            }
            data.rules.borrow_mut().push(RsRuleSem { items, weight });
        }
    }
}

/// Resolve one production item: references, condition checks, and case
/// binding.
fn bind_prod_item<'a>(
    comp: &Compilation<'a>,
    scope: &'a Symbol<'a>,
    prod: &'a Symbol<'a>,
    item: &'a SyntaxNode<'a>,
) {
    match item.kind {
        SyntaxKind::RsProdItem => {
            let name = match item.ident().and_then(|t| t.ident_name()) {
                Some(n) => n,
                None => return,
            };
            let target = comp.lookup_unqualified(
                scope,
                name,
                LookupLocation::ANYWHERE,
                LookupFlags::ALLOW_DECLARED_AFTER,
            );
            match target {
                Some(t) if matches!(t.kind, SymbolKind::RandSeqProduction(_)) => {}
                Some(t) => {
                    comp.diag.emit(
                        Diagnostic::error(
                            DiagCode::UnresolvedName,
                            format!(
                                "`{}` is a {}, not a production",
                                comp.names.get(name),
                                t.kind.desc()
                            ),
                        )
                        .span(item.span),
                    );
                }
                None => {
                    comp.diag.emit(
                        Diagnostic::error(
                            DiagCode::UnresolvedName,
                            format!("unknown production `{}`", comp.names.get(name)),
                        )
                        .span(item.span),
                    );
                }
            }
        }
        SyntaxKind::RsIfElse | SyntaxKind::RsRepeat => {
            // Condition must be boolean/integral when constant.
            if let Some(cond) = item.child_nodes().next() {
                if let Some(v) = eval::eval(comp, prod, cond) {
                    if v.as_bool().is_none() {
                        comp.diag.emit(
                            Diagnostic::error(
                                DiagCode::NotConstant,
                                "condition must be a boolean or integral expression",
                            )
                            .span(cond.span),
                        );
                    }
                }
            }
            for sub in item
                .child_nodes()
                .filter(|n| is_prod_item(n.kind))
            {
                bind_prod_item(comp, scope, prod, sub);
            }
        }
        SyntaxKind::RsCase => bind_case(comp, scope, prod, item),
        SyntaxKind::RsCodeBlock => {}
        _ => {}
    }
}

fn is_prod_item(kind: SyntaxKind) -> bool {
    matches!(
        kind,
        SyntaxKind::RsProdItem
            | SyntaxKind::RsCodeBlock
            | SyntaxKind::RsIfElse
            | SyntaxKind::RsRepeat
            | SyntaxKind::RsCase
    )
}

/// Case binding: unify the case-item values with the selector.
fn bind_case<'a>(
    comp: &Compilation<'a>,
    scope: &'a Symbol<'a>,
    prod: &'a Symbol<'a>,
    item: &'a SyntaxNode<'a>,
) {
    let selector = item.child_nodes().next();
    let selector_value = selector.and_then(|s| eval::eval(comp, prod, s));
    let list = match item.first_node_of(SyntaxKind::List) {
        Some(l) => l,
        None => return,
    };
    for case_item in list.nodes_of(SyntaxKind::RsCaseItem) {
        if let Some(labels) = case_item.first_node_of(SyntaxKind::SeparatedList) {
            for label in labels.child_nodes() {
                if let (Some(sel), Some(lab)) = (
                    selector_value.as_ref(),
                    eval::eval(comp, prod, label),
                ) {
                    let compatible = matches!(
                        (sel, &lab),
                        (Value::Int(_), Value::Int(_))
                            | (Value::Real(_), Value::Real(_))
                            | (Value::Real(_), Value::Int(_))
                            | (Value::Int(_), Value::Real(_))
                            | (Value::Str(_), Value::Str(_))
                    );
                    if !compatible {
                        comp.diag.emit(
                            Diagnostic::error(
                                DiagCode::CaseTypeMismatch,
                                "case item type does not match the case expression",
                            )
                            .span(label.span),
                        );
                    }
                }
            }
        }
        for sub in case_item.child_nodes().filter(|n| is_prod_item(n.kind)) {
            bind_prod_item(comp, scope, prod, sub);
        }
    }
}
