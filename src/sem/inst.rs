//! Definitions and their parameter-bound realizations. A module, interface,
//! or program declaration yields one definition symbol; every distinct
//! binding of its formal parameters yields one instance body, shared by all
//! instances with bit-identical bindings.

use crate::compilation::Compilation;
use crate::decl::{DeclaredType, DeclaredTypeFlags};
use crate::members::{self, MemberCtx};
use crate::symbol::*;
use crate::{eval, scope::Scope};
use rustc_hash::FxHashMap;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic};
use shale_common::name::Name;
use shale_common::source::Span;
use shale_syntax::ast::{SyntaxKind, SyntaxNode};
use shale_syntax::token::{Kw, TokenKind};
use shale_syntax::SyntaxTree;
use std::cell::{Cell, RefCell};

const MAX_INSTANCE_DEPTH: u32 = 128;

/// Create a definition symbol from a module/interface/program declaration,
/// register it with the compilation, and add it to the unit scope.
pub fn create_definition<'a>(
    comp: &Compilation<'a>,
    unit: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    kind: DefinitionKind,
    tree: &'a SyntaxTree<'a>,
) {
    let (name, loc) = members::name_of(comp, node);

    // Formal parameters come from the `#(...)` header; without one, body
    // `parameter` declarations are overridable instead.
    let mut params = Vec::new();
    if let Some(header) = node.first_node_of(SyntaxKind::ParamPortList) {
        if let Some(list) = header.first_node_of(SyntaxKind::SeparatedList) {
            for pd in list.nodes_of(SyntaxKind::ParamDecl) {
                collect_formal(comp, pd, &mut params);
            }
        }
    } else if let Some(list) = node.first_node_of(SyntaxKind::List) {
        for pd in list.nodes_of(SyntaxKind::ParamDecl) {
            if pd.has_keyword(Kw::Parameter) {
                collect_formal(comp, pd, &mut params);
            }
        }
    }

    let has_ansi_ports = node.first_node_of(SyntaxKind::PortList).is_some();
    let port_names = node
        .first_node_of(SyntaxKind::NonAnsiPortList)
        .and_then(|pl| pl.first_node_of(SyntaxKind::SeparatedList))
        .map(|list| {
            list.nodes_of(SyntaxKind::NonAnsiPort)
                .filter_map(|p| {
                    p.ident()
                        .or_else(|| p.first_node_of(SyntaxKind::IdentExpr)?.first_token())
                        .and_then(|t| t.ident_name())
                })
                .collect()
        })
        .unwrap_or_default();

    let sym = comp.alloc(Symbol::new(
        SymbolKind::Definition(DefinitionData {
            kind,
            syntax: node,
            tree,
            params,
            has_ansi_ports,
            port_names,
            instantiated: Cell::new(false),
        }),
        name,
        loc,
    ));
    sym.syntax.set(Some(node));
    members::add_named(comp, unit, sym);
    if let Some(name) = name {
        comp.register_definition(name, sym);
    }
}

fn collect_formal<'a>(
    comp: &Compilation<'a>,
    pd: &'a SyntaxNode<'a>,
    params: &mut Vec<FormalParam<'a>>,
) {
    let is_local = pd.has_keyword(Kw::Localparam);
    let is_type = pd.has_keyword(Kw::Type);
    let assigns: Vec<_> = if let Some(list) = pd.first_node_of(SyntaxKind::SeparatedList) {
        list.nodes_of(SyntaxKind::ParamAssign).collect()
    } else {
        pd.nodes_of(SyntaxKind::ParamAssign).collect()
    };
    for assign in assigns {
        let (name, loc) = members::name_of(comp, assign);
        let name = match name {
            Some(n) => n,
            None => continue,
        };
        let default = assign
            .token_of(TokenKind::Operator(shale_syntax::token::Op::Assign))
            .and_then(|_| {
                assign
                    .child_nodes()
                    .find(|n| n.kind != SyntaxKind::Dimension)
            });
        params.push(FormalParam {
            name,
            default,
            is_local,
            is_type,
            loc,
        });
    }
}

/// Split a `#(...)` parameter assignment list into ordered and named
/// override expressions.
fn split_overrides<'a>(
    overrides: Option<&'a SyntaxNode<'a>>,
) -> (Vec<&'a SyntaxNode<'a>>, FxHashMap<Name, &'a SyntaxNode<'a>>) {
    let mut ordered = Vec::new();
    let mut named = FxHashMap::default();
    let args: Vec<&'a SyntaxNode<'a>> = overrides
        .and_then(|o| o.first_node_of(SyntaxKind::SeparatedList))
        .map(|l| l.child_nodes().collect())
        .unwrap_or_default();
    for arg in args {
        match arg.kind {
            SyntaxKind::OrderedArg => {
                if let Some(expr) = arg.child_nodes().next() {
                    ordered.push(expr);
                }
            }
            SyntaxKind::NamedArg => {
                let name = arg.tokens().find_map(|t| t.ident_name());
                let expr = arg.child_nodes().next();
                if let (Some(name), Some(expr)) = (name, expr) {
                    named.insert(name, expr);
                }
            }
            _ => {}
        }
    }
    (ordered, named)
}

/// Get or create the instance body for a definition under the given
/// parameter overrides. Bodies are cached by their bound parameter values;
/// identical bindings share one body.
pub fn get_or_create_body<'a>(
    comp: &Compilation<'a>,
    def_sym: &'a Symbol<'a>,
    overrides: Option<&'a SyntaxNode<'a>>,
) -> &'a Symbol<'a> {
    let data = match &def_sym.kind {
        SymbolKind::Definition(d) => d,
        _ => unreachable!("instance of a non-definition"),
    };

    let body = comp.alloc(Symbol::new(
        SymbolKind::InstanceBody(InstanceBodyData {
            scope: Scope::new(),
            definition: def_sym,
            params: RefCell::new(Vec::new()),
        }),
        def_sym.name,
        def_sym.loc,
    ));
    body.syntax.set(Some(data.syntax));
    body.parent.set(def_sym.parent());
    body.decl_index.set(u32::MAX);

    // Bind the formal parameters: overrides first by name, then by
    // position, then the declared defaults.
    let (ordered, named) = split_overrides(overrides);
    if ordered.len() > data.params.iter().filter(|p| !p.is_local).count() {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::WrongParamCount,
                format!(
                    "too many parameter assignments for `{}`",
                    def_sym
                        .name
                        .map(|n| comp.names.get(n).to_string())
                        .unwrap_or_default()
                ),
            )
            .span(overrides.map(|o| o.span).unwrap_or(Span::from(def_sym.loc))),
        );
    }
    for (name, _) in named.iter() {
        if !data.params.iter().any(|p| p.name == *name) {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::UnknownParam,
                    format!("unknown parameter `{}`", comp.names.get(*name)),
                )
                .span(overrides.map(|o| o.span).unwrap_or(Span::from(def_sym.loc))),
            );
        }
    }
    let mut next_ordered = 0usize;
    for formal in &data.params {
        let override_expr = if formal.is_local {
            None
        } else if let Some(expr) = named.get(&formal.name) {
            Some(*expr)
        } else if next_ordered < ordered.len() {
            let expr = ordered[next_ordered];
            next_ordered += 1;
            Some(expr)
        } else {
            None
        };
        let chosen = override_expr.or(formal.default);
        if chosen.is_none() && !formal.is_type {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::WrongParamCount,
                    format!(
                        "no value provided for parameter `{}`",
                        comp.names.get(formal.name)
                    ),
                )
                .span(Span::from(formal.loc)),
            );
        }
        let dt = DeclaredType::from_syntax(None, DeclaredTypeFlags::empty());
        if let Some(expr) = chosen {
            dt.set_initializer(expr);
        }
        let value = ValueData::new(dt, Lifetime::Static);
        value.add_flag(ValueFlags::CONST);
        if formal.is_local {
            value.add_flag(ValueFlags::LOCAL_PARAM);
        }
        let param = comp.alloc(Symbol::new(
            SymbolKind::Parameter(value),
            Some(formal.name),
            formal.loc,
        ));
        body.add_member(param);
    }

    // Evaluate the binding and check the cache for a body to share.
    let mut key = Vec::new();
    for member in body.as_scope().expect("body is a scope").members() {
        if let SymbolKind::Parameter(_) = member.kind {
            let value = eval::eval_symbol(comp, member)
                .map(|v| v.to_key())
                .unwrap_or_else(|| "?".to_string());
            key.push((member.name.expect("parameters are named"), value));
        }
    }
    let cache_key = (def_sym as *const Symbol as usize, key.clone());
    if let Some(shared) = comp.instance_cache.borrow().get(&cache_key).copied() {
        return shared;
    }
    if let SymbolKind::InstanceBody(b) = &body.kind {
        *b.params.borrow_mut() = key;
    }
    comp.instance_cache
        .borrow_mut()
        .insert(cache_key, body);

    // Populate the rest of the body, guarding against runaway recursive
    // instantiation.
    if comp.instance_depth.get() >= MAX_INSTANCE_DEPTH {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::RecursiveDefinition,
                "instance hierarchy is too deep; recursive instantiation?",
            )
            .span(Span::from(def_sym.loc)),
        );
        return body;
    }
    comp.instance_depth.set(comp.instance_depth.get() + 1);
    populate_body(comp, body, data);
    comp.instance_depth.set(comp.instance_depth.get() - 1);
    body
}

fn populate_body<'a>(comp: &Compilation<'a>, body: &'a Symbol<'a>, data: &DefinitionData<'a>) {
    let ctx = MemberCtx {
        tree: data.tree,
        procedural: false,
        in_package: false,
        in_interface: data.kind == DefinitionKind::Interface,
        ansi_header: data.has_ansi_ports,
        default_lifetime: Lifetime::Static,
    };

    // ANSI header ports become value symbols up front.
    if let Some(port_list) = data.syntax.first_node_of(SyntaxKind::PortList) {
        if let Some(list) = port_list.first_node_of(SyntaxKind::SeparatedList) {
            let mut direction = Direction::In;
            for port in list.nodes_of(SyntaxKind::AnsiPort) {
                add_ansi_port(comp, body, port, &mut direction, ctx);
            }
        }
    }

    if let Some(list) = data.syntax.first_node_of(SyntaxKind::List) {
        for member in list.child_nodes() {
            // Header parameters were already bound; skip the redundant
            // body copies only when they fed the formal list.
            if member.kind == SyntaxKind::ParamDecl
                && data.syntax.first_node_of(SyntaxKind::ParamPortList).is_none()
                && member.has_keyword(Kw::Parameter)
            {
                continue;
            }
            members::add_member_syntax(comp, body, member, ctx);
        }
    }
}

fn add_ansi_port<'a>(
    comp: &Compilation<'a>,
    body: &'a Symbol<'a>,
    port: &'a SyntaxNode<'a>,
    direction: &mut Direction,
    ctx: MemberCtx<'a>,
) {
    if let Some(dir) = port.tokens().find_map(|t| match t.kind {
        TokenKind::Keyword(kw) => Direction::from_kw(kw),
        _ => None,
    }) {
        *direction = dir;
    }
    let has_var = port.has_keyword(Kw::Var);
    let net_kw = port.tokens().find_map(|t| match t.kind {
        TokenKind::Keyword(
            kw @ (Kw::Wire | Kw::Uwire | Kw::Tri | Kw::Tri0 | Kw::Tri1 | Kw::Wand | Kw::Wor
            | Kw::Triand | Kw::Trior | Kw::Trireg | Kw::Supply0 | Kw::Supply1),
        ) => Some(kw),
        _ => None,
    });
    let ty = port.child_nodes().find(|n| {
        matches!(
            n.kind,
            SyntaxKind::DataType | SyntaxKind::NamedType | SyntaxKind::ImplicitType
        )
    });
    let decl = match port.first_node_of(SyntaxKind::Declarator) {
        Some(d) => d,
        None => return,
    };
    let (name, loc) = members::name_of(comp, decl);
    let dt = DeclaredType::from_syntax(
        ty,
        if has_var || ty.map(|t| t.kind == SyntaxKind::DataType).unwrap_or(false) {
            DeclaredTypeFlags::empty()
        } else {
            DeclaredTypeFlags::NET_TYPE
        },
    );
    if let Some(init) = decl
        .token_of(TokenKind::Operator(shale_syntax::token::Op::Assign))
        .and_then(|_| decl.child_nodes().find(|n| n.kind != SyntaxKind::Dimension))
    {
        dt.set_initializer(init);
    }
    let value = ValueData::new(dt, Lifetime::Static);
    value.add_flag(ValueFlags::PORT);
    value.direction.set(Some(*direction));
    if ctx.in_interface {
        value.add_flag(ValueFlags::INTERFACE_VARIABLE);
    }
    let is_var = has_var || ty.map(|t| t.kind == SyntaxKind::DataType).unwrap_or(false);
    let sym = if is_var && net_kw.is_none() {
        comp.alloc(Symbol::new(SymbolKind::Variable(value), name, loc))
    } else {
        comp.alloc(Symbol::new(
            SymbolKind::Net(NetData {
                value,
                kind: NetKind::Builtin(net_kw.unwrap_or(Kw::Wire)),
                decl_syntax: Cell::new(Some(port)),
                delay: crate::decl::Lazy::new(),
                strength: crate::decl::Lazy::new(),
            }),
            name,
            loc,
        ))
    };
    sym.syntax.set(Some(port));
    members::add_named(comp, body, sym);
}

/// Create instance symbols for an instantiation member.
pub fn create_instances<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    _ctx: MemberCtx<'a>,
) {
    let def_name = match node.tokens().find_map(|t| t.ident_name()) {
        Some(n) => n,
        None => return,
    };
    let def_sym = match comp.definition(def_name) {
        Some(d) => d,
        None => {
            // A primitive instantiation binds directly to the primitive
            // symbol; there is no parameterized body to elaborate.
            if let Some(prim) = comp.primitive(def_name) {
                let instances: Vec<_> = node
                    .first_node_of(SyntaxKind::SeparatedList)
                    .map(|l| l.nodes_of(SyntaxKind::HierInstance).collect())
                    .unwrap_or_default();
                for hier in instances {
                    let (name, loc) = members::name_of(comp, hier);
                    let sym = comp.alloc(Symbol::new(
                        SymbolKind::Instance(InstanceData { body: prim }),
                        name,
                        loc,
                    ));
                    sym.syntax.set(Some(hier));
                    members::add_named(comp, owner, sym);
                }
                return;
            }
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::UnknownDefinition,
                    format!("unknown module `{}`", comp.names.get(def_name)),
                )
                .span(node.span),
            );
            return;
        }
    };
    if let SymbolKind::Definition(d) = &def_sym.kind {
        d.instantiated.set(true);
    }
    let overrides = node.first_node_of(SyntaxKind::ParamAssignments);
    let instances: Vec<_> = node
        .first_node_of(SyntaxKind::SeparatedList)
        .map(|l| l.nodes_of(SyntaxKind::HierInstance).collect())
        .unwrap_or_default();
    for hier in instances {
        let (name, loc) = members::name_of(comp, hier);
        let body = get_or_create_body(comp, def_sym, overrides);
        let sym = comp.alloc(Symbol::new(
            SymbolKind::Instance(InstanceData { body }),
            name,
            loc,
        ));
        sym.syntax.set(Some(hier));
        members::add_named(comp, owner, sym);
    }
}
