//! Symbol construction from member syntax: variables, nets, continuous
//! assignments, parameters, imports, genvars, subroutines, procedural
//! blocks, and elaboration system tasks. The shape-specific members live in
//! their own modules (clocking, modport, primitive, assertion, randseq);
//! this module hosts the dispatcher and the declaration-level rules.

use crate::compilation::Compilation;
use crate::decl::{DeclaredType, DeclaredTypeFlags};
use crate::scope::{LookupFlags, LookupLocation};
use crate::symbol::*;
use crate::{assertion, clocking, eval, inst, modport, randseq};
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic};
use shale_common::name::Name;
use shale_common::source::{Location, Span};
use shale_syntax::ast::{SyntaxKind, SyntaxNode};
use shale_syntax::preproc::DefaultNetType;
use shale_syntax::token::{Kw, Op, TokenKind};
use shale_syntax::SyntaxTree;

/// Context threaded through member construction.
#[derive(Clone, Copy)]
pub struct MemberCtx<'a> {
    pub tree: &'a SyntaxTree<'a>,
    pub procedural: bool,
    pub in_package: bool,
    pub in_interface: bool,
    pub ansi_header: bool,
    pub default_lifetime: Lifetime,
}

impl<'a> MemberCtx<'a> {
    pub fn unit(tree: &'a SyntaxTree<'a>) -> MemberCtx<'a> {
        MemberCtx {
            tree,
            procedural: false,
            in_package: false,
            in_interface: false,
            ansi_header: false,
            default_lifetime: Lifetime::Static,
        }
    }
}

/// Populate a compilation unit from the items of a parsed tree.
pub fn populate_unit<'a>(comp: &Compilation<'a>, unit: &'a Symbol<'a>, tree: &'a SyntaxTree<'a>) {
    let ctx = MemberCtx::unit(tree);
    for item in tree.root.child_nodes() {
        match item.kind {
            SyntaxKind::ModuleDecl => {
                inst::create_definition(comp, unit, item, DefinitionKind::Module, tree)
            }
            SyntaxKind::InterfaceDecl => {
                inst::create_definition(comp, unit, item, DefinitionKind::Interface, tree)
            }
            SyntaxKind::ProgramDecl => {
                let anonymous = item.ident().map(|t| t.missing).unwrap_or(true);
                if anonymous {
                    add_anonymous_program(comp, unit, item, ctx);
                } else {
                    inst::create_definition(comp, unit, item, DefinitionKind::Program, tree)
                }
            }
            SyntaxKind::PackageDecl => create_package(comp, unit, item, tree),
            SyntaxKind::PrimitiveDecl => comp.add_primitive(unit, item),
            SyntaxKind::ErrorNode => {}
            _ => add_member_syntax(comp, unit, item, ctx),
        }
    }
}

fn create_package<'a>(
    comp: &Compilation<'a>,
    unit: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    tree: &'a SyntaxTree<'a>,
) {
    let (name, loc) = name_of(comp, node);
    let sym = comp.alloc(Symbol::new(
        SymbolKind::Package(crate::scope::Scope::new()),
        name,
        loc,
    ));
    sym.syntax.set(Some(node));
    add_named(comp, unit, sym);
    if let Some(name) = name {
        comp.register_package(name, sym);
    }
    let ctx = MemberCtx {
        in_package: true,
        ..MemberCtx::unit(tree)
    };
    if let Some(list) = node.first_node_of(SyntaxKind::List) {
        for member in list.child_nodes() {
            add_member_syntax(comp, sym, member, ctx);
        }
    }
}

fn add_anonymous_program<'a>(
    comp: &Compilation<'a>,
    unit: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    let sym = comp.alloc(Symbol::new(
        SymbolKind::AnonymousProgram(crate::scope::Scope::new()),
        None,
        node.span.begin(),
    ));
    sym.syntax.set(Some(node));
    unit.add_member(sym);
    if let Some(list) = node.first_node_of(SyntaxKind::List) {
        for member in list.child_nodes() {
            add_member_syntax(comp, sym, member, ctx);
        }
    }
}

/// Create the symbols for one member syntax node in a scope.
pub fn add_member_syntax<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    match node.kind {
        SyntaxKind::DataDecl => add_data_decl(comp, owner, node, ctx),
        SyntaxKind::NetDecl => add_net_decl(comp, owner, node, ctx),
        SyntaxKind::ContinuousAssign => add_continuous_assign(comp, owner, node, ctx),
        SyntaxKind::GenvarDecl => add_genvar_decl(comp, owner, node),
        SyntaxKind::EmptyMember => {
            let sym = comp.alloc(Symbol::new(SymbolKind::EmptyMember, None, node.span.begin()));
            sym.syntax.set(Some(node));
            owner.add_member(sym);
        }
        SyntaxKind::ImportDecl => add_import_decl(comp, owner, node),
        SyntaxKind::ExportDecl => add_export_decl(comp, owner, node),
        SyntaxKind::NettypeDecl => add_nettype_decl(comp, owner, node),
        SyntaxKind::TypedefDecl => add_typedef_decl(comp, owner, node),
        SyntaxKind::ParamDecl => add_param_decl(comp, owner, node),
        SyntaxKind::PortDecl => add_port_decl(comp, owner, node, ctx),
        SyntaxKind::ElabSystemTask => add_elab_task(comp, owner, node),
        SyntaxKind::ModportDecl => modport::add_modports(comp, owner, node),
        SyntaxKind::ClockingBlock => clocking::add_clocking_block(comp, owner, node),
        SyntaxKind::SequenceDecl => assertion::add_assertion(comp, owner, node, true),
        SyntaxKind::PropertyDecl => assertion::add_assertion(comp, owner, node, false),
        SyntaxKind::LetDecl => assertion::add_let(comp, owner, node),
        SyntaxKind::FunctionDecl | SyntaxKind::TaskDecl => {
            add_subroutine(comp, owner, node, ctx)
        }
        SyntaxKind::ProceduralBlock => add_procedure(comp, owner, node, ctx),
        SyntaxKind::TimeunitsDecl => add_timeunits(comp, node),
        SyntaxKind::Instantiation => inst::create_instances(comp, owner, node, ctx),
        SyntaxKind::ErrorNode => {}
        _ => {
            debug!("ignoring member syntax {:?}", node.kind);
        }
    }
}

/// The name token of a declaration-like node, as interned name and
/// location.
pub(crate) fn name_of<'a>(
    _comp: &Compilation<'a>,
    node: &'a SyntaxNode<'a>,
) -> (Option<Name>, Location) {
    match node.ident() {
        Some(tok) if !tok.missing => (tok.ident_name(), tok.span.begin()),
        Some(tok) => (None, tok.span.begin()),
        None => (None, node.span.begin()),
    }
}

/// Push a named member, reporting a redefinition if the name is taken.
pub(crate) fn add_named<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, sym: &'a Symbol<'a>) {
    if let Some(prev) = owner.add_member(sym) {
        let name = sym.name.map(|n| comp.names.get(n).to_string()).unwrap_or_default();
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::Redefinition,
                format!("redefinition of `{}`", name),
            )
            .span(Span::from(sym.loc))
            .add_note_span(Span::from(prev.loc), "previous declaration was here"),
        );
    }
}

/// The explicit type node of a declaration, if present.
fn type_node<'a>(node: &'a SyntaxNode<'a>) -> Option<&'a SyntaxNode<'a>> {
    node.child_nodes().find(|n| {
        matches!(
            n.kind,
            SyntaxKind::DataType | SyntaxKind::NamedType | SyntaxKind::ImplicitType
        )
    })
}

/// All declarators of a declaration.
fn declarators<'a>(node: &'a SyntaxNode<'a>) -> Vec<&'a SyntaxNode<'a>> {
    node.first_node_of(SyntaxKind::SeparatedList)
        .map(|list| list.nodes_of(SyntaxKind::Declarator).collect())
        .unwrap_or_default()
}

/// The initializer expression of a declarator.
fn declarator_init<'a>(decl: &'a SyntaxNode<'a>) -> Option<&'a SyntaxNode<'a>> {
    decl.token_of(TokenKind::Operator(Op::Assign))?;
    decl.child_nodes().find(|n| n.kind != SyntaxKind::Dimension)
}

/// Variable creation from a data declaration, with the lifetime rules.
fn add_data_decl<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    let is_const = node.has_keyword(Kw::Const);
    let explicit_static = node.has_keyword(Kw::Static);
    let explicit_automatic = node.has_keyword(Kw::Automatic);
    let ty = type_node(node);

    // A declaration whose named type resolves to a nettype declares nets,
    // not variables.
    if let Some(ty_node) = ty {
        if ty_node.kind == SyntaxKind::NamedType {
            if let Some(nettype_sym) = resolve_nettype(comp, owner, ty_node) {
                add_user_nets(comp, owner, node, ty_node, nettype_sym, ctx);
                return;
            }
        }
    }

    // Lifetime rules: `automatic` is only allowed in procedural contexts.
    let lifetime = if explicit_automatic {
        if !ctx.procedural {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::AutomaticNotAllowed,
                    "automatic variables are only allowed in procedural contexts",
                )
                .span(node.span),
            );
            Lifetime::Static
        } else {
            Lifetime::Automatic
        }
    } else if explicit_static {
        Lifetime::Static
    } else {
        ctx.default_lifetime
    };

    for decl in declarators(node) {
        let (name, loc) = name_of(comp, decl);
        let init = declarator_init(decl);

        // Inside a procedural context, a static variable with an
        // initializer requires the explicit keyword.
        if ctx.procedural
            && lifetime == Lifetime::Static
            && init.is_some()
            && !explicit_static
            && !explicit_automatic
        {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::StaticInitializerMustBeExplicit,
                    "initializing a static variable requires an explicit `static` keyword",
                )
                .span(Span::from(loc)),
            );
        }
        if is_const && init.is_none() {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::ConstVarRequiresInitializer,
                    "a const variable requires an initializer",
                )
                .span(Span::from(loc)),
            );
        }

        let mut flags = DeclaredTypeFlags::empty();
        if ctx.in_interface {
            flags |= DeclaredTypeFlags::INTERFACE_VARIABLE;
        }
        if lifetime == Lifetime::Automatic && init.is_some() {
            flags |= DeclaredTypeFlags::AUTOMATIC_INITIALIZER;
        }
        let dt = DeclaredType::from_syntax(ty, flags);
        if let Some(init) = init {
            dt.set_initializer(init);
        }
        let value = ValueData::new(dt, lifetime);
        if is_const {
            value.add_flag(ValueFlags::CONST);
        }
        if ctx.in_interface {
            value.add_flag(ValueFlags::INTERFACE_VARIABLE);
        }
        let sym = comp.alloc(Symbol::new(SymbolKind::Variable(value), name, loc));
        sym.syntax.set(Some(decl));
        add_named(comp, owner, sym);
    }
}

/// Resolve the name of a named type if it denotes a user-defined nettype.
fn resolve_nettype<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    ty_node: &'a SyntaxNode<'a>,
) -> Option<&'a Symbol<'a>> {
    let mut idents = ty_node.tokens().filter_map(|t| t.ident_name());
    let first = idents.next()?;
    let target = match idents.next() {
        Some(second) => comp.package(first)?.as_scope()?.get(second),
        None => comp.lookup_unqualified(
            owner,
            first,
            LookupLocation::ANYWHERE,
            LookupFlags::empty(),
        ),
    }?;
    match target.kind {
        SymbolKind::Nettype(_) => Some(target),
        _ => None,
    }
}

/// Net creation for declarations whose type is a user-defined nettype.
fn add_user_nets<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ty_node: &'a SyntaxNode<'a>,
    nettype_sym: &'a Symbol<'a>,
    ctx: MemberCtx<'a>,
) {
    if node.first_node_of(SyntaxKind::DelayControl).is_some() {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::NetDelayOnUserNettype,
                "a delay cannot be given on a net with a user-defined net type",
            )
            .span(node.span),
        );
    }
    for decl in declarators(node) {
        let (name, loc) = name_of(comp, decl);
        let init = declarator_init(decl);
        if ctx.in_package && init.is_some() {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::PackageNetInit,
                    "nets declared in a package cannot have an initializer",
                )
                .span(Span::from(loc)),
            );
        }
        let dt = DeclaredType::from_syntax(Some(ty_node), DeclaredTypeFlags::NET_TYPE);
        if let Some(init) = init {
            dt.set_initializer(init);
        }
        let net = NetData {
            value: ValueData::new(dt, Lifetime::Static),
            kind: NetKind::UserDefined(nettype_sym),
            decl_syntax: std::cell::Cell::new(Some(node)),
            delay: crate::decl::Lazy::new(),
            strength: crate::decl::Lazy::new(),
        };
        let sym = comp.alloc(Symbol::new(SymbolKind::Net(net), name, loc));
        sym.syntax.set(Some(decl));
        add_named(comp, owner, sym);
    }
}

/// Net creation from a built-in net declaration.
fn add_net_decl<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    let net_kw = node
        .tokens()
        .find_map(|t| match t.kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        })
        .unwrap_or(Kw::Wire);
    let ty = type_node(node);
    for decl in declarators(node) {
        let (name, loc) = name_of(comp, decl);
        let init = declarator_init(decl);
        if ctx.in_package && init.is_some() {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::PackageNetInit,
                    "nets declared in a package cannot have an initializer",
                )
                .span(Span::from(loc)),
            );
        }
        let dt = DeclaredType::from_syntax(ty, DeclaredTypeFlags::NET_TYPE);
        if let Some(init) = init {
            dt.set_initializer(init);
        }
        let value = ValueData::new(dt, Lifetime::Static);
        if ctx.in_interface {
            value.add_flag(ValueFlags::INTERFACE_VARIABLE);
        }
        let net = NetData {
            value,
            kind: NetKind::Builtin(net_kw),
            decl_syntax: std::cell::Cell::new(Some(node)),
            delay: crate::decl::Lazy::new(),
            strength: crate::decl::Lazy::new(),
        };
        let sym = comp.alloc(Symbol::new(SymbolKind::Net(net), name, loc));
        sym.syntax.set(Some(decl));
        add_named(comp, owner, sym);
    }
}

/// Continuous assignments: one symbol per assignment, plus implicit net
/// creation on the left-hand side when the default nettype allows it.
fn add_continuous_assign<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    let assignments: Vec<_> = node
        .first_node_of(SyntaxKind::SeparatedList)
        .map(|l| l.nodes_of(SyntaxKind::BinaryExpr).collect())
        .unwrap_or_default();
    for assignment in assignments {
        let sym = comp.alloc(Symbol::new(
            SymbolKind::ContinuousAssign { assignment },
            None,
            assignment.span.begin(),
        ));
        sym.syntax.set(Some(assignment));
        owner.add_member(sym);

        let lhs = match assignment.child_nodes().next() {
            Some(lhs) => lhs,
            None => continue,
        };
        for target in lhs_identifiers(lhs) {
            let name = match target.first_token().and_then(|t| t.ident_name()) {
                Some(n) => n,
                None => continue,
            };
            match comp.lookup_unqualified(
                owner,
                name,
                LookupLocation::ANYWHERE,
                LookupFlags::empty(),
            ) {
                Some(existing) => {
                    if let Some(value) = existing.as_value() {
                        value.add_driver(sym);
                    }
                }
                None => {
                    if let Some(net) = make_implicit_net(comp, owner, target, name, ctx) {
                        if let Some(value) = net.as_value() {
                            value.add_driver(sym);
                        }
                    }
                }
            }
        }
    }
}

/// The bare identifier expressions on an assignment left-hand side.
fn lhs_identifiers<'a>(lhs: &'a SyntaxNode<'a>) -> Vec<&'a SyntaxNode<'a>> {
    match lhs.kind {
        SyntaxKind::IdentExpr => vec![lhs],
        SyntaxKind::ConcatExpr => {
            let mut out = Vec::new();
            for e in eval::child_exprs(lhs) {
                if e.kind == SyntaxKind::IdentExpr {
                    out.push(e);
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

/// Create a logic-typed implicit net for an unresolved assignment target.
fn make_implicit_net<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    target: &'a SyntaxNode<'a>,
    name: Name,
    ctx: MemberCtx<'a>,
) -> Option<&'a Symbol<'a>> {
    let nettype = ctx.tree.default_nettype_at(target.span.begin());
    let net_kw = match nettype {
        DefaultNetType::Wire => Kw::Wire,
        DefaultNetType::Uwire => Kw::Uwire,
        DefaultNetType::Tri => Kw::Tri,
        DefaultNetType::Tri0 => Kw::Tri0,
        DefaultNetType::Tri1 => Kw::Tri1,
        DefaultNetType::Wand => Kw::Wand,
        DefaultNetType::Wor => Kw::Wor,
        DefaultNetType::Triand => Kw::Triand,
        DefaultNetType::Trior => Kw::Trior,
        DefaultNetType::None => {
            comp.diag.emit(
                Diagnostic::error(
                    DiagCode::ImplicitNetNotAllowed,
                    format!(
                        "use of undeclared identifier `{}`; implicit nets are disabled",
                        comp.names.get(name)
                    ),
                )
                .span(target.span),
            );
            return None;
        }
    };
    let value = ValueData::new(
        DeclaredType::from_type(comp.types().logic()),
        Lifetime::Static,
    );
    value.add_flag(ValueFlags::IMPLICIT_NET | ValueFlags::COMPILER_GENERATED);
    let net = NetData {
        value,
        kind: NetKind::Builtin(net_kw),
        decl_syntax: std::cell::Cell::new(None),
        delay: crate::decl::Lazy::new(),
        strength: crate::decl::Lazy::new(),
    };
    let sym = comp.alloc(Symbol::new(
        SymbolKind::Net(net),
        Some(name),
        target.span.begin(),
    ));
    sym.syntax.set(Some(target));
    add_named(comp, owner, sym);
    Some(sym)
}

fn add_genvar_decl<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
    for decl in declarators(node) {
        let (name, loc) = name_of(comp, decl);
        let value = ValueData::new(
            DeclaredType::from_type(comp.types().int()),
            Lifetime::Static,
        );
        let sym = comp.alloc(Symbol::new(SymbolKind::Genvar(value), name, loc));
        sym.syntax.set(Some(decl));
        add_named(comp, owner, sym);
    }
}

fn add_import_decl<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
    let items = node
        .first_node_of(SyntaxKind::SeparatedList)
        .map(|l| l.nodes_of(SyntaxKind::ImportItem).collect::<Vec<_>>())
        .unwrap_or_default();
    for item in items {
        let mut idents = item.tokens().filter_map(|t| t.ident_name());
        let package = match idents.next() {
            Some(p) => p,
            None => continue,
        };
        let imported = idents.next();
        let wildcard = item.token_of(TokenKind::Operator(Op::Mul)).is_some();
        let data = ImportData {
            package,
            item: if wildcard { None } else { imported },
            resolved: std::cell::Cell::new(None),
            is_exported: std::cell::Cell::new(false),
        };
        let name = data.item;
        let sym = comp.alloc(Symbol::new(
            SymbolKind::Import(data),
            name,
            item.span.begin(),
        ));
        sym.syntax.set(Some(item));
        owner.add_member(sym);
    }
}

/// Mark matching imports in the scope as re-exported.
fn add_export_decl<'a>(_comp: &Compilation<'a>, owner: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
    let scope = match owner.as_scope() {
        Some(s) => s,
        None => return,
    };
    let export_all = node
        .tokens()
        .filter(|t| t.kind == TokenKind::Operator(Op::Mul))
        .count()
        >= 2;
    let items: Vec<(Name, Option<Name>)> = if export_all {
        Vec::new()
    } else {
        node.first_node_of(SyntaxKind::SeparatedList)
            .map(|l| {
                l.nodes_of(SyntaxKind::ImportItem)
                    .filter_map(|item| {
                        let mut idents = item.tokens().filter_map(|t| t.ident_name());
                        let package = idents.next()?;
                        let wildcard = item.token_of(TokenKind::Operator(Op::Mul)).is_some();
                        Some((package, if wildcard { None } else { idents.next() }))
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    for imp in scope.imports() {
        let data = match &imp.kind {
            SymbolKind::Import(d) => d,
            _ => continue,
        };
        let matches = export_all
            || items
                .iter()
                .any(|(pkg, item)| *pkg == data.package && (item.is_none() || *item == data.item));
        if matches {
            data.is_exported.set(true);
        }
    }
}

fn add_nettype_decl<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
    let (name, loc) = name_of(comp, node);
    let dt = DeclaredType::from_syntax(type_node(node), DeclaredTypeFlags::NET_TYPE);
    let sym = comp.alloc(Symbol::new(
        SymbolKind::Nettype(NettypeData { declared_type: dt }),
        name,
        loc,
    ));
    sym.syntax.set(Some(node));
    add_named(comp, owner, sym);
}

fn add_typedef_decl<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
    let (name, loc) = name_of(comp, node);
    let dt = DeclaredType::from_syntax(type_node(node), DeclaredTypeFlags::empty());
    let sym = comp.alloc(Symbol::new(
        SymbolKind::TypeAlias(TypeAliasData { declared_type: dt }),
        name,
        loc,
    ));
    sym.syntax.set(Some(node));
    add_named(comp, owner, sym);
}

pub(crate) fn add_param_decl<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
) {
    let is_local = node.has_keyword(Kw::Localparam);
    let ty = type_node(node);
    let assigns: Vec<_> = node
        .first_node_of(SyntaxKind::SeparatedList)
        .map(|l| l.nodes_of(SyntaxKind::ParamAssign).collect())
        .unwrap_or_else(|| node.nodes_of(SyntaxKind::ParamAssign).collect());
    for assign in assigns {
        let (name, loc) = name_of(comp, assign);
        let dt = DeclaredType::from_syntax(ty, DeclaredTypeFlags::empty());
        if let Some(init) = declarator_init(assign) {
            dt.set_initializer(init);
        }
        let value = ValueData::new(dt, Lifetime::Static);
        value.add_flag(ValueFlags::CONST);
        if is_local {
            value.add_flag(ValueFlags::LOCAL_PARAM);
        }
        let sym = comp.alloc(Symbol::new(SymbolKind::Parameter(value), name, loc));
        sym.syntax.set(Some(assign));
        add_named(comp, owner, sym);
    }
}

/// A non-ANSI port declaration in a body; diagnosed when the header used
/// the ANSI style.
fn add_port_decl<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    if ctx.ansi_header {
        comp.diag.emit(
            Diagnostic::error(
                DiagCode::PortDeclInANSIModule,
                "port declarations are not allowed in a module with an ANSI port list",
            )
            .span(node.span),
        );
        return;
    }
    let direction = node
        .tokens()
        .find_map(|t| match t.kind {
            TokenKind::Keyword(kw) => Direction::from_kw(kw),
            _ => None,
        })
        .unwrap_or(Direction::In);
    let has_var = node.has_keyword(Kw::Var);
    let ty = type_node(node);
    for decl in declarators(node) {
        let (name, loc) = name_of(comp, decl);
        let existing = name.and_then(|n| {
            owner
                .as_scope()
                .and_then(|s| s.get(n))
                .filter(|s| s.as_value().is_some())
        });
        match existing {
            Some(sym) => {
                let value = sym.as_value().expect("filtered to value symbols");
                value.direction.set(Some(direction));
                value.add_flag(ValueFlags::PORT);
                if let Some(ty) = ty {
                    value.declared_type.set_syntax(ty);
                }
            }
            None => {
                let dt = DeclaredType::from_syntax(
                    ty,
                    if has_var {
                        DeclaredTypeFlags::empty()
                    } else {
                        DeclaredTypeFlags::NET_TYPE
                    },
                );
                let value = ValueData::new(dt, Lifetime::Static);
                value.add_flag(ValueFlags::PORT);
                value.direction.set(Some(direction));
                let sym = if has_var {
                    comp.alloc(Symbol::new(SymbolKind::Variable(value), name, loc))
                } else {
                    comp.alloc(Symbol::new(
                        SymbolKind::Net(NetData {
                            value,
                            kind: NetKind::Builtin(Kw::Wire),
                            decl_syntax: std::cell::Cell::new(Some(node)),
                            delay: crate::decl::Lazy::new(),
                            strength: crate::decl::Lazy::new(),
                        }),
                        name,
                        loc,
                    ))
                };
                sym.syntax.set(Some(decl));
                add_named(comp, owner, sym);
            }
        }
    }
}

/// Elaboration system tasks: `$fatal`, `$error`, `$warning`, `$info`, and
/// `$static_assert`. Messages are formatted and issued immediately, since
/// member creation happens at elaboration time.
fn add_elab_task<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
    let tok = match node.first_token() {
        Some(t) => t,
        None => return,
    };
    let task_name = match tok.kind {
        TokenKind::SysIdent(n) => comp.names.get(n).to_string(),
        _ => return,
    };
    let kind = match ElabTaskKind::from_name(&task_name) {
        Some(k) => k,
        None => {
            comp.diag.emit(
                Diagnostic::warning(
                    DiagCode::UnresolvedName,
                    format!("`${}` is not an elaboration system task", task_name),
                )
                .span(node.span),
            );
            return;
        }
    };
    let args: Vec<_> = node
        .first_node_of(SyntaxKind::ArgumentList)
        .and_then(|a| a.first_node_of(SyntaxKind::SeparatedList))
        .map(|l| l.child_nodes().collect())
        .unwrap_or_default();
    let sym = comp.alloc(Symbol::new(
        SymbolKind::ElabTask(ElabTaskData { task: kind, args }),
        None,
        node.span.begin(),
    ));
    sym.syntax.set(Some(node));
    owner.add_member(sym);
    issue_elab_task(comp, owner, sym);
}

fn issue_elab_task<'a>(comp: &Compilation<'a>, owner: &'a Symbol<'a>, sym: &'a Symbol<'a>) {
    let data = match &sym.kind {
        SymbolKind::ElabTask(d) => d,
        _ => return,
    };
    let span = Span::from(sym.loc);
    match data.task {
        ElabTaskKind::StaticAssert => {
            let cond = match data.args.first() {
                Some(c) => *c,
                None => {
                    comp.diag.emit(
                        Diagnostic::error(
                            DiagCode::StaticAssertNotConstant,
                            "$static_assert requires a condition",
                        )
                        .span(span),
                    );
                    return;
                }
            };
            match eval::eval(comp, owner, cond).and_then(|v| v.as_bool()) {
                Some(true) => {}
                Some(false) => {
                    let message = eval::format_message(comp, owner, &data.args[1..]);
                    let text = if message.is_empty() {
                        "static assertion failed".to_string()
                    } else {
                        format!("static assertion failed: {}", message)
                    };
                    comp.diag
                        .emit(Diagnostic::error(DiagCode::StaticAssertFailed, text).span(span));
                }
                None => {
                    comp.diag.emit(
                        Diagnostic::error(
                            DiagCode::StaticAssertNotConstant,
                            "$static_assert condition must be a constant expression",
                        )
                        .span(span),
                    );
                }
            }
        }
        ElabTaskKind::Fatal => {
            let mut msg_args = &data.args[..];
            if let Some(first) = data.args.first() {
                match eval::eval(comp, owner, first).and_then(|v| v.as_i64()) {
                    Some(0..=2) => {
                        msg_args = &data.args[1..];
                    }
                    Some(_) => {
                        comp.diag.emit(
                            Diagnostic::error(
                                DiagCode::InvalidFinishNum,
                                "$fatal finish number must be 0, 1, or 2",
                            )
                            .span(span),
                        );
                        msg_args = &data.args[1..];
                    }
                    None => {}
                }
            }
            let message = eval::format_message(comp, owner, msg_args);
            let text = if message.is_empty() {
                "$fatal encountered".to_string()
            } else {
                message
            };
            comp.diag
                .emit(Diagnostic::error(DiagCode::ElabTaskMessage, text).span(span));
        }
        ElabTaskKind::Error | ElabTaskKind::Warning | ElabTaskKind::Info => {
            let message = eval::format_message(comp, owner, &data.args);
            let text = if message.is_empty() {
                format!("${} encountered", match data.task {
                    ElabTaskKind::Error => "error",
                    ElabTaskKind::Warning => "warning",
                    _ => "info",
                })
            } else {
                message
            };
            let diag = match data.task {
                ElabTaskKind::Error => Diagnostic::error(DiagCode::ElabTaskMessage, text),
                ElabTaskKind::Warning => Diagnostic::warning(DiagCode::ElabTaskMessage, text),
                _ => Diagnostic::note(DiagCode::ElabTaskMessage, text),
            };
            comp.diag.emit(diag.span(span));
        }
    }
}

/// Task and function declarations; the arguments and body variables form
/// the subroutine's scope.
fn add_subroutine<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    let is_function = node.kind == SyntaxKind::FunctionDecl;
    let lifetime = if node.has_keyword(Kw::Automatic) {
        Lifetime::Automatic
    } else {
        Lifetime::Static
    };
    let (name, loc) = name_of(comp, node);
    let return_type = if is_function {
        DeclaredType::from_syntax(type_node(node), DeclaredTypeFlags::empty())
    } else {
        DeclaredType::from_type(comp.types().intern(crate::ty::Type::Void))
    };
    let sym = comp.alloc(Symbol::new(
        SymbolKind::Subroutine(SubroutineData {
            scope: crate::scope::Scope::new(),
            is_function,
            lifetime,
            return_type,
        }),
        name,
        loc,
    ));
    sym.syntax.set(Some(node));
    add_named(comp, owner, sym);

    // Formal arguments.
    if let Some(ports) = node.first_node_of(SyntaxKind::TfPortList) {
        if let Some(list) = ports.first_node_of(SyntaxKind::SeparatedList) {
            let mut direction = Direction::In;
            for port in list.nodes_of(SyntaxKind::TfPort) {
                if let Some(dir) = port.tokens().find_map(|t| match t.kind {
                    TokenKind::Keyword(kw) => Direction::from_kw(kw),
                    _ => None,
                }) {
                    direction = dir;
                }
                let (pname, ploc) = name_of(comp, port);
                let dt = DeclaredType::from_syntax(
                    type_node(port),
                    DeclaredTypeFlags::FORMAL_ARG_MERGE_VAR,
                );
                let init = port
                    .token_of(TokenKind::Operator(Op::Assign))
                    .and_then(|_| port.child_nodes().last())
                    .filter(|n| {
                        !matches!(
                            n.kind,
                            SyntaxKind::DataType
                                | SyntaxKind::NamedType
                                | SyntaxKind::ImplicitType
                                | SyntaxKind::Dimension
                        )
                    });
                if let Some(init) = init {
                    dt.set_initializer(init);
                }
                let value = ValueData::new(dt, Lifetime::Automatic);
                value.direction.set(Some(direction));
                let arg = comp.alloc(Symbol::new(SymbolKind::FormalArg(value), pname, ploc));
                arg.syntax.set(Some(port));
                add_named(comp, sym, arg);
            }
        }
    }

    // Body declarations.
    let body_ctx = MemberCtx {
        procedural: true,
        default_lifetime: lifetime,
        ..ctx
    };
    if let Some(list) = node.first_node_of(SyntaxKind::List) {
        for stmt in list.child_nodes() {
            add_statement_decls(comp, sym, stmt, body_ctx);
        }
    }
}

/// Procedural blocks: `initial`, `always*`, `final`.
fn add_procedure<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    let kind = node
        .tokens()
        .find_map(|t| match t.kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        })
        .unwrap_or(Kw::Initial);
    let sym = comp.alloc(Symbol::new(
        SymbolKind::Procedure(ProcedureData {
            scope: crate::scope::Scope::new(),
            kind,
        }),
        None,
        node.span.begin(),
    ));
    sym.syntax.set(Some(node));
    owner.add_member(sym);
    let body_ctx = MemberCtx {
        procedural: true,
        ..ctx
    };
    for stmt in node.child_nodes() {
        add_statement_decls(comp, sym, stmt, body_ctx);
    }
}

/// Walk a statement for declarations and rand-sequence productions that
/// become scope members.
fn add_statement_decls<'a>(
    comp: &Compilation<'a>,
    owner: &'a Symbol<'a>,
    node: &'a SyntaxNode<'a>,
    ctx: MemberCtx<'a>,
) {
    match node.kind {
        SyntaxKind::DataDecl => add_data_decl(comp, owner, node, ctx),
        SyntaxKind::BlockStmt => {
            if let Some(list) = node.first_node_of(SyntaxKind::List) {
                for stmt in list.child_nodes() {
                    add_statement_decls(comp, owner, stmt, ctx);
                }
            }
        }
        SyntaxKind::RandsequenceStmt => randseq::add_productions(comp, owner, node),
        SyntaxKind::TimingStmt | SyntaxKind::ForeverStmt => {
            for child in node.child_nodes() {
                add_statement_decls(comp, owner, child, ctx);
            }
        }
        _ => {}
    }
}

fn add_timeunits<'a>(comp: &Compilation<'a>, node: &'a SyntaxNode<'a>) {
    let is_timeunit = node.has_keyword(Kw::Timeunit);
    if !is_timeunit {
        return;
    }
    if let Some(expr) = node.child_nodes().next() {
        match comp.timeunit_power(expr) {
            Some(power) => comp.register_timeunit(power, node.span),
            None => {
                comp.diag.emit(
                    Diagnostic::error(
                        DiagCode::NotConstant,
                        "timeunit requires a time literal",
                    )
                    .span(node.span),
                );
            }
        }
    }
}
