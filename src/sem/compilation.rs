//! The central data structure of the symbol layer. A compilation owns the
//! source manager, name table, diagnostic engine, and type interner, borrows
//! the arenas that hold all nodes and symbols, and elaborates the syntax
//! trees added to it into a symbol hierarchy on first query. All state is
//! instance-local; independent compilations can run on independent threads.

use crate::decl::{DeclaredType, DtStep};
use crate::scope::{LookupFlags, LookupLocation};
use crate::symbol::{Symbol, SymbolKind};
use crate::ty::{IntAtomKind, IntVecKind, Range, RealKind, Type, TypeInterner};
use crate::{eval, inst, members, primitive};
use rustc_hash::FxHashMap;
use shale_common::diag::{DiagCode, DiagEmitter, Diagnostic, DiagnosticEngine};
use shale_common::make_arenas;
use shale_common::name::{Name, NameTable};
use shale_common::source::{Location, SourceError, SourceManager, Span};
use shale_syntax::ast::{SyntaxKind, SyntaxNode};
use shale_syntax::preproc::PreprocOptions;
use shale_syntax::token::{Kw, KeywordVersion, TokenKind, TokenValue};
use shale_syntax::SyntaxTree;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

make_arenas! {
    /// Owns everything allocated during parsing and elaboration. Create one
    /// per compilation and let the compilation borrow it; dropping both
    /// frees all nodes, symbols, and types at once.
    pub struct GlobalArenas<'a> {
        symbols: Symbol<'a>,
        types: Type<'a>,
        nodes: SyntaxNode<'a>,
        trees: SyntaxTree<'a>,
    }
}

/// Per-compilation configuration.
#[derive(Default)]
pub struct CompilationOptions {
    pub include_user_dirs: Vec<PathBuf>,
    pub include_system_dirs: Vec<PathBuf>,
    pub keyword_version: Option<KeywordVersion>,
    pub predefines: Vec<(String, String)>,
    pub strict_defines: bool,
}

/// A compilation: the owner of all front-end state and the entry point of
/// the programmatic surface.
pub struct Compilation<'a> {
    pub arenas: &'a GlobalArenas<'a>,
    pub sm: SourceManager,
    pub names: NameTable,
    pub diag: DiagnosticEngine,
    pub options: CompilationOptions,
    types: TypeInterner<'a>,
    trees: RefCell<Vec<&'a SyntaxTree<'a>>>,
    root: Cell<Option<&'a Symbol<'a>>>,
    definitions: RefCell<FxHashMap<Name, &'a Symbol<'a>>>,
    definition_order: RefCell<Vec<&'a Symbol<'a>>>,
    packages: RefCell<FxHashMap<Name, &'a Symbol<'a>>>,
    primitives: RefCell<FxHashMap<Name, &'a Symbol<'a>>>,
    pub(crate) instance_cache: RefCell<FxHashMap<(usize, Vec<(Name, String)>), &'a Symbol<'a>>>,
    pub(crate) instance_depth: Cell<u32>,
    pub(crate) eval_stack: RefCell<Vec<usize>>,
    unit_timescale: RefCell<Option<(i32, Span)>>,
}

impl<'a> Compilation<'a> {
    pub fn new(arenas: &'a GlobalArenas<'a>) -> Compilation<'a> {
        Compilation::with_options(arenas, CompilationOptions::default())
    }

    pub fn with_options(
        arenas: &'a GlobalArenas<'a>,
        options: CompilationOptions,
    ) -> Compilation<'a> {
        Compilation {
            arenas,
            sm: SourceManager::new(),
            names: NameTable::new(),
            diag: DiagnosticEngine::new(),
            options,
            types: TypeInterner::new(&arenas.types),
            trees: RefCell::new(Vec::new()),
            root: Cell::new(None),
            definitions: RefCell::new(FxHashMap::default()),
            definition_order: RefCell::new(Vec::new()),
            packages: RefCell::new(FxHashMap::default()),
            primitives: RefCell::new(FxHashMap::default()),
            instance_cache: RefCell::new(FxHashMap::default()),
            instance_depth: Cell::new(0),
            eval_stack: RefCell::new(Vec::new()),
            unit_timescale: RefCell::new(None),
        }
    }

    /// Allocate a symbol in the compilation's arena.
    pub(crate) fn alloc(&self, sym: Symbol<'a>) -> &'a Symbol<'a> {
        self.arenas.symbols.alloc(sym)
    }

    pub fn types(&self) -> &TypeInterner<'a> {
        &self.types
    }

    fn preproc_options(&self) -> PreprocOptions {
        PreprocOptions {
            user_dirs: self.options.include_user_dirs.clone(),
            system_dirs: self.options.include_system_dirs.clone(),
            version: self.options.keyword_version,
            strict: self.options.strict_defines,
        }
    }

    /// Parse an in-memory buffer and add the tree to the compilation.
    pub fn parse_str(&self, name: &str, text: &str) -> &'a SyntaxTree<'a> {
        let source = self.sm.add(name, text);
        let tree = SyntaxTree::parse(
            source,
            &self.sm,
            &self.names,
            &self.diag,
            &self.arenas.nodes,
            self.preproc_options(),
            &self.options.predefines,
        );
        let tree = &*self.arenas.trees.alloc(tree);
        self.trees.borrow_mut().push(tree);
        tree
    }

    /// Parse a file and add the tree to the compilation.
    pub fn parse_file(&self, path: &Path) -> Result<&'a SyntaxTree<'a>, SourceError> {
        let source = self.sm.open(path)?;
        let tree = SyntaxTree::parse(
            source,
            &self.sm,
            &self.names,
            &self.diag,
            &self.arenas.nodes,
            self.preproc_options(),
            &self.options.predefines,
        );
        let tree = &*self.arenas.trees.alloc(tree);
        self.trees.borrow_mut().push(tree);
        Ok(tree)
    }

    /// Add an externally parsed tree.
    pub fn add_tree(&self, tree: &'a SyntaxTree<'a>) {
        self.trees.borrow_mut().push(tree);
    }

    /// The syntax trees added so far.
    pub fn trees(&self) -> Vec<&'a SyntaxTree<'a>> {
        self.trees.borrow().clone()
    }

    /// All diagnostics accumulated so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diag.diagnostics()
    }

    /// All module/interface/program definitions, in declaration order.
    pub fn definitions(&self) -> Vec<&'a Symbol<'a>> {
        self.definition_order.borrow().clone()
    }

    /// Look up a package by name.
    pub fn package(&self, name: Name) -> Option<&'a Symbol<'a>> {
        self.packages.borrow().get(&name).copied()
    }

    /// All packages.
    pub fn packages(&self) -> Vec<&'a Symbol<'a>> {
        let mut v: Vec<_> = self.packages.borrow().values().copied().collect();
        v.sort_by_key(|s| s.decl_index.get());
        v
    }

    /// Look up a definition by name.
    pub fn definition(&self, name: Name) -> Option<&'a Symbol<'a>> {
        self.definitions.borrow().get(&name).copied()
    }

    pub(crate) fn register_definition(&self, name: Name, sym: &'a Symbol<'a>) {
        self.definition_order.borrow_mut().push(sym);
        if let Some(prev) = self.definitions.borrow_mut().insert(name, sym) {
            self.diag.emit(
                Diagnostic::error(
                    DiagCode::Redefinition,
                    format!("redefinition of `{}`", self.names.get(name)),
                )
                .span(Span::from(sym.loc))
                .add_note_span(Span::from(prev.loc), "previous definition was here"),
            );
        }
    }

    /// Look up a primitive by name.
    pub fn primitive(&self, name: Name) -> Option<&'a Symbol<'a>> {
        self.primitives.borrow().get(&name).copied()
    }

    pub(crate) fn register_primitive(&self, name: Name, sym: &'a Symbol<'a>) {
        if let Some(prev) = self.primitives.borrow_mut().insert(name, sym) {
            self.diag.emit(
                Diagnostic::error(
                    DiagCode::Redefinition,
                    format!("redefinition of primitive `{}`", self.names.get(name)),
                )
                .span(Span::from(sym.loc))
                .add_note_span(Span::from(prev.loc), "previous definition was here"),
            );
        }
    }

    pub(crate) fn register_package(&self, name: Name, sym: &'a Symbol<'a>) {
        if let Some(prev) = self.packages.borrow_mut().insert(name, sym) {
            self.diag.emit(
                Diagnostic::error(
                    DiagCode::Redefinition,
                    format!("redefinition of package `{}`", self.names.get(name)),
                )
                .span(Span::from(sym.loc))
                .add_note_span(Span::from(prev.loc), "previous definition was here"),
            );
        }
    }

    /// Record a `timeunit` declaration; the first one establishes the
    /// compilation's time scale and later ones must agree.
    pub(crate) fn register_timeunit(&self, power: i32, span: Span) {
        let mut slot = self.unit_timescale.borrow_mut();
        match &*slot {
            Some((existing, first_span)) => {
                if *existing != power {
                    self.diag.emit(
                        Diagnostic::error(
                            DiagCode::MismatchedTimeScales,
                            "timeunit does not match the previously declared time scale",
                        )
                        .span(span)
                        .add_note_span(*first_span, "time scale was established here"),
                    );
                }
            }
            None => *slot = Some((power, span)),
        }
    }

    // ------------------------------------------------------------------
    // Elaboration
    // ------------------------------------------------------------------

    /// The root of the elaborated symbol hierarchy. The first call runs
    /// elaboration; later calls return the memoized tree.
    pub fn root(&self) -> &'a Symbol<'a> {
        if let Some(root) = self.root.get() {
            return root;
        }
        debug!("elaborating {} syntax trees", self.trees.borrow().len());
        let root = self.alloc(Symbol::new(
            SymbolKind::Root(crate::scope::Scope::new()),
            None,
            Location::new(shale_common::source::INVALID_SOURCE, 0),
        ));
        self.root.set(Some(root));

        // Pass 1: create compilation units, register definitions and
        // packages, and populate unit-scope members.
        let trees = self.trees.borrow().clone();
        for tree in &trees {
            let unit = self.alloc(Symbol::new(
                SymbolKind::CompilationUnit(crate::scope::Scope::new()),
                None,
                Location::new(tree.source, 0),
            ));
            root.add_member(unit);
            members::populate_unit(self, unit, *tree);
        }

        // Mark definitions that are instantiated somewhere, scanning the
        // definition bodies syntactically so that tops are known before any
        // body elaborates.
        let defs = self.definition_order.borrow().clone();
        for def in &defs {
            let data = match &def.kind {
                SymbolKind::Definition(d) => d,
                _ => continue,
            };
            let mut insts = Vec::new();
            data.syntax
                .descendants_of(SyntaxKind::Instantiation, &mut insts);
            for inst_node in insts {
                if let Some(name) = inst_node.tokens().find_map(|t| t.ident_name()) {
                    if let Some(target) = self.definition(name) {
                        if let SymbolKind::Definition(d) = &target.kind {
                            d.instantiated.set(true);
                        }
                    }
                }
            }
        }

        // Pass 2: find the top definitions (those never instantiated) and
        // elaborate an instance for each.
        for def in &defs {
            let data = match &def.kind {
                SymbolKind::Definition(d) => d,
                _ => continue,
            };
            if data.instantiated.get() {
                continue;
            }
            let body = inst::get_or_create_body(self, *def, None);
            let instance = self.alloc(Symbol::new(
                SymbolKind::Instance(crate::symbol::InstanceData { body }),
                def.name,
                def.loc,
            ));
            instance.syntax.set(def.syntax.get());
            root.add_member(instance);
        }
        root
    }

    /// Look up a symbol by a dotted hierarchical name, e.g. `top.sub.sig`.
    pub fn find(&self, dotted: &str) -> Option<&'a Symbol<'a>> {
        let root = self.root();
        let mut segments = dotted.split('.');
        let first = self.names.find(segments.next()?)?;

        let mut current = root
            .as_scope()
            .and_then(|s| s.get(first))
            .or_else(|| self.package(first))
            .or_else(|| self.definition(first))
            .or_else(|| {
                // Unit-scope members are addressable without a prefix.
                root.as_scope()?
                    .members()
                    .iter()
                    .filter_map(|unit| unit.as_scope()?.get(first))
                    .next()
            })?;

        for segment in segments {
            let name = self.names.find(segment)?;
            let scope_sym = match &current.kind {
                SymbolKind::Instance(i) => i.body,
                _ => current,
            };
            current = scope_sym.as_scope()?.get(name)?;
            current = self.follow_import(current, true)?;
        }
        Some(current)
    }

    // ------------------------------------------------------------------
    // Name lookup
    // ------------------------------------------------------------------

    /// Unqualified lookup starting in a scope, with a lookup location that
    /// bounds visibility to what has been declared so far.
    pub fn lookup_unqualified(
        &self,
        scope_sym: &'a Symbol<'a>,
        name: Name,
        loc: LookupLocation,
        flags: LookupFlags,
    ) -> Option<&'a Symbol<'a>> {
        let mut walk = Some(scope_sym);
        let mut at = loc;
        while let Some(sym) = walk {
            if let Some(scope) = sym.as_scope() {
                if let Some(found) = scope.get_at(name, at, flags) {
                    return self.follow_import(found, false);
                }
                // Wildcard imports declared before this point expose the
                // package's members.
                for imp in scope.imports() {
                    let data = match &imp.kind {
                        SymbolKind::Import(d) => d,
                        _ => continue,
                    };
                    if data.item.is_some() {
                        continue;
                    }
                    if !flags.contains(LookupFlags::ALLOW_DECLARED_AFTER)
                        && LookupLocation(imp.decl_index.get()) >= at
                    {
                        continue;
                    }
                    if let Some(pkg) = self.package(data.package) {
                        if let Some(found) = pkg.as_scope().and_then(|s| s.get(name)) {
                            data.resolved.set(Some(pkg));
                            return self.follow_import(found, true);
                        }
                    }
                }
            }
            if flags.contains(LookupFlags::NO_PARENT_SCOPE) {
                break;
            }
            // Moving outward, the visibility bound becomes the position of
            // the nested scope within its parent.
            at = LookupLocation::after(sym);
            walk = sym.parent();
        }
        None
    }

    /// Follow explicit-import symbols to their target. When the import is
    /// reached from outside its scope, it must be re-exported to be
    /// visible.
    fn follow_import(
        &self,
        sym: &'a Symbol<'a>,
        from_outside: bool,
    ) -> Option<&'a Symbol<'a>> {
        let data = match &sym.kind {
            SymbolKind::Import(d) => d,
            _ => return Some(sym),
        };
        if from_outside && !data.is_exported.get() {
            return None;
        }
        if let Some(resolved) = data.resolved.get() {
            return Some(resolved);
        }
        let item = data.item?;
        let pkg = match self.package(data.package) {
            Some(pkg) => pkg,
            None => {
                self.diag.emit(
                    Diagnostic::error(
                        DiagCode::UnresolvedName,
                        format!("unknown package `{}`", self.names.get(data.package)),
                    )
                    .span(Span::from(sym.loc)),
                );
                return None;
            }
        };
        let target = pkg.as_scope()?.get(item);
        match target {
            Some(target) => {
                let target = self.follow_import(target, true)?;
                data.resolved.set(Some(target));
                Some(target)
            }
            None => {
                self.diag.emit(
                    Diagnostic::error(
                        DiagCode::UnresolvedName,
                        format!(
                            "`{}` is not declared in package `{}`",
                            self.names.get(item),
                            self.names.get(data.package)
                        ),
                    )
                    .span(Span::from(sym.loc)),
                );
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Type resolution
    // ------------------------------------------------------------------

    /// Resolve a declared type, memoizing the result in place. Cycles are
    /// reported as `RecursiveDefinition` and resolve to the error type.
    pub fn resolve_declared_type(
        &self,
        dt: &DeclaredType<'a>,
        scope: &'a Symbol<'a>,
    ) -> &'a Type<'a> {
        match dt.begin() {
            DtStep::Done(ty) => ty,
            DtStep::Cycle => {
                let span = dt
                    .syntax()
                    .map(|s| s.span)
                    .unwrap_or(shale_common::source::INVALID_SPAN);
                self.diag.emit(
                    Diagnostic::error(
                        DiagCode::RecursiveDefinition,
                        "type resolution depends on itself",
                    )
                    .span(span),
                );
                dt.fail(self.types.error())
            }
            DtStep::Compute => {
                let ty = if let Some(link) = dt.link() {
                    self.resolve_declared_type(link, scope)
                } else if let Some(node) = dt.syntax() {
                    self.type_from_syntax(node, scope)
                } else {
                    // No syntax at all: nets default to a logic scalar,
                    // variables likewise.
                    self.types.logic()
                };
                dt.complete(ty)
            }
        }
    }

    /// Compute the type denoted by a type syntax node, in a scope.
    pub fn type_from_syntax(
        &self,
        node: &'a SyntaxNode<'a>,
        scope: &'a Symbol<'a>,
    ) -> &'a Type<'a> {
        match node.kind {
            SyntaxKind::DataType => {
                let kw = node.tokens().find_map(|t| match t.kind {
                    TokenKind::Keyword(kw) => Some(kw),
                    _ => None,
                });
                let signed_explicit = node.has_keyword(Kw::Signed);
                let ranges = self.eval_dimensions(node, scope);
                match kw {
                    Some(Kw::Logic) => self.int_vec(IntVecKind::Logic, signed_explicit, ranges),
                    Some(Kw::Bit) => self.int_vec(IntVecKind::Bit, signed_explicit, ranges),
                    Some(Kw::Reg) => self.int_vec(IntVecKind::Reg, signed_explicit, ranges),
                    Some(Kw::Byte) => self.int_atom(IntAtomKind::Byte, node),
                    Some(Kw::Shortint) => self.int_atom(IntAtomKind::Shortint, node),
                    Some(Kw::Int) => self.int_atom(IntAtomKind::Int, node),
                    Some(Kw::Longint) => self.int_atom(IntAtomKind::Longint, node),
                    Some(Kw::Integer) => self.int_atom(IntAtomKind::Integer, node),
                    Some(Kw::Time) => self.types.intern(Type::IntAtom {
                        kind: IntAtomKind::Time,
                        signed: false,
                    }),
                    Some(Kw::Real) => self.types.intern(Type::Real(RealKind::Real)),
                    Some(Kw::Shortreal) => self.types.intern(Type::Real(RealKind::Shortreal)),
                    Some(Kw::Realtime) => self.types.intern(Type::Real(RealKind::Realtime)),
                    Some(Kw::String) => self.types.intern(Type::String),
                    Some(Kw::Chandle) => self.types.intern(Type::Chandle),
                    Some(Kw::Event) => self.types.intern(Type::Event),
                    Some(Kw::Void) => self.types.intern(Type::Void),
                    _ => self.types.error(),
                }
            }
            SyntaxKind::ImplicitType => {
                let signed = node.has_keyword(Kw::Signed);
                let ranges = self.eval_dimensions(node, scope);
                self.int_vec(IntVecKind::Logic, signed, ranges)
            }
            SyntaxKind::NamedType => {
                let mut idents = node.tokens().filter_map(|t| t.ident_name());
                let first = match idents.next() {
                    Some(n) => n,
                    None => return self.types.error(),
                };
                let second = idents.next();
                let target = if let Some(second) = second {
                    // `pkg::type`
                    match self.package(first) {
                        Some(pkg) => pkg.as_scope().and_then(|s| s.get(second)),
                        None => None,
                    }
                } else {
                    self.lookup_unqualified(
                        scope,
                        first,
                        LookupLocation::ANYWHERE,
                        LookupFlags::empty(),
                    )
                };
                let dims = self.eval_dimensions(node, scope);
                let base = match target {
                    Some(sym) => self.type_of_named_symbol(sym, first),
                    None => {
                        let shown = second.unwrap_or(first);
                        self.diag.emit(
                            Diagnostic::error(
                                DiagCode::UnresolvedName,
                                format!("unknown type `{}`", self.names.get(shown)),
                            )
                            .span(node.span),
                        );
                        self.types.error()
                    }
                };
                if dims.is_empty() || base.is_error() {
                    base
                } else {
                    match base.canonical() {
                        Type::IntVec {
                            kind, signed, ranges,
                        } => {
                            let mut all = dims;
                            all.extend(ranges.iter().copied());
                            self.int_vec(*kind, *signed, all)
                        }
                        _ => base,
                    }
                }
            }
            _ => self.types.error(),
        }
    }

    /// The type a named symbol contributes when used in type position.
    fn type_of_named_symbol(&self, sym: &'a Symbol<'a>, name: Name) -> &'a Type<'a> {
        match &sym.kind {
            SymbolKind::TypeAlias(alias) => {
                let scope = sym.parent().expect("typedef has a parent scope");
                let target = self.resolve_declared_type(&alias.declared_type, scope);
                self.types.intern(Type::Alias { name, target })
            }
            SymbolKind::Nettype(nettype) => {
                let scope = sym.parent().expect("nettype has a parent scope");
                let inner = self.resolve_declared_type(&nettype.declared_type, scope);
                self.types.intern(Type::UserNet {
                    nettype: name,
                    inner,
                })
            }
            _ => {
                self.diag.emit(
                    Diagnostic::error(
                        DiagCode::UnresolvedName,
                        format!(
                            "`{}` is a {}, not a type",
                            self.names.get(name),
                            sym.kind.desc()
                        ),
                    )
                    .span(Span::from(sym.loc)),
                );
                self.types.error()
            }
        }
    }

    fn int_vec(&self, kind: IntVecKind, signed: bool, ranges: Vec<Range>) -> &'a Type<'a> {
        self.types.intern(Type::IntVec {
            kind,
            signed,
            ranges,
        })
    }

    fn int_atom(&self, kind: IntAtomKind, node: &'a SyntaxNode<'a>) -> &'a Type<'a> {
        let signed = !node.has_keyword(Kw::Unsigned);
        self.types.intern(Type::IntAtom { kind, signed })
    }

    /// Evaluate the packed dimensions attached to a type syntax node.
    fn eval_dimensions(&self, node: &'a SyntaxNode<'a>, scope: &'a Symbol<'a>) -> Vec<Range> {
        let mut out = Vec::new();
        for dim in node.nodes_of(SyntaxKind::Dimension) {
            if let Some(range) = self.eval_dimension(dim, scope) {
                out.push(range);
            }
        }
        out
    }

    pub(crate) fn eval_dimension(
        &self,
        dim: &'a SyntaxNode<'a>,
        scope: &'a Symbol<'a>,
    ) -> Option<Range> {
        let exprs: Vec<_> = dim.child_nodes().collect();
        match exprs.len() {
            2 => {
                let msb = eval::eval(self, scope, exprs[0])?.as_i64()?;
                let lsb = eval::eval(self, scope, exprs[1])?.as_i64()?;
                Some(Range { msb, lsb })
            }
            1 => {
                // A single size `[n]` means `[0:n-1]` for unpacked arrays.
                let size = eval::eval(self, scope, exprs[0])?.as_i64()?;
                Some(Range {
                    msb: 0,
                    lsb: size - 1,
                })
            }
            _ => None,
        }
    }

    /// The power-of-ten of a `timeunit` literal expression, if it is one.
    pub(crate) fn timeunit_power(&self, expr: &'a SyntaxNode<'a>) -> Option<i32> {
        let tok = expr.first_token()?;
        match &tok.value {
            Some(TokenValue::Time(v, unit)) => {
                let mag = if *v >= 100.0 {
                    2
                } else if *v >= 10.0 {
                    1
                } else {
                    0
                };
                Some(unit.magnitude() + mag)
            }
            _ => None,
        }
    }

    /// Elaborate a primitive declaration found at the top level.
    pub(crate) fn add_primitive(&self, unit: &'a Symbol<'a>, node: &'a SyntaxNode<'a>) {
        primitive::create_primitive(self, unit, node);
    }
}
