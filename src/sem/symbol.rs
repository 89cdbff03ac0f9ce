//! The symbol tree. Symbols follow the declaration hierarchy and carry a
//! closed kind tag with kind-specific payloads; common behavior is exposed
//! through narrow accessors (`as_scope`, `as_value`) instead of a virtual
//! hierarchy. All cross-references are non-owning arena references whose
//! lifetime is the compilation's.

use crate::decl::{DeclaredType, Lazy};
use crate::scope::Scope;
use shale_common::name::Name;
use shale_common::source::Location;
use shale_syntax::ast::SyntaxNode;
use shale_syntax::token::Kw;
use std::cell::{Cell, RefCell};

/// Port and argument directions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    In,
    Out,
    InOut,
    Ref,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "input",
            Direction::Out => "output",
            Direction::InOut => "inout",
            Direction::Ref => "ref",
        }
    }

    pub fn from_kw(kw: Kw) -> Option<Direction> {
        Some(match kw {
            Kw::Input => Direction::In,
            Kw::Output => Direction::Out,
            Kw::Inout => Direction::InOut,
            Kw::Ref => Direction::Ref,
            _ => return None,
        })
    }
}

/// Storage lifetime of variables.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Lifetime {
    Static,
    Automatic,
}

bitflags::bitflags! {
    /// Miscellaneous properties of value symbols.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct ValueFlags: u32 {
        const CONST = 1 << 0;
        const COMPILER_GENERATED = 1 << 1;
        const INTERFACE_VARIABLE = 1 << 2;
        const IMMUTABLE_COVERAGE_OPTION = 1 << 3;
        const PORT = 1 << 4;
        const IMPLICIT_NET = 1 << 5;
        const LOCAL_PARAM = 1 << 6;
    }
}

/// The common payload of all value symbols: a declared type (which also
/// carries the initializer), a lifetime, flags, an optional direction for
/// ports and arguments, and the list of symbols driving this value.
pub struct ValueData<'a> {
    pub declared_type: DeclaredType<'a>,
    pub lifetime: Lifetime,
    pub flags: Cell<ValueFlags>,
    pub direction: Cell<Option<Direction>>,
    pub drivers: RefCell<Vec<&'a Symbol<'a>>>,
}

impl<'a> ValueData<'a> {
    pub fn new(declared_type: DeclaredType<'a>, lifetime: Lifetime) -> ValueData<'a> {
        ValueData {
            declared_type,
            lifetime,
            flags: Cell::new(ValueFlags::empty()),
            direction: Cell::new(None),
            drivers: RefCell::new(Vec::new()),
        }
    }

    pub fn initializer(&self) -> Option<&'a SyntaxNode<'a>> {
        self.declared_type.initializer()
    }

    pub fn add_flag(&self, flag: ValueFlags) {
        self.flags.set(self.flags.get() | flag);
    }

    pub fn has_flag(&self, flag: ValueFlags) -> bool {
        self.flags.get().contains(flag)
    }

    pub fn add_driver(&self, driver: &'a Symbol<'a>) {
        self.drivers.borrow_mut().push(driver);
    }
}

/// What kind of net a net symbol is.
pub enum NetKind<'a> {
    /// One of the built-in net keywords (`wire`, `tri`, ...).
    Builtin(Kw),
    /// A user-defined net type declared by `nettype`.
    UserDefined(&'a Symbol<'a>),
}

/// Payload of net symbols. Delay and strengths are computed lazily from the
/// parent declaration's syntax.
pub struct NetData<'a> {
    pub value: ValueData<'a>,
    pub kind: NetKind<'a>,
    pub decl_syntax: Cell<Option<&'a SyntaxNode<'a>>>,
    pub delay: Lazy<Option<&'a SyntaxNode<'a>>>,
    pub strength: Lazy<Option<&'a SyntaxNode<'a>>>,
}

impl<'a> NetData<'a> {
    /// The delay control of the parent net declaration, computed on first
    /// query.
    pub fn delay_syntax(&self) -> Option<&'a SyntaxNode<'a>> {
        self.delay
            .get_or_init(|| {
                self.decl_syntax
                    .get()
                    .and_then(|n| n.first_node_of(shale_syntax::ast::SyntaxKind::DelayControl))
            })
            .flatten()
    }

    /// The charge or drive strength of the parent net declaration, computed
    /// on first query.
    pub fn strength_syntax(&self) -> Option<&'a SyntaxNode<'a>> {
        self.strength
            .get_or_init(|| {
                self.decl_syntax
                    .get()
                    .and_then(|n| n.first_node_of(shale_syntax::ast::SyntaxKind::NetStrength))
            })
            .flatten()
    }
}

/// Payload of clocking-variable symbols.
pub struct ClockVarData<'a> {
    pub value: ValueData<'a>,
    pub direction: Direction,
    pub input_skew: Option<&'a SyntaxNode<'a>>,
    pub output_skew: Option<&'a SyntaxNode<'a>>,
    /// The parent-scope signal this variable tracks, unless an initializer
    /// expression defines it instead.
    pub target: Cell<Option<&'a Symbol<'a>>>,
}

/// Payload of clocking-block symbols.
pub struct ClockingData<'a> {
    pub scope: Scope<'a>,
    pub event: Option<&'a SyntaxNode<'a>>,
    pub is_default: bool,
    pub is_global: bool,
    pub default_input_skew: Cell<Option<&'a SyntaxNode<'a>>>,
    pub default_output_skew: Cell<Option<&'a SyntaxNode<'a>>>,
}

/// Payload of modport symbols; the ports are the scope members.
pub struct ModportData<'a> {
    pub scope: Scope<'a>,
}

/// The flavors of modport ports.
pub enum ModportPortKind<'a> {
    /// A simple named port bound to an internal variable or net.
    Simple {
        internal: Cell<Option<&'a Symbol<'a>>>,
    },
    /// An explicit port bound to an expression.
    Explicit { expr: Option<&'a SyntaxNode<'a>> },
    /// An imported or exported subroutine.
    Subroutine {
        is_export: bool,
        target: Cell<Option<&'a Symbol<'a>>>,
    },
    /// A clocking block exposed through the modport.
    Clocking {
        target: Cell<Option<&'a Symbol<'a>>>,
    },
}

pub struct ModportPortData<'a> {
    pub direction: Option<Direction>,
    pub kind: ModportPortKind<'a>,
}

/// Payload of task/function symbols. Arguments and body variables are the
/// scope members.
pub struct SubroutineData<'a> {
    pub scope: Scope<'a>,
    pub is_function: bool,
    pub lifetime: Lifetime,
    pub return_type: DeclaredType<'a>,
}

/// Payload of sequence/property/let declarations. The assertion ports are
/// the scope members.
pub struct AssertionData<'a> {
    pub scope: Scope<'a>,
    pub body: Option<&'a SyntaxNode<'a>>,
}

/// One alternative of a rand-sequence production.
pub struct RsRuleSem<'a> {
    pub items: Vec<&'a SyntaxNode<'a>>,
    pub weight: Option<&'a SyntaxNode<'a>>,
}

/// Payload of rand-sequence production symbols.
pub struct RandSeqProductionData<'a> {
    pub scope: Scope<'a>,
    pub return_type: DeclaredType<'a>,
    pub rules: RefCell<Vec<RsRuleSem<'a>>>,
}

/// Payload of procedural blocks (`initial`, `always*`, `final`).
pub struct ProcedureData<'a> {
    pub scope: Scope<'a>,
    pub kind: Kw,
}

/// The elaboration-time system tasks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ElabTaskKind {
    Fatal,
    Error,
    Warning,
    Info,
    StaticAssert,
}

impl ElabTaskKind {
    pub fn from_name(name: &str) -> Option<ElabTaskKind> {
        Some(match name {
            "fatal" => ElabTaskKind::Fatal,
            "error" => ElabTaskKind::Error,
            "warning" => ElabTaskKind::Warning,
            "info" => ElabTaskKind::Info,
            "static_assert" => ElabTaskKind::StaticAssert,
            _ => return None,
        })
    }
}

pub struct ElabTaskData<'a> {
    pub task: ElabTaskKind,
    pub args: Vec<&'a SyntaxNode<'a>>,
}

/// One port of a user-defined primitive.
pub struct UdpPort {
    pub name: Name,
    pub direction: Cell<Option<Direction>>,
    pub is_reg: Cell<bool>,
    pub loc: Location,
}

/// Payload of primitive (UDP) symbols.
pub struct PrimitiveData<'a> {
    pub ports: Vec<UdpPort>,
    pub sequential: Cell<bool>,
    /// The initial value of the output: '0', '1', or 'x'.
    pub initial: Cell<Option<char>>,
    pub table: Cell<Option<&'a SyntaxNode<'a>>>,
}

/// Payload of nettype declarations.
pub struct NettypeData<'a> {
    pub declared_type: DeclaredType<'a>,
}

/// Payload of typedefs.
pub struct TypeAliasData<'a> {
    pub declared_type: DeclaredType<'a>,
}

/// A definition kind: what a `module`-like declaration introduces.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DefinitionKind {
    Module,
    Interface,
    Program,
}

impl DefinitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DefinitionKind::Module => "module",
            DefinitionKind::Interface => "interface",
            DefinitionKind::Program => "program",
        }
    }
}

/// A formal parameter of a definition.
pub struct FormalParam<'a> {
    pub name: Name,
    pub default: Option<&'a SyntaxNode<'a>>,
    pub is_local: bool,
    pub is_type: bool,
    pub loc: Location,
}

/// Payload of module/interface/program definitions. The body is only
/// elaborated per distinct parameter binding, as an instance body.
pub struct DefinitionData<'a> {
    pub kind: DefinitionKind,
    pub syntax: &'a SyntaxNode<'a>,
    pub tree: &'a shale_syntax::SyntaxTree<'a>,
    pub params: Vec<FormalParam<'a>>,
    pub has_ansi_ports: bool,
    /// Names listed in a non-ANSI header, in order.
    pub port_names: Vec<Name>,
    pub instantiated: Cell<bool>,
}

/// Payload of instance symbols: the shared parameter-bound body.
pub struct InstanceData<'a> {
    pub body: &'a Symbol<'a>,
}

/// Payload of instance bodies. Two instances with identical parameter
/// bindings share one body symbol.
pub struct InstanceBodyData<'a> {
    pub scope: Scope<'a>,
    pub definition: &'a Symbol<'a>,
    /// The bound parameter values, canonicalized for body sharing.
    pub params: RefCell<Vec<(Name, String)>>,
}

/// Payload of import directives.
pub struct ImportData<'a> {
    pub package: Name,
    /// `None` for a wildcard import.
    pub item: Option<Name>,
    pub resolved: Cell<Option<&'a Symbol<'a>>>,
    pub is_exported: Cell<bool>,
}

/// The closed discriminant over all symbol kinds.
pub enum SymbolKind<'a> {
    Root(Scope<'a>),
    CompilationUnit(Scope<'a>),
    Package(Scope<'a>),
    AnonymousProgram(Scope<'a>),
    Definition(DefinitionData<'a>),
    Instance(InstanceData<'a>),
    InstanceBody(InstanceBodyData<'a>),
    Primitive(PrimitiveData<'a>),
    Variable(ValueData<'a>),
    Net(NetData<'a>),
    Parameter(ValueData<'a>),
    FormalArg(ValueData<'a>),
    Genvar(ValueData<'a>),
    ClockVar(ClockVarData<'a>),
    LocalAssertionVar(ValueData<'a>),
    TypeAlias(TypeAliasData<'a>),
    Nettype(NettypeData<'a>),
    ContinuousAssign {
        assignment: &'a SyntaxNode<'a>,
    },
    EmptyMember,
    ElabTask(ElabTaskData<'a>),
    Modport(ModportData<'a>),
    ModportPort(ModportPortData<'a>),
    ClockingBlock(ClockingData<'a>),
    Subroutine(SubroutineData<'a>),
    Sequence(AssertionData<'a>),
    Property(AssertionData<'a>),
    LetDecl(AssertionData<'a>),
    RandSeqProduction(RandSeqProductionData<'a>),
    Procedure(ProcedureData<'a>),
    Import(ImportData<'a>),
}

impl SymbolKind<'_> {
    /// A short noun for diagnostics.
    pub fn desc(&self) -> &'static str {
        match self {
            SymbolKind::Root(_) => "root",
            SymbolKind::CompilationUnit(_) => "compilation unit",
            SymbolKind::Package(_) => "package",
            SymbolKind::AnonymousProgram(_) => "anonymous program",
            SymbolKind::Definition(d) => d.kind.as_str(),
            SymbolKind::Instance(_) => "instance",
            SymbolKind::InstanceBody(_) => "instance body",
            SymbolKind::Primitive(_) => "primitive",
            SymbolKind::Variable(_) => "variable",
            SymbolKind::Net(_) => "net",
            SymbolKind::Parameter(_) => "parameter",
            SymbolKind::FormalArg(_) => "argument",
            SymbolKind::Genvar(_) => "genvar",
            SymbolKind::ClockVar(_) => "clocking variable",
            SymbolKind::LocalAssertionVar(_) => "local variable",
            SymbolKind::TypeAlias(_) => "typedef",
            SymbolKind::Nettype(_) => "net type",
            SymbolKind::ContinuousAssign { .. } => "continuous assignment",
            SymbolKind::EmptyMember => "empty member",
            SymbolKind::ElabTask(_) => "elaboration task",
            SymbolKind::Modport(_) => "modport",
            SymbolKind::ModportPort(_) => "modport port",
            SymbolKind::ClockingBlock(_) => "clocking block",
            SymbolKind::Subroutine(s) => {
                if s.is_function {
                    "function"
                } else {
                    "task"
                }
            }
            SymbolKind::Sequence(_) => "sequence",
            SymbolKind::Property(_) => "property",
            SymbolKind::LetDecl(_) => "let declaration",
            SymbolKind::RandSeqProduction(_) => "production",
            SymbolKind::Procedure(_) => "procedural block",
            SymbolKind::Import(_) => "import",
        }
    }
}

/// A node of the symbol tree.
pub struct Symbol<'a> {
    pub kind: SymbolKind<'a>,
    pub name: Option<Name>,
    pub loc: Location,
    pub parent: Cell<Option<&'a Symbol<'a>>>,
    pub syntax: Cell<Option<&'a SyntaxNode<'a>>>,
    pub decl_index: Cell<u32>,
}

impl<'a> Symbol<'a> {
    pub fn new(kind: SymbolKind<'a>, name: Option<Name>, loc: Location) -> Symbol<'a> {
        Symbol {
            kind,
            name,
            loc,
            parent: Cell::new(None),
            syntax: Cell::new(None),
            decl_index: Cell::new(0),
        }
    }

    pub fn parent(&self) -> Option<&'a Symbol<'a>> {
        self.parent.get()
    }

    /// The scope this symbol contains, if it is a scope-bearing kind.
    pub fn as_scope(&'a self) -> Option<&'a Scope<'a>> {
        match &self.kind {
            SymbolKind::Root(s)
            | SymbolKind::CompilationUnit(s)
            | SymbolKind::Package(s)
            | SymbolKind::AnonymousProgram(s) => Some(s),
            SymbolKind::InstanceBody(b) => Some(&b.scope),
            SymbolKind::Modport(m) => Some(&m.scope),
            SymbolKind::ClockingBlock(c) => Some(&c.scope),
            SymbolKind::Subroutine(s) => Some(&s.scope),
            SymbolKind::Sequence(a) | SymbolKind::Property(a) | SymbolKind::LetDecl(a) => {
                Some(&a.scope)
            }
            SymbolKind::RandSeqProduction(r) => Some(&r.scope),
            SymbolKind::Procedure(p) => Some(&p.scope),
            _ => None,
        }
    }

    /// The value payload, if this symbol is a value-like kind.
    pub fn as_value(&'a self) -> Option<&'a ValueData<'a>> {
        match &self.kind {
            SymbolKind::Variable(v)
            | SymbolKind::Parameter(v)
            | SymbolKind::FormalArg(v)
            | SymbolKind::Genvar(v)
            | SymbolKind::LocalAssertionVar(v) => Some(v),
            SymbolKind::Net(n) => Some(&n.value),
            SymbolKind::ClockVar(c) => Some(&c.value),
            _ => None,
        }
    }

    /// Whether unqualified lookup may find this symbol before its
    /// declaration point.
    pub fn allow_declared_after(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Subroutine(_)
                | SymbolKind::Sequence(_)
                | SymbolKind::Property(_)
                | SymbolKind::LetDecl(_)
                | SymbolKind::RandSeqProduction(_)
                | SymbolKind::Definition(_)
                | SymbolKind::Package(_)
                | SymbolKind::Primitive(_)
                | SymbolKind::TypeAlias(_)
                | SymbolKind::Nettype(_)
        )
    }

    /// Add a member symbol to this scope, setting its parent link and
    /// declaration index. Returns the previously declared symbol of the
    /// same name for redefinition reporting.
    pub fn add_member(&'a self, member: &'a Symbol<'a>) -> Option<&'a Symbol<'a>> {
        let scope = self
            .as_scope()
            .expect("add_member called on a non-scope symbol");
        member.parent.set(Some(self));
        member.decl_index.set(scope.len());
        if let SymbolKind::Import(_) = member.kind {
            scope.push_import(member);
        }
        scope.push(member.name, member)
    }
}
