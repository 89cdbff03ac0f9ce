//! Lazily resolved declared types and the generic three-state cell used for
//! memoized per-symbol data. A declared type starts out as bare syntax, may
//! be linked to another declared type (clocking variables aliasing their
//! target signal), and ends up resolved to an interned concrete type. The
//! in-progress state doubles as the recursion guard.

use crate::ty::Type;
use shale_syntax::ast::SyntaxNode;
use std::cell::Cell;

bitflags::bitflags! {
    /// Policies that modify how a declared type resolves.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct DeclaredTypeFlags: u32 {
        /// The slot belongs to a net; the resolved type is wrapped in the
        /// net's value type rules.
        const NET_TYPE = 1 << 0;
        /// Local assertion variables must resolve to a sequence-compatible
        /// type.
        const REQUIRE_SEQUENCE_TYPE = 1 << 1;
        /// The symbol lives in an interface and may be referenced through
        /// modports.
        const INTERFACE_VARIABLE = 1 << 2;
        /// An automatic variable whose initializer is evaluated on entry.
        const AUTOMATIC_INITIALIZER = 1 << 3;
        /// A formal argument that merges with a same-named variable
        /// declaration in the body.
        const FORMAL_ARG_MERGE_VAR = 1 << 4;
    }
}

/// Resolution state of a lazily computed slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LazyState {
    Unresolved,
    InProgress,
    Resolved,
}

/// What a caller should do after asking a declared type to resolve.
pub enum DtStep<'a> {
    /// Already resolved to this type.
    Done(&'a Type<'a>),
    /// Resolution is already running further up the stack.
    Cycle,
    /// The caller must compute the type and store it with `complete`.
    Compute,
}

/// A lazily resolved type slot associated with a value symbol.
pub struct DeclaredType<'a> {
    state: Cell<LazyState>,
    syntax: Cell<Option<&'a SyntaxNode<'a>>>,
    initializer: Cell<Option<&'a SyntaxNode<'a>>>,
    link: Cell<Option<&'a DeclaredType<'a>>>,
    resolved: Cell<Option<&'a Type<'a>>>,
    pub flags: DeclaredTypeFlags,
}

impl<'a> DeclaredType<'a> {
    /// A slot that resolves from type syntax.
    pub fn from_syntax(
        syntax: Option<&'a SyntaxNode<'a>>,
        flags: DeclaredTypeFlags,
    ) -> DeclaredType<'a> {
        DeclaredType {
            state: Cell::new(LazyState::Unresolved),
            syntax: Cell::new(syntax),
            initializer: Cell::new(None),
            link: Cell::new(None),
            resolved: Cell::new(None),
            flags,
        }
    }

    /// A slot that aliases another declared type.
    pub fn linked(other: &'a DeclaredType<'a>, flags: DeclaredTypeFlags) -> DeclaredType<'a> {
        let dt = DeclaredType::from_syntax(None, flags);
        dt.link.set(Some(other));
        dt
    }

    /// A slot already holding a concrete type.
    pub fn from_type(ty: &'a Type<'a>) -> DeclaredType<'a> {
        let dt = DeclaredType::from_syntax(None, DeclaredTypeFlags::empty());
        dt.resolved.set(Some(ty));
        dt.state.set(LazyState::Resolved);
        dt
    }

    pub fn syntax(&self) -> Option<&'a SyntaxNode<'a>> {
        self.syntax.get()
    }

    pub fn set_syntax(&self, syntax: &'a SyntaxNode<'a>) {
        self.syntax.set(Some(syntax));
    }

    pub fn initializer(&self) -> Option<&'a SyntaxNode<'a>> {
        self.initializer.get()
    }

    pub fn set_initializer(&self, init: &'a SyntaxNode<'a>) {
        self.initializer.set(Some(init));
    }

    pub fn link(&self) -> Option<&'a DeclaredType<'a>> {
        self.link.get()
    }

    pub fn set_link(&self, other: &'a DeclaredType<'a>) {
        self.link.set(Some(other));
    }

    pub fn is_resolved(&self) -> bool {
        self.state.get() == LazyState::Resolved
    }

    /// The resolved type if resolution already happened.
    pub fn peek(&self) -> Option<&'a Type<'a>> {
        self.resolved.get()
    }

    /// Enter resolution. Idempotent: a resolved slot returns its type, a
    /// slot under resolution reports the cycle, otherwise the caller owns
    /// the computation.
    pub fn begin(&self) -> DtStep<'a> {
        match self.state.get() {
            LazyState::Resolved => DtStep::Done(self.resolved.get().expect("resolved type set")),
            LazyState::InProgress => DtStep::Cycle,
            LazyState::Unresolved => {
                self.state.set(LazyState::InProgress);
                DtStep::Compute
            }
        }
    }

    /// Store the computed type. Must follow a `DtStep::Compute`.
    pub fn complete(&self, ty: &'a Type<'a>) -> &'a Type<'a> {
        debug_assert_eq!(self.state.get(), LazyState::InProgress);
        self.resolved.set(Some(ty));
        self.state.set(LazyState::Resolved);
        ty
    }

    /// Abandon an in-progress resolution (cycle error path).
    pub fn fail(&self, error: &'a Type<'a>) -> &'a Type<'a> {
        self.resolved.set(Some(error));
        self.state.set(LazyState::Resolved);
        error
    }
}

/// A generic not-yet-computed / in-progress / computed cell for memoized
/// derived data, with in-progress acting as the cycle guard.
pub struct Lazy<T: Copy> {
    state: Cell<LazyState>,
    value: Cell<Option<T>>,
}

impl<T: Copy> Lazy<T> {
    pub fn new() -> Lazy<T> {
        Lazy {
            state: Cell::new(LazyState::Unresolved),
            value: Cell::new(None),
        }
    }

    /// Compute-once access. Returns `None` if the computation re-entered
    /// itself.
    pub fn get_or_init<F: FnOnce() -> T>(&self, f: F) -> Option<T> {
        match self.state.get() {
            LazyState::Resolved => self.value.get(),
            LazyState::InProgress => None,
            LazyState::Unresolved => {
                self.state.set(LazyState::InProgress);
                let value = f();
                self.value.set(Some(value));
                self.state.set(LazyState::Resolved);
                Some(value)
            }
        }
    }

    pub fn peek(&self) -> Option<T> {
        self.value.get()
    }
}

impl<T: Copy> Default for Lazy<T> {
    fn default() -> Self {
        Lazy::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_computes_once() {
        let cell: Lazy<u32> = Lazy::new();
        let mut calls = 0;
        let a = cell.get_or_init(|| {
            calls += 1;
            7
        });
        let b = cell.get_or_init(|| {
            calls += 1;
            9
        });
        assert_eq!(a, Some(7));
        assert_eq!(b, Some(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn lazy_detects_reentry() {
        struct Probe<'c> {
            cell: &'c Lazy<u32>,
        }
        impl<'c> Probe<'c> {
            fn run(&self) -> Option<u32> {
                self.cell.get_or_init(|| self.cell.get_or_init(|| 1).unwrap_or(99))
            }
        }
        let cell = Lazy::new();
        let probe = Probe { cell: &cell };
        assert_eq!(probe.run(), Some(99));
    }
}
