//! Scopes: ordered member storage with name lookup bounded by a lookup
//! location. A scope observes its members in source order; unqualified
//! lookup at a given location only sees members declared before that point,
//! unless the member kind is visible regardless of position (subroutines,
//! assertion declarations, rand-sequence productions, type names).

use crate::symbol::Symbol;
use rustc_hash::FxHashMap;
use shale_common::name::Name;
use std::cell::RefCell;

/// A position in source order used to bound visibility during unqualified
/// lookup. Derived from a member's declaration index within its scope.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct LookupLocation(pub u32);

impl LookupLocation {
    /// Sees every member of the scope.
    pub const ANYWHERE: LookupLocation = LookupLocation(u32::MAX);

    /// The location just before a member's own declaration.
    pub fn before(sym: &Symbol) -> LookupLocation {
        LookupLocation(sym.decl_index.get())
    }

    /// The location just after a member's declaration.
    pub fn after(sym: &Symbol) -> LookupLocation {
        LookupLocation(sym.decl_index.get().saturating_add(1))
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct LookupFlags: u32 {
        /// Ignore the lookup location bound.
        const ALLOW_DECLARED_AFTER = 1 << 0;
        /// Do not continue the search in parent scopes.
        const NO_PARENT_SCOPE = 1 << 1;
    }
}

/// Ordered members plus a name-to-member index. Also records the import
/// directives that appeared in the scope, in declaration order.
pub struct Scope<'a> {
    members: RefCell<Vec<&'a Symbol<'a>>>,
    map: RefCell<FxHashMap<Name, &'a Symbol<'a>>>,
    imports: RefCell<Vec<&'a Symbol<'a>>>,
}

impl<'a> Scope<'a> {
    pub fn new() -> Scope<'a> {
        Scope {
            members: RefCell::new(Vec::new()),
            map: RefCell::new(FxHashMap::default()),
            imports: RefCell::new(Vec::new()),
        }
    }

    /// Number of members pushed so far; doubles as the next declaration
    /// index.
    pub fn len(&self) -> u32 {
        self.members.borrow().len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// The members in source order.
    pub fn members(&self) -> Vec<&'a Symbol<'a>> {
        self.members.borrow().clone()
    }

    /// Push a member. Returns the previously known symbol of the same name,
    /// if any, so the caller can report a redefinition.
    pub(crate) fn push(
        &self,
        name: Option<Name>,
        sym: &'a Symbol<'a>,
    ) -> Option<&'a Symbol<'a>> {
        self.members.borrow_mut().push(sym);
        if let Some(name) = name {
            let mut map = self.map.borrow_mut();
            match map.get(&name) {
                Some(prev) => return Some(prev),
                None => {
                    map.insert(name, sym);
                }
            }
        }
        None
    }

    pub(crate) fn push_import(&self, sym: &'a Symbol<'a>) {
        self.imports.borrow_mut().push(sym);
    }

    /// The import directives recorded in this scope, in source order.
    pub fn imports(&self) -> Vec<&'a Symbol<'a>> {
        self.imports.borrow().clone()
    }

    /// Look a name up among the direct members, honoring the location
    /// bound.
    pub fn get_at(
        &self,
        name: Name,
        loc: LookupLocation,
        flags: LookupFlags,
    ) -> Option<&'a Symbol<'a>> {
        let sym = *self.map.borrow().get(&name)?;
        if flags.contains(LookupFlags::ALLOW_DECLARED_AFTER)
            || sym.allow_declared_after()
            || LookupLocation(sym.decl_index.get()) < loc
        {
            Some(sym)
        } else {
            None
        }
    }

    /// Look a name up ignoring location bounds (hierarchical access).
    pub fn get(&self, name: Name) -> Option<&'a Symbol<'a>> {
        self.map.borrow().get(&name).copied()
    }
}

impl<'a> Default for Scope<'a> {
    fn default() -> Self {
        Scope::new()
    }
}
