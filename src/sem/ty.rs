//! The type system of the symbol layer. Types are interned: structurally
//! equal types share one allocation in the compilation's arena, so type
//! identity comparisons are pointer comparisons.

use rustc_hash::FxHashSet;
use shale_common::name::Name;
use std::cell::RefCell;
use std::fmt;
use typed_arena::Arena;

/// Integer vector element flavors.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IntVecKind {
    Bit,
    Logic,
    Reg,
}

impl IntVecKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IntVecKind::Bit => "bit",
            IntVecKind::Logic => "logic",
            IntVecKind::Reg => "reg",
        }
    }
}

/// Integer atom types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IntAtomKind {
    Byte,
    Shortint,
    Int,
    Longint,
    Integer,
    Time,
}

impl IntAtomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IntAtomKind::Byte => "byte",
            IntAtomKind::Shortint => "shortint",
            IntAtomKind::Int => "int",
            IntAtomKind::Longint => "longint",
            IntAtomKind::Integer => "integer",
            IntAtomKind::Time => "time",
        }
    }

    pub fn width(self) -> u32 {
        match self {
            IntAtomKind::Byte => 8,
            IntAtomKind::Shortint => 16,
            IntAtomKind::Int => 32,
            IntAtomKind::Longint => 64,
            IntAtomKind::Integer => 32,
            IntAtomKind::Time => 64,
        }
    }
}

/// Floating-point flavors.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RealKind {
    Real,
    Shortreal,
    Realtime,
}

impl RealKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RealKind::Real => "real",
            RealKind::Shortreal => "shortreal",
            RealKind::Realtime => "realtime",
        }
    }
}

/// A packed range `[msb:lsb]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Range {
    pub msb: i64,
    pub lsb: i64,
}

impl Range {
    pub fn width(&self) -> u64 {
        (self.msb - self.lsb).unsigned_abs() + 1
    }
}

/// A concrete type. Interned and shared across the symbol hierarchy.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type<'a> {
    /// Produced when type computation failed; suppresses follow-on errors.
    Error,
    Void,
    String,
    Chandle,
    Event,
    Real(RealKind),
    /// `bit`/`logic`/`reg` with optional signing and packed dimensions.
    IntVec {
        kind: IntVecKind,
        signed: bool,
        ranges: Vec<Range>,
    },
    IntAtom {
        kind: IntAtomKind,
        signed: bool,
    },
    /// A value carried on a user-defined net type.
    UserNet {
        nettype: Name,
        inner: &'a Type<'a>,
    },
    /// A named alias introduced by a typedef.
    Alias {
        name: Name,
        target: &'a Type<'a>,
    },
    /// An unpacked array over an element type.
    UnpackedArray {
        element: &'a Type<'a>,
        dims: Vec<Range>,
    },
}

impl<'a> Type<'a> {
    /// Strip aliases down to the underlying type.
    pub fn canonical(&self) -> &Type<'a> {
        match self {
            Type::Alias { target, .. } => target.canonical(),
            other => other,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.canonical(), Type::Error)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self.canonical(),
            Type::IntVec { .. } | Type::IntAtom { .. }
        )
    }

    /// Total bit width of a packed type, if it has one.
    pub fn bit_width(&self) -> Option<u64> {
        match self.canonical() {
            Type::IntVec { ranges, .. } => {
                Some(ranges.iter().map(|r| r.width()).product::<u64>().max(1))
            }
            Type::IntAtom { kind, .. } => Some(kind.width() as u64),
            Type::UserNet { inner, .. } => inner.bit_width(),
            _ => None,
        }
    }
}

impl fmt::Display for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Error => write!(f, "<error>"),
            Type::Void => write!(f, "void"),
            Type::String => write!(f, "string"),
            Type::Chandle => write!(f, "chandle"),
            Type::Event => write!(f, "event"),
            Type::Real(kind) => write!(f, "{}", kind.as_str()),
            Type::IntVec {
                kind,
                signed,
                ranges,
            } => {
                write!(f, "{}", kind.as_str())?;
                if *signed {
                    write!(f, " signed")?;
                }
                for r in ranges {
                    write!(f, " [{}:{}]", r.msb, r.lsb)?;
                }
                Ok(())
            }
            Type::IntAtom { kind, signed } => {
                write!(f, "{}", kind.as_str())?;
                if !*signed {
                    write!(f, " unsigned")?;
                }
                Ok(())
            }
            Type::UserNet { inner, .. } => write!(f, "{}", inner),
            Type::Alias { target, .. } => write!(f, "{}", target),
            Type::UnpackedArray { element, dims } => {
                write!(f, "{}", element)?;
                for d in dims {
                    write!(f, " [{}:{}]", d.msb, d.lsb)?;
                }
                Ok(())
            }
        }
    }
}

/// The interner. Holds one allocation per distinct type.
pub struct TypeInterner<'a> {
    arena: &'a Arena<Type<'a>>,
    set: RefCell<FxHashSet<&'a Type<'a>>>,
}

impl<'a> TypeInterner<'a> {
    pub fn new(arena: &'a Arena<Type<'a>>) -> TypeInterner<'a> {
        TypeInterner {
            arena,
            set: RefCell::new(FxHashSet::default()),
        }
    }

    pub fn intern(&self, ty: Type<'a>) -> &'a Type<'a> {
        let mut set = self.set.borrow_mut();
        if let Some(existing) = set.get(&ty) {
            return existing;
        }
        let stored: &'a Type<'a> = self.arena.alloc(ty);
        set.insert(stored);
        stored
    }

    pub fn error(&self) -> &'a Type<'a> {
        self.intern(Type::Error)
    }

    /// The default `logic` scalar.
    pub fn logic(&self) -> &'a Type<'a> {
        self.intern(Type::IntVec {
            kind: IntVecKind::Logic,
            signed: false,
            ranges: Vec::new(),
        })
    }

    pub fn int(&self) -> &'a Type<'a> {
        self.intern(Type::IntAtom {
            kind: IntAtomKind::Int,
            signed: true,
        })
    }

    pub fn string(&self) -> &'a Type<'a> {
        self.intern(Type::String)
    }

    pub fn real(&self) -> &'a Type<'a> {
        self.intern(Type::Real(RealKind::Real))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_allocations() {
        let arena = Arena::new();
        let interner = TypeInterner::new(&arena);
        let a = interner.intern(Type::IntVec {
            kind: IntVecKind::Logic,
            signed: false,
            ranges: vec![Range { msb: 3, lsb: 0 }],
        });
        let b = interner.intern(Type::IntVec {
            kind: IntVecKind::Logic,
            signed: false,
            ranges: vec![Range { msb: 3, lsb: 0 }],
        });
        let c = interner.logic();
        assert!(std::ptr::eq(a, b));
        assert!(!std::ptr::eq(a, c));
        assert_eq!(a.bit_width(), Some(4));
    }

    #[test]
    fn alias_canonicalizes() {
        let arena = Arena::new();
        let interner = TypeInterner::new(&arena);
        let base = interner.int();
        let alias = interner.intern(Type::Alias {
            name: Name(0),
            target: base,
        });
        assert!(std::ptr::eq(alias.canonical(), base));
        assert!(alias.is_integral());
    }
}
