//! Storage locations: locals, temporaries and `self`.
//!
//! # Depth
//!
//! A [`LocalVariable`] records how many lexical scopes up its storage lives,
//! *relative to the scope that references it*. The same slot seen from a
//! nested block is a different value (`depth + 1`) with the same identity;
//! [`LocalVariable::clone_for_depth`] produces such views and
//! [`LocalVariable::same_slot`] compares identity while ignoring depth.

use std::fmt;

use ruir_ast::Ident;

/// Named local at a lexical depth.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    pub name: Ident,
    pub depth: u32,
    /// Slot in the owning scope's frame.
    pub slot: u32,
}

impl LocalVariable {
    #[inline]
    pub fn new(name: Ident, depth: u32, slot: u32) -> Self {
        LocalVariable { name, depth, slot }
    }

    /// Same storage, viewed from `depth` scopes below its owner.
    #[inline]
    #[must_use]
    pub fn clone_for_depth(&self, depth: u32) -> Self {
        LocalVariable {
            name: self.name.clone(),
            depth,
            slot: self.slot,
        }
    }

    /// True when both denote the same frame slot, whatever the view depth.
    #[inline]
    pub fn same_slot(&self, other: &LocalVariable) -> bool {
        self.name == other.name && self.slot == other.slot
    }

    /// Flip-flop state locals are synthetic and never user-visible.
    #[inline]
    pub fn is_flip_state(&self) -> bool {
        self.name.starts_with("%flip_")
    }
}

/// Kind of a temporary slot.
///
/// `Local`, `Boolean`, `Closure`, `CurrentModule` and `CurrentScope` share
/// one per-scope counter (they all live in the frame's temp area); `Float`
/// and `Fixnum` have their own unboxed counters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TempKind {
    Local,
    Float,
    Fixnum,
    Boolean,
    /// Temporary of a closure body, tagged with the closure's id.
    Closure { closure_id: u32 },
    /// Cached `%current_module` of a scope.
    CurrentModule,
    /// Cached `%current_scope` of a scope.
    CurrentScope,
}

impl TempKind {
    /// Whether allocation of this kind advances the shared general counter.
    #[inline]
    pub fn uses_general_counter(self) -> bool {
        !matches!(self, TempKind::Float | TempKind::Fixnum)
    }
}

/// Scratch slot, unique per (kind counter, index) within a scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TemporaryVariable {
    pub kind: TempKind,
    pub index: u32,
}

impl TemporaryVariable {
    #[inline]
    pub const fn new(kind: TempKind, index: u32) -> Self {
        TemporaryVariable { kind, index }
    }

    #[inline]
    pub const fn local(index: u32) -> Self {
        TemporaryVariable::new(TempKind::Local, index)
    }
}

/// Any assignable location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Variable {
    Local(LocalVariable),
    Temp(TemporaryVariable),
    /// `%self`
    SelfVar,
}

impl Variable {
    #[inline]
    pub fn as_local(&self) -> Option<&LocalVariable> {
        match self {
            Variable::Local(lv) => Some(lv),
            _ => None,
        }
    }

    #[inline]
    pub fn is_temporary(&self) -> bool {
        matches!(self, Variable::Temp(_))
    }
}

impl From<LocalVariable> for Variable {
    #[inline]
    fn from(lv: LocalVariable) -> Self {
        Variable::Local(lv)
    }
}

impl From<TemporaryVariable> for Variable {
    #[inline]
    fn from(tv: TemporaryVariable) -> Self {
        Variable::Temp(tv)
    }
}

impl fmt::Display for TemporaryVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TempKind::Local => write!(f, "%v_{}", self.index),
            TempKind::Float => write!(f, "%f_{}", self.index),
            TempKind::Fixnum => write!(f, "%i_{}", self.index),
            TempKind::Boolean => write!(f, "%b_{}", self.index),
            TempKind::Closure { closure_id } => write!(f, "%cl_{}_{}", closure_id, self.index),
            TempKind::CurrentModule => write!(f, "%current_module"),
            TempKind::CurrentScope => write!(f, "%current_scope"),
        }
    }
}

impl fmt::Display for LocalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.depth == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}({})", self.name, self.depth)
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Local(lv) => lv.fmt(f),
            Variable::Temp(tv) => tv.fmt(f),
            Variable::SelfVar => f.write_str("%self"),
        }
    }
}
