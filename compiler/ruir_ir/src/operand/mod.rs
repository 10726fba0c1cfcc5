//! Instruction operands.
//!
//! Operands are immutable values. Literals that denote the same runtime
//! object on every evaluation (numbers, symbols, frozen strings, `nil`,
//! booleans) are [immutable](Operand::is_immutable_literal) and can be used
//! in place; anything that must produce a fresh object per evaluation
//! (string literals, arrays, hashes) is routed through a copy by the builder.

use std::fmt;

use ruir_ast::{Ident, RegexpOptions};

use crate::scope::ScopeId;
use crate::variable::Variable;

/// Which control transfer a deferred local-jump error reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JumpKind {
    Break,
    Next,
    Redo,
    Retry,
    Return,
}

impl JumpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JumpKind::Break => "break",
            JumpKind::Next => "next",
            JumpKind::Redo => "redo",
            JumpKind::Retry => "retry",
            JumpKind::Return => "return",
        }
    }
}

/// A value consumed by an instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Nil,
    Boolean(bool),
    /// Result of a construct through which control never falls.
    UnexecutableNil,
    /// "No value supplied" marker (missing optional arg, subject-less `case`).
    Undefined,
    /// Absent block argument.
    NullBlock,

    Fixnum(i64),
    Float(f64),
    Bignum(Ident),
    Rational { numerator: i64, denominator: i64 },
    Complex(Box<Operand>),
    StringLiteral(Ident),
    FrozenString(Ident),
    Symbol(Ident),
    /// Symbol built from a dynamic string.
    DynamicSymbol(Box<Operand>),
    Regexp { source: Ident, options: RegexpOptions },
    /// `` $& $` $' $+ ``
    Backref(char),
    /// `$n`
    NthRef(u32),

    Array(Vec<Operand>),
    Hash(Vec<(Operand, Operand)>),
    Splat(Box<Operand>),
    /// Multiple return value wrapper.
    SValue(Box<Operand>),

    Variable(Variable),

    /// The `Object` class.
    ObjectClass,
    /// Module of the scope `n` lexical levels up.
    ScopeModule(u32),
    /// Static scope `n` lexical levels up.
    CurrentScope(u32),
    /// A closure body bound to its `self`.
    WrappedClosure { self_value: Box<Operand>, closure: ScopeId },
    /// Exception object of a deferred local-jump error.
    LocalJumpError(JumpKind),
}

impl Operand {
    #[inline]
    pub fn self_value() -> Self {
        Operand::Variable(Variable::SelfVar)
    }

    #[inline]
    pub fn symbol(name: &str) -> Self {
        Operand::Symbol(Ident::from(name))
    }

    #[inline]
    pub fn frozen(text: &str) -> Self {
        Operand::FrozenString(Ident::from(text))
    }

    /// Literal whose runtime value is the same object on every evaluation.
    pub fn is_immutable_literal(&self) -> bool {
        matches!(
            self,
            Operand::Nil
                | Operand::Boolean(_)
                | Operand::UnexecutableNil
                | Operand::Undefined
                | Operand::NullBlock
                | Operand::Fixnum(_)
                | Operand::Float(_)
                | Operand::Bignum(_)
                | Operand::Rational { .. }
                | Operand::Complex(_)
                | Operand::FrozenString(_)
                | Operand::Symbol(_)
                | Operand::ObjectClass
                | Operand::LocalJumpError(_)
        )
    }

    #[inline]
    pub fn is_unexecutable_nil(&self) -> bool {
        matches!(self, Operand::UnexecutableNil)
    }

    #[inline]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Operand::Variable(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn is_temporary(&self) -> bool {
        matches!(self, Operand::Variable(v) if v.is_temporary())
    }

    /// Closure scope referenced by a `WrappedClosure`.
    #[inline]
    pub fn closure(&self) -> Option<ScopeId> {
        match self {
            Operand::WrappedClosure { closure, .. } => Some(*closure),
            _ => None,
        }
    }

    /// Visit this operand and every nested operand.
    pub fn walk(&self, f: &mut dyn FnMut(&Operand)) {
        f(self);
        match self {
            Operand::Complex(inner)
            | Operand::DynamicSymbol(inner)
            | Operand::Splat(inner)
            | Operand::SValue(inner) => inner.walk(f),
            Operand::WrappedClosure { self_value, .. } => self_value.walk(f),
            Operand::Array(elts) => elts.iter().for_each(|e| e.walk(f)),
            Operand::Hash(pairs) => {
                for (k, v) in pairs {
                    k.walk(f);
                    v.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Rewrite every closure reference reachable from this operand.
    pub fn remap_closures(&mut self, map: &mut dyn FnMut(ScopeId) -> ScopeId) {
        match self {
            Operand::WrappedClosure {
                self_value,
                closure,
            } => {
                *closure = map(*closure);
                self_value.remap_closures(map);
            }
            Operand::Complex(inner)
            | Operand::DynamicSymbol(inner)
            | Operand::Splat(inner)
            | Operand::SValue(inner) => inner.remap_closures(map),
            Operand::Array(elts) => elts.iter_mut().for_each(|e| e.remap_closures(map)),
            Operand::Hash(pairs) => {
                for (k, v) in pairs {
                    k.remap_closures(map);
                    v.remap_closures(map);
                }
            }
            _ => {}
        }
    }
}

impl From<Variable> for Operand {
    #[inline]
    fn from(v: Variable) -> Self {
        Operand::Variable(v)
    }
}

impl fmt::Display for JumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Nil => f.write_str("nil"),
            Operand::Boolean(b) => write!(f, "{b}"),
            Operand::UnexecutableNil => f.write_str("nil(unexecutable)"),
            Operand::Undefined => f.write_str("%undefined"),
            Operand::NullBlock => f.write_str("%null_block"),
            Operand::Fixnum(n) => write!(f, "Fixnum:{n}"),
            Operand::Float(x) => write!(f, "Float:{x}"),
            Operand::Bignum(s) => write!(f, "Bignum:{s}"),
            Operand::Rational {
                numerator,
                denominator,
            } => write!(f, "Rational:{numerator}/{denominator}"),
            Operand::Complex(inner) => write!(f, "Complex:{inner}"),
            Operand::StringLiteral(s) => write!(f, "{s:?}"),
            Operand::FrozenString(s) => write!(f, "frozen:{s:?}"),
            Operand::Symbol(s) => write!(f, ":{s}"),
            Operand::DynamicSymbol(inner) => write!(f, ":{inner}"),
            Operand::Regexp { source, .. } => write!(f, "RE:|{source}|"),
            Operand::Backref(c) => write!(f, "${c}"),
            Operand::NthRef(n) => write!(f, "${n}"),
            Operand::Array(elts) => {
                f.write_str("Array:[")?;
                write_list(f, elts)?;
                f.write_str("]")
            }
            Operand::Hash(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}=>{v}")?;
                }
                f.write_str("}")
            }
            Operand::Splat(inner) => write!(f, "*{inner}"),
            Operand::SValue(inner) => write!(f, "SValue:{inner}"),
            Operand::Variable(v) => v.fmt(f),
            Operand::ObjectClass => f.write_str("<Class:Object>"),
            Operand::ScopeModule(n) => write!(f, "module<{n}>"),
            Operand::CurrentScope(n) => write!(f, "scope<{n}>"),
            Operand::WrappedClosure {
                self_value,
                closure,
            } => write!(f, "{self_value}:closure#{}", closure.raw()),
            Operand::LocalJumpError(kind) => write!(f, "LocalJumpError:{kind}"),
        }
    }
}

pub(crate) fn write_list(f: &mut fmt::Formatter<'_>, ops: &[Operand]) -> fmt::Result {
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{op}")?;
    }
    Ok(())
}
