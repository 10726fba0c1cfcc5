//! Syntax tree input for the ruir IR builder.
//!
//! The surface parser lives elsewhere; this crate only fixes the shape of
//! the tree it hands over:
//!
//! - [`Node`] / [`NodeKind`]: one closed enumeration of syntax forms, each
//!   carrying its children and a [`SourcePos`].
//! - [`ArgsNode`] and [`MultipleAsgnPattern`]: parameter lists and
//!   destructuring patterns, shared by `def`, blocks, lambdas and `a, b = c`.
//! - [`StaticScope`]: the parser's per-scope variable table, which the
//!   builder annotates with arity information.
//!
//! # Constant Folding
//!
//! [`Node::truthiness`] reports whether a node is a literal that is always
//! truthy or always falsy. The builder uses it to short-circuit `and`/`or`
//! and to drop loops whose head condition can never hold.

use std::sync::Arc;

mod args;
mod node;
mod static_scope;

pub use args::{ArgItem, ArgsNode, KeywordArg, MasgnRest, MultipleAsgnPattern, OptArg, RestArg};
pub use node::{
    HashPair, Node, NodeKind, RegexpOptions, RescueClause, SourcePos, Truthiness, WhenClause,
};
pub use static_scope::{Arity, StaticScope};

/// Identifier text shared between the tree and the IR that references it.
pub type Ident = Arc<str>;

/// Build an [`Ident`] from a string slice.
#[inline]
pub fn ident(s: &str) -> Ident {
    Arc::from(s)
}
