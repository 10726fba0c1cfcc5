//! Jump targets.

use std::fmt;

use ruir_ast::Ident;

/// A scope-unique jump target.
///
/// Labels are minted by [`IrScope::new_label`](crate::IrScope::new_label),
/// which numbers them per prefix so `_LOOP_END_0` and `_LOOP_END_1` never
/// collide within one scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label {
    prefix: Ident,
    id: u32,
}

impl Label {
    /// Prefix used when a caller has no better name.
    pub const DEFAULT_PREFIX: &'static str = "LBL";

    #[inline]
    pub fn new(prefix: Ident, id: u32) -> Self {
        Label { prefix, id }
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.prefix, self.id)
    }
}
