//! Build failures.
//!
//! Only malformed or misplaced input is an error. Control transfers that
//! are illegal at runtime (`break` outside a loop, `retry` outside a
//! rescue) are not: they lower to instructions that throw a
//! `LocalJumpError` when executed.

use ruir_ast::Ident;

/// Why a compilation unit could not be built.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Unrecognised node shape, or a node in a position it cannot occupy.
    #[error("{file}:{line}: cannot compile {kind} node: {reason}")]
    NotCompilable {
        kind: &'static str,
        line: u32,
        file: Ident,
        reason: String,
    },

    #[error("line {line}: block argument `{name}` requested outside a for-loop body")]
    BlockArgOutsideFor { name: Ident, line: u32 },

    #[error("line {line}: scopes nested deeper than {limit}")]
    NestingTooDeep { limit: u32, line: u32 },
}

impl BuildError {
    /// Source line the error points at.
    pub fn line(&self) -> u32 {
        match self {
            BuildError::NotCompilable { line, .. }
            | BuildError::BlockArgOutsideFor { line, .. }
            | BuildError::NestingTooDeep { line, .. } => *line,
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;
