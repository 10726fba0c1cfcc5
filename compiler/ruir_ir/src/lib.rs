//! Intermediate representation produced by the ruir builder.
//!
//! The IR is a tree of [`IrScope`]s held in a [`ScopeTree`] arena. Each
//! scope owns a linear list of [`Instr`]uctions whose inputs are
//! [`Operand`]s and whose results are [`Variable`]s.
//!
//! - [`label`], [`variable`], [`operand`]: value types.
//! - [`instr`]: the closed instruction catalog and per-opcode metadata.
//! - [`scope`]: scope kinds, counters, local lookup and cloning.
//! - [`flags`]: scope flags and the bottom-up flags engine.
//! - [`manager`]: per-run context (singletons, temporary pool, listener).
//!
//! Nothing here knows about syntax beyond the [`StaticScope`] descriptor
//! and identifiers; translation lives in `ruir_build`.
//!
//! [`StaticScope`]: ruir_ast::StaticScope

pub mod flags;
pub mod instr;
pub mod label;
pub mod listener;
pub mod manager;
pub mod operand;
pub mod pretty;
pub mod scope;
pub mod variable;

pub use flags::ScopeFlags;
pub use instr::{
    CallArgs, CallInstr, CallKind, Instr, OpFlags, Operation, RuntimeHelper, TraceEvent,
};
pub use label::Label;
pub use listener::BuildListener;
pub use manager::{IrManager, TempPool};
pub use operand::{JumpKind, Operand};
pub use pretty::ScopeDump;
pub use scope::{
    ArgDescriptor, ArgKind, ClosureInfo, IrScope, ScopeId, ScopeKind, ScopeTree, TempCounts,
};
pub use variable::{LocalVariable, TempKind, TemporaryVariable, Variable};
