//! Scope flags and the bottom-up flags engine.
//!
//! Each scope carries a [`ScopeFlags`] set that later passes consult to
//! decide, for instance, whether a dynamic scope must be materialised.
//!
//! # Lifecycle
//!
//! A fresh scope starts from [`ScopeFlags::CONSERVATIVE`]: every flag that
//! could make an optimisation unsafe is assumed set. Appending an
//! instruction folds its contribution in immediately (the builder reads
//! some flags, such as `HAS_BREAK_INSTRS`, while still building).
//! [`ScopeTree::compute_scope_flags`] then recomputes the derived flags once
//! the scope is complete; it is memoised until
//! [`ScopeTree::invalidate_scope_flags`] or an instruction rewrite.

use bitflags::bitflags;

use crate::instr::{Instr, RuntimeHelper};
use crate::operand::Operand;
use crate::scope::{ScopeId, ScopeTree};

bitflags! {
    /// Per-scope facts consumed by later passes.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct ScopeFlags: u32 {
        // === Binding ===

        /// A callee may capture this scope's binding (`binding`, blocks).
        const CAN_CAPTURE_CALLERS_BINDING = 1 << 0;
        /// The binding is reachable from outside normal lexical flow.
        const BINDING_HAS_ESCAPED = 1 << 1;
        /// Calls a method that can evaluate code against the binding.
        const USES_EVAL = 1 << 2;
        /// Reads or writes `$~` / `$_`.
        const USES_BACKREF_OR_LASTLINE = 1 << 3;
        /// Contains a bare `super` (directly or in a nested closure).
        const USES_ZSUPER = 1 << 4;

        // === Control transfer ===

        /// A nested closure may break out to a call site in this scope.
        const CAN_RECEIVE_BREAKS = 1 << 5;
        /// A nested closure may return from this scope non-locally.
        const CAN_RECEIVE_NONLOCAL_RETURNS = 1 << 6;
        /// Contains a `break` instruction.
        const HAS_BREAK_INSTRS = 1 << 7;
        /// Contains a non-local `return` instruction.
        const HAS_NONLOCAL_RETURNS = 1 << 8;
        /// Contains a loop.
        const HAS_LOOPS = 1 << 9;

        // === Receipt ===

        const RECEIVES_KEYWORD_ARGS = 1 << 10;
        /// Loads its incoming block.
        const RECEIVES_CLOSURE_ARG = 1 << 11;

        // === Misc ===

        /// Registers `END {}` blocks.
        const HAS_END_BLOCKS = 1 << 12;
        /// Frame setup/teardown is emitted as explicit instructions.
        const HAS_EXPLICIT_CALL_PROTOCOL = 1 << 13;
        /// May activate refinements (`using`).
        const MAYBE_USING_REFINEMENTS = 1 << 14;

        // === Derived ===

        /// A heap-allocated dynamic scope must back this scope's locals.
        const REQUIRES_DYNSCOPE = 1 << 15;
    }
}

impl ScopeFlags {
    /// Starting assumption before any computation.
    pub const CONSERVATIVE: ScopeFlags = ScopeFlags::CAN_CAPTURE_CALLERS_BINDING
        .union(ScopeFlags::BINDING_HAS_ESCAPED)
        .union(ScopeFlags::USES_EVAL)
        .union(ScopeFlags::USES_BACKREF_OR_LASTLINE)
        .union(ScopeFlags::USES_ZSUPER)
        .union(ScopeFlags::REQUIRES_DYNSCOPE);

    /// Cleared and rebuilt by every computation.
    pub const RECOMPUTED: ScopeFlags = ScopeFlags::CAN_CAPTURE_CALLERS_BINDING
        .union(ScopeFlags::BINDING_HAS_ESCAPED)
        .union(ScopeFlags::CAN_RECEIVE_BREAKS)
        .union(ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS)
        .union(ScopeFlags::HAS_BREAK_INSTRS)
        .union(ScopeFlags::HAS_NONLOCAL_RETURNS)
        .union(ScopeFlags::USES_ZSUPER)
        .union(ScopeFlags::USES_EVAL)
        .union(ScopeFlags::USES_BACKREF_OR_LASTLINE)
        .union(ScopeFlags::REQUIRES_DYNSCOPE);

    /// Any of these forces a dynamic scope.
    pub const DYNSCOPE_TRIGGERS: ScopeFlags = ScopeFlags::CAN_RECEIVE_BREAKS
        .union(ScopeFlags::HAS_NONLOCAL_RETURNS)
        .union(ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS)
        .union(ScopeFlags::BINDING_HAS_ESCAPED)
        .union(ScopeFlags::USES_ZSUPER)
        .union(ScopeFlags::RECEIVES_KEYWORD_ARGS);

    /// Fold a computed nested closure's flags into its parent's.
    pub fn absorb_closure(&mut self, closure: ScopeFlags) {
        if closure.contains(ScopeFlags::USES_EVAL) {
            // eval inside the block can inject any transfer
            self.insert(
                ScopeFlags::CAN_RECEIVE_BREAKS
                    | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS
                    | ScopeFlags::USES_ZSUPER,
            );
            return;
        }
        if closure.intersects(ScopeFlags::HAS_BREAK_INSTRS | ScopeFlags::CAN_RECEIVE_BREAKS) {
            self.insert(ScopeFlags::CAN_RECEIVE_BREAKS);
        }
        if closure.intersects(
            ScopeFlags::HAS_NONLOCAL_RETURNS | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS,
        ) {
            self.insert(ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS);
        }
        if closure.contains(ScopeFlags::USES_ZSUPER) {
            self.insert(ScopeFlags::USES_ZSUPER);
        }
    }

    /// Set `REQUIRES_DYNSCOPE` from the trigger set.
    pub fn derive_requires_dynscope(&mut self) {
        let required = self.intersects(ScopeFlags::DYNSCOPE_TRIGGERS);
        self.set(ScopeFlags::REQUIRES_DYNSCOPE, required);
    }
}

// ── Per-instruction contributions ───────────────────────────────────

/// Methods that expose or evaluate against the caller's binding.
const BINDING_METHODS: &[&str] = &[
    "binding",
    "eval",
    "local_variables",
    "instance_eval",
    "instance_exec",
    "module_eval",
    "module_exec",
    "class_eval",
    "class_exec",
    "block_given?",
    "iterator?",
];

/// Methods that may evaluate a string against the caller's binding.
const EVAL_METHODS: &[&str] = &["eval", "module_eval", "class_eval", "instance_eval"];

fn is_backref_global(name: &str) -> bool {
    name == "$_" || name == "$~"
}

impl Instr {
    /// Fold this instruction's contribution into `flags`.
    pub fn compute_scope_flags(&self, flags: &mut ScopeFlags) {
        self.for_each_operand(&mut |op| {
            op.walk(&mut |inner| {
                if matches!(inner, Operand::Backref(_) | Operand::NthRef(_)) {
                    flags.insert(ScopeFlags::USES_BACKREF_OR_LASTLINE);
                }
            });
        });

        match self {
            Instr::Call(call) => {
                let name: &str = &call.name;
                if call.closure.is_some() || BINDING_METHODS.contains(&name) {
                    flags.insert(
                        ScopeFlags::BINDING_HAS_ESCAPED | ScopeFlags::CAN_CAPTURE_CALLERS_BINDING,
                    );
                }
                if EVAL_METHODS.contains(&name) {
                    flags.insert(ScopeFlags::USES_EVAL);
                }
                if call.proc_new {
                    flags.insert(ScopeFlags::RECEIVES_CLOSURE_ARG);
                }
                if call.potentially_refined {
                    flags.insert(ScopeFlags::MAYBE_USING_REFINEMENTS);
                }
            }
            Instr::InstanceSuper { closure, .. }
            | Instr::ClassSuper { closure, .. }
            | Instr::UnresolvedSuper { closure, .. } => {
                if closure.is_some() {
                    flags.insert(
                        ScopeFlags::BINDING_HAS_ESCAPED | ScopeFlags::CAN_CAPTURE_CALLERS_BINDING,
                    );
                }
            }
            Instr::ZSuper { closure, .. } => {
                flags.insert(ScopeFlags::USES_ZSUPER);
                if closure.is_some() {
                    flags.insert(
                        ScopeFlags::BINDING_HAS_ESCAPED | ScopeFlags::CAN_CAPTURE_CALLERS_BINDING,
                    );
                }
            }
            Instr::BuildLambda { .. } => {
                flags.insert(ScopeFlags::BINDING_HAS_ESCAPED);
            }
            Instr::Break { .. } => flags.insert(ScopeFlags::HAS_BREAK_INSTRS),
            Instr::NonlocalReturn { .. } => flags.insert(ScopeFlags::HAS_NONLOCAL_RETURNS),
            Instr::ReceiveKeywordArg { .. } | Instr::ReceiveKeywordRestArg { .. } => {
                flags.insert(ScopeFlags::RECEIVES_KEYWORD_ARGS);
            }
            Instr::CheckArity {
                receives_keywords,
                keyword_rest,
                ..
            } => {
                if *receives_keywords || *keyword_rest {
                    flags.insert(ScopeFlags::RECEIVES_KEYWORD_ARGS);
                }
            }
            Instr::LoadImplicitClosure(_) | Instr::LoadFrameClosure(_) => {
                flags.insert(ScopeFlags::RECEIVES_CLOSURE_ARG);
            }
            Instr::GetGlobalVariable { name, .. } | Instr::PutGlobalVar { name, .. } => {
                // `$!` and other globals say nothing about the binding
                if is_backref_global(name) {
                    flags.insert(ScopeFlags::USES_BACKREF_OR_LASTLINE);
                }
            }
            Instr::Match { .. }
            | Instr::Match2 { .. }
            | Instr::Match3 { .. }
            | Instr::SetCapturedVar { .. } => {
                flags.insert(ScopeFlags::USES_BACKREF_OR_LASTLINE);
            }
            Instr::RuntimeHelperCall {
                helper: RuntimeHelper::IsDefinedBackref | RuntimeHelper::IsDefinedNthRef,
                ..
            } => flags.insert(ScopeFlags::USES_BACKREF_OR_LASTLINE),
            Instr::RecordEndBlock { .. } => flags.insert(ScopeFlags::HAS_END_BLOCKS),
            _ => {}
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

impl ScopeTree {
    /// Compute the flags of `id` and, first, of every nested closure.
    /// A no-op once computed, until invalidated.
    pub fn compute_scope_flags(&mut self, id: ScopeId) {
        if self[id].flags_computed {
            return;
        }

        let mut flags = self[id].flags;
        flags.remove(ScopeFlags::RECOMPUTED);
        if self[id].kind.binding_always_escapes() {
            flags.insert(ScopeFlags::BINDING_HAS_ESCAPED);
        }

        let closures = self[id].nested_closures.clone();
        for closure in closures {
            self.compute_scope_flags(closure);
            flags.absorb_closure(self[closure].flags);
        }

        for instr in self[id].instrs() {
            instr.compute_scope_flags(&mut flags);
        }
        flags.derive_requires_dynscope();

        let scope = &mut self[id];
        scope.flags = flags;
        scope.flags_computed = true;
        tracing::trace!(scope = id.raw(), ?flags, "computed scope flags");
    }

    /// Compute flags for every scope in the tree.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "scope counts are bounded far below u32::MAX"
    )]
    pub fn compute_all_scope_flags(&mut self) {
        for i in 0..self.len() {
            self.compute_scope_flags(ScopeId::new(i as u32));
        }
    }

    /// Mark `id` and its lexical ancestors stale (their flags fold `id`'s).
    pub fn invalidate_scope_flags(&mut self, id: ScopeId) {
        let chain: Vec<_> = self.ancestors(id).collect();
        for s in chain {
            self[s].invalidate_flags();
        }
    }
}
