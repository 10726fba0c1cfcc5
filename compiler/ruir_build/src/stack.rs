//! Stack growth for the recursive node dispatch.
//!
//! Syntax trees nest as deeply as their source does (long `elsif` chains,
//! generated code with thousands of chained calls). Every node routine
//! re-enters [`Builder::build`](crate::builder), so the dispatch entry
//! wraps itself in [`ensure_sufficient_stack`].
//!
//! - **Native targets**: `stacker` grows the stack on demand.
//! - **WASM targets**: passthrough.

/// Minimum stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM version - just call directly (WASM has its own stack management).
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

    use ruir_ast::{Node, NodeKind, StaticScope};
    use ruir_ir::{Instr, IrManager, Operand};

    use crate::{build_root, BuildConfig};

    #[test]
    fn deeply_nested_tree_builds() {
        let mut body = Node::new(NodeKind::Fixnum(7), 1);
        for _ in 0..5_000 {
            body = Node::new(NodeKind::Begin(Box::new(body)), 1);
        }
        let config = BuildConfig::new("deep.rb").with_line_numbers(false);
        let unit = build_root(&IrManager::new(), &config, &body, StaticScope::new()).unwrap();
        assert_eq!(
            unit.tree[unit.root].instrs().last(),
            Some(&Instr::Return(Operand::Fixnum(7)))
        );
    }
}
