//! Syntax tree to IR translation.
//!
//! The builder walks a [`ruir_ast::Node`] tree and fills a [`ScopeTree`]
//! with one [`IrScope`](ruir_ir::IrScope) per lexical unit (script, method,
//! block, class body, ...), each holding a linear instruction list.
//!
//! # Entry Points
//!
//! - [`build_root`]: a whole file, producing a fresh tree rooted at a
//!   script scope.
//! - [`build_eval_root`]: code evaluated against an existing binding,
//!   attached to an already-built tree.
//!
//! Both take the per-run [`IrManager`] and a [`BuildConfig`]. A build either
//! completes or fails with a [`BuildError`]; no partial tree is returned.
//!
//! # Tracing
//!
//! Scope entry/exit and ensure splicing are reported through `tracing`.
//! Call [`init_tracing`] once to print them hierarchically when `RUST_LOG`
//! is set.

mod builder;
pub mod config;
pub mod error;
pub mod stack;

use std::sync::Once;

use ruir_ast::{ident, Node, StaticScope};
use ruir_ir::{IrManager, IrScope, ScopeId, ScopeKind, ScopeTree};

pub use config::BuildConfig;
pub use error::{BuildError, BuildResult};

use builder::Builder;

static TRACING_INIT: Once = Once::new();

/// Install a hierarchical `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset, and nothing after the first call.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            use tracing_subscriber::prelude::*;
            use tracing_subscriber::EnvFilter;

            tracing_subscriber::registry()
                .with(tracing_tree::HierarchicalLayer::new(2))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

/// A built compilation unit.
#[derive(Debug)]
pub struct BuiltUnit {
    pub tree: ScopeTree,
    /// The script scope everything else nests under.
    pub root: ScopeId,
}

/// Build a whole file.
///
/// `static_scope` is the parser's descriptor for the file's top-level
/// variables. Every scope in the returned tree has its flags computed.
pub fn build_root(
    manager: &IrManager,
    config: &BuildConfig,
    body: &Node,
    static_scope: StaticScope,
) -> BuildResult<BuiltUnit> {
    let mut tree = ScopeTree::new();
    let script = IrScope::new(
        ScopeKind::Script {
            begin_blocks: Vec::new(),
        },
        config.file_name.clone(),
        config.file_name.clone(),
        0,
        None,
        static_scope,
    );
    let root = tree.add(script);
    tracing::debug!(file = %config.file_name, "building script");

    Builder::new(manager, config, &mut tree, root, 0).build_script_body(body)?;
    // class and module bodies are never computed while building, and
    // methods are left stale after their handlers are added
    tree.compute_all_scope_flags();
    Ok(BuiltUnit { tree, root })
}

/// Build code evaluated against an existing binding.
///
/// The eval scope is added to `tree` as a lexical child of `caller` (or as
/// a detached root when `caller` is `None`). Locals it cannot find in its
/// own frame are created at the depth the parser assigned them, so they
/// resolve against the caller's binding at runtime. Flags are computed for
/// every scope in `tree` on success.
pub fn build_eval_root(
    manager: &IrManager,
    config: &BuildConfig,
    tree: &mut ScopeTree,
    caller: Option<ScopeId>,
    body: &Node,
    static_scope: StaticScope,
) -> BuildResult<ScopeId> {
    let scope = IrScope::new(
        ScopeKind::EvalScript,
        ident("(eval)"),
        config.file_name.clone(),
        body.line(),
        caller,
        static_scope,
    );
    let id = tree.add(scope);
    tracing::debug!(scope = id.raw(), line = body.line(), "building eval");

    let nesting = match caller {
        Some(parent) => {
            let depth = tree.ancestors(parent).count();
            u32::try_from(depth).unwrap_or(u32::MAX)
        }
        None => 0,
    };
    Builder::new(manager, config, tree, id, nesting).build_eval_body(body)?;
    tree.compute_all_scope_flags();
    Ok(id)
}
