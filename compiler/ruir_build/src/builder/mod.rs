//! The node-by-node translator.
//!
//! One [`Builder`] exists per scope being built. Entering a method, block,
//! class or module body creates a child builder with fresh loop, rescue and
//! ensure stacks, so no control-flow state leaks across scope boundaries.
//! Each submodule adds the routines for one family of nodes:
//!
//! - `dispatch`: the node-kind switch, statements, sequencing.
//! - `literals`: strings, numbers, arrays, hashes, ranges, regexps.
//! - `variables`: locals, instance/global/class variables, constants.
//! - `calls`: method calls, `yield`, `super`, block setup.
//! - `control`: conditionals, loops, jumps, flip-flops.
//! - `exceptions`: `rescue`/`ensure` regions and ensure splicing.
//! - `definitions`: nested scopes (methods, closures, class bodies).
//! - `args`: receipt of method and block parameters.
//! - `assign`: assignment targets, destructuring, compound assignment.
//! - `defined`: `defined?`.

mod args;
mod assign;
mod calls;
mod control;
mod defined;
mod definitions;
mod dispatch;
mod exceptions;
mod literals;
mod variables;

use ruir_ast::{ident, Ident, Node, StaticScope};
use ruir_ir::{
    Instr, IrManager, IrScope, Label, Operand, ScopeId, ScopeKind, ScopeTree, Variable,
};

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};

// Frames

/// An active `while`/`until` loop.
pub(crate) struct LoopFrame {
    pub(crate) start: Label,
    pub(crate) end: Label,
    /// Target of `redo`.
    pub(crate) iter_start: Label,
    /// Target of `next`.
    pub(crate) iter_end: Label,
    /// Value of the loop expression (`break v` writes it).
    pub(crate) result: Variable,
}

/// An active `begin/rescue`, pushed once its protected body is built.
pub(crate) struct RescueFrame {
    /// Where `retry` resumes.
    pub(crate) entry: Label,
    /// `$!` as it was before the protected body ran.
    pub(crate) saved_exception: Variable,
    /// Index into the loop stack at the time the rescue was opened.
    pub(crate) innermost_loop: Option<usize>,
    /// Index of the `ensure` this rescue is the body of.
    pub(crate) ensure: Option<usize>,
}

/// An active `begin/ensure`.
pub(crate) struct EnsureFrame {
    pub(crate) region_start: Label,
    /// Heads the ensure body's instructions.
    pub(crate) start: Label,
    pub(crate) end: Label,
    /// Handler that runs the ensure body on exceptional exit.
    pub(crate) dummy_rescue: Label,
    /// Set when the protected body is a `rescue`; spliced copies restore it.
    pub(crate) saved_exception: Option<Variable>,
    /// Rescuer active where the ensure was written; spliced copies run under it.
    pub(crate) body_rescuer: Label,
    pub(crate) innermost_loop: Option<usize>,
    /// The ensure body, built once and cloned at every exit.
    pub(crate) body: Vec<Instr>,
}

// Builder

pub(crate) struct Builder<'a> {
    manager: &'a IrManager,
    config: &'a BuildConfig,
    tree: &'a mut ScopeTree,
    /// Scope receiving instructions.
    scope: ScopeId,
    /// Scopes between this one and the unit root.
    nesting: u32,
    loops: Vec<LoopFrame>,
    rescues: Vec<RescueFrame>,
    ensures: Vec<EnsureFrame>,
    /// Side buffers for ensure bodies under construction. When non-empty,
    /// the innermost one receives every emitted instruction.
    ensure_sinks: Vec<Vec<Instr>>,
    /// Handler labels covering the code being emitted, innermost last.
    rescuers: Vec<Label>,
    /// The block passed to this scope, loaded on entry.
    yield_closure: Option<Variable>,
    /// Start of a closure body; target of a loop-less `redo`.
    closure_start: Option<Label>,
    last_line: Option<u32>,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(
        manager: &'a IrManager,
        config: &'a BuildConfig,
        tree: &'a mut ScopeTree,
        scope: ScopeId,
        nesting: u32,
    ) -> Self {
        Builder {
            manager,
            config,
            tree,
            scope,
            nesting,
            loops: Vec::new(),
            rescues: Vec::new(),
            ensures: Vec::new(),
            ensure_sinks: Vec::new(),
            rescuers: vec![unrescued_label()],
            yield_closure: None,
            closure_start: None,
            last_line: None,
        }
    }

    /// Run `f` with a fresh builder for the nested scope `scope`.
    fn build_nested<R>(
        &mut self,
        scope: ScopeId,
        f: impl FnOnce(&mut Builder<'_>) -> BuildResult<R>,
    ) -> BuildResult<R> {
        let nesting = self.nesting + 1;
        if nesting > self.config.max_scope_depth {
            return Err(BuildError::NestingTooDeep {
                limit: self.config.max_scope_depth,
                line: self.tree[scope].line,
            });
        }

        let mut child = Builder::new(self.manager, self.config, &mut *self.tree, scope, nesting);
        tracing::debug!(
            scope = scope.raw(),
            kind = child.tree[scope].kind.tag(),
            name = %child.tree[scope].name,
            line = child.tree[scope].line,
            "entering scope"
        );
        let result = f(&mut child)?;
        tracing::debug!(
            scope = scope.raw(),
            instrs = child.tree[scope].instrs().len(),
            "finished scope"
        );
        Ok(result)
    }

    /// Create a scope nested lexically in the current one.
    fn add_scope(
        &mut self,
        kind: ScopeKind,
        name: Ident,
        line: u32,
        mut static_scope: StaticScope,
    ) -> ScopeId {
        static_scope.set_scope_type(kind.tag());
        let scope = IrScope::new(
            kind,
            name,
            self.config.file_name.clone(),
            line,
            Some(self.scope),
            static_scope,
        );
        self.tree.add(scope)
    }

    // Emission

    /// Append to the active ensure sink, or to the scope.
    fn add_instr(&mut self, instr: Instr) {
        if let Some(sink) = self.ensure_sinks.last_mut() {
            sink.push(instr);
            return;
        }
        let scope = &mut self.tree[self.scope];
        let index = scope.add_instr(instr);
        if let Some(listener) = self.manager.listener() {
            listener.added_instr(scope, &scope.instrs()[index], index);
        }
    }

    /// Insert ahead of everything emitted so far.
    fn prepend_instr(&mut self, instr: Instr) {
        if let Some(sink) = self.ensure_sinks.last_mut() {
            sink.insert(0, instr);
            return;
        }
        self.tree[self.scope].prepend_instr(instr);
    }

    /// Emit the instruction `make` builds around a fresh temporary.
    fn emit_result(&mut self, make: impl FnOnce(Variable) -> Instr) -> Variable {
        let result = self.temp();
        self.add_instr(make(result.clone()));
        result
    }

    fn copy_and_return_value(&mut self, value: Operand) -> Operand {
        Operand::Variable(self.emit_result(|result| Instr::copy(result, value)))
    }

    /// `value` itself when already a temporary, else a copy of it.
    fn value_in_temp(&mut self, value: Operand) -> Variable {
        if let Operand::Variable(var @ Variable::Temp(_)) = &value {
            return var.clone();
        }
        self.emit_result(|result| Instr::copy(result, value))
    }

    // Allocation

    fn temp(&mut self) -> Variable {
        self.manager.new_temporary(&mut self.tree[self.scope])
    }

    fn new_label(&mut self) -> Label {
        self.tree[self.scope].new_default_label()
    }

    fn new_prefixed_label(&mut self, prefix: &str) -> Label {
        self.tree[self.scope].new_label(prefix)
    }

    fn current_scope_var(&mut self) -> Variable {
        Variable::Temp(self.tree[self.scope].current_scope_variable())
    }

    fn current_module_var(&mut self) -> Variable {
        Variable::Temp(self.tree[self.scope].current_module_variable())
    }

    /// The block passed to this scope.
    fn yield_closure(&mut self) -> Variable {
        if let Some(var) = &self.yield_closure {
            return var.clone();
        }
        let var = self.temp();
        self.yield_closure = Some(var.clone());
        var
    }

    // Scope queries

    fn kind(&self) -> &ScopeKind {
        &self.tree[self.scope].kind
    }

    fn current_loop(&self) -> Option<usize> {
        self.loops.len().checked_sub(1)
    }

    /// Name reported by `Trace` events: the enclosing method, else the scope.
    fn trace_name(&self) -> Ident {
        let owner = self.tree.nearest_method(self.scope).unwrap_or(self.scope);
        self.tree[owner].name.clone()
    }

    fn not_compilable(&self, node: &Node, reason: impl Into<String>) -> BuildError {
        BuildError::NotCompilable {
            kind: node.tag(),
            line: node.line(),
            file: self.config.file_name.clone(),
            reason: reason.into(),
        }
    }

    // Common scope prologues

    /// `%self = recv_self`, then load the incoming block.
    fn prepare_implicit_state(&mut self) {
        self.add_instr(Instr::ReceiveSelf(Variable::SelfVar));
        let block = self.yield_closure();
        if matches!(
            self.kind(),
            ScopeKind::Method { .. } | ScopeKind::MetaClassBody
        ) {
            self.add_instr(Instr::LoadImplicitClosure(block));
        } else {
            self.add_instr(Instr::LoadFrameClosure(block));
        }
    }

    /// `%current_scope` / `%current_module` for a scope that is its own
    /// module reference point.
    fn add_current_scope_and_module(&mut self) {
        let scope_var = self.current_scope_var();
        self.add_instr(Instr::copy(scope_var, Operand::CurrentScope(0)));
        let module_var = self.current_module_var();
        self.add_instr(Instr::copy(module_var, Operand::ScopeModule(0)));
    }

    fn thread_poll(&mut self) {
        if self.config.thread_poll {
            self.add_instr(Instr::ThreadPoll);
        }
    }
}

/// Rescuer of code no handler covers.
fn unrescued_label() -> Label {
    Label::new(ident("_UNRESCUED_REGION"), 0)
}

#[cfg(test)]
mod tests;
