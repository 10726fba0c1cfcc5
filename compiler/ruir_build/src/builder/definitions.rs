//! Nested scopes: script and eval roots, methods, class and module bodies,
//! blocks, lambdas, `for` bodies and `BEGIN`/`END` blocks.
//!
//! Each definition creates its scope in the tree, emits the defining
//! instruction into the current scope and builds the body with a fresh
//! child builder.

use ruir_ast::{ident, ArgsNode, Ident, Node, NodeKind, StaticScope};
use ruir_ir::{
    CallArgs, CallKind, ClosureInfo, Instr, Operand, ScopeFlags, ScopeId, ScopeKind, TraceEvent,
};

use super::Builder;
use crate::error::BuildResult;

/// Name given to every `class << obj` body.
const METACLASS_BODY_NAME: &str = "__singleton__";

impl Builder<'_> {
    // Roots

    pub(crate) fn build_script_body(&mut self, body: &Node) -> BuildResult<()> {
        self.prepare_implicit_state();
        self.add_current_scope_and_module();
        let value = self.build(body)?;
        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::Return(value));
        }
        self.tree.compute_scope_flags(self.scope);
        Ok(())
    }

    pub(crate) fn build_eval_body(&mut self, body: &Node) -> BuildResult<()> {
        let line = self.tree[self.scope].line;
        self.add_instr(Instr::LineNumber(line));
        self.prepare_implicit_state();
        self.add_current_scope_and_module();
        let value = self.build(body)?;
        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::Return(value));
        }
        self.tree.compute_scope_flags(self.scope);
        Ok(())
    }

    // Methods

    pub(super) fn build_defn(
        &mut self,
        node: &Node,
        name: &Ident,
        args: &ArgsNode,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let method = self.define_new_method(node, name, args, body, static_scope, true)?;
        self.add_instr(Instr::DefineInstanceMethod(method));
        Ok(Operand::Symbol(name.clone()))
    }

    pub(super) fn build_defs(
        &mut self,
        node: &Node,
        receiver: &Node,
        name: &Ident,
        args: &ArgsNode,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let object = self.build(receiver)?;
        let method = self.define_new_method(node, name, args, body, static_scope, false)?;
        self.add_instr(Instr::DefineClassMethod { object, method });
        Ok(Operand::Symbol(name.clone()))
    }

    fn define_new_method(
        &mut self,
        node: &Node,
        name: &Ident,
        args: &ArgsNode,
        body: Option<&Node>,
        static_scope: &StaticScope,
        instance: bool,
    ) -> BuildResult<ScopeId> {
        let module_depth = self
            .tree
            .nearest_module_referencing_depth(self.scope)
            .unwrap_or(1);
        let method = self.add_scope(
            ScopeKind::Method { instance },
            name.clone(),
            node.line(),
            static_scope.clone(),
        );
        self.build_nested(method, |b| b.define_method_inner(args, body, module_depth))?;
        Ok(method)
    }

    fn define_method_inner(
        &mut self,
        args: &ArgsNode,
        body: Option<&Node>,
        module_depth: u32,
    ) -> BuildResult<()> {
        if self.config.full_trace {
            let line = self.tree[self.scope].line;
            self.trace(TraceEvent::Call, i64::from(line));
        }
        self.prepare_implicit_state();

        let scope_var = self.current_scope_var();
        self.add_instr(Instr::copy(scope_var, Operand::CurrentScope(module_depth)));
        let module_var = self.current_module_var();
        self.add_instr(Instr::copy(module_var, Operand::ScopeModule(module_depth)));

        self.receive_method_args(args)?;

        let value = self.build_or_nil(body)?;
        if self.config.full_trace {
            self.trace(TraceEvent::Return, -1);
        }
        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::Return(value));
        }

        self.tree.compute_scope_flags(self.scope);
        if self.tree[self.scope].has_flag(ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS) {
            self.handle_nonlocal_return_in_method();
        }
        self.tree[self.scope].invalidate_flags();
        Ok(())
    }

    fn trace(&mut self, event: TraceEvent, line: i64) {
        let name = self.trace_name();
        self.add_instr(Instr::Trace {
            event,
            name,
            file: self.config.file_name.clone(),
            line,
        });
    }

    // Class, module and metaclass bodies

    pub(super) fn build_class(
        &mut self,
        node: &Node,
        cpath: &Node,
        superclass: Option<&Node>,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let superclass = match superclass {
            Some(superclass) => self.build(superclass)?,
            None => Operand::Undefined,
        };
        let name = self.cpath_name(cpath)?;
        let container = self.container_from_cpath(cpath)?;
        let class_body = self.add_scope(ScopeKind::ClassBody, name, node.line(), static_scope.clone());
        let class = self.emit_result(|result| Instr::DefineClass {
            result,
            body: class_body,
            container,
            superclass,
        });
        let processed = self.emit_result(|result| Instr::ProcessModuleBody {
            result,
            module: Operand::Variable(class),
            block: Operand::NullBlock,
        });
        self.build_nested(class_body, |b| b.build_module_or_class_body(body))?;
        Ok(Operand::Variable(processed))
    }

    pub(super) fn build_module(
        &mut self,
        node: &Node,
        cpath: &Node,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let name = self.cpath_name(cpath)?;
        let container = self.container_from_cpath(cpath)?;
        let module_body =
            self.add_scope(ScopeKind::ModuleBody, name, node.line(), static_scope.clone());
        let module = self.emit_result(|result| Instr::DefineModule {
            result,
            body: module_body,
            container,
        });
        let processed = self.emit_result(|result| Instr::ProcessModuleBody {
            result,
            module: Operand::Variable(module),
            block: Operand::NullBlock,
        });
        self.build_nested(module_body, |b| b.build_module_or_class_body(body))?;
        Ok(Operand::Variable(processed))
    }

    /// `class << obj`. The body sees the block of the scope it is written in.
    pub(super) fn build_sclass(
        &mut self,
        node: &Node,
        receiver: &Node,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let object = self.build(receiver)?;
        let meta_body = self.add_scope(
            ScopeKind::MetaClassBody,
            ident(METACLASS_BODY_NAME),
            node.line(),
            static_scope.clone(),
        );
        let meta = self.emit_result(|result| Instr::DefineMetaClass {
            result,
            object,
            body: meta_body,
        });
        let block = Operand::Variable(self.yield_closure());
        let processed = self.emit_result(|result| Instr::ProcessModuleBody {
            result,
            module: Operand::Variable(meta),
            block,
        });
        self.build_nested(meta_body, |b| b.build_module_or_class_body(body))?;
        Ok(Operand::Variable(processed))
    }

    fn build_module_or_class_body(&mut self, body: Option<&Node>) -> BuildResult<()> {
        if self.config.full_trace {
            let line = self.tree[self.scope].line;
            self.trace(TraceEvent::Class, i64::from(line));
        }
        self.prepare_implicit_state();
        self.add_current_scope_and_module();
        let value = self.build_or_nil(body)?;
        if self.config.full_trace {
            self.trace(TraceEvent::End, -1);
        }
        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::Return(value));
        }
        Ok(())
    }

    /// Name a class or module is defined under: the last path segment.
    fn cpath_name(&self, cpath: &Node) -> BuildResult<Ident> {
        match &cpath.kind {
            NodeKind::Colon2 { name, .. } | NodeKind::Colon3(name) | NodeKind::Const(name) => {
                Ok(name.clone())
            }
            _ => Err(self.not_compilable(cpath, "class path is not a constant")),
        }
    }

    /// Module a class or module path defines into.
    fn container_from_cpath(&mut self, cpath: &Node) -> BuildResult<Operand> {
        match &cpath.kind {
            NodeKind::Colon2 {
                left: Some(left), ..
            } => self.build(left),
            NodeKind::Colon2 { left: None, .. } | NodeKind::Const(_) => {
                Ok(self.find_container_module())
            }
            NodeKind::Colon3(_) => Ok(Operand::ObjectClass),
            _ => Err(self.not_compilable(cpath, "class path is not a constant")),
        }
    }

    // Closures

    fn add_closure_scope(
        &mut self,
        prefix: &str,
        line: u32,
        static_scope: &StaticScope,
        make: impl FnOnce(ClosureInfo) -> ScopeKind,
        is_lambda: bool,
    ) -> ScopeId {
        let closure_id = self.tree[self.scope].next_closure_id();
        let name = ident(&format!("{prefix}{closure_id}"));
        let kind = make(ClosureInfo {
            closure_id,
            is_lambda,
        });
        self.add_scope(kind, name, line, static_scope.clone())
    }

    fn wrap_closure(closure: ScopeId) -> Operand {
        Operand::WrappedClosure {
            self_value: Box::new(Operand::self_value()),
            closure,
        }
    }

    /// A `do … end` / `{ … }` block.
    pub(super) fn build_iter(
        &mut self,
        node: &Node,
        params: Option<&ArgsNode>,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let closure =
            self.add_closure_scope("_CLOSURE_", node.line(), static_scope, ScopeKind::Closure, false);
        self.build_nested(closure, |b| b.build_iter_inner(params, body))?;
        Ok(Self::wrap_closure(closure))
    }

    fn build_iter_inner(&mut self, params: Option<&ArgsNode>, body: Option<&Node>) -> BuildResult<()> {
        self.prepare_implicit_state();
        if let Some(params) = params {
            self.receive_block_args(params)?;
        }
        self.add_current_scope_and_module();
        self.mark_closure_start();
        self.thread_poll();

        let value = self.build_or_nil(body)?;
        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::Return(value));
        }
        // a proc may be turned into a lambda after the fact
        self.handle_break_and_returns_in_lambda();
        Ok(())
    }

    /// Start label of a closure body; a loop-less `redo` jumps here.
    fn mark_closure_start(&mut self) {
        let prefix = format!("{}_START", self.tree[self.scope].name);
        let start = self.new_prefixed_label(&prefix);
        self.add_instr(Instr::Label(start.clone()));
        self.closure_start = Some(start);
    }

    /// `->(params) { body }`
    pub(super) fn build_lambda(
        &mut self,
        node: &Node,
        params: &ArgsNode,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let closure =
            self.add_closure_scope("_LAMBDA_", node.line(), static_scope, ScopeKind::Closure, true);
        self.build_nested(closure, |b| b.build_lambda_inner(params, body))?;
        let body = Self::wrap_closure(closure);
        Ok(Operand::Variable(self.emit_result(|result| Instr::BuildLambda {
            result,
            closure: body,
        })))
    }

    fn build_lambda_inner(&mut self, params: &ArgsNode, body: Option<&Node>) -> BuildResult<()> {
        self.prepare_implicit_state();
        self.add_current_scope_and_module();
        self.receive_block_args(params)?;
        let value = self.build_or_nil(body)?;
        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::Return(value));
        }
        self.handle_break_and_returns_in_lambda();
        Ok(())
    }

    /// `for var in iter; body; end`: `iter.each` with a body closure that
    /// shares the enclosing variable frame.
    pub(super) fn build_for(
        &mut self,
        node: &Node,
        var: &Node,
        iter: &Node,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let receiver = self.build(iter)?;
        let closure =
            self.add_closure_scope("_FOR_LOOP_", node.line(), static_scope, ScopeKind::For, false);
        self.build_nested(closure, |b| b.build_for_inner(var, body))?;
        let block = Self::wrap_closure(closure);

        let result = self.temp();
        let call = self.call_instr(
            CallKind::Normal,
            result.clone(),
            &ident("each"),
            receiver,
            CallArgs::new(),
            Some(block.clone()),
            false,
        );
        let result = self.receive_break_exception(Some(&block), |b| {
            b.add_instr(call);
            result
        });
        Ok(Operand::Variable(result))
    }

    fn build_for_inner(&mut self, var: &Node, body: Option<&Node>) -> BuildResult<()> {
        self.prepare_implicit_state();
        self.receive_for_args(var)?;
        self.add_current_scope_and_module();
        self.mark_closure_start();
        self.thread_poll();

        let value = self.build_or_nil(body)?;
        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::Return(value));
        }
        Ok(())
    }

    // BEGIN and END

    /// `END { … }`: registered to run at exit, once, however often the
    /// statement itself executes.
    pub(super) fn build_post_exe(
        &mut self,
        node: &Node,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let closure_id = self.tree[self.scope].next_closure_id();
        let closure = self.add_scope(
            ScopeKind::Closure(ClosureInfo {
                closure_id,
                is_lambda: true,
            }),
            ident("_END_"),
            node.line(),
            static_scope.clone(),
        );
        self.build_nested(closure, |b| b.build_pre_post_exe_inner(body))?;
        self.add_instr(Instr::RecordEndBlock {
            closure: Self::wrap_closure(closure),
        });
        let top = self.tree.top_level_scope(self.scope);
        self.tree[top].set_flag(ScopeFlags::HAS_END_BLOCKS);
        Ok(self.manager.nil())
    }

    /// `BEGIN { … }`: a body the script root runs before anything else.
    pub(super) fn build_pre_exe(
        &mut self,
        node: &Node,
        body: Option<&Node>,
        static_scope: &StaticScope,
    ) -> BuildResult<Operand> {
        let closure_id = self.tree[self.scope].next_closure_id();
        let closure = self.add_scope(
            ScopeKind::For(ClosureInfo {
                closure_id,
                is_lambda: false,
            }),
            ident("_BEGIN_"),
            node.line(),
            static_scope.clone(),
        );
        self.build_nested(closure, |b| b.build_pre_post_exe_inner(body))?;
        let top = self.tree.top_level_scope(self.scope);
        self.tree.add_begin_block(top, closure);
        Ok(self.manager.nil())
    }

    fn build_pre_post_exe_inner(&mut self, body: Option<&Node>) -> BuildResult<()> {
        self.add_current_scope_and_module();
        self.build_or_nil(body)?;
        let nil = self.manager.nil();
        self.add_instr(Instr::Return(nil));
        Ok(())
    }
}
