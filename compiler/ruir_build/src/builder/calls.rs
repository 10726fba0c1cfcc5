//! Method calls, attribute assignment, `yield` and `super`.
//!
//! The receiver is always built before the arguments, and the arguments
//! before the block, so side effects happen in source order.

use ruir_ast::{Ident, Node, NodeKind};
use ruir_ir::{
    CallArgs, CallInstr, CallKind, Instr, Operand, ScopeFlags, ScopeId, ScopeKind, Variable,
};
use smallvec::smallvec;

use super::dispatch::contains_variable_assignment;
use super::Builder;
use crate::error::BuildResult;

/// Key of the `**rest` entry in a forwarded keyword hash.
const KW_REST_DUMMY: &str = "**";

impl Builder<'_> {
    // Calls

    pub(super) fn build_call(
        &mut self,
        node: &Node,
        receiver: &Node,
        name: &Ident,
        args: Option<&Node>,
        iter: Option<&Node>,
    ) -> BuildResult<Operand> {
        if let (NodeKind::Str(text), "freeze") = (&receiver.kind, &**name) {
            return Ok(Operand::FrozenString(text.clone()));
        }

        let receiver_value = self.build_with_order(receiver, contains_variable_assignment(node))?;
        let args = self.build_call_args(args)?;
        let closure = self.setup_call_closure(iter)?;
        let proc_new = &**name == "new" && matches!(&receiver.kind, NodeKind::Const(c) if &**c == "Proc");

        let result = self.temp();
        let call = self.call_instr(
            CallKind::Normal,
            result.clone(),
            name,
            receiver_value,
            args,
            closure.clone(),
            proc_new,
        );
        self.receive_break_exception(closure.as_ref(), |b| {
            b.add_instr(call);
            result.clone()
        });
        Ok(Operand::Variable(result))
    }

    pub(super) fn build_fcall(
        &mut self,
        name: &Ident,
        args: Option<&Node>,
        iter: Option<&Node>,
    ) -> BuildResult<Operand> {
        let args = self.build_call_args(args)?;
        let closure = self.setup_call_closure(iter)?;
        self.determine_if_maybe_using(name, &args);

        let result = self.temp();
        let call = self.call_instr(
            CallKind::Functional,
            result.clone(),
            name,
            Operand::self_value(),
            args,
            closure.clone(),
            false,
        );
        self.receive_break_exception(closure.as_ref(), |b| {
            b.add_instr(call);
            result.clone()
        });
        Ok(Operand::Variable(result))
    }

    pub(super) fn build_vcall(&mut self, name: &Ident) -> Operand {
        let result = self.temp();
        let call = self.call_instr(
            CallKind::Variable,
            result.clone(),
            name,
            Operand::self_value(),
            CallArgs::new(),
            None,
            false,
        );
        self.add_instr(call);
        Operand::Variable(result)
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors the CallInstr fields")]
    pub(super) fn call_instr(
        &self,
        kind: CallKind,
        result: Variable,
        name: &Ident,
        receiver: Operand,
        args: CallArgs,
        closure: Option<Operand>,
        proc_new: bool,
    ) -> Instr {
        Instr::Call(Box::new(CallInstr {
            result,
            kind,
            name: name.clone(),
            receiver,
            args,
            closure,
            proc_new,
            potentially_refined: self.tree[self.scope].has_flag(ScopeFlags::MAYBE_USING_REFINEMENTS),
        }))
    }

    /// `using Mod` outside a method may activate refinements for the rest
    /// of the scope.
    fn determine_if_maybe_using(&mut self, name: &str, args: &CallArgs) {
        let outer = self.tree.nearest_top_local_variable_scope(self.scope);
        if name == "using" && !self.tree[outer].kind.is_method() && args.len() == 1 {
            self.tree[self.scope].set_flag(ScopeFlags::MAYBE_USING_REFINEMENTS);
        }
    }

    /// Positional arguments of a call. A splatted or concatenated list
    /// becomes one `Splat` operand.
    pub(super) fn build_call_args(&mut self, args: Option<&Node>) -> BuildResult<CallArgs> {
        let Some(args) = args else {
            return Ok(CallArgs::new());
        };
        match &args.kind {
            NodeKind::ArgsCat { .. } | NodeKind::ArgsPush { .. } => {
                let value = self.build(args)?;
                Ok(smallvec![Operand::Splat(Box::new(value))])
            }
            NodeKind::Array(elements) => {
                let ordered = contains_variable_assignment(args);
                let mut built = CallArgs::with_capacity(elements.len());
                for element in elements {
                    built.push(self.build_with_order(element, ordered)?);
                }
                Ok(built)
            }
            NodeKind::Splat(inner) => {
                let value = self.build_splat(inner)?;
                Ok(smallvec![Operand::Splat(Box::new(value))])
            }
            _ => Err(self.not_compilable(args, "invalid node for call args")),
        }
    }

    /// The block of a call: a literal block or a `&blk` argument.
    pub(super) fn setup_call_closure(&mut self, iter: Option<&Node>) -> BuildResult<Option<Operand>> {
        let Some(iter) = iter else {
            return Ok(None);
        };
        match &iter.kind {
            NodeKind::Iter { .. } => Ok(Some(self.build(iter)?)),
            NodeKind::BlockPass(body) => Ok(Some(self.build(body)?)),
            _ => Err(self.not_compilable(iter, "non-block, non-blockpass iter node")),
        }
    }

    // Attribute assignment

    /// `recv.name = v` / `recv[i] = v`. The value of the expression is the
    /// last argument.
    pub(super) fn build_attr_assign(
        &mut self,
        node: &Node,
        receiver: &Node,
        name: &Ident,
        args: Option<&Node>,
    ) -> BuildResult<Operand> {
        let ordered = contains_variable_assignment(node);
        let receiver = self.build_with_order(receiver, ordered)?;
        let mut built = CallArgs::new();
        let last = self.build_attr_assign_args(&mut built, args, ordered)?;
        self.add_instr(Instr::AttrAssign {
            receiver,
            name: name.clone(),
            args: built,
        });
        Ok(last)
    }

    fn build_attr_assign_args(
        &mut self,
        built: &mut CallArgs,
        args: Option<&Node>,
        ordered: bool,
    ) -> BuildResult<Operand> {
        let Some(args) = args else {
            return Ok(self.manager.nil());
        };
        match &args.kind {
            NodeKind::Array(elements) => {
                let mut last = self.manager.nil();
                for element in elements {
                    last = self.build_with_order(element, ordered)?;
                    built.push(last.clone());
                }
                Ok(last)
            }
            NodeKind::ArgsPush { first, second } => {
                let first = self.build(first)?;
                let second = self.build(second)?;
                let array = self.emit_result(|result| Instr::BuildCompoundArray {
                    result,
                    first,
                    second: second.clone(),
                    is_push: true,
                });
                built.push(Operand::Splat(Box::new(Operand::Variable(array))));
                Ok(second)
            }
            NodeKind::Splat(inner) => {
                let splat = Operand::Splat(Box::new(self.build_splat(inner)?));
                built.push(splat.clone());
                Ok(splat)
            }
            _ => Err(self.not_compilable(args, "invalid node for attrassign call args")),
        }
    }

    /// Attribute assignment as the target of an assignment whose value is
    /// already built.
    pub(super) fn build_attr_assign_assignment(
        &mut self,
        receiver: &Node,
        name: &Ident,
        args: Option<&Node>,
        value: Operand,
    ) -> BuildResult<Operand> {
        let receiver = self.build(receiver)?;
        let mut args = self.build_call_args(args)?;
        args.push(value.clone());
        self.add_instr(Instr::AttrAssign {
            receiver,
            name: name.clone(),
            args,
        });
        Ok(value)
    }

    // Yield

    pub(super) fn build_yield(&mut self, arg: Option<&Node>, expanded: bool) -> BuildResult<Operand> {
        let (arg, unwrap) = match arg {
            Some(Node {
                kind: NodeKind::Array(elements),
                ..
            }) if elements.len() == 1 => (Some(&elements[0]), false),
            other => (other, expanded),
        };
        let arg = match arg {
            Some(arg) => Some(self.build(arg)?),
            None => None,
        };
        let block = Operand::Variable(self.yield_closure());
        let result = self.emit_result(|result| Instr::Yield {
            result,
            block,
            arg,
            unwrap,
        });
        Ok(Operand::Variable(result))
    }

    // Super

    pub(super) fn build_super(&mut self, args: Option<&Node>, iter: Option<&Node>) -> BuildResult<Operand> {
        if self.kind().is_module_body() {
            return Ok(self.build_super_in_module_body());
        }
        let args = self.build_call_args(args)?;
        let closure = match self.setup_call_closure(iter)? {
            Some(closure) => closure,
            None => Operand::Variable(self.yield_closure()),
        };
        Ok(Operand::Variable(self.build_super_instr(closure, args)))
    }

    fn build_super_in_module_body(&mut self) -> Operand {
        let result = self.emit_result(|result| Instr::UnresolvedSuper {
            result,
            receiver: Operand::self_value(),
            args: CallArgs::new(),
            closure: None,
        });
        Operand::Variable(result)
    }

    /// A method directly inside a class body knows its defining module;
    /// anything else resolves the super target at runtime.
    fn build_super_instr(&mut self, closure: Operand, args: CallArgs) -> Variable {
        let result = self.temp();
        let in_class_body = self.tree[self.scope]
            .parent
            .is_some_and(|p| matches!(self.tree[p].kind, ScopeKind::ClassBody));
        let method_instance = match self.kind() {
            ScopeKind::Method { instance } if in_class_body => Some(*instance),
            _ => None,
        };
        let instr = match method_instance {
            Some(instance) => {
                let defining_module = Operand::Variable(self.current_module_var());
                let name = self.tree[self.scope].name.clone();
                let closure = Some(closure.clone());
                if instance {
                    Instr::InstanceSuper {
                        result: result.clone(),
                        defining_module,
                        name,
                        args,
                        closure,
                    }
                } else {
                    Instr::ClassSuper {
                        result: result.clone(),
                        defining_module,
                        name,
                        args,
                        closure,
                    }
                }
            }
            None => Instr::UnresolvedSuper {
                result: result.clone(),
                receiver: Operand::self_value(),
                args,
                closure: Some(closure.clone()),
            },
        };
        self.receive_break_exception(Some(&closure), |b| {
            b.add_instr(instr);
            result
        })
    }

    /// Bare `super`: forward the arguments the enclosing method (or block
    /// turned method) received.
    pub(super) fn build_zsuper(&mut self, iter: Option<&Node>) -> BuildResult<Operand> {
        if self.kind().is_module_body() {
            return Ok(self.build_super_in_module_body());
        }
        let closure = match self.setup_call_closure(iter)? {
            Some(closure) => closure,
            None => Operand::Variable(self.yield_closure()),
        };

        if self.kind().is_method() {
            let args = self.received_args(self.scope);
            return Ok(Operand::Variable(self.build_super_instr(closure, args)));
        }
        let result =
            self.receive_break_exception(Some(&closure), |b| b.build_zsuper_if_nested(&closure));
        Ok(Operand::Variable(result))
    }

    /// `super` inside blocks: any enclosing block may have become a method
    /// through `define_method`, so emit one candidate per enclosing frame
    /// and pick by the runtime argument-scope depth.
    fn build_zsuper_if_nested(&mut self, closure: &Operand) -> Variable {
        let scope_depth = self.emit_result(Instr::ArgScopeDepth);
        let all_done = self.new_label();
        let result = self.temp();

        let mut next = None;
        let mut terminal = None;
        let chain: Vec<ScopeId> = self.tree.ancestors(self.scope).collect();
        for candidate in chain {
            let kind = &self.tree[candidate].kind;
            if kind.is_for() {
                continue;
            }
            if !kind.is_closure() {
                terminal = Some(candidate);
                break;
            }
            if let Some(label) = next.take() {
                self.add_instr(Instr::Label(label));
            }
            let label = self.new_label();
            let depth = self.tree.frame_depth(self.scope, candidate);
            self.add_instr(Instr::bne(
                Operand::Fixnum(i64::from(depth)),
                Operand::Variable(scope_depth.clone()),
                label.clone(),
            ));
            next = Some(label);
            let args = self.received_args_at_depth(candidate, depth);
            self.add_instr(Instr::ZSuper {
                result: result.clone(),
                receiver: Operand::self_value(),
                args,
                closure: Some(closure.clone()),
            });
            self.add_instr(Instr::Jump(all_done.clone()));
        }

        if let Some(label) = next {
            self.add_instr(Instr::Label(label));
        }
        if let Some(method) = terminal.filter(|&m| self.tree[m].kind.is_method()) {
            let depth = self.tree.frame_depth(self.scope, method);
            let args = self.received_args_at_depth(method, depth);
            self.add_instr(Instr::ZSuper {
                result: result.clone(),
                receiver: Operand::self_value(),
                args,
                closure: Some(closure.clone()),
            });
        }
        self.add_instr(Instr::Label(all_done));
        result
    }

    fn received_args_at_depth(&self, scope: ScopeId, depth: u32) -> CallArgs {
        self.received_args(scope)
            .iter()
            .map(|arg| adjust_depth(arg, depth))
            .collect()
    }

    /// The arguments `scope` received, read back from its receive
    /// instructions. Keywords are collected into a trailing hash with any
    /// `**rest` first.
    fn received_args(&self, scope: ScopeId) -> CallArgs {
        let mut args = CallArgs::new();
        let mut keywords: Vec<(Operand, Operand)> = Vec::new();
        for instr in self.tree[scope].instrs() {
            match instr {
                Instr::ReceiveKeywordRestArg { result, .. } => {
                    keywords.insert(
                        0,
                        (Operand::symbol(KW_REST_DUMMY), Operand::Variable(result.clone())),
                    );
                }
                Instr::ReceiveKeywordArg { result, name, .. } => {
                    keywords.push((Operand::symbol(name), Operand::Variable(result.clone())));
                }
                Instr::ReceiveRestArg { result, .. } => {
                    args.push(Operand::Splat(Box::new(Operand::Variable(result.clone()))));
                }
                Instr::ReceivePreReqdArg { result, .. }
                | Instr::ReceiveOptArg { result, .. }
                | Instr::ReceivePostReqdArg { result, .. } => {
                    args.push(Operand::Variable(result.clone()));
                }
                _ => {}
            }
        }
        if self.tree[scope].has_flag(ScopeFlags::RECEIVES_KEYWORD_ARGS) {
            args.push(Operand::Hash(keywords));
        }
        args
    }
}

/// `arg` as seen `depth` frames below the scope that received it.
fn adjust_depth(arg: &Operand, depth: u32) -> Operand {
    match arg {
        Operand::Variable(Variable::Local(local)) => {
            Operand::Variable(Variable::Local(local.clone_for_depth(depth)))
        }
        Operand::Splat(inner) => Operand::Splat(Box::new(adjust_depth(inner, depth))),
        Operand::Hash(pairs) => Operand::Hash(
            pairs
                .iter()
                .map(|(k, v)| (k.clone(), adjust_depth(v, depth)))
                .collect(),
        ),
        other => other.clone(),
    }
}
