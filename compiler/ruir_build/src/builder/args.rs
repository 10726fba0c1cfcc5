//! Receipt of method, block and lambda parameters, and destructuring of
//! nested parameter patterns.
//!
//! Parameters are received in declaration order: required (pre),
//! optional, rest, required (post), keywords, keyword rest, block. Each
//! lands in a fresh local of the receiving scope; `for` loop variables are
//! the exception and bind in the enclosing frame.

use ruir_ast::{ident, ArgItem, ArgsNode, Ident, MasgnRest, MultipleAsgnPattern, Node, NodeKind};
use ruir_ir::{ArgDescriptor, ArgKind, Instr, Operand, ScopeFlags, Variable};

use super::Builder;
use crate::error::{BuildError, BuildResult};

/// Local receiving an anonymous `*`.
const ANON_REST: &str = "*";
/// Local receiving an anonymous `**`.
const ANON_KEYWORD_REST: &str = "**";

/// Where a positional parameter sits in the incoming list.
#[derive(Copy, Clone)]
enum Position {
    Pre { index: u32 },
    Post { index: u32, pre: u32, post: u32 },
}

/// Slot of one destructuring target in the array being destructured.
#[derive(Copy, Clone)]
pub(super) struct Element {
    pre_count: Option<u32>,
    post_count: Option<u32>,
    index: u32,
    splat: bool,
}

impl Element {
    pub(super) fn pre(index: u32) -> Self {
        Element {
            pre_count: None,
            post_count: None,
            index,
            splat: false,
        }
    }

    pub(super) fn rest(pre_count: u32, post_count: u32) -> Self {
        Element {
            pre_count: Some(pre_count),
            post_count: Some(post_count),
            index: 0,
            splat: true,
        }
    }

    pub(super) fn post(pre_count: u32, post_count: u32, index: u32) -> Self {
        Element {
            pre_count: Some(pre_count),
            post_count: Some(post_count),
            index,
            splat: false,
        }
    }

    pub(super) fn extract(self, result: Variable, array: Operand) -> Instr {
        if self.splat {
            Instr::RestArgMultipleAsgn {
                result,
                array,
                pre_count: self.pre_count.unwrap_or(0),
                post_count: self.post_count.unwrap_or(0),
                index: self.index,
            }
        } else {
            Instr::ReqdArgMultipleAsgn {
                result,
                array,
                pre_count: self.pre_count,
                post_count: self.post_count,
                index: self.index,
            }
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "parameter lists are far shorter than u32::MAX"
)]
pub(super) fn count(n: usize) -> u32 {
    n as u32
}

impl Builder<'_> {
    // Entry points

    pub(super) fn receive_method_args(&mut self, args: &ArgsNode) -> BuildResult<()> {
        self.receive_args(args)
    }

    pub(super) fn receive_block_args(&mut self, params: &ArgsNode) -> BuildResult<()> {
        self.receive_args(params)
    }

    /// Arity bookkeeping, the arity check, then every parameter in order.
    /// Methods always check arity; blocks only when they take keywords.
    fn receive_args(&mut self, args: &ArgsNode) -> BuildResult<()> {
        let pre = count(args.pre_count());
        let post = count(args.post_count());
        let required = pre + post;
        let optional = count(args.optional_count());
        let rest = args.has_rest();
        let is_method = self.kind().is_method();

        self.tree[self.scope]
            .static_scope
            .set_arities(required, optional, rest);
        if is_method || args.has_keywords() {
            self.add_instr(Instr::CheckArity {
                required,
                optional,
                rest,
                receives_keywords: args.has_keywords(),
                keyword_rest: args.keyword_rest.is_some(),
            });
        }

        let mut arg_index = 0;
        for item in &args.pre {
            self.receive_required_arg(item, Position::Pre { index: arg_index })?;
            arg_index += 1;
        }

        for (j, opt) in args.optional.iter().enumerate() {
            let var = self.argument_result(&opt.name);
            self.describe(ArgKind::Opt, Some(&opt.name));
            self.add_instr(Instr::ReceiveOptArg {
                result: var.clone(),
                required,
                pre,
                index: count(j),
            });
            let assigned = self.new_label();
            self.add_instr(Instr::bne(
                Operand::Variable(var.clone()),
                Operand::Undefined,
                assigned.clone(),
            ));
            // the default may refer to the parameter itself
            let nil = self.manager.nil();
            self.add_instr(Instr::copy(var.clone(), nil));
            let default = self.build(&opt.default)?;
            self.add_instr(Instr::copy(var, default));
            self.add_instr(Instr::Label(assigned));
            arg_index += 1;
        }

        if let Some(rest_arg) = &args.rest {
            self.describe(ArgKind::Rest, rest_arg.name.as_ref());
            let name = rest_arg.name.clone().unwrap_or_else(|| ident(ANON_REST));
            let var = self.argument_result(&name);
            self.add_instr(Instr::ReceiveRestArg {
                result: var,
                required: required + optional,
                index: arg_index,
            });
        }

        for (i, item) in args.post.iter().enumerate() {
            let position = Position::Post {
                index: count(i),
                pre,
                post,
            };
            self.receive_required_arg(item, position)?;
        }

        self.receive_keyword_args(args, required)?;
        self.receive_block_arg(args.block.as_ref());
        Ok(())
    }

    fn receive_keyword_args(&mut self, args: &ArgsNode, required: u32) -> BuildResult<()> {
        for keyword in &args.keywords {
            let var = self.argument_result(&keyword.name);
            let kind = if keyword.is_required() {
                ArgKind::KeyReq
            } else {
                ArgKind::Key
            };
            self.describe(kind, Some(&keyword.name));
            self.add_instr(Instr::ReceiveKeywordArg {
                result: var.clone(),
                name: keyword.name.clone(),
                required,
            });
            let supplied = self.new_label();
            self.add_instr(Instr::bne(
                Operand::Variable(var.clone()),
                Operand::Undefined,
                supplied.clone(),
            ));
            match &keyword.default {
                Some(default) => {
                    let nil = self.manager.nil();
                    self.add_instr(Instr::copy(var.clone(), nil));
                    let value = self.build(default)?;
                    self.add_instr(Instr::copy(var, value));
                }
                None => {
                    self.add_instr(Instr::RaiseRequiredKeywordArgumentError(keyword.name.clone()));
                }
            }
            self.add_instr(Instr::Label(supplied));
        }

        if let Some(keyword_rest) = &args.keyword_rest {
            self.describe(ArgKind::KeyRest, keyword_rest.name.as_ref());
            let name = keyword_rest
                .name
                .clone()
                .unwrap_or_else(|| ident(ANON_KEYWORD_REST));
            let var = self.argument_result(&name);
            self.add_instr(Instr::ReceiveKeywordRestArg {
                result: var,
                required,
            });
        }

        let keyword_count = count(args.keywords.len());
        self.tree[self.scope]
            .static_scope
            .set_keyword_arity(keyword_count, args.keyword_rest.is_some());
        Ok(())
    }

    /// `&blk`: the incoming block, reified into a proc.
    fn receive_block_arg(&mut self, block: Option<&Ident>) {
        let Some(name) = block else {
            return;
        };
        let var = self.argument_result(name);
        self.describe(ArgKind::Block, Some(name));
        let implicit = self.emit_result(Instr::LoadImplicitClosure);
        self.add_instr(Instr::ReifyClosure {
            result: var,
            source: Operand::Variable(implicit),
        });
        self.tree[self.scope].set_flag(ScopeFlags::RECEIVES_CLOSURE_ARG);
    }

    fn receive_required_arg(&mut self, item: &ArgItem, position: Position) -> BuildResult<()> {
        match item {
            ArgItem::Named(name) => {
                self.describe(ArgKind::Req, Some(name));
                let var = self.argument_result(name);
                self.add_instr(receive_positional(var, position));
            }
            ArgItem::Destructure(pattern) => {
                let received = self.temp();
                self.add_instr(receive_positional(received.clone(), position));
                self.describe(ArgKind::Req, None);
                let array = self.emit_result(|result| Instr::ToAry {
                    result,
                    array: Operand::Variable(received),
                });
                self.build_args_masgn_pattern(pattern, &Operand::Variable(array))?;
            }
        }
        Ok(())
    }

    /// A fresh parameter local in this scope.
    fn argument_result(&mut self, name: &Ident) -> Variable {
        Variable::Local(self.tree[self.scope].new_local_variable(name.clone(), 0))
    }

    /// Record a parameter descriptor; only methods keep them.
    fn describe(&mut self, kind: ArgKind, name: Option<&Ident>) {
        if self.kind().is_method() {
            let descriptor = ArgDescriptor::new(kind, name.cloned());
            self.tree[self.scope].add_arg_descriptor(descriptor);
        }
    }

    // Destructured parameters

    /// Bind each target of `pattern` straight from `array`.
    fn build_args_masgn_pattern(
        &mut self,
        pattern: &MultipleAsgnPattern,
        array: &Operand,
    ) -> BuildResult<()> {
        let pre = count(pattern.pre.len());
        let post = count(pattern.post_count());
        for (i, target) in pattern.pre.iter().enumerate() {
            self.build_args_masgn(target, array, Element::pre(count(i)))?;
        }
        if let Some(MasgnRest::Target(target)) = &pattern.rest {
            self.build_args_masgn(target, array, Element::rest(pre, post))?;
        }
        for (j, target) in pattern.post.iter().enumerate() {
            self.build_args_masgn(target, array, Element::post(pre, post, count(j)))?;
        }
        Ok(())
    }

    fn build_args_masgn(
        &mut self,
        target: &Node,
        array: &Operand,
        element: Element,
    ) -> BuildResult<()> {
        match &target.kind {
            NodeKind::LocalAsgn { name, depth, .. } | NodeKind::DAsgn { name, depth, .. } => {
                let var = self.arg_variable(name, *depth);
                self.add_instr(element.extract(var, array.clone()));
                Ok(())
            }
            NodeKind::MultipleAsgn { pattern, .. } => {
                let element_value = self.temp();
                self.add_instr(element.extract(element_value.clone(), array.clone()));
                let nested = self.emit_result(|result| Instr::ToAry {
                    result,
                    array: Operand::Variable(element_value),
                });
                self.build_args_masgn_pattern(pattern, &Operand::Variable(nested))
            }
            _ => Err(self.not_compilable(target, "invalid target in a destructured parameter")),
        }
    }

    /// Variable a destructured parameter binds: the enclosing frame's local
    /// for `for` bodies, a fresh local elsewhere.
    fn arg_variable(&mut self, name: &Ident, depth: u32) -> Variable {
        if self.kind().is_for() {
            self.local_var(name, depth)
        } else {
            self.argument_result(name)
        }
    }

    // `for` loop variables

    /// The loop variable(s) of a `for` body, received as block arguments.
    pub(super) fn receive_for_args(&mut self, var: &Node) -> BuildResult<()> {
        let arity = match &var.kind {
            NodeKind::MultipleAsgn { pattern, .. } => count(pattern.pre.len()),
            _ => 1,
        };
        self.tree[self.scope]
            .static_scope
            .set_arities(arity, 0, false);
        self.build_block_args_assignment(var, 0)
    }

    fn build_block_args_assignment(&mut self, target: &Node, index: u32) -> BuildResult<()> {
        match &target.kind {
            NodeKind::LocalAsgn { name, depth, .. } | NodeKind::DAsgn { name, depth, .. } => {
                let var = self.block_arg_variable(target, name, *depth)?;
                self.add_instr(Instr::ReceivePreReqdArg { result: var, index });
                Ok(())
            }
            NodeKind::MultipleAsgn { pattern, .. } => {
                for (i, element) in pattern.pre.iter().enumerate() {
                    self.build_block_args_assignment(element, count(i))?;
                }
                Ok(())
            }
            NodeKind::ClassVarAsgn { .. }
            | NodeKind::ClassVarDecl { .. }
            | NodeKind::ConstDecl { .. }
            | NodeKind::GlobalAsgn { .. }
            | NodeKind::InstAsgn { .. }
            | NodeKind::AttrAssign { .. } => {
                let received = self.temp();
                self.add_instr(Instr::ReceivePreReqdArg {
                    result: received.clone(),
                    index,
                });
                self.build_assignment(target, received)
            }
            _ => Err(self.not_compilable(target, "invalid for-loop variable")),
        }
    }

    fn block_arg_variable(&mut self, target: &Node, name: &Ident, depth: u32) -> BuildResult<Variable> {
        if !self.kind().is_for() {
            return Err(BuildError::BlockArgOutsideFor {
                name: name.clone(),
                line: target.line(),
            });
        }
        Ok(self.local_var(name, depth))
    }
}

fn receive_positional(result: Variable, position: Position) -> Instr {
    match position {
        Position::Pre { index } => Instr::ReceivePreReqdArg { result, index },
        Position::Post { index, pre, post } => Instr::ReceivePostReqdArg {
            result,
            index,
            pre,
            post,
        },
    }
}
