//! Node dispatch and statement sequencing.

use ruir_ast::{HashPair, Node, NodeKind, RescueClause, WhenClause};
use ruir_ir::{Instr, Operand, TraceEvent};

use super::control::LoopSense;
use super::Builder;
use crate::error::BuildResult;
use crate::stack::ensure_sufficient_stack;

impl Builder<'_> {
    /// Build `node` into the current scope and return its value.
    #[tracing::instrument(level = "trace", skip_all, fields(kind = node.tag(), line = node.line()))]
    pub(super) fn build(&mut self, node: &Node) -> BuildResult<Operand> {
        if let Some(listener) = self.manager.listener() {
            listener.start_build(&self.tree[self.scope], node);
        }
        let value = ensure_sufficient_stack(|| self.build_kind(node))?;
        if let Some(listener) = self.manager.listener() {
            listener.end_build(&self.tree[self.scope], node, &value);
        }
        Ok(value)
    }

    pub(super) fn build_or_nil(&mut self, node: Option<&Node>) -> BuildResult<Operand> {
        match node {
            Some(node) => self.build(node),
            None => Ok(self.manager.nil()),
        }
    }

    /// Build `node`, snapshotting its value into a temporary when `ordered`
    /// so a later sibling assignment cannot change it.
    pub(super) fn build_with_order(&mut self, node: &Node, ordered: bool) -> BuildResult<Operand> {
        let value = self.build(node)?;
        if ordered && !value.is_immutable_literal() {
            return Ok(self.copy_and_return_value(value));
        }
        Ok(value)
    }

    #[expect(clippy::too_many_lines, reason = "one arm per node kind")]
    fn build_kind(&mut self, node: &Node) -> BuildResult<Operand> {
        match &node.kind {
            NodeKind::Alias { new_name, old_name } => self.build_alias(new_name, old_name),
            NodeKind::And { first, second } => self.build_and(first, second),
            NodeKind::ArgsCat { first, second } => self.build_compound_array(first, second, false),
            NodeKind::ArgsPush { first, second } => self.build_compound_array(first, second, true),
            NodeKind::Array(elements) => self.build_array(node, elements),
            NodeKind::AttrAssign {
                receiver,
                name,
                args,
            } => self.build_attr_assign(node, receiver, name, args.as_deref()),
            NodeKind::BackRef(c) => Ok(self.copy_and_return_value(Operand::Backref(*c))),
            NodeKind::Begin(inner) => self.build(inner),
            NodeKind::Bignum(digits) => Ok(Operand::Bignum(digits.clone())),
            NodeKind::Block(statements) => self.build_block(statements),
            NodeKind::BlockPass(_) => {
                Err(self.not_compilable(node, "block pass outside an argument list"))
            }
            NodeKind::Break(value) => self.build_break(value.as_deref()),
            NodeKind::Call {
                receiver,
                name,
                args,
                iter,
            } => self.build_call(node, receiver, name, args.as_deref(), iter.as_deref()),
            NodeKind::Case {
                subject,
                whens,
                else_body,
            } => self.build_case(subject.as_deref(), whens, else_body.as_deref()),
            NodeKind::Class {
                cpath,
                superclass,
                body,
                scope,
            } => self.build_class(node, cpath, superclass.as_deref(), body.as_deref(), scope),
            NodeKind::ClassVar(name) => Ok(self.build_class_var(name)),
            NodeKind::ClassVarAsgn { name, value } => {
                let value = self.assigned_value(node, value.as_deref())?;
                self.build_class_var_asgn(name, value, false)
            }
            NodeKind::ClassVarDecl { name, value } => {
                let value = self.assigned_value(node, value.as_deref())?;
                self.build_class_var_asgn(name, value, true)
            }
            NodeKind::Colon2 { left, name } => self.build_colon2(left.as_deref(), name),
            NodeKind::Colon3(name) => Ok(self.build_colon3(name)),
            NodeKind::Complex(inner) => self.build_complex(inner),
            NodeKind::Const(name) => Ok(self.build_const(name)),
            NodeKind::ConstDecl { name, path, value } => {
                let value = self.assigned_value(node, value.as_deref())?;
                self.build_const_decl(name, path.as_deref(), value)
            }
            NodeKind::DAsgn { name, depth, value } | NodeKind::LocalAsgn { name, depth, value } => {
                let value = self.assigned_value(node, value.as_deref())?;
                self.build_local_asgn(name, *depth, value)
            }
            NodeKind::DRegexp { pieces, options } => self.build_dregexp(pieces, *options),
            NodeKind::DStr(pieces) => self.build_dstr(pieces),
            NodeKind::DSymbol(pieces) => self.build_dsymbol(pieces),
            NodeKind::DVar { name, depth } | NodeKind::LocalVar { name, depth } => {
                Ok(self.build_local_var(name, *depth))
            }
            NodeKind::DXStr(pieces) => self.build_dxstr(pieces),
            NodeKind::Defined(inner) => self.build_defined(inner),
            NodeKind::Defn {
                name,
                args,
                body,
                scope,
            } => self.build_defn(node, name, args, body.as_deref(), scope),
            NodeKind::Defs {
                receiver,
                name,
                args,
                body,
                scope,
            } => self.build_defs(node, receiver, name, args, body.as_deref(), scope),
            NodeKind::Dot {
                begin,
                end,
                exclusive,
            } => self.build_dot(begin, end, *exclusive),
            NodeKind::Encoding(encoding) => Ok(self.build_encoding(encoding)),
            NodeKind::Ensure { body, ensure } => {
                self.build_ensure(body.as_deref(), ensure.as_deref())
            }
            NodeKind::EvStr(body) => self.build_evstr(body.as_deref()),
            NodeKind::False => Ok(self.manager.false_value()),
            NodeKind::FCall { name, args, iter } => {
                self.build_fcall(name, args.as_deref(), iter.as_deref())
            }
            NodeKind::Fixnum(value) => Ok(Operand::Fixnum(*value)),
            NodeKind::Flip {
                begin,
                end,
                exclusive,
            } => self.build_flip(begin, end, *exclusive),
            NodeKind::Float(value) => Ok(Operand::Float(*value)),
            NodeKind::For {
                var,
                iter,
                body,
                scope,
            } => self.build_for(node, var, iter, body.as_deref(), scope),
            NodeKind::GlobalAsgn { name, value } => {
                let value = self.assigned_value(node, value.as_deref())?;
                self.build_global_asgn(name, value)
            }
            NodeKind::GlobalVar(name) => Ok(self.build_global_var(name)),
            NodeKind::Hash(pairs) => self.build_hash(node, pairs),
            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => self.build_if(cond, then_body.as_deref(), else_body.as_deref()),
            NodeKind::InstAsgn { name, value } => {
                let value = self.assigned_value(node, value.as_deref())?;
                self.build_inst_asgn(name, value)
            }
            NodeKind::InstVar(name) => Ok(self.build_inst_var(name)),
            NodeKind::Iter {
                params,
                body,
                scope,
            } => self.build_iter(node, params.as_deref(), body.as_deref(), scope),
            NodeKind::Lambda {
                params,
                body,
                scope,
            } => self.build_lambda(node, params, body.as_deref(), scope),
            NodeKind::Literal(name) => Ok(self.build_str(name)),
            NodeKind::Match(regexp) => self.build_match(regexp),
            NodeKind::Match2 {
                receiver,
                value,
                captures,
            } => self.build_match2(receiver, value, captures),
            NodeKind::Match3 { receiver, value } => self.build_match3(receiver, value),
            NodeKind::Module { cpath, body, scope } => {
                self.build_module(node, cpath, body.as_deref(), scope)
            }
            NodeKind::MultipleAsgn { pattern, value } => match value {
                Some(value) => self.build_multiple_asgn(pattern, value),
                None => Err(self.not_compilable(node, "destructuring pattern without a value")),
            },
            NodeKind::Newline(_) => self.build_newline(node),
            NodeKind::Next(value) => self.build_next(value.as_deref()),
            NodeKind::Nil => Ok(self.manager.nil()),
            NodeKind::NthRef(n) => Ok(Operand::NthRef(*n)),
            NodeKind::OpAsgn {
                receiver,
                reader,
                writer,
                operator,
                value,
            } => self.build_op_asgn(receiver, reader, writer, operator, value),
            NodeKind::OpAsgnAnd { first, second } => self.build_op_asgn_and(first, second),
            NodeKind::OpAsgnOr { first, second } => self.build_op_asgn_or(first, second),
            NodeKind::OpElementAsgn {
                receiver,
                args,
                operator,
                value,
            } => self.build_op_element_asgn(receiver, args.as_deref(), operator, value),
            NodeKind::Or { first, second } => self.build_or(first, second),
            NodeKind::PostExe { body, scope } => self.build_post_exe(node, body.as_deref(), scope),
            NodeKind::PreExe { body, scope } => self.build_pre_exe(node, body.as_deref(), scope),
            NodeKind::Rational {
                numerator,
                denominator,
            } => Ok(Operand::Rational {
                numerator: *numerator,
                denominator: *denominator,
            }),
            NodeKind::Redo => Ok(self.build_redo()),
            NodeKind::Regexp { source, options } => Ok(self.build_regexp(source, *options)),
            NodeKind::Rescue {
                body,
                rescue,
                else_body,
            } => self.build_rescue(body.as_deref(), rescue.as_deref(), else_body.as_deref()),
            NodeKind::Retry => Ok(self.build_retry()),
            NodeKind::Return(value) => self.build_return(value.as_deref()),
            NodeKind::SClass {
                receiver,
                body,
                scope,
            } => self.build_sclass(node, receiver, body.as_deref(), scope),
            NodeKind::SelfRef => Ok(Operand::self_value()),
            NodeKind::Splat(inner) => self.build_splat(inner),
            NodeKind::Star => {
                Err(self.not_compilable(node, "anonymous splat outside a destructuring pattern"))
            }
            NodeKind::Str(text) => Ok(self.build_str(text)),
            NodeKind::Super { args, iter } => self.build_super(args.as_deref(), iter.as_deref()),
            NodeKind::SValue(inner) => self.build_svalue(inner),
            NodeKind::Symbol(name) => Ok(Operand::Symbol(name.clone())),
            NodeKind::True => Ok(self.manager.true_value()),
            NodeKind::Undef(name) => self.build_undef(name),
            NodeKind::Until {
                cond,
                body,
                head_cond,
            } => self.build_conditional_loop(cond, body.as_deref(), LoopSense::Until, *head_cond),
            NodeKind::VAlias { new_name, old_name } => Ok(self.build_valias(new_name, old_name)),
            NodeKind::VCall(name) => Ok(self.build_vcall(name)),
            NodeKind::While {
                cond,
                body,
                head_cond,
            } => self.build_conditional_loop(cond, body.as_deref(), LoopSense::While, *head_cond),
            NodeKind::XStr(text) => Ok(self.build_xstr(text)),
            NodeKind::Yield { arg, expanded } => self.build_yield(arg.as_deref(), *expanded),
            NodeKind::ZArray => Ok(self.copy_and_return_value(Operand::Array(Vec::new()))),
            NodeKind::ZSuper { iter } => self.build_zsuper(iter.as_deref()),
        }
    }

    /// Right-hand side of an assignment in expression position. Only
    /// destructuring targets come without one.
    fn assigned_value<'n>(&self, node: &Node, value: Option<&'n Node>) -> BuildResult<&'n Node> {
        value.ok_or_else(|| self.not_compilable(node, "assignment without a value"))
    }

    // Sequencing

    /// Statements in order; the value is the last one's.
    fn build_block(&mut self, statements: &[Node]) -> BuildResult<Operand> {
        let mut value = self.manager.nil();
        for statement in statements {
            value = self.build(statement)?;
        }
        Ok(value)
    }

    /// Mark a new source line once, then build the wrapped statement.
    fn build_newline(&mut self, node: &Node) -> BuildResult<Operand> {
        let line = node.line();
        if self.last_line != Some(line) {
            if self.config.full_trace {
                let name = self.trace_name();
                self.add_instr(Instr::Trace {
                    event: TraceEvent::Line,
                    name,
                    file: self.config.file_name.clone(),
                    line: i64::from(line),
                });
            }
            if self.config.emit_line_numbers {
                self.add_instr(Instr::LineNumber(line));
            }
            self.last_line = Some(line);
        }
        self.build(node.skip_newlines())
    }
}

// Assignment detection

/// Whether evaluating `node` can assign a variable. Operands of such a
/// node are snapshotted as they are built so the assignment cannot change
/// an earlier operand's value. Nested method, class and module bodies run
/// in their own frames and are not searched.
pub(super) fn contains_variable_assignment(node: &Node) -> bool {
    match &node.kind {
        NodeKind::LocalAsgn { .. }
        | NodeKind::DAsgn { .. }
        | NodeKind::InstAsgn { .. }
        | NodeKind::GlobalAsgn { .. }
        | NodeKind::ClassVarAsgn { .. }
        | NodeKind::ClassVarDecl { .. }
        | NodeKind::ConstDecl { .. }
        | NodeKind::MultipleAsgn { .. }
        | NodeKind::OpAsgnAnd { .. }
        | NodeKind::OpAsgnOr { .. }
        | NodeKind::For { .. } => true,

        NodeKind::Alias {
            new_name: first,
            old_name: second,
        }
        | NodeKind::And { first, second }
        | NodeKind::Or { first, second }
        | NodeKind::ArgsCat { first, second }
        | NodeKind::ArgsPush { first, second }
        | NodeKind::Dot {
            begin: first,
            end: second,
            ..
        }
        | NodeKind::Flip {
            begin: first,
            end: second,
            ..
        }
        | NodeKind::Match3 {
            receiver: first,
            value: second,
        } => contains_variable_assignment(first) || contains_variable_assignment(second),

        NodeKind::Array(nodes)
        | NodeKind::Block(nodes)
        | NodeKind::DStr(nodes)
        | NodeKind::DSymbol(nodes)
        | NodeKind::DXStr(nodes)
        | NodeKind::DRegexp { pieces: nodes, .. } => any(nodes),

        NodeKind::Begin(inner)
        | NodeKind::BlockPass(inner)
        | NodeKind::Complex(inner)
        | NodeKind::Defined(inner)
        | NodeKind::Match(inner)
        | NodeKind::Newline(inner)
        | NodeKind::Splat(inner)
        | NodeKind::SValue(inner)
        | NodeKind::Undef(inner)
        | NodeKind::Defs { receiver: inner, .. }
        | NodeKind::SClass { receiver: inner, .. }
        | NodeKind::Module { cpath: inner, .. } => contains_variable_assignment(inner),

        NodeKind::Break(inner)
        | NodeKind::Next(inner)
        | NodeKind::Return(inner)
        | NodeKind::EvStr(inner)
        | NodeKind::Colon2 { left: inner, .. }
        | NodeKind::ZSuper { iter: inner }
        | NodeKind::Yield { arg: inner, .. }
        | NodeKind::Iter { body: inner, .. }
        | NodeKind::Lambda { body: inner, .. } => opt(inner.as_deref()),

        NodeKind::AttrAssign { receiver, args, .. } => {
            contains_variable_assignment(receiver) || opt(args.as_deref())
        }
        NodeKind::Call {
            receiver,
            args,
            iter,
            ..
        } => {
            contains_variable_assignment(receiver) || opt(args.as_deref()) || opt(iter.as_deref())
        }
        NodeKind::FCall { args, iter, .. } | NodeKind::Super { args, iter } => {
            opt(args.as_deref()) || opt(iter.as_deref())
        }
        NodeKind::Case {
            subject,
            whens,
            else_body,
        } => opt(subject.as_deref()) || whens.iter().any(when_assigns) || opt(else_body.as_deref()),
        NodeKind::Class {
            cpath, superclass, ..
        } => contains_variable_assignment(cpath) || opt(superclass.as_deref()),
        NodeKind::Ensure { body, ensure } => opt(body.as_deref()) || opt(ensure.as_deref()),
        NodeKind::Hash(pairs) => pairs.iter().any(pair_assigns),
        NodeKind::If {
            cond,
            then_body,
            else_body,
        } => {
            contains_variable_assignment(cond)
                || opt(then_body.as_deref())
                || opt(else_body.as_deref())
        }
        NodeKind::Match2 {
            receiver,
            value,
            captures,
        } => {
            !captures.is_empty()
                || contains_variable_assignment(receiver)
                || contains_variable_assignment(value)
        }
        NodeKind::OpAsgn {
            receiver, value, ..
        } => contains_variable_assignment(receiver) || contains_variable_assignment(value),
        NodeKind::OpElementAsgn {
            receiver,
            args,
            value,
            ..
        } => {
            contains_variable_assignment(receiver)
                || opt(args.as_deref())
                || contains_variable_assignment(value)
        }
        NodeKind::Rescue {
            body,
            rescue,
            else_body,
        } => opt(body.as_deref()) || rescue_assigns(rescue.as_deref()) || opt(else_body.as_deref()),
        NodeKind::While { cond, body, .. } | NodeKind::Until { cond, body, .. } => {
            contains_variable_assignment(cond) || opt(body.as_deref())
        }

        _ => false,
    }
}

fn opt(node: Option<&Node>) -> bool {
    node.is_some_and(contains_variable_assignment)
}

fn any(nodes: &[Node]) -> bool {
    nodes.iter().any(contains_variable_assignment)
}

fn when_assigns(when: &WhenClause) -> bool {
    contains_variable_assignment(&when.test) || opt(when.body.as_deref())
}

fn pair_assigns(pair: &HashPair) -> bool {
    opt(pair.key.as_ref()) || contains_variable_assignment(&pair.value)
}

fn rescue_assigns(clause: Option<&RescueClause>) -> bool {
    let mut next = clause;
    while let Some(clause) = next {
        if opt(clause.exception_types.as_deref()) || opt(clause.body.as_deref()) {
            return true;
        }
        next = clause.next.as_deref();
    }
    false
}
