//! Conditionals, loops and jumps.
//!
//! A construct through which control never falls (both branches of an `if`
//! return, a `break`) yields [`Operand::UnexecutableNil`]; callers test for
//! it before emitting a fall-through copy or jump.

use ruir_ast::{ident, Node, NodeKind, WhenClause};
use ruir_ir::{Instr, JumpKind, Label, Operand, ScopeFlags, Variable};

use super::{Builder, LoopFrame};
use crate::error::BuildResult;

/// Which way a conditional loop tests its condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum LoopSense {
    While,
    Until,
}

impl Builder<'_> {
    // Conditionals

    pub(super) fn build_if(
        &mut self,
        cond: &Node,
        then_body: Option<&Node>,
        else_body: Option<&Node>,
    ) -> BuildResult<Operand> {
        let else_label = self.new_label();
        let done_label = self.new_label();
        let mut then_unexec = false;
        let mut else_unexec = false;

        let cond = self.build(cond)?;
        let false_value = self.manager.false_value();
        self.add_instr(Instr::beq(cond, false_value, else_label.clone()));

        let result = match then_body {
            Some(body) => {
                let value = self.build(body)?;
                if value.is_unexecutable_nil() {
                    then_unexec = true;
                    self.temp()
                } else {
                    let result = self.value_in_temp(value);
                    self.add_instr(Instr::Jump(done_label.clone()));
                    result
                }
            }
            None => {
                let result = self.temp();
                let nil = self.manager.nil();
                self.add_instr(Instr::copy(result.clone(), nil));
                self.add_instr(Instr::Jump(done_label.clone()));
                result
            }
        };

        self.add_instr(Instr::Label(else_label));
        match else_body {
            Some(body) => {
                let value = self.build(body)?;
                if value.is_unexecutable_nil() {
                    else_unexec = true;
                } else {
                    self.add_instr(Instr::copy(result.clone(), value));
                }
            }
            None => {
                let nil = self.manager.nil();
                self.add_instr(Instr::copy(result.clone(), nil));
            }
        }

        if then_body.is_none() && else_body.is_none() {
            self.add_instr(Instr::Label(done_label));
            return Ok(self.manager.nil());
        }
        if then_unexec && else_unexec {
            return Ok(Operand::UnexecutableNil);
        }
        self.add_instr(Instr::Label(done_label));
        Ok(Operand::Variable(result))
    }

    pub(super) fn build_and(&mut self, first: &Node, second: &Node) -> BuildResult<Operand> {
        if first.is_always_true() {
            self.build(first)?;
            return self.build(second);
        }
        if first.is_always_false() {
            return self.build(first);
        }

        let done = self.new_label();
        let left = self.build(first)?;
        let result = self.value_in_temp(left.clone());
        let false_value = self.manager.false_value();
        self.add_instr(Instr::beq(left, false_value, done.clone()));
        let right = self.build(second)?;
        self.add_instr(Instr::copy(result.clone(), right));
        self.add_instr(Instr::Label(done));
        Ok(Operand::Variable(result))
    }

    pub(super) fn build_or(&mut self, first: &Node, second: &Node) -> BuildResult<Operand> {
        if first.is_always_true() {
            return self.build(first);
        }
        if first.is_always_false() {
            self.build(first)?;
            return self.build(second);
        }

        let done = self.new_label();
        let left = self.build(first)?;
        let result = self.value_in_temp(left.clone());
        let true_value = self.manager.true_value();
        self.add_instr(Instr::beq(left, true_value, done.clone()));
        let right = self.build(second)?;
        self.add_instr(Instr::copy(result.clone(), right));
        self.add_instr(Instr::Label(done));
        Ok(Operand::Variable(result))
    }

    /// `case`: every `when` test first, then the bodies in source order.
    ///
    /// Each test value is checked with `===` against the subject (or
    /// against `Undefined` for a subject-less `case`, which the runtime
    /// treats as a truthiness test). List tests check each element in turn.
    pub(super) fn build_case(
        &mut self,
        subject: Option<&Node>,
        whens: &[WhenClause],
        else_body: Option<&Node>,
    ) -> BuildResult<Operand> {
        let value = match subject {
            Some(subject) => self.build(subject)?,
            None => Operand::Undefined,
        };

        let end_label = self.new_label();
        let else_label = self.new_label();
        let result = self.temp();

        let mut bodies = Vec::with_capacity(whens.len());
        for when in whens {
            let body_label = self.new_label();
            match &when.test.kind {
                NodeKind::Array(tests) => {
                    for test in tests {
                        self.emit_when_test(test, &value, &body_label)?;
                    }
                }
                _ => self.emit_when_test(&when.test, &value, &body_label)?,
            }
            bodies.push((body_label, when.body.as_deref()));
        }

        self.add_instr(Instr::Jump(else_label.clone()));

        for (label, body) in bodies {
            self.add_instr(Instr::Label(label));
            self.emit_case_body(body, &result, &end_label)?;
        }

        self.add_instr(Instr::Label(else_label));
        match else_body {
            Some(body) => self.emit_case_body(Some(body), &result, &end_label)?,
            None => {
                let nil = self.manager.nil();
                self.add_instr(Instr::copy(result.clone(), nil));
                self.add_instr(Instr::Jump(end_label.clone()));
            }
        }

        self.add_instr(Instr::Label(end_label));
        Ok(Operand::Variable(result))
    }

    fn emit_when_test(&mut self, test: &Node, value: &Operand, body: &Label) -> BuildResult<()> {
        let receiver = match &test.kind {
            NodeKind::Splat(inner) => Operand::Splat(Box::new(self.build(inner)?)),
            _ => self.build(test)?,
        };
        let value = value.clone();
        let matched = self.emit_result(|result| Instr::Eqq {
            result,
            receiver,
            value,
        });
        let true_value = self.manager.true_value();
        self.add_instr(Instr::beq(Operand::Variable(matched), true_value, body.clone()));
        Ok(())
    }

    fn emit_case_body(
        &mut self,
        body: Option<&Node>,
        result: &Variable,
        end_label: &Label,
    ) -> BuildResult<()> {
        let value = self.build_or_nil(body)?;
        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::copy(result.clone(), value));
            self.add_instr(Instr::Jump(end_label.clone()));
        }
        Ok(())
    }

    // Loops

    fn push_loop(&mut self) -> usize {
        let frame = LoopFrame {
            start: self.new_prefixed_label("_LOOP_BEGIN"),
            end: self.new_prefixed_label("_LOOP_END"),
            iter_start: self.new_prefixed_label("_ITER_BEGIN"),
            iter_end: self.new_prefixed_label("_ITER_END"),
            result: self.temp(),
        };
        self.tree[self.scope].set_flag(ScopeFlags::HAS_LOOPS);
        self.loops.push(frame);
        self.loops.len() - 1
    }

    /// `while`/`until`, with the condition at the head or (for
    /// `begin…end while`) at the tail.
    pub(super) fn build_conditional_loop(
        &mut self,
        cond: &Node,
        body: Option<&Node>,
        sense: LoopSense,
        head_cond: bool,
    ) -> BuildResult<Operand> {
        let never_runs = match sense {
            LoopSense::While => cond.is_always_false(),
            LoopSense::Until => cond.is_always_true(),
        };
        if head_cond && never_runs {
            // the body is dead; only the condition is evaluated
            self.build(cond)?;
            return Ok(self.manager.nil());
        }

        let index = self.push_loop();
        let (start, end, iter_start, iter_end, result) = {
            let frame = &self.loops[index];
            (
                frame.start.clone(),
                frame.end.clone(),
                frame.iter_start.clone(),
                frame.iter_end.clone(),
                frame.result.clone(),
            )
        };
        let setup = self.new_label();
        let exit_on = sense == LoopSense::Until;

        self.add_instr(Instr::Label(start.clone()));
        if head_cond {
            let value = self.build(cond)?;
            let stop = self.manager.boolean(exit_on);
            self.add_instr(Instr::beq(value, stop, setup.clone()));
        }

        self.add_instr(Instr::Label(iter_start.clone()));
        self.thread_poll();
        if let Some(body) = body {
            self.build(body)?;
        }
        self.add_instr(Instr::Label(iter_end));

        if head_cond {
            self.add_instr(Instr::Jump(start));
        } else {
            let value = self.build(cond)?;
            let again = self.manager.boolean(!exit_on);
            self.add_instr(Instr::beq(value, again, iter_start));
        }

        self.add_instr(Instr::Label(setup));
        let nil = self.manager.nil();
        self.add_instr(Instr::copy(result.clone(), nil));
        self.add_instr(Instr::Label(end));

        self.loops.pop();
        Ok(Operand::Variable(result))
    }

    // Jumps

    pub(super) fn build_break(&mut self, value: Option<&Node>) -> BuildResult<Operand> {
        let value = self.build_or_nil(value)?;
        let current = self.current_loop();
        self.unwind_protection(current);

        if let Some(index) = current {
            let (result, end) = (self.loops[index].result.clone(), self.loops[index].end.clone());
            self.add_instr(Instr::copy(result, value));
            self.add_instr(Instr::Jump(end));
        } else if self.kind().is_closure() {
            match self.tree[self.scope].parent {
                Some(parent) => {
                    let scope_name = self.tree[parent].name.clone();
                    self.add_instr(Instr::Break { value, scope_name });
                }
                None => self.throw_local_jump_error(JumpKind::Break),
            }
        } else {
            self.throw_local_jump_error(JumpKind::Break);
        }
        Ok(Operand::UnexecutableNil)
    }

    pub(super) fn build_next(&mut self, value: Option<&Node>) -> BuildResult<Operand> {
        let value = self.build_or_nil(value)?;
        let current = self.current_loop();
        self.unwind_protection(current);

        if let Some(index) = current {
            let iter_end = self.loops[index].iter_end.clone();
            self.add_instr(Instr::Jump(iter_end));
        } else {
            self.thread_poll();
            if self.kind().is_closure() {
                self.add_instr(Instr::Return(value));
            } else {
                self.throw_local_jump_error(JumpKind::Next);
            }
        }
        Ok(Operand::UnexecutableNil)
    }

    pub(super) fn build_redo(&mut self) -> Operand {
        if let Some(index) = self.current_loop() {
            let iter_start = self.loops[index].iter_start.clone();
            self.add_instr(Instr::Jump(iter_start));
        } else if let (true, Some(start)) = (self.kind().is_closure(), self.closure_start.clone()) {
            self.thread_poll();
            self.add_instr(Instr::Jump(start));
        } else {
            self.throw_local_jump_error(JumpKind::Redo);
        }
        self.manager.nil()
    }

    /// `retry` restarts the innermost rescued region with `$!` restored.
    pub(super) fn build_retry(&mut self) -> Operand {
        let Some(frame) = self.rescues.last() else {
            self.throw_local_jump_error(JumpKind::Retry);
            return self.manager.nil();
        };
        let (entry, saved) = (frame.entry.clone(), frame.saved_exception.clone());
        self.thread_poll();
        self.add_instr(Instr::PutGlobalVar {
            name: ident("$!"),
            value: Operand::Variable(saved),
        });
        self.add_instr(Instr::Jump(entry));
        self.tree[self.scope].set_flag(ScopeFlags::HAS_LOOPS);
        self.manager.nil()
    }

    pub(super) fn build_return(&mut self, value: Option<&Node>) -> BuildResult<Operand> {
        let value = self.build_or_nil(value)?;

        if self.kind().is_closure() {
            let method = self.tree.nearest_method(self.scope);
            self.add_instr(Instr::CheckForLocalJumpError {
                maybe_lambda: method.is_none(),
            });
            let value = self.unwind_for_return(value);
            let method_name = method.map(|m| self.tree[m].name.clone());
            self.add_instr(Instr::NonlocalReturn { value, method_name });
        } else if self.kind().is_module_body() {
            let method = self.tree.nearest_method(self.scope);
            if method.is_none() {
                self.throw_local_jump_error(JumpKind::Return);
            }
            let value = self.unwind_for_return(value);
            if let Some(method) = method {
                let method_name = Some(self.tree[method].name.clone());
                self.add_instr(Instr::NonlocalReturn { value, method_name });
            }
        } else {
            let value = self.unwind_for_return(value);
            self.trace_return();
            self.add_instr(Instr::Return(value));
        }
        Ok(Operand::UnexecutableNil)
    }

    /// Before leaving protected code for `loop` (or the scope, when
    /// `None`): run pending ensure bodies, or else restore `$!`.
    fn unwind_protection(&mut self, current_loop: Option<usize>) {
        if self.ensures.is_empty() {
            self.restore_exception(current_loop);
        } else {
            self.emit_ensure_blocks(current_loop);
        }
    }

    /// Like [`Self::unwind_protection`] for a `return`, which leaves every
    /// enclosing region. The value is stashed first so ensure bodies cannot
    /// clobber it.
    fn unwind_for_return(&mut self, value: Operand) -> Operand {
        if !self.ensures.is_empty() {
            let stash = self.temp();
            self.add_instr(Instr::copy(stash.clone(), value));
            self.emit_ensure_blocks(None);
            return Operand::Variable(stash);
        }
        if let Some(frame) = self.rescues.last() {
            let saved = frame.saved_exception.clone();
            self.add_instr(Instr::PutGlobalVar {
                name: ident("$!"),
                value: Operand::Variable(saved),
            });
        }
        value
    }

    pub(super) fn throw_local_jump_error(&mut self, kind: JumpKind) {
        tracing::debug!(kind = kind.as_str(), scope = self.scope.raw(), "deferred local jump error");
        self.add_instr(Instr::ThrowException(Operand::LocalJumpError(kind)));
    }

    pub(super) fn trace_return(&mut self) {
        if self.config.full_trace && self.kind().is_method() {
            let name = self.trace_name();
            let line = self.tree[self.scope].line;
            self.add_instr(Instr::Trace {
                event: ruir_ir::TraceEvent::Return,
                name,
                file: self.config.file_name.clone(),
                line: i64::from(line),
            });
        }
    }

    // Flip-flops

    /// `a..b` as a condition: a two-state machine whose state lives in a
    /// hidden local of the nearest non-closure scope.
    ///
    /// State 1 tests `begin`; when it holds the result is true and the
    /// state moves to 2. State 2 yields true, tests `end`, and moves back to
    /// 1 when it holds. An exclusive flip does not test `end` in the same
    /// evaluation that left state 1.
    pub(super) fn build_flip(
        &mut self,
        begin: &Node,
        end: &Node,
        exclusive: bool,
    ) -> BuildResult<Operand> {
        let s1 = Operand::Fixnum(1);
        let s2 = Operand::Fixnum(2);

        let (host, state) = self.tree.new_flip_variable(self.scope);
        let host_state = Variable::Local(state.clone_for_depth(0));
        self.tree[host].prepend_instr(Instr::copy(host_state, s1.clone()));
        let state_var = Variable::Local(state);
        let state = Operand::Variable(state_var.clone());

        let result = self.temp();
        let s2_label = self.new_label();
        let done_label = self.new_label();
        let true_value = self.manager.true_value();

        let false_value = self.manager.false_value();
        self.add_instr(Instr::copy(result.clone(), false_value));

        // state 1
        self.add_instr(Instr::bne(state.clone(), s1.clone(), s2_label.clone()));
        let begin_value = self.build(begin)?;
        self.add_instr(Instr::bne(begin_value, true_value.clone(), s2_label.clone()));
        self.add_instr(Instr::copy(result.clone(), true_value.clone()));
        self.add_instr(Instr::copy(state_var.clone(), s2.clone()));

        // state 2
        self.add_instr(Instr::Label(s2_label));
        if exclusive {
            self.add_instr(Instr::beq(
                Operand::Variable(result.clone()),
                true_value.clone(),
                done_label.clone(),
            ));
        }
        self.add_instr(Instr::bne(state, s2, done_label.clone()));
        let end_value = self.build(end)?;
        self.add_instr(Instr::copy(result.clone(), true_value.clone()));
        self.add_instr(Instr::bne(end_value, true_value, done_label.clone()));
        self.add_instr(Instr::copy(state_var, s1));

        self.add_instr(Instr::Label(done_label));
        Ok(Operand::Variable(result))
    }
}
