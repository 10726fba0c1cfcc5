//! `rescue`/`ensure` regions and the scope-level unwind handlers.
//!
//! # Ensure Lowering
//!
//! ```text
//!   L_region_start:
//!     region_start(L_dummy)
//!     ... protected body ...
//!     region_end
//!   L_start':                      <- spliced copy, once per exit path
//!     region_start(<rescuer at definition site>)
//!     ... ensure body ...
//!     region_end
//!     jump L_end
//!   L_dummy:
//!     %e = recv_any_exc
//!   L_start:
//!     ... ensure body ...
//!     throw %e
//!   L_end:
//! ```
//!
//! The ensure body is built once, into a side buffer, before the protected
//! body. Every `break`/`next`/`return` that leaves the region splices a copy
//! of it with labels renamed and referenced closures deep-cloned.

use ruir_ast::{ident, Node, NodeKind, RescueClause};
use ruir_ir::{Instr, Label, Operand, RuntimeHelper, ScopeFlags, Variable};
use rustc_hash::FxHashMap;
use smallvec::smallvec;

use super::{Builder, EnsureFrame, RescueFrame};
use crate::error::BuildResult;

/// Handler label wrapping a whole lambda body.
fn global_ensure_label() -> Label {
    Label::new(ident("_GLOBAL_ENSURE_BLOCK_"), 0)
}

impl Builder<'_> {
    // Ensure

    pub(super) fn build_ensure(
        &mut self,
        body: Option<&Node>,
        ensure: Option<&Node>,
    ) -> BuildResult<Operand> {
        let frame = EnsureFrame {
            region_start: self.new_label(),
            start: self.new_label(),
            end: self.new_label(),
            dummy_rescue: self.new_label(),
            saved_exception: None,
            body_rescuer: self.current_rescuer(),
            innermost_loop: self.current_loop(),
            body: Vec::new(),
        };

        // the ensure body first, so exits in the protected body can splice it
        self.ensure_sinks.push(Vec::new());
        let ensure_value = self.build_or_nil(ensure);
        let ensure_body = self.ensure_sinks.pop().unwrap_or_default();
        let ensure_value = ensure_value?;
        let (region_start, dummy_rescue, end) = (
            frame.region_start.clone(),
            frame.dummy_rescue.clone(),
            frame.end.clone(),
        );
        self.ensures.push(EnsureFrame {
            body: ensure_body,
            ..frame
        });
        let index = self.ensures.len() - 1;

        self.add_instr(Instr::Label(region_start));
        self.add_instr(Instr::ExceptionRegionStart {
            rescue: dummy_rescue.clone(),
        });
        self.rescuers.push(dummy_rescue.clone());

        let protected = match body.map(Node::skip_newlines) {
            Some(Node {
                kind:
                    NodeKind::Rescue {
                        body,
                        rescue,
                        else_body,
                    },
                ..
            }) => self.build_rescue_internal(
                body.as_deref(),
                rescue.as_deref(),
                else_body.as_deref(),
                Some(index),
            ),
            other => self.build_or_nil(other),
        };
        let mut value = protected?;
        let body_is_rescue =
            body.is_some_and(|b| matches!(b.skip_newlines().kind, NodeKind::Rescue { .. }));

        self.add_instr(Instr::ExceptionRegionEnd);
        self.rescuers.pop();

        if !value.is_unexecutable_nil() && !body_is_rescue {
            self.splice_ensure(index);
            self.add_instr(Instr::Jump(end.clone()));
        }

        let frame = self.ensures.pop();

        let exception = self.temp();
        self.add_instr(Instr::Label(dummy_rescue));
        self.add_instr(Instr::ReceiveAnyException(exception.clone()));
        if let Some(frame) = frame {
            self.add_instr(Instr::Label(frame.start));
            for instr in frame.body {
                self.add_instr(instr);
            }
        }

        if ensure_value.is_unexecutable_nil() {
            value = Operand::UnexecutableNil;
        }

        self.add_instr(Instr::ThrowException(Operand::Variable(exception)));
        self.add_instr(Instr::Label(end));
        Ok(value)
    }

    /// Splice every active ensure body, innermost first. With a loop, stop
    /// at the first ensure opened outside it.
    pub(super) fn emit_ensure_blocks(&mut self, current_loop: Option<usize>) {
        for index in (0..self.ensures.len()).rev() {
            if current_loop.is_some() && self.ensures[index].innermost_loop != current_loop {
                break;
            }
            if let Some(saved) = self.ensures[index].saved_exception.clone() {
                self.add_instr(Instr::PutGlobalVar {
                    name: ident("$!"),
                    value: Operand::Variable(saved),
                });
            }
            self.splice_ensure(index);
        }
    }

    /// Emit a copy of ensure body `index` at the current position.
    ///
    /// Labels defined inside the body get fresh names; jumps out of it keep
    /// theirs. The copy runs under the rescuer that was active where the
    /// ensure was written.
    fn splice_ensure(&mut self, index: usize) {
        let frame = &self.ensures[index];
        let body = frame.body.clone();
        let start = frame.start.clone();
        let rescuer = frame.body_rescuer.clone();

        let mut renamed: FxHashMap<Label, Label> = FxHashMap::default();
        let fresh_start = self.new_label();
        renamed.insert(start, fresh_start.clone());
        for instr in &body {
            if let Instr::Label(label) = instr {
                let fresh = self.new_label();
                renamed.insert(label.clone(), fresh);
            }
        }

        tracing::debug!(
            scope = self.scope.raw(),
            ensure = index,
            instrs = body.len(),
            labels = renamed.len(),
            "splicing ensure body"
        );

        self.add_instr(Instr::Label(fresh_start));
        self.add_instr(Instr::ExceptionRegionStart { rescue: rescuer });
        for mut instr in body {
            for label in instr.labels_mut() {
                if let Some(fresh) = renamed.get(label) {
                    *label = fresh.clone();
                }
            }
            self.clone_referenced_scopes(&mut instr);
            self.add_instr(instr);
        }
        self.add_instr(Instr::ExceptionRegionEnd);
    }

    /// Give a spliced instruction private copies of the scopes it defines
    /// or wraps.
    fn clone_referenced_scopes(&mut self, instr: &mut Instr) {
        let referenced = instr.referenced_scopes();
        if referenced.is_empty() {
            return;
        }
        let mut copies = FxHashMap::default();
        for src in referenced {
            let copy = self.tree.clone_scope(src, self.scope);
            copies.insert(src, copy);
        }
        instr.remap_scopes(&mut |s| copies.get(&s).copied().unwrap_or(s));
    }

    fn current_rescuer(&self) -> Label {
        self.rescuers.last().cloned().unwrap_or_else(super::unrescued_label)
    }

    // Rescue

    pub(super) fn build_rescue(
        &mut self,
        body: Option<&Node>,
        rescue: Option<&RescueClause>,
        else_body: Option<&Node>,
    ) -> BuildResult<Operand> {
        self.build_rescue_internal(body, rescue, else_body, None)
    }

    /// `begin/rescue/else`, optionally as the protected body of ensure
    /// `ensure` (whose end label it then shares).
    fn build_rescue_internal(
        &mut self,
        body: Option<&Node>,
        rescue: Option<&RescueClause>,
        else_body: Option<&Node>,
        ensure: Option<usize>,
    ) -> BuildResult<Operand> {
        let begin_label = self.new_label();
        let end_label = match ensure {
            Some(index) => self.ensures[index].end.clone(),
            None => self.new_label(),
        };
        let rescue_label = self.new_label();

        let saved = self.emit_result(|result| Instr::GetGlobalVariable {
            result,
            name: ident("$!"),
        });
        if let Some(index) = ensure {
            self.ensures[index].saved_exception = Some(saved.clone());
        }

        self.add_instr(Instr::Label(begin_label.clone()));
        self.add_instr(Instr::ExceptionRegionStart {
            rescue: rescue_label.clone(),
        });
        self.rescuers.push(rescue_label.clone());

        let result = self.temp();
        let mut value = self.build_or_nil(body)?;

        // pushed after the body: a `retry` written in the protected body
        // belongs to an enclosing handler, one in our handlers restarts us
        self.rescues.push(RescueFrame {
            entry: begin_label,
            saved_exception: saved,
            innermost_loop: self.current_loop(),
            ensure,
        });

        self.add_instr(Instr::ExceptionRegionEnd);
        self.rescuers.pop();

        if let Some(else_body) = else_body {
            let else_label = self.new_label();
            self.add_instr(Instr::Label(else_label));
            value = self.build(else_body)?;
        }

        if !value.is_unexecutable_nil() {
            self.add_instr(Instr::copy(result.clone(), value));
            if let Some(index) = ensure {
                self.splice_ensure(index);
            }
            self.add_instr(Instr::Jump(end_label.clone()));
        }

        self.add_instr(Instr::Label(rescue_label));
        let exception = self.emit_result(Instr::ReceiveRubyException);

        let handled = match rescue {
            Some(clause) => self.build_rescue_clause(clause, &result, &exception, &end_label),
            None => {
                self.add_instr(Instr::ThrowException(Operand::Variable(exception)));
                Ok(())
            }
        };

        if ensure.is_none() {
            self.add_instr(Instr::Label(end_label));
        }
        self.rescues.pop();
        handled?;
        Ok(Operand::Variable(result))
    }

    /// Test the exception against one clause's types, falling through to
    /// the next clause (or a rethrow) when none match.
    fn build_rescue_clause(
        &mut self,
        clause: &RescueClause,
        result: &Variable,
        exception: &Variable,
        end_label: &Label,
    ) -> BuildResult<()> {
        let uncaught = self.new_label();
        let caught = self.new_label();

        match clause.exception_types.as_deref() {
            Some(Node {
                kind: NodeKind::Array(types),
                ..
            }) => {
                let mut operands = Vec::with_capacity(types.len());
                for ty in types {
                    operands.push(self.build(ty)?);
                }
                self.exception_check(Operand::Array(operands), exception, &caught);
            }
            Some(Node {
                kind: NodeKind::Splat(inner),
                ..
            }) => {
                let types = self.build(inner)?;
                self.exception_check(types, exception, &caught);
            }
            Some(other) => {
                let types = self.build(other)?;
                self.exception_check(types, exception, &caught);
            }
            None => {
                // looked up at every check; reassigning the constant is observable
                let standard_error = self.emit_result(|result| Instr::InheritanceSearchConst {
                    result,
                    module: Operand::ObjectClass,
                    name: ident("StandardError"),
                    no_private: false,
                });
                self.exception_check(Operand::Variable(standard_error), exception, &caught);
            }
        }

        self.add_instr(Instr::Label(uncaught));
        match clause.next.as_deref() {
            Some(next) => self.build_rescue_clause(next, result, exception, end_label)?,
            None => self.add_instr(Instr::ThrowException(Operand::Variable(exception.clone()))),
        }

        self.add_instr(Instr::Label(caught));
        let body = clause.body.as_deref().map(Node::skip_newlines);
        let value = self.build_or_nil(body)?;
        if !value.is_unexecutable_nil() {
            let Some(frame) = self.rescues.last() else {
                return Ok(());
            };
            let (saved, ensure) = (frame.saved_exception.clone(), frame.ensure);
            self.add_instr(Instr::PutGlobalVar {
                name: ident("$!"),
                value: Operand::Variable(saved),
            });
            self.add_instr(Instr::copy(result.clone(), value));
            if let Some(index) = ensure {
                if index + 1 == self.ensures.len() {
                    self.splice_ensure(index);
                }
            }
            self.add_instr(Instr::Jump(end_label.clone()));
        }
        Ok(())
    }

    pub(super) fn exception_check(&mut self, types: Operand, exception: &Variable, caught: &Label) {
        let exception = Operand::Variable(exception.clone());
        let matched = self.emit_result(|result| Instr::RescueEqq {
            result,
            types,
            exception,
        });
        let true_value = self.manager.true_value();
        self.add_instr(Instr::beq(Operand::Variable(matched), true_value, caught.clone()));
    }

    /// Put `$!` back as the innermost rescue found it, when leaving to
    /// `current_loop` does not also leave that rescue's loop.
    pub(super) fn restore_exception(&mut self, current_loop: Option<usize>) {
        let Some(frame) = self.rescues.last() else {
            return;
        };
        if frame.innermost_loop == current_loop {
            let saved = frame.saved_exception.clone();
            self.add_instr(Instr::PutGlobalVar {
                name: ident("$!"),
                value: Operand::Variable(saved),
            });
        }
    }

    // Scope-level handlers

    /// Wrap a finished method body in a region that turns a non-local
    /// return aimed at this method into an ordinary return.
    pub(super) fn handle_nonlocal_return_in_method(&mut self) {
        let begin = self.new_label();
        let end = self.new_label();
        let handler = self.new_label();

        // reverse order: the label must come first
        self.prepend_instr(Instr::ExceptionRegionStart {
            rescue: handler.clone(),
        });
        self.prepend_instr(Instr::Label(begin));
        self.add_instr(Instr::ExceptionRegionEnd);

        self.add_instr(Instr::Label(handler));
        let exception = self.emit_result(Instr::ReceiveAnyException);
        if self.config.full_trace {
            let name = self.trace_name();
            self.add_instr(Instr::Trace {
                event: ruir_ir::TraceEvent::Return,
                name,
                file: self.config.file_name.clone(),
                line: -1,
            });
        }
        let ret = self.emit_result(|result| Instr::RuntimeHelperCall {
            result,
            helper: RuntimeHelper::HandleNonlocalReturn,
            args: smallvec![Operand::Variable(exception)],
        });
        self.add_instr(Instr::Return(Operand::Variable(ret)));
        self.add_instr(Instr::Label(end));
    }

    /// Wrap a finished lambda body so `break` and `return` inside it act
    /// as returns from the lambda.
    pub(super) fn handle_break_and_returns_in_lambda(&mut self) {
        let end = self.new_label();
        let handler = global_ensure_label();

        self.prepend_instr(Instr::ExceptionRegionStart {
            rescue: handler.clone(),
        });
        self.add_instr(Instr::ExceptionRegionEnd);

        self.add_instr(Instr::Label(handler));
        let exception = self.emit_result(Instr::ReceiveAnyException);
        let ret = self.emit_result(|result| Instr::RuntimeHelperCall {
            result,
            helper: RuntimeHelper::HandleBreakAndReturnsInLambda,
            args: smallvec![Operand::Variable(exception)],
        });
        self.add_instr(Instr::Return(Operand::Variable(ret)));
        self.add_instr(Instr::Label(end));
    }

    /// Emit the call `emit` produces, protected so that a `break` from
    /// `closure` lands here as the call's value. Unprotected when the
    /// closure has no `break`.
    pub(super) fn receive_break_exception(
        &mut self,
        closure: Option<&Operand>,
        emit: impl FnOnce(&mut Self) -> Variable,
    ) -> Variable {
        let breaks = closure
            .and_then(Operand::closure)
            .is_some_and(|c| self.tree[c].has_flag(ScopeFlags::HAS_BREAK_INSTRS));
        if !breaks {
            return emit(self);
        }

        let begin = self.new_label();
        let end = self.new_label();
        let rescue = self.new_label();

        self.add_instr(Instr::Label(begin));
        self.add_instr(Instr::ExceptionRegionStart {
            rescue: rescue.clone(),
        });
        let result = emit(self);
        self.add_instr(Instr::Jump(end.clone()));
        self.add_instr(Instr::ExceptionRegionEnd);

        self.add_instr(Instr::Label(rescue));
        let exception = self.emit_result(Instr::ReceiveAnyException);
        self.add_instr(Instr::RuntimeHelperCall {
            result: result.clone(),
            helper: RuntimeHelper::HandlePropagateBreak,
            args: smallvec![Operand::Variable(exception)],
        });
        self.add_instr(Instr::Label(end));
        result
    }
}
