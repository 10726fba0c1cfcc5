//! Assignment to an already built value, multiple assignment and the
//! compound (`op=`, `||=`, `&&=`) assignment forms.

use ruir_ast::{ident, Ident, MasgnRest, MultipleAsgnPattern, Node, NodeKind};
use ruir_ir::{CallArgs, CallKind, Instr, Operand, Variable};
use smallvec::smallvec;

use super::args::{count, Element};
use super::dispatch::contains_variable_assignment;
use super::Builder;
use crate::error::BuildResult;

impl Builder<'_> {
    /// Store `value` into the target `node` names. Used for destructuring,
    /// `rescue => target` style bindings and non-local `for` variables.
    pub(super) fn build_assignment(&mut self, node: &Node, value: Variable) -> BuildResult<()> {
        let value = Operand::Variable(value);
        match &node.kind {
            NodeKind::AttrAssign {
                receiver,
                name,
                args,
            } => {
                self.build_attr_assign_assignment(receiver, name, args.as_deref(), value)?;
            }
            NodeKind::ClassVarAsgn { name, .. } => {
                let container = self.class_var_container(false);
                self.add_instr(Instr::PutClassVariable {
                    container,
                    name: name.clone(),
                    value,
                });
            }
            NodeKind::ClassVarDecl { name, .. } => {
                let container = self.class_var_container(true);
                self.add_instr(Instr::PutClassVariable {
                    container,
                    name: name.clone(),
                    value,
                });
            }
            NodeKind::ConstDecl { name, path, .. } => {
                self.put_constant(name, path.as_deref(), value)?;
            }
            NodeKind::DAsgn { name, depth, .. } | NodeKind::LocalAsgn { name, depth, .. } => {
                let var = self.local_var(name, *depth);
                self.add_instr(Instr::copy(var, value));
            }
            NodeKind::GlobalAsgn { name, .. } => self.add_instr(Instr::PutGlobalVar {
                name: name.clone(),
                value,
            }),
            NodeKind::InstAsgn { name, .. } => self.add_instr(Instr::PutField {
                object: Operand::self_value(),
                name: name.clone(),
                value,
            }),
            NodeKind::MultipleAsgn { pattern, .. } => {
                let array = self.emit_result(|result| Instr::ToAry {
                    result,
                    array: value,
                });
                self.build_masgn_assignment(pattern, &Operand::Variable(array))?;
            }
            _ => return Err(self.not_compilable(node, "invalid assignment target")),
        }
        Ok(())
    }

    // Multiple assignment

    /// `a, *b, c = value`. The statement's value is the right-hand side
    /// itself, not the array it is splatted into.
    pub(super) fn build_multiple_asgn(
        &mut self,
        pattern: &MultipleAsgnPattern,
        value_node: &Node,
    ) -> BuildResult<Operand> {
        let value = self.build(value_node)?;
        let ret = self.value_in_temp(value);
        let values = if matches!(value_node.kind, NodeKind::Array(_)) {
            ret.clone()
        } else {
            self.emit_result(|result| Instr::ToAry {
                result,
                array: Operand::Variable(ret.clone()),
            })
        };
        self.build_masgn_assignment(pattern, &Operand::Variable(values))?;
        Ok(Operand::Variable(ret))
    }

    /// Every element is extracted before any target is assigned, so
    /// `a, b = b, a` swaps.
    fn build_masgn_assignment(
        &mut self,
        pattern: &MultipleAsgnPattern,
        values: &Operand,
    ) -> BuildResult<()> {
        let pre = count(pattern.pre.len());
        let post = count(pattern.post_count());
        let mut assigns: Vec<(&Node, Variable)> = Vec::new();

        for (i, target) in pattern.pre.iter().enumerate() {
            let element = self.extract_element(values, Element::pre(count(i)));
            assigns.push((target, element));
        }
        if let Some(MasgnRest::Target(target)) = &pattern.rest {
            let element = self.extract_element(values, Element::rest(pre, post));
            assigns.push((target, element));
        }
        for (j, target) in pattern.post.iter().enumerate() {
            let element = self.extract_element(values, Element::post(pre, post, count(j)));
            assigns.push((target, element));
        }

        for (target, element) in assigns {
            self.build_assignment(target, element)?;
        }
        Ok(())
    }

    fn extract_element(&mut self, values: &Operand, element: Element) -> Variable {
        self.emit_result(|result| element.extract(result, values.clone()))
    }

    // Compound assignment

    /// `recv.attr op= value`. The expression's value is what was computed,
    /// never the writer's return value.
    pub(super) fn build_op_asgn(
        &mut self,
        receiver: &Node,
        reader: &Ident,
        writer: &Ident,
        operator: &Ident,
        value: &Node,
    ) -> BuildResult<Operand> {
        let read_value = self.temp();
        let written = self.temp();
        let receiver = self.build(receiver)?;
        self.add_call(read_value.clone(), reader, receiver.clone(), CallArgs::new());

        match &**operator {
            "||" | "&&" => {
                let done = self.new_label();
                let short_circuit = if &**operator == "||" {
                    self.manager.true_value()
                } else {
                    self.manager.false_value()
                };
                self.add_instr(Instr::beq(
                    Operand::Variable(read_value.clone()),
                    short_circuit,
                    done.clone(),
                ));
                let value = self.build(value)?;
                self.add_call(written, writer, receiver, smallvec![value.clone()]);
                self.add_instr(Instr::copy(read_value.clone(), value));
                self.add_instr(Instr::Label(done));
                Ok(Operand::Variable(read_value))
            }
            _ => {
                let value = self.build(value)?;
                let set_value = self.temp();
                self.add_call(
                    set_value.clone(),
                    operator,
                    Operand::Variable(read_value),
                    smallvec![value],
                );
                let set_operand = Operand::Variable(set_value);
                self.add_call(written, writer, receiver, smallvec![set_operand.clone()]);
                Ok(set_operand)
            }
        }
    }

    /// `x &&= y`; `second` is the assignment `x = y`.
    pub(super) fn build_op_asgn_and(&mut self, first: &Node, second: &Node) -> BuildResult<Operand> {
        let done = self.new_label();
        let current = self.build(first)?;
        let result = self.value_in_temp(current.clone());
        let false_value = self.manager.false_value();
        self.add_instr(Instr::beq(current, false_value, done.clone()));
        let assigned = self.build(second)?;
        self.add_instr(Instr::copy(result.clone(), assigned));
        self.add_instr(Instr::Label(done));
        Ok(Operand::Variable(result))
    }

    /// `x ||= y`. Targets that may be undefined (globals, instance and
    /// class variables, constants) are checked with `defined?` first so
    /// reading them cannot warn or raise.
    pub(super) fn build_op_asgn_or(&mut self, first: &Node, second: &Node) -> BuildResult<Operand> {
        let done = self.new_label();
        let flag = self.temp();

        let undefined = if needs_definition_check(first) {
            let undefined = self.new_label();
            let definition = self.build_get_definition(first)?;
            self.add_instr(Instr::copy(flag.clone(), definition));
            let nil = self.manager.nil();
            self.add_instr(Instr::beq(
                Operand::Variable(flag.clone()),
                nil,
                undefined.clone(),
            ));
            Some(undefined)
        } else {
            None
        };

        let current = self.build(first)?;
        self.add_instr(Instr::copy(flag.clone(), current.clone()));
        let result = self.value_in_temp(current);
        if let Some(undefined) = undefined {
            self.add_instr(Instr::Label(undefined));
        }
        let true_value = self.manager.true_value();
        self.add_instr(Instr::beq(Operand::Variable(flag), true_value, done.clone()));
        let assigned = self.build(second)?;
        self.add_instr(Instr::copy(result.clone(), assigned));
        self.add_instr(Instr::Label(done));
        Ok(Operand::Variable(result))
    }

    /// `recv[args] op= value`, including `||=` and `&&=`.
    pub(super) fn build_op_element_asgn(
        &mut self,
        receiver: &Node,
        args: Option<&Node>,
        operator: &Ident,
        value: &Node,
    ) -> BuildResult<Operand> {
        let ordered = args.is_some_and(contains_variable_assignment)
            || contains_variable_assignment(value);
        let array = self.build_with_order(receiver, ordered)?;
        let mut arg_list = self.build_call_args(args)?;
        let element = self.temp();
        let reader = ident("[]");
        let writer = ident("[]=");
        self.add_call(element.clone(), &reader, array.clone(), arg_list.clone());

        match &**operator {
            "||" | "&&" => {
                let done = self.new_label();
                let short_circuit = if &**operator == "||" {
                    self.manager.true_value()
                } else {
                    self.manager.false_value()
                };
                self.add_instr(Instr::beq(
                    Operand::Variable(element.clone()),
                    short_circuit,
                    done.clone(),
                ));
                let value = self.build(value)?;
                arg_list.push(value.clone());
                self.add_call(element.clone(), &writer, array, arg_list);
                self.add_instr(Instr::copy(element.clone(), value));
                self.add_instr(Instr::Label(done));
            }
            _ => {
                let value = self.build(value)?;
                self.add_call(
                    element.clone(),
                    operator,
                    Operand::Variable(element.clone()),
                    smallvec![value],
                );
                arg_list.push(Operand::Variable(element.clone()));
                let written = self.temp();
                self.add_call(written, &writer, array, arg_list);
            }
        }
        Ok(Operand::Variable(element))
    }

    /// A plain block-less call.
    fn add_call(&mut self, result: Variable, name: &Ident, receiver: Operand, args: CallArgs) {
        let call = self.call_instr(CallKind::Normal, result, name, receiver, args, None, false);
        self.add_instr(call);
    }
}

/// Reading these before they are assigned warns or raises.
fn needs_definition_check(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::GlobalVar(_)
            | NodeKind::InstVar(_)
            | NodeKind::ClassVar(_)
            | NodeKind::Const(_)
            | NodeKind::Colon2 { .. }
            | NodeKind::Colon3(_)
    )
}
