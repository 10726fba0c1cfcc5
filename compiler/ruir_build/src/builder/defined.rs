//! `defined?`.
//!
//! The result is a frozen description string (`"method"`, `"local-variable"`
//! and so on) or nil. Checks that may raise while probing (constant paths,
//! receivers of calls) run inside a region that turns any exception into
//! nil.

use ruir_ast::{ident, Ident, Node, NodeKind};
use ruir_ir::{CallArgs, Instr, Label, Operand, RuntimeHelper, Variable};
use smallvec::smallvec;

use super::Builder;
use crate::error::BuildResult;

impl Builder<'_> {
    pub(super) fn build_defined(&mut self, expression: &Node) -> BuildResult<Operand> {
        self.build_get_definition(expression)
    }

    /// Description of `node` as `defined?` reports it, or nil.
    pub(super) fn build_get_definition(&mut self, node: &Node) -> BuildResult<Operand> {
        let node = node.skip_newlines();
        match &node.kind {
            NodeKind::ClassVarAsgn { .. }
            | NodeKind::ClassVarDecl { .. }
            | NodeKind::ConstDecl { .. }
            | NodeKind::DAsgn { .. }
            | NodeKind::GlobalAsgn { .. }
            | NodeKind::LocalAsgn { .. }
            | NodeKind::MultipleAsgn { .. }
            | NodeKind::OpAsgn { .. }
            | NodeKind::OpAsgnAnd { .. }
            | NodeKind::OpAsgnOr { .. }
            | NodeKind::OpElementAsgn { .. }
            | NodeKind::InstAsgn { .. } => Ok(Operand::frozen("assignment")),
            NodeKind::Or { .. }
            | NodeKind::And { .. }
            | NodeKind::DRegexp { .. }
            | NodeKind::DStr(_) => Ok(Operand::frozen("expression")),
            NodeKind::False => Ok(Operand::frozen("false")),
            NodeKind::True => Ok(Operand::frozen("true")),
            NodeKind::Nil => Ok(Operand::frozen("nil")),
            NodeKind::SelfRef => Ok(Operand::frozen("self")),
            NodeKind::LocalVar { .. } | NodeKind::DVar { .. } => {
                Ok(Operand::frozen("local-variable"))
            }
            NodeKind::Match2 { .. } | NodeKind::Match3 { .. } => Ok(Operand::frozen("method")),
            NodeKind::Array(elements) => self.array_definition(elements),
            NodeKind::BackRef(_) => Ok(self.defined_helper(
                RuntimeHelper::IsDefinedBackref,
                smallvec![Operand::frozen("global-variable")],
            )),
            NodeKind::NthRef(n) => Ok(self.defined_helper(
                RuntimeHelper::IsDefinedNthRef,
                smallvec![
                    Operand::Fixnum(i64::from(*n)),
                    Operand::frozen("global-variable")
                ],
            )),
            NodeKind::GlobalVar(name) => Ok(self.defined_helper(
                RuntimeHelper::IsDefinedGlobal,
                smallvec![
                    Operand::StringLiteral(name.clone()),
                    Operand::frozen("global-variable")
                ],
            )),
            NodeKind::InstVar(name) => Ok(self.defined_helper(
                RuntimeHelper::IsDefinedInstanceVar,
                smallvec![
                    Operand::self_value(),
                    Operand::StringLiteral(name.clone()),
                    Operand::frozen("instance-variable")
                ],
            )),
            NodeKind::ClassVar(name) => {
                let container = self.class_var_container(false);
                Ok(self.defined_helper(
                    RuntimeHelper::IsDefinedClassVar,
                    smallvec![
                        container,
                        Operand::StringLiteral(name.clone()),
                        Operand::frozen("class variable")
                    ],
                ))
            }
            NodeKind::Super { args, .. } => {
                let undefined = self.new_label();
                let found = self.super_definition();
                let nil = self.manager.nil();
                self.add_instr(Instr::beq(found, nil, undefined.clone()));
                let args_definition = self.build_get_argument_definition(args.as_deref(), "super")?;
                Ok(Operand::Variable(
                    self.defined_check_paths(&undefined, args_definition),
                ))
            }
            NodeKind::ZSuper { .. } => Ok(self.super_definition()),
            NodeKind::VCall(name) => Ok(self.method_definition(name)),
            NodeKind::FCall { name, args, .. } => {
                let undefined = self.new_label();
                let found = self.method_definition(name);
                let nil = self.manager.nil();
                self.add_instr(Instr::beq(found, nil, undefined.clone()));
                let args_definition =
                    self.build_get_argument_definition(args.as_deref(), "method")?;
                Ok(Operand::Variable(
                    self.defined_check_paths(&undefined, args_definition),
                ))
            }
            NodeKind::Yield { .. } => {
                let undefined = self.new_label();
                let block = Operand::Variable(self.yield_closure());
                let given = self.emit_result(|result| Instr::BlockGiven { result, block });
                let false_value = self.manager.false_value();
                self.add_instr(Instr::beq(
                    Operand::Variable(given),
                    false_value,
                    undefined.clone(),
                ));
                Ok(Operand::Variable(
                    self.defined_check_paths(&undefined, Operand::frozen("yield")),
                ))
            }
            NodeKind::Const(name)
            | NodeKind::Colon2 { left: None, name } => Ok(self.const_definition(name)),
            NodeKind::Colon2 {
                left: Some(left),
                name,
            } => self.colon_definition(Some(left), name),
            NodeKind::Colon3(name) => self.colon_definition(None, name),
            NodeKind::Call { receiver, name, .. } => {
                self.protect_code_with_rescue(
                    |b| {
                        let undefined = b.new_label();
                        let receiver_definition = b.build_get_definition(receiver)?;
                        let nil = b.manager.nil();
                        b.add_instr(Instr::beq(receiver_definition, nil, undefined.clone()));
                        let receiver = b.build(receiver)?;
                        let found = b.defined_helper(
                            RuntimeHelper::IsDefinedCall,
                            smallvec![
                                receiver,
                                Operand::StringLiteral(name.clone()),
                                Operand::frozen("method")
                            ],
                        );
                        Ok(Operand::Variable(b.defined_check_paths(&undefined, found)))
                    },
                    |b| b.manager.nil(),
                )
            }
            NodeKind::AttrAssign {
                receiver,
                name,
                args,
            } => self.protect_code_with_rescue(
                |b| {
                    let undefined = b.new_label();
                    let receiver_definition = b.build_get_definition(receiver)?;
                    let nil = b.manager.nil();
                    b.add_instr(Instr::beq(receiver_definition, nil.clone(), undefined.clone()));
                    let receiver = b.build(receiver)?;
                    let true_value = b.manager.true_value();
                    let found = b.defined_helper(
                        RuntimeHelper::IsDefinedMethod,
                        smallvec![
                            receiver,
                            Operand::StringLiteral(name.clone()),
                            true_value,
                            Operand::frozen("assignment")
                        ],
                    );
                    b.add_instr(Instr::beq(found, nil, undefined.clone()));
                    let args_definition =
                        b.build_get_argument_definition(args.as_deref(), "assignment")?;
                    Ok(Operand::Variable(
                        b.defined_check_paths(&undefined, args_definition),
                    ))
                },
                |b| b.manager.nil(),
            ),
            _ => Ok(Operand::frozen("expression")),
        }
    }

    fn defined_helper(&mut self, helper: RuntimeHelper, args: CallArgs) -> Operand {
        Operand::Variable(self.emit_result(|result| Instr::RuntimeHelperCall {
            result,
            helper,
            args,
        }))
    }

    fn super_definition(&mut self) -> Operand {
        self.defined_helper(
            RuntimeHelper::IsDefinedSuper,
            smallvec![Operand::self_value(), Operand::frozen("super")],
        )
    }

    fn method_definition(&mut self, name: &Ident) -> Operand {
        let false_value = self.manager.false_value();
        self.defined_helper(
            RuntimeHelper::IsDefinedMethod,
            smallvec![
                Operand::self_value(),
                Operand::StringLiteral(name.clone()),
                false_value,
                Operand::frozen("method")
            ],
        )
    }

    /// An array is defined when all its elements are.
    fn array_definition(&mut self, elements: &[Node]) -> BuildResult<Operand> {
        let undefined = self.new_label();
        let done = self.new_label();
        let result = self.temp();
        for element in elements {
            let definition = self.build_get_definition(element)?;
            let nil = self.manager.nil();
            self.add_instr(Instr::beq(definition, nil, undefined.clone()));
        }
        self.add_instr(Instr::copy(result.clone(), Operand::frozen("expression")));
        self.add_instr(Instr::Jump(done.clone()));
        self.add_instr(Instr::Label(undefined));
        let nil = self.manager.nil();
        self.add_instr(Instr::copy(result.clone(), nil));
        self.add_instr(Instr::Label(done));
        Ok(Operand::Variable(result))
    }

    /// Lexical lookup, then inheritance lookup in the container.
    fn const_definition(&mut self, name: &Ident) -> Operand {
        let defined = self.new_label();
        let done = self.new_label();
        let result = self.temp();
        let start_scope = self.starting_search_scope();
        self.add_instr(Instr::LexicalSearchConst {
            result: result.clone(),
            start_scope,
            name: name.clone(),
        });
        self.add_instr(Instr::bne(
            Operand::Variable(result.clone()),
            Operand::Undefined,
            defined.clone(),
        ));
        let module = self.find_container_module();
        self.add_instr(Instr::InheritanceSearchConst {
            result: result.clone(),
            module,
            name: name.clone(),
            no_private: false,
        });
        self.add_instr(Instr::bne(
            Operand::Variable(result.clone()),
            Operand::Undefined,
            defined.clone(),
        ));
        let nil = self.manager.nil();
        self.add_instr(Instr::copy(result.clone(), nil));
        self.add_instr(Instr::Jump(done.clone()));
        self.add_instr(Instr::Label(defined));
        self.add_instr(Instr::copy(result.clone(), Operand::frozen("constant")));
        self.add_instr(Instr::Label(done));
        Operand::Variable(result)
    }

    /// `A::B` (with `left`) or `::B`. Evaluating `A` may raise; `$!` is
    /// restored when it does.
    fn colon_definition(&mut self, left: Option<&Node>, name: &Ident) -> BuildResult<Operand> {
        let error_info = self.emit_result(Instr::GetErrorInfo);
        self.protect_code_with_rescue(
            |b| {
                let Some(left) = left else {
                    return Ok(b.defined_helper(
                        RuntimeHelper::IsDefinedConstantOrMethod,
                        smallvec![Operand::ObjectClass, Operand::FrozenString(name.clone())],
                    ));
                };
                let bad = b.new_label();
                let done = b.new_label();
                let result = b.temp();
                let test = b.build_get_definition(left)?;
                let nil = b.manager.nil();
                b.add_instr(Instr::beq(test, nil.clone(), bad.clone()));
                let module = b.build(left)?;
                b.add_instr(Instr::RuntimeHelperCall {
                    result: result.clone(),
                    helper: RuntimeHelper::IsDefinedConstantOrMethod,
                    args: smallvec![module, Operand::FrozenString(name.clone())],
                });
                b.add_instr(Instr::Jump(done.clone()));
                b.add_instr(Instr::Label(bad));
                b.add_instr(Instr::copy(result.clone(), nil));
                b.add_instr(Instr::Label(done));
                Ok(Operand::Variable(result))
            },
            |b| {
                b.add_instr(Instr::RestoreErrorInfo(Operand::Variable(error_info)));
                b.manager.nil()
            },
        )
    }

    /// `type` when every argument is defined, nil otherwise.
    fn build_get_argument_definition(&mut self, args: Option<&Node>, kind: &str) -> BuildResult<Operand> {
        let Some(args) = args else {
            return Ok(Operand::frozen(kind));
        };
        let single = std::slice::from_ref(args);
        let elements = match &args.kind {
            NodeKind::Array(elements) => elements.as_slice(),
            _ => single,
        };

        let fail = self.new_label();
        let mut fail_path = false;
        let mut value = Operand::frozen(kind);
        for element in elements {
            let definition = self.build_get_definition(element)?;
            if definition == self.manager.nil() {
                value = self.manager.nil();
                break;
            }
            if !definition.is_immutable_literal() {
                fail_path = true;
                let nil = self.manager.nil();
                self.add_instr(Instr::beq(definition, nil, fail.clone()));
            }
        }

        if fail_path {
            return Ok(Operand::Variable(self.defined_check_paths(&fail, value)));
        }
        Ok(value)
    }

    /// `value` on the fall-through path, nil when control arrives at
    /// `undefined`.
    fn defined_check_paths(&mut self, undefined: &Label, value: Operand) -> Variable {
        let defined = self.new_label();
        let result = self.value_in_temp(value);
        self.add_instr(Instr::Jump(defined.clone()));
        self.add_instr(Instr::Label(undefined.clone()));
        let nil = self.manager.nil();
        self.add_instr(Instr::copy(result.clone(), nil));
        self.add_instr(Instr::Label(defined));
        result
    }

    /// Run `protected` in a region that catches any `Exception`, yielding
    /// `rescued`'s value instead.
    fn protect_code_with_rescue(
        &mut self,
        protected: impl FnOnce(&mut Self) -> BuildResult<Operand>,
        rescued: impl FnOnce(&mut Self) -> Operand,
    ) -> BuildResult<Operand> {
        let result = self.temp();
        let begin = self.new_label();
        let end = self.new_label();
        let rescue = self.new_label();

        self.add_instr(Instr::Label(begin));
        self.add_instr(Instr::ExceptionRegionStart {
            rescue: rescue.clone(),
        });
        self.rescuers.push(rescue.clone());
        let value = protected(self);
        self.rescuers.pop();
        let value = value?;
        self.add_instr(Instr::copy(result.clone(), value));
        self.add_instr(Instr::Jump(end.clone()));
        self.add_instr(Instr::ExceptionRegionEnd);

        let caught = self.new_label();
        self.add_instr(Instr::Label(rescue));
        let exception = self.emit_result(Instr::ReceiveRubyException);
        let exception_class = self.emit_result(|result| Instr::InheritanceSearchConst {
            result,
            module: Operand::ObjectClass,
            name: ident("Exception"),
            no_private: false,
        });
        self.exception_check(Operand::Variable(exception_class), &exception, &caught);
        self.add_instr(Instr::ThrowException(Operand::Variable(exception)));

        self.add_instr(Instr::Label(caught));
        let value = rescued(self);
        self.add_instr(Instr::copy(result.clone(), value));
        self.add_instr(Instr::Label(end));
        Ok(Operand::Variable(result))
    }
}
