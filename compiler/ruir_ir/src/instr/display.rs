//! Textual form of instructions: `result = mnemonic(operands)`.

use std::fmt;

use super::{CallKind, Instr, RuntimeHelper, TraceEvent};
use crate::operand::{write_list, Operand};

impl RuntimeHelper {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeHelper::HandleNonlocalReturn => "handle_nonlocal_return",
            RuntimeHelper::HandlePropagateBreak => "handle_propagate_break",
            RuntimeHelper::HandleBreakAndReturnsInLambda => "handle_break_and_returns_in_lambda",
            RuntimeHelper::MergeKwargs => "merge_kwargs",
            RuntimeHelper::IsDefinedBackref => "is_defined_backref",
            RuntimeHelper::IsDefinedNthRef => "is_defined_nth_ref",
            RuntimeHelper::IsDefinedGlobal => "is_defined_global",
            RuntimeHelper::IsDefinedInstanceVar => "is_defined_instance_var",
            RuntimeHelper::IsDefinedClassVar => "is_defined_class_var",
            RuntimeHelper::IsDefinedSuper => "is_defined_super",
            RuntimeHelper::IsDefinedMethod => "is_defined_method",
            RuntimeHelper::IsDefinedCall => "is_defined_call",
            RuntimeHelper::IsDefinedConstantOrMethod => "is_defined_constant_or_method",
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TraceEvent::Line => "line",
            TraceEvent::Call => "call",
            TraceEvent::Return => "return",
            TraceEvent::Class => "class",
            TraceEvent::End => "end",
        })
    }
}

fn write_opt(f: &mut fmt::Formatter<'_>, op: Option<&Operand>) -> fmt::Result {
    match op {
        Some(op) => write!(f, ", &{op}"),
        None => Ok(()),
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Instr::Label(label) = self {
            return write!(f, "{label}:");
        }
        if let Some(result) = self.result() {
            write!(f, "{result} = ")?;
        }
        f.write_str(self.op().mnemonic())?;
        f.write_str("(")?;
        match self {
            Instr::Label(_) | Instr::ExceptionRegionEnd | Instr::ThreadPoll => {}
            Instr::ReceiveSelf(_)
            | Instr::ReceiveRubyException(_)
            | Instr::ReceiveAnyException(_)
            | Instr::LoadImplicitClosure(_)
            | Instr::LoadFrameClosure(_)
            | Instr::ArgScopeDepth(_)
            | Instr::GetErrorInfo(_) => {}
            Instr::ExceptionRegionStart { rescue } => write!(f, "{rescue}")?,
            Instr::LineNumber(line) => write!(f, "{line}")?,
            Instr::Trace {
                event,
                name,
                file,
                line,
            } => write!(f, "{event}, {name}, {file}:{line}")?,
            Instr::RecordEndBlock { closure: op }
            | Instr::Return(op)
            | Instr::ThrowException(op)
            | Instr::RestoreErrorInfo(op)
            | Instr::ReifyClosure { source: op, .. }
            | Instr::ToAry { array: op, .. }
            | Instr::Copy { value: op, .. }
            | Instr::BlockGiven { block: op, .. }
            | Instr::BuildLambda { closure: op, .. }
            | Instr::UndefMethod { name: op, .. }
            | Instr::BuildSplat { array: op, .. }
            | Instr::AsString { value: op, .. }
            | Instr::Match { receiver: op, .. } => write!(f, "{op}")?,
            Instr::Jump(target) => write!(f, "{target}")?,
            Instr::Beq { a, b, target } | Instr::Bne { a, b, target } => {
                write!(f, "{a}, {b}, {target}")?;
            }
            Instr::NonlocalReturn { value, method_name } => match method_name {
                Some(m) => write!(f, "{value}, {m}")?,
                None => write!(f, "{value}")?,
            },
            Instr::Break { value, scope_name } => write!(f, "{value}, {scope_name}")?,
            Instr::CheckForLocalJumpError { maybe_lambda } => write!(f, "{maybe_lambda}")?,
            Instr::ReceivePreReqdArg { index, .. } => write!(f, "{index}")?,
            Instr::ReceiveOptArg {
                required,
                pre,
                index,
                ..
            } => write!(f, "{index}, req:{required}, pre:{pre}")?,
            Instr::ReceiveRestArg {
                required, index, ..
            } => write!(f, "{index}, req:{required}")?,
            Instr::ReceivePostReqdArg {
                index, pre, post, ..
            } => write!(f, "{index}, pre:{pre}, post:{post}")?,
            Instr::ReceiveKeywordArg { name, required, .. } => {
                write!(f, "{name}, req:{required}")?;
            }
            Instr::ReceiveKeywordRestArg { required, .. } => write!(f, "req:{required}")?,
            Instr::CheckArity {
                required,
                optional,
                rest,
                receives_keywords,
                keyword_rest,
            } => write!(
                f,
                "{required}, {optional}, {rest}, {receives_keywords}, {keyword_rest}"
            )?,
            Instr::RaiseRequiredKeywordArgumentError(name) => write!(f, "{name}")?,
            Instr::ReqdArgMultipleAsgn {
                array,
                pre_count,
                post_count,
                index,
                ..
            } => match (pre_count, post_count) {
                (Some(pre), Some(post)) => write!(f, "{array}, {index}, pre:{pre}, post:{post}")?,
                _ => write!(f, "{array}, {index}")?,
            },
            Instr::RestArgMultipleAsgn {
                array,
                pre_count,
                post_count,
                index,
                ..
            } => write!(f, "{array}, {index}, pre:{pre_count}, post:{post_count}")?,
            Instr::GetField { object, name, .. } => write!(f, "{object}, {name}")?,
            Instr::PutField {
                object,
                name,
                value,
            } => write!(f, "{object}, {name}, {value}")?,
            Instr::GetGlobalVariable { name, .. } => write!(f, "{name}")?,
            Instr::PutGlobalVar { name, value } => write!(f, "{name}, {value}")?,
            Instr::GetClassVariable {
                container, name, ..
            } => write!(f, "{container}, {name}")?,
            Instr::PutClassVariable {
                container,
                name,
                value,
            } => write!(f, "{container}, {name}, {value}")?,
            Instr::GetClassVarContainerModule {
                start_scope,
                object,
                ..
            } => match object {
                Some(o) => write!(f, "{start_scope}, {o}")?,
                None => write!(f, "{start_scope}")?,
            },
            Instr::PutConst {
                module,
                name,
                value,
            } => write!(f, "{module}, {name}, {value}")?,
            Instr::SearchConst {
                name,
                start_scope,
                no_private,
                ..
            } => write!(f, "{name}, {start_scope}, no_priv:{no_private}")?,
            Instr::LexicalSearchConst {
                start_scope, name, ..
            } => write!(f, "{start_scope}, {name}")?,
            Instr::InheritanceSearchConst {
                module,
                name,
                no_private,
                ..
            } => write!(f, "{module}, {name}, no_priv:{no_private}")?,
            Instr::ConstMissing { module, name, .. } => write!(f, "{module}, {name}")?,
            Instr::SetCapturedVar {
                match_data, name, ..
            } => write!(f, "{match_data}, {name}")?,
            Instr::GetEncoding { encoding, .. } => write!(f, "{encoding}")?,
            Instr::Call(call) => {
                let kind = match call.kind {
                    CallKind::Normal => "NORMAL",
                    CallKind::Functional => "FUNCTIONAL",
                    CallKind::Variable => "VARIABLE",
                };
                write!(f, "{kind}, {}, {}", call.name, call.receiver)?;
                if !call.args.is_empty() {
                    f.write_str(", ")?;
                    write_list(f, &call.args)?;
                }
                write_opt(f, call.closure.as_ref())?;
            }
            Instr::AttrAssign {
                receiver,
                name,
                args,
            } => {
                write!(f, "{receiver}, {name}")?;
                if !args.is_empty() {
                    f.write_str(", ")?;
                    write_list(f, args)?;
                }
            }
            Instr::InstanceSuper {
                defining_module,
                name,
                args,
                closure,
                ..
            }
            | Instr::ClassSuper {
                defining_module,
                name,
                args,
                closure,
                ..
            } => {
                write!(f, "{defining_module}, {name}")?;
                if !args.is_empty() {
                    f.write_str(", ")?;
                    write_list(f, args)?;
                }
                write_opt(f, closure.as_ref())?;
            }
            Instr::UnresolvedSuper {
                receiver,
                args,
                closure,
                ..
            }
            | Instr::ZSuper {
                receiver,
                args,
                closure,
                ..
            } => {
                write!(f, "{receiver}")?;
                if !args.is_empty() {
                    f.write_str(", ")?;
                    write_list(f, args)?;
                }
                write_opt(f, closure.as_ref())?;
            }
            Instr::Yield {
                block, arg, unwrap, ..
            } => {
                write!(f, "{block}")?;
                if let Some(arg) = arg {
                    write!(f, ", {arg}")?;
                }
                if *unwrap {
                    f.write_str(", unwrap")?;
                }
            }
            Instr::RuntimeHelperCall { helper, args, .. } => {
                f.write_str(helper.as_str())?;
                if !args.is_empty() {
                    f.write_str(", ")?;
                    write_list(f, args)?;
                }
            }
            Instr::DefineClass {
                body,
                container,
                superclass,
                ..
            } => write!(f, "scope#{}, {container}, {superclass}", body.raw())?,
            Instr::DefineMetaClass { object, body, .. } => {
                write!(f, "{object}, scope#{}", body.raw())?;
            }
            Instr::DefineModule {
                body, container, ..
            } => write!(f, "scope#{}, {container}", body.raw())?,
            Instr::ProcessModuleBody { module, block, .. } => write!(f, "{module}, {block}")?,
            Instr::DefineInstanceMethod(body) => write!(f, "scope#{}", body.raw())?,
            Instr::DefineClassMethod { object, method } => {
                write!(f, "{object}, scope#{}", method.raw())?;
            }
            Instr::Alias { new_name, old_name } | Instr::GVarAlias { new_name, old_name } => {
                write!(f, "{new_name}, {old_name}")?;
            }
            Instr::BuildCompoundArray {
                first,
                second,
                is_push,
                ..
            } => {
                let how = if *is_push { "push" } else { "cat" };
                write!(f, "{first}, {second}, {how}")?;
            }
            Instr::BuildCompoundString { pieces, .. } | Instr::Backtick { pieces, .. } => {
                write_list(f, pieces)?;
            }
            Instr::BuildDynRegExp { pieces, .. } => write_list(f, pieces)?,
            Instr::BuildRange {
                begin,
                end,
                exclusive,
                ..
            } => {
                let dots = if *exclusive { "..." } else { ".." };
                write!(f, "{begin}{dots}{end}")?;
            }
            Instr::Eqq {
                receiver, value, ..
            } => write!(f, "{receiver}, {value}")?,
            Instr::RescueEqq {
                types, exception, ..
            } => write!(f, "{types}, {exception}")?,
            Instr::Match2 {
                receiver, value, ..
            }
            | Instr::Match3 {
                receiver, value, ..
            } => write!(f, "{receiver}, {value}")?,
        }
        f.write_str(")")
    }
}
