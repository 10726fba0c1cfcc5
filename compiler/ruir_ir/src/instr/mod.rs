//! The instruction catalog.
//!
//! [`Instr`] is a closed enumeration. Each variant names its inputs as
//! [`Operand`]s and carries at most one result [`Variable`]. Static facts
//! about a variant live on its [`Operation`], reached via [`Instr::op`].
//!
//! # Markers
//!
//! `Label`, `ExceptionRegionStart` and `ExceptionRegionEnd` compute nothing.
//! They delimit basic blocks and exception-handler regions for later CFG
//! construction; region markers are always well nested.

mod display;
mod operation;

use ruir_ast::{Ident, RegexpOptions};
use smallvec::SmallVec;

use crate::label::Label;
use crate::operand::Operand;
use crate::scope::ScopeId;
use crate::variable::Variable;

pub use operation::{OpFlags, Operation};

/// Argument list of a call-like instruction.
pub type CallArgs = SmallVec<[Operand; 4]>;

/// How the call site names its method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `recv.m(args)`
    Normal,
    /// `m(args)`: implicit self, private methods visible.
    Functional,
    /// `m`: could have been a local variable.
    Variable,
}

/// A method dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct CallInstr {
    pub result: Variable,
    pub kind: CallKind,
    pub name: Ident,
    pub receiver: Operand,
    pub args: CallArgs,
    pub closure: Option<Operand>,
    /// Call site is `Proc.new` (needs the caller's block).
    pub proc_new: bool,
    /// Call site may activate refinements (`using`).
    pub potentially_refined: bool,
}

/// Out-of-line helpers invoked via [`Instr::RuntimeHelperCall`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeHelper {
    HandleNonlocalReturn,
    HandlePropagateBreak,
    HandleBreakAndReturnsInLambda,
    MergeKwargs,
    IsDefinedBackref,
    IsDefinedNthRef,
    IsDefinedGlobal,
    IsDefinedInstanceVar,
    IsDefinedClassVar,
    IsDefinedSuper,
    IsDefinedMethod,
    IsDefinedCall,
    IsDefinedConstantOrMethod,
}

/// Event reported by a `Trace` instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    Line,
    Call,
    Return,
    Class,
    End,
}

/// One IR instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    // Markers and bookkeeping
    Label(Label),
    ExceptionRegionStart { rescue: Label },
    ExceptionRegionEnd,
    LineNumber(u32),
    Trace { event: TraceEvent, name: Ident, file: Ident, line: i64 },
    ThreadPoll,
    RecordEndBlock { closure: Operand },

    // Control transfer
    Jump(Label),
    Beq { a: Operand, b: Operand, target: Label },
    Bne { a: Operand, b: Operand, target: Label },
    Return(Operand),
    /// Return from a closure to the lexically enclosing method `method_name`
    /// (`None` when no such method exists).
    NonlocalReturn { value: Operand, method_name: Option<Ident> },
    /// Break out of a closure to the call site in scope `scope_name`.
    Break { value: Operand, scope_name: Ident },
    ThrowException(Operand),
    CheckForLocalJumpError { maybe_lambda: bool },

    // Argument and exception receipt
    ReceiveSelf(Variable),
    ReceivePreReqdArg { result: Variable, index: u32 },
    ReceiveOptArg { result: Variable, required: u32, pre: u32, index: u32 },
    /// `required` is the count of required and optional args preceding the rest.
    ReceiveRestArg { result: Variable, required: u32, index: u32 },
    ReceivePostReqdArg { result: Variable, index: u32, pre: u32, post: u32 },
    ReceiveKeywordArg { result: Variable, name: Ident, required: u32 },
    ReceiveKeywordRestArg { result: Variable, required: u32 },
    CheckArity {
        required: u32,
        optional: u32,
        rest: bool,
        receives_keywords: bool,
        keyword_rest: bool,
    },
    ReceiveRubyException(Variable),
    /// Receives any raised value, including internal unwinds.
    ReceiveAnyException(Variable),
    LoadImplicitClosure(Variable),
    LoadFrameClosure(Variable),
    ReifyClosure { result: Variable, source: Operand },
    ArgScopeDepth(Variable),
    RaiseRequiredKeywordArgumentError(Ident),
    ToAry { result: Variable, array: Operand },
    /// Element of `array` for a required destructuring target. With no
    /// counts, `index` counts from the front; with counts, from the end.
    ReqdArgMultipleAsgn {
        result: Variable,
        array: Operand,
        pre_count: Option<u32>,
        post_count: Option<u32>,
        index: u32,
    },
    RestArgMultipleAsgn {
        result: Variable,
        array: Operand,
        pre_count: u32,
        post_count: u32,
        index: u32,
    },

    // Loads and stores
    Copy { result: Variable, value: Operand },
    GetField { result: Variable, object: Operand, name: Ident },
    PutField { object: Operand, name: Ident, value: Operand },
    GetGlobalVariable { result: Variable, name: Ident },
    PutGlobalVar { name: Ident, value: Operand },
    GetClassVariable { result: Variable, container: Operand, name: Ident },
    PutClassVariable { container: Operand, name: Ident, value: Operand },
    /// `object` is absent for class variable declarations.
    GetClassVarContainerModule {
        result: Variable,
        start_scope: Operand,
        object: Option<Operand>,
    },
    PutConst { module: Operand, name: Ident, value: Operand },
    SearchConst { result: Variable, name: Ident, start_scope: Operand, no_private: bool },
    LexicalSearchConst { result: Variable, start_scope: Operand, name: Ident },
    InheritanceSearchConst { result: Variable, module: Operand, name: Ident, no_private: bool },
    ConstMissing { result: Variable, module: Operand, name: Ident },
    SetCapturedVar { result: Variable, match_data: Operand, name: Ident },
    GetEncoding { result: Variable, encoding: Ident },
    GetErrorInfo(Variable),
    RestoreErrorInfo(Operand),
    BlockGiven { result: Variable, block: Operand },

    // Calls
    Call(Box<CallInstr>),
    AttrAssign { receiver: Operand, name: Ident, args: CallArgs },
    InstanceSuper {
        result: Variable,
        defining_module: Operand,
        name: Ident,
        args: CallArgs,
        closure: Option<Operand>,
    },
    ClassSuper {
        result: Variable,
        defining_module: Operand,
        name: Ident,
        args: CallArgs,
        closure: Option<Operand>,
    },
    UnresolvedSuper { result: Variable, receiver: Operand, args: CallArgs, closure: Option<Operand> },
    ZSuper { result: Variable, receiver: Operand, args: CallArgs, closure: Option<Operand> },
    Yield { result: Variable, block: Operand, arg: Option<Operand>, unwrap: bool },
    RuntimeHelperCall { result: Variable, helper: RuntimeHelper, args: CallArgs },
    BuildLambda { result: Variable, closure: Operand },

    // Definitions
    DefineClass { result: Variable, body: ScopeId, container: Operand, superclass: Operand },
    DefineMetaClass { result: Variable, object: Operand, body: ScopeId },
    DefineModule { result: Variable, body: ScopeId, container: Operand },
    ProcessModuleBody { result: Variable, module: Operand, block: Operand },
    DefineInstanceMethod(ScopeId),
    DefineClassMethod { object: Operand, method: ScopeId },
    Alias { new_name: Operand, old_name: Operand },
    GVarAlias { new_name: Operand, old_name: Operand },
    UndefMethod { result: Variable, name: Operand },

    // Value construction
    BuildCompoundArray { result: Variable, first: Operand, second: Operand, is_push: bool },
    BuildCompoundString { result: Variable, pieces: Vec<Operand> },
    BuildDynRegExp { result: Variable, pieces: Vec<Operand>, options: RegexpOptions },
    BuildRange { result: Variable, begin: Operand, end: Operand, exclusive: bool },
    BuildSplat { result: Variable, array: Operand },
    Backtick { result: Variable, pieces: Vec<Operand> },
    AsString { result: Variable, value: Operand },
    Eqq { result: Variable, receiver: Operand, value: Operand },
    RescueEqq { result: Variable, types: Operand, exception: Operand },
    Match { result: Variable, receiver: Operand },
    Match2 { result: Variable, receiver: Operand, value: Operand },
    Match3 { result: Variable, receiver: Operand, value: Operand },
}

impl Instr {
    #[inline]
    pub fn copy(result: Variable, value: Operand) -> Self {
        Instr::Copy { result, value }
    }

    #[inline]
    pub fn beq(a: Operand, b: Operand, target: Label) -> Self {
        Instr::Beq { a, b, target }
    }

    #[inline]
    pub fn bne(a: Operand, b: Operand, target: Label) -> Self {
        Instr::Bne { a, b, target }
    }

    /// Opcode tag of this instruction.
    pub fn op(&self) -> Operation {
        match self {
            Instr::Label(_) => Operation::Label,
            Instr::ExceptionRegionStart { .. } => Operation::ExceptionRegionStart,
            Instr::ExceptionRegionEnd => Operation::ExceptionRegionEnd,
            Instr::LineNumber(_) => Operation::LineNumber,
            Instr::Trace { .. } => Operation::Trace,
            Instr::ThreadPoll => Operation::ThreadPoll,
            Instr::RecordEndBlock { .. } => Operation::RecordEndBlock,
            Instr::Jump(_) => Operation::Jump,
            Instr::Beq { .. } => Operation::Beq,
            Instr::Bne { .. } => Operation::Bne,
            Instr::Return(_) => Operation::Return,
            Instr::NonlocalReturn { .. } => Operation::NonlocalReturn,
            Instr::Break { .. } => Operation::Break,
            Instr::ThrowException(_) => Operation::ThrowException,
            Instr::CheckForLocalJumpError { .. } => Operation::CheckForLocalJumpError,
            Instr::ReceiveSelf(_) => Operation::ReceiveSelf,
            Instr::ReceivePreReqdArg { .. } => Operation::ReceivePreReqdArg,
            Instr::ReceiveOptArg { .. } => Operation::ReceiveOptArg,
            Instr::ReceiveRestArg { .. } => Operation::ReceiveRestArg,
            Instr::ReceivePostReqdArg { .. } => Operation::ReceivePostReqdArg,
            Instr::ReceiveKeywordArg { .. } => Operation::ReceiveKeywordArg,
            Instr::ReceiveKeywordRestArg { .. } => Operation::ReceiveKeywordRestArg,
            Instr::CheckArity { .. } => Operation::CheckArity,
            Instr::ReceiveRubyException(_) => Operation::ReceiveRubyException,
            Instr::ReceiveAnyException(_) => Operation::ReceiveAnyException,
            Instr::LoadImplicitClosure(_) => Operation::LoadImplicitClosure,
            Instr::LoadFrameClosure(_) => Operation::LoadFrameClosure,
            Instr::ReifyClosure { .. } => Operation::ReifyClosure,
            Instr::ArgScopeDepth(_) => Operation::ArgScopeDepth,
            Instr::RaiseRequiredKeywordArgumentError(_) => {
                Operation::RaiseRequiredKeywordArgumentError
            }
            Instr::ToAry { .. } => Operation::ToAry,
            Instr::ReqdArgMultipleAsgn { .. } => Operation::ReqdArgMultipleAsgn,
            Instr::RestArgMultipleAsgn { .. } => Operation::RestArgMultipleAsgn,
            Instr::Copy { .. } => Operation::Copy,
            Instr::GetField { .. } => Operation::GetField,
            Instr::PutField { .. } => Operation::PutField,
            Instr::GetGlobalVariable { .. } => Operation::GetGlobalVariable,
            Instr::PutGlobalVar { .. } => Operation::PutGlobalVar,
            Instr::GetClassVariable { .. } => Operation::GetClassVariable,
            Instr::PutClassVariable { .. } => Operation::PutClassVariable,
            Instr::GetClassVarContainerModule { .. } => Operation::GetClassVarContainerModule,
            Instr::PutConst { .. } => Operation::PutConst,
            Instr::SearchConst { .. } => Operation::SearchConst,
            Instr::LexicalSearchConst { .. } => Operation::LexicalSearchConst,
            Instr::InheritanceSearchConst { .. } => Operation::InheritanceSearchConst,
            Instr::ConstMissing { .. } => Operation::ConstMissing,
            Instr::SetCapturedVar { .. } => Operation::SetCapturedVar,
            Instr::GetEncoding { .. } => Operation::GetEncoding,
            Instr::GetErrorInfo(_) => Operation::GetErrorInfo,
            Instr::RestoreErrorInfo(_) => Operation::RestoreErrorInfo,
            Instr::BlockGiven { .. } => Operation::BlockGiven,
            Instr::Call(_) => Operation::Call,
            Instr::AttrAssign { .. } => Operation::AttrAssign,
            Instr::InstanceSuper { .. } => Operation::InstanceSuper,
            Instr::ClassSuper { .. } => Operation::ClassSuper,
            Instr::UnresolvedSuper { .. } => Operation::UnresolvedSuper,
            Instr::ZSuper { .. } => Operation::ZSuper,
            Instr::Yield { .. } => Operation::Yield,
            Instr::RuntimeHelperCall { .. } => Operation::RuntimeHelperCall,
            Instr::BuildLambda { .. } => Operation::BuildLambda,
            Instr::DefineClass { .. } => Operation::DefineClass,
            Instr::DefineMetaClass { .. } => Operation::DefineMetaClass,
            Instr::DefineModule { .. } => Operation::DefineModule,
            Instr::ProcessModuleBody { .. } => Operation::ProcessModuleBody,
            Instr::DefineInstanceMethod(_) => Operation::DefineInstanceMethod,
            Instr::DefineClassMethod { .. } => Operation::DefineClassMethod,
            Instr::Alias { .. } => Operation::Alias,
            Instr::GVarAlias { .. } => Operation::GVarAlias,
            Instr::UndefMethod { .. } => Operation::UndefMethod,
            Instr::BuildCompoundArray { .. } => Operation::BuildCompoundArray,
            Instr::BuildCompoundString { .. } => Operation::BuildCompoundString,
            Instr::BuildDynRegExp { .. } => Operation::BuildDynRegExp,
            Instr::BuildRange { .. } => Operation::BuildRange,
            Instr::BuildSplat { .. } => Operation::BuildSplat,
            Instr::Backtick { .. } => Operation::Backtick,
            Instr::AsString { .. } => Operation::AsString,
            Instr::Eqq { .. } => Operation::Eqq,
            Instr::RescueEqq { .. } => Operation::RescueEqq,
            Instr::Match { .. } => Operation::Match,
            Instr::Match2 { .. } => Operation::Match2,
            Instr::Match3 { .. } => Operation::Match3,
        }
    }

    /// Variable written by this instruction, if any.
    pub fn result(&self) -> Option<&Variable> {
        match self {
            Instr::ReceiveSelf(result)
            | Instr::ReceiveRubyException(result)
            | Instr::ReceiveAnyException(result)
            | Instr::LoadImplicitClosure(result)
            | Instr::LoadFrameClosure(result)
            | Instr::ArgScopeDepth(result)
            | Instr::GetErrorInfo(result)
            | Instr::ReceivePreReqdArg { result, .. }
            | Instr::ReceiveOptArg { result, .. }
            | Instr::ReceiveRestArg { result, .. }
            | Instr::ReceivePostReqdArg { result, .. }
            | Instr::ReceiveKeywordArg { result, .. }
            | Instr::ReceiveKeywordRestArg { result, .. }
            | Instr::ReifyClosure { result, .. }
            | Instr::ToAry { result, .. }
            | Instr::ReqdArgMultipleAsgn { result, .. }
            | Instr::RestArgMultipleAsgn { result, .. }
            | Instr::Copy { result, .. }
            | Instr::GetField { result, .. }
            | Instr::GetGlobalVariable { result, .. }
            | Instr::GetClassVariable { result, .. }
            | Instr::GetClassVarContainerModule { result, .. }
            | Instr::SearchConst { result, .. }
            | Instr::LexicalSearchConst { result, .. }
            | Instr::InheritanceSearchConst { result, .. }
            | Instr::ConstMissing { result, .. }
            | Instr::SetCapturedVar { result, .. }
            | Instr::GetEncoding { result, .. }
            | Instr::BlockGiven { result, .. }
            | Instr::InstanceSuper { result, .. }
            | Instr::ClassSuper { result, .. }
            | Instr::UnresolvedSuper { result, .. }
            | Instr::ZSuper { result, .. }
            | Instr::Yield { result, .. }
            | Instr::RuntimeHelperCall { result, .. }
            | Instr::BuildLambda { result, .. }
            | Instr::DefineClass { result, .. }
            | Instr::DefineMetaClass { result, .. }
            | Instr::DefineModule { result, .. }
            | Instr::ProcessModuleBody { result, .. }
            | Instr::UndefMethod { result, .. }
            | Instr::BuildCompoundArray { result, .. }
            | Instr::BuildCompoundString { result, .. }
            | Instr::BuildDynRegExp { result, .. }
            | Instr::BuildRange { result, .. }
            | Instr::BuildSplat { result, .. }
            | Instr::Backtick { result, .. }
            | Instr::AsString { result, .. }
            | Instr::Eqq { result, .. }
            | Instr::RescueEqq { result, .. }
            | Instr::Match { result, .. }
            | Instr::Match2 { result, .. }
            | Instr::Match3 { result, .. } => Some(result),
            Instr::Call(call) => Some(&call.result),
            Instr::Label(_)
            | Instr::ExceptionRegionStart { .. }
            | Instr::ExceptionRegionEnd
            | Instr::LineNumber(_)
            | Instr::Trace { .. }
            | Instr::ThreadPoll
            | Instr::RecordEndBlock { .. }
            | Instr::Jump(_)
            | Instr::Beq { .. }
            | Instr::Bne { .. }
            | Instr::Return(_)
            | Instr::NonlocalReturn { .. }
            | Instr::Break { .. }
            | Instr::ThrowException(_)
            | Instr::CheckForLocalJumpError { .. }
            | Instr::CheckArity { .. }
            | Instr::RaiseRequiredKeywordArgumentError(_)
            | Instr::PutField { .. }
            | Instr::PutGlobalVar { .. }
            | Instr::PutClassVariable { .. }
            | Instr::PutConst { .. }
            | Instr::RestoreErrorInfo(_)
            | Instr::AttrAssign { .. }
            | Instr::DefineInstanceMethod(_)
            | Instr::DefineClassMethod { .. }
            | Instr::Alias { .. }
            | Instr::GVarAlias { .. } => None,
        }
    }

    /// Visit every top-level input operand.
    pub fn for_each_operand(&self, f: &mut dyn FnMut(&Operand)) {
        let mut visit = |op: &Operand| f(op);
        match self {
            Instr::RecordEndBlock { closure: op }
            | Instr::Return(op)
            | Instr::NonlocalReturn { value: op, .. }
            | Instr::Break { value: op, .. }
            | Instr::ThrowException(op)
            | Instr::ReifyClosure { source: op, .. }
            | Instr::ToAry { array: op, .. }
            | Instr::ReqdArgMultipleAsgn { array: op, .. }
            | Instr::RestArgMultipleAsgn { array: op, .. }
            | Instr::Copy { value: op, .. }
            | Instr::GetField { object: op, .. }
            | Instr::PutGlobalVar { value: op, .. }
            | Instr::GetClassVariable { container: op, .. }
            | Instr::SearchConst { start_scope: op, .. }
            | Instr::LexicalSearchConst { start_scope: op, .. }
            | Instr::InheritanceSearchConst { module: op, .. }
            | Instr::ConstMissing { module: op, .. }
            | Instr::SetCapturedVar { match_data: op, .. }
            | Instr::RestoreErrorInfo(op)
            | Instr::BlockGiven { block: op, .. }
            | Instr::BuildLambda { closure: op, .. }
            | Instr::DefineMetaClass { object: op, .. }
            | Instr::DefineModule { container: op, .. }
            | Instr::DefineClassMethod { object: op, .. }
            | Instr::UndefMethod { name: op, .. }
            | Instr::BuildSplat { array: op, .. }
            | Instr::AsString { value: op, .. }
            | Instr::Match { receiver: op, .. } => visit(op),
            Instr::Beq { a, b, .. }
            | Instr::Bne { a, b, .. }
            | Instr::PutField {
                object: a,
                value: b,
                ..
            }
            | Instr::PutClassVariable {
                container: a,
                value: b,
                ..
            }
            | Instr::PutConst {
                module: a,
                value: b,
                ..
            }
            | Instr::DefineClass {
                container: a,
                superclass: b,
                ..
            }
            | Instr::ProcessModuleBody {
                module: a,
                block: b,
                ..
            }
            | Instr::Alias {
                new_name: a,
                old_name: b,
            }
            | Instr::GVarAlias {
                new_name: a,
                old_name: b,
            }
            | Instr::BuildCompoundArray {
                first: a,
                second: b,
                ..
            }
            | Instr::BuildRange {
                begin: a, end: b, ..
            }
            | Instr::Eqq {
                receiver: a,
                value: b,
                ..
            }
            | Instr::RescueEqq {
                types: a,
                exception: b,
                ..
            }
            | Instr::Match2 {
                receiver: a,
                value: b,
                ..
            }
            | Instr::Match3 {
                receiver: a,
                value: b,
                ..
            } => {
                visit(a);
                visit(b);
            }
            Instr::GetClassVarContainerModule {
                start_scope,
                object,
                ..
            } => {
                visit(start_scope);
                if let Some(o) = object {
                    visit(o);
                }
            }
            Instr::Call(call) => {
                visit(&call.receiver);
                call.args.iter().for_each(&mut visit);
                if let Some(c) = &call.closure {
                    visit(c);
                }
            }
            Instr::AttrAssign { receiver, args, .. } => {
                visit(receiver);
                args.iter().for_each(&mut visit);
            }
            Instr::InstanceSuper {
                defining_module: receiver,
                args,
                closure,
                ..
            }
            | Instr::ClassSuper {
                defining_module: receiver,
                args,
                closure,
                ..
            }
            | Instr::UnresolvedSuper {
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
                visit(receiver);
                args.iter().for_each(&mut visit);
                if let Some(c) = closure {
                    visit(c);
                }
            }
            Instr::Yield { block, arg, .. } => {
                visit(block);
                if let Some(a) = arg {
                    visit(a);
                }
            }
            Instr::RuntimeHelperCall { args, .. } => args.iter().for_each(&mut visit),
            Instr::BuildCompoundString { pieces, .. }
            | Instr::BuildDynRegExp { pieces, .. }
            | Instr::Backtick { pieces, .. } => pieces.iter().for_each(&mut visit),
            Instr::Label(_)
            | Instr::ExceptionRegionStart { .. }
            | Instr::ExceptionRegionEnd
            | Instr::LineNumber(_)
            | Instr::Trace { .. }
            | Instr::ThreadPoll
            | Instr::Jump(_)
            | Instr::CheckForLocalJumpError { .. }
            | Instr::ReceiveSelf(_)
            | Instr::ReceivePreReqdArg { .. }
            | Instr::ReceiveOptArg { .. }
            | Instr::ReceiveRestArg { .. }
            | Instr::ReceivePostReqdArg { .. }
            | Instr::ReceiveKeywordArg { .. }
            | Instr::ReceiveKeywordRestArg { .. }
            | Instr::CheckArity { .. }
            | Instr::ReceiveRubyException(_)
            | Instr::ReceiveAnyException(_)
            | Instr::LoadImplicitClosure(_)
            | Instr::LoadFrameClosure(_)
            | Instr::ArgScopeDepth(_)
            | Instr::RaiseRequiredKeywordArgumentError(_)
            | Instr::GetGlobalVariable { .. }
            | Instr::GetEncoding { .. }
            | Instr::GetErrorInfo(_)
            | Instr::DefineInstanceMethod(_) => {}
        }
    }

    /// Closure scopes referenced by this instruction's operands.
    pub fn closures(&self) -> SmallVec<[ScopeId; 1]> {
        let mut found = SmallVec::new();
        self.for_each_operand(&mut |op| {
            op.walk(&mut |inner| {
                if let Some(id) = inner.closure() {
                    found.push(id);
                }
            });
        });
        found
    }

    /// Closure passed to the call this instruction performs, if any.
    pub fn call_closure(&self) -> Option<&Operand> {
        match self {
            Instr::Call(call) => call.closure.as_ref(),
            Instr::InstanceSuper { closure, .. }
            | Instr::ClassSuper { closure, .. }
            | Instr::UnresolvedSuper { closure, .. }
            | Instr::ZSuper { closure, .. } => closure.as_ref(),
            _ => None,
        }
    }

    /// Labels this instruction defines or jumps to.
    pub fn labels_mut(&mut self) -> SmallVec<[&mut Label; 1]> {
        let mut labels = SmallVec::new();
        match self {
            Instr::Label(label)
            | Instr::Jump(label)
            | Instr::ExceptionRegionStart { rescue: label }
            | Instr::Beq { target: label, .. }
            | Instr::Bne { target: label, .. } => labels.push(label),
            _ => {}
        }
        labels
    }

    /// Rewrite every scope reference: wrapped closures in operands and the
    /// bodies named by definition instructions.
    pub fn remap_scopes(&mut self, map: &mut dyn FnMut(ScopeId) -> ScopeId) {
        match self {
            Instr::Call(call) => {
                call.receiver.remap_closures(map);
                call.args.iter_mut().for_each(|a| a.remap_closures(map));
                if let Some(c) = &mut call.closure {
                    c.remap_closures(map);
                }
            }
            Instr::InstanceSuper { args, closure, .. }
            | Instr::ClassSuper { args, closure, .. }
            | Instr::UnresolvedSuper { args, closure, .. }
            | Instr::ZSuper { args, closure, .. } => {
                args.iter_mut().for_each(|a| a.remap_closures(map));
                if let Some(c) = closure {
                    c.remap_closures(map);
                }
            }
            Instr::RecordEndBlock { closure }
            | Instr::BuildLambda { closure, .. }
            | Instr::Copy { value: closure, .. }
            | Instr::ProcessModuleBody { block: closure, .. } => closure.remap_closures(map),
            Instr::Yield { arg: Some(arg), .. } => arg.remap_closures(map),
            Instr::DefineClass { body, .. }
            | Instr::DefineMetaClass { body, .. }
            | Instr::DefineModule { body, .. }
            | Instr::DefineInstanceMethod(body)
            | Instr::DefineClassMethod { method: body, .. } => *body = map(*body),
            _ => {}
        }
    }

    /// Scopes this instruction defines or wraps.
    pub fn referenced_scopes(&self) -> SmallVec<[ScopeId; 1]> {
        let mut found = self.closures();
        match self {
            Instr::DefineClass { body, .. }
            | Instr::DefineMetaClass { body, .. }
            | Instr::DefineModule { body, .. }
            | Instr::DefineInstanceMethod(body)
            | Instr::DefineClassMethod { method: body, .. } => found.push(*body),
            _ => {}
        }
        found
    }
}

#[cfg(test)]
mod tests;
