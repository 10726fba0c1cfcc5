//! Per-opcode static metadata.
//!
//! Every [`Instr`](super::Instr) variant maps to one [`Operation`], and every
//! operation declares a fixed [`OpFlags`] set. Later passes (and the scope
//! flags engine) read these facts; nothing recomputes them.

use bitflags::bitflags;

bitflags! {
    /// Static facts about an opcode.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct OpFlags: u8 {
        /// Ends a basic block by jumping, branching, returning or throwing.
        const TRANSFERS_CONTROL = 1 << 0;
        /// May raise an exception at runtime.
        const CAN_RAISE = 1 << 1;
        /// Observable effect beyond writing its result.
        const SIDE_EFFECT = 1 << 2;
        /// Dispatches to user-visible code.
        const IS_CALL = 1 << 3;
        /// Marker or bookkeeping with no computation.
        const BOOK_KEEPING = 1 << 4;
        /// Receives an incoming argument or exception.
        const ARG_RECEIVE = 1 << 5;
    }
}

impl OpFlags {
    /// Flags shared by every dispatching opcode.
    pub const CALL: OpFlags = OpFlags::IS_CALL
        .union(OpFlags::CAN_RAISE)
        .union(OpFlags::SIDE_EFFECT);

    /// Unconditional raise.
    pub const THROW: OpFlags = OpFlags::TRANSFERS_CONTROL
        .union(OpFlags::CAN_RAISE)
        .union(OpFlags::SIDE_EFFECT);

    /// Store that may hit a frozen or missing target.
    pub const STORE: OpFlags = OpFlags::SIDE_EFFECT.union(OpFlags::CAN_RAISE);
}

/// Field-less opcode tag of an instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    // Markers and bookkeeping
    Label,
    ExceptionRegionStart,
    ExceptionRegionEnd,
    LineNumber,
    Trace,
    ThreadPoll,
    RecordEndBlock,

    // Control transfer
    Jump,
    Beq,
    Bne,
    Return,
    NonlocalReturn,
    Break,
    ThrowException,
    CheckForLocalJumpError,

    // Argument and exception receipt
    ReceiveSelf,
    ReceivePreReqdArg,
    ReceiveOptArg,
    ReceiveRestArg,
    ReceivePostReqdArg,
    ReceiveKeywordArg,
    ReceiveKeywordRestArg,
    CheckArity,
    ReceiveRubyException,
    ReceiveAnyException,
    LoadImplicitClosure,
    LoadFrameClosure,
    ReifyClosure,
    ArgScopeDepth,
    RaiseRequiredKeywordArgumentError,
    ToAry,
    ReqdArgMultipleAsgn,
    RestArgMultipleAsgn,

    // Loads and stores
    Copy,
    GetField,
    PutField,
    GetGlobalVariable,
    PutGlobalVar,
    GetClassVariable,
    PutClassVariable,
    GetClassVarContainerModule,
    PutConst,
    SearchConst,
    LexicalSearchConst,
    InheritanceSearchConst,
    ConstMissing,
    SetCapturedVar,
    GetEncoding,
    GetErrorInfo,
    RestoreErrorInfo,
    BlockGiven,

    // Calls
    Call,
    AttrAssign,
    InstanceSuper,
    ClassSuper,
    UnresolvedSuper,
    ZSuper,
    Yield,
    RuntimeHelperCall,
    BuildLambda,

    // Definitions
    DefineClass,
    DefineMetaClass,
    DefineModule,
    ProcessModuleBody,
    DefineInstanceMethod,
    DefineClassMethod,
    Alias,
    GVarAlias,
    UndefMethod,

    // Value construction
    BuildCompoundArray,
    BuildCompoundString,
    BuildDynRegExp,
    BuildRange,
    BuildSplat,
    Backtick,
    AsString,
    Eqq,
    RescueEqq,
    Match,
    Match2,
    Match3,
}

impl Operation {
    /// Static flag set of this opcode.
    pub const fn flags(self) -> OpFlags {
        match self {
            Operation::Label
            | Operation::ExceptionRegionStart
            | Operation::ExceptionRegionEnd
            | Operation::LineNumber => OpFlags::BOOK_KEEPING,
            Operation::ThreadPoll => OpFlags::BOOK_KEEPING.union(OpFlags::SIDE_EFFECT),
            Operation::Trace | Operation::RecordEndBlock | Operation::RestoreErrorInfo => {
                OpFlags::SIDE_EFFECT
            }

            Operation::Jump | Operation::Beq | Operation::Bne | Operation::Return => {
                OpFlags::TRANSFERS_CONTROL
            }
            Operation::NonlocalReturn | Operation::Break | Operation::ThrowException => {
                OpFlags::THROW
            }
            Operation::CheckForLocalJumpError
            | Operation::ToAry
            | Operation::GetGlobalVariable
            | Operation::GetClassVariable
            | Operation::GetClassVarContainerModule
            | Operation::SearchConst
            | Operation::LexicalSearchConst
            | Operation::InheritanceSearchConst
            | Operation::BuildCompoundArray
            | Operation::BuildCompoundString
            | Operation::BuildDynRegExp
            | Operation::BuildRange
            | Operation::BuildSplat
            | Operation::RescueEqq => OpFlags::CAN_RAISE,

            Operation::ReceiveSelf
            | Operation::ReceivePreReqdArg
            | Operation::ReceiveOptArg
            | Operation::ReceiveRestArg
            | Operation::ReceivePostReqdArg
            | Operation::ReceiveKeywordArg
            | Operation::ReceiveKeywordRestArg
            | Operation::ReceiveRubyException
            | Operation::ReceiveAnyException => OpFlags::ARG_RECEIVE,
            Operation::CheckArity | Operation::RaiseRequiredKeywordArgumentError => {
                OpFlags::CAN_RAISE.union(OpFlags::SIDE_EFFECT)
            }

            Operation::LoadImplicitClosure
            | Operation::LoadFrameClosure
            | Operation::ReifyClosure
            | Operation::ArgScopeDepth
            | Operation::ReqdArgMultipleAsgn
            | Operation::RestArgMultipleAsgn
            | Operation::Copy
            | Operation::GetField
            | Operation::SetCapturedVar
            | Operation::GetEncoding
            | Operation::GetErrorInfo
            | Operation::BlockGiven
            | Operation::BuildLambda => OpFlags::empty(),

            Operation::PutField
            | Operation::PutGlobalVar
            | Operation::PutClassVariable
            | Operation::PutConst
            | Operation::DefineClass
            | Operation::DefineMetaClass
            | Operation::DefineModule
            | Operation::DefineInstanceMethod
            | Operation::DefineClassMethod
            | Operation::Alias
            | Operation::GVarAlias
            | Operation::UndefMethod => OpFlags::STORE,

            Operation::ConstMissing
            | Operation::Call
            | Operation::AttrAssign
            | Operation::InstanceSuper
            | Operation::ClassSuper
            | Operation::UnresolvedSuper
            | Operation::ZSuper
            | Operation::Yield
            | Operation::RuntimeHelperCall
            | Operation::ProcessModuleBody
            | Operation::Backtick
            | Operation::AsString
            | Operation::Eqq
            | Operation::Match
            | Operation::Match2
            | Operation::Match3 => OpFlags::CALL,
        }
    }

    #[inline]
    pub const fn transfers_control(self) -> bool {
        self.flags().contains(OpFlags::TRANSFERS_CONTROL)
    }

    #[inline]
    pub const fn can_raise(self) -> bool {
        self.flags().contains(OpFlags::CAN_RAISE)
    }

    #[inline]
    pub const fn has_side_effects(self) -> bool {
        self.flags().contains(OpFlags::SIDE_EFFECT)
    }

    #[inline]
    pub const fn is_call(self) -> bool {
        self.flags().contains(OpFlags::IS_CALL)
    }

    #[inline]
    pub const fn is_book_keeping(self) -> bool {
        self.flags().contains(OpFlags::BOOK_KEEPING)
    }

    #[inline]
    pub const fn is_arg_receive(self) -> bool {
        self.flags().contains(OpFlags::ARG_RECEIVE)
    }

    /// Lower-case mnemonic used in IR dumps.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Operation::Label => "label",
            Operation::ExceptionRegionStart => "exc_region_start",
            Operation::ExceptionRegionEnd => "exc_region_end",
            Operation::LineNumber => "line_num",
            Operation::Trace => "trace",
            Operation::ThreadPoll => "thread_poll",
            Operation::RecordEndBlock => "record_end_block",
            Operation::Jump => "jump",
            Operation::Beq => "beq",
            Operation::Bne => "bne",
            Operation::Return => "return",
            Operation::NonlocalReturn => "nonlocal_return",
            Operation::Break => "break",
            Operation::ThrowException => "throw",
            Operation::CheckForLocalJumpError => "check_for_lje",
            Operation::ReceiveSelf => "recv_self",
            Operation::ReceivePreReqdArg => "recv_pre_reqd_arg",
            Operation::ReceiveOptArg => "recv_opt_arg",
            Operation::ReceiveRestArg => "recv_rest_arg",
            Operation::ReceivePostReqdArg => "recv_post_reqd_arg",
            Operation::ReceiveKeywordArg => "recv_kw_arg",
            Operation::ReceiveKeywordRestArg => "recv_kw_rest_arg",
            Operation::CheckArity => "check_arity",
            Operation::ReceiveRubyException => "recv_ruby_exc",
            Operation::ReceiveAnyException => "recv_any_exc",
            Operation::LoadImplicitClosure => "load_implicit_closure",
            Operation::LoadFrameClosure => "load_frame_closure",
            Operation::ReifyClosure => "reify_closure",
            Operation::ArgScopeDepth => "arg_scope_depth",
            Operation::RaiseRequiredKeywordArgumentError => "raise_required_kw_arg_error",
            Operation::ToAry => "to_ary",
            Operation::ReqdArgMultipleAsgn => "reqd_arg_masgn",
            Operation::RestArgMultipleAsgn => "rest_arg_masgn",
            Operation::Copy => "copy",
            Operation::GetField => "get_field",
            Operation::PutField => "put_field",
            Operation::GetGlobalVariable => "get_global_var",
            Operation::PutGlobalVar => "put_global_var",
            Operation::GetClassVariable => "get_cvar",
            Operation::PutClassVariable => "put_cvar",
            Operation::GetClassVarContainerModule => "get_cvar_container_module",
            Operation::PutConst => "put_const",
            Operation::SearchConst => "search_const",
            Operation::LexicalSearchConst => "lexical_search_const",
            Operation::InheritanceSearchConst => "inheritance_search_const",
            Operation::ConstMissing => "const_missing",
            Operation::SetCapturedVar => "set_captured_var",
            Operation::GetEncoding => "get_encoding",
            Operation::GetErrorInfo => "get_error_info",
            Operation::RestoreErrorInfo => "restore_error_info",
            Operation::BlockGiven => "block_given",
            Operation::Call => "call",
            Operation::AttrAssign => "attr_assign",
            Operation::InstanceSuper => "instance_super",
            Operation::ClassSuper => "class_super",
            Operation::UnresolvedSuper => "unresolved_super",
            Operation::ZSuper => "zsuper",
            Operation::Yield => "yield",
            Operation::RuntimeHelperCall => "runtime_helper",
            Operation::BuildLambda => "build_lambda",
            Operation::DefineClass => "def_class",
            Operation::DefineMetaClass => "def_meta_class",
            Operation::DefineModule => "def_module",
            Operation::ProcessModuleBody => "process_module_body",
            Operation::DefineInstanceMethod => "def_inst_meth",
            Operation::DefineClassMethod => "def_class_meth",
            Operation::Alias => "alias",
            Operation::GVarAlias => "gvar_alias",
            Operation::UndefMethod => "undef_method",
            Operation::BuildCompoundArray => "build_compound_array",
            Operation::BuildCompoundString => "build_compound_string",
            Operation::BuildDynRegExp => "build_dregexp",
            Operation::BuildRange => "build_range",
            Operation::BuildSplat => "build_splat",
            Operation::Backtick => "backtick_string",
            Operation::AsString => "as_string",
            Operation::Eqq => "eqq",
            Operation::RescueEqq => "rescue_eqq",
            Operation::Match => "match",
            Operation::Match2 => "match2",
            Operation::Match3 => "match3",
        }
    }
}
