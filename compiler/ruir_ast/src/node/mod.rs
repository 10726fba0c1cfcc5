//! Syntax nodes.
//!
//! Every syntax form the builder understands is one [`NodeKind`] variant.
//! Forms that are only legal in a specific position (a block-pass argument,
//! the `*` placeholder of a destructuring pattern) are still variants so
//! that a misplaced occurrence can be reported instead of being
//! unrepresentable.

use crate::args::{ArgsNode, MultipleAsgnPattern};
use crate::static_scope::StaticScope;
use crate::Ident;

/// Position of a node in its source file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct SourcePos {
    /// Zero-based line number.
    pub line: u32,
}

impl SourcePos {
    #[inline]
    pub const fn new(line: u32) -> Self {
        SourcePos { line }
    }
}

/// Result of constant-folding a condition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Truthiness {
    AlwaysTrue,
    AlwaysFalse,
    Unknown,
}

/// Regexp literal flags, as the parser reports them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct RegexpOptions {
    pub ignore_case: bool,
    pub extended: bool,
    pub multiline: bool,
    /// Interpolate only once (`/…#{x}…/o`).
    pub once: bool,
    /// Explicit encoding flag (`n`, `e`, `s`, `u`), if any.
    pub encoding: Option<char>,
}

/// A syntax node: kind plus source position.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub pos: SourcePos,
}

/// One `key => value` entry of a hash literal. A missing key is a `**splat`.
#[derive(Clone, Debug, PartialEq)]
pub struct HashPair {
    pub key: Option<Node>,
    pub value: Node,
}

/// One `when` arm of a `case`.
#[derive(Clone, Debug, PartialEq)]
pub struct WhenClause {
    /// Test expression. An [`NodeKind::Array`] here is a list test.
    pub test: Box<Node>,
    pub body: Option<Box<Node>>,
    pub pos: SourcePos,
}

/// One `rescue` clause, chained to the clause after it.
#[derive(Clone, Debug, PartialEq)]
pub struct RescueClause {
    /// Exception classes to match; `None` means a bare `rescue`.
    pub exception_types: Option<Box<Node>>,
    /// Handler body. A `=> e` binding arrives as a leading assignment
    /// from `$!`.
    pub body: Option<Box<Node>>,
    pub next: Option<Box<RescueClause>>,
    pub pos: SourcePos,
}

/// The closed set of syntax forms.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// `alias new old`
    Alias { new_name: Box<Node>, old_name: Box<Node> },
    And { first: Box<Node>, second: Box<Node> },
    /// `[*a, *b]` style concatenation of an array and a splatted value.
    ArgsCat { first: Box<Node>, second: Box<Node> },
    /// `[*a, b]` style append of one value after a splat.
    ArgsPush { first: Box<Node>, second: Box<Node> },
    Array(Vec<Node>),
    /// `recv.name = args`
    AttrAssign { receiver: Box<Node>, name: Ident, args: Option<Box<Node>> },
    /// `` $& $` $' $+ ``
    BackRef(char),
    Begin(Box<Node>),
    Bignum(Ident),
    Block(Vec<Node>),
    /// `&blk` in an argument list.
    BlockPass(Box<Node>),
    Break(Option<Box<Node>>),
    Call {
        receiver: Box<Node>,
        name: Ident,
        args: Option<Box<Node>>,
        iter: Option<Box<Node>>,
    },
    Case {
        subject: Option<Box<Node>>,
        whens: Vec<WhenClause>,
        else_body: Option<Box<Node>>,
    },
    Class {
        cpath: Box<Node>,
        superclass: Option<Box<Node>>,
        body: Option<Box<Node>>,
        scope: StaticScope,
    },
    ClassVar(Ident),
    /// `@@x = v` inside a method or block.
    ClassVarAsgn { name: Ident, value: Option<Box<Node>> },
    /// `@@x = v` directly inside a class body.
    ClassVarDecl { name: Ident, value: Option<Box<Node>> },
    /// `A::B`, or a bare `B` in a class/module path when `left` is `None`.
    Colon2 { left: Option<Box<Node>>, name: Ident },
    /// `::B`
    Colon3(Ident),
    Complex(Box<Node>),
    Const(Ident),
    /// `X = v`, `A::X = v` or `::X = v` depending on `path`.
    ConstDecl {
        name: Ident,
        path: Option<Box<Node>>,
        value: Option<Box<Node>>,
    },
    /// Block-local assignment.
    DAsgn { name: Ident, depth: u32, value: Option<Box<Node>> },
    DRegexp { pieces: Vec<Node>, options: RegexpOptions },
    DStr(Vec<Node>),
    DSymbol(Vec<Node>),
    /// Block-local read.
    DVar { name: Ident, depth: u32 },
    DXStr(Vec<Node>),
    Defined(Box<Node>),
    Defn {
        name: Ident,
        args: Box<ArgsNode>,
        body: Option<Box<Node>>,
        scope: StaticScope,
    },
    Defs {
        receiver: Box<Node>,
        name: Ident,
        args: Box<ArgsNode>,
        body: Option<Box<Node>>,
        scope: StaticScope,
    },
    Dot { begin: Box<Node>, end: Box<Node>, exclusive: bool },
    Encoding(Ident),
    Ensure { body: Option<Box<Node>>, ensure: Option<Box<Node>> },
    /// `#{…}` inside a dynamic string.
    EvStr(Option<Box<Node>>),
    False,
    FCall { name: Ident, args: Option<Box<Node>>, iter: Option<Box<Node>> },
    Fixnum(i64),
    Flip { begin: Box<Node>, end: Box<Node>, exclusive: bool },
    Float(f64),
    For {
        var: Box<Node>,
        iter: Box<Node>,
        body: Option<Box<Node>>,
        scope: StaticScope,
    },
    GlobalAsgn { name: Ident, value: Option<Box<Node>> },
    GlobalVar(Ident),
    Hash(Vec<HashPair>),
    If {
        cond: Box<Node>,
        then_body: Option<Box<Node>>,
        else_body: Option<Box<Node>>,
    },
    InstAsgn { name: Ident, value: Option<Box<Node>> },
    InstVar(Ident),
    /// A `do … end` / `{ … }` block attached to a call.
    Iter {
        params: Option<Box<ArgsNode>>,
        body: Option<Box<Node>>,
        scope: StaticScope,
    },
    Lambda {
        params: Box<ArgsNode>,
        body: Option<Box<Node>>,
        scope: StaticScope,
    },
    /// Bare method name used as an operand (`undef foo`).
    Literal(Ident),
    LocalAsgn { name: Ident, depth: u32, value: Option<Box<Node>> },
    LocalVar { name: Ident, depth: u32 },
    /// Regexp literal used as a condition (matches against `$_`).
    Match(Box<Node>),
    /// `/re/ =~ value`; `captures` are value-less local assignments for named groups.
    Match2 {
        receiver: Box<Node>,
        value: Box<Node>,
        captures: Vec<Node>,
    },
    /// `value =~ /re/`
    Match3 { receiver: Box<Node>, value: Box<Node> },
    Module {
        cpath: Box<Node>,
        body: Option<Box<Node>>,
        scope: StaticScope,
    },
    /// `a, (b, *c), d = value`; `value` is `None` for nested patterns.
    MultipleAsgn {
        pattern: Box<MultipleAsgnPattern>,
        value: Option<Box<Node>>,
    },
    /// Statement boundary; carries the line of the wrapped statement.
    Newline(Box<Node>),
    Next(Option<Box<Node>>),
    Nil,
    /// `$1`..`$n`
    NthRef(u32),
    /// `recv.attr op= value`
    OpAsgn {
        receiver: Box<Node>,
        reader: Ident,
        writer: Ident,
        operator: Ident,
        value: Box<Node>,
    },
    /// `a &&= b`; `second` is the assignment node.
    OpAsgnAnd { first: Box<Node>, second: Box<Node> },
    /// `a ||= b`; `second` is the assignment node.
    OpAsgnOr { first: Box<Node>, second: Box<Node> },
    /// `recv[args] op= value`
    OpElementAsgn {
        receiver: Box<Node>,
        args: Option<Box<Node>>,
        operator: Ident,
        value: Box<Node>,
    },
    Or { first: Box<Node>, second: Box<Node> },
    /// `END { … }`
    PostExe { body: Option<Box<Node>>, scope: StaticScope },
    /// `BEGIN { … }`
    PreExe { body: Option<Box<Node>>, scope: StaticScope },
    Rational { numerator: i64, denominator: i64 },
    Redo,
    Regexp { source: Ident, options: RegexpOptions },
    Rescue {
        body: Option<Box<Node>>,
        rescue: Option<Box<RescueClause>>,
        else_body: Option<Box<Node>>,
    },
    Retry,
    Return(Option<Box<Node>>),
    /// `class << receiver`
    SClass {
        receiver: Box<Node>,
        body: Option<Box<Node>>,
        scope: StaticScope,
    },
    SelfRef,
    Splat(Box<Node>),
    /// Anonymous `*` in a destructuring pattern.
    Star,
    Str(Ident),
    Super { args: Option<Box<Node>>, iter: Option<Box<Node>> },
    /// `return a, b` style multiple value.
    SValue(Box<Node>),
    Symbol(Ident),
    True,
    Undef(Box<Node>),
    Until {
        cond: Box<Node>,
        body: Option<Box<Node>>,
        head_cond: bool,
    },
    /// `alias $new $old`
    VAlias { new_name: Ident, old_name: Ident },
    /// Identifier that could be a local or a zero-arg self call.
    VCall(Ident),
    While {
        cond: Box<Node>,
        body: Option<Box<Node>>,
        head_cond: bool,
    },
    XStr(Ident),
    /// `yield arg`; `expanded` is false for `yield [a, b]`-style single array args.
    Yield { arg: Option<Box<Node>>, expanded: bool },
    ZArray,
    /// Bare `super` forwarding the method's own arguments.
    ZSuper { iter: Option<Box<Node>> },
}

impl Node {
    #[inline]
    pub fn new(kind: NodeKind, line: u32) -> Self {
        Node {
            kind,
            pos: SourcePos::new(line),
        }
    }

    /// Heap-allocate a node, for use as a child.
    #[inline]
    pub fn boxed(kind: NodeKind, line: u32) -> Box<Self> {
        Box::new(Node::new(kind, line))
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.pos.line
    }

    /// Short name of this node's kind, for diagnostics.
    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    /// Constant-fold this node as a condition.
    pub fn truthiness(&self) -> Truthiness {
        match &self.kind {
            NodeKind::Nil | NodeKind::False => Truthiness::AlwaysFalse,
            NodeKind::True
            | NodeKind::Fixnum(_)
            | NodeKind::Float(_)
            | NodeKind::Bignum(_)
            | NodeKind::Rational { .. }
            | NodeKind::Str(_)
            | NodeKind::Symbol(_)
            | NodeKind::Regexp { .. }
            | NodeKind::Array(_)
            | NodeKind::ZArray
            | NodeKind::Hash(_)
            | NodeKind::SelfRef
            | NodeKind::Dot { .. } => Truthiness::AlwaysTrue,
            NodeKind::Newline(inner) | NodeKind::Begin(inner) => inner.truthiness(),
            _ => Truthiness::Unknown,
        }
    }

    #[inline]
    pub fn is_always_true(&self) -> bool {
        self.truthiness() == Truthiness::AlwaysTrue
    }

    #[inline]
    pub fn is_always_false(&self) -> bool {
        self.truthiness() == Truthiness::AlwaysFalse
    }

    /// Strip any `Newline` wrappers.
    pub fn skip_newlines(&self) -> &Node {
        let mut node = self;
        while let NodeKind::Newline(inner) = &node.kind {
            node = inner;
        }
        node
    }
}

impl NodeKind {
    /// Short name of the kind, for diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Alias { .. } => "Alias",
            NodeKind::And { .. } => "And",
            NodeKind::ArgsCat { .. } => "ArgsCat",
            NodeKind::ArgsPush { .. } => "ArgsPush",
            NodeKind::Array(_) => "Array",
            NodeKind::AttrAssign { .. } => "AttrAssign",
            NodeKind::BackRef(_) => "BackRef",
            NodeKind::Begin(_) => "Begin",
            NodeKind::Bignum(_) => "Bignum",
            NodeKind::Block(_) => "Block",
            NodeKind::BlockPass(_) => "BlockPass",
            NodeKind::Break(_) => "Break",
            NodeKind::Call { .. } => "Call",
            NodeKind::Case { .. } => "Case",
            NodeKind::Class { .. } => "Class",
            NodeKind::ClassVar(_) => "ClassVar",
            NodeKind::ClassVarAsgn { .. } => "ClassVarAsgn",
            NodeKind::ClassVarDecl { .. } => "ClassVarDecl",
            NodeKind::Colon2 { .. } => "Colon2",
            NodeKind::Colon3(_) => "Colon3",
            NodeKind::Complex(_) => "Complex",
            NodeKind::Const(_) => "Const",
            NodeKind::ConstDecl { .. } => "ConstDecl",
            NodeKind::DAsgn { .. } => "DAsgn",
            NodeKind::DRegexp { .. } => "DRegexp",
            NodeKind::DStr(_) => "DStr",
            NodeKind::DSymbol(_) => "DSymbol",
            NodeKind::DVar { .. } => "DVar",
            NodeKind::DXStr(_) => "DXStr",
            NodeKind::Defined(_) => "Defined",
            NodeKind::Defn { .. } => "Defn",
            NodeKind::Defs { .. } => "Defs",
            NodeKind::Dot { .. } => "Dot",
            NodeKind::Encoding(_) => "Encoding",
            NodeKind::Ensure { .. } => "Ensure",
            NodeKind::EvStr(_) => "EvStr",
            NodeKind::False => "False",
            NodeKind::FCall { .. } => "FCall",
            NodeKind::Fixnum(_) => "Fixnum",
            NodeKind::Flip { .. } => "Flip",
            NodeKind::Float(_) => "Float",
            NodeKind::For { .. } => "For",
            NodeKind::GlobalAsgn { .. } => "GlobalAsgn",
            NodeKind::GlobalVar(_) => "GlobalVar",
            NodeKind::Hash(_) => "Hash",
            NodeKind::If { .. } => "If",
            NodeKind::InstAsgn { .. } => "InstAsgn",
            NodeKind::InstVar(_) => "InstVar",
            NodeKind::Iter { .. } => "Iter",
            NodeKind::Lambda { .. } => "Lambda",
            NodeKind::Literal(_) => "Literal",
            NodeKind::LocalAsgn { .. } => "LocalAsgn",
            NodeKind::LocalVar { .. } => "LocalVar",
            NodeKind::Match(_) => "Match",
            NodeKind::Match2 { .. } => "Match2",
            NodeKind::Match3 { .. } => "Match3",
            NodeKind::Module { .. } => "Module",
            NodeKind::MultipleAsgn { .. } => "MultipleAsgn",
            NodeKind::Newline(_) => "Newline",
            NodeKind::Next(_) => "Next",
            NodeKind::Nil => "Nil",
            NodeKind::NthRef(_) => "NthRef",
            NodeKind::OpAsgn { .. } => "OpAsgn",
            NodeKind::OpAsgnAnd { .. } => "OpAsgnAnd",
            NodeKind::OpAsgnOr { .. } => "OpAsgnOr",
            NodeKind::OpElementAsgn { .. } => "OpElementAsgn",
            NodeKind::Or { .. } => "Or",
            NodeKind::PostExe { .. } => "PostExe",
            NodeKind::PreExe { .. } => "PreExe",
            NodeKind::Rational { .. } => "Rational",
            NodeKind::Redo => "Redo",
            NodeKind::Regexp { .. } => "Regexp",
            NodeKind::Rescue { .. } => "Rescue",
            NodeKind::Retry => "Retry",
            NodeKind::Return(_) => "Return",
            NodeKind::SClass { .. } => "SClass",
            NodeKind::SelfRef => "Self",
            NodeKind::Splat(_) => "Splat",
            NodeKind::Star => "Star",
            NodeKind::Str(_) => "Str",
            NodeKind::Super { .. } => "Super",
            NodeKind::SValue(_) => "SValue",
            NodeKind::Symbol(_) => "Symbol",
            NodeKind::True => "True",
            NodeKind::Undef(_) => "Undef",
            NodeKind::Until { .. } => "Until",
            NodeKind::VAlias { .. } => "VAlias",
            NodeKind::VCall(_) => "VCall",
            NodeKind::While { .. } => "While",
            NodeKind::XStr(_) => "XStr",
            NodeKind::Yield { .. } => "Yield",
            NodeKind::ZArray => "ZArray",
            NodeKind::ZSuper { .. } => "ZSuper",
        }
    }
}
