#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use pretty_assertions::assert_eq;
use ruir_ast::{
    ident, ArgItem, ArgsNode, Arity, KeywordArg, MasgnRest, MultipleAsgnPattern, Node, NodeKind,
    OptArg, RescueClause, RestArg, SourcePos, StaticScope, WhenClause,
};
use ruir_ir::{
    ArgDescriptor, ArgKind, Instr, IrManager, JumpKind, Label, Operand, Operation, RuntimeHelper,
    ScopeFlags, ScopeId, Variable,
};

use crate::{build_root, BuildConfig, BuildError, BuiltUnit};

// Tree construction

fn node(kind: NodeKind) -> Node {
    Node::new(kind, 1)
}

fn boxed(kind: NodeKind) -> Box<Node> {
    Node::boxed(kind, 1)
}

fn local(name: &str) -> Node {
    node(NodeKind::LocalVar {
        name: ident(name),
        depth: 0,
    })
}

fn local_asgn(name: &str, value: Option<Node>) -> Node {
    node(NodeKind::LocalAsgn {
        name: ident(name),
        depth: 0,
        value: value.map(Box::new),
    })
}

fn fixnum(value: i64) -> Node {
    node(NodeKind::Fixnum(value))
}

fn defn(name: &str, args: ArgsNode, body: Option<Node>) -> Node {
    node(NodeKind::Defn {
        name: ident(name),
        args: Box::new(args),
        body: body.map(Box::new),
        scope: StaticScope::new(),
    })
}

fn block(statements: Vec<Node>) -> Node {
    node(NodeKind::Block(statements))
}

fn vcall(name: &str) -> Node {
    node(NodeKind::VCall(ident(name)))
}

fn while_loop(cond: Node, body: Node) -> Node {
    node(NodeKind::While {
        cond: Box::new(cond),
        body: Some(Box::new(body)),
        head_cond: true,
    })
}

fn bare_rescue(body: Option<Node>, handler: Option<Node>) -> Node {
    node(NodeKind::Rescue {
        body: body.map(Box::new),
        rescue: Some(Box::new(RescueClause {
            exception_types: None,
            body: handler.map(Box::new),
            next: None,
            pos: SourcePos::new(1),
        })),
        else_body: None,
    })
}

fn ensured(body: Node, ensure: Node) -> Node {
    node(NodeKind::Ensure {
        body: Some(Box::new(body)),
        ensure: Some(Box::new(ensure)),
    })
}

// Building

fn config() -> BuildConfig {
    BuildConfig::new("t.rb")
        .with_line_numbers(false)
        .with_thread_poll(false)
}

fn build(body: &Node) -> BuiltUnit {
    build_root(&IrManager::new(), &config(), body, StaticScope::new()).unwrap()
}

fn scope_named(unit: &BuiltUnit, name: &str) -> ScopeId {
    unit.tree
        .iter()
        .find(|(_, scope)| &*scope.name == name)
        .map(|(id, _)| id)
        .unwrap()
}

fn ops(unit: &BuiltUnit, id: ScopeId) -> Vec<Operation> {
    unit.tree[id].instrs().iter().map(Instr::op).collect()
}

fn count_op(unit: &BuiltUnit, id: ScopeId, op: Operation) -> usize {
    ops(unit, id).into_iter().filter(|&o| o == op).count()
}

fn call_names(unit: &BuiltUnit, id: ScopeId) -> Vec<String> {
    unit.tree[id]
        .instrs()
        .iter()
        .filter_map(|instr| match instr {
            Instr::Call(call) => Some(call.name.to_string()),
            _ => None,
        })
        .collect()
}

fn local_named<'a>(operand: &'a Operand) -> Option<&'a str> {
    match operand {
        Operand::Variable(Variable::Local(v)) => Some(&v.name),
        _ => None,
    }
}

fn label_position(instrs: &[Instr], label: &Label) -> usize {
    instrs
        .iter()
        .position(|i| matches!(i, Instr::Label(l) if l == label))
        .unwrap()
}

/// Labels that open a protected region, in emission order.
fn region_entries(instrs: &[Instr]) -> Vec<Label> {
    instrs
        .windows(2)
        .filter_map(|pair| match pair {
            [Instr::Label(label), Instr::ExceptionRegionStart { .. }] => Some(label.clone()),
            _ => None,
        })
        .collect()
}

/// Values of `$!` saved on entry to each rescued region, in emission order.
fn saved_exceptions(instrs: &[Instr]) -> Vec<Variable> {
    instrs
        .iter()
        .filter_map(|i| match i {
            Instr::GetGlobalVariable { result, name } if &**name == "$!" => Some(result.clone()),
            _ => None,
        })
        .collect()
}

/// Position of a valueless `break`: the nil copy into the loop result
/// that is followed by the jump out.
fn break_site(instrs: &[Instr]) -> usize {
    instrs
        .windows(2)
        .position(|pair| {
            matches!(
                pair,
                [Instr::Copy { value: Operand::Nil, .. }, Instr::Jump(_)]
            )
        })
        .unwrap()
}

fn is_call_to(instr: &Instr, name: &str) -> bool {
    matches!(instr, Instr::Call(call) if &*call.name == name)
}

// Methods and arguments

#[test]
fn method_returns_its_received_argument() {
    let body = defn(
        "m",
        ArgsNode::required(&["x"]),
        Some(node(NodeKind::Return(Some(Box::new(local("x")))))),
    );
    let mut unit = build(&body);
    let m = scope_named(&unit, "m");

    assert_eq!(unit.tree[m].kind.tag(), "InstanceMethod");
    assert_eq!(
        unit.tree[m].static_scope.arity(),
        Some(Arity {
            required: 1,
            ..Arity::default()
        })
    );
    let Some(Instr::Return(value)) = unit.tree[m].instrs().last() else {
        panic!("method does not end in a return");
    };
    assert_eq!(local_named(value), Some("x"));
    assert_eq!(
        unit.tree[m].arg_descriptors(),
        &[ArgDescriptor::new(ArgKind::Req, Some(ident("x")))]
    );

    unit.tree.compute_scope_flags(m);
    assert!(!unit.tree[m].has_flag(ScopeFlags::REQUIRES_DYNSCOPE));
}

#[test]
fn method_checks_arity_before_receiving() {
    let unit = build(&defn("m", ArgsNode::required(&["a", "b"]), None));
    let m = scope_named(&unit, "m");
    let ops = ops(&unit, m);

    let check = ops.iter().position(|&o| o == Operation::CheckArity).unwrap();
    let first_receive = ops
        .iter()
        .position(|&o| o == Operation::ReceivePreReqdArg)
        .unwrap();
    assert!(check < first_receive);
    assert_eq!(count_op(&unit, m, Operation::ReceivePreReqdArg), 2);
}

#[test]
fn optional_argument_default_runs_only_when_missing() {
    let args = ArgsNode {
        optional: vec![OptArg {
            name: ident("a"),
            default: fixnum(1),
        }],
        ..ArgsNode::default()
    };
    let unit = build(&defn("m", args, None));
    let m = scope_named(&unit, "m");
    let instrs = unit.tree[m].instrs();

    let receive = instrs
        .iter()
        .position(|i| i.op() == Operation::ReceiveOptArg)
        .unwrap();
    let Instr::Bne { a, b, target } = &instrs[receive + 1] else {
        panic!("optional argument is not tested for Undefined");
    };
    assert_eq!(local_named(a), Some("a"));
    assert_eq!(b, &Operand::Undefined);
    assert!(instrs[receive + 2..]
        .iter()
        .any(|i| matches!(i, Instr::Label(l) if l == target)));
    assert_eq!(
        unit.tree[m].static_scope.arity(),
        Some(Arity {
            optional: 1,
            ..Arity::default()
        })
    );
}

#[test]
fn anonymous_rest_gets_a_placeholder_local() {
    let args = ArgsNode {
        pre: vec![ArgItem::Named(ident("a"))],
        rest: Some(RestArg { name: None }),
        ..ArgsNode::default()
    };
    let unit = build(&defn("m", args, None));
    let m = scope_named(&unit, "m");

    assert!(unit.tree[m].find_local("*").is_some());
    let receive = unit.tree[m]
        .instrs()
        .iter()
        .find_map(|i| match i {
            Instr::ReceiveRestArg {
                required, index, ..
            } => Some((*required, *index)),
            _ => None,
        })
        .unwrap();
    assert_eq!(receive, (1, 1));
    assert_eq!(
        unit.tree[m].arg_descriptors(),
        &[
            ArgDescriptor::new(ArgKind::Req, Some(ident("a"))),
            ArgDescriptor::new(ArgKind::Rest, None),
        ]
    );
}

#[test]
fn required_keyword_raises_when_missing() {
    let args = ArgsNode {
        keywords: vec![KeywordArg {
            name: ident("k"),
            default: None,
        }],
        ..ArgsNode::default()
    };
    let mut unit = build(&defn("m", args, None));
    let m = scope_named(&unit, "m");

    assert_eq!(
        count_op(&unit, m, Operation::RaiseRequiredKeywordArgumentError),
        1
    );
    assert_eq!(
        unit.tree[m].arg_descriptors(),
        &[ArgDescriptor::new(ArgKind::KeyReq, Some(ident("k")))]
    );
    assert_eq!(
        unit.tree[m].static_scope.arity().map(|a| a.keywords),
        Some(1)
    );
    unit.tree.compute_scope_flags(m);
    assert!(unit.tree[m].has_flag(ScopeFlags::RECEIVES_KEYWORD_ARGS));
}

#[test]
fn block_parameter_is_reified() {
    let args = ArgsNode {
        block: Some(ident("blk")),
        ..ArgsNode::default()
    };
    let mut unit = build(&defn("m", args, None));
    let m = scope_named(&unit, "m");

    let reified = unit.tree[m]
        .instrs()
        .iter()
        .find_map(|i| match i {
            Instr::ReifyClosure { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(reified.as_local().map(|v| &*v.name), Some("blk"));
    unit.tree.compute_scope_flags(m);
    assert!(unit.tree[m].has_flag(ScopeFlags::RECEIVES_CLOSURE_ARG));
}

#[test]
fn destructured_parameter_is_split_with_to_ary() {
    let pattern = MultipleAsgnPattern {
        pre: vec![local_asgn("a", None), local_asgn("b", None)],
        rest: None,
        post: Vec::new(),
    };
    let args = ArgsNode {
        pre: vec![ArgItem::Destructure(pattern)],
        ..ArgsNode::default()
    };
    let unit = build(&defn("m", args, None));
    let m = scope_named(&unit, "m");

    assert_eq!(count_op(&unit, m, Operation::ToAry), 1);
    let targets: Vec<_> = unit.tree[m]
        .instrs()
        .iter()
        .filter_map(|i| match i {
            Instr::ReqdArgMultipleAsgn {
                result,
                pre_count: None,
                index,
                ..
            } => Some((result.as_local().map(|v| v.name.to_string()), *index)),
            _ => None,
        })
        .collect();
    assert_eq!(
        targets,
        vec![(Some("a".to_string()), 0), (Some("b".to_string()), 1)]
    );
}

#[test]
fn block_checks_arity_only_with_keywords() {
    let plain = node(NodeKind::FCall {
        name: ident("each"),
        args: None,
        iter: Some(boxed(NodeKind::Iter {
            params: Some(Box::new(ArgsNode::required(&["x"]))),
            body: None,
            scope: StaticScope::new(),
        })),
    });
    let unit = build(&plain);
    let closure = scope_named(&unit, "_CLOSURE_0");
    assert_eq!(count_op(&unit, closure, Operation::CheckArity), 0);
    assert_eq!(count_op(&unit, closure, Operation::ReceivePreReqdArg), 1);
    assert!(unit.tree[closure].arg_descriptors().is_empty());

    let keyword_params = ArgsNode {
        keywords: vec![KeywordArg {
            name: ident("k"),
            default: Some(fixnum(1)),
        }],
        ..ArgsNode::default()
    };
    let with_keywords = node(NodeKind::FCall {
        name: ident("each"),
        args: None,
        iter: Some(boxed(NodeKind::Iter {
            params: Some(Box::new(keyword_params)),
            body: None,
            scope: StaticScope::new(),
        })),
    });
    let unit = build(&with_keywords);
    let closure = scope_named(&unit, "_CLOSURE_0");
    assert_eq!(count_op(&unit, closure, Operation::CheckArity), 1);
}

#[test]
fn for_loop_variable_lives_in_the_enclosing_frame() {
    let body = node(NodeKind::For {
        var: Box::new(local_asgn("x", None)),
        iter: Box::new(node(NodeKind::Array(vec![fixnum(1)]))),
        body: Some(Box::new(local("x"))),
        scope: StaticScope::new(),
    });
    let unit = build(&body);
    let for_body = scope_named(&unit, "_FOR_LOOP_0");

    assert!(unit.tree[unit.root].find_local("x").is_some());
    assert!(unit.tree[for_body].find_local("x").is_none());
    let received = unit.tree[for_body]
        .instrs()
        .iter()
        .find_map(|i| match i {
            Instr::ReceivePreReqdArg { result, index } => Some((result.clone(), *index)),
            _ => None,
        })
        .unwrap();
    assert_eq!(received.0.as_local().map(|v| v.depth), Some(0));
    assert_eq!(received.1, 0);
    assert_eq!(call_names(&unit, unit.root), vec!["each".to_string()]);
}

// Assignment

#[test]
fn multiple_assignment_extracts_every_element_before_assigning() {
    let body = node(NodeKind::MultipleAsgn {
        pattern: Box::new(MultipleAsgnPattern {
            pre: vec![local_asgn("a", None), local_asgn("b", None)],
            rest: None,
            post: Vec::new(),
        }),
        value: Some(boxed(NodeKind::Array(vec![local("b"), local("a")]))),
    });
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let last_extract = instrs
        .iter()
        .rposition(|i| i.op() == Operation::ReqdArgMultipleAsgn)
        .unwrap();
    let first_store = instrs
        .iter()
        .position(|i| matches!(i, Instr::Copy { result: Variable::Local(_), .. }))
        .unwrap();
    assert!(last_extract < first_store);
    assert_eq!(count_op(&unit, unit.root, Operation::ToAry), 0);
}

#[test]
fn multiple_assignment_splat_slices_between_pre_and_post() {
    let body = node(NodeKind::MultipleAsgn {
        pattern: Box::new(MultipleAsgnPattern {
            pre: vec![local_asgn("a", None)],
            rest: Some(MasgnRest::Target(Box::new(local_asgn("r", None)))),
            post: vec![local_asgn("z", None)],
        }),
        value: Some(Box::new(local("v"))),
    });
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    assert_eq!(count_op(&unit, unit.root, Operation::ToAry), 1);
    let rest = instrs
        .iter()
        .find_map(|i| match i {
            Instr::RestArgMultipleAsgn {
                pre_count,
                post_count,
                index,
                ..
            } => Some((*pre_count, *post_count, *index)),
            _ => None,
        })
        .unwrap();
    assert_eq!(rest, (1, 1, 0));
    let post = instrs
        .iter()
        .find_map(|i| match i {
            Instr::ReqdArgMultipleAsgn {
                pre_count: Some(pre),
                post_count: Some(post),
                index,
                ..
            } => Some((*pre, *post, *index)),
            _ => None,
        })
        .unwrap();
    assert_eq!(post, (1, 1, 0));
}

#[test]
fn instance_variable_or_assign_checks_definition_first() {
    let body = node(NodeKind::OpAsgnOr {
        first: boxed(NodeKind::InstVar(ident("@x"))),
        second: boxed(NodeKind::InstAsgn {
            name: ident("@x"),
            value: Some(Box::new(fixnum(1))),
        }),
    });
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let check = instrs
        .iter()
        .position(|i| {
            matches!(
                i,
                Instr::RuntimeHelperCall {
                    helper: RuntimeHelper::IsDefinedInstanceVar,
                    ..
                }
            )
        })
        .unwrap();
    let read = instrs
        .iter()
        .position(|i| i.op() == Operation::GetField)
        .unwrap();
    assert!(check < read);
    assert_eq!(count_op(&unit, unit.root, Operation::PutField), 1);
}

#[test]
fn local_or_assign_needs_no_definition_check() {
    let body = block(vec![
        local_asgn("x", Some(fixnum(1))),
        node(NodeKind::OpAsgnOr {
            first: Box::new(local("x")),
            second: Box::new(local_asgn("x", Some(fixnum(2)))),
        }),
    ]);
    let unit = build(&body);
    assert_eq!(count_op(&unit, unit.root, Operation::RuntimeHelperCall), 0);
}

#[test]
fn element_op_assign_reads_operates_then_writes() {
    let body = node(NodeKind::OpElementAsgn {
        receiver: Box::new(local("a")),
        args: Some(boxed(NodeKind::Array(vec![fixnum(0)]))),
        operator: ident("+"),
        value: Box::new(fixnum(1)),
    });
    let unit = build(&body);
    assert_eq!(call_names(&unit, unit.root), vec!["[]", "+", "[]="]);
}

#[test]
fn attribute_or_assign_skips_the_writer_when_truthy() {
    let body = node(NodeKind::OpAsgn {
        receiver: Box::new(local("o")),
        reader: ident("v"),
        writer: ident("v="),
        operator: ident("||"),
        value: Box::new(fixnum(1)),
    });
    let unit = build(&body);
    assert_eq!(call_names(&unit, unit.root), vec!["v", "v="]);
    assert_eq!(count_op(&unit, unit.root, Operation::Beq), 1);
}

#[test]
fn class_variable_in_class_body_uses_the_static_module() {
    let body = node(NodeKind::Class {
        cpath: boxed(NodeKind::Colon2 {
            left: None,
            name: ident("A"),
        }),
        superclass: None,
        body: Some(boxed(NodeKind::ClassVarDecl {
            name: ident("@@x"),
            value: Some(Box::new(fixnum(1))),
        })),
        scope: StaticScope::new(),
    });
    let unit = build(&body);
    let class = scope_named(&unit, "A");
    let container = unit.tree[class]
        .instrs()
        .iter()
        .find_map(|i| match i {
            Instr::PutClassVariable { container, .. } => Some(container.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(container, Operand::ScopeModule(0));
}

// defined?

#[test]
fn defined_local_folds_to_a_constant_string() {
    let body = block(vec![
        local_asgn("x", Some(fixnum(1))),
        node(NodeKind::Defined(Box::new(local("x")))),
    ]);
    let unit = build(&body);
    assert_eq!(
        unit.tree[unit.root].instrs().last(),
        Some(&Instr::Return(Operand::frozen("local-variable")))
    );
}

#[test]
fn defined_constant_path_runs_under_a_rescue() {
    let body = node(NodeKind::Defined(boxed(NodeKind::Colon2 {
        left: Some(boxed(NodeKind::Const(ident("A")))),
        name: ident("B"),
    })));
    let unit = build(&body);
    let root = unit.root;

    assert_eq!(count_op(&unit, root, Operation::GetErrorInfo), 1);
    assert_eq!(count_op(&unit, root, Operation::ExceptionRegionStart), 1);
    assert_eq!(count_op(&unit, root, Operation::RestoreErrorInfo), 1);
    assert_eq!(count_op(&unit, root, Operation::LexicalSearchConst), 1);
}

#[test]
fn defined_yield_tests_the_block() {
    let body = defn(
        "m",
        ArgsNode::default(),
        Some(node(NodeKind::Defined(boxed(NodeKind::Yield {
            arg: None,
            expanded: false,
        })))),
    );
    let unit = build(&body);
    let m = scope_named(&unit, "m");
    assert_eq!(count_op(&unit, m, Operation::BlockGiven), 1);
}

// Definitions

#[test]
fn lambda_builds_a_lambda_closure() {
    let body = node(NodeKind::Lambda {
        params: Box::new(ArgsNode::required(&["x"])),
        body: Some(Box::new(local("x"))),
        scope: StaticScope::new(),
    });
    let unit = build(&body);
    let lambda = scope_named(&unit, "_LAMBDA_0");

    assert!(unit.tree[lambda].kind.is_lambda());
    assert_eq!(count_op(&unit, unit.root, Operation::BuildLambda), 1);
}

#[test]
fn end_block_is_recorded_on_the_script() {
    let body = node(NodeKind::PostExe {
        body: Some(Box::new(fixnum(1))),
        scope: StaticScope::new(),
    });
    let mut unit = build(&body);
    let root = unit.root;
    assert_eq!(count_op(&unit, root, Operation::RecordEndBlock), 1);
    unit.tree.compute_scope_flags(root);
    assert!(unit.tree[root].has_flag(ScopeFlags::HAS_END_BLOCKS));
}

#[test]
fn begin_block_registers_with_the_script() {
    let body = node(NodeKind::PreExe {
        body: Some(Box::new(fixnum(1))),
        scope: StaticScope::new(),
    });
    let unit = build(&body);
    let begin = scope_named(&unit, "_BEGIN_");
    assert_eq!(unit.tree[unit.root].begin_blocks(), &[begin]);
}

#[test]
fn every_scope_has_flags_after_building() {
    let method = defn(
        "m",
        ArgsNode::default(),
        Some(node(NodeKind::FCall {
            name: ident("foo"),
            args: None,
            iter: Some(boxed(NodeKind::Iter {
                params: None,
                body: Some(boxed(NodeKind::Return(Some(Box::new(fixnum(1)))))),
                scope: StaticScope::new(),
            })),
        })),
    );
    let body = block(vec![
        node(NodeKind::Class {
            cpath: boxed(NodeKind::Const(ident("A"))),
            superclass: None,
            body: Some(Box::new(method)),
            scope: StaticScope::new(),
        }),
        node(NodeKind::Module {
            cpath: boxed(NodeKind::Const(ident("B"))),
            body: Some(Box::new(vcall("x"))),
            scope: StaticScope::new(),
        }),
        node(NodeKind::SClass {
            receiver: boxed(NodeKind::SelfRef),
            body: Some(Box::new(vcall("y"))),
            scope: StaticScope::new(),
        }),
    ]);
    let unit = build(&body);

    assert!(unit.tree.len() >= 6);
    for (id, scope) in unit.tree.iter() {
        assert!(scope.flags_computed(), "{} ({id:?}) is stale", scope.name);
    }
    let m = scope_named(&unit, "m");
    assert!(unit.tree[m].has_flag(ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS));
}

// Control flow

#[test]
fn case_tests_each_when_with_triple_equals_in_order() {
    let body = node(NodeKind::Case {
        subject: Some(Box::new(vcall("v"))),
        whens: vec![
            WhenClause {
                test: boxed(NodeKind::Const(ident("A"))),
                body: Some(Box::new(fixnum(1))),
                pos: SourcePos::new(1),
            },
            WhenClause {
                test: boxed(NodeKind::Splat(Box::new(vcall("list")))),
                body: Some(Box::new(fixnum(2))),
                pos: SourcePos::new(1),
            },
        ],
        else_body: Some(Box::new(fixnum(3))),
    });
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let subject = instrs
        .iter()
        .find_map(|i| match i {
            Instr::Call(call) if &*call.name == "v" => Some(call.result.clone()),
            _ => None,
        })
        .unwrap();
    let constant = instrs
        .iter()
        .find_map(|i| match i {
            Instr::SearchConst { result, name, .. } if &**name == "A" => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    let tests: Vec<usize> = instrs
        .iter()
        .enumerate()
        .filter(|(_, i)| i.op() == Operation::Eqq)
        .map(|(n, _)| n)
        .collect();
    assert_eq!(tests.len(), 2);

    let Instr::Eqq {
        receiver, value, ..
    } = &instrs[tests[0]]
    else {
        unreachable!()
    };
    assert_eq!(receiver, &Operand::Variable(constant));
    assert_eq!(value, &Operand::Variable(subject.clone()));
    let Instr::Eqq {
        receiver, value, ..
    } = &instrs[tests[1]]
    else {
        unreachable!()
    };
    assert!(matches!(receiver, Operand::Splat(_)));
    assert_eq!(value, &Operand::Variable(subject));

    // each match branches to its own body
    let mut bodies = Vec::new();
    for &n in &tests {
        let Instr::Eqq { result, .. } = &instrs[n] else {
            unreachable!()
        };
        let Instr::Beq { a, b, target } = &instrs[n + 1] else {
            panic!("=== result is not tested");
        };
        assert_eq!(a, &Operand::Variable(result.clone()));
        assert_eq!(b, &Operand::Boolean(true));
        bodies.push(target.clone());
    }
    let copied = |label: &Label| match &instrs[label_position(instrs, label) + 1] {
        Instr::Copy { value, .. } => value.clone(),
        other => panic!("body starts with {other:?}"),
    };
    assert_eq!(copied(&bodies[0]), Operand::Fixnum(1));
    assert_eq!(copied(&bodies[1]), Operand::Fixnum(2));

    // no match falls through to else
    let Instr::Jump(otherwise) = &instrs[tests[1] + 2] else {
        panic!("failed tests do not jump to else");
    };
    assert_eq!(copied(otherwise), Operand::Fixnum(3));
}

#[test]
fn case_without_subject_tests_against_undefined() {
    let body = node(NodeKind::Case {
        subject: None,
        whens: vec![WhenClause {
            test: Box::new(vcall("c")),
            body: Some(Box::new(fixnum(1))),
            pos: SourcePos::new(1),
        }],
        else_body: None,
    });
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let test = instrs
        .iter()
        .position(|i| i.op() == Operation::Eqq)
        .unwrap();
    assert!(matches!(
        &instrs[test],
        Instr::Eqq {
            value: Operand::Undefined,
            ..
        }
    ));
    let Instr::Jump(otherwise) = &instrs[test + 2] else {
        panic!("failed test does not jump to else");
    };
    assert!(matches!(
        &instrs[label_position(instrs, otherwise) + 1],
        Instr::Copy {
            value: Operand::Nil,
            ..
        }
    ));
}

#[test]
fn redo_jumps_to_the_start_of_the_iteration() {
    let unit = build(&while_loop(vcall("c"), node(NodeKind::Redo)));
    let instrs = unit.tree[unit.root].instrs();

    let test = instrs
        .iter()
        .position(|i| i.op() == Operation::Beq)
        .unwrap();
    let Instr::Label(iteration) = &instrs[test + 1] else {
        panic!("loop body does not follow the condition");
    };
    let redo = instrs
        .iter()
        .find_map(|i| match i {
            Instr::Jump(target) => Some(target),
            _ => None,
        })
        .unwrap();
    assert_eq!(redo, iteration);
    assert_eq!(count_op(&unit, unit.root, Operation::ThrowException), 0);
}

#[test]
fn redo_outside_a_loop_is_a_local_jump_error() {
    let unit = build(&node(NodeKind::Redo));
    assert!(unit.tree[unit.root].instrs().iter().any(|i| matches!(
        i,
        Instr::ThrowException(Operand::LocalJumpError(JumpKind::Redo))
    )));
}

#[test]
fn break_from_a_block_is_caught_at_the_call() {
    let body = node(NodeKind::FCall {
        name: ident("foo"),
        args: None,
        iter: Some(boxed(NodeKind::Iter {
            params: None,
            body: Some(boxed(NodeKind::Break(Some(Box::new(fixnum(1)))))),
            scope: StaticScope::new(),
        })),
    });
    let unit = build(&body);
    let closure = scope_named(&unit, "_CLOSURE_0");
    assert!(unit.tree[closure].has_flag(ScopeFlags::HAS_BREAK_INSTRS));

    let instrs = unit.tree[unit.root].instrs();
    let call = instrs.iter().position(|i| is_call_to(i, "foo")).unwrap();
    let Instr::Call(foo) = &instrs[call] else {
        unreachable!()
    };
    assert!(matches!(
        &instrs[call - 1],
        Instr::ExceptionRegionStart { .. }
    ));
    assert!(matches!(&instrs[call + 1], Instr::Jump(_)));
    assert!(matches!(&instrs[call + 2], Instr::ExceptionRegionEnd));

    let (result, args) = instrs
        .iter()
        .find_map(|i| match i {
            Instr::RuntimeHelperCall {
                result,
                helper: RuntimeHelper::HandlePropagateBreak,
                args,
            } => Some((result, args)),
            _ => None,
        })
        .unwrap();
    assert_eq!(result, &foo.result);
    assert_eq!(args.len(), 1);
    assert_eq!(count_op(&unit, unit.root, Operation::ReceiveAnyException), 1);
}

#[test]
fn block_without_break_leaves_the_call_unprotected() {
    let body = node(NodeKind::FCall {
        name: ident("foo"),
        args: None,
        iter: Some(boxed(NodeKind::Iter {
            params: None,
            body: Some(Box::new(fixnum(1))),
            scope: StaticScope::new(),
        })),
    });
    let unit = build(&body);
    let root = unit.root;

    assert_eq!(count_op(&unit, root, Operation::ExceptionRegionStart), 0);
    assert_eq!(count_op(&unit, root, Operation::RuntimeHelperCall), 0);
    assert_eq!(call_names(&unit, root), vec!["foo".to_string()]);
}

#[test]
fn break_inside_a_loop_runs_the_ensure_first() {
    let body = while_loop(
        vcall("c"),
        ensured(node(NodeKind::Break(None)), vcall("e")),
    );
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let site = break_site(instrs);
    assert!(matches!(&instrs[site - 1], Instr::ExceptionRegionEnd));
    assert!(is_call_to(&instrs[site - 2], "e"));
    assert!(matches!(
        &instrs[site - 3],
        Instr::ExceptionRegionStart { .. }
    ));
}

#[test]
fn next_inside_a_loop_runs_the_ensure_first() {
    let body = while_loop(
        vcall("c"),
        ensured(node(NodeKind::Next(None)), vcall("e")),
    );
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let next = instrs
        .iter()
        .position(|i| matches!(i, Instr::Jump(_)))
        .unwrap();
    assert!(matches!(&instrs[next - 1], Instr::ExceptionRegionEnd));
    assert!(is_call_to(&instrs[next - 2], "e"));

    // the target is the end of the iteration, just before the back edge
    let Instr::Jump(target) = &instrs[next] else {
        unreachable!()
    };
    assert!(matches!(
        &instrs[label_position(instrs, target) + 1],
        Instr::Jump(_)
    ));
}

#[test]
fn break_stays_inside_an_ensure_around_its_loop() {
    let body = ensured(
        while_loop(vcall("c"), node(NodeKind::Break(None))),
        vcall("e"),
    );
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let site = break_site(instrs);
    assert!(!instrs[..site].iter().any(|i| is_call_to(i, "e")));
    assert!(!matches!(&instrs[site - 1], Instr::ExceptionRegionEnd));
    // normal exit and exceptional exit, nothing for the break
    assert_eq!(
        call_names(&unit, unit.root)
            .iter()
            .filter(|n| *n == "e")
            .count(),
        2
    );
}

#[test]
fn break_out_of_a_handler_restores_the_exception() {
    let body = while_loop(
        vcall("c"),
        bare_rescue(Some(vcall("x")), Some(node(NodeKind::Break(None)))),
    );
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let saved = saved_exceptions(instrs);
    assert_eq!(saved.len(), 1);
    let site = break_site(instrs);
    let Instr::PutGlobalVar { name, value } = &instrs[site - 1] else {
        panic!("$! is not restored before the break");
    };
    assert_eq!(&**name, "$!");
    assert_eq!(value, &Operand::Variable(saved[0].clone()));
}

#[test]
fn break_from_a_loop_inside_a_handler_keeps_the_exception() {
    let body = bare_rescue(
        Some(vcall("x")),
        Some(while_loop(vcall("c"), node(NodeKind::Break(None)))),
    );
    let unit = build(&body);
    let instrs = unit.tree[unit.root].instrs();

    let site = break_site(instrs);
    assert!(!matches!(&instrs[site - 1], Instr::PutGlobalVar { .. }));
}

// Exceptions

#[test]
fn retry_in_a_handler_restarts_its_own_region() {
    let inner = bare_rescue(Some(vcall("x")), Some(node(NodeKind::Retry)));
    let unit = build(&bare_rescue(Some(inner), None));
    let instrs = unit.tree[unit.root].instrs();

    let entries = region_entries(instrs);
    let saved = saved_exceptions(instrs);
    assert_eq!(entries.len(), 2);
    assert_eq!(saved.len(), 2);

    let restarts: Vec<usize> = instrs
        .iter()
        .enumerate()
        .filter(|(_, i)| matches!(i, Instr::Jump(target) if entries.contains(target)))
        .map(|(n, _)| n)
        .collect();
    assert_eq!(restarts.len(), 1);
    let retry = restarts[0];
    assert!(matches!(&instrs[retry], Instr::Jump(target) if *target == entries[1]));
    let Instr::PutGlobalVar { name, value } = &instrs[retry - 1] else {
        panic!("$! is not restored before retrying");
    };
    assert_eq!(&**name, "$!");
    assert_eq!(value, &Operand::Variable(saved[1].clone()));
    assert!(unit.tree[unit.root].has_flag(ScopeFlags::HAS_LOOPS));
}

#[test]
fn retry_in_a_protected_body_restarts_the_enclosing_region() {
    let inner = bare_rescue(Some(node(NodeKind::Retry)), None);
    let unit = build(&bare_rescue(Some(vcall("x")), Some(inner)));
    let instrs = unit.tree[unit.root].instrs();

    let entries = region_entries(instrs);
    let saved = saved_exceptions(instrs);
    let retry = instrs
        .iter()
        .position(|i| matches!(i, Instr::Jump(target) if entries.contains(target)))
        .unwrap();
    assert!(matches!(&instrs[retry], Instr::Jump(target) if *target == entries[0]));
    assert!(matches!(
        &instrs[retry - 1],
        Instr::PutGlobalVar { value, .. } if *value == Operand::Variable(saved[0].clone())
    ));
}

#[test]
fn retry_outside_a_rescue_is_a_local_jump_error() {
    let unit = build(&node(NodeKind::Retry));
    let root = unit.root;

    assert!(unit.tree[root].instrs().iter().any(|i| matches!(
        i,
        Instr::ThrowException(Operand::LocalJumpError(JumpKind::Retry))
    )));
    assert!(!unit.tree[root].has_flag(ScopeFlags::HAS_LOOPS));
}

// Failures

#[test]
fn anonymous_splat_outside_a_pattern_is_not_compilable() {
    let result = build_root(
        &IrManager::new(),
        &config(),
        &node(NodeKind::Star),
        StaticScope::new(),
    );
    let Err(BuildError::NotCompilable { kind, line, .. }) = result else {
        panic!("expected a not-compilable error");
    };
    assert_eq!((kind, line), ("Star", 1));
}

#[test]
fn nesting_past_the_limit_fails() {
    let inner = defn("inner", ArgsNode::default(), None);
    let outer = defn("outer", ArgsNode::default(), Some(inner));
    let result = build_root(
        &IrManager::new(),
        &config().with_max_scope_depth(1),
        &outer,
        StaticScope::new(),
    );
    assert!(matches!(
        result,
        Err(BuildError::NestingTooDeep { limit: 1, .. })
    ));
}
