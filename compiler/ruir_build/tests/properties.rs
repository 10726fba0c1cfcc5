//! Property tests over generated syntax trees: building is deterministic,
//! labels stay unique within a scope, locals keep one identity, and the
//! flip-flop lowering behaves like a two-state machine when executed.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::doc_markdown,
    clippy::needless_pass_by_value,
    reason = "Proptest macros generate code with these patterns"
)]

use std::collections::{HashMap, HashSet, VecDeque};

use proptest::prelude::*;
use ruir_ast::{ident, Node, NodeKind, StaticScope};
use ruir_build::{build_root, BuildConfig, BuiltUnit};
use ruir_ir::{Instr, IrManager, Label, Operand, Variable};

fn config() -> BuildConfig {
    BuildConfig::new("prop.rb")
        .with_line_numbers(false)
        .with_thread_poll(false)
}

fn build(body: &Node) -> BuiltUnit {
    build_root(&IrManager::new(), &config(), body, StaticScope::new()).unwrap()
}

fn node(kind: NodeKind) -> Node {
    Node::new(kind, 1)
}

fn leaf() -> impl Strategy<Value = Node> {
    prop_oneof![
        any::<i16>().prop_map(|n| node(NodeKind::Fixnum(i64::from(n)))),
        Just(node(NodeKind::Nil)),
        Just(node(NodeKind::True)),
        Just(node(NodeKind::False)),
        prop::sample::select(vec!["a", "b", "c"]).prop_map(|n| node(NodeKind::VCall(ident(n)))),
        Just(node(NodeKind::LocalVar {
            name: ident("x"),
            depth: 0,
        })),
        any::<i8>().prop_map(|n| node(NodeKind::LocalAsgn {
            name: ident("x"),
            depth: 0,
            value: Some(Node::boxed(NodeKind::Fixnum(i64::from(n)), 1)),
        })),
    ]
}

fn tree() -> impl Strategy<Value = Node> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(|nodes| node(NodeKind::Block(nodes))),
            (
                inner.clone(),
                prop::option::of(inner.clone()),
                prop::option::of(inner.clone())
            )
                .prop_map(|(cond, then_body, else_body)| node(NodeKind::If {
                    cond: Box::new(cond),
                    then_body: then_body.map(Box::new),
                    else_body: else_body.map(Box::new),
                })),
            (inner.clone(), prop::option::of(inner.clone()), any::<bool>()).prop_map(
                |(cond, body, head_cond)| node(NodeKind::While {
                    cond: Box::new(cond),
                    body: body.map(Box::new),
                    head_cond,
                })
            ),
            (inner.clone(), inner.clone()).prop_map(|(first, second)| node(NodeKind::And {
                first: Box::new(first),
                second: Box::new(second),
            })),
            (inner.clone(), inner.clone()).prop_map(|(first, second)| node(NodeKind::Or {
                first: Box::new(first),
                second: Box::new(second),
            })),
            prop::collection::vec(inner, 0..3).prop_map(|args| node(NodeKind::FCall {
                name: ident("f"),
                args: Some(Node::boxed(NodeKind::Array(args), 1)),
                iter: None,
            })),
        ]
    })
}

proptest! {
    #[test]
    fn building_twice_gives_identical_ir(body in tree()) {
        let first = build(&body);
        let second = build(&body);
        prop_assert_eq!(
            first.tree.dump(first.root).to_string(),
            second.tree.dump(second.root).to_string()
        );
    }

    #[test]
    fn labels_are_placed_once_per_scope(body in tree()) {
        let unit = build(&body);
        for (_, scope) in unit.tree.iter() {
            let mut seen = HashSet::new();
            for instr in scope.instrs() {
                if let Instr::Label(label) = instr {
                    prop_assert!(seen.insert(label.clone()), "{label:?} placed twice");
                }
            }
        }
    }

    #[test]
    fn a_local_keeps_one_slot(body in tree()) {
        let unit = build(&body);
        let slots: HashSet<u32> = unit.tree[unit.root]
            .instrs()
            .iter()
            .filter_map(|i| match i {
                Instr::Copy { result: Variable::Local(v), .. } if &*v.name == "x" => Some(v.slot),
                _ => None,
            })
            .collect();
        prop_assert!(slots.len() <= 1);
    }

    #[test]
    fn flip_flop_matches_a_two_state_machine(
        exclusive in any::<bool>(),
        inputs in prop::collection::vec((any::<bool>(), any::<bool>()), 1..12),
    ) {
        let body = node(NodeKind::Flip {
            begin: Node::boxed(NodeKind::FCall { name: ident("c1"), args: None, iter: None }, 1),
            end: Node::boxed(NodeKind::FCall { name: ident("c2"), args: None, iter: None }, 1),
            exclusive,
        });
        let unit = build(&body);
        let instrs = unit.tree[unit.root].instrs();

        let mut env = HashMap::new();
        let mut model = FlipModel { active: false, exclusive };
        for (n, &(c1, c2)) in inputs.iter().enumerate() {
            // the state initializer only runs on entry
            let start = usize::from(n > 0);
            let mut answers = VecDeque::from([("c1", c1), ("c2", c2)]);
            let (value, calls) = run(instrs, start, &mut env, &mut answers);
            let (expected, expected_calls) = model.step(c1, c2);
            prop_assert_eq!(value, Operand::Boolean(expected));
            prop_assert_eq!(calls, expected_calls);
        }
    }
}

// Execution

struct FlipModel {
    active: bool,
    exclusive: bool,
}

impl FlipModel {
    fn step(&mut self, c1: bool, c2: bool) -> (bool, Vec<&'static str>) {
        let mut calls = Vec::new();
        if !self.active {
            calls.push("c1");
            if !c1 {
                return (false, calls);
            }
            self.active = true;
            if self.exclusive {
                return (true, calls);
            }
        }
        calls.push("c2");
        if c2 {
            self.active = false;
        }
        (true, calls)
    }
}

fn resolve(env: &HashMap<Variable, Operand>, operand: &Operand) -> Operand {
    match operand {
        Operand::Variable(var) => env.get(var).cloned().unwrap_or(Operand::Nil),
        other => other.clone(),
    }
}

/// Run straight-line IR with jumps, answering calls from `answers` by name.
fn run(
    instrs: &[Instr],
    start: usize,
    env: &mut HashMap<Variable, Operand>,
    answers: &mut VecDeque<(&'static str, bool)>,
) -> (Operand, Vec<&'static str>) {
    let target = |label: &Label| {
        instrs
            .iter()
            .position(|i| matches!(i, Instr::Label(l) if l == label))
            .unwrap()
    };
    let mut calls = Vec::new();
    let mut pc = start;
    while pc < instrs.len() {
        let mut next = pc + 1;
        match &instrs[pc] {
            Instr::Copy { result, value } => {
                let value = resolve(env, value);
                env.insert(result.clone(), value);
            }
            Instr::Beq { a, b, target: label } => {
                if resolve(env, a) == resolve(env, b) {
                    next = target(label);
                }
            }
            Instr::Bne { a, b, target: label } => {
                if resolve(env, a) != resolve(env, b) {
                    next = target(label);
                }
            }
            Instr::Jump(label) => next = target(label),
            Instr::Call(call) => {
                let position = answers
                    .iter()
                    .position(|(name, _)| **name == *call.name)
                    .unwrap();
                let (name, answer) = answers.remove(position).unwrap();
                calls.push(name);
                env.insert(call.result.clone(), Operand::Boolean(answer));
            }
            Instr::Return(value) => return (resolve(env, value), calls),
            _ => {}
        }
        pc = next;
    }
    panic!("fell off the end of the script");
}
